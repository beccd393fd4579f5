pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod pipeline;

// Domain data shapes shared across layers
pub mod domain;
