// Register persistence: the workbook layout and the on-disk store

pub mod register;
pub mod workbook;

pub use register::{check_register, quarantine_register, MergeOutcome, Register, RegisterHealth, RegisterStore, SaveSummary};
