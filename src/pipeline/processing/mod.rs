// Pipeline processing: parsing, normalization, categorization and duplicate detection

pub mod categorize;
pub mod duplicates;
pub mod normalize;
pub mod parser;
