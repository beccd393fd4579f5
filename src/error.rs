use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel parsing failed: {0}")]
    Excel(String),

    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("Unsupported or unrecognized file type (extension: {extension})")]
    UnsupportedFormat { extension: String },

    #[error("File type mismatch: extension suggests {declared}, content looks like {detected}")]
    FormatMismatch { declared: String, detected: String },

    #[error("Input is empty (0 bytes)")]
    EmptyInput,

    #[error("No complaint rows found in {0}")]
    NoRecords(String),

    #[error("Existing register at {path} cannot be read: {reason}")]
    CorruptRegister { path: String, reason: String },

    #[error("Register write failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Could not replace register file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegisterError {
    /// Whether the error belongs to the parse family (input rejected before
    /// the register was touched).
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            RegisterError::Io(_)
                | RegisterError::Csv(_)
                | RegisterError::Excel(_)
                | RegisterError::Pdf(_)
                | RegisterError::UnsupportedFormat { .. }
                | RegisterError::FormatMismatch { .. }
                | RegisterError::EmptyInput
                | RegisterError::NoRecords(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RegisterError>;
