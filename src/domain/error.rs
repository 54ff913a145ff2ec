//! Domain error types.

/// Top-level error type for folio.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("CSV parse error in {file}: {reason}")]
    CsvParse { file: String, reason: String },

    #[error("holdings snapshot error in {path}: {reason}")]
    Snapshot { path: String, reason: String },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&FolioError> for std::process::ExitCode {
    fn from(err: &FolioError) -> Self {
        let code: u8 = match err {
            FolioError::Io(_) => 1,
            FolioError::ConfigParse { .. }
            | FolioError::ConfigMissing { .. }
            | FolioError::ConfigInvalid { .. } => 2,
            FolioError::Database { .. } | FolioError::DatabaseQuery { .. } => 3,
            FolioError::CsvParse { .. } | FolioError::Snapshot { .. } => 4,
            FolioError::InvalidInput { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
