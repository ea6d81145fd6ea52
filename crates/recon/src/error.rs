use std::fmt;

/// Failures that abort a run. Data-quality problems are never reported here;
/// they surface as [`crate::model::ReconWarning`] entries on the result.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error (includes unknown key schemes).
    ConfigParse(String),
    /// Config validation error (no sources, blank file name, etc.).
    ConfigValidation(String),
    /// Policy values that cannot drive a run.
    InvalidPolicy(String),
    /// A record was pushed into a group with a different key.
    KeyMismatch { expected: String, found: String },
    /// Missing required column in input data.
    MissingColumn { source: String, column: String },
    /// CSV structure error (ragged rows, bad quoting, etc.).
    Csv { source: String, message: String },
    /// IO error (file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidPolicy(msg) => write!(f, "invalid policy: {msg}"),
            Self::KeyMismatch { expected, found } => {
                write!(f, "record key '{found}' does not belong to group '{expected}'")
            }
            Self::MissingColumn { source, column } => {
                write!(f, "source '{source}': missing column '{column}'")
            }
            Self::Csv { source, message } => write!(f, "source '{source}': {message}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
