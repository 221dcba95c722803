//! Error types for I/O operations

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing mesh files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Unsupported mesh format: {extension}")]
    UnknownFormat { extension: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid mesh: {message}")]
    InvalidMesh { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IoError {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMesh { message: message.into() }
    }

    /// Map a failed `File::open` to [`IoError::FileNotFound`] where it applies.
    pub(crate) fn opening(path: &std::path::Path, error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::FileNotFound { path: path.to_path_buf() }
        } else {
            Self::Io(error)
        }
    }
}

impl From<IoError> for meshreduce_core::Error {
    fn from(error: IoError) -> Self {
        match error {
            IoError::Io(e) => meshreduce_core::Error::Io(e),
            IoError::UnknownFormat { extension } => meshreduce_core::Error::UnsupportedFormat(extension),
            other => meshreduce_core::Error::InvalidData(other.to_string()),
        }
    }
}
