//! Error taxonomy shared by the import, export and rename pipelines.
//!
//! Decode failures and naming conflicts are not represented here: they are
//! ordinary outcomes of the rename pipeline. Cancellation is not an error either.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors a pipeline reports for the operation as a whole
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source or target folder failed validation before any work started
    #[error("Invalid {role} folder {}: {reason}", .path.display())]
    InvalidFolder {
        role: &'static str,
        path: PathBuf,
        reason: &'static str,
    },

    /// Reading a file or listing a folder failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A barcode collection document could not be parsed
    #[error("Malformed barcode document {}: {message}", .path.display())]
    MalformedXml { path: PathBuf, message: String },

    /// Writing the barcode collection failed
    #[error("Failed to export barcodes to {}: {message}", .path.display())]
    Export { path: PathBuf, message: String },

    /// The worker hung up before reporting a result
    #[error("Pipeline worker disconnected before finishing")]
    Channel,

    /// The worker thread panicked
    #[error("Pipeline worker panicked")]
    WorkerPanicked,
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_folder_message_names_role_and_path() {
        let err = PipelineError::InvalidFolder {
            role: "source",
            path: PathBuf::from("/nope"),
            reason: "does not exist",
        };
        assert_eq!(err.to_string(), "Invalid source folder /nope: does not exist");
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = PipelineError::io("list.txt", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.to_string().contains("list.txt"));
        assert!(err.source().is_some());
    }
}
