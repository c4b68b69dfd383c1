use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all snapsheet operations.
///
/// Variants carry the offending path and the underlying diagnostic text so a
/// single `Display` rendering is enough for the user-facing message.
#[derive(Debug, Error)]
pub enum Error {
    /// The input video file does not exist.
    #[error("video file not found: {0}")]
    NotFound(PathBuf),

    /// The probe reported no video stream or malformed metadata.
    #[error("invalid video file {path}: {reason}")]
    InvalidMedia { path: PathBuf, reason: String },

    /// The external tool failed while sampling frames.
    #[error("frame extraction failed: {0}")]
    Extraction(String),

    /// A frame image could not be decoded for compositing.
    #[error("failed to composite frame {path}: {source}")]
    Composition {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Assembly was requested with zero selected frames.
    #[error("no frames selected")]
    EmptySelection,

    /// A page could not be encoded or written.
    #[error("failed to assemble document: {0}")]
    Assembly(String),

    /// A constructor or command received an out-of-range value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A background job was submitted while another was still running.
    #[error("another operation is already in progress")]
    OperationInProgress,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
