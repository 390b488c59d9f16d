//! The single error type for the client core.
//!
//! Short input is never an error: the decoder reports it as "incomplete" and
//! waits for more bytes. Errors are reserved for conditions after which the
//! stream or the dataset model cannot be trusted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // === Stream errors (the byte stream is no longer framed correctly)
    // =========================================================================
    #[error("Unknown message type tag: {0}")]
    UnknownMessageType(i16),

    #[error("Invalid blob length on the wire: {0}")]
    InvalidLength(i32),

    #[error("Blob length {len} exceeds the configured maximum of {max} bytes")]
    BlobTooLarge { len: u32, max: u32 },

    // =========================================================================
    // === Dataset model errors
    // =========================================================================
    #[error("Unknown dataset: {0}")]
    UnknownDataset(i32),

    #[error("Unknown sub-dataset {subdataset_id} in dataset {dataset_id}")]
    UnknownSubDataset { dataset_id: i32, subdataset_id: i32 },

    #[error("Unknown sub-dataset group: {0}")]
    UnknownGroup(i32),

    #[error("No dataset available at '{0}'")]
    UnknownSource(String),

    #[error("Field index {0} is out of range")]
    FieldIndexOutOfRange(usize),

    #[error("Field {0} has no loaded values")]
    FieldNotLoaded(usize),

    #[error("Buffer length mismatch: expected a multiple of {0}, got {1}")]
    BufferMismatch(usize, usize),

    #[error("Unsupported field format code: {0}")]
    UnsupportedFormat(i32),

    // =========================================================================
    // === Configuration and external wrappers
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport is shut down")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    /// True for errors after which the byte stream must be reset.
    pub fn is_stream_fatal(&self) -> bool {
        matches!(
            self,
            Error::UnknownMessageType(_) | Error::InvalidLength(_) | Error::BlobTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
