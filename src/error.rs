use std::io;

use thiserror::Error;

/// Errors raised while producing a cpio archive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpioError {
    /// An entry was admitted while another entry's content was still open.
    #[error("an entry is already being written")]
    EntryInProgress,

    /// An entry was admitted after the archive was finalized or destroyed.
    #[error("archive is closed")]
    ArchiveClosed,

    #[error("size mismatch for {name}: declared {declared} bytes, received {written}")]
    SizeMismatch {
        name: String,
        declared: u64,
        written: u64,
    },

    #[error("no body allowed for this entry")]
    NoBodyAllowed,

    /// The source feeding an entry's content failed or went away early.
    #[error("entry content source failed: {0}")]
    Upstream(String),

    #[error("archive was destroyed")]
    Destroyed,

    #[error("invalid entry name {0:?}")]
    InvalidName(String),

    #[error("{field} value {value} does not fit in a {format} header")]
    FieldOverflow {
        format: &'static str,
        field: &'static str,
        value: u64,
    },

    #[error("invalid pack options: {0}")]
    InvalidOptions(&'static str),
}

pub type CpioResult<T> = Result<T, CpioError>;

impl CpioError {
    /// Recover a `CpioError` that travelled through an [`io::Error`], or wrap a
    /// foreign I/O failure as an upstream error.
    pub fn from_io(err: io::Error) -> Self {
        match err.get_ref().and_then(|e| e.downcast_ref::<CpioError>()) {
            Some(inner) => inner.clone(),
            None => CpioError::Upstream(err.to_string()),
        }
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            CpioError::EntryInProgress | CpioError::ArchiveClosed | CpioError::NoBodyAllowed => {
                io::ErrorKind::Unsupported
            }
            CpioError::SizeMismatch { .. } | CpioError::FieldOverflow { .. } => {
                io::ErrorKind::InvalidData
            }
            CpioError::InvalidName(_) | CpioError::InvalidOptions(_) => io::ErrorKind::InvalidInput,
            CpioError::Upstream(_) => io::ErrorKind::Other,
            CpioError::Destroyed => io::ErrorKind::BrokenPipe,
        }
    }
}

impl From<io::Error> for CpioError {
    fn from(err: io::Error) -> Self {
        CpioError::from_io(err)
    }
}

impl From<CpioError> for io::Error {
    fn from(err: CpioError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}
