//! Error types for the PC/SC transport

use mifare_core::transport::{ScanError, TransportError};

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// Reader name cannot be passed to PC/SC
    #[error("Invalid reader name: {0}")]
    InvalidReaderName(String),

    /// Tag answered GET UID with an error status
    #[error("Unexpected GET UID response: {}", hex::encode_upper(.0))]
    UnexpectedResponse(Vec<u8>),
}

impl PcscError {
    /// Native PC/SC code, when the failure came from the PC/SC stack
    pub const fn code(&self) -> Option<u32> {
        match self {
            Self::Pcsc(e) => Some(*e as u32),
            _ => None,
        }
    }
}

impl From<PcscError> for TransportError {
    fn from(err: PcscError) -> Self {
        match err {
            PcscError::Pcsc(pcsc::Error::NoService | pcsc::Error::ServiceStopped) => {
                Self::NoService(err.to_string())
            }
            PcscError::Pcsc(pcsc::Error::NoReadersAvailable) | PcscError::NoReadersAvailable => {
                Self::NoReaders
            }
            PcscError::ReaderNotFound(name) | PcscError::InvalidReaderName(name) => {
                Self::ReaderNotFound(name)
            }
            PcscError::Pcsc(e) => Self::Driver { code: e as u32, message: e.to_string() },
            PcscError::UnexpectedResponse(_) => {
                Self::Driver { code: pcsc::ffi::SCARD_E_UNEXPECTED as u32, message: err.to_string() }
            }
        }
    }
}

/// Map a PC/SC failure during a scan to the status reported to listeners
pub(crate) const fn scan_error(err: pcsc::Error) -> ScanError {
    match err {
        pcsc::Error::NoService
        | pcsc::Error::ServiceStopped
        | pcsc::Error::NoReadersAvailable
        | pcsc::Error::ReaderUnavailable
        | pcsc::Error::UnknownReader => ScanError::Unavailable,
        pcsc::Error::Timeout => ScanError::Timeout,
        pcsc::Error::Cancelled => ScanError::Aborted,
        pcsc::Error::InsufficientBuffer => ScanError::Overflow,
        pcsc::Error::InvalidParameter | pcsc::Error::InvalidValue => ScanError::Invalid,
        pcsc::Error::CommError | pcsc::Error::UnresponsiveCard => ScanError::Io,
        pcsc::Error::RemovedCard | pcsc::Error::ResetCard => ScanError::Released,
        other => ScanError::Driver(other as u32),
    }
}
