//! Reader level transport
//!
//! A [`CardTransport`] is one physical reader: it can be opened, closed and
//! scanned for tags. A [`ReaderEnumerator`] discovers the transports
//! available on the host.

use std::fmt;

use crate::{driver::CardDriver, tags::TagBatch};

/// Failure of a single presence scan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// No reader device is open
    #[error("reader unavailable")]
    Unavailable,
    /// Input or output error
    #[error("input/output error")]
    Io,
    /// Invalid argument or command
    #[error("invalid argument")]
    Invalid,
    /// Buffer overflow
    #[error("buffer overflow")]
    Overflow,
    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
    /// Operation aborted
    #[error("operation aborted")]
    Aborted,
    /// Target released by the reader
    #[error("target released")]
    Released,
    /// RF transmission error
    #[error("RF transmission error")]
    Rf,
    /// Authentication failure
    #[error("authentication failure")]
    AuthFail,
    /// Chip reported a hardware failure
    #[error("broken chip")]
    BrokenChip,
    /// Anything else, with the reader stack's code
    #[error("reader error {0:#010X}")]
    Driver(u32),
}

impl ScanError {
    /// Short status string reported to presence listeners
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Io => "ioerror",
            Self::Invalid => "invalid",
            Self::Overflow => "overflow",
            Self::Timeout => "timeout",
            Self::Aborted => "aborted",
            Self::Released => "released",
            Self::Rf => "error",
            Self::AuthFail => "authfail",
            Self::BrokenChip => "brokenchip",
            Self::Driver(_) => "unknown",
        }
    }
}

/// Errors from opening or enumerating readers
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The reader stack is not running
    #[error("Cannot establish context: {0}")]
    NoService(String),

    /// No readers are attached
    #[error("Unable to list readers")]
    NoReaders,

    /// A named reader is not attached
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// Reader stack failure with its native code
    #[error("Reader stack error {code:#010X}: {message}")]
    Driver {
        /// Native code
        code: u32,
        /// Description
        message: String,
    },
}

/// One reader device
pub trait CardTransport: Send + fmt::Debug {
    /// Tag handle produced by scans
    type Tag: CardDriver + 'static;

    /// Reader name
    fn name(&self) -> &str;

    /// Open the device
    fn open(&mut self) -> Result<(), TransportError>;

    /// Close the device, dropping any reader level state
    fn close(&mut self);

    /// Whether the device is open
    fn is_open(&self) -> bool;

    /// List the tags currently in the field
    fn scan(&mut self) -> Result<TagBatch<Self::Tag>, ScanError>;
}

/// Discovers the readers attached to the host
pub trait ReaderEnumerator: fmt::Debug {
    /// Transport for each discovered reader
    type Transport: CardTransport + 'static;

    /// Enumerate attached readers, unopened
    fn enumerate(&self) -> Result<Vec<Self::Transport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_strings() {
        assert_eq!(ScanError::Unavailable.status(), "unavailable");
        assert_eq!(ScanError::Io.status(), "ioerror");
        assert_eq!(ScanError::Rf.status(), "error");
        assert_eq!(ScanError::Driver(0x8010_0001).status(), "unknown");
    }
}
