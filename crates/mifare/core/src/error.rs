//! Error types for card access

use std::fmt;

use serde::Serialize;

use crate::transport::TransportError;

/// Result type for card operations
pub type Result<T> = std::result::Result<T, Error>;

/// A card operation step, used to label driver failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Step {
    GetVersion,
    GetKeySettings,
    GetKeyVersion,
    FreeMemory,
    Authenticate,
    ChangeKeySettings,
    FormatPicc,
    SelectApplication,
    CreateApplication,
    CreateCcFile,
    WriteCc,
    CreateNdefFile,
    CreateCcFileIso,
    WriteCcIso,
    CreateNdefFileIso,
    ReadCc,
    ReadNdef,
    WriteNdefLengthPre,
    WriteNdefPayload,
    WriteNdefLengthPost,
}

impl Step {
    /// Stable numeric code reported for failures in this step
    pub const fn code(self) -> u32 {
        match self {
            Self::GetVersion => 0x12304,
            Self::GetKeySettings => 0x12307,
            Self::GetKeyVersion => 0x12308,
            Self::FreeMemory => 0x12309,
            Self::Authenticate => 0x12310,
            Self::ChangeKeySettings => 0x12311,
            Self::FormatPicc => 0x12312,
            Self::SelectApplication => 0x12313,
            Self::CreateApplication => 0x12314,
            Self::CreateCcFile => 0x12315,
            Self::WriteCc => 0x12316,
            Self::CreateNdefFile => 0x12317,
            // the ISO layout numbers its steps one later
            Self::CreateCcFileIso => 0x12316,
            Self::WriteCcIso => 0x12317,
            Self::CreateNdefFileIso => 0x12318,
            Self::ReadCc => 0x12320,
            Self::ReadNdef => 0x12326,
            Self::WriteNdefLengthPre => 0x12328,
            Self::WriteNdefPayload => 0x12330,
            Self::WriteNdefLengthPost => 0x12331,
        }
    }

    /// Short description of the step
    pub const fn description(self) -> &'static str {
        match self {
            Self::GetVersion => "get version",
            Self::GetKeySettings => "get key settings",
            Self::GetKeyVersion => "get key version",
            Self::FreeMemory => "free memory",
            Self::Authenticate => "authenticate",
            Self::ChangeKeySettings => "change key settings",
            Self::FormatPicc => "format picc",
            Self::SelectApplication => "select application",
            Self::CreateApplication => "create application",
            Self::CreateCcFile => "create capability container file",
            Self::WriteCc => "write capability container",
            Self::CreateNdefFile => "create ndef file",
            Self::CreateCcFileIso => "create iso capability container file",
            Self::WriteCcIso => "write iso capability container",
            Self::CreateNdefFileIso => "create iso ndef file",
            Self::ReadCc => "read capability container",
            Self::ReadNdef => "read ndef",
            Self::WriteNdefLengthPre => "clear ndef length",
            Self::WriteNdefPayload => "write ndef payload",
            Self::WriteNdefLengthPost => "write ndef length",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, rejected before touching the device
    InvalidArgument,
    /// The card handle was released
    SessionClosed,
    /// The tag could not be connected
    ConnectFailed,
    /// A retryable driver failure that persisted through every attempt
    DriverTransient,
    /// A driver failure that is not retried
    DriverFatal,
    /// Card contents violate the NDEF mapping
    ProtocolMalformed,
    /// Reader or reader stack failure
    Transport,
}

/// Errors raised by card operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The card handle has been freed
    #[error("Card is already free")]
    CardFreed,

    /// Argument rejected before any device access
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connecting to the tag failed
    #[error("Can't connect to Mifare DESFire target: {message}")]
    ConnectFailed {
        /// Code reported by the driver
        driver_error: u32,
        /// Driver description
        message: String,
    },

    /// A driver call failed with a non-retryable error
    #[error("{step} failed: {message}")]
    Driver {
        /// Failing step
        step: Step,
        /// Code reported by the driver
        driver_error: u32,
        /// Driver description
        message: String,
    },

    /// A driver call kept failing with a retryable error
    #[error("{step} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Failing step
        step: Step,
        /// Attempts made
        attempts: u32,
        /// Code reported by the last attempt
        driver_error: u32,
        /// Driver description of the last attempt
        message: String,
    },

    /// Master key settings cannot be read without authentication
    #[error("Master key settings are locked")]
    Locked,

    /// The capability container is shorter than 15 bytes
    #[error("Capability container too short ({0} bytes)")]
    ShortContainer(usize),

    /// No NDEF file control TLV in the capability container
    #[error("End of capability container reached without finding the ndef TLV")]
    TlvNotFound,

    /// The NDEF file control TLV points to an unknown file
    #[error("Found unknown ndef file reference {0:#06X}")]
    UnknownNdefReference(u16),

    /// Stored NDEF length exceeds the file capacity
    #[error("Declared ndef size {declared} larger than max ndef size {max_length}")]
    DeclaredTooLarge {
        /// Length stored on the card
        declared: u16,
        /// Capacity from the capability container
        max_length: u16,
    },

    /// Stored NDEF length is zero, the previous write did not complete
    #[error("Declared ndef size is zero, last write was faulty")]
    ZeroLength,

    /// Supplied NDEF payload exceeds the file capacity
    #[error("Supplied ndef size {len} larger than max ndef size {max_length}")]
    TooLarge {
        /// Payload length
        len: usize,
        /// Capacity from the capability container
        max_length: u16,
    },

    /// Fewer bytes read than requested
    #[error("Read {actual} of {expected} bytes")]
    IncompleteRead {
        /// Requested length
        expected: usize,
        /// Bytes returned
        actual: usize,
    },

    /// Fewer bytes written than supplied
    #[error("Wrote {actual} of {expected} bytes")]
    IncompleteWrite {
        /// Supplied length
        expected: usize,
        /// Bytes accepted
        actual: usize,
    },

    /// Reader level failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Stable numeric code, identifying the failing operation step
    pub const fn code(&self) -> u32 {
        match self {
            Self::Transport(_) => 0x12300,
            Self::CardFreed => 0x12301,
            Self::InvalidArgument(_) => 0x12302,
            Self::ConnectFailed { .. } => 0x12303,
            Self::Driver { step, .. } | Self::RetriesExhausted { step, .. } => step.code(),
            Self::Locked => 0x12307,
            Self::ShortContainer(_) => 0x12321,
            Self::TlvNotFound => 0x12323,
            Self::UnknownNdefReference(_) => 0x12324,
            Self::DeclaredTooLarge { .. } | Self::TooLarge { .. } => 0x12327,
            Self::IncompleteRead { .. } | Self::IncompleteWrite { .. } => 0x12329,
            Self::ZeroLength => 0x12332,
        }
    }

    /// Classification of this error
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CardFreed => ErrorKind::SessionClosed,
            Self::InvalidArgument(_) | Self::TooLarge { .. } => ErrorKind::InvalidArgument,
            Self::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            Self::RetriesExhausted { .. } => ErrorKind::DriverTransient,
            Self::Driver { .. } | Self::Locked => ErrorKind::DriverFatal,
            Self::ShortContainer(_)
            | Self::TlvNotFound
            | Self::UnknownNdefReference(_)
            | Self::DeclaredTooLarge { .. }
            | Self::ZeroLength
            | Self::IncompleteRead { .. }
            | Self::IncompleteWrite { .. } => ErrorKind::ProtocolMalformed,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Code reported by the driver, when the failure came from it
    pub const fn driver_error(&self) -> Option<u32> {
        match self {
            Self::ConnectFailed { driver_error, .. }
            | Self::Driver { driver_error, .. }
            | Self::RetriesExhausted { driver_error, .. } => Some(*driver_error),
            _ => None,
        }
    }

    /// Serializable summary of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            kind: self.kind(),
            message: self.to_string(),
            driver_error: self.driver_error(),
        }
    }
}

/// Flat, serializable description of an [`Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Stable step code
    pub code: u32,
    /// Classification
    pub kind: ErrorKind,
    /// Human readable message
    pub message: String,
    /// Driver code, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_error: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_step() {
        let err = Error::Driver {
            step: Step::Authenticate,
            driver_error: 0xAE,
            message: "AUTHENTICATION_ERROR".into(),
        };
        assert_eq!(err.code(), 0x12310);
        assert_eq!(err.kind(), ErrorKind::DriverFatal);
        assert_eq!(err.driver_error(), Some(0xAE));

        let err = Error::RetriesExhausted {
            step: Step::ReadNdef,
            attempts: 3,
            driver_error: 0x1C,
            message: "ILLEGAL_COMMAND_CODE".into(),
        };
        assert_eq!(err.code(), 0x12326);
        assert_eq!(err.kind(), ErrorKind::DriverTransient);
    }

    #[test]
    fn test_protocol_errors() {
        assert_eq!(Error::ShortContainer(14).code(), 0x12321);
        assert_eq!(Error::TlvNotFound.code(), 0x12323);
        assert_eq!(Error::ZeroLength.code(), 0x12332);
        assert_eq!(
            Error::TooLarge { len: 10, max_length: 4 }.code(),
            Error::DeclaredTooLarge { declared: 10, max_length: 4 }.code()
        );
        assert_eq!(Error::ZeroLength.kind(), ErrorKind::ProtocolMalformed);
        assert_eq!(Error::CardFreed.kind(), ErrorKind::SessionClosed);
    }

    #[test]
    fn test_report_serializes() {
        let report = Error::ConnectFailed {
            driver_error: 0x8010_000C,
            message: "SCARD_E_NO_SMARTCARD".into(),
        }
        .report();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["code"], 0x12303);
        assert_eq!(json["kind"], "connect_failed");
        assert_eq!(json["driverError"], 0x8010_000C_u32);

        let json = serde_json::to_value(Error::TlvNotFound.report()).unwrap();
        assert!(json.get("driverError").is_none());
    }
}
