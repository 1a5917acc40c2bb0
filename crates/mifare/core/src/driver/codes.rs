//! Status codes reported through [`CardDriver::last_error`](super::CardDriver::last_error)
//!
//! A driver reports one of three families of codes: DESFire PICC status
//! bytes, PC/SC `SCARD_*` codes from the reader stack, and plain `errno`
//! values from the host.

/// Successful operation
pub const OPERATION_OK: u32 = 0x00;
/// No changes done to backup files
pub const NO_CHANGES: u32 = 0x0C;
/// Insufficient NV-memory to complete the command
pub const OUT_OF_EEPROM_ERROR: u32 = 0x0E;
/// Command code not supported, usually seen when the card had too little time to settle
pub const ILLEGAL_COMMAND_CODE: u32 = 0x1C;
/// CRC or MAC does not match data
pub const INTEGRITY_ERROR: u32 = 0x1E;
/// Invalid key number specified
pub const NO_SUCH_KEY: u32 = 0x40;
/// Length of command string invalid
pub const LENGTH_ERROR: u32 = 0x7E;
/// Current configuration or status does not allow the command
pub const PERMISSION_DENIED: u32 = 0x9D;
/// Value of the parameter(s) invalid
pub const PARAMETER_ERROR: u32 = 0x9E;
/// Requested AID not present on the PICC
pub const APPLICATION_NOT_FOUND: u32 = 0xA0;
/// Current authentication status does not allow the command
pub const AUTHENTICATION_ERROR: u32 = 0xAE;
/// Attempt to read or write beyond the file's limits
pub const BOUNDARY_ERROR: u32 = 0xBE;
/// Previous command was not fully completed
pub const COMMAND_ABORTED: u32 = 0xCA;
/// File or application already exists
pub const DUPLICATE_ERROR: u32 = 0xDE;
/// Specified file number does not exist
pub const FILE_NOT_FOUND: u32 = 0xF0;

/// No such device or address; the tag handle lost its connection
pub const ENXIO: u32 = 6;

/// The supplied handle was invalid
pub const SCARD_E_INVALID_HANDLE: u32 = 0x8010_0003;
/// The user-specified time-out value has expired
pub const SCARD_E_TIMEOUT: u32 = 0x8010_000A;
/// Other connections to the card are outstanding
pub const SCARD_E_SHARING_VIOLATION: u32 = 0x8010_000B;
/// No smart card is currently in the device
pub const SCARD_E_NO_SMARTCARD: u32 = 0x8010_000C;
/// The reader or card is not ready to accept commands
pub const SCARD_E_NOT_READY: u32 = 0x8010_0010;
/// The specified reader is not currently available for use
pub const SCARD_E_READER_UNAVAILABLE: u32 = 0x8010_0017;
/// The card does not support the requested feature
pub const SCARD_E_UNSUPPORTED_FEATURE: u32 = 0x8010_0022;
/// The card has been removed
pub const SCARD_W_REMOVED_CARD: u32 = 0x8010_0069;

/// Whether a failed card command is worth repeating
///
/// Both codes show up when a freshly connected card is addressed before it
/// finished initialising.
pub const fn retryable_command(code: u32) -> bool {
    matches!(code, ILLEGAL_COMMAND_CODE | SCARD_E_NOT_READY)
}

/// Whether a failed connect is worth repeating after a pause
pub const fn retryable_connect(code: u32) -> bool {
    matches!(code, SCARD_E_SHARING_VIOLATION | SCARD_E_NOT_READY)
}

/// Symbolic name of a status code
pub const fn describe(code: u32) -> &'static str {
    match code {
        OPERATION_OK => "OPERATION_OK",
        ENXIO => "ENXIO",
        NO_CHANGES => "NO_CHANGES",
        OUT_OF_EEPROM_ERROR => "OUT_OF_EEPROM_ERROR",
        ILLEGAL_COMMAND_CODE => "ILLEGAL_COMMAND_CODE",
        INTEGRITY_ERROR => "INTEGRITY_ERROR",
        NO_SUCH_KEY => "NO_SUCH_KEY",
        LENGTH_ERROR => "LENGTH_ERROR",
        PERMISSION_DENIED => "PERMISSION_DENIED",
        PARAMETER_ERROR => "PARAMETER_ERROR",
        APPLICATION_NOT_FOUND => "APPLICATION_NOT_FOUND",
        AUTHENTICATION_ERROR => "AUTHENTICATION_ERROR",
        BOUNDARY_ERROR => "BOUNDARY_ERROR",
        COMMAND_ABORTED => "COMMAND_ABORTED",
        DUPLICATE_ERROR => "DUPLICATE_ERROR",
        FILE_NOT_FOUND => "FILE_NOT_FOUND",
        SCARD_E_INVALID_HANDLE => "SCARD_E_INVALID_HANDLE",
        SCARD_E_TIMEOUT => "SCARD_E_TIMEOUT",
        SCARD_E_SHARING_VIOLATION => "SCARD_E_SHARING_VIOLATION",
        SCARD_E_NO_SMARTCARD => "SCARD_E_NO_SMARTCARD",
        SCARD_E_NOT_READY => "SCARD_E_NOT_READY",
        SCARD_E_READER_UNAVAILABLE => "SCARD_E_READER_UNAVAILABLE",
        SCARD_E_UNSUPPORTED_FEATURE => "SCARD_E_UNSUPPORTED_FEATURE",
        SCARD_W_REMOVED_CARD => "SCARD_W_REMOVED_CARD",
        _ => "UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(retryable_command(ILLEGAL_COMMAND_CODE));
        assert!(retryable_command(SCARD_E_NOT_READY));
        assert!(!retryable_command(AUTHENTICATION_ERROR));
        assert!(!retryable_command(SCARD_E_SHARING_VIOLATION));

        assert!(retryable_connect(SCARD_E_SHARING_VIOLATION));
        assert!(!retryable_connect(ENXIO));
        assert!(!retryable_connect(SCARD_E_NO_SMARTCARD));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(0xAE), "AUTHENTICATION_ERROR");
        assert_eq!(describe(0x8010_000B), "SCARD_E_SHARING_VIOLATION");
        assert_eq!(describe(0x1234), "UNKNOWN_ERROR");
    }
}
