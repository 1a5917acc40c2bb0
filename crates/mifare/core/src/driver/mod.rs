//! Boundary to the DESFire protocol driver
//!
//! The session layer never speaks the card protocol itself. Everything it
//! needs from a tag goes through [`CardDriver`], which mirrors the calling
//! convention of common DESFire driver libraries: each command returns a
//! [`Status`] on failure and the detailed cause is fetched afterwards with
//! [`CardDriver::last_error`].

pub mod codes;
mod key;

use std::fmt;

use serde::Serialize;

pub use key::{DesfireKey, KeyKind};

/// Negative status returned by a failing driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    /// Generic failure
    pub const FAILED: Self = Self(-1);
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver status {}", self.0)
    }
}

/// Result of a driver call
pub type DriverResult<T> = std::result::Result<T, Status>;

/// Family of a discovered tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKind {
    /// MIFARE DESFire
    Desfire,
    /// MIFARE Ultralight family
    Ultralight,
    /// MIFARE Classic family
    Classic,
    /// Anything else
    Other,
}

/// DESFire application identifier, 24 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Aid(u32);

impl Aid {
    /// The card level application
    pub const PICC: Self = Self(0);
    /// Application holding NDEF data for mapping version 1
    pub const NDEF_V1: Self = Self(0xEE_EE10);
    /// Application holding NDEF data for mapping version 2
    pub const NDEF_V2: Self = Self(0x00_0001);
    /// Largest valid identifier
    pub const MAX: u32 = 0xFF_FFFF;

    /// Wrap `value`, failing when it does not fit in 24 bits
    pub const fn new(value: u32) -> Option<Self> {
        if value > Self::MAX { None } else { Some(Self(value)) }
    }

    /// Numeric identifier
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Identifier as sent on the wire, least significant byte first
    pub const fn to_le_bytes(self) -> [u8; 3] {
        let bytes = self.0.to_le_bytes();
        [bytes[0], bytes[1], bytes[2]]
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

/// File communication settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommMode {
    /// Plain communication
    Plain,
    /// Plain communication secured by MAC
    Maced,
    /// Fully enciphered communication
    Enciphered,
}

/// Version block for one chip component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentVersion {
    /// Vendor id, 0x04 for NXP
    pub vendor_id: u8,
    /// Component type
    #[serde(rename = "type")]
    pub kind: u8,
    /// Component subtype
    pub subtype: u8,
    /// Major version
    pub version_major: u8,
    /// Minor version
    pub version_minor: u8,
    /// Storage size exponent, see [`VersionInfo::storage_bytes`]
    pub storage_size: u8,
    /// Communication protocol type
    pub protocol: u8,
}

/// Result of the GetVersion command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Seven byte UID
    #[serde(serialize_with = "serialize_hex")]
    pub uid: [u8; 7],
    /// Production batch number
    #[serde(serialize_with = "serialize_hex")]
    pub batch_number: [u8; 5],
    /// Calendar week of production
    pub production_week: u8,
    /// Year of production
    pub production_year: u8,
    /// Hardware component
    pub hardware: ComponentVersion,
    /// Software component
    pub software: ComponentVersion,
}

impl VersionInfo {
    /// Storage the card announces, in bytes
    ///
    /// The exponent encodes `2^(n >> 1)`; an odd exponent means the real
    /// size lies between that value and the next power of two.
    pub const fn storage_bytes(&self) -> u32 {
        match 1u32.checked_shl((self.software.storage_size >> 1) as u32) {
            Some(size) => size,
            None => u32::MAX,
        }
    }
}

fn serialize_hex<S: serde::Serializer>(
    bytes: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// A single tag as seen by the protocol driver
///
/// All calls take `&self`; implementations keep their connection state
/// behind interior mutability. Callers serialise access through the
/// reader lock, so no two calls for tags of the same reader overlap.
pub trait CardDriver: Send + Sync + fmt::Debug {
    /// Hex encoded UID of the tag
    fn uid(&self) -> String;

    /// Family of the tag
    fn kind(&self) -> TagKind;

    /// Human readable product name
    fn friendly_name(&self) -> String;

    /// Open a connection to the tag
    fn connect(&self) -> DriverResult<()>;

    /// Close the connection to the tag
    fn disconnect(&self) -> DriverResult<()>;

    /// Code of the most recent failure, 0 when none
    fn last_error(&self) -> u32;

    /// Reset the recorded failure
    fn clear_error(&self);

    /// Description of the most recent failure
    fn error_string(&self) -> String;

    /// PICC status byte of the most recent failure
    fn last_picc_error(&self) -> u8;

    /// GetVersion
    fn get_version(&self) -> DriverResult<VersionInfo>;

    /// GetKeySettings, returning the settings byte and the key count
    fn get_key_settings(&self) -> DriverResult<(u8, u8)>;

    /// GetKeyVersion
    fn get_key_version(&self, key_no: u8) -> DriverResult<u8>;

    /// FreeMemory
    fn free_mem(&self) -> DriverResult<u32>;

    /// SelectApplication; `None` selects the PICC level
    fn select_application(&self, aid: Option<Aid>) -> DriverResult<()>;

    /// Authenticate against key `key_no` of the selected application
    fn authenticate(&self, key_no: u8, key: &DesfireKey) -> DriverResult<()>;

    /// ChangeKeySettings for the selected application
    fn change_key_settings(&self, settings: u8) -> DriverResult<()>;

    /// FormatPICC
    fn format_picc(&self) -> DriverResult<()>;

    /// CreateApplication
    fn create_application(&self, aid: Aid, settings: u8, key_count: u8) -> DriverResult<()>;

    /// CreateApplication with ISO file identifier and DF name
    ///
    /// `key_count` already carries the key settings 2 flags.
    fn create_application_iso(
        &self,
        aid: Aid,
        settings: u8,
        key_count: u8,
        iso_file_id: u16,
        df_name: &[u8],
    ) -> DriverResult<()>;

    /// CreateStdDataFile
    fn create_std_data_file(
        &self,
        file_no: u8,
        comm: CommMode,
        access_rights: u16,
        size: u32,
    ) -> DriverResult<()>;

    /// CreateStdDataFile with ISO file identifier
    fn create_std_data_file_iso(
        &self,
        file_no: u8,
        comm: CommMode,
        access_rights: u16,
        size: u32,
        iso_file_id: u16,
    ) -> DriverResult<()>;

    /// ReadData; `len` of 0 reads to the end of the file
    fn read_data(&self, file_no: u8, offset: u32, len: usize) -> DriverResult<Vec<u8>>;

    /// WriteData, returning the number of bytes written
    fn write_data(&self, file_no: u8, offset: u32, data: &[u8]) -> DriverResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aid_range() {
        assert_eq!(Aid::new(0xFF_FFFF).map(Aid::value), Some(0xFF_FFFF));
        assert!(Aid::new(0x100_0000).is_none());
        assert_eq!(Aid::NDEF_V1.to_le_bytes(), [0x10, 0xEE, 0xEE]);
        assert_eq!(Aid::NDEF_V2.to_string(), "000001");
    }

    #[test]
    fn test_storage_bytes() {
        let mut version = VersionInfo::default();
        version.software.storage_size = 0x18;
        assert_eq!(version.storage_bytes(), 4096);
        version.software.storage_size = 0x1A;
        assert_eq!(version.storage_bytes(), 8192);
        version.software.storage_size = 0xFF;
        assert_eq!(version.storage_bytes(), u32::MAX);
    }
}
