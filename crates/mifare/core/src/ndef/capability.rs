//! NDEF capability container

use serde::Serialize;

use crate::{Error, Result, driver::Aid};

/// Minimum length of a capability container
pub const CC_MIN_LEN: usize = 15;
/// Fixed header before the first TLV
const CC_HEADER_LEN: usize = 7;
/// Tag of the NDEF file control TLV
const NDEF_FILE_CONTROL_TLV: u8 = 0x04;
/// High byte of every NDEF file identifier
const NDEF_FILE_ID_PREFIX: u8 = 0xE1;
/// NDEF file number in mapping version 2
const NDEF_FILE_NO_V2: u8 = 0x02;

/// NDEF mapping version of a DESFire card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MappingVersion {
    /// Legacy mapping, used by cards with software major version 0
    V1,
    /// Current mapping, with ISO file identifiers
    V2,
}

impl MappingVersion {
    /// Mapping used for a card reporting `major` as its software version
    pub const fn from_software_major(major: u8) -> Self {
        if major == 0 { Self::V1 } else { Self::V2 }
    }

    /// Application holding the NDEF files
    pub const fn aid(self) -> Aid {
        match self {
            Self::V1 => Aid::NDEF_V1,
            Self::V2 => Aid::NDEF_V2,
        }
    }

    /// File number of the capability container
    pub const fn cc_file_no(self) -> u8 {
        match self {
            Self::V1 => 0x03,
            Self::V2 => 0x01,
        }
    }

    /// Version byte written into the capability container
    pub const fn cc_version(self) -> u8 {
        match self {
            Self::V1 => 0x10,
            Self::V2 => 0x20,
        }
    }
}

/// Location and capacity of the NDEF file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NdefFile {
    /// DESFire file number
    pub file_no: u8,
    /// Maximum NDEF size, including the two byte length prefix
    pub max_length: u16,
}

/// Length a capability container declares in its first two bytes
pub fn declared_len(prefix: &[u8]) -> Result<usize> {
    let [hi, lo, ..] = *prefix else {
        return Err(Error::ShortContainer(prefix.len()));
    };
    let len = usize::from(u16::from_be_bytes([hi, lo]));
    if len < CC_MIN_LEN {
        return Err(Error::ShortContainer(len));
    }
    Ok(len)
}

/// Find the NDEF file control TLV in a complete capability container
pub fn parse(cc: &[u8], mapping: MappingVersion) -> Result<NdefFile> {
    let cclen = declared_len(cc)?;
    if cc.len() < cclen {
        return Err(Error::IncompleteRead { expected: cclen, actual: cc.len() });
    }

    let mut off = CC_HEADER_LEN;
    while off + 7 < cclen && cc[off] != NDEF_FILE_CONTROL_TLV {
        off += usize::from(cc[off + 1]) + 2;
    }
    if off + 7 >= cclen {
        return Err(Error::TlvNotFound);
    }

    let file_id = u16::from_be_bytes([cc[off + 2], cc[off + 3]]);
    if cc[off + 2] != NDEF_FILE_ID_PREFIX {
        return Err(Error::UnknownNdefReference(file_id));
    }

    let file_no = match mapping {
        MappingVersion::V1 => cc[off + 3],
        MappingVersion::V2 => NDEF_FILE_NO_V2,
    };
    Ok(NdefFile { file_no, max_length: u16::from_be_bytes([cc[off + 4], cc[off + 5]]) })
}

/// Capability container announcing an NDEF file of `max_length` bytes
pub const fn build(mapping: MappingVersion, max_length: u16) -> [u8; CC_MIN_LEN] {
    let [hi, lo] = max_length.to_be_bytes();
    [
        0x00, 0x0F, // CCLEN
        mapping.cc_version(),
        0x00, 0x3B, // MLe
        0x00, 0x34, // MLc
        NDEF_FILE_CONTROL_TLV, 0x06,
        NDEF_FILE_ID_PREFIX, 0x04, // file id
        hi, lo,
        0x00, // read access
        0x00, // write access
    ]
}

/// NDEF file size for a card announcing `storage_size`
pub const fn capacity_for_storage(storage_size: u8) -> u16 {
    let announced = match 1u32.checked_shl((storage_size >> 1) as u32) {
        Some(size) => size,
        None => u32::MAX,
    };
    if announced >= 0x1E00 {
        0x1E00
    } else if announced >= 0x1000 {
        0x1000
    } else {
        0x0800
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_container_rejected() {
        let mut cc = build(MappingVersion::V2, 0x1000).to_vec();
        cc[1] = 14;
        assert!(matches!(parse(&cc, MappingVersion::V2), Err(Error::ShortContainer(14))));
        assert!(matches!(declared_len(&[0x00]), Err(Error::ShortContainer(1))));
    }

    #[test]
    fn test_minimal_container() {
        let cc = build(MappingVersion::V2, 0x1000);
        let file = parse(&cc, MappingVersion::V2).unwrap();
        assert_eq!(file, NdefFile { file_no: 2, max_length: 0x1000 });

        let cc = build(MappingVersion::V1, 0x0EE0);
        assert_eq!(&cc[..], &[
            0x00, 0x0F, 0x10, 0x00, 0x3B, 0x00, 0x34, 0x04, 0x06, 0xE1, 0x04, 0x0E, 0xE0, 0x00,
            0x00
        ]);
        let file = parse(&cc, MappingVersion::V1).unwrap();
        assert_eq!(file, NdefFile { file_no: 4, max_length: 0x0EE0 });
    }

    #[test]
    fn test_tlv_after_other_tlv() {
        // proprietary TLV of two bytes ahead of the NDEF TLV
        let mut cc = vec![0x00, 0x13, 0x20, 0x00, 0x3B, 0x00, 0x34, 0x05, 0x02, 0xAA, 0xBB];
        cc.extend_from_slice(&[0x04, 0x06, 0xE1, 0x04, 0x08, 0x00, 0x00, 0x00]);
        let file = parse(&cc, MappingVersion::V1).unwrap();
        assert_eq!(file, NdefFile { file_no: 4, max_length: 0x0800 });
    }

    #[test]
    fn test_tlv_beyond_declared_length() {
        let mut cc = vec![0x00, 0x0F, 0x20, 0x00, 0x3B, 0x00, 0x34, 0x05, 0x00];
        cc.extend_from_slice(&[0x04, 0x06, 0xE1, 0x04, 0x08, 0x00, 0x00, 0x00]);
        assert!(matches!(parse(&cc, MappingVersion::V2), Err(Error::TlvNotFound)));
    }

    #[test]
    fn test_unknown_file_reference() {
        let mut cc = build(MappingVersion::V2, 0x1000);
        cc[9] = 0xE2;
        assert!(matches!(
            parse(&cc, MappingVersion::V2),
            Err(Error::UnknownNdefReference(0xE204))
        ));
    }

    #[test]
    fn test_capacity_for_storage() {
        assert_eq!(capacity_for_storage(0x16), 0x0800);
        assert_eq!(capacity_for_storage(0x18), 0x1000);
        assert_eq!(capacity_for_storage(0x1A), 0x1E00);
        assert_eq!(capacity_for_storage(0xFF), 0x1E00);
    }

    #[test]
    fn test_mapping_from_version() {
        assert_eq!(MappingVersion::from_software_major(0), MappingVersion::V1);
        assert_eq!(MappingVersion::from_software_major(1), MappingVersion::V2);
        assert_eq!(MappingVersion::V1.aid(), Aid::NDEF_V1);
        assert_eq!(MappingVersion::V2.cc_file_no(), 1);
    }
}
