//! ATR and response helpers

use mifare_core::driver::TagKind;

/// PC/SC pseudo APDU returning the UID of the tag in the field
pub const GET_UID: [u8; 5] = [0xFF, 0xCA, 0x00, 0x00, 0x00];

/// ATR reported by contactless readers for an ISO 14443-4 DESFire tag
const DESFIRE_ATR: [u8; 6] = [0x3B, 0x81, 0x80, 0x01, 0x80, 0x80];

/// Header of the PC/SC part 3 ATR built for storage cards
const STORAGE_ATR_HEADER: [u8; 12] =
    [0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03, 0x06];

/// Check whether `atr` matches `pattern`, comparing only the bits set in `mask`
///
/// Without a mask every byte is compared. `atr` may be longer than the
/// pattern; a mask shorter than the pattern never matches.
pub fn match_atr(atr: &[u8], pattern: &[u8], mask: Option<&[u8]>) -> bool {
    if atr.len() < pattern.len() {
        return false;
    }
    match mask {
        Some(mask) if mask.len() < pattern.len() => false,
        Some(mask) => {
            pattern.iter().zip(atr).zip(mask).all(|((p, a), m)| (p & m) == (a & m))
        }
        None => atr.starts_with(pattern),
    }
}

/// Tag family and product name derived from an ATR
pub fn classify_atr(atr: &[u8]) -> (TagKind, &'static str) {
    if atr == DESFIRE_ATR.as_slice() {
        return (TagKind::Desfire, "Mifare DESFire");
    }
    if match_atr(atr, &STORAGE_ATR_HEADER, None) && atr.len() >= 15 {
        // card name follows the standard byte
        return match [atr[13], atr[14]] {
            [0x00, 0x01] => (TagKind::Classic, "Mifare Classic 1K"),
            [0x00, 0x02] => (TagKind::Classic, "Mifare Classic 4K"),
            [0x00, 0x03] => (TagKind::Ultralight, "Mifare Ultralight"),
            [0x00, 0x26] => (TagKind::Classic, "Mifare Mini"),
            _ => (TagKind::Other, "Unknown storage card"),
        };
    }
    (TagKind::Other, "Unknown tag")
}

/// Split a response into its data and status word
pub fn split_status(response: &[u8]) -> Option<(&[u8], u16)> {
    let (data, sw) = response.split_at_checked(response.len().checked_sub(2)?)?;
    Some((data, u16::from_be_bytes([sw[0], sw[1]])))
}

/// UID carried by a GET UID response, when the reader answered `90 00`
pub fn parse_uid_response(response: &[u8]) -> Option<&[u8]> {
    match split_status(response)? {
        (uid, 0x9000) if !uid.is_empty() => Some(uid),
        _ => None,
    }
}
