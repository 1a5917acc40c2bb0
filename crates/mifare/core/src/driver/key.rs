//! DESFire key material

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

/// Cipher family of a DESFire key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Single DES, 8 bytes
    Des,
    /// Two-key triple DES, 16 bytes
    #[serde(rename = "3des")]
    TripleDes,
    /// Three-key triple DES, 24 bytes
    #[serde(rename = "3k3des")]
    ThreeKeyTripleDes,
    /// AES-128, 16 bytes
    Aes,
}

impl KeyKind {
    /// Number of key bytes expected for this kind
    pub const fn key_len(self) -> usize {
        match self {
            Self::Des => 8,
            Self::TripleDes | Self::Aes => 16,
            Self::ThreeKeyTripleDes => 24,
        }
    }

    /// Short name, as accepted by [`FromStr`]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Des => "des",
            Self::TripleDes => "3des",
            Self::ThreeKeyTripleDes => "3k3des",
            Self::Aes => "aes",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "des" => Ok(Self::Des),
            "3des" => Ok(Self::TripleDes),
            "3k3des" => Ok(Self::ThreeKeyTripleDes),
            "aes" => Ok(Self::Aes),
            other => Err(Error::InvalidArgument(format!(
                "unknown key type '{other}', expected des, 3des, 3k3des or aes"
            ))),
        }
    }
}

/// A DESFire key together with its version information
///
/// The key bytes are wiped when the key is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DesfireKey {
    #[zeroize(skip)]
    kind: KeyKind,
    material: Vec<u8>,
    #[zeroize(skip)]
    versioned: bool,
    #[zeroize(skip)]
    aes_version: u8,
}

impl DesfireKey {
    /// Build a key, checking the length of `material` against `kind`
    ///
    /// For DES family keys `versioned` keeps the version bits stored in the
    /// parity bits. `aes_version` only applies to AES keys and defaults to 0.
    pub fn new(
        kind: KeyKind,
        material: &[u8],
        versioned: bool,
        aes_version: Option<u8>,
    ) -> Result<Self> {
        if material.len() != kind.key_len() {
            return Err(Error::InvalidArgument(format!(
                "{kind} key must be {} bytes, got {}",
                kind.key_len(),
                material.len()
            )));
        }

        Ok(Self {
            kind,
            material: material.to_vec(),
            versioned,
            aes_version: match kind {
                KeyKind::Aes => aes_version.unwrap_or(0),
                _ => 0,
            },
        })
    }

    /// The factory default PICC key: eight zero bytes of single DES
    pub fn default_des() -> Self {
        Self {
            kind: KeyKind::Des,
            material: vec![0; KeyKind::Des.key_len()],
            versioned: true,
            aes_version: 0,
        }
    }

    /// Cipher family
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Raw key bytes
    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Whether DES version bits are kept in the key
    pub const fn is_versioned(&self) -> bool {
        self.versioned
    }

    /// AES key version, 0 for DES family keys
    pub const fn aes_version(&self) -> u8 {
        self.aes_version
    }
}

impl Default for DesfireKey {
    fn default() -> Self {
        Self::default_des()
    }
}

impl fmt::Debug for DesfireKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesfireKey")
            .field("kind", &self.kind)
            .field("material", &"<redacted>")
            .field("versioned", &self.versioned)
            .field("aes_version", &self.aes_version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths_are_enforced() {
        assert!(DesfireKey::new(KeyKind::Des, &[0; 8], true, None).is_ok());
        assert!(DesfireKey::new(KeyKind::TripleDes, &[0; 16], false, None).is_ok());
        assert!(DesfireKey::new(KeyKind::ThreeKeyTripleDes, &[0; 24], false, None).is_ok());
        assert!(DesfireKey::new(KeyKind::Aes, &[0; 16], false, Some(3)).is_ok());

        let err = DesfireKey::new(KeyKind::Des, &[0; 16], true, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = DesfireKey::new(KeyKind::Aes, &[0; 24], false, None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_aes_version_only_kept_for_aes() {
        let key = DesfireKey::new(KeyKind::Aes, &[1; 16], false, Some(7)).unwrap();
        assert_eq!(key.aes_version(), 7);

        let key = DesfireKey::new(KeyKind::TripleDes, &[1; 16], false, Some(7)).unwrap();
        assert_eq!(key.aes_version(), 0);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("des".parse::<KeyKind>().unwrap(), KeyKind::Des);
        assert_eq!("3des".parse::<KeyKind>().unwrap(), KeyKind::TripleDes);
        assert_eq!("3k3des".parse::<KeyKind>().unwrap(), KeyKind::ThreeKeyTripleDes);
        assert_eq!("aes".parse::<KeyKind>().unwrap(), KeyKind::Aes);
        assert!("rsa".parse::<KeyKind>().is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let key = DesfireKey::new(KeyKind::Des, &[0xAB; 8], true, None).unwrap();
        let shown = format!("{key:?}");
        assert!(!shown.contains("171"));
        assert!(shown.contains("redacted"));
    }
}
