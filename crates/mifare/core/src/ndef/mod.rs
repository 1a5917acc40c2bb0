//! NDEF storage on DESFire cards
//!
//! The NDEF file starts with a two byte big endian length followed by the
//! message. Writes clear the length first and set it last, so an
//! interrupted write leaves a zero length behind instead of a truncated
//! message that looks valid.

pub mod capability;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    Error, Result, Step,
    driver::{CardDriver, DesfireKey},
    session::CardSession,
    transport::CardTransport,
};

pub use capability::{MappingVersion, NdefFile};

/// Size of the length prefix of the NDEF file
const LEN_PREFIX: usize = 2;

/// An NDEF message read from a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NdefMessage {
    /// Raw NDEF message bytes
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    /// Capacity of the NDEF file
    pub max_length: u16,
}

mod hex_bytes {
    pub(super) fn serialize<S: serde::Serializer>(
        bytes: &[u8],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}

/// Where the NDEF file of a card lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NdefLocation {
    /// Mapping version of the card
    pub mapping: MappingVersion,
    /// NDEF file
    pub file: NdefFile,
}

/// Finds the NDEF file through the capability container
#[derive(Debug, Clone, Default)]
pub struct NdefLocator {
    key: DesfireKey,
}

impl NdefLocator {
    /// Authenticate to the NDEF application with `key`
    pub const fn new(key: DesfireKey) -> Self {
        Self { key }
    }

    /// Select the NDEF application, authenticate and parse the capability container
    ///
    /// Leaves the NDEF application selected and authenticated.
    #[instrument(level = "debug", skip_all)]
    pub fn locate<T: CardTransport>(&self, session: &CardSession<'_, T>) -> Result<NdefLocation> {
        let version = session.retry(Step::GetVersion, |tag| tag.get_version())?;
        let mapping = MappingVersion::from_software_major(version.software.version_major);
        let cc_file = mapping.cc_file_no();

        session.retry(Step::SelectApplication, |tag| tag.select_application(Some(mapping.aid())))?;
        session.retry(Step::Authenticate, |tag| tag.authenticate(0, &self.key))?;

        let prefix = session.retry(Step::ReadCc, |tag| tag.read_data(cc_file, 0, LEN_PREFIX))?;
        if prefix.len() > LEN_PREFIX {
            return Err(Error::IncompleteRead { expected: LEN_PREFIX, actual: prefix.len() });
        }
        let cclen = capability::declared_len(&prefix)?;

        let cc = session.retry(Step::ReadCc, |tag| tag.read_data(cc_file, 0, cclen))?;
        let file = capability::parse(&cc, mapping)?;
        debug!(?mapping, file_no = file.file_no, max_length = file.max_length, "Located ndef file");

        Ok(NdefLocation { mapping, file })
    }
}

/// Read the NDEF message
#[instrument(level = "debug", skip_all)]
pub fn read<T: CardTransport>(
    session: &CardSession<'_, T>,
    locator: &NdefLocator,
) -> Result<NdefMessage> {
    let NdefFile { file_no, max_length } = locator.locate(session)?.file;

    let prefix = session.retry(Step::ReadNdef, |tag| tag.read_data(file_no, 0, LEN_PREFIX))?;
    let [hi, lo] = prefix[..] else {
        return Err(Error::IncompleteRead { expected: LEN_PREFIX, actual: prefix.len() });
    };
    let declared = u16::from_be_bytes([hi, lo]);

    if usize::from(declared) + LEN_PREFIX > usize::from(max_length) {
        return Err(Error::DeclaredTooLarge { declared, max_length });
    }
    if declared == 0 {
        return Err(Error::ZeroLength);
    }

    let len = usize::from(declared);
    let payload = session.retry(Step::ReadNdef, |tag| tag.read_data(file_no, LEN_PREFIX as u32, len))?;
    if payload.len() != len {
        return Err(Error::IncompleteRead { expected: len, actual: payload.len() });
    }

    debug!(len, max_length, "Read ndef message");
    Ok(NdefMessage { payload, max_length })
}

/// Replace the NDEF message
///
/// Returns the capacity of the NDEF file.
#[instrument(level = "debug", skip_all, fields(len = payload.len()))]
pub fn write<T: CardTransport>(
    session: &CardSession<'_, T>,
    locator: &NdefLocator,
    payload: &[u8],
) -> Result<u16> {
    let NdefFile { file_no, max_length } = locator.locate(session)?.file;
    // the length prefix shares the file with the message
    if payload.len() + LEN_PREFIX > usize::from(max_length) {
        return Err(Error::TooLarge { len: payload.len(), max_length });
    }
    let len = payload.len() as u16;

    session.retry(Step::WriteNdefLengthPre, |tag| tag.write_data(file_no, 0, &[0, 0]))?;

    let written =
        session.retry(Step::WriteNdefPayload, |tag| tag.write_data(file_no, LEN_PREFIX as u32, payload))?;
    if written != payload.len() {
        return Err(Error::IncompleteWrite { expected: payload.len(), actual: written });
    }

    session.retry(Step::WriteNdefLengthPost, |tag| tag.write_data(file_no, 0, &len.to_be_bytes()))?;

    debug!(len, max_length, "Wrote ndef message");
    Ok(max_length)
}
