//! User facing DESFire card handle

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::{
    Error, Result, Step,
    driver::{Aid, CardDriver, DesfireKey, KeyKind, VersionInfo, codes},
    ndef::{self, MappingVersion, NdefLocator, NdefMessage},
    provision::{self, FormatOptions, MasterKeyInfo},
    reader::ReaderHandle,
    session::CardSession,
    tags::TagRef,
    transport::CardTransport,
};

struct CardState<T: CardTransport> {
    tag: TagRef<T::Tag>,
    aid: Aid,
    key: DesfireKey,
}

/// A DESFire card found by a presence scan
///
/// Every operation locks the reader, connects to the card, runs and then
/// disconnects again. The handle keeps the scanned tag batch alive until it
/// is [freed](Self::free) or dropped.
pub struct DesfireCard<T: CardTransport> {
    reader: Arc<ReaderHandle<T>>,
    state: Mutex<Option<CardState<T>>>,
}

impl<T: CardTransport> DesfireCard<T> {
    pub(crate) fn new(reader: Arc<ReaderHandle<T>>, tag: TagRef<T::Tag>) -> Self {
        Self {
            reader,
            state: Mutex::new(Some(CardState {
                tag,
                aid: Aid::NDEF_V2,
                key: DesfireKey::default_des(),
            })),
        }
    }

    /// Reader the card was found on
    pub const fn reader(&self) -> &Arc<ReaderHandle<T>> {
        &self.reader
    }

    fn tag(&self) -> Result<TagRef<T::Tag>> {
        self.state.lock().as_ref().map(|state| state.tag.clone()).ok_or(Error::CardFreed)
    }

    fn with_session<R>(&self, op: impl FnOnce(&CardSession<'_, T>) -> Result<R>) -> Result<R> {
        let tag = self.tag()?;
        let session = CardSession::acquire(&self.reader, tag.get())?;
        op(&session)
    }

    /// Hex encoded UID; needs no card access
    pub fn uid(&self) -> Result<String> {
        Ok(self.tag()?.get().uid())
    }

    /// Version, production and storage details
    pub fn info(&self) -> Result<VersionInfo> {
        self.with_session(|session| session.retry(Step::GetVersion, |tag| tag.get_version()))
    }

    /// Decoded PICC master key settings
    ///
    /// Fails with [`Error::Locked`] when the settings cannot be read without
    /// authenticating.
    pub fn master_key_info(&self) -> Result<MasterKeyInfo> {
        self.with_session(|session| {
            match session.retry(Step::GetKeySettings, |tag| tag.get_key_settings()) {
                Ok((settings, max_keys)) => Ok(MasterKeyInfo::from_settings(settings, max_keys)),
                Err(_) if u32::from(session.tag().last_picc_error()) == codes::AUTHENTICATION_ERROR => {
                    Err(Error::Locked)
                }
                Err(err) => Err(err),
            }
        })
    }

    /// Product name of the card
    pub fn name(&self) -> Result<String> {
        self.with_session(|session| Ok(session.tag().friendly_name()))
    }

    /// Version of key `key_no`
    pub fn key_version(&self, key_no: u8) -> Result<u8> {
        self.with_session(|session| {
            session.retry(Step::GetKeyVersion, |tag| tag.get_key_version(key_no))
        })
    }

    /// Free user memory in bytes
    pub fn free_memory(&self) -> Result<u32> {
        self.with_session(|session| session.retry(Step::FreeMemory, |tag| tag.free_mem()))
    }

    /// Remember an application identifier for this card
    pub fn set_aid(&self, aid: u32) -> Result<()> {
        let aid = Aid::new(aid).ok_or_else(|| {
            Error::InvalidArgument(format!("aid {aid:#X} does not fit in 24 bits"))
        })?;
        let mut state = self.state.lock();
        let state = state.as_mut().ok_or(Error::CardFreed)?;
        state.aid = aid;
        Ok(())
    }

    /// The remembered application identifier
    pub fn aid(&self) -> Result<Aid> {
        self.state.lock().as_ref().map(|state| state.aid).ok_or(Error::CardFreed)
    }

    /// Remember a key for this card, replacing and wiping the previous one
    ///
    /// `aes_version` only applies to AES keys.
    pub fn set_key(
        &self,
        material: &[u8],
        kind: KeyKind,
        versioned: bool,
        aes_version: Option<u8>,
    ) -> Result<()> {
        let key = DesfireKey::new(kind, material, versioned, aes_version)?;
        let mut state = self.state.lock();
        let state = state.as_mut().ok_or(Error::CardFreed)?;
        state.key = key;
        Ok(())
    }

    /// The remembered key
    pub fn key(&self) -> Result<DesfireKey> {
        self.state.lock().as_ref().map(|state| state.key.clone()).ok_or(Error::CardFreed)
    }

    /// Erase the card
    #[instrument(level = "debug", skip(self))]
    pub fn format(&self, options: FormatOptions) -> Result<()> {
        self.with_session(|session| provision::format(session, options))
    }

    /// Create the NDEF application on a formatted card
    pub fn create_ndef(&self) -> Result<MappingVersion> {
        self.with_session(provision::create_ndef)
    }

    /// Read the stored NDEF message
    pub fn read_ndef(&self) -> Result<NdefMessage> {
        self.with_session(|session| ndef::read(session, &NdefLocator::default()))
    }

    /// Replace the stored NDEF message, returning the file capacity
    pub fn write_ndef(&self, payload: &[u8]) -> Result<u16> {
        if payload.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidArgument(format!(
                "ndef of {} bytes exceeds the 16 bit length field",
                payload.len()
            )));
        }
        self.with_session(|session| ndef::write(session, &NdefLocator::default(), payload))
    }

    /// Release the card handle and its share of the tag batch
    ///
    /// Every later call fails with [`Error::CardFreed`].
    pub fn free(&self) -> Result<()> {
        let state = self.state.lock().take().ok_or(Error::CardFreed)?;
        debug!(uid = %state.tag.get().uid(), "Card freed");
        Ok(())
    }

    /// Whether [`free`](Self::free) was called
    pub fn is_free(&self) -> bool {
        self.state.lock().is_none()
    }
}

impl<T: CardTransport> fmt::Debug for DesfireCard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DesfireCard")
            .field("reader", &self.reader.name())
            .field("uid", &state.as_ref().map(|state| state.tag.get().uid()))
            .field("aid", &state.as_ref().map(|state| state.aid))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::MifareConfig,
        sim::{SimCard, SimField, SimTransport},
    };

    fn arrived(card: &SimCard) -> DesfireCard<SimTransport> {
        let field = SimField::new();
        field.insert(card);
        let reader = ReaderHandle::new(SimTransport::new("sim0", field), MifareConfig::default());
        reader.open().unwrap();
        reader.tick().into_iter().find_map(|event| event.into_card()).unwrap()
    }

    #[test]
    fn test_freed_card_rejects_everything() {
        let card = arrived(&SimCard::desfire("04112233445566"));
        card.free().unwrap();

        assert!(card.is_free());
        assert!(matches!(card.free(), Err(Error::CardFreed)));
        assert!(matches!(card.info(), Err(Error::CardFreed)));
        assert!(matches!(card.set_aid(1), Err(Error::CardFreed)));
        assert!(matches!(card.read_ndef(), Err(Error::CardFreed)));
        assert!(matches!(card.uid(), Err(Error::CardFreed)));
    }

    #[test]
    fn test_arguments_checked_before_device_access() {
        let sim = SimCard::desfire("04112233445567");
        let card = arrived(&sim);

        assert!(matches!(card.set_aid(0x100_0000), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            card.set_key(&[0; 8], KeyKind::Aes, false, None),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(card.write_ndef(&vec![0; 0x1_0000]), Err(Error::InvalidArgument(_))));
        assert_eq!(sim.calls(crate::sim::SimOp::Connect), 0);

        card.set_aid(0xFF_FFFF).unwrap();
        assert_eq!(card.aid().unwrap().value(), 0xFF_FFFF);
        card.set_key(&[7; 16], KeyKind::Aes, false, Some(2)).unwrap();
        assert_eq!(card.key().unwrap().aes_version(), 2);
    }

    #[test]
    fn test_queries() {
        let sim = SimCard::desfire("04112233445568");
        let card = arrived(&sim);

        let info = card.info().unwrap();
        assert_eq!(info.software.version_major, 1);
        assert_eq!(card.name().unwrap(), "Mifare DESFire");
        assert_eq!(card.key_version(0).unwrap(), 0);
        assert!(card.free_memory().unwrap() > 0);

        let master = card.master_key_info().unwrap();
        assert_eq!(master, MasterKeyInfo::from_settings(0x0F, 1));
        assert!(!sim.is_connected());
    }

    #[test]
    fn test_locked_master_key() {
        let sim = SimCard::desfire("04112233445569");
        sim.set_picc_key_settings(0x00);
        let card = arrived(&sim);

        assert!(matches!(card.master_key_info(), Err(Error::Locked)));
    }
}
