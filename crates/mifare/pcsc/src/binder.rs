//! Binding discovered tags to a card protocol driver
//!
//! Scanning a PC/SC reader yields the UID and ATR of the tag in the field.
//! The DESFire command set lives in an external driver; a [`TagBinder`]
//! turns each discovered [`PcscTarget`] into that driver's tag handle.
//! [`PresenceOnly`] is the built-in binder: its [`PcscTag`] handles connect
//! and disconnect through PC/SC and report every DESFire command as
//! unsupported.

use std::{
    ffi::CString,
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use mifare_core::driver::{
    Aid, CardDriver, CommMode, DesfireKey, DriverResult, Status, TagKind, VersionInfo, codes,
};
use parking_lot::Mutex;
use pcsc::{Card, Context, Disposition};
use tracing::{trace, warn};

use crate::config::PcscConfig;

/// A tag found in the field of a PC/SC reader
#[derive(Clone)]
pub struct PcscTarget {
    context: Context,
    reader: CString,
    uid: String,
    atr: Vec<u8>,
    kind: TagKind,
    friendly_name: &'static str,
    config: PcscConfig,
}

impl PcscTarget {
    pub(crate) const fn new(
        context: Context,
        reader: CString,
        uid: String,
        atr: Vec<u8>,
        (kind, friendly_name): (TagKind, &'static str),
        config: PcscConfig,
    ) -> Self {
        Self { context, reader, uid, atr, kind, friendly_name, config }
    }

    /// Name of the reader holding the tag
    pub fn reader(&self) -> &str {
        self.reader.to_str().unwrap_or_default()
    }

    /// Hex encoded UID
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Answer to reset
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Tag family derived from the ATR
    pub const fn kind(&self) -> TagKind {
        self.kind
    }

    /// Product name derived from the ATR
    pub const fn friendly_name(&self) -> &'static str {
        self.friendly_name
    }

    /// Connection settings of the transport that found the tag
    pub const fn config(&self) -> PcscConfig {
        self.config
    }

    /// Open a PC/SC connection to the tag with the configured share mode
    pub fn connect(&self) -> Result<Card, pcsc::Error> {
        self.config.connect(&self.context, &self.reader)
    }
}

impl fmt::Debug for PcscTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTarget")
            .field("reader", &self.reader)
            .field("uid", &self.uid)
            .field("atr", &hex::encode_upper(&self.atr))
            .field("kind", &self.kind)
            .finish()
    }
}

/// Produces the driver handle for each discovered tag
pub trait TagBinder: Send + Sync + fmt::Debug + 'static {
    /// Driver handle type
    type Tag: CardDriver + 'static;

    /// Wrap `target` in a driver handle
    fn bind(&self, target: PcscTarget) -> Self::Tag;
}

/// Binder for presence detection without a DESFire driver
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceOnly;

impl TagBinder for PresenceOnly {
    type Tag = PcscTag;

    fn bind(&self, target: PcscTarget) -> PcscTag {
        PcscTag::new(target)
    }
}

/// Tag handle that manages the PC/SC connection only
pub struct PcscTag {
    target: PcscTarget,
    card: Mutex<Option<Card>>,
    last_error: AtomicU32,
}

impl PcscTag {
    /// Handle for `target`, initially disconnected
    pub const fn new(target: PcscTarget) -> Self {
        Self { target, card: Mutex::new(None), last_error: AtomicU32::new(0) }
    }

    /// The discovered tag
    pub const fn target(&self) -> &PcscTarget {
        &self.target
    }

    /// Whether a PC/SC connection is open
    pub fn is_connected(&self) -> bool {
        self.card.lock().is_some()
    }

    fn fail<T>(&self, code: u32) -> DriverResult<T> {
        self.last_error.store(code, Ordering::Relaxed);
        Err(Status::FAILED)
    }

    fn unsupported<T>(&self, command: &str) -> DriverResult<T> {
        trace!(uid = %self.target.uid, command, "Command not supported by presence-only tag");
        self.fail(codes::SCARD_E_UNSUPPORTED_FEATURE)
    }
}

impl fmt::Debug for PcscTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTag")
            .field("target", &self.target)
            .field("connected", &self.is_connected())
            .field("last_error", &self.last_error())
            .finish()
    }
}

impl CardDriver for PcscTag {
    fn uid(&self) -> String {
        self.target.uid.clone()
    }

    fn kind(&self) -> TagKind {
        self.target.kind
    }

    fn friendly_name(&self) -> String {
        self.target.friendly_name.to_string()
    }

    fn connect(&self) -> DriverResult<()> {
        let mut card = self.card.lock();
        if card.is_some() {
            return Ok(());
        }
        match self.target.connect() {
            Ok(connected) => {
                trace!(uid = %self.target.uid, "Connected");
                *card = Some(connected);
                Ok(())
            }
            Err(e) => self.fail(e as u32),
        }
    }

    fn disconnect(&self) -> DriverResult<()> {
        let Some(card) = self.card.lock().take() else {
            return Ok(());
        };
        match card.disconnect(Disposition::LeaveCard) {
            Ok(()) => {
                trace!(uid = %self.target.uid, "Disconnected");
                Ok(())
            }
            Err((_, e)) => {
                warn!(uid = %self.target.uid, error = %e, "Disconnect failed");
                self.fail(e as u32)
            }
        }
    }

    fn last_error(&self) -> u32 {
        self.last_error.load(Ordering::Relaxed)
    }

    fn clear_error(&self) {
        self.last_error.store(0, Ordering::Relaxed);
    }

    fn error_string(&self) -> String {
        codes::describe(self.last_error()).to_string()
    }

    fn last_picc_error(&self) -> u8 {
        0
    }

    fn get_version(&self) -> DriverResult<VersionInfo> {
        self.unsupported("GetVersion")
    }

    fn get_key_settings(&self) -> DriverResult<(u8, u8)> {
        self.unsupported("GetKeySettings")
    }

    fn get_key_version(&self, _key_no: u8) -> DriverResult<u8> {
        self.unsupported("GetKeyVersion")
    }

    fn free_mem(&self) -> DriverResult<u32> {
        self.unsupported("FreeMemory")
    }

    fn select_application(&self, _aid: Option<Aid>) -> DriverResult<()> {
        self.unsupported("SelectApplication")
    }

    fn authenticate(&self, _key_no: u8, _key: &DesfireKey) -> DriverResult<()> {
        self.unsupported("Authenticate")
    }

    fn change_key_settings(&self, _settings: u8) -> DriverResult<()> {
        self.unsupported("ChangeKeySettings")
    }

    fn format_picc(&self) -> DriverResult<()> {
        self.unsupported("FormatPICC")
    }

    fn create_application(&self, _aid: Aid, _settings: u8, _key_count: u8) -> DriverResult<()> {
        self.unsupported("CreateApplication")
    }

    fn create_application_iso(
        &self,
        _aid: Aid,
        _settings: u8,
        _key_count: u8,
        _iso_file_id: u16,
        _df_name: &[u8],
    ) -> DriverResult<()> {
        self.unsupported("CreateApplication")
    }

    fn create_std_data_file(
        &self,
        _file_no: u8,
        _comm: CommMode,
        _access_rights: u16,
        _size: u32,
    ) -> DriverResult<()> {
        self.unsupported("CreateStdDataFile")
    }

    fn create_std_data_file_iso(
        &self,
        _file_no: u8,
        _comm: CommMode,
        _access_rights: u16,
        _size: u32,
        _iso_file_id: u16,
    ) -> DriverResult<()> {
        self.unsupported("CreateStdDataFile")
    }

    fn read_data(&self, _file_no: u8, _offset: u32, _len: usize) -> DriverResult<Vec<u8>> {
        self.unsupported("ReadData")
    }

    fn write_data(&self, _file_no: u8, _offset: u32, _data: &[u8]) -> DriverResult<usize> {
        self.unsupported("WriteData")
    }
}

impl Drop for PcscTag {
    fn drop(&mut self) {
        if let Some(card) = self.card.get_mut().take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}
