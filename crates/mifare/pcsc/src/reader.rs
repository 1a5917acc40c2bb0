//! Snapshot of a PC/SC reader and the tag in its field

use mifare_core::driver::TagKind;
use pcsc::{ReaderState, State};

use crate::util::classify_atr;

/// Reader status reported by the PC/SC service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    /// No tag in the field
    Empty,
    /// A tag is in the field
    Present,
    /// A tag is in the field and another application is connected to it
    InUse,
    /// A tag is in the field and another application holds it exclusively
    Exclusive,
    /// A tag is in the field but does not answer
    Mute,
    /// The reader is not usable
    Unavailable,
}

impl ReaderStatus {
    /// Status for a set of PC/SC event state flags
    pub fn from_state(state: State) -> Self {
        if state.intersects(State::UNAVAILABLE | State::UNKNOWN | State::IGNORE) {
            Self::Unavailable
        } else if !state.contains(State::PRESENT) || state.contains(State::EMPTY) {
            Self::Empty
        } else if state.contains(State::MUTE) {
            Self::Mute
        } else if state.contains(State::EXCLUSIVE) {
            Self::Exclusive
        } else if state.contains(State::INUSE) {
            Self::InUse
        } else {
            Self::Present
        }
    }

    /// Whether a tag is in the field
    pub const fn has_tag(self) -> bool {
        matches!(self, Self::Present | Self::InUse | Self::Exclusive | Self::Mute)
    }

    /// Short lower case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Present => "present",
            Self::InUse => "inuse",
            Self::Exclusive => "exclusive",
            Self::Mute => "mute",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A reader as seen by [`PcscDeviceManager::list_readers`](crate::PcscDeviceManager::list_readers)
#[derive(Debug, Clone)]
pub struct PcscReader {
    name: String,
    status: ReaderStatus,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    /// Reader `name` in `status`, with the ATR of its tag if any
    pub const fn new(name: String, status: ReaderStatus, atr: Option<Vec<u8>>) -> Self {
        Self { name, status, atr }
    }

    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reader status at the time of listing
    pub const fn status(&self) -> ReaderStatus {
        self.status
    }

    /// Whether a tag was in the field
    pub const fn has_card(&self) -> bool {
        self.status.has_tag()
    }

    /// ATR of the tag
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Family and product name of the tag
    pub fn tag(&self) -> Option<(TagKind, &'static str)> {
        self.atr().map(classify_atr)
    }

    pub(crate) fn from_reader_state(reader_state: &ReaderState) -> Self {
        let status = ReaderStatus::from_state(reader_state.event_state());
        let atr = status.has_tag().then(|| reader_state.atr().to_vec()).filter(|atr| !atr.is_empty());
        Self::new(reader_state.name().to_string_lossy().into_owned(), status, atr)
    }
}
