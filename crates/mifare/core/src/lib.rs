//! Session layer for MIFARE DESFire cards on contactless readers
//!
//! This crate turns a set of card readers into a stream of DESFire card
//! handles and gives each handle safe, serialized access to the card:
//!
//! - A background poller per reader reports arrivals, removals and scan
//!   failures through a callback or a channel
//! - Every card operation locks its reader, connects, retries transient
//!   failures a bounded number of times and disconnects again
//! - NDEF messages are read and written through the capability container
//!   of both DESFire NDEF mapping versions, and blank cards can be
//!   formatted and provisioned for NDEF
//!
//! The card protocol itself lives behind [`driver::CardDriver`]; readers
//! are plugged in through [`transport::CardTransport`]. The [`sim`] module
//! provides in-memory implementations of both.
//!
//! ```
//! use mifare_core::prelude::*;
//! use mifare_core::sim::{SimCard, SimField, SimTransport};
//!
//! let field = SimField::new();
//! field.insert(&SimCard::desfire("04a1b2c3d4e5f6"));
//! let reader = ReaderHandle::new(SimTransport::new("sim0", field), MifareConfig::default());
//! reader.open().unwrap();
//!
//! for event in reader.tick() {
//!     if let Some(card) = event.into_card() {
//!         card.format(FormatOptions::default()).unwrap();
//!         card.create_ndef().unwrap();
//!         card.write_ndef(b"hello").unwrap();
//!         assert_eq!(card.read_ndef().unwrap().payload, b"hello");
//!     }
//! }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod card;
pub mod config;
pub mod driver;
pub mod event;
mod listener;
pub mod ndef;
pub mod poller;
pub mod provision;
pub mod reader;
pub mod registry;
pub mod retry;
pub mod session;
pub mod sim;
pub mod tags;
pub mod transport;

mod error;
pub use error::{Error, ErrorKind, ErrorReport, Result, Step};

pub use card::DesfireCard;
pub use config::{MifareConfig, PollerConfig, SessionConfig};
pub use event::{PresenceEvent, PresenceHandler, ReaderEvent};
pub use reader::ReaderHandle;
pub use registry::ReaderRegistry;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Error, ErrorKind, Result,
        card::DesfireCard,
        config::{MifareConfig, PollerConfig, SessionConfig},
        driver::{Aid, CardDriver, KeyKind, TagKind, VersionInfo},
        event::{PresenceEvent, PresenceHandler, ReaderEvent, reader_event_channel},
        ndef::{MappingVersion, NdefMessage},
        poller::PresenceState,
        provision::{FormatOptions, MasterKeyInfo},
        reader::ReaderHandle,
        registry::ReaderRegistry,
        transport::{CardTransport, ReaderEnumerator, ScanError, TransportError},
    };
}
