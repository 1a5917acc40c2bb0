//! PC/SC transport for MIFARE readers
//!
//! This crate provides an implementation of the `CardTransport` and
//! `ReaderEnumerator` traits from `mifare-core` on top of the PC/SC API.
//! Scanning a reader reads the UID of the tag in its field and classifies
//! it from its ATR; the DESFire command set is supplied by a [`TagBinder`].
//!
//! # Examples
//!
//! ```no_run
//! use mifare_core::{MifareConfig, PresenceEvent, ReaderRegistry, event::reader_event_channel};
//! use mifare_transport_pcsc::PcscDeviceManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PcscDeviceManager::new()?;
//! let mut registry = ReaderRegistry::new(manager, MifareConfig::default());
//!
//! let (tx, rx) = reader_event_channel();
//! for reader in registry.refresh()? {
//!     reader.listen_channel(tx.clone())?;
//! }
//!
//! for event in rx {
//!     match event.event {
//!         PresenceEvent::Arrived(card) => println!("{}: {}", event.reader, card.uid()?),
//!         PresenceEvent::Removed => println!("{}: removed", event.reader),
//!         PresenceEvent::Failed(err) => println!("{}: {}", event.reader, err.status()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod binder;
mod config;
mod error;
mod manager;
mod reader;
mod transport;
pub mod util;

pub use binder::{PcscTag, PcscTarget, PresenceOnly, TagBinder};
pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::{PcscReader, ReaderStatus};
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols, Status};
