//! Simulated readers and DESFire cards
//!
//! Implements [`CardTransport`](crate::transport::CardTransport) and
//! [`CardDriver`](crate::driver::CardDriver) entirely in memory, with call
//! counting and fault injection, so sessions, polling and the NDEF
//! operations can be exercised without hardware.
//!
//! ```
//! use mifare_core::prelude::*;
//! use mifare_core::sim::{SimCard, SimField, SimTransport};
//!
//! let field = SimField::new();
//! field.insert(&SimCard::desfire("04a1b2c3d4e5f6"));
//!
//! let reader = ReaderHandle::new(SimTransport::new("sim0", field), MifareConfig::default());
//! reader.open().unwrap();
//! let card = reader.tick().into_iter().find_map(PresenceEvent::into_card).unwrap();
//! assert_eq!(card.name().unwrap(), "Mifare DESFire");
//! ```

mod card;
mod transport;

pub use card::{SimCard, SimOp, SimTag, WriteRecord};
pub use transport::{SimEnumerator, SimField, SimTransport};
