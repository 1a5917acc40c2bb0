//! Simulated readers

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;

use super::card::{SimCard, SimTag};
use crate::{
    tags::TagBatch,
    transport::{CardTransport, ReaderEnumerator, ScanError, TransportError},
};

#[derive(Debug, Default)]
struct FieldState {
    cards: Vec<SimCard>,
    scan_faults: VecDeque<ScanError>,
    scans: usize,
    released: usize,
    unplugged: bool,
}

/// The RF field of a simulated reader
///
/// Cloned handles share the field, so a test can move cards in and out
/// while a reader owns the transport.
#[derive(Debug, Clone, Default)]
pub struct SimField {
    state: Arc<Mutex<FieldState>>,
}

impl SimField {
    /// An empty field
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `card` into the field
    pub fn insert(&self, card: &SimCard) {
        self.state.lock().cards.push(card.clone());
    }

    /// Take the card with `uid` out of the field
    pub fn remove(&self, uid: &str) {
        self.state.lock().cards.retain(|card| card.uid() != uid);
    }

    /// Take every card out of the field
    pub fn clear(&self) {
        self.state.lock().cards.clear();
    }

    /// Fail the next `times` scans with `error`
    pub fn fail_next_scans(&self, error: ScanError, times: usize) {
        let mut state = self.state.lock();
        state.scan_faults.extend(std::iter::repeat_n(error, times));
    }

    /// Make opening the reader fail
    pub fn unplug(&self) {
        self.state.lock().unplugged = true;
    }

    /// Number of scans so far
    pub fn scans(&self) -> usize {
        self.state.lock().scans
    }

    /// Number of tag batches released so far
    pub fn released_batches(&self) -> usize {
        self.state.lock().released
    }

    fn scan(&self) -> Result<TagBatch<SimTag>, ScanError> {
        let mut state = self.state.lock();
        state.scans += 1;
        if let Some(error) = state.scan_faults.pop_front() {
            return Err(error);
        }
        if state.cards.is_empty() {
            return Ok(TagBatch::empty());
        }

        let tags = state.cards.iter().map(SimCard::tag).collect();
        let field = Arc::clone(&self.state);
        Ok(TagBatch::with_release_hook(tags, move || field.lock().released += 1))
    }
}

/// A simulated reader looking at a [`SimField`]
#[derive(Debug)]
pub struct SimTransport {
    name: String,
    field: SimField,
    open: bool,
}

impl SimTransport {
    /// Reader called `name` watching `field`
    pub fn new(name: &str, field: SimField) -> Self {
        Self { name: name.to_string(), field, open: false }
    }

    /// The watched field
    pub const fn field(&self) -> &SimField {
        &self.field
    }
}

impl CardTransport for SimTransport {
    type Tag = SimTag;

    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), TransportError> {
        if self.field.state.lock().unplugged {
            return Err(TransportError::ReaderNotFound(self.name.clone()));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn scan(&mut self) -> Result<TagBatch<SimTag>, ScanError> {
        if !self.open {
            return Err(ScanError::Unavailable);
        }
        self.field.scan()
    }
}

/// A fixed set of simulated readers
#[derive(Debug, Clone, Default)]
pub struct SimEnumerator {
    readers: Arc<Mutex<Vec<(String, SimField)>>>,
}

impl SimEnumerator {
    /// No readers attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a reader called `name` watching `field`
    pub fn attach(&self, name: &str, field: SimField) {
        self.readers.lock().push((name.to_string(), field));
    }

    /// Detach the reader called `name`
    pub fn detach(&self, name: &str) {
        self.readers.lock().retain(|(reader, _)| reader != name);
    }
}

impl ReaderEnumerator for SimEnumerator {
    type Transport = SimTransport;

    fn enumerate(&self) -> Result<Vec<SimTransport>, TransportError> {
        let readers = self.readers.lock();
        if readers.is_empty() {
            return Err(TransportError::NoReaders);
        }
        Ok(readers.iter().map(|(name, field)| SimTransport::new(name, field.clone())).collect())
    }
}
