//! Presence state machine
//!
//! Turns the raw result of each scan into arrival, removal and failure
//! events. Failures are edge triggered: the same error on consecutive
//! scans is reported once.

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    card::DesfireCard,
    driver::{CardDriver, TagKind},
    event::PresenceEvent,
    reader::ReaderHandle,
    tags::{TagBatch, TagSetOwner},
    transport::{CardTransport, ScanError},
};

/// What the poller last observed on its reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum PresenceState {
    /// Reader device not open
    Unavailable,
    /// Field empty
    Empty,
    /// Tags in the field
    Present,
    /// The last scan timed out
    Timeout,
    /// The last scan failed
    Error(String),
}

/// Per reader presence tracking
#[derive(Debug)]
pub struct PresencePoller {
    state: PresenceState,
    uids: BTreeSet<String>,
    last_error: Option<ScanError>,
}

impl Default for PresencePoller {
    fn default() -> Self {
        Self::new()
    }
}

impl PresencePoller {
    /// A poller that has not scanned yet
    ///
    /// Nothing is known about the reader until the first scan, so it starts
    /// out unavailable.
    pub const fn new() -> Self {
        Self { state: PresenceState::Unavailable, uids: BTreeSet::new(), last_error: None }
    }

    /// Current state
    pub const fn state(&self) -> &PresenceState {
        &self.state
    }

    /// UIDs seen by the last successful scan
    pub const fn uids(&self) -> &BTreeSet<String> {
        &self.uids
    }

    /// Feed one scan result and collect the resulting events
    ///
    /// A batch whose UIDs match the previous scan, or that holds no DESFire
    /// tag, is released before returning.
    pub fn advance<T: CardTransport>(
        &mut self,
        reader: &Arc<ReaderHandle<T>>,
        scan: Result<TagBatch<T::Tag>, ScanError>,
    ) -> Vec<PresenceEvent<T>> {
        let batch = match scan {
            Ok(batch) => batch,
            Err(error) => return self.fail(error),
        };
        self.last_error = None;

        if batch.is_empty() {
            self.state = PresenceState::Empty;
            if self.uids.is_empty() {
                return Vec::new();
            }
            debug!(reader = %reader.name(), "Tags removed");
            self.uids.clear();
            return vec![PresenceEvent::Removed];
        }

        self.state = PresenceState::Present;
        let uids: BTreeSet<String> = batch.tags().iter().map(|tag| tag.uid()).collect();
        if uids == self.uids {
            trace!(reader = %reader.name(), "Same tags as last scan");
            return Vec::new();
        }
        debug!(reader = %reader.name(), ?uids, "Tags changed");
        self.uids = uids;

        let owner = TagSetOwner::new(batch);
        (0..owner.batch().len())
            .filter_map(|index| owner.tag(index))
            .filter(|tag| tag.get().kind() == TagKind::Desfire)
            .map(|tag| PresenceEvent::Arrived(DesfireCard::new(Arc::clone(reader), tag)))
            .collect()
    }

    fn fail<T: CardTransport>(&mut self, error: ScanError) -> Vec<PresenceEvent<T>> {
        if self.last_error.as_ref() == Some(&error) {
            return Vec::new();
        }
        debug!(%error, "Scan failed");
        self.state = match &error {
            ScanError::Unavailable => PresenceState::Unavailable,
            ScanError::Timeout => PresenceState::Timeout,
            other => PresenceState::Error(other.status().to_string()),
        };
        self.last_error = Some(error.clone());
        vec![PresenceEvent::Failed(error)]
    }
}
