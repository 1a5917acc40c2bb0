//! Presence events and their consumers

use std::{fmt, sync::Arc};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::{card::DesfireCard, reader::ReaderHandle, transport::CardTransport, transport::ScanError};

/// Change in what a reader sees
pub enum PresenceEvent<T: CardTransport> {
    /// A DESFire card entered the field
    Arrived(DesfireCard<T>),
    /// Every tag left the field
    Removed,
    /// Scanning failed; reported once per distinct error
    Failed(ScanError),
}

impl<T: CardTransport> PresenceEvent<T> {
    /// Status string of a failure, `None` for arrivals and removals
    pub const fn error(&self) -> Option<&'static str> {
        match self {
            Self::Failed(err) => Some(err.status()),
            _ => None,
        }
    }

    /// The arrived card, if any
    pub const fn card(&self) -> Option<&DesfireCard<T>> {
        match self {
            Self::Arrived(card) => Some(card),
            _ => None,
        }
    }

    /// Take the arrived card, if any
    pub fn into_card(self) -> Option<DesfireCard<T>> {
        match self {
            Self::Arrived(card) => Some(card),
            _ => None,
        }
    }
}

impl<T: CardTransport> fmt::Debug for PresenceEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrived(card) => f.debug_tuple("Arrived").field(card).finish(),
            Self::Removed => f.write_str("Removed"),
            Self::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// A presence event tagged with the reader it came from
pub struct ReaderEvent<T: CardTransport> {
    /// Name of the reader
    pub reader: String,
    /// The event
    pub event: PresenceEvent<T>,
}

impl<T: CardTransport> fmt::Debug for ReaderEvent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderEvent")
            .field("reader", &self.reader)
            .field("event", &self.event)
            .finish()
    }
}

/// Consumer of presence events, called on the poller thread
pub trait PresenceHandler<T: CardTransport> {
    /// Handle one event from `reader`
    fn handle_event(&mut self, reader: &Arc<ReaderHandle<T>>, event: PresenceEvent<T>);
}

impl<T, F> PresenceHandler<T> for F
where
    T: CardTransport,
    F: FnMut(&Arc<ReaderHandle<T>>, PresenceEvent<T>),
{
    fn handle_event(&mut self, reader: &Arc<ReaderHandle<T>>, event: PresenceEvent<T>) {
        self(reader, event)
    }
}

/// Sender half of a presence channel
pub type ReaderEventSender<T> = Sender<ReaderEvent<T>>;
/// Receiver half of a presence channel
pub type ReaderEventReceiver<T> = Receiver<ReaderEvent<T>>;

/// Create an unbounded channel for reader events
pub fn reader_event_channel<T: CardTransport>() -> (ReaderEventSender<T>, ReaderEventReceiver<T>) {
    unbounded()
}

/// Create a bounded channel for reader events
pub fn bounded_reader_event_channel<T: CardTransport>(
    capacity: usize,
) -> (ReaderEventSender<T>, ReaderEventReceiver<T>) {
    bounded(capacity)
}

/// Forwards events into a channel
#[derive(Debug)]
pub(crate) struct ChannelHandler<T: CardTransport> {
    sender: ReaderEventSender<T>,
}

impl<T: CardTransport> ChannelHandler<T> {
    pub(crate) const fn new(sender: ReaderEventSender<T>) -> Self {
        Self { sender }
    }
}

impl<T: CardTransport> PresenceHandler<T> for ChannelHandler<T> {
    fn handle_event(&mut self, reader: &Arc<ReaderHandle<T>>, event: PresenceEvent<T>) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.sender.send(ReaderEvent { reader: reader.name().to_string(), event });
    }
}
