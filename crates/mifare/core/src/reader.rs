//! Reader handle shared by sessions, cards and the poller

use std::{fmt, sync::Arc};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{
    Error, Result,
    config::MifareConfig,
    event::{ChannelHandler, PresenceEvent, PresenceHandler, ReaderEventSender},
    listener::Listener,
    poller::{PresencePoller, PresenceState},
    transport::{CardTransport, ScanError, TransportError},
};

/// One reader and everything attached to it
///
/// The device mutex is the per reader lock: scans and card sessions both
/// take it, so at most one of them talks to the reader at any time.
pub struct ReaderHandle<T: CardTransport> {
    name: String,
    device: Mutex<T>,
    poller: Mutex<PresencePoller>,
    listener: Mutex<Option<Listener>>,
    config: MifareConfig,
}

impl<T: CardTransport> ReaderHandle<T> {
    /// Wrap `transport`; the device is not opened yet
    pub fn new(transport: T, config: MifareConfig) -> Arc<Self> {
        Arc::new(Self {
            name: transport.name().to_string(),
            device: Mutex::new(transport),
            poller: Mutex::new(PresencePoller::new()),
            listener: Mutex::new(None),
            config,
        })
    }

    /// Reader name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration used for sessions and polling
    pub const fn config(&self) -> &MifareConfig {
        &self.config
    }

    pub(crate) fn lock_device(&self) -> MutexGuard<'_, T> {
        self.device.lock()
    }

    /// Whether a session or scan currently holds the reader
    pub fn is_busy(&self) -> bool {
        self.device.is_locked()
    }

    /// Open the device if it is not open yet
    pub fn open(&self) -> std::result::Result<(), TransportError> {
        let mut device = self.lock_device();
        if !device.is_open() {
            device.open()?;
            info!(reader = %self.name, "Reader opened");
        }
        Ok(())
    }

    /// Whether the device is open
    pub fn is_open(&self) -> bool {
        self.lock_device().is_open()
    }

    /// Last observed presence state
    pub fn presence(&self) -> PresenceState {
        self.poller.lock().state().clone()
    }

    /// Scan once and advance the presence state
    ///
    /// The reader lock is held for the scan only, never while events are
    /// handled.
    pub fn tick(self: &Arc<Self>) -> Vec<PresenceEvent<T>> {
        let scan = {
            let mut device = self.lock_device();
            if device.is_open() { device.scan() } else { Err(ScanError::Unavailable) }
        };
        self.poller.lock().advance(self, scan)
    }

    /// Whether a poller is running
    pub fn is_listening(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Stop polling and close the device
    ///
    /// Waits for a running scan or session to finish before closing. Safe
    /// to call from inside a presence handler.
    pub fn release(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            listener.stop();
        }

        let mut device = self.lock_device();
        if device.is_open() {
            device.close();
            info!(reader = %self.name, "Reader closed");
        }
    }
}

impl<T: CardTransport + 'static> ReaderHandle<T> {
    /// Open the device and start polling it on a background thread
    ///
    /// A device that fails to open is reported as unavailable by the
    /// poller rather than failing here.
    pub fn listen<H>(self: &Arc<Self>, handler: H) -> Result<()>
    where
        H: PresenceHandler<T> + Send + 'static,
    {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return Err(Error::InvalidArgument(format!("reader {} is already listening", self.name)));
        }
        if let Err(err) = self.open() {
            warn!(reader = %self.name, %err, "Unable to open reader");
        }

        let spawned = Listener::spawn(Arc::downgrade(self), self.config.poller, handler)
            .map_err(|err| TransportError::Driver { code: 0, message: err.to_string() })?;
        *listener = Some(spawned);
        debug!(reader = %self.name, "Listening for tags");
        Ok(())
    }

    /// Like [`listen`](Self::listen), forwarding events into a channel
    pub fn listen_channel(self: &Arc<Self>, sender: ReaderEventSender<T>) -> Result<()> {
        self.listen(ChannelHandler::new(sender))
    }
}

impl<T: CardTransport> fmt::Debug for ReaderHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("name", &self.name)
            .field("busy", &self.device.is_locked())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::PollerConfig,
        event::reader_event_channel,
        sim::{SimCard, SimField, SimTransport},
    };

    fn fast_config() -> MifareConfig {
        MifareConfig::default().with_poller(
            PollerConfig::default()
                .with_initial_delay(Duration::from_millis(1))
                .with_interval(Duration::from_millis(5)),
        )
    }

    #[test]
    fn test_listen_channel_delivers_arrival() {
        let field = SimField::new();
        field.insert(&SimCard::desfire("04000000000010"));
        let reader = ReaderHandle::new(SimTransport::new("sim0", field), fast_config());

        let (tx, rx) = reader_event_channel();
        reader.listen_channel(tx).unwrap();
        assert!(reader.is_listening());

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.reader, "sim0");
        assert_eq!(event.event.card().unwrap().uid().unwrap(), "04000000000010");

        reader.release();
        assert!(!reader.is_listening());
        assert!(!reader.is_open());
    }

    #[test]
    fn test_listen_twice_is_rejected() {
        let reader = ReaderHandle::new(SimTransport::new("sim0", SimField::new()), fast_config());
        reader.listen(|_: &Arc<ReaderHandle<SimTransport>>, _: PresenceEvent<SimTransport>| {}).unwrap();
        assert!(
            reader
                .listen(|_: &Arc<ReaderHandle<SimTransport>>, _: PresenceEvent<SimTransport>| {})
                .is_err()
        );
        reader.release();
        reader.release();
    }

    #[test]
    fn test_release_from_handler() {
        let field = SimField::new();
        field.insert(&SimCard::desfire("04000000000011"));
        let reader = ReaderHandle::new(SimTransport::new("sim0", field), fast_config());

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        reader
            .listen(move |reader: &Arc<ReaderHandle<SimTransport>>, _: PresenceEvent<SimTransport>| {
                reader.release();
                let _ = done_tx.try_send(());
            })
            .unwrap();

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!reader.is_listening());
        assert!(!reader.is_open());
    }
}
