//! Background presence polling thread

use std::{
    sync::Weak,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, trace, warn};

use crate::{
    config::PollerConfig,
    event::PresenceHandler,
    reader::ReaderHandle,
    transport::CardTransport,
};

/// Handle to a running poller thread
#[derive(Debug)]
pub(crate) struct Listener {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Listener {
    /// Start polling `reader` and feeding events to `handler`
    ///
    /// The thread only holds a weak reference, so it never keeps the
    /// reader alive on its own.
    pub(crate) fn spawn<T, H>(
        reader: Weak<ReaderHandle<T>>,
        config: PollerConfig,
        handler: H,
    ) -> std::io::Result<Self>
    where
        T: CardTransport + 'static,
        H: PresenceHandler<T> + Send + 'static,
    {
        let (stop, stopped) = bounded(1);
        let thread = thread::Builder::new()
            .name("mifare-poller".into())
            .spawn(move || run(reader, config, handler, stopped))?;

        Ok(Self { stop, thread: Some(thread) })
    }

    /// Stop the thread, joining it unless called from the thread itself
    pub(crate) fn stop(mut self) {
        let _ = self.stop.try_send(());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            trace!("Poller stopped from its own thread, not joining");
            return;
        }
        if thread.join().is_err() {
            warn!("Poller thread panicked");
        }
    }
}

/// Wait `delay`, returning false once a stop was requested
fn wait(stopped: &Receiver<()>, delay: Duration) -> bool {
    matches!(stopped.recv_timeout(delay), Err(RecvTimeoutError::Timeout))
}

fn run<T, H>(reader: Weak<ReaderHandle<T>>, config: PollerConfig, mut handler: H, stopped: Receiver<()>)
where
    T: CardTransport + 'static,
    H: PresenceHandler<T>,
{
    debug!("Poller started");
    let mut delay = config.initial_delay;
    while wait(&stopped, delay) {
        delay = config.interval;
        let Some(reader) = reader.upgrade() else {
            break;
        };
        for event in reader.tick() {
            handler.handle_event(&reader, event);
        }
    }
    debug!("Poller stopped");
}
