//! Exclusive, connected access to one tag
//!
//! A [`CardSession`] holds the reader lock for its whole lifetime, so no
//! other session and no presence scan on the same reader can interleave
//! with it. Dropping the session disconnects the tag and releases the lock.

use std::{fmt, thread};

use parking_lot::MutexGuard;
use tracing::{debug, trace, warn};

use crate::{
    Error, Result, Step,
    config::SessionConfig,
    driver::{CardDriver, DriverResult, Status, codes},
    reader::ReaderHandle,
    retry::{RetryError, RetryPolicy, Transience},
    transport::CardTransport,
};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; initial state and state after release
    Unconnected,
    /// Connected and holding the reader lock
    Connected,
    /// Connecting failed fatally
    Failed,
}

/// A failed driver call, with the details fetched right after it
#[derive(Debug, Clone)]
struct DriverFailure {
    code: u32,
    message: String,
}

/// Locked, connected access to a tag on one reader
pub struct CardSession<'a, T: CardTransport> {
    reader: &'a ReaderHandle<T>,
    guard: Option<MutexGuard<'a, T>>,
    tag: &'a T::Tag,
    state: ConnectionState,
    config: SessionConfig,
}

impl<'a, T: CardTransport> CardSession<'a, T> {
    /// Lock `reader` and connect to `tag`
    ///
    /// Blocks while another session or scan holds the reader. Busy cards are
    /// retried after a pause, lost connections are reset and retried, and any
    /// other connect failure ends the session with [`Error::ConnectFailed`].
    pub fn acquire(reader: &'a ReaderHandle<T>, tag: &'a T::Tag) -> Result<Self> {
        let guard = reader.lock_device();
        trace!(reader = %reader.name(), uid = %tag.uid(), "Reader locked");

        let mut session = Self {
            reader,
            guard: Some(guard),
            tag,
            state: ConnectionState::Unconnected,
            config: reader.config().session,
        };
        session.connect()?;
        Ok(session)
    }

    fn connect(&mut self) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            self.tag.clear_error();
            let code = match self.tag.connect() {
                Ok(()) => {
                    self.state = ConnectionState::Connected;
                    debug!(uid = %self.tag.uid(), attempts, "Connected to tag");
                    if !self.config.settle_delay.is_zero() {
                        thread::sleep(self.config.settle_delay);
                    }
                    return Ok(());
                }
                Err(_) => self.tag.last_error(),
            };

            let exhausted = self.config.max_connect_attempts.is_some_and(|max| attempts >= max);
            if codes::retryable_connect(code) && !exhausted {
                trace!(code = format_args!("{code:#010X}"), "Card busy, retrying connect");
                thread::sleep(self.config.connect_retry_delay);
            } else if code == codes::ENXIO && !exhausted {
                trace!("Stale connection, resetting before connect");
                let _ = self.tag.disconnect();
            } else {
                self.state = ConnectionState::Failed;
                let message = self.tag.error_string();
                warn!(uid = %self.tag.uid(), code = format_args!("{code:#010X}"), %message, "Connect failed");
                return Err(Error::ConnectFailed { driver_error: code, message });
            }
        }
    }

    /// Run a driver call, retrying retryable failures up to the configured bound
    pub fn retry<R>(&self, step: Step, op: impl FnMut(&T::Tag) -> DriverResult<R>) -> Result<R> {
        self.retry_with(self.config.retry_attempts, step, op)
    }

    /// Like [`retry`](Self::retry) with an explicit attempt bound
    pub fn retry_with<R>(
        &self,
        max_attempts: u32,
        step: Step,
        mut op: impl FnMut(&T::Tag) -> DriverResult<R>,
    ) -> Result<R> {
        let policy = RetryPolicy::new(max_attempts).with_delay(self.config.retry_delay);
        let tag = self.tag;

        policy
            .run(
                |_| {
                    tag.clear_error();
                    op(tag).map_err(|_: Status| DriverFailure {
                        code: tag.last_error(),
                        message: tag.error_string(),
                    })
                },
                |failure| {
                    if codes::retryable_command(failure.code) {
                        Transience::Transient
                    } else {
                        Transience::Fatal
                    }
                },
            )
            .map_err(|err| {
                debug!(%step, attempts = err.attempts(), "Card command failed");
                match err {
                    RetryError::Fatal { error, .. } => Error::Driver {
                        step,
                        driver_error: error.code,
                        message: error.message,
                    },
                    RetryError::Exhausted { attempts, error } => Error::RetriesExhausted {
                        step,
                        attempts,
                        driver_error: error.code,
                        message: error.message,
                    },
                }
            })
    }

    /// The connected tag
    pub const fn tag(&self) -> &'a T::Tag {
        self.tag
    }

    /// The locked reader
    pub const fn reader(&self) -> &'a ReaderHandle<T> {
        self.reader
    }

    /// Current connection state
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Disconnect and unlock the reader
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn release(&mut self) {
        if self.state == ConnectionState::Connected {
            if self.tag.disconnect().is_err() {
                warn!(uid = %self.tag.uid(), code = self.tag.last_error(), "Disconnect failed");
            }
            self.state = ConnectionState::Unconnected;
        }
        if self.guard.take().is_some() {
            trace!(reader = %self.reader.name(), "Reader unlocked");
        }
    }
}

impl<T: CardTransport> Drop for CardSession<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: CardTransport> fmt::Debug for CardSession<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardSession")
            .field("reader", &self.reader.name())
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("locked", &self.guard.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use super::*;
    use crate::{
        config::MifareConfig,
        sim::{SimCard, SimField, SimOp, SimTransport},
    };

    fn reader_with(card: &SimCard, config: MifareConfig) -> Arc<ReaderHandle<SimTransport>> {
        let field = SimField::new();
        field.insert(card);
        ReaderHandle::new(SimTransport::new("sim0", field), config)
    }

    #[test]
    fn test_connect_and_release() {
        let card = SimCard::desfire("04a1b2c3d4e580");
        let reader = reader_with(&card, MifareConfig::default());
        let tag = card.tag();

        let mut session = CardSession::acquire(&reader, &tag).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(card.is_connected());
        assert!(reader.is_busy());

        session.release();
        session.release();
        assert_eq!(session.state(), ConnectionState::Unconnected);
        assert!(!card.is_connected());
        assert!(!reader.is_busy());
    }

    #[test]
    fn test_busy_card_is_retried() {
        let card = SimCard::desfire("04a1b2c3d4e581");
        card.inject_fault(SimOp::Connect, codes::SCARD_E_SHARING_VIOLATION, 2);
        let config = MifareConfig::default().with_session(
            SessionConfig::default().with_connect_retry_delay(Duration::from_millis(1)),
        );
        let reader = reader_with(&card, config);
        let tag = card.tag();

        let session = CardSession::acquire(&reader, &tag).unwrap();
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(card.calls(SimOp::Connect), 3);
    }

    #[test]
    fn test_stale_connection_is_reset() {
        let card = SimCard::desfire("04a1b2c3d4e582");
        card.inject_fault(SimOp::Connect, codes::ENXIO, 1);
        let reader = reader_with(&card, MifareConfig::default());
        let tag = card.tag();

        let _session = CardSession::acquire(&reader, &tag).unwrap();
        assert_eq!(card.calls(SimOp::Disconnect), 1);
        assert_eq!(card.calls(SimOp::Connect), 2);
    }

    #[test]
    fn test_fatal_connect_unlocks_reader() {
        let card = SimCard::desfire("04a1b2c3d4e583");
        card.inject_fault(SimOp::Connect, codes::SCARD_E_NO_SMARTCARD, 1);
        let reader = reader_with(&card, MifareConfig::default());
        let tag = card.tag();

        let err = CardSession::acquire(&reader, &tag).unwrap_err();
        assert_eq!(err.code(), 0x12303);
        assert_eq!(err.driver_error(), Some(codes::SCARD_E_NO_SMARTCARD));
        assert!(!reader.is_busy());
        assert_eq!(card.calls(SimOp::Disconnect), 0);
    }

    #[test]
    fn test_connect_attempts_can_be_bounded() {
        let card = SimCard::desfire("04a1b2c3d4e584");
        card.inject_fault(SimOp::Connect, codes::SCARD_E_SHARING_VIOLATION, 10);
        let config = MifareConfig::default().with_session(
            SessionConfig::default()
                .with_connect_retry_delay(Duration::ZERO)
                .with_max_connect_attempts(Some(4)),
        );
        let reader = reader_with(&card, config);
        let tag = card.tag();

        let err = CardSession::acquire(&reader, &tag).unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert_eq!(card.calls(SimOp::Connect), 4);
    }

    #[test]
    fn test_retry_bound() {
        let card = SimCard::desfire("04a1b2c3d4e585");
        let reader = reader_with(&card, MifareConfig::default());
        let tag = card.tag();
        let session = CardSession::acquire(&reader, &tag).unwrap();

        card.inject_fault(SimOp::GetVersion, codes::ILLEGAL_COMMAND_CODE, 5);
        let err = session.retry(Step::GetVersion, |t| t.get_version()).unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(card.calls(SimOp::GetVersion), 3);

        card.inject_fault(SimOp::FreeMem, codes::PERMISSION_DENIED, 5);
        let err = session.retry(Step::FreeMemory, |t| t.free_mem()).unwrap_err();
        assert!(matches!(err, Error::Driver { step: Step::FreeMemory, .. }));
        assert_eq!(card.calls(SimOp::FreeMem), 1);
    }

    #[test]
    fn test_sessions_are_exclusive() {
        let card = SimCard::desfire("04a1b2c3d4e586");
        let reader = reader_with(&card, MifareConfig::default());
        let inside = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let reader = Arc::clone(&reader);
                let tag = card.tag();
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let session = CardSession::acquire(&reader, &tag).unwrap();
                        assert!(!inside.swap(true, Ordering::SeqCst), "sessions overlapped");
                        session.retry(Step::GetVersion, |t| t.get_version()).unwrap();
                        inside.store(false, Ordering::SeqCst);
                        drop(session);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(!card.is_connected());
    }
}
