//! Device manager for PC/SC operations

use std::{fmt, sync::Arc};

use mifare_core::transport::{ReaderEnumerator, TransportError};
use pcsc::{Context, ReaderState, Scope, State};
use tracing::debug;

use crate::{
    binder::{PresenceOnly, TagBinder},
    config::PcscConfig,
    error::PcscError,
    reader::{PcscReader, ReaderStatus},
    transport::PcscTransport,
};

/// Manager for PC/SC device operations
///
/// Every transport it opens binds discovered tags with `B`.
pub struct PcscDeviceManager<B: TagBinder = PresenceOnly> {
    /// PC/SC context
    context: Context,
    /// Configuration handed to every transport
    config: PcscConfig,
    /// Driver binding shared by every transport
    binder: Arc<B>,
}

impl<B: TagBinder> fmt::Debug for PcscDeviceManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscDeviceManager")
            .field("config", &self.config)
            .field("binder", &self.binder)
            .finish_non_exhaustive()
    }
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager for presence detection
    pub fn new() -> Result<Self, PcscError> {
        Self::with_binder(PresenceOnly)
    }
}

impl<B: TagBinder> PcscDeviceManager<B> {
    /// Create a new PC/SC device manager binding tags with `binder`
    pub fn with_binder(binder: B) -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context, config: PcscConfig::default(), binder: Arc::new(binder) })
    }

    /// Use `config` for every transport opened from now on
    pub const fn with_config(mut self, config: PcscConfig) -> Self {
        self.config = config;
        self
    }

    /// The tag binder
    pub fn binder(&self) -> &B {
        &self.binder
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = [ReaderState::new(reader_name.as_c_str(), State::UNAWARE)];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(e) => {
                    debug!(reader = ?reader_name, error = %e, "Reader status unavailable");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        ReaderStatus::Unavailable,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Open a transport for a specific reader
    pub fn open_reader(&self, reader_name: &str) -> Result<PcscTransport<B>, PcscError> {
        self.open_reader_with_config(reader_name, self.config)
    }

    /// Open a transport for a specific reader with custom configuration
    pub fn open_reader_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransport<B>, PcscError> {
        PcscTransport::new(self.context.clone(), reader_name, config, Arc::clone(&self.binder))
    }
}

impl<B: TagBinder> ReaderEnumerator for PcscDeviceManager<B> {
    type Transport = PcscTransport<B>;

    fn enumerate(&self) -> Result<Vec<PcscTransport<B>>, TransportError> {
        let readers = self.list_readers()?;
        let transports = readers
            .iter()
            .map(|reader| self.open_reader(reader.name()))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = transports.len(), "PC/SC readers enumerated");
        Ok(transports)
    }
}
