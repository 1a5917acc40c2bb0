//! PC/SC reader transport

use std::{ffi::CString, fmt, sync::Arc, time::Duration};

use mifare_core::{
    tags::TagBatch,
    transport::{CardTransport, ScanError, TransportError},
};
use pcsc::{Context, Disposition, ReaderState, State};
use tracing::{debug, trace};

use crate::{
    binder::{PcscTarget, TagBinder},
    config::PcscConfig,
    error::{PcscError, scan_error},
    reader::ReaderStatus,
    util::{GET_UID, classify_atr, parse_uid_response},
};

/// One PC/SC reader, scanned for the tag in its field
pub struct PcscTransport<B: TagBinder> {
    /// PC/SC context
    context: Context,
    /// Reader name as passed to PC/SC
    reader: CString,
    /// Reader name
    reader_name: String,
    /// Configuration
    config: PcscConfig,
    /// Driver binding for discovered tags
    binder: Arc<B>,
    /// Whether the reader is open
    open: bool,
}

impl<B: TagBinder> fmt::Debug for PcscTransport<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("open", &self.open)
            .field("config", &self.config)
            .field("binder", &self.binder)
            .finish()
    }
}

impl<B: TagBinder> PcscTransport<B> {
    /// Create a new PC/SC transport for the specified reader
    pub(crate) fn new(
        context: Context,
        reader_name: &str,
        config: PcscConfig,
        binder: Arc<B>,
    ) -> Result<Self, PcscError> {
        let reader = CString::new(reader_name)
            .map_err(|_| PcscError::InvalidReaderName(reader_name.to_string()))?;
        Ok(Self {
            context,
            reader,
            reader_name: reader_name.to_string(),
            config,
            binder,
            open: false,
        })
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Get the configuration
    pub const fn config(&self) -> &PcscConfig {
        &self.config
    }

    /// Read the UID of the tag in the field
    fn read_uid(&self) -> Result<Vec<u8>, PcscError> {
        let card = self.config.connect(&self.context, &self.reader)?;

        let mut response_buffer = [0u8; 258];
        let result = card
            .transmit(&GET_UID, &mut response_buffer)
            .map_err(PcscError::from)
            .and_then(|response| {
                trace!(response = %hex::encode_upper(response), "GET UID");
                parse_uid_response(response)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| PcscError::UnexpectedResponse(response.to_vec()))
            });

        if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
            debug!(reader = %self.reader_name, error = %e, "Disconnect after GET UID failed");
        }
        result
    }
}

impl<B: TagBinder> CardTransport for PcscTransport<B> {
    type Tag = B::Tag;

    fn name(&self) -> &str {
        &self.reader_name
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let readers = self.context.list_readers_owned().map_err(PcscError::from)?;
        if !readers.contains(&self.reader) {
            return Err(PcscError::ReaderNotFound(self.reader_name.clone()).into());
        }
        self.open = true;
        debug!(reader = %self.reader_name, "Reader opened");
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            debug!(reader = %self.reader_name, "Reader closed");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn scan(&mut self) -> Result<TagBatch<B::Tag>, ScanError> {
        if !self.open {
            return Err(ScanError::Unavailable);
        }

        let mut reader_states = [ReaderState::new(self.reader.as_c_str(), State::UNAWARE)];
        self.context
            .get_status_change(Some(Duration::ZERO), &mut reader_states)
            .map_err(scan_error)?;

        match ReaderStatus::from_state(reader_states[0].event_state()) {
            ReaderStatus::Unavailable => return Err(ScanError::Unavailable),
            ReaderStatus::Mute => return Err(ScanError::Io),
            ReaderStatus::Empty => return Ok(TagBatch::empty()),
            ReaderStatus::Present | ReaderStatus::InUse | ReaderStatus::Exclusive => {}
        }

        let atr = reader_states[0].atr().to_vec();
        let uid = match self.read_uid() {
            Ok(uid) => uid,
            // left the field between the status check and the connect
            Err(PcscError::Pcsc(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard)) => {
                return Ok(TagBatch::empty());
            }
            Err(PcscError::Pcsc(e)) => return Err(scan_error(e)),
            Err(e) => {
                debug!(reader = %self.reader_name, error = %e, "Tag UID unavailable");
                return Err(ScanError::Invalid);
            }
        };

        let target = PcscTarget::new(
            self.context.clone(),
            self.reader.clone(),
            hex::encode(uid),
            atr.clone(),
            classify_atr(&atr),
            self.config,
        );
        trace!(reader = %self.reader_name, target = ?target, "Tag in field");
        Ok(TagBatch::new(vec![self.binder.bind(target)]))
    }
}
