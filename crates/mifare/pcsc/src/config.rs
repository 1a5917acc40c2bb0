//! Configuration options for the PC/SC transport

use std::ffi::CStr;

use pcsc::{Card, Context, Protocols as PcscProtocols, ShareMode as PcscShareMode};

/// Sharing mode for card connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    /// Exclusive access to the card
    Exclusive,
    /// Shared access to the card (default)
    Shared,
    /// Direct connection to the reader
    Direct,
}

impl From<ShareMode> for PcscShareMode {
    fn from(mode: ShareMode) -> Self {
        match mode {
            ShareMode::Exclusive => Self::Exclusive,
            ShareMode::Shared => Self::Shared,
            ShareMode::Direct => Self::Direct,
        }
    }
}

/// Configuration options for the PC/SC transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcscConfig {
    /// Sharing mode for tag connections
    pub share_mode: ShareMode,

    /// Preferred protocols for tag connections
    pub protocols: PcscProtocols,
}

impl Default for PcscConfig {
    fn default() -> Self {
        Self { share_mode: ShareMode::Shared, protocols: PcscProtocols::ANY }
    }
}

impl PcscConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sharing mode
    pub const fn with_share_mode(mut self, mode: ShareMode) -> Self {
        self.share_mode = mode;
        self
    }

    /// Set the preferred protocols
    pub const fn with_protocols(mut self, protocols: PcscProtocols) -> Self {
        self.protocols = protocols;
        self
    }

    /// Connect to the tag in `reader` with this share mode and protocols
    pub(crate) fn connect(&self, context: &Context, reader: &CStr) -> Result<Card, pcsc::Error> {
        context.connect(reader, self.share_mode.into(), self.protocols)
    }
}
