//! Set of known readers

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    Result,
    config::MifareConfig,
    reader::ReaderHandle,
    transport::ReaderEnumerator,
};

/// Readers discovered by an enumerator
#[derive(Debug)]
pub struct ReaderRegistry<E: ReaderEnumerator> {
    enumerator: E,
    config: MifareConfig,
    readers: Vec<Arc<ReaderHandle<E::Transport>>>,
}

impl<E: ReaderEnumerator> ReaderRegistry<E> {
    /// Registry using `enumerator`; call [`refresh`](Self::refresh) to populate it
    pub const fn new(enumerator: E, config: MifareConfig) -> Self {
        Self { enumerator, config, readers: Vec::new() }
    }

    /// Release every known reader and enumerate again
    pub fn refresh(&mut self) -> Result<&[Arc<ReaderHandle<E::Transport>>]> {
        self.release_all();
        let transports = self.enumerator.enumerate()?;
        self.readers =
            transports.into_iter().map(|transport| ReaderHandle::new(transport, self.config)).collect();
        info!(count = self.readers.len(), "Readers enumerated");
        Ok(&self.readers)
    }

    /// Known readers
    pub fn readers(&self) -> &[Arc<ReaderHandle<E::Transport>>] {
        &self.readers
    }

    /// Reader called `name`
    pub fn get(&self, name: &str) -> Option<&Arc<ReaderHandle<E::Transport>>> {
        self.readers.iter().find(|reader| reader.name() == name)
    }

    /// Names of known readers
    pub fn names(&self) -> Vec<String> {
        self.readers.iter().map(|reader| reader.name().to_string()).collect()
    }

    /// The enumerator
    pub const fn enumerator(&self) -> &E {
        &self.enumerator
    }

    fn release_all(&mut self) {
        for reader in self.readers.drain(..) {
            debug!(reader = %reader.name(), "Releasing reader");
            reader.release();
        }
    }
}

impl<E: ReaderEnumerator> Drop for ReaderRegistry<E> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Error,
        sim::{SimEnumerator, SimField},
        transport::TransportError,
    };

    #[test]
    fn test_refresh_lists_attached_readers() {
        let enumerator = SimEnumerator::new();
        let mut registry = ReaderRegistry::new(enumerator.clone(), MifareConfig::default());

        assert!(matches!(registry.refresh(), Err(Error::Transport(TransportError::NoReaders))));

        enumerator.attach("sim0", SimField::new());
        enumerator.attach("sim1", SimField::new());
        assert_eq!(registry.refresh().unwrap().len(), 2);
        assert_eq!(registry.names(), vec!["sim0", "sim1"]);
        assert!(registry.get("sim1").is_some());
        assert!(registry.get("sim2").is_none());
    }

    #[test]
    fn test_refresh_releases_old_readers() {
        let enumerator = SimEnumerator::new();
        enumerator.attach("sim0", SimField::new());
        let mut registry = ReaderRegistry::new(enumerator.clone(), MifareConfig::default());

        let old = Arc::clone(&registry.refresh().unwrap()[0]);
        old.open().unwrap();
        assert!(old.is_open());

        enumerator.detach("sim0");
        enumerator.attach("sim1", SimField::new());
        registry.refresh().unwrap();
        assert!(!old.is_open());
        assert_eq!(registry.names(), vec!["sim1"]);
    }
}
