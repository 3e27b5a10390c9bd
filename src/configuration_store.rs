//! A thread-safe in-memory storage for the currently active bucketing configuration.
//! [`ConfigurationStore`] provides concurrent access for readers (decision evaluation) and
//! writers (the configuration poller).
use std::sync::{Arc, RwLock};

use crate::bucketing::Configuration;

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for the bucketing
/// configuration that allows concurrent access for readers and writers.
///
/// `Configuration` itself is always immutable and can only be replaced completely.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get currently-active configuration. Returns None if configuration hasn't been
    /// fetched/stored yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        // self.configuration.read() should always return Ok(). Err() is possible only if the
        // lock is poisoned (writer panicked while holding the lock), which should never
        // happen.
        let configuration = self
            .configuration
            .read()
            .expect("thread holding configuration lock should not panic");

        configuration.clone()
    }

    /// Set new configuration.
    pub fn set_configuration(&self, config: Arc<Configuration>) {
        let mut configuration_slot = self
            .configuration
            .write()
            .expect("thread holding configuration lock should not panic");

        *configuration_slot = Some(config);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ConfigurationStore;
    use crate::bucketing::{Campaign, Configuration};

    #[test]
    fn can_set_configuration_from_another_thread() {
        let store = Arc::new(ConfigurationStore::new());

        assert!(store.get_configuration().is_none());

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.set_configuration(Arc::new(Configuration {
                    panic: false,
                    campaigns: vec![Campaign {
                        id: "test_cid".to_owned(),
                        variation_groups: vec![],
                    }],
                }))
            })
            .join();
        }

        assert!(store.get_configuration().is_some());
    }
}
