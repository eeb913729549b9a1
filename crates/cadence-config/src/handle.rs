//! Shared, typed access to the live configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;

use crate::Config;
use crate::error::ConfigError;

/// Cloneable handle to the live [`Config`].
///
/// Every clone observes the same value. Writers go through
/// [`update`](Self::update), which only wakes subscribers when the closure
/// actually changed something.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Config>>,
    dir: Option<Arc<PathBuf>>,
}

impl ConfigHandle {
    /// Handle that is never written back to disk.
    pub fn in_memory(config: Config) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self {
            tx: Arc::new(tx),
            dir: None,
        }
    }

    /// Handle that [`persist`](Self::persist)s into `config_dir/config.ron`.
    pub fn persistent(config: Config, config_dir: &Path) -> Self {
        let (tx, _rx) = watch::channel(config);
        Self {
            tx: Arc::new(tx),
            dir: Some(Arc::new(config_dir.to_path_buf())),
        }
    }

    /// Snapshot of the whole config.
    pub fn get(&self) -> Config {
        self.tx.borrow().clone()
    }

    /// Read a single value without cloning the whole config.
    pub fn read<R>(&self, f: impl FnOnce(&Config) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate the config. Returns whether anything changed.
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> bool {
        self.tx.send_if_modified(|config| {
            let before = config.clone();
            f(config);
            *config != before
        })
    }

    /// Receiver that is notified on every effective change.
    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Write the current value to disk.
    pub fn persist(&self) -> Result<(), ConfigError> {
        let dir = self.dir.as_ref().ok_or(ConfigError::NotPersistent)?;
        self.get().save(dir)
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}
