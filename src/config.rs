//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Durations are plain milliseconds in the serialized form.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outbox_worker::EventCodec;

pub const JOURNAL_PATH_ENV: &str = "CATALOG_JOURNAL_PATH";
pub const WORKER_ID_ENV: &str = "CATALOG_WORKER_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub store: StoreConfig,
    pub publisher: PublisherConfig,
}

impl CatalogConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `CATALOG_JOURNAL_PATH` and `CATALOG_WORKER_ID` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = env::var_os(JOURNAL_PATH_ENV).filter(|v| !v.is_empty()) {
            self.store.journal_path = Some(PathBuf::from(path));
        }
        if let Ok(worker_id) = env::var(WORKER_ID_ENV) {
            if !worker_id.is_empty() {
                self.publisher.worker_id = worker_id;
            }
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Journal file. `None` keeps everything in memory.
    pub journal_path: Option<PathBuf>,
    /// fsync the journal after every append.
    pub fsync: bool,
    /// Compact after this many deliveries. `None` disables automatic compaction.
    pub compact_after: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            journal_path: None,
            fsync: true,
            compact_after: Some(1024),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn journal(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            journal_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn with_compact_after(mut self, deliveries: Option<u64>) -> Self {
        self.compact_after = deliveries;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub worker_id: String,
    pub batch_size: usize,
    pub lease_ms: u64,
    pub poll_interval_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub codec: EventCodec,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            worker_id: format!("outbox-worker-{}", std::process::id()),
            batch_size: 100,
            lease_ms: 30_000,
            poll_interval_ms: 250,
            initial_backoff_ms: 100,
            max_backoff_ms: 30_000,
            codec: EventCodec::default(),
        }
    }
}

impl PublisherConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease_ms = lease.as_millis() as u64;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_codec(mut self, codec: EventCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }
}
