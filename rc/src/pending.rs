//! Pending update records, keyed by path prefix
//!
//! Each bundle namespace (path prefix) has at most one pending update. The
//! store is a single JSON object on disk mapping `{prefix}_pendingUpdate` to
//! the update's hash and loading flag.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

const PENDING_UPDATE_KEY: &str = "pendingUpdate";

/// Raw records; values are decoded one key at a time
type Entries = BTreeMap<String, serde_json::Value>;

/// An installed update waiting for a restart to take effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub hash: String,
    /// Set once a restart has started loading this update
    #[serde(rename = "isLoading")]
    pub is_loading: bool,
}

/// What `initialize_after_restart` did with a prefix's pending update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AfterRestart {
    /// Nothing was pending
    NoPendingUpdate,
    /// First launch of the update; it is now marked loading
    FirstRun { hash: String },
    /// The update was already loading, so the last launch never reported ready
    RolledBack { hash: String },
}

/// JSON-file backed pending update store
#[derive(Debug, Clone)]
pub struct PendingUpdateStore {
    path: PathBuf,
}

fn key_for(path_prefix: &str) -> String {
    format!("{}_{}", path_prefix, PENDING_UPDATE_KEY)
}

impl PendingUpdateStore {
    /// Open a store at the given file path (created on first write)
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(path = %path.display(), "PendingUpdateStore::open: called");
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record
    ///
    /// An unparseable file reads as empty and is replaced by the next write.
    async fn load(&self) -> Result<Entries> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Entries::new()),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => Ok(entries),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Unable to parse pending update store, ignoring it");
                    Ok(Entries::new())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("PendingUpdateStore::load: store file missing, treating as empty");
                Ok(Entries::new())
            }
            Err(e) => Err(e).context(format!("Failed to read pending update store {}", self.path.display())),
        }
    }

    async fn write(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create store directory {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)
            .await
            .context(format!("Failed to write pending update store {}", self.path.display()))
    }

    /// Get the pending update for a prefix, if any
    ///
    /// A malformed record is logged and reads as no pending update.
    pub async fn get(&self, path_prefix: &str) -> Result<Option<PendingUpdate>> {
        debug!(%path_prefix, "PendingUpdateStore::get: called");
        let Some(raw) = self.load().await?.remove(&key_for(path_prefix)) else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(update) => Ok(Some(update)),
            Err(e) => {
                warn!(%path_prefix, error = %e, "Unable to parse pending update record, ignoring it");
                Ok(None)
            }
        }
    }

    /// Record (or replace) the pending update for a prefix
    pub async fn save(&self, hash: &str, is_loading: bool, path_prefix: &str) -> Result<()> {
        debug!(%hash, is_loading, %path_prefix, "PendingUpdateStore::save: called");
        let mut entries = self.load().await?;
        let update = PendingUpdate {
            hash: hash.to_string(),
            is_loading,
        };
        entries.insert(key_for(path_prefix), serde_json::to_value(update)?);
        self.write(&entries).await
    }

    /// Remove the pending update for a prefix. Returns whether one existed.
    pub async fn remove(&self, path_prefix: &str) -> Result<bool> {
        debug!(%path_prefix, "PendingUpdateStore::remove: called");
        let mut entries = self.load().await?;
        if entries.remove(&key_for(path_prefix)).is_none() {
            return Ok(false);
        }
        self.write(&entries).await?;
        Ok(true)
    }

    /// Advance a prefix's pending update once the relaunched process starts
    ///
    /// A fresh update becomes loading. One that was still loading from the
    /// previous launch crashed before `mark_ready` and is dropped.
    pub async fn initialize_after_restart(&self, path_prefix: &str) -> Result<AfterRestart> {
        debug!(%path_prefix, "PendingUpdateStore::initialize_after_restart: called");
        let Some(update) = self.get(path_prefix).await? else {
            return Ok(AfterRestart::NoPendingUpdate);
        };

        if update.is_loading {
            warn!(%path_prefix, hash = %update.hash, "Update did not finish loading the last time, rolling back");
            self.remove(path_prefix).await?;
            return Ok(AfterRestart::RolledBack { hash: update.hash });
        }

        info!(%path_prefix, hash = %update.hash, "Running update for the first time");
        self.save(&update.hash, true, path_prefix).await?;
        Ok(AfterRestart::FirstRun { hash: update.hash })
    }

    /// The running update loaded successfully; forget its pending record
    pub async fn mark_ready(&self, path_prefix: &str) -> Result<bool> {
        debug!(%path_prefix, "PendingUpdateStore::mark_ready: called");
        self.remove(path_prefix).await
    }

    /// Whether an update is pending for the prefix
    ///
    /// An update that is already loading does not count. When `hash` is
    /// given, the pending update must also match it.
    pub async fn is_pending(&self, hash: Option<&str>, path_prefix: &str) -> Result<bool> {
        debug!(?hash, %path_prefix, "PendingUpdateStore::is_pending: called");
        let pending = match self.get(path_prefix).await? {
            Some(update) => !update.is_loading && hash.is_none_or(|h| h == update.hash),
            None => false,
        };
        Ok(pending)
    }
}
