//! Bounded, newest-first ledger of completed uploads

use crate::client::{ImageHost, UploadResult};
use crate::error::{Error, Result};
use crate::format::Links;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Maximum number of entries kept
pub const HISTORY_CAPACITY: usize = 100;

/// One completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub origin_name: String,
    pub links: Links,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
    #[serde(rename = "date")]
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn from_result(result: &UploadResult) -> Self {
        Self {
            origin_name: result.origin_name.clone(),
            links: result.links.clone(),
            delete_url: result.delete_url.clone(),
            created_at: Utc::now(),
        }
    }

    /// Case-insensitive substring match over the name and every link value
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.origin_name.to_lowercase().contains(&query)
            || self.links.values().any(|v| v.to_lowercase().contains(&query))
    }
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// Upload history, most recent first
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// In-memory store with no backing file
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields an empty store bound to it
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            entries: VecDeque::new(),
            path: Some(path.to_path_buf()),
        };

        if !path.exists() {
            debug!("No history at {}, starting empty", path.display());
            return Ok(store);
        }

        let content = fs::read_to_string(path)?;
        let file: HistoryFile = if content.trim().is_empty() {
            HistoryFile::default()
        } else {
            serde_json::from_str(&content)?
        };

        store.entries = file.history.into();
        if store.entries.len() > HISTORY_CAPACITY {
            warn!(
                "History at {} holds {} entries, keeping the newest {}",
                path.display(),
                store.entries.len(),
                HISTORY_CAPACITY
            );
            store.entries.truncate(HISTORY_CAPACITY);
        }

        Ok(store)
    }

    /// Write the store to its backing file, if it has one
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = HistoryFile {
            history: self.entries.iter().cloned().collect(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// Prepend an entry, evicting from the tail past capacity
    pub fn insert(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        while self.entries.len() > HISTORY_CAPACITY {
            if let Some(evicted) = self.entries.pop_back() {
                debug!("Evicted history entry {}", evicted.origin_name);
            }
        }
    }

    /// Full ordered list for display
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazy view of entries satisfying `predicate`
    pub fn filter<'a, P>(&'a self, mut predicate: P) -> impl Iterator<Item = &'a HistoryEntry> + 'a
    where
        P: FnMut(&HistoryEntry) -> bool + 'a,
    {
        self.entries.iter().filter(move |e| predicate(e))
    }

    /// Lazy view of entries whose name or any link contains `query`
    pub fn search<'a>(&'a self, query: &'a str) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        self.filter(move |e| e.matches(query))
    }

    /// Delete the image on the host, then drop its entry.
    ///
    /// The entry is kept when the host call fails.
    pub async fn delete_by_reference(
        &mut self,
        host: &dyn ImageHost,
        delete_url: &str,
        token: Option<&str>,
    ) -> Result<HistoryEntry> {
        if !self.entries.iter().any(|e| e.delete_url.as_deref() == Some(delete_url)) {
            return Err(Error::NotFound(format!("No history entry for {}", delete_url)));
        }

        host.delete(delete_url, token).await?;

        let index = self
            .entries
            .iter()
            .position(|e| e.delete_url.as_deref() == Some(delete_url))
            .ok_or_else(|| Error::NotFound(format!("No history entry for {}", delete_url)))?;
        let removed = self
            .entries
            .remove(index)
            .ok_or_else(|| Error::NotFound(format!("No history entry for {}", delete_url)))?;
        info!("Deleted {} from host and history", removed.origin_name);
        Ok(removed)
    }

    /// Delete every matching entry that has a delete reference.
    ///
    /// Returns how many were removed; failed deletions leave their entries.
    pub async fn delete_matching(
        &mut self,
        host: &dyn ImageHost,
        query: &str,
        token: Option<&str>,
    ) -> usize {
        let targets: Vec<String> = self
            .search(query)
            .filter_map(|e| e.delete_url.clone())
            .collect();

        let mut removed = 0;
        for delete_url in targets {
            match self.delete_by_reference(host, &delete_url, token).await {
                Ok(_) => removed += 1,
                Err(e) => warn!("Failed to delete {}: {}", delete_url, e),
            }
        }
        removed
    }

    /// Drop every entry locally; nothing is deleted on the host
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
