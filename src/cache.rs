//! Expiring result cache and daily snapshot store.
//!
//! Scrapes are slow (a real browser navigation each), so tool results are
//! cached with a short TTL. Snapshots are an append-only JSON-lines file
//! used for historical tracking of total assets.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};

struct Entry {
    data: Value,
    expires_at: DateTime<Utc>,
}

/// In-process TTL key-value cache for tool results.
pub struct TtlCache {
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: tokio::sync::Mutex<HashMap<String, Entry>>,
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_ttl,
            clock,
            entries: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a cached value, evicting it if its TTL has lapsed.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if self.clock.now() <= entry.expires_at => {
                tracing::debug!(key, "Cache hit");
                Some(entry.data.clone())
            }
            Some(_) => {
                tracing::debug!(key, "Cache expired");
                entries.remove(key);
                None
            }
            None => {
                tracing::debug!(key, "Cache miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, data: Value) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: &str, data: Value, ttl: Duration) {
        let expires_at = self.clock.now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0));

        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry { data, expires_at },
        );
        tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cache set");
    }

    pub async fn delete(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now <= entry.expires_at);
        before - entries.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    created_at: DateTime<Utc>,
    data: Value,
}

/// Append-only snapshot store, one JSON record per line.
pub struct SnapshotStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, data: Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create snapshot dir: {}", parent.display())
            })?;
        }

        let record = SnapshotRecord {
            created_at: self.clock.now(),
            data,
        };
        let mut line = serde_json::to_string(&record).context("Failed to serialize snapshot")?;
        line.push('\n');

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open snapshot file: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append snapshot: {}", self.path.display()))?;

        Ok(())
    }

    /// Snapshots from the last `days` days, newest first. Unparseable lines
    /// are skipped with a warning rather than failing the read.
    pub fn recent(&self, days: i64) -> Result<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot file: {}", self.path.display()))?;

        let cutoff = self.clock.now() - chrono::Duration::days(days);
        let mut records: Vec<SnapshotRecord> = Vec::new();
        // Walk the file back to front: appends are chronological, so the
        // stable sort below keeps the latest append first among records
        // sharing a timestamp.
        for line in content.lines().rev().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<SnapshotRecord>(line) {
                Ok(record) if record.created_at >= cutoff => records.push(record),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping unparseable snapshot line");
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records.into_iter().map(|record| record.data).collect())
    }
}
