//! Account registry persistence and merge
//!
//! The registry is a single JSON array of [`AccountRecord`]s sorted by karma.
//! Each run replaces it as a whole:
//! - A missing file is an empty registry (first run)
//! - A file that exists but does not parse is an error, never overwritten
//! - Writes go to a temporary sibling first and are renamed into place

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use scout_core::{sort_by_karma, AccountRecord, Candidate};

/// Default registry location, relative to the working directory
pub const DEFAULT_REGISTRY_PATH: &str = "data/active_users.json";

/// Errors from registry storage
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry {path}: {message}")]
    Read { path: String, message: String },

    #[error("Registry {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },

    #[error("Failed to write registry {path}: {message}")]
    Write { path: String, message: String },

    #[error("Failed to encode registry: {0}")]
    Encode(String),
}

/// Durable home of the account registry
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// All records, empty when nothing has been persisted yet
    async fn load(&self) -> Result<Vec<AccountRecord>, RegistryError>;

    /// Replace the whole registry
    async fn save(&self, records: &[AccountRecord]) -> Result<(), RegistryError>;

    /// Human-readable location for logs and messages
    fn location(&self) -> String;
}

/// Shared reference to a registry store
pub type SharedRegistry = Arc<dyn RegistryStore>;

/// Registry kept in a pretty-printed JSON file
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, message: String) -> RegistryError {
        RegistryError::Write {
            path: self.location(),
            message,
        }
    }
}

impl Default for JsonFileRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_PATH)
    }
}

#[async_trait]
impl RegistryStore for JsonFileRegistry {
    async fn load(&self) -> Result<Vec<AccountRecord>, RegistryError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No existing registry at {}, starting fresh",
                    self.path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(RegistryError::Read {
                    path: self.location(),
                    message: e.to_string(),
                })
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<AccountRecord> =
            serde_json::from_str(&raw).map_err(|e| RegistryError::Corrupt {
                path: self.location(),
                message: e.to_string(),
            })?;

        let records = dedupe_handles(records);
        debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    async fn save(&self, records: &[AccountRecord]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(format!("cannot create directory: {}", e)))?;
        }

        let mut payload =
            serde_json::to_vec_pretty(records).map_err(|e| RegistryError::Encode(e.to_string()))?;
        payload.push(b'\n');

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|e| self.write_error(e.to_string()))?;

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.write_error(format!("cannot replace registry: {}", e)));
        }

        debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Registry held in memory
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<Vec<AccountRecord>>,
    saves: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AccountRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn records(&self) -> Vec<AccountRecord> {
        self.records.lock().clone()
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistry {
    async fn load(&self) -> Result<Vec<AccountRecord>, RegistryError> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[AccountRecord]) -> Result<(), RegistryError> {
        *self.records.lock() = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// Keep the first record per handle and restore derived fields
fn dedupe_handles(records: Vec<AccountRecord>) -> Vec<AccountRecord> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());

    for mut record in records {
        if !seen.insert(record.handle.clone()) {
            warn!("Dropping duplicate registry entry for {}", record.handle);
            continue;
        }
        record.normalize();
        kept.push(record);
    }

    kept
}

/// What a merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Handles seen for the first time
    pub inserted: usize,
    /// Existing handles whose measurement was replaced
    pub updated: usize,
    /// Registry size after the merge
    pub total: usize,
    /// Whether the registry was written
    pub persisted: bool,
}

/// Upsert candidates into existing records and re-sort by karma.
///
/// Mutable fields are replaced, `first_seen` survives, new handles start
/// with `first_seen == last_updated == now`.
pub fn merge_candidates(
    existing: Vec<AccountRecord>,
    candidates: &[Candidate],
    now: DateTime<Utc>,
) -> (Vec<AccountRecord>, MergeStats) {
    let mut records = existing;
    let mut index: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.handle.clone(), i))
        .collect();
    let mut stats = MergeStats::default();

    for candidate in candidates {
        match index.get(&candidate.handle) {
            Some(&i) => {
                records[i].apply(candidate, now);
                stats.updated += 1;
            }
            None => {
                index.insert(candidate.handle.clone(), records.len());
                records.push(AccountRecord::from_candidate(candidate, now));
                stats.inserted += 1;
            }
        }
    }

    sort_by_karma(&mut records);
    stats.total = records.len();
    (records, stats)
}

/// Merges a run's candidates into the persisted registry
pub struct RegistryMerger {
    store: SharedRegistry,
}

impl RegistryMerger {
    pub fn new(store: SharedRegistry) -> Self {
        Self { store }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    /// Current registry contents
    pub async fn snapshot(&self) -> Result<Vec<AccountRecord>, RegistryError> {
        self.store.load().await
    }

    /// Merge `candidates` into `existing` and persist the result.
    ///
    /// Nothing is written when there are no candidates.
    pub async fn merge(
        &self,
        existing: Vec<AccountRecord>,
        candidates: &[Candidate],
        now: DateTime<Utc>,
    ) -> Result<MergeStats, RegistryError> {
        if candidates.is_empty() {
            info!("No candidates this run, registry left unchanged");
            return Ok(MergeStats {
                total: existing.len(),
                ..Default::default()
            });
        }

        let (records, mut stats) = merge_candidates(existing, candidates, now);
        self.store.save(&records).await?;
        stats.persisted = true;

        info!(
            "Saved {} accounts to {} ({} new, {} updated)",
            stats.total,
            self.store.location(),
            stats.inserted,
            stats.updated
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn candidate(handle: &str, posts: u64, karma: i64, forums: &[&str]) -> Candidate {
        let forum_activity: BTreeMap<String, u64> = forums
            .iter()
            .map(|f| (f.to_string(), posts / forums.len().max(1) as u64))
            .collect();
        Candidate {
            handle: handle.to_string(),
            post_count: posts,
            karma_sum: karma,
            forums: forum_activity.keys().cloned().collect(),
            cross_forum_score: forum_activity.len() as u64,
            forum_activity,
        }
    }

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap()
    }

    fn is_sorted(records: &[AccountRecord]) -> bool {
        records.windows(2).all(|w| w[0].karma_sum >= w[1].karma_sum)
    }

    #[test]
    fn test_merge_sorted_for_any_size() {
        let (empty, stats) = merge_candidates(Vec::new(), &[], t(1));
        assert!(empty.is_empty());
        assert_eq!(stats.total, 0);

        let (one, _) = merge_candidates(Vec::new(), &[candidate("a", 5, 700, &["x"])], t(1));
        assert_eq!(one.len(), 1);

        let (existing, _) = merge_candidates(
            Vec::new(),
            &[
                candidate("low", 5, 510, &["x"]),
                candidate("mid", 6, 900, &["x"]),
            ],
            t(1),
        );
        let (many, stats) = merge_candidates(
            existing,
            &[
                candidate("top", 9, 5000, &["x", "y"]),
                candidate("low", 7, 3000, &["y"]),
            ],
            t(2),
        );
        assert!(is_sorted(&many));
        assert_eq!(many[0].handle, "top");
        assert_eq!(many[1].handle, "low");
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn test_merge_existing_handle_replaces_measurement() {
        let (existing, _) =
            merge_candidates(Vec::new(), &[candidate("bob", 8, 2000, &["A", "B"])], t(1));

        let (merged, stats) =
            merge_candidates(existing, &[candidate("bob", 5, 800, &["B"])], t(2));

        let bob = &merged[0];
        assert_eq!(bob.karma_sum, 800);
        assert_eq!(bob.post_count, 5);
        assert_eq!(bob.forums.len(), 1);
        assert_eq!(bob.cross_forum_score, 1);
        assert_eq!(bob.first_seen, t(1));
        assert_eq!(bob.last_updated, t(2));
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.inserted, 0);
    }

    #[test]
    fn test_merge_clamps_clock_going_backwards() {
        let (existing, _) = merge_candidates(Vec::new(), &[candidate("c", 5, 600, &["x"])], t(5));
        let (merged, _) = merge_candidates(
            existing,
            &[candidate("c", 6, 700, &["x"])],
            t(5) - Duration::hours(3),
        );
        assert_eq!(merged[0].last_updated, merged[0].first_seen);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileRegistry::new(dir.path().join("none.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_directory_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("active_users.json");
        let store = JsonFileRegistry::new(&path);

        let (records, _) = merge_candidates(
            Vec::new(),
            &[
                candidate("alice", 6, 600, &["SaaS"]),
                candidate("zed", 10, 1200, &["SaaS", "startups"]),
            ],
            t(3),
        );
        store.save(&records).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, records);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"karmaSum\": 1200"));
        assert!(raw.contains("\"firstSeen\""));

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_users.json");
        std::fs::write(&path, "[{\"handle\": \"alice\", ").unwrap();

        let store = JsonFileRegistry::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, RegistryError::Corrupt { .. }));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[{\"handle\": \"alice\", "
        );
    }

    #[tokio::test]
    async fn test_loads_legacy_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("active_users.json");
        std::fs::write(
            &path,
            r#"[
              {
                "username": "carol",
                "posts": 12,
                "karma": 4300,
                "subreddits": ["Entrepreneur", "SaaS"],
                "crossSubredditActivity": {"Entrepreneur": 7, "SaaS": 5},
                "crossSubredditScore": 9,
                "firstSeen": "2024-01-05T10:00:00.000Z",
                "lastUpdated": "2024-02-01T08:30:00.000Z"
              },
              {
                "username": "carol",
                "posts": 1,
                "karma": 1,
                "subreddits": [],
                "crossSubredditActivity": {},
                "crossSubredditScore": 0,
                "firstSeen": "2024-01-05T10:00:00.000Z",
                "lastUpdated": "2024-01-05T10:00:00.000Z"
              }
            ]"#,
        )
        .unwrap();

        let records = JsonFileRegistry::new(&path).load().await.unwrap();
        assert_eq!(records.len(), 1);
        let carol = &records[0];
        assert_eq!(carol.handle, "carol");
        assert_eq!(carol.post_count, 12);
        assert_eq!(carol.karma_sum, 4300);
        assert_eq!(carol.forum_activity.get("SaaS"), Some(&5));
        // recomputed from the activity map
        assert_eq!(carol.cross_forum_score, 2);
        assert_eq!(carol.first_seen, t(5));
    }

    #[tokio::test]
    async fn test_merger_skips_write_without_candidates() {
        let store = Arc::new(MemoryRegistry::new());
        let merger = RegistryMerger::new(store.clone());

        let stats = merger.merge(Vec::new(), &[], t(1)).await.unwrap();
        assert!(!stats.persisted);
        assert_eq!(store.save_count(), 0);

        let stats = merger
            .merge(Vec::new(), &[candidate("alice", 6, 600, &["SaaS"])], t(1))
            .await
            .unwrap();
        assert!(stats.persisted);
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.records()[0].handle, "alice");
    }
}
