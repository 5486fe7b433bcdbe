//! Run lease
//!
//! Keeps two runs from working on the same registry at once. Inside one
//! process a mutex gives single flight; across processes an exclusively
//! created lock file next to the registry does the same. A lock file older
//! than `stale_after` belongs to a crashed run and is taken over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default age after which a lock file is considered abandoned
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

/// What to do when a run is triggered while another holds the lease
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Return immediately without running
    #[default]
    Skip,
    /// Wait for the current run to finish, then run
    Wait,
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Lease file {path}: {message}")]
    Io { path: String, message: String },
}

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    pub pid: u32,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

/// Cross-process lock file
#[derive(Debug, Clone)]
pub struct LeaseFile {
    path: PathBuf,
    stale_after: Duration,
}

impl LeaseFile {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    /// `<registry>.lock` next to the registry file
    pub fn for_registry(registry: &Path, stale_after: Duration) -> Self {
        let mut name = registry.as_os_str().to_owned();
        name.push(".lock");
        Self::new(PathBuf::from(name), stale_after)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: std::io::Error) -> LeaseError {
        LeaseError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }

    /// Create the lock file, taking over a stale one.
    ///
    /// Returns `None` while another live run holds it.
    pub async fn acquire(&self, run_id: &str) -> Result<Option<LeaseHandle>, LeaseError> {
        // Later passes only after moving a stale file aside
        for _ in 0..3 {
            match self.create(run_id).await {
                Ok(handle) => return Ok(Some(handle)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if !self.is_stale().await? || !self.move_aside_stale().await? {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(self.io_error(e)),
            }
        }
        Ok(None)
    }

    /// Rename the lock file to a unique name, then confirm what was moved is
    /// still stale. Another process may have replaced the stale file with a
    /// fresh one since it was checked; that file is put back.
    ///
    /// Returns `false` when the lease now belongs to someone else.
    async fn move_aside_stale(&self) -> Result<bool, LeaseError> {
        let mut aside = self.path.as_os_str().to_owned();
        aside.push(format!(".stale-{}", Uuid::new_v4().simple()));
        let aside = PathBuf::from(aside);

        match tokio::fs::rename(&self.path, &aside).await {
            Ok(()) => {}
            // Someone else moved it first; retry creation
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(self.io_error(e)),
        }

        let moved = LeaseFile::new(&aside, self.stale_after);
        let still_stale = moved.is_stale().await?;

        if !still_stale {
            debug!("Lease {} was renewed by another run, restoring it", self.path.display());
            // Fails only if yet another run created the file meanwhile
            if let Err(e) = tokio::fs::hard_link(&aside, &self.path).await {
                debug!("Could not restore lease {}: {}", self.path.display(), e);
            }
        } else {
            warn!("Taking over stale lease {}", self.path.display());
        }

        if let Err(e) = tokio::fs::remove_file(&aside).await {
            warn!("Failed to remove {}: {}", aside.display(), e);
        }
        Ok(still_stale)
    }

    async fn create(&self, run_id: &str) -> std::io::Result<LeaseHandle> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;

        let info = LeaseInfo {
            pid: std::process::id(),
            run_id: run_id.to_string(),
            started_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
        file.write_all(&payload).await?;
        file.flush().await?;

        debug!("Acquired lease {} for run {}", self.path.display(), run_id);
        Ok(LeaseHandle {
            path: self.path.clone(),
            run_id: run_id.to_string(),
        })
    }

    /// Current holder, if the file exists and parses
    pub async fn holder(&self) -> Option<LeaseInfo> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    async fn is_stale(&self) -> Result<bool, LeaseError> {
        if let Some(info) = self.holder().await {
            let age = Utc::now().signed_duration_since(info.started_at);
            let stale = age.to_std().map(|a| a >= self.stale_after).unwrap_or(false);
            if !stale {
                info!(
                    "Lease held by run {} (pid {}) since {}",
                    info.run_id, info.pid, info.started_at
                );
            }
            return Ok(stale);
        }

        // Unreadable contents: fall back to the file's age
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => {
                let age = meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .unwrap_or_default();
                Ok(age >= self.stale_after)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Held lock file, removed on drop if still ours
#[derive(Debug)]
pub struct LeaseHandle {
    path: PathBuf,
    run_id: String,
}

impl Drop for LeaseHandle {
    fn drop(&mut self) {
        let ours = std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LeaseInfo>(&raw).ok())
            .is_some_and(|info| info.run_id == self.run_id);

        if ours {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to release lease {}: {}", self.path.display(), e);
            } else {
                debug!("Released lease {}", self.path.display());
            }
        }
    }
}

/// Proof that this run holds the lease; released on drop
#[derive(Debug)]
pub struct LeaseTicket {
    _guard: OwnedMutexGuard<()>,
    _file: Option<LeaseHandle>,
}

/// Single-flight guard plus optional lock file
#[derive(Debug, Clone)]
pub struct RunLease {
    policy: OverlapPolicy,
    guard: Arc<Mutex<()>>,
    file: Option<LeaseFile>,
    poll_interval: Duration,
}

impl Default for RunLease {
    fn default() -> Self {
        Self::new(OverlapPolicy::default())
    }
}

impl RunLease {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            policy,
            guard: Arc::new(Mutex::new(())),
            file: None,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_file(mut self, file: LeaseFile) -> Self {
        self.file = Some(file);
        self
    }

    /// How often a waiting run re-checks a lock file held by another process
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Acquire the lease, or `None` when skipping an overlapping run
    pub async fn acquire(&self, run_id: &str) -> Result<Option<LeaseTicket>, LeaseError> {
        let guard = match self.policy {
            OverlapPolicy::Skip => match self.guard.clone().try_lock_owned() {
                Ok(guard) => guard,
                Err(_) => return Ok(None),
            },
            OverlapPolicy::Wait => self.guard.clone().lock_owned().await,
        };

        let file = match &self.file {
            None => None,
            Some(lease_file) => loop {
                if let Some(handle) = lease_file.acquire(run_id).await? {
                    break Some(handle);
                }
                match self.policy {
                    OverlapPolicy::Skip => return Ok(None),
                    OverlapPolicy::Wait => tokio::time::sleep(self.poll_interval).await,
                }
            },
        };

        Ok(Some(LeaseTicket {
            _guard: guard,
            _file: file,
        }))
    }
}
