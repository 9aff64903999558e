//! Checkpointing and resumption of session caches.
//!
//! One JSON file per session under the checkpoint directory, named by
//! session id. Writes go to a temporary file first and are renamed into
//! place, so a crash mid-write never leaves a truncated checkpoint.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hindsight_cache::{SNAPSHOT_VERSION, SessionCache, SessionSnapshot};
use hindsight_config::{RecoverySection, resolve_path};
use tracing::{debug, info, warn};

use crate::error::CheckpointError;

type Result<T> = std::result::Result<T, CheckpointError>;

const CHECKPOINT_EXT: &str = "json";

/// Writes, reads and removes session checkpoints.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    checkpoint_dir: PathBuf,
    evidence_dir: PathBuf,
    retry_backoff: Duration,
    cancel_timeout: Duration,
}

impl RecoveryManager {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, evidence_dir: impl Into<PathBuf>) -> Self {
        let defaults = RecoverySection::default();
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            evidence_dir: evidence_dir.into(),
            retry_backoff: defaults.retry_backoff(),
            cancel_timeout: defaults.cancel_timeout(),
        }
    }

    /// Build from the `[recovery]` section, resolving paths against `project_root`.
    pub fn from_config(section: &RecoverySection, project_root: &Path) -> Self {
        Self::new(
            resolve_path(project_root, &section.checkpoint_dir),
            resolve_path(project_root, &section.evidence_dir),
        )
        .with_retry_backoff(section.retry_backoff())
        .with_cancel_timeout(section.cancel_timeout())
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn evidence_dir(&self) -> &Path {
        &self.evidence_dir
    }

    /// Path of the resumable checkpoint for a session.
    pub fn checkpoint_path(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self
            .checkpoint_dir
            .join(format!("{session_id}.{CHECKPOINT_EXT}")))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Synchronous operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize the full cache to its checkpoint file.
    pub fn checkpoint(&self, cache: &SessionCache) -> Result<PathBuf> {
        self.write_snapshot(&cache.snapshot())
    }

    fn write_snapshot(&self, snapshot: &SessionSnapshot) -> Result<PathBuf> {
        let path = self.checkpoint_path(&snapshot.session_id)?;
        write_atomic(&self.checkpoint_dir, &path, snapshot)?;
        debug!(
            session_id = %snapshot.session_id,
            entries = snapshot.entries.len(),
            path = %path.display(),
            "Checkpoint written"
        );
        Ok(path)
    }

    /// Load a session from its checkpoint.
    ///
    /// Returns `Ok(None)` when no checkpoint exists; the caller starts fresh.
    pub fn resume(&self, session_id: &str) -> Result<Option<SessionCache>> {
        let path = self.checkpoint_path(session_id)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(session_id = %session_id, "No checkpoint to resume");
                return Ok(None);
            }
            Err(e) => return Err(CheckpointError::io(&path, e)),
        };

        let snapshot: SessionSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        if snapshot.session_id != session_id {
            return Err(CheckpointError::InvalidSessionId(format!(
                "{session_id} (checkpoint belongs to {})",
                snapshot.session_id
            )));
        }

        info!(
            session_id = %session_id,
            entries = snapshot.entries.len(),
            "Resuming session from checkpoint"
        );
        Ok(Some(SessionCache::from_snapshot(snapshot)))
    }

    /// Delete the resumable checkpoint. Missing files are not an error.
    pub fn cleanup(&self, session_id: &str) -> Result<bool> {
        let path = self.checkpoint_path(session_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(session_id = %session_id, "Checkpoint cleaned up");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CheckpointError::io(&path, e)),
        }
    }

    /// Keep a copy of the session's final state for postmortem inspection.
    ///
    /// Written under the evidence directory, never resumed from.
    pub fn retain_evidence(&self, cache: &SessionCache) -> Result<PathBuf> {
        validate_session_id(cache.session_id())?;
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = self
            .evidence_dir
            .join(format!("{}-{stamp}.{CHECKPOINT_EXT}", cache.session_id()));
        write_atomic(&self.evidence_dir, &path, &cache.snapshot())?;
        info!(
            session_id = %cache.session_id(),
            path = %path.display(),
            "Evidence retained"
        );
        Ok(path)
    }

    /// Session ids with a resumable checkpoint on disk.
    pub fn list_checkpoints(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.checkpoint_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CheckpointError::io(&self.checkpoint_dir, e)),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == CHECKPOINT_EXT))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .filter(|id| validate_session_id(id).is_ok())
            .collect();
        ids.sort();
        Ok(ids)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Async operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Checkpoint off the async runtime's worker threads.
    pub async fn checkpoint_async(&self, cache: &SessionCache) -> Result<PathBuf> {
        let snapshot = cache.snapshot();
        let manager = self.clone();
        let path = self.checkpoint_path(&snapshot.session_id)?;
        tokio::task::spawn_blocking(move || manager.write_snapshot(&snapshot))
            .await
            .map_err(|e| CheckpointError::io(path, std::io::Error::other(e)))?
    }

    /// Checkpoint, retrying once after the configured backoff.
    ///
    /// A second failure is logged and returned; callers continue the run
    /// without a checkpoint for this phase.
    pub async fn checkpoint_with_retry(&self, cache: &SessionCache) -> Result<PathBuf> {
        match self.checkpoint_async(cache).await {
            Ok(path) => Ok(path),
            Err(first) => {
                warn!(
                    session_id = %cache.session_id(),
                    error = %first,
                    backoff_ms = self.retry_backoff.as_millis() as u64,
                    "Checkpoint failed, retrying"
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.checkpoint_async(cache).await.inspect_err(|e| {
                    warn!(
                        session_id = %cache.session_id(),
                        error = %e,
                        "Checkpoint retry failed, continuing without checkpoint"
                    );
                })
            }
        }
    }

    /// Best-effort checkpoint taken while a run is being cancelled.
    ///
    /// Bounded by the cancel timeout and abandoned, not retried, if it does
    /// not finish in time.
    pub async fn checkpoint_on_cancel(&self, cache: &SessionCache) -> Result<PathBuf> {
        match tokio::time::timeout(self.cancel_timeout, self.checkpoint_async(cache)).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(session_id = %cache.session_id(), error = %e, "Cancellation checkpoint failed");
                }
                result
            }
            Err(_) => {
                warn!(
                    session_id = %cache.session_id(),
                    timeout_ms = self.cancel_timeout.as_millis() as u64,
                    "Cancellation checkpoint abandoned"
                );
                Err(CheckpointError::Timeout(self.cancel_timeout))
            }
        }
    }
}

/// Session ids become file names: allow only `[A-Za-z0-9_-]`.
fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidSessionId(session_id.to_string()))
    }
}

fn write_atomic(dir: &Path, path: &Path, snapshot: &SessionSnapshot) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CheckpointError::io(dir, e))?;

    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension(format!("{CHECKPOINT_EXT}.tmp"));
    fs::write(&tmp, json).map_err(|e| CheckpointError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        CheckpointError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hindsight_cache::{CacheConfig, SetOptions};
    use hindsight_types::Domain;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> RecoveryManager {
        RecoveryManager::new(dir.path().join("checkpoints"), dir.path().join("evidence"))
            .with_retry_backoff(Duration::from_millis(5))
    }

    fn cache() -> SessionCache {
        let cache = SessionCache::new(Domain::Web, &CacheConfig::default());
        cache
            .set("analysis:results", &serde_json::json!({"ok": true}), "analysis", SetOptions::session())
            .unwrap();
        cache
            .set(
                "planning:plan",
                &vec!["a", "b"],
                "planning",
                SetOptions::new().expires_after(Duration::from_secs(600)),
            )
            .unwrap();
        cache
    }

    #[test]
    fn test_checkpoint_resume_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let cache = cache();

        let path = mgr.checkpoint(&cache).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let restored = mgr.resume(cache.session_id()).unwrap().unwrap();
        assert_eq!(restored.entries(), cache.entries());
        assert_eq!(restored.domain(), cache.domain());
        assert_eq!(mgr.list_checkpoints().unwrap(), vec![cache.session_id().to_string()]);
    }

    #[test]
    fn test_resume_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(manager(&dir).resume("nosuchsession").unwrap().is_none());
    }

    #[test]
    fn test_resume_rejects_other_version() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let cache = cache();
        let mut snapshot = cache.snapshot();
        snapshot.version = 99;
        mgr.write_snapshot(&snapshot).unwrap();

        assert!(matches!(
            mgr.resume(cache.session_id()),
            Err(CheckpointError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_invalid_session_ids() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        for id in ["", "../escape", "a/b", "with space"] {
            assert!(matches!(
                mgr.resume(id),
                Err(CheckpointError::InvalidSessionId(_))
            ));
        }
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let cache = cache();
        mgr.checkpoint(&cache).unwrap();

        assert!(mgr.cleanup(cache.session_id()).unwrap());
        assert!(!mgr.cleanup(cache.session_id()).unwrap());
        assert!(mgr.resume(cache.session_id()).unwrap().is_none());
    }

    #[test]
    fn test_retain_evidence_is_separate_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir);
        let cache = cache();
        mgr.checkpoint(&cache).unwrap();

        let evidence = mgr.retain_evidence(&cache).unwrap();
        mgr.cleanup(cache.session_id()).unwrap();

        assert!(evidence.starts_with(mgr.evidence_dir()));
        assert!(evidence.exists());
        assert!(mgr.resume(cache.session_id()).unwrap().is_none());

        let snapshot: SessionSnapshot =
            serde_json::from_slice(&fs::read(&evidence).unwrap()).unwrap();
        assert_eq!(snapshot.session_id, cache.session_id());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let dir = TempDir::new().unwrap();
        // A file where the checkpoint directory should be.
        let blocker = dir.path().join("checkpoints");
        fs::write(&blocker, b"not a dir").unwrap();
        let mgr = manager(&dir);
        let cache = cache();

        let remover = {
            let blocker = blocker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                fs::remove_file(blocker).unwrap();
            })
        };
        let mgr = mgr.with_retry_backoff(Duration::from_millis(100));
        let result = mgr.checkpoint_with_retry(&cache).await;
        remover.await.unwrap();

        assert!(result.is_ok());
        assert!(mgr.resume(cache.session_id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_second_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("checkpoints"), b"not a dir").unwrap();
        let mgr = manager(&dir);

        let result = mgr.checkpoint_with_retry(&cache()).await;
        assert!(matches!(result, Err(CheckpointError::Io { .. })));
    }

    #[tokio::test]
    async fn test_cancel_checkpoint_succeeds_within_bound() {
        let dir = TempDir::new().unwrap();
        let mgr = manager(&dir).with_cancel_timeout(Duration::from_secs(5));
        let cache = cache();
        mgr.checkpoint_on_cancel(&cache).await.unwrap();
        assert!(mgr.resume(cache.session_id()).unwrap().is_some());
    }

    #[test]
    fn test_from_config_resolves_relative_paths() {
        let section = RecoverySection::default();
        let mgr = RecoveryManager::from_config(&section, Path::new("/project"));
        assert_eq!(
            mgr.checkpoint_dir(),
            Path::new("/project/.hindsight/checkpoints")
        );
        assert_eq!(mgr.evidence_dir(), Path::new("/project/.hindsight/evidence"));
    }
}
