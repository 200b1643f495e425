//! Persistent JSON file tier
//!
//! The whole tier lives in one versioned JSON document that is held in memory
//! and flushed to disk atomically (temp file in the same directory, fsync,
//! rename). Loading never fails because of bad content: an unparseable or
//! incompatible file is renamed aside for inspection and the tier starts
//! empty, while individual entries whose checksum no longer matches are
//! dropped.
//!
//! A background worker can flush the document periodically; [`DiskTier::stop`]
//! waits for it to exit and then performs a final flush.

use std::{
    collections::HashMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Weak},
    time::Duration,
};

use application::ports::CacheStats;
use chrono::{DateTime, Utc};
use domain::{CacheEntry, CacheKey};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::{
    error::CacheError,
    integrity::{self, ChecksumStatus},
};

/// On-disk document layout version understood by this build
pub const DISK_FORMAT_VERSION: u32 = 1;

/// Default soft ceiling on the serialized size of all entries (100 MiB)
pub const DEFAULT_DISK_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Persisted hit/miss/eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCounters {
    /// Lookups served from disk
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries removed by the size cap or expiry cleanup
    pub evictions: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct DiskDocument {
    format_version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: HashMap<CacheKey, CacheEntry>,
    #[serde(default)]
    stats: DiskCounters,
}

impl DiskDocument {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            format_version: DISK_FORMAT_VERSION,
            created_at: now,
            updated_at: now,
            entries: HashMap::new(),
            stats: DiskCounters::default(),
        }
    }
}

/// Just enough of the document to decide whether the rest is readable
#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

#[derive(Debug)]
struct DiskState {
    doc: DiskDocument,
    sizes: HashMap<CacheKey, u64>,
    total_bytes: u64,
}

impl DiskState {
    fn from_document(doc: DiskDocument) -> Self {
        let sizes: HashMap<CacheKey, u64> = doc
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), serialized_size(key, entry).unwrap_or(0)))
            .collect();
        let total_bytes = sizes.values().sum();
        Self {
            doc,
            sizes,
            total_bytes,
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.doc.entries.remove(key)?;
        let size = self.sizes.remove(key).unwrap_or(0);
        self.total_bytes = self.total_bytes.saturating_sub(size);
        Some(removed)
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry, size: u64) {
        self.resize(&key, size);
        self.doc.entries.insert(key, entry);
    }

    fn resize(&mut self, key: &CacheKey, size: u64) {
        if let Some(old) = self.sizes.insert(key.clone(), size) {
            self.total_bytes = self.total_bytes.saturating_sub(old);
        }
        self.total_bytes = self.total_bytes.saturating_add(size);
    }

    /// Evict oldest entries, never `keep`, until the total fits `max_bytes`
    fn enforce_cap(&mut self, max_bytes: u64, keep: &CacheKey) {
        if max_bytes == 0 {
            return;
        }
        while self.total_bytes > max_bytes {
            let Some(oldest) = self.oldest_except(keep) else {
                break;
            };
            self.remove(&oldest);
            self.doc.stats.evictions += 1;
            debug!(key = %oldest.short(), layer = "disk", "Evicting oldest entry over size cap");
        }
    }

    fn oldest_except(&self, keep: &CacheKey) -> Option<CacheKey> {
        self.doc
            .entries
            .iter()
            .filter(|(key, _)| *key != keep)
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.clone())
    }
}

/// Outcome of [`DiskTier::load`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries accepted from the file
    pub loaded: usize,
    /// Entries dropped for a key or checksum mismatch
    pub dropped_invalid: usize,
    /// Where an unusable file was moved before starting fresh
    pub recovered_from: Option<PathBuf>,
}

/// Snapshot of the disk tier for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStats {
    /// Counters, entry count and serialized size
    pub cache: CacheStats,
    /// Backing file
    pub path: PathBuf,
    /// Document version in use
    pub format_version: u32,
    /// Maximum lifetime of a stored entry
    pub ttl: Duration,
    /// When the current document was first created
    pub created_at: DateTime<Utc>,
    /// When the document was last saved
    pub updated_at: DateTime<Utc>,
    /// Size ceiling in bytes (0 when unlimited)
    pub max_bytes: u64,
}

#[derive(Debug)]
struct AutoSaveWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// File-backed cache tier
pub struct DiskTier {
    path: PathBuf,
    ttl: Duration,
    max_bytes: u64,
    state: RwLock<DiskState>,
    /// Serializes concurrent saves so renames land in snapshot order
    save_lock: Mutex<()>,
    worker: Mutex<Option<AutoSaveWorker>>,
}

impl std::fmt::Debug for DiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("DiskTier")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &state.doc.entries.len())
            .field("total_bytes", &state.total_bytes)
            .field("auto_save", &self.is_auto_save_running())
            .finish()
    }
}

impl DiskTier {
    /// Create an empty tier backed by `path`
    ///
    /// Nothing is read until [`load`](Self::load) is called. A `max_bytes` of
    /// zero disables the size ceiling.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            ttl,
            max_bytes,
            state: RwLock::new(DiskState::from_document(DiskDocument::new())),
            save_lock: Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Maximum lifetime of a stored entry
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Replace the in-memory document with the contents of the backing file
    ///
    /// A missing file yields an empty tier. Unparseable files and files
    /// written by another format version are renamed aside and replaced with
    /// an empty document.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] when the file exists but cannot be read.
    /// The tier is left empty and usable in that case.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<LoadReport, CacheError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No cache file yet, starting empty");
                self.replace(DiskDocument::new());
                return Ok(LoadReport::default());
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read cache file, starting empty");
                self.replace(DiskDocument::new());
                return Err(CacheError::io(&self.path, e));
            },
        };

        let found_version = match serde_json::from_slice::<VersionProbe>(&raw) {
            Ok(probe) => probe.format_version,
            Err(e) => return Ok(self.recover_corrupt(&e.to_string())),
        };

        if found_version != DISK_FORMAT_VERSION {
            warn!(
                path = %self.path.display(),
                found = found_version,
                expected = DISK_FORMAT_VERSION,
                "Cache file format version mismatch, discarding"
            );
            let recovered_from = self.set_aside(&format!("v{found_version}"));
            self.replace(DiskDocument::new());
            return Ok(LoadReport {
                recovered_from,
                ..LoadReport::default()
            });
        }

        let mut doc: DiskDocument = match serde_json::from_slice(&raw) {
            Ok(doc) => doc,
            Err(e) => return Ok(self.recover_corrupt(&e.to_string())),
        };

        let before = doc.entries.len();
        doc.entries.retain(|key, entry| {
            if *key != entry.key {
                warn!(key = %key.short(), "Dropping cache entry stored under the wrong key");
                return false;
            }
            match integrity::verify(entry) {
                ChecksumStatus::Valid | ChecksumStatus::Legacy => true,
                ChecksumStatus::Mismatch => {
                    warn!(key = %key.short(), "Dropping cache entry with checksum mismatch");
                    false
                },
            }
        });

        let report = LoadReport {
            loaded: doc.entries.len(),
            dropped_invalid: before - doc.entries.len(),
            recovered_from: None,
        };
        self.replace(doc);

        info!(
            path = %self.path.display(),
            loaded = report.loaded,
            dropped = report.dropped_invalid,
            "Loaded disk cache"
        );
        Ok(report)
    }

    /// Atomically write the current document to the backing file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, the temp file write, or the final
    /// rename fails. The previous file is left untouched in every case.
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    pub fn save(&self) -> Result<(), CacheError> {
        let _saving = self.save_lock.lock();
        let bytes = {
            let mut state = self.state.write();
            state.doc.updated_at = Utc::now();
            serde_json::to_vec(&state.doc)?
        };
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Saved disk cache");
        Ok(())
    }

    /// Look up an entry
    ///
    /// Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut state = self.state.write();

        let expired = match state.doc.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                state.doc.stats.misses += 1;
                return None;
            },
        };

        if expired {
            state.remove(key);
            state.doc.stats.misses += 1;
            debug!(key = %key.short(), layer = "disk", "Cache entry expired, removed");
            return None;
        }

        state.doc.stats.hits += 1;
        let entry = state.doc.entries.get_mut(key)?;
        entry.record_access();
        let entry = entry.clone();

        // A growing access count can push the document over the cap
        if let Ok(size) = serialized_size(key, &entry) {
            state.resize(key, size);
            state.enforce_cap(self.max_bytes, key);
        }
        Some(entry)
    }

    /// Store an entry
    ///
    /// The entry's expiry is clamped to the tier TTL and its checksum is
    /// sealed. When the size ceiling is exceeded the oldest entries are
    /// evicted until the total fits again. Sizes are measured exactly as the
    /// entry appears in the saved file, map key included.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EntryTooLarge`] if the entry alone exceeds the
    /// ceiling.
    pub fn put(&self, key: CacheKey, mut entry: CacheEntry) -> Result<(), CacheError> {
        entry.expires_at = entry.expires_at.min(entry.expiry_cap(self.ttl));
        integrity::seal(&mut entry);
        let size = serialized_size(&key, &entry)?;

        if self.max_bytes > 0 && size > self.max_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let mut state = self.state.write();
        state.insert(key.clone(), entry, size);
        state.enforce_cap(self.max_bytes, &key);
        Ok(())
    }

    /// Remove an entry; returns whether it was present
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.state.write().remove(key).is_some()
    }

    /// Remove every entry and persist the empty document
    ///
    /// Counters are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the immediate save fails.
    pub fn clear(&self) -> Result<(), CacheError> {
        {
            let mut state = self.state.write();
            state.doc.entries.clear();
            state.sizes.clear();
            state.total_bytes = 0;
        }
        self.save()
    }

    /// Remove every expired entry and return how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write();
        let now = Utc::now();

        let expired: Vec<CacheKey> = state
            .doc
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        state.doc.stats.evictions += expired.len() as u64;

        if !expired.is_empty() {
            debug!(removed = expired.len(), layer = "disk", "Cleaned up expired cache entries");
        }
        expired.len()
    }

    /// Whether the key is stored, without touching counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.read().doc.entries.contains_key(key)
    }

    /// Current number of entries
    pub fn size(&self) -> usize {
        self.state.read().doc.entries.len()
    }

    /// Snapshot of the tier's counters and metadata
    pub fn stats(&self) -> DiskStats {
        let state = self.state.read();
        let counters = state.doc.stats;
        DiskStats {
            cache: CacheStats {
                hits: counters.hits,
                misses: counters.misses,
                evictions: counters.evictions,
                size: state.doc.entries.len(),
                max_size: 0,
                total_size_bytes: state.total_bytes,
            },
            path: self.path.clone(),
            format_version: state.doc.format_version,
            ttl: self.ttl,
            created_at: state.doc.created_at,
            updated_at: state.doc.updated_at,
            max_bytes: self.max_bytes,
        }
    }

    /// Start the periodic save worker
    ///
    /// Returns `false` without starting anything when a worker is already
    /// running, the interval is zero, or no Tokio runtime is available.
    pub fn start_auto_save(self: &Arc<Self>, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!(path = %self.path.display(), "Refusing to start auto-save with a zero interval");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(path = %self.path.display(), "No Tokio runtime, auto-save not started");
            return false;
        };

        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!(path = %self.path.display(), "Auto-save already running");
            return false;
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = runtime.spawn(auto_save_loop(Arc::downgrade(self), interval, shutdown_rx));
        *worker = Some(AutoSaveWorker { shutdown, handle });

        info!(
            path = %self.path.display(),
            interval_secs = interval.as_secs(),
            "Started cache auto-save"
        );
        true
    }

    /// Whether the periodic save worker is running
    pub fn is_auto_save_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Stop the periodic save worker and flush once more
    ///
    /// Returns only after the worker task has exited. Does nothing when no
    /// worker was started.
    ///
    /// # Errors
    ///
    /// Returns an error if the final save fails.
    pub async fn stop(&self) -> Result<(), CacheError> {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return Ok(());
        };

        let _ = worker.shutdown.send(());
        if let Err(e) = worker.handle.await {
            warn!(path = %self.path.display(), error = %e, "Auto-save worker ended abnormally");
        }

        self.save()?;
        info!(path = %self.path.display(), "Stopped cache auto-save");
        Ok(())
    }

    fn replace(&self, doc: DiskDocument) {
        *self.state.write() = DiskState::from_document(doc);
    }

    fn recover_corrupt(&self, reason: &str) -> LoadReport {
        warn!(path = %self.path.display(), error = reason, "Cache file is corrupt, starting empty");
        let recovered_from = self.set_aside("corrupt");
        self.replace(DiskDocument::new());
        LoadReport {
            recovered_from,
            ..LoadReport::default()
        }
    }

    /// Rename the backing file to `<name>.<label>-<timestamp>`
    fn set_aside(&self, label: &str) -> Option<PathBuf> {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "cache".into(), |n| n.to_string_lossy().into_owned());
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let backup = self.path.with_file_name(format!("{name}.{label}-{stamp}"));

        match fs::rename(&self.path, &backup) {
            Ok(()) => {
                warn!(backup = %backup.display(), "Preserved unusable cache file");
                Some(backup)
            },
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to preserve unusable cache file");
                None
            },
        }
    }
}

async fn auto_save_loop(
    tier: Weak<DiskTier>,
    interval: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let Some(tier) = tier.upgrade() else {
                    break;
                };
                match tokio::task::spawn_blocking(move || tier.save()).await {
                    Ok(Ok(())) => {},
                    Ok(Err(e)) => warn!(error = %e, "Periodic cache save failed"),
                    Err(e) => warn!(error = %e, "Periodic cache save task failed"),
                }
            }
        }
    }
    debug!("Auto-save worker exited");
}

/// Bytes `"<key>":<entry>,` occupies in the compact document
fn serialized_size(key: &CacheKey, entry: &CacheEntry) -> Result<u64, serde_json::Error> {
    let framing = key.as_str().len() + 4;
    Ok((serde_json::to_vec(entry)?.len() + framing) as u64)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

    // Dropping the temp file on any early return deletes it
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| CacheError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use domain::{CompletionRequest, CompletionResponse};
    use tempfile::TempDir;

    use super::*;
    use crate::cache::key::generate_cache_key;

    const HOUR: Duration = Duration::from_secs(3600);

    fn entry_for(prompt: &str, content: &str) -> (CacheKey, CacheEntry) {
        let (key, fp) =
            generate_cache_key(&CompletionRequest::new().with_user_message(prompt)).unwrap();
        let entry = CacheEntry::new(key.clone(), fp, CompletionResponse::text(content), HOUR);
        (key, entry)
    }

    fn tier_in(dir: &TempDir) -> DiskTier {
        DiskTier::new(dir.path().join("cache.json"), HOUR, 0)
    }

    fn backups(dir: &TempDir) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n != "cache.json")
            .collect()
    }

    #[test]
    fn load_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let report = tier.load().unwrap();
        assert_eq!(report, LoadReport::default());
        assert_eq!(tier.size(), 0);
    }

    #[test]
    fn put_get_hit_and_miss() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (key, entry) = entry_for("q", "a");
        tier.put(key.clone(), entry).unwrap();

        let hit = tier.get(&key).unwrap();
        assert_eq!(hit.response.content, "a");
        assert_eq!(hit.access_count, 1);
        let (missing, _) = entry_for("other", "x");
        assert!(tier.get(&missing).is_none());

        let stats = tier.stats().cache;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn put_seals_checksum_and_clamps_expiry() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::new(dir.path().join("cache.json"), Duration::from_secs(60), 0);
        let (key, entry) = entry_for("q", "a");
        let created = entry.created_at;
        tier.put(key.clone(), entry).unwrap();

        let stored = tier.get(&key).unwrap();
        assert_eq!(integrity::verify(&stored), ChecksumStatus::Valid);
        assert_eq!(stored.expires_at, created + chrono::Duration::seconds(60));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (k1, e1) = entry_for("1", "one");
        let (k2, e2) = entry_for("2", "two");
        tier.put(k1.clone(), e1).unwrap();
        tier.put(k2.clone(), e2).unwrap();
        tier.save().unwrap();

        let reloaded = tier_in(&dir);
        let report = reloaded.load().unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(reloaded.get(&k1).unwrap().response.content, "one");
        assert_eq!(reloaded.get(&k2).unwrap().response.content, "two");
    }

    #[test]
    fn save_creates_parent_directories_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/cache.json");
        let tier = DiskTier::new(&path, HOUR, 0);
        tier.save().unwrap();

        assert!(path.exists());
        let siblings: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(siblings.len(), 1);
    }

    #[test]
    fn corrupt_file_is_set_aside() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cache.json"), b"\x00not json{{").unwrap();

        let tier = tier_in(&dir);
        let report = tier.load().unwrap();
        assert!(report.recovered_from.is_some());
        assert_eq!(tier.size(), 0);

        let names = backups(&dir);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("cache.json.corrupt-"));
        assert!(!dir.path().join("cache.json").exists());
    }

    #[test]
    fn version_mismatch_is_set_aside() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cache.json"),
            r#"{"format_version": 99, "entries": {}}"#,
        )
        .unwrap();

        let tier = tier_in(&dir);
        let report = tier.load().unwrap();
        assert!(report.recovered_from.is_some());
        let names = backups(&dir);
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("cache.json.v99-"));
    }

    #[test]
    fn tampered_entry_is_dropped_on_load() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (good, e1) = entry_for("good", "fine");
        let (bad, e2) = entry_for("bad", "original");
        tier.put(good.clone(), e1).unwrap();
        tier.put(bad.clone(), e2).unwrap();
        tier.save().unwrap();

        let path = dir.path().join("cache.json");
        let text = fs::read_to_string(&path).unwrap();
        fs::write(&path, text.replace("\"original\"", "\"tampered\"")).unwrap();

        let reloaded = tier_in(&dir);
        let report = reloaded.load().unwrap();
        assert_eq!(report.loaded, 1);
        assert_eq!(report.dropped_invalid, 1);
        assert!(reloaded.contains(&good));
        assert!(!reloaded.contains(&bad));
    }

    #[test]
    fn legacy_entry_without_checksum_is_kept() {
        let dir = TempDir::new().unwrap();
        let (key, entry) = entry_for("legacy", "old");
        let mut doc = DiskDocument::new();
        doc.entries.insert(key.clone(), entry);
        fs::write(
            dir.path().join("cache.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let tier = tier_in(&dir);
        let report = tier.load().unwrap();
        assert_eq!(report.loaded, 1);
        let loaded = tier.get(&key).unwrap();
        assert!(loaded.checksum.is_empty());
    }

    #[test]
    fn entry_under_wrong_key_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (_, entry) = entry_for("a", "x");
        let (other_key, _) = entry_for("b", "y");
        let mut doc = DiskDocument::new();
        doc.entries.insert(other_key, entry);
        fs::write(
            dir.path().join("cache.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let tier = tier_in(&dir);
        let report = tier.load().unwrap();
        assert_eq!(report.loaded, 0);
        assert_eq!(report.dropped_invalid, 1);
    }

    #[test]
    fn clear_persists_immediately_and_keeps_counters() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (key, entry) = entry_for("q", "a");
        tier.put(key.clone(), entry).unwrap();
        let _ = tier.get(&key);

        tier.clear().unwrap();
        assert_eq!(tier.size(), 0);
        assert_eq!(tier.stats().cache.hits, 1);

        let reloaded = tier_in(&dir);
        reloaded.load().unwrap();
        assert_eq!(reloaded.size(), 0);
        assert_eq!(reloaded.stats().cache.hits, 1);
    }

    #[test]
    fn expired_entries_are_misses_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (k1, mut e1) = entry_for("old", "a");
        e1.created_at = Utc::now() - chrono::Duration::minutes(30);
        e1.expires_at = Utc::now() - chrono::Duration::minutes(1);
        let (k2, mut e2) = entry_for("older", "b");
        e2.created_at = Utc::now() - chrono::Duration::minutes(30);
        e2.expires_at = Utc::now() - chrono::Duration::minutes(1);
        let (k3, e3) = entry_for("fresh", "c");
        tier.put(k1.clone(), e1).unwrap();
        tier.put(k2, e2).unwrap();
        tier.put(k3.clone(), e3).unwrap();

        assert!(tier.get(&k1).is_none());
        assert_eq!(tier.stats().cache.misses, 1);
        assert_eq!(tier.cleanup_expired(), 1);
        assert_eq!(tier.size(), 1);
        assert!(tier.contains(&k3));
        assert_eq!(tier.stats().cache.evictions, 1);
    }

    #[test]
    fn size_cap_evicts_oldest_entries() {
        let dir = TempDir::new().unwrap();
        let (k1, mut e1) = entry_for("1", "aaaa");
        let (k2, mut e2) = entry_for("2", "bbbb");
        let (k3, e3) = entry_for("3", "cccc");
        e1.created_at -= chrono::Duration::seconds(20);
        e2.created_at -= chrono::Duration::seconds(10);

        let mut sealed = e1.clone();
        integrity::seal(&mut sealed);
        let one = serialized_size(&k1, &sealed).unwrap();
        // Room for two entries but not three
        let tier = DiskTier::new(dir.path().join("cache.json"), HOUR, one * 2 + one / 2);

        tier.put(k1.clone(), e1).unwrap();
        tier.put(k2.clone(), e2).unwrap();
        tier.put(k3.clone(), e3).unwrap();

        assert!(!tier.contains(&k1));
        assert!(tier.contains(&k2));
        assert!(tier.contains(&k3));
        let stats = tier.stats();
        assert_eq!(stats.cache.evictions, 1);
        assert!(stats.cache.total_size_bytes <= stats.max_bytes);
    }

    #[test]
    fn saved_file_stays_within_size_cap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        // Header, empty entry map and counters
        let empty = DiskTier::new(dir.path().join("empty.json"), HOUR, 0);
        empty.save().unwrap();
        let overhead = fs::metadata(dir.path().join("empty.json")).unwrap().len() + 32;

        let tier = DiskTier::new(&path, HOUR, 4000);
        let mut keys = Vec::new();
        for i in 0..50 {
            let (key, entry) = entry_for(&format!("prompt {i}"), &format!("answer number {i}"));
            tier.put(key.clone(), entry).unwrap();
            keys.push(key);
        }
        // Bump access counts of whatever survived
        for _ in 0..12 {
            for key in &keys {
                let _ = tier.get(key);
            }
        }
        tier.save().unwrap();

        let stats = tier.stats();
        let file_len = fs::metadata(&path).unwrap().len();
        assert!(stats.cache.size > 1);
        assert!(stats.cache.total_size_bytes <= 4000);
        assert!(
            file_len <= 4000 + overhead,
            "file {file_len} exceeds cap 4000 plus overhead {overhead}"
        );
    }

    #[test]
    fn access_count_growth_is_tracked() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (key, entry) = entry_for("q", "a");
        tier.put(key.clone(), entry).unwrap();
        let before = tier.stats().cache.total_size_bytes;

        for _ in 0..10 {
            tier.get(&key).unwrap();
        }
        let stored = tier.get(&key).unwrap();
        let after = tier.stats().cache.total_size_bytes;
        assert_eq!(after, serialized_size(&key, &stored).unwrap());
        assert!(after > before);
    }

    #[test]
    fn entry_larger_than_cap_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::new(dir.path().join("cache.json"), HOUR, 16);
        let (key, entry) = entry_for("q", "a response far larger than sixteen bytes");
        let err = tier.put(key.clone(), entry).unwrap_err();
        assert!(matches!(err, CacheError::EntryTooLarge { max: 16, .. }));
        assert!(!tier.contains(&key));
    }

    #[test]
    fn replacing_entry_updates_byte_total() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        let (key, entry) = entry_for("q", "short");
        tier.put(key.clone(), entry.clone()).unwrap();
        let before = tier.stats().cache.total_size_bytes;

        let mut longer = entry;
        longer.response.content = "a considerably longer response".into();
        tier.put(key, longer).unwrap();
        let after = tier.stats().cache.total_size_bytes;
        assert!(after > before);
        assert_eq!(tier.size(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_reports_io_error_and_stays_usable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, b"{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        let tier = tier_in(&dir);
        // Root can read regardless of mode bits
        if fs::read(&path).is_ok() {
            return;
        }
        assert!(matches!(tier.load(), Err(CacheError::Io { .. })));
        let (key, entry) = entry_for("q", "a");
        tier.put(key.clone(), entry).unwrap();
        assert!(tier.contains(&key));
    }

    #[tokio::test]
    async fn auto_save_runs_and_stop_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let tier = Arc::new(DiskTier::new(&path, HOUR, 0));

        assert!(tier.start_auto_save(Duration::from_millis(20)));
        assert!(!tier.start_auto_save(Duration::from_millis(20)));
        assert!(tier.is_auto_save_running());

        let (key, entry) = entry_for("q", "a");
        tier.put(key.clone(), entry).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(path.exists());

        let (late, entry) = entry_for("late", "b");
        tier.put(late.clone(), entry).unwrap();
        tier.stop().await.unwrap();
        assert!(!tier.is_auto_save_running());

        let reloaded = DiskTier::new(&path, HOUR, 0);
        reloaded.load().unwrap();
        assert!(reloaded.contains(&key));
        assert!(reloaded.contains(&late));
    }

    #[tokio::test]
    async fn stop_without_worker_is_noop() {
        let dir = TempDir::new().unwrap();
        let tier = tier_in(&dir);
        tier.stop().await.unwrap();
        tier.stop().await.unwrap();
        assert!(!dir.path().join("cache.json").exists());
    }

    #[tokio::test]
    async fn zero_interval_is_refused() {
        let dir = TempDir::new().unwrap();
        let tier = Arc::new(tier_in(&dir));
        assert!(!tier.start_auto_save(Duration::ZERO));
        assert!(!tier.is_auto_save_running());
    }

    #[test]
    fn auto_save_needs_a_runtime() {
        let dir = TempDir::new().unwrap();
        let tier = Arc::new(tier_in(&dir));
        assert!(!tier.start_auto_save(Duration::from_secs(1)));
    }

    #[test]
    fn stats_describe_the_document() {
        let dir = TempDir::new().unwrap();
        let tier = DiskTier::new(dir.path().join("cache.json"), HOUR, 1024);
        let stats = tier.stats();
        assert_eq!(stats.format_version, DISK_FORMAT_VERSION);
        assert_eq!(stats.ttl, HOUR);
        assert_eq!(stats.max_bytes, 1024);
        assert_eq!(stats.cache.size, 0);
    }
}
