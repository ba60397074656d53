//! Sentra Edge - Synchronization Engine
//!
//! Drives one full cycle against the remote store:
//!
//! ```text
//! Idle -> Checking -> Fetching -> Decrypting -> Committing -> Idle
//!           |            |            |             |
//!           +------------+------------+-------------+--> Error
//! ```
//!
//! A run either commits a complete batch or leaves every durable artifact
//! untouched. Per-asset decryption/extraction failures are skips, not run
//! failures; network exhaustion, malformed profiles and cancellation abort
//! the run with zero mutation. The decrypted cache is replaced by staging
//! the new content and swapping directories with atomic renames, so readers
//! never observe a half-written mixture.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use sentra_keyvault::{open as envelope_open, CipherSuite, KeyVault, SealedAsset};

use crate::embedder::FaceEmbedder;
use crate::error::{EdgeError, EdgeResult};
use crate::profile::{AssetRef, ProfileSnapshot};
use crate::remote::RemoteStore;
use crate::state::SyncState;
use crate::store::{CommitBatch, EmbeddingRecord, EmbeddingStore};

/// Engine phase, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Checking,
    Fetching,
    Decrypting,
    Committing,
    Error,
}

/// Bounded retry with exponential backoff for transient network failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// What one engine run accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote profile not newer than local state; nothing fetched
    UpToDate,
    /// A batch was committed (possibly with per-asset skips)
    Committed(SyncReport),
    /// Another run is in flight; this trigger was coalesced away
    AlreadyRunning,
}

/// Per-run accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Blobs downloaded
    pub fetched: usize,
    /// Assets newly decrypted and applied
    pub committed: usize,
    /// Assets whose content identity was unchanged (no recompute)
    pub unchanged: usize,
    /// Decrypted assets with no detectable face (valid, no record)
    pub no_face: usize,
    /// Assets skipped because decryption or extraction failed
    pub skipped: usize,
    /// Stale records removed (asset no longer referenced)
    pub removed: usize,
    /// Human-readable reasons for the skips
    pub errors: Vec<String>,
}

impl SyncReport {
    /// True when every referenced asset was applied.
    pub fn is_clean(&self) -> bool {
        self.skipped == 0
    }
}

/// Cancellation handle for a running engine; sticky once triggered.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// One decrypted asset ready to commit.
struct PreparedAsset {
    id: String,
    content_hash: String,
    cache_name: String,
    plaintext: Option<Vec<u8>>,
    record: Option<EmbeddingRecord>,
}

/// The synchronization engine. Not reentrant: a trigger while a run is in
/// flight returns [`SyncOutcome::AlreadyRunning`].
pub struct SyncEngine<R: RemoteStore, E: FaceEmbedder> {
    remote: R,
    vault: Arc<KeyVault>,
    store: Arc<EmbeddingStore>,
    embedder: E,
    product_key: String,
    cache_dir: PathBuf,
    profile_path: PathBuf,
    retry: RetryPolicy,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
    phase: Mutex<SyncPhase>,
}

impl<R: RemoteStore, E: FaceEmbedder> SyncEngine<R, E> {
    pub fn new(
        remote: R,
        vault: Arc<KeyVault>,
        store: Arc<EmbeddingStore>,
        embedder: E,
        product_key: String,
        cache_dir: PathBuf,
        profile_path: PathBuf,
    ) -> Self {
        Self {
            remote,
            vault,
            store,
            embedder,
            product_key,
            cache_dir,
            profile_path,
            retry: RetryPolicy::default(),
            running: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            phase: Mutex::new(SyncPhase::Idle),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Handle for cancelling this engine (e.g. on shutdown). Sticky.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock()
    }

    /// Run one sync cycle to completion, failure, or no-op.
    pub async fn run(&self) -> EdgeResult<SyncOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("sync trigger coalesced: run already in flight");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.run_inner().await;
        self.set_phase(match &result {
            Ok(_) => SyncPhase::Idle,
            Err(_) => SyncPhase::Error,
        });
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> EdgeResult<SyncOutcome> {
        // ── Checking ────────────────────────────────────────────────────
        self.set_phase(SyncPhase::Checking);
        self.check_cancelled()?;
        let snapshot = self
            .with_backoff("profile fetch", || {
                self.remote.fetch_profile(&self.product_key)
            })
            .await?;

        let state = self.store.load_state()?;
        if !state.is_stale_against(snapshot.updated_at) {
            log::info!(
                "profile unchanged since {:?}; nothing to do",
                state.last_updated_at
            );
            return Ok(SyncOutcome::UpToDate);
        }

        let mut report = SyncReport::default();

        // ── Fetching ────────────────────────────────────────────────────
        self.set_phase(SyncPhase::Fetching);
        let mut fetched: Vec<(AssetRef, Vec<u8>)> = Vec::with_capacity(snapshot.assets.len());
        for asset in &snapshot.assets {
            self.check_cancelled()?;
            let blob = self
                .with_backoff("blob fetch", || self.remote.fetch_blob(&asset.url))
                .await?;
            report.fetched += 1;
            fetched.push((asset.clone(), blob));
        }

        // ── Decrypting ──────────────────────────────────────────────────
        self.set_phase(SyncPhase::Decrypting);
        let mut prepared: Vec<PreparedAsset> = Vec::new();
        for (asset, blob) in fetched {
            self.check_cancelled()?;

            let content_hash = hex::encode(Sha256::digest(&blob));
            if state.has_content(&asset.id, &content_hash) {
                if let Some(cache_name) = self.find_cached(&asset.id) {
                    log::debug!("asset {} unchanged; carrying forward", asset.id);
                    report.unchanged += 1;
                    prepared.push(PreparedAsset {
                        id: asset.id,
                        content_hash,
                        cache_name,
                        plaintext: None,
                        record: None,
                    });
                    continue;
                }
                // Cache file went missing: fall through and re-decrypt
            }

            match self.decrypt_and_extract(&asset, &blob, &content_hash, &snapshot) {
                Ok((cache_name, plaintext, record)) => {
                    if record.is_none() {
                        report.no_face += 1;
                    } else {
                        report.committed += 1;
                    }
                    prepared.push(PreparedAsset {
                        id: asset.id,
                        content_hash,
                        cache_name,
                        plaintext: Some(plaintext),
                        record,
                    });
                }
                Err(e) => {
                    log::warn!("asset {} skipped: {e}", asset.id);
                    report.errors.push(format!("{}: {e}", asset.id));
                    report.skipped += 1;
                }
            }
        }

        // ── Committing ──────────────────────────────────────────────────
        self.set_phase(SyncPhase::Committing);
        self.check_cancelled()?;

        let mut new_state = SyncState {
            last_updated_at: Some(snapshot.updated_at),
            committed: Default::default(),
        };
        for p in &prepared {
            new_state
                .committed
                .insert(p.id.clone(), p.content_hash.clone());
        }
        // A skipped asset keeps whatever was committed for it before; it is
        // retried when the remote content actually changes.
        let referenced: std::collections::BTreeSet<&str> =
            snapshot.assets.iter().map(|a| a.id.as_str()).collect();
        for (id, hash) in &state.committed {
            if referenced.contains(id.as_str()) && !new_state.committed.contains_key(id) {
                new_state.committed.insert(id.clone(), hash.clone());
            }
        }

        let removals: Vec<String> = state
            .committed
            .keys()
            .filter(|id| !referenced.contains(id.as_str()))
            .cloned()
            .collect();
        report.removed = removals.len();

        let upserts: Vec<EmbeddingRecord> =
            prepared.iter().filter_map(|p| p.record.clone()).collect();

        self.store.commit_batch(&CommitBatch {
            upserts,
            removals,
            state: new_state,
        })?;
        self.swap_cache(&prepared)?;
        write_json_atomic(&self.profile_path, &snapshot.meta())?;

        log::info!(
            "sync committed: {} fetched, {} new, {} unchanged, {} no-face, {} skipped, {} removed",
            report.fetched,
            report.committed,
            report.unchanged,
            report.no_face,
            report.skipped,
            report.removed
        );
        Ok(SyncOutcome::Committed(report))
    }

    /// Envelope-open one blob and derive its embedding. Any failure here is
    /// a per-asset skip for the caller.
    fn decrypt_and_extract(
        &self,
        asset: &AssetRef,
        blob: &[u8],
        content_hash: &str,
        snapshot: &ProfileSnapshot,
    ) -> EdgeResult<(String, Vec<u8>, Option<EmbeddingRecord>)> {
        let sealed =
            SealedAsset::from_blob(blob, asset.wrapped_key.clone(), CipherSuite::CURRENT)?;
        let plaintext = envelope_open(&sealed, |wrapped| self.vault.unwrap_key(wrapped))?;

        let record = self
            .embedder
            .embed(&plaintext)?
            .map(|vector| EmbeddingRecord {
                asset_id: asset.id.clone(),
                vector,
                label: snapshot.display_name.clone(),
                content_hash: content_hash.to_string(),
                created_at: Utc::now(),
            });

        let cache_name = format!("{}{}", cache_stem(&asset.id), sniff_extension(&plaintext));
        Ok((cache_name, plaintext, record))
    }

    /// Stage the new cache content and swap it in with atomic renames.
    fn swap_cache(&self, prepared: &[PreparedAsset]) -> EdgeResult<()> {
        let staging = self.cache_dir.join("staging");
        let current = self.cache_dir.join("current");
        let old = self.cache_dir.join("old");

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        for p in prepared {
            match &p.plaintext {
                Some(bytes) => fs::write(staging.join(&p.cache_name), bytes)?,
                // Carried forward: reuse the previously decrypted file
                None => {
                    fs::copy(current.join(&p.cache_name), staging.join(&p.cache_name))?;
                }
            }
        }

        if old.exists() {
            fs::remove_dir_all(&old)?;
        }
        if current.exists() {
            fs::rename(&current, &old)?;
        }
        fs::rename(&staging, &current)?;
        if old.exists() {
            let _ = fs::remove_dir_all(&old);
        }
        Ok(())
    }

    /// Locate the cached decrypted file for an asset id, if present.
    fn find_cached(&self, asset_id: &str) -> Option<String> {
        let stem = cache_stem(asset_id);
        let entries = fs::read_dir(self.cache_dir.join("current")).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.strip_prefix(stem).is_some_and(|rest| {
                rest.is_empty() || (rest.starts_with('.') && !rest[1..].contains('.'))
            }) {
                return Some(name);
            }
        }
        None
    }

    async fn with_backoff<T, F, Fut>(&self, what: &str, mut op: F) -> EdgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = EdgeResult<T>>,
    {
        let mut delay = self.retry.base_delay;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    log::warn!(
                        "{what} failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_cancelled(&self) -> EdgeResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(EdgeError::Cancelled);
        }
        Ok(())
    }

    fn set_phase(&self, phase: SyncPhase) {
        log::debug!("sync phase -> {phase:?}");
        *self.phase.lock() = phase;
    }
}

/// Asset id without its wire extension; the cached file gets the sniffed one.
fn cache_stem(asset_id: &str) -> &str {
    asset_id
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .filter(|stem| !stem.is_empty())
        .unwrap_or(asset_id)
}

/// Pick a file extension from the decrypted image's magic bytes.
fn sniff_extension(data: &[u8]) -> &'static str {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ".jpg"
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        ".png"
    } else if data.starts_with(b"GIF89a") || data.starts_with(b"GIF87a") {
        ".gif"
    } else {
        ".bin"
    }
}

/// Serialize to JSON via temp file + rename.
fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> EdgeResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp = path.with_extension("tmp");
    fs::write(&temp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::AssetRef;
    use chrono::DateTime;
    use sentra_keyvault::seal;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use tempfile::{tempdir, TempDir};

    /// In-memory remote with fetch accounting and fault injection.
    struct FakeRemote {
        profile: Mutex<ProfileSnapshot>,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
        blob_fetches: AtomicUsize,
        fail_blobs: AtomicBool,
        profile_delay: Mutex<Option<Duration>>,
    }

    impl FakeRemote {
        fn new(profile: ProfileSnapshot) -> Arc<Self> {
            Arc::new(Self {
                profile: Mutex::new(profile),
                blobs: Mutex::new(HashMap::new()),
                blob_fetches: AtomicUsize::new(0),
                fail_blobs: AtomicBool::new(false),
                profile_delay: Mutex::new(None),
            })
        }

        fn fetch_count(&self) -> usize {
            self.blob_fetches.load(Ordering::SeqCst)
        }
    }

    impl RemoteStore for Arc<FakeRemote> {
        async fn fetch_profile(&self, _product_key: &str) -> EdgeResult<ProfileSnapshot> {
            let snapshot = self.profile.lock().clone();
            let delay = *self.profile_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(snapshot)
        }

        async fn fetch_blob(&self, url: &str) -> EdgeResult<Vec<u8>> {
            self.blob_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_blobs.load(Ordering::SeqCst) {
                return Err(EdgeError::Network("injected blob failure".into()));
            }
            self.blobs
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| EdgeError::Network(format!("no blob at {url}")))
        }

        async fn publish_public_key(
            &self,
            _product_key: &str,
            _public_key_pem: &str,
        ) -> EdgeResult<()> {
            Ok(())
        }
    }

    /// Deterministic embedder keyed on plaintext bytes; `NOFACE`-prefixed
    /// payloads count as faceless.
    struct ByteEmbedder;

    impl FaceEmbedder for ByteEmbedder {
        fn embed(&self, bytes: &[u8]) -> EdgeResult<Option<Vec<f32>>> {
            if bytes.starts_with(b"NOFACE") {
                return Ok(None);
            }
            let mut vector = vec![0.0f32; 4];
            for (i, b) in bytes.iter().enumerate() {
                vector[i % 4] += *b as f32;
            }
            Ok(Some(vector))
        }
    }

    struct Harness {
        _dir: TempDir,
        remote: Arc<FakeRemote>,
        store: Arc<EmbeddingStore>,
        engine: SyncEngine<Arc<FakeRemote>, ByteEmbedder>,
        cache_dir: PathBuf,
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn snapshot(updated_at: &str, assets: Vec<AssetRef>) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: "user-1".into(),
            display_name: Some("Test User".into()),
            updated_at: ts(updated_at),
            assets,
        }
    }

    /// Seal `payloads` for the vault, register blobs in the remote, return
    /// the matching asset refs.
    fn seed_assets(vault: &KeyVault, remote: &FakeRemote, payloads: &[&[u8]]) -> Vec<AssetRef> {
        let pem = vault.public_key_pem().unwrap();
        let mut refs = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            let sealed = seal(payload, &pem).unwrap();
            let id = format!("face_{}.bin", i + 1);
            remote.blobs.lock().insert(id.clone(), sealed.to_blob());
            refs.push(AssetRef {
                id: id.clone(),
                url: id,
                wrapped_key: sealed.wrapped_key,
            });
        }
        refs
    }

    fn harness(profile: ProfileSnapshot) -> Harness {
        let dir = tempdir().unwrap();
        let vault = Arc::new(KeyVault::generate(dir.path().join("keys"), 2048).unwrap());
        let store = Arc::new(EmbeddingStore::open(dir.path().join("store.db")).unwrap());
        let remote = FakeRemote::new(profile);
        let cache_dir = dir.path().join("cache");

        let engine = SyncEngine::new(
            Arc::clone(&remote),
            Arc::clone(&vault),
            Arc::clone(&store),
            ByteEmbedder,
            "PK-TEST".into(),
            cache_dir.clone(),
            dir.path().join("profile.json"),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        });

        Harness {
            _dir: dir,
            remote,
            store,
            engine,
            cache_dir,
        }
    }

    fn harness_with_payloads(updated_at: &str, payloads: &[&[u8]]) -> Harness {
        let h = harness(snapshot(updated_at, vec![]));
        let vault = KeyVault::open(h._dir.path().join("keys")).unwrap();
        let assets = seed_assets(&vault, &h.remote, payloads);
        h.remote.profile.lock().assets = assets;
        h
    }

    #[tokio::test]
    async fn test_full_cycle_commits_batch() {
        let h = harness_with_payloads(
            "2026-01-10T12:00:00Z",
            &[b"payload-one", b"payload-two", b"NOFACE-three"],
        );

        let outcome = h.engine.run().await.unwrap();
        let report = match outcome {
            SyncOutcome::Committed(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert_eq!(report.fetched, 3);
        assert_eq!(report.committed, 2);
        assert_eq!(report.no_face, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.is_clean());

        // Two records (the faceless asset has none), all three committed
        assert_eq!(h.store.count().unwrap(), 2);
        let state = h.store.load_state().unwrap();
        assert_eq!(state.last_updated_at, Some(ts("2026-01-10T12:00:00Z")));
        assert_eq!(state.committed.len(), 3);

        // Cache swapped into place
        let cached: Vec<_> = fs::read_dir(h.cache_dir.join("current"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(cached.len(), 3);
        assert!(h.engine.phase() == SyncPhase::Idle);
    }

    #[tokio::test]
    async fn test_unchanged_profile_is_a_noop() {
        let h = harness_with_payloads("2026-01-10T12:00:00Z", &[b"payload-one"]);

        assert!(matches!(
            h.engine.run().await.unwrap(),
            SyncOutcome::Committed(_)
        ));
        let fetches_after_first = h.remote.fetch_count();
        let records_after_first = h.store.all_records().unwrap();
        let state_after_first = h.store.load_state().unwrap();

        // Same updated_at: zero fetches, store and state untouched
        let outcome = h.engine.run().await.unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert_eq!(h.remote.fetch_count(), fetches_after_first);
        assert_eq!(h.store.all_records().unwrap(), records_after_first);
        assert_eq!(h.store.load_state().unwrap(), state_after_first);
    }

    #[tokio::test]
    async fn test_bumped_timestamp_unchanged_content_skips_recompute() {
        let h = harness_with_payloads("2026-01-10T12:00:00Z", &[b"payload-one"]);
        h.engine.run().await.unwrap();
        let before = h.store.all_records().unwrap();

        h.remote.profile.lock().updated_at = ts("2026-01-11T12:00:00Z");
        let outcome = h.engine.run().await.unwrap();

        let report = match outcome {
            SyncOutcome::Committed(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.committed, 0);

        // Same derivation, same record (created_at included)
        assert_eq!(h.store.all_records().unwrap(), before);
        assert_eq!(
            h.store.load_state().unwrap().last_updated_at,
            Some(ts("2026-01-11T12:00:00Z"))
        );
    }

    #[tokio::test]
    async fn test_poisoned_asset_is_skipped_not_fatal() {
        let h = harness_with_payloads(
            "2026-01-10T12:00:00Z",
            &[b"payload-one", b"payload-two", b"payload-three"],
        );
        // Corrupt the wrapped key of asset 2: unwrap will fail
        h.remote.profile.lock().assets[1].wrapped_key[0] ^= 0xFF;

        let report = match h.engine.run().await.unwrap() {
            SyncOutcome::Committed(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };

        assert_eq!(report.fetched, 3);
        assert_eq!(report.committed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.errors.len(), 1);

        let ids: Vec<_> = h
            .store
            .all_records()
            .unwrap()
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        assert_eq!(ids, vec!["face_1.bin", "face_3.bin"]);

        // Skip-and-continue policy: the batch completed, so the stamp moves
        let state = h.store.load_state().unwrap();
        assert_eq!(state.last_updated_at, Some(ts("2026-01-10T12:00:00Z")));
        assert!(!state.committed.contains_key("face_2.bin"));
    }

    #[tokio::test]
    async fn test_network_exhaustion_mutates_nothing() {
        let h = harness_with_payloads("2026-01-10T12:00:00Z", &[b"payload-one"]);
        h.remote.fail_blobs.store(true, Ordering::SeqCst);

        let result = h.engine.run().await;
        assert!(matches!(result, Err(EdgeError::Network(_))));
        assert_eq!(h.engine.phase(), SyncPhase::Error);

        // Bounded retry: exactly max_attempts tries, then give up
        assert_eq!(h.remote.fetch_count(), 3);

        // Zero mutation
        assert_eq!(h.store.count().unwrap(), 0);
        assert_eq!(h.store.load_state().unwrap(), SyncState::default());
        assert!(!h.cache_dir.join("current").exists());

        // Next trigger runs again and succeeds
        h.remote.fail_blobs.store(false, Ordering::SeqCst);
        assert!(matches!(
            h.engine.run().await.unwrap(),
            SyncOutcome::Committed(_)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_nothing() {
        let h = harness_with_payloads("2026-01-10T12:00:00Z", &[b"payload-one"]);
        h.engine.cancel_handle().cancel();

        let result = h.engine.run().await;
        assert!(matches!(result, Err(EdgeError::Cancelled)));
        assert_eq!(h.store.count().unwrap(), 0);
        assert_eq!(h.store.load_state().unwrap(), SyncState::default());
    }

    #[tokio::test]
    async fn test_dereferenced_asset_is_removed() {
        let h = harness_with_payloads(
            "2026-01-10T12:00:00Z",
            &[b"payload-one", b"payload-two"],
        );
        h.engine.run().await.unwrap();
        assert_eq!(h.store.count().unwrap(), 2);

        {
            let mut profile = h.remote.profile.lock();
            profile.updated_at = ts("2026-01-11T12:00:00Z");
            profile.assets.remove(1);
        }

        let report = match h.engine.run().await.unwrap() {
            SyncOutcome::Committed(report) => report,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(report.removed, 1);

        let ids: Vec<_> = h
            .store
            .all_records()
            .unwrap()
            .into_iter()
            .map(|r| r.asset_id)
            .collect();
        assert_eq!(ids, vec!["face_1.bin"]);
        assert!(!h
            .store
            .load_state()
            .unwrap()
            .committed
            .contains_key("face_2.bin"));
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_coalesced() {
        let h = harness_with_payloads("2026-01-10T12:00:00Z", &[b"payload-one"]);
        *h.remote.profile_delay.lock() = Some(Duration::from_millis(50));

        let (first, second) = tokio::join!(h.engine.run(), h.engine.run());
        let outcomes = [first.unwrap(), second.unwrap()];
        assert!(outcomes.contains(&SyncOutcome::AlreadyRunning));
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, SyncOutcome::Committed(_))));
    }
}

