//! Review persistence port and its backends.
//!
//! Writes are transactional per record and always non-fatal to the
//! caller: a failed save is logged and staged for retry while the
//! in-memory session state stays authoritative.

use parking_lot::Mutex;
use reelcull_core::{AssetId, ReelCullError, Result, TrimBounds};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::warn;

/// Where trim and flag decisions go when the reviewer commits them.
pub trait ReviewStore: Send + Sync {
    fn save_trim(&self, asset: AssetId, trim: TrimBounds) -> Result<()>;
    fn save_flag(&self, asset: AssetId, flagged: bool) -> Result<()>;
}

/// One asset's persisted review state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub asset_id: AssetId,
    pub trim: TrimBounds,
    pub flagged: bool,
}

impl ReviewRecord {
    fn fresh(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            trim: TrimBounds::FULL,
            flagged: false,
        }
    }
}

/// In-memory backend for tests and the demo. Counts writes so tests
/// can assert commit rates, and can be switched to reject writes.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<AssetId, ReviewRecord>>,
    trim_saves: AtomicU64,
    flag_saves: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, to exercise staged-write paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn record(&self, asset: AssetId) -> Option<ReviewRecord> {
        self.records.lock().get(&asset).cloned()
    }

    pub fn trim_save_count(&self) -> u64 {
        self.trim_saves.load(Ordering::SeqCst)
    }

    pub fn flag_save_count(&self) -> u64 {
        self.flag_saves.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReelCullError::PersistenceWrite(
                "store rejected write".into(),
            ));
        }
        Ok(())
    }
}

impl ReviewStore for MemoryStore {
    fn save_trim(&self, asset: AssetId, trim: TrimBounds) -> Result<()> {
        self.check_writable()?;
        self.records
            .lock()
            .entry(asset)
            .or_insert_with(|| ReviewRecord::fresh(asset))
            .trim = trim;
        self.trim_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn save_flag(&self, asset: AssetId, flagged: bool) -> Result<()> {
        self.check_writable()?;
        self.records
            .lock()
            .entry(asset)
            .or_insert_with(|| ReviewRecord::fresh(asset))
            .flagged = flagged;
        self.flag_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sidecar-JSON backend, one record per asset.
///
/// Layout:
/// ```text
/// project/
///   .reelcull/
///     review/
///       {asset-uuid}.json
/// ```
pub struct JsonStore {
    review_dir: PathBuf,
}

impl JsonStore {
    /// Create a store rooted at the given project directory.
    pub fn new(project_dir: &Path) -> Self {
        Self {
            review_dir: project_dir.join(".reelcull").join("review"),
        }
    }

    /// Load one asset's record, if present.
    pub fn load(&self, asset: AssetId) -> Result<Option<ReviewRecord>> {
        let path = self.record_path(asset);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .map_err(|e| ReelCullError::PersistenceWrite(format!("read {}: {e}", path.display())))?;
        let record = serde_json::from_str(&json).map_err(|e| {
            ReelCullError::PersistenceWrite(format!("parse {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    pub fn review_dir(&self) -> &Path {
        &self.review_dir
    }

    fn record_path(&self, asset: AssetId) -> PathBuf {
        self.review_dir.join(format!("{asset}.json"))
    }

    /// Read-modify-write one record. The full record is written to a
    /// temp file and renamed into place so a crash never leaves a
    /// half-written sidecar.
    fn update(&self, asset: AssetId, apply: impl FnOnce(&mut ReviewRecord)) -> Result<()> {
        std::fs::create_dir_all(&self.review_dir)
            .map_err(|e| ReelCullError::PersistenceWrite(format!("create review dir: {e}")))?;

        let path = self.record_path(asset);
        let mut record = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!(asset = %asset, error = %e, "corrupt review sidecar, rewriting");
                ReviewRecord::fresh(asset)
            }),
            Err(_) => ReviewRecord::fresh(asset),
        };
        apply(&mut record);

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| ReelCullError::PersistenceWrite(format!("serialize record: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| ReelCullError::PersistenceWrite(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| ReelCullError::PersistenceWrite(format!("commit {}: {e}", path.display())))?;
        Ok(())
    }
}

impl ReviewStore for JsonStore {
    fn save_trim(&self, asset: AssetId, trim: TrimBounds) -> Result<()> {
        self.update(asset, |record| record.trim = trim)
    }

    fn save_flag(&self, asset: AssetId, flagged: bool) -> Result<()> {
        self.update(asset, |record| record.flagged = flagged)
    }
}
