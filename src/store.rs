use std::{ffi::OsString, fs, path::{Path, PathBuf}};

use tracing::{info, warn};

use crate::data::Snapshot;
use crate::error::{MonitorError, MonitorResult};

/// Single-document "last known state". Every save replaces the whole file.
pub struct HistoryStore {
    pub path: PathBuf
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Strict read: `Ok(None)` when nothing was saved yet.
    pub fn try_load(&self) -> MonitorResult<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| MonitorError::PersistenceRead(format!("{}: {}", self.path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|e| MonitorError::PersistenceRead(format!("{}: {}", self.path.display(), e)))?;

        Ok(Some(snapshot.rekeyed()))
    }

    /// Previous snapshot, or an empty one when there is none or it cannot
    /// be read.
    pub fn load(&self) -> Snapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => {
                info!("Loaded previous snapshot with {} symbols", snapshot.len());
                snapshot
            }
            Ok(None) => {
                info!("No previous snapshot at {}, starting fresh", self.path.display());
                Snapshot::new()
            }
            Err(e) => {
                warn!("{}, treating as no prior state", e);
                Snapshot::new()
            }
        }
    }

    /// Write to a sibling temp file and rename over the target, so readers
    /// see either the old document or the new one.
    pub fn save(&self, snapshot: &Snapshot) -> MonitorResult<()> {
        // JSON has no infinities; serde_json would write null and the next
        // load could not read the document back.
        if let Some(bad) = snapshot.iter().find(|r| {
            ![r.oi, r.price, r.oi_usdt, r.time].iter().all(|v| v.is_finite())
        }) {
            return Err(MonitorError::PersistenceWrite(format!("{}: non-finite value", bad.symbol)));
        }

        let write_err = |e: std::io::Error| MonitorError::PersistenceWrite(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(snapshot)
            .map_err(|e| MonitorError::PersistenceWrite(format!("serialize: {}", e)))?;

        let tmp = self.temp_path();
        fs::write(&tmp, content).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            write_err(e)
        })?;

        info!("Saved snapshot of {} symbols to {}", snapshot.len(), self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
