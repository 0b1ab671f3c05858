//! File-based result store — one JSON record per run.
//! Human-readable, overwritten by the next run of the same mode.

use std::path::{Path, PathBuf};

use classbook_core::{Result, RunResult};

/// Writes the final [`RunResult`] of a run.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
    file_name: String,
}

impl ResultStore {
    /// Create a store writing `file_name` inside `dir`.
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            file_name: file_name.to_string(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Write the record: temp file, then rename over the target.
    pub fn save(&self, result: &RunResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path();
        let tmp = self.dir.join(format!(".{}.tmp", self.file_name));
        let json = serde_json::to_string_pretty(result)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!("💾 Saved {} result to {}", result.status, path.display());
        Ok(path)
    }

    /// Read the last record back, if any.
    pub fn load(&self) -> Result<Option<RunResult>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use classbook_core::{AppConfig, BookingOutcome, ExecutionContext, RunStatus, kst_offset, target_date};

    fn sample() -> RunResult {
        let now = kst_offset().with_ymd_and_hms(2026, 10, 20, 0, 0, 1).unwrap();
        let ctx = ExecutionContext::new(now, &AppConfig::default()).unwrap();
        RunResult::from_outcome(
            &ctx,
            now,
            &target_date(now),
            &BookingOutcome::AlreadyBooked { was_waiting: true },
            1,
            2,
        )
        .with_wait("reached", 298_412)
        .with_verification("skipped")
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(&dir.path().join("results"), "booking-result.json");
        assert!(store.load().unwrap().is_none());

        let original = sample();
        let path = store.save(&original).unwrap();
        assert_eq!(path, store.path());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.status, RunStatus::AlreadyWaiting);
        assert!(!dir.path().join("results/.booking-result.json.tmp").exists());
    }

    #[test]
    fn test_file_is_plain_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), "test-booking-result.json");
        store.save(&sample()).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["status"], "ALREADY_WAITING");
        assert_eq!(value["isWaitingReservation"], true);
        assert_eq!(value["waitedMs"], 298_412);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), "booking-result.json");
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.load(),
            Err(classbook_core::ClassbookError::Serialization(_))
        ));
    }
}
