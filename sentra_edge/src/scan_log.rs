//! Sentra Edge - Recognition Log
//!
//! Append-only JSON log of recognize outcomes, one entry per probe.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EdgeResult;
use crate::matcher::MatchOutcome;

/// One logged recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEntry {
    pub timestamp: DateTime<Utc>,
    pub probe: String,
    pub matched: bool,
    pub score: Option<f32>,
    pub asset_id: Option<String>,
    pub label: Option<String>,
}

impl ScanEntry {
    pub fn from_outcome(probe: &Path, outcome: &MatchOutcome) -> Self {
        let (matched, score, asset_id, label) = match outcome {
            MatchOutcome::Match {
                asset_id,
                label,
                score,
            } => (true, Some(*score), Some(asset_id.clone()), label.clone()),
            MatchOutcome::NoMatch { best } => (
                false,
                best.as_ref().map(|(_, score)| *score),
                best.as_ref().map(|(id, _)| id.clone()),
                None,
            ),
        };
        Self {
            timestamp: Utc::now(),
            probe: probe.display().to_string(),
            matched,
            score,
            asset_id,
            label,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScanLogFile {
    scans: Vec<ScanEntry>,
}

/// Recognition log at a fixed path.
pub struct ScanLog {
    path: PathBuf,
}

impl ScanLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Append one entry, creating the log if needed. A corrupt log file is
    /// replaced rather than poisoning every future scan.
    pub fn append(&self, entry: ScanEntry) -> EdgeResult<()> {
        let mut log = self.load();
        log.scans.push(entry);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&log)?)?;
        Ok(())
    }

    /// All logged entries (empty if the log is missing or unreadable).
    pub fn entries(&self) -> Vec<ScanEntry> {
        self.load().scans
    }

    fn load(&self) -> ScanLogFile {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_reload() {
        let dir = tempdir().unwrap();
        let log = ScanLog::new(dir.path().join("scan_log.json"));

        log.append(ScanEntry::from_outcome(
            Path::new("probe.jpg"),
            &MatchOutcome::Match {
                asset_id: "face_1.bin".into(),
                label: Some("Test User".into()),
                score: 0.91,
            },
        ))
        .unwrap();
        log.append(ScanEntry::from_outcome(
            Path::new("probe2.jpg"),
            &MatchOutcome::NoMatch { best: None },
        ))
        .unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].matched);
        assert_eq!(entries[0].label.as_deref(), Some("Test User"));
        assert!(!entries[1].matched);
        assert_eq!(entries[1].score, None);
    }

    #[test]
    fn test_corrupt_log_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan_log.json");
        fs::write(&path, b"{ not json").unwrap();

        let log = ScanLog::new(&path);
        log.append(ScanEntry::from_outcome(
            Path::new("probe.jpg"),
            &MatchOutcome::NoMatch { best: None },
        ))
        .unwrap();

        assert_eq!(log.entries().len(), 1);
    }
}
