//! Local file log: one JSON document per record.
//!
//! Layout: `<log_dir>/<base_name>/<collection>/<session>/<timestamp>.json`,
//! where each file holds `{timestamp, value, metadata}`. Session names may
//! contain `/`, which nests directories (`messages/<session>/<dialog_id>`).
//!
//! Human-inspectable and dependency-free; meant for local development and
//! experiment tracking rather than high write volumes.

use std::path::{Path, PathBuf};

use lllm_core::error::LogError;
use lllm_core::log::{Collection, LogBase, LogRecord};
use tracing::{debug, warn};

pub struct LocalFileLog {
    root: PathBuf,
}

impl LocalFileLog {
    /// Open (and create) the log rooted at `log_dir/base_name`.
    pub fn new(log_dir: impl AsRef<Path>, base_name: &str) -> Result<Self, LogError> {
        let root = log_dir.as_ref().join(base_name);
        std::fs::create_dir_all(&root).map_err(|e| storage(&root, e))?;
        debug!(path = %root.display(), "Local file log opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, collection: Collection, session: &str) -> PathBuf {
        self.root.join(collection.as_str()).join(session)
    }

    /// Top-level session names in `collection`, sorted.
    pub fn sessions(&self, collection: Collection) -> Result<Vec<String>, LogError> {
        let dir = self.root.join(collection.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| storage(&dir, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }
}

impl LogBase for LocalFileLog {
    fn name(&self) -> &str {
        "localfile"
    }

    fn write(&self, collection: Collection, session: &str, record: LogRecord) -> Result<(), LogError> {
        let dir = self.session_dir(collection, session);
        std::fs::create_dir_all(&dir).map_err(|e| storage(&dir, e))?;

        // Records written within the same clock tick get a numeric suffix.
        let stem = record.timestamp.format("%Y%m%dT%H%M%S%.9fZ").to_string();
        let mut path = dir.join(format!("{stem}.json"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{stem}_{n}.json"));
            n += 1;
        }

        let body = serde_json::to_string_pretty(&record)
            .map_err(|e| LogError::Serialization(e.to_string()))?;
        std::fs::write(&path, body).map_err(|e| storage(&path, e))
    }

    fn read(&self, collection: Collection, session: &str) -> Result<Vec<LogRecord>, LogError> {
        let dir = self.session_dir(collection, session);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| storage(&dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        let mut records: Vec<LogRecord> = files
            .iter()
            .filter_map(|path| {
                let text = match std::fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable log record");
                        return None;
                    }
                };
                match serde_json::from_str::<LogRecord>(&text) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping corrupted log record");
                        None
                    }
                }
            })
            .collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    fn delete_collection(&self, collection: Collection) -> Result<(), LogError> {
        remove_dir(&self.root.join(collection.as_str()))
    }

    fn delete_session(&self, collection: Collection, session: &str) -> Result<(), LogError> {
        remove_dir(&self.session_dir(collection, session))
    }
}

fn remove_dir(path: &Path) -> Result<(), LogError> {
    if !path.exists() {
        return Ok(());
    }
    std::fs::remove_dir_all(path).map_err(|e| storage(path, e))
}

fn storage(path: &Path, e: std::io::Error) -> LogError {
    LogError::Storage {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
