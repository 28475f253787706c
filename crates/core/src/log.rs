//! Log persistence contract: the key/value store dialogs write their turns to.
//!
//! A [`LogBase`] is organised as collections of named sessions. Dialogs register
//! themselves in the `dialogs` collection and write each appended message to a
//! `messages` session named `<session>/<dialog_id>`. The `frontend` collection
//! holds replay annotations written by applications.
//!
//! Implementations: local JSON files, in-memory (for testing), none (no-op).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LogError;

/// The fixed set of collections a replayable log holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Dialogs created in a session, with their parent dialog
    Dialogs,
    /// Application annotations for replay
    Frontend,
    /// Messages of each dialog
    Messages,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dialogs => "dialogs",
            Self::Frontend => "frontend",
            Self::Messages => "messages",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub value: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Storage backend for dialog logs.
pub trait LogBase: Send + Sync {
    /// The backend name (e.g., "localfile", "none").
    fn name(&self) -> &str;

    /// Append a record to `collection/session`.
    fn write(
        &self,
        collection: Collection,
        session: &str,
        record: LogRecord,
    ) -> std::result::Result<(), LogError>;

    /// All records of `collection/session`, oldest first. Unknown sessions are empty.
    fn read(&self, collection: Collection, session: &str) -> std::result::Result<Vec<LogRecord>, LogError>;

    /// Drop every session of a collection.
    fn delete_collection(&self, collection: Collection) -> std::result::Result<(), LogError>;

    fn delete_session(&self, collection: Collection, session: &str) -> std::result::Result<(), LogError>;
}

/// A writer bound to one session of one collection.
#[derive(Clone)]
pub struct LogSession {
    base: Arc<dyn LogBase>,
    collection: Collection,
    name: String,
}

impl std::fmt::Debug for LogSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSession")
            .field("backend", &self.base.name())
            .field("collection", &self.collection)
            .field("name", &self.name)
            .finish()
    }
}

impl LogSession {
    pub fn new(base: Arc<dyn LogBase>, collection: Collection, name: impl Into<String>) -> Self {
        Self {
            base,
            collection,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Record `value` with `metadata`, stamped with the current time.
    pub fn log(&self, value: &str, metadata: Value) -> std::result::Result<(), LogError> {
        let record = LogRecord {
            timestamp: Utc::now(),
            value: value.to_string(),
            metadata,
        };
        self.base.write(self.collection, &self.name, record)
    }

    pub fn read(&self) -> std::result::Result<Vec<LogRecord>, LogError> {
        self.base.read(self.collection, &self.name)
    }
}

/// Open `session` in `collection` of `base`.
pub fn session(base: &Arc<dyn LogBase>, collection: Collection, name: impl Into<String>) -> LogSession {
    LogSession::new(Arc::clone(base), collection, name)
}

/// Keeps records in memory. Used for testing and short-lived runs.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    records: std::sync::Mutex<std::collections::HashMap<(Collection, String), Vec<LogRecord>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session names with at least one record in `collection`, sorted.
    pub fn sessions(&self, collection: Collection) -> Vec<String> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        let mut names: Vec<String> = records
            .keys()
            .filter(|(c, _)| *c == collection)
            .map(|(_, s)| s.clone())
            .collect();
        names.sort();
        names
    }

    fn poisoned(session: &str) -> LogError {
        LogError::Storage {
            path: session.to_string(),
            reason: "in-memory log lock poisoned".into(),
        }
    }
}

impl LogBase for InMemoryLog {
    fn name(&self) -> &str {
        "memory"
    }

    fn write(
        &self,
        collection: Collection,
        session: &str,
        record: LogRecord,
    ) -> std::result::Result<(), LogError> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned(session))?;
        records
            .entry((collection, session.to_string()))
            .or_default()
            .push(record);
        Ok(())
    }

    fn read(&self, collection: Collection, session: &str) -> std::result::Result<Vec<LogRecord>, LogError> {
        let records = self.records.lock().map_err(|_| Self::poisoned(session))?;
        let mut found = records
            .get(&(collection, session.to_string()))
            .cloned()
            .unwrap_or_default();
        found.sort_by_key(|r| r.timestamp);
        Ok(found)
    }

    fn delete_collection(&self, collection: Collection) -> std::result::Result<(), LogError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Self::poisoned(collection.as_str()))?;
        records.retain(|(c, _), _| *c != collection);
        Ok(())
    }

    fn delete_session(&self, collection: Collection, session: &str) -> std::result::Result<(), LogError> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned(session))?;
        records.remove(&(collection, session.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_writes_to_its_collection() {
        let base: Arc<dyn LogBase> = Arc::new(InMemoryLog::new());
        let sess = session(&base, Collection::Messages, "run/abc");
        sess.log("hello", json!({"role": "user"})).unwrap();
        sess.log("world", Value::Null).unwrap();

        let records = sess.read().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, "hello");
        assert_eq!(records[0].metadata["role"], "user");
        assert!(base.read(Collection::Dialogs, "run/abc").unwrap().is_empty());
    }

    #[test]
    fn in_memory_sessions_and_delete() {
        let log = InMemoryLog::new();
        let rec = |v: &str| LogRecord { timestamp: Utc::now(), value: v.into(), metadata: Value::Null };
        log.write(Collection::Frontend, "b", rec("1")).unwrap();
        log.write(Collection::Frontend, "a", rec("2")).unwrap();
        log.write(Collection::Dialogs, "a", rec("3")).unwrap();
        assert_eq!(log.sessions(Collection::Frontend), vec!["a", "b"]);

        log.delete_session(Collection::Frontend, "a").unwrap();
        assert_eq!(log.sessions(Collection::Frontend), vec!["b"]);

        log.delete_collection(Collection::Frontend).unwrap();
        assert!(log.read(Collection::Frontend, "b").unwrap().is_empty());
        assert_eq!(log.read(Collection::Dialogs, "a").unwrap().len(), 1);
    }

    #[test]
    fn record_roundtrips_through_json() {
        let record = LogRecord {
            timestamp: Utc::now(),
            value: "v".into(),
            metadata: json!({"k": 1}),
        };
        let text = serde_json::to_string(&record).unwrap();
        let back: LogRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
