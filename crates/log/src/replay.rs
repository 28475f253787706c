//! Session replay: read back everything a session logged, in time order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lllm_core::error::LogError;
use lllm_core::log::{Collection, LogBase, LogRecord};
use serde::Serialize;
use serde_json::Value;

/// Where an activity came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A message appended to a dialog
    Message { dialog_id: String },
    /// An application annotation from the `frontend` collection
    Frontend,
}

/// One replayable event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub timestamp: DateTime<Utc>,
    pub value: String,
    pub metadata: Value,
    pub kind: ActivityKind,
}

/// Everything a session logged: its dialogs, their messages, and frontend notes.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    pub session_name: String,
    /// Dialog registrations; `value` is the dialog id
    pub dialogs: Vec<LogRecord>,
    pub frontend: Vec<LogRecord>,
    /// Messages keyed by dialog id
    pub messages: BTreeMap<String, Vec<LogRecord>>,
}

impl ReplaySession {
    pub fn load(base: &dyn LogBase, session_name: &str) -> Result<Self, LogError> {
        let dialogs = base.read(Collection::Dialogs, session_name)?;
        let frontend = base.read(Collection::Frontend, session_name)?;
        let mut messages = BTreeMap::new();
        for dialog in &dialogs {
            let records = base.read(Collection::Messages, &format!("{session_name}/{}", dialog.value))?;
            messages.insert(dialog.value.clone(), records);
        }
        Ok(Self {
            session_name: session_name.to_string(),
            dialogs,
            frontend,
            messages,
        })
    }

    /// Parent dialog id of `dialog_id`, if it was forked.
    pub fn parent_of(&self, dialog_id: &str) -> Option<&str> {
        self.dialogs
            .iter()
            .find(|d| d.value == dialog_id)
            .and_then(|d| d.metadata.get("parent_dialog"))
            .and_then(Value::as_str)
    }

    /// All messages and frontend records, oldest first.
    pub fn activities(&self) -> Vec<Activity> {
        let mut activities: Vec<Activity> = self
            .messages
            .iter()
            .flat_map(|(dialog_id, records)| {
                records.iter().map(move |r| Activity {
                    timestamp: r.timestamp,
                    value: r.value.clone(),
                    metadata: r.metadata.clone(),
                    kind: ActivityKind::Message { dialog_id: dialog_id.clone() },
                })
            })
            .chain(self.frontend.iter().map(|r| Activity {
                timestamp: r.timestamp,
                value: r.value.clone(),
                metadata: r.metadata.clone(),
                kind: ActivityKind::Frontend,
            }))
            .collect();
        activities.sort_by_key(|a| a.timestamp);
        activities
    }
}
