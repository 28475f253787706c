//! Dialog: the append-only transcript of one conversation.
//!
//! Every dialog is bound to a log session: creating one registers its id in the
//! `dialogs` collection, and every appended message is written to
//! `messages/<session>/<dialog_id>`. [`Dialog::append`] is the only way to add
//! a message, which keeps the log and the transcript in step.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::PromptError;
use crate::log::{Collection, LogBase, LogSession};
use crate::message::{Message, Modality, Role};
use crate::model_card::{CompletionCost, ModelCatalog};
use crate::prompt::Prompt;
use crate::registry::PromptRegistry;

pub struct Dialog {
    id: String,
    messages: Vec<Message>,
    session_name: String,
    parent: Option<String>,
    top_prompt: Option<Arc<Prompt>>,
    log_base: Arc<dyn LogBase>,
    log: LogSession,
}

impl std::fmt::Debug for Dialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog")
            .field("id", &self.id)
            .field("session_name", &self.session_name)
            .field("parent", &self.parent)
            .field("messages", &self.messages.len())
            .field("top_prompt", &self.top_prompt.as_ref().map(|p| p.path.as_str()))
            .finish()
    }
}

/// Serialisable snapshot of a dialog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogRecord {
    pub messages: Vec<Message>,
    pub session_name: String,
    #[serde(default)]
    pub parent_dialog: Option<String>,
    #[serde(default)]
    pub top_prompt_path: Option<String>,
}

impl Dialog {
    /// Create an empty dialog and register it in the session's `dialogs` log.
    pub fn new(log_base: Arc<dyn LogBase>, session_name: impl Into<String>, parent: Option<String>) -> Self {
        let session_name = session_name.into();
        let id = Uuid::new_v4().simple().to_string();

        let dialogs = LogSession::new(Arc::clone(&log_base), Collection::Dialogs, session_name.clone());
        if let Err(e) = dialogs.log(&id, serde_json::json!({ "parent_dialog": parent })) {
            warn!(dialog_id = %id, error = %e, "Failed to register dialog in log");
        }

        let log = LogSession::new(
            Arc::clone(&log_base),
            Collection::Messages,
            format!("{session_name}/{id}"),
        );

        Self {
            id,
            messages: Vec::new(),
            session_name,
            parent,
            top_prompt: None,
            log_base,
            log,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn log_base(&self) -> &Arc<dyn LogBase> {
        &self.log_base
    }

    /// The prompt most recently sent into this dialog.
    pub fn top_prompt(&self) -> Option<&Arc<Prompt>> {
        self.top_prompt.as_ref()
    }

    pub fn set_top_prompt(&mut self, prompt: Arc<Prompt>) {
        self.top_prompt = Some(prompt);
    }

    /// Last message, usually the latest model response.
    pub fn tail(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// First message, which is the system message when present.
    pub fn system(&self) -> Option<&Message> {
        self.messages.first()
    }

    /// Append a message and write it to the log.
    ///
    /// Logging failures never fail the append: the record is retried without
    /// metadata and a warning is emitted.
    pub fn append(&mut self, mut message: Message) {
        message
            .extra
            .insert("dialog_id".into(), Value::String(self.id.clone()));
        if let Err(e) = self.log.log(&message.content, message.log_metadata()) {
            warn!(dialog_id = %self.id, error = %e, "Failed to log message, logging it without metadata");
            if let Err(e) = self.log.log(&message.content, Value::Null) {
                warn!(dialog_id = %self.id, error = %e, "Failed to log message");
            }
        }
        self.messages.push(message);
    }

    /// Render `prompt` with `args`, append it as a `role` turn, and make it the top prompt.
    pub fn send_message(
        &mut self,
        prompt: Arc<Prompt>,
        args: &Map<String, Value>,
        role: Role,
        creator: &str,
        extra: Map<String, Value>,
    ) -> Result<&Message, PromptError> {
        let content = prompt.render(args)?;
        let mut message = Message::new(role, content, creator);
        message.extra = extra;
        self.append(message);
        self.top_prompt = Some(prompt);
        Ok(self.last_appended())
    }

    /// Send literal text under a throwaway prompt.
    pub fn send_text(&mut self, text: impl Into<String>, role: Role, creator: &str) -> &Message {
        let tag: String = Uuid::new_v4().simple().to_string().chars().take(6).collect();
        let prompt = Arc::new(Prompt::new(format!("__temp_prompt_{tag}"), text));
        let message = Message::new(role, prompt.template.clone(), creator);
        self.append(message);
        self.top_prompt = Some(prompt);
        self.last_appended()
    }

    /// Append a base64-encoded image. The top prompt is left unchanged.
    pub fn send_base64_image(
        &mut self,
        image_base64: impl Into<String>,
        caption: Option<&str>,
        role: Role,
        creator: &str,
    ) -> &Message {
        let mut message = Message::new(role, image_base64, creator);
        message.modality = Modality::Image;
        if let Some(caption) = caption {
            message
                .extra
                .insert("caption".into(), Value::String(caption.to_string()));
        }
        self.append(message);
        self.last_appended()
    }

    fn last_appended(&self) -> &Message {
        // append always pushes before this is called
        &self.messages[self.messages.len() - 1]
    }

    /// Deep copy with a fresh id, a distinct log session, and this dialog as parent.
    pub fn fork(&self) -> Dialog {
        let mut forked = Dialog::new(
            Arc::clone(&self.log_base),
            self.session_name.clone(),
            Some(self.id.clone()),
        );
        forked.messages = self.messages.clone();
        forked.top_prompt = self.top_prompt.clone();
        forked
    }

    /// Fork without the last `n` messages.
    pub fn context_copy(&self, n: usize) -> Dialog {
        let mut copy = self.fork();
        let keep = copy.messages.len().saturating_sub(n);
        copy.messages.truncate(keep);
        copy
    }

    /// One line per message: `[idx. creator (role)]: preview`.
    pub fn overview(&self, remove_tail: bool, max_length: usize) -> String {
        let count = if remove_tail {
            self.messages.len().saturating_sub(1)
        } else {
            self.messages.len()
        };
        self.messages
            .iter()
            .take(count)
            .enumerate()
            .map(|(idx, m)| format!("[{idx}. {} ({})]: {}", m.creator, m.role, m.overview(max_length)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Token and USD totals of every model-produced message.
    pub fn cost(&self, catalog: &ModelCatalog) -> CompletionCost {
        self.messages.iter().map(|m| catalog.message_cost(m)).sum()
    }

    pub fn to_record(&self) -> DialogRecord {
        DialogRecord {
            messages: self.messages.clone(),
            session_name: self.session_name.clone(),
            parent_dialog: self.parent.clone(),
            top_prompt_path: self.top_prompt.as_ref().map(|p| p.path.clone()),
        }
    }

    /// Rebuild a dialog from a record. Messages are restored without being logged again.
    ///
    /// A top prompt missing from `registry` is dropped with a warning.
    pub fn from_record(record: DialogRecord, log_base: Arc<dyn LogBase>, registry: &PromptRegistry) -> Dialog {
        let mut dialog = Dialog::new(log_base, record.session_name, record.parent_dialog);
        dialog.messages = record.messages;
        dialog.top_prompt = record.top_prompt_path.and_then(|path| match registry.get(&path) {
            Ok(prompt) => Some(prompt),
            Err(_) => {
                warn!(prompt = %path, "Top prompt of restored dialog not found in registry");
                None
            }
        });
        dialog
    }
}
