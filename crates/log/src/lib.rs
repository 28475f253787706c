//! # LLLM Log
//!
//! Backends for the dialog log and session replay.
//!
//! - [`LocalFileLog`]: one JSON file per record under a log directory
//! - [`NoLog`]: discards everything
//! - [`InMemoryLog`]: keeps records in process (testing)

pub mod local_file;
pub mod noop;
pub mod replay;

use std::path::Path;
use std::sync::Arc;

use lllm_core::error::LogError;
use lllm_core::log::LogBase;
use serde::{Deserialize, Serialize};

pub use lllm_core::log::InMemoryLog;
pub use local_file::LocalFileLog;
pub use noop::NoLog;
pub use replay::{Activity, ActivityKind, ReplaySession};

/// Which backend `build_log_base` creates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    LocalFile,
    None,
    Memory,
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "localfile" => Ok(Self::LocalFile),
            "none" => Ok(Self::None),
            "memory" => Ok(Self::Memory),
            other => Err(format!("Log type '{other}' not supported (expected localfile, none, memory)")),
        }
    }
}

/// Build a log backend. `base_name` names the directory under `log_dir` for file logs.
pub fn build_log_base(log_type: LogType, log_dir: &Path, base_name: &str) -> Result<Arc<dyn LogBase>, LogError> {
    let base: Arc<dyn LogBase> = match log_type {
        LogType::LocalFile => Arc::new(LocalFileLog::new(log_dir, base_name)?),
        LogType::None => Arc::new(NoLog),
        LogType::Memory => Arc::new(InMemoryLog::new()),
    };
    tracing::debug!(backend = base.name(), base_name, "Log base ready");
    Ok(base)
}
