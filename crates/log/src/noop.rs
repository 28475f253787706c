//! No-op log: discards every record. Used when `log_type = "none"`.

use lllm_core::error::LogError;
use lllm_core::log::{Collection, LogBase, LogRecord};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLog;

impl LogBase for NoLog {
    fn name(&self) -> &str {
        "none"
    }

    fn write(&self, _collection: Collection, _session: &str, _record: LogRecord) -> Result<(), LogError> {
        Ok(())
    }

    fn read(&self, _collection: Collection, _session: &str) -> Result<Vec<LogRecord>, LogError> {
        Ok(Vec::new())
    }

    fn delete_collection(&self, _collection: Collection) -> Result<(), LogError> {
        Ok(())
    }

    fn delete_session(&self, _collection: Collection, _session: &str) -> Result<(), LogError> {
        Ok(())
    }
}
