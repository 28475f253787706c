//! Classification of one provider round-trip.
//!
//! The call loop never inspects provider errors directly; every result is
//! first folded into a [`CallOutcome`] and the retry state machine matches on
//! that.

use lllm_core::error::ProviderError;
use lllm_core::message::Message;

#[derive(Debug)]
pub enum CallOutcome {
    /// A response that satisfies the prompt's contract.
    Accepted(Message),

    /// The response (when there is one) violates the prompt's contract.
    SemanticFailure { response: Option<Message>, error: String },

    /// The provider call itself failed.
    TransientFailure(ProviderError),
}

impl From<Result<Message, ProviderError>> for CallOutcome {
    fn from(result: Result<Message, ProviderError>) -> Self {
        match result {
            Ok(message) if message.has_errors() => {
                let error = message.error_message();
                CallOutcome::SemanticFailure {
                    response: Some(message),
                    error,
                }
            }
            Ok(message) => CallOutcome::Accepted(message),
            Err(ProviderError::Semantic(error)) => CallOutcome::SemanticFailure { response: None, error },
            Err(error) => CallOutcome::TransientFailure(error),
        }
    }
}
