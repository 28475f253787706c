//! The agent call loop of LLLM.
//!
//! An [`Agent`] answers the dialog's active prompt:
//!
//! 1. **Call** the provider on a fork of the dialog
//! 2. **If the response breaks the prompt's contract**: send the exception
//!    handler on the fork and retry, within `max_exception_retry`
//! 3. **If tool calls**: run them, send each result through the interrupt
//!    handler, and call again, within `max_interrupt_times`
//! 4. **Else**: append the response and return it
//!
//! Rate limits back off without a budget; other provider failures retry
//! within `max_llm_recall`.

pub mod agent;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod outcome;
pub mod policy;

pub use agent::{Agent, AgentBuilder, CallOptions, CallResult, Classification};
pub use dispatch::{Dispatched, dispatch, repeated_call_notice};
pub use error::AgentError;
pub use group::AgentGroup;
pub use outcome::CallOutcome;
pub use policy::{BackoffPolicy, RetryLimits, UNBOUNDED_ROUNDS};
