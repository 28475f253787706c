//! Function-call dispatch with repeat suppression.
//!
//! A call whose name and arguments match one already dispatched during the
//! same agent call is never executed again. The model gets a notice telling
//! it to stop repeating itself instead, and the call is not recorded.

use lllm_core::function::FunctionCall;
use lllm_core::prompt::Prompt;
use tracing::{info, warn};

use crate::error::AgentError;

/// Result of dispatching one requested call.
#[derive(Debug, Clone)]
pub struct Dispatched {
    /// The call with its result fields filled in (unchanged for repeats)
    pub call: FunctionCall,
    /// Text fed back to the model
    pub result_str: String,
    /// Whether the call was suppressed as a repeat
    pub repeated: bool,
}

/// Notice returned instead of re-running a repeated call.
pub fn repeated_call_notice(call: &FunctionCall) -> String {
    format!(
        "The function {} with identical arguments {} has been called earlier, please check the previous results and do not call it again. If you do not need to call more functions, just stop calling and provide the final response.",
        call.name,
        call.arguments_str()
    )
}

/// Dispatch `call` against `prompt`'s functions.
///
/// `history` holds the calls already dispatched in this agent call. Handler
/// failures are reported in the result text; only an unknown or unlinked
/// function is an error.
pub async fn dispatch(prompt: &Prompt, call: FunctionCall, history: &[FunctionCall]) -> Result<Dispatched, AgentError> {
    if call.is_repeated(history) {
        info!(function = %call.name, "Suppressing repeated function call");
        return Ok(Dispatched {
            result_str: repeated_call_notice(&call),
            call,
            repeated: true,
        });
    }

    let function = prompt.function(&call.name).ok_or_else(|| AgentError::UnknownFunction {
        prompt: prompt.path.clone(),
        function: call.name.clone(),
    })?;

    info!(function = %call.name, arguments = %call.arguments_str(), "Calling function");
    let call = function.execute(call).await?;
    if let Some(error) = &call.error_message {
        warn!(function = %call.name, error = %error, "Function returned an error");
    }

    Ok(Dispatched {
        result_str: call.result_str.clone().unwrap_or_default(),
        call,
        repeated: false,
    })
}
