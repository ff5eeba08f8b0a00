//! Boundary error taxonomy.
//!
//! These errors report *embedder misuse or rejected operations* at the core
//! boundary. Document-content failures (a bad expression, a cycle, a
//! malformed repeat count) are never `CoreError`s; they become
//! [`StateValue::Error`](crate::types::StateValue) values and inline error
//! nodes in the flattened output, so one broken expression cannot take down
//! the document.

use thiserror::Error;

/// Errors returned from the core's boundary operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An operation was called before `set_source` and `set_flags`.
    #[error("core is not initialized; call set_source and set_flags first")]
    NotInitialized,

    /// The core was terminated; only a fresh `set_source` is valid.
    #[error("core has been terminated")]
    Terminated,

    /// An action targeted a component id that does not exist (or no longer
    /// exists after a composite re-expansion).
    #[error("unknown component id {0}")]
    UnknownComponent(usize),

    /// An action named an action the target component does not define.
    #[error("component `{component_type}` has no action `{action}`")]
    UnknownAction {
        component_type: &'static str,
        action: String,
    },

    /// An action payload was missing or had the wrong shape.
    #[error("invalid action argument: {0}")]
    InvalidArgument(String),

    /// An inverse-resolution chain reported failure; nothing was mutated.
    #[error("action failed: {0}")]
    ActionFailed(String),
}
