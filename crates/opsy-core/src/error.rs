use opsy_model::ModelError;
use thiserror::Error;

/// Why a run ended in the `Failed` state.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model backend error: {0}")]
    Backend(#[from] ModelError),

    #[error("run cancelled")]
    Cancelled,

    #[error("turn limit of {0} reached without a final answer")]
    TurnLimit(u32),
}
