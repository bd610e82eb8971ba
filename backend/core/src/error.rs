use thiserror::Error;

/// Top-level error type for the Agora protocol runtime.
#[derive(Debug, Error)]
pub enum AgoraError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("consensus rejected proposal {proposal_id} (ratio {ratio:.2})")]
    ConsensusRejected { proposal_id: String, ratio: f64 },

    #[error("settlement failed: {0}")]
    Settlement(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgoraError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
