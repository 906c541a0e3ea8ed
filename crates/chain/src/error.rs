use alloy_primitives::B256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    /// Fork choice selected a block whose tuple is not in storage. Storage must hold every block
    /// fork choice can reach, so there is no way to recover locally.
    #[error("head {root} selected by fork choice is missing from storage")]
    MissingHeadTuple { root: B256 },

    #[error("justified block {root} is missing from storage")]
    MissingJustifiedBlock { root: B256 },

    #[error("observable state processor is not started")]
    NotStarted,

    #[error("observable state processor is already started")]
    AlreadyStarted,

    #[error("observer input channel is full")]
    Backpressure,

    #[error("observable state processor has stopped")]
    Stopped,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChainError {
    /// Whether the chain can not make progress after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::MissingHeadTuple { .. } | ChainError::MissingJustifiedBlock { .. }
        )
    }
}
