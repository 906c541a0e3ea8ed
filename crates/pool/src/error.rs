use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("attestation pool is not started")]
    NotStarted,

    #[error("attestation pool is already started")]
    AlreadyStarted,

    #[error("pool input channel is full")]
    Backpressure,

    #[error("attestation pool has stopped")]
    Stopped,

    #[error("failed to build pool: {0}")]
    Setup(#[from] anyhow::Error),
}
