use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{
    store::{PriorityKey, StoreError},
    trade::Trade,
};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid order kind `{0}`: expected `market` or `limit`")]
    InvalidOrderKind(String),

    #[error("limit order {0} has no price")]
    MissingLimitPrice(u64),

    #[error("order {0} has zero quantity")]
    ZeroQuantity(u64),

    #[error("resting order not found: {0}")]
    NotFoundOrder(PriorityKey),

    #[error("persistence failure: {0}")]
    Persistence(StoreError),

    /// The store failed part way through a walk. `trades` already executed:
    /// their makers are updated and they are on the tape.
    #[error("matching interrupted after {} trade(s): {source}", .trades.len())]
    MatchInterrupted { trades: Vec<Trade>, source: StoreError },

    #[error("trade artifact write failed at {path}: {source}")]
    ArtifactWrite { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// True when only the offending order is refused and the book is untouched,
    /// so the driver can move on to the next order.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidOrderKind(_)
                | EngineError::MissingLimitPrice(_)
                | EngineError::ZeroQuantity(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => EngineError::NotFoundOrder(key),
            other => EngineError::Persistence(other),
        }
    }
}
