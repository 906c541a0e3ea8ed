//! Fork choice and the chain view built on top of the attestation pool: the LMD GHOST head
//! function, pending operations and the observable state published to block proposers.

pub mod cache;
pub mod error;
pub mod head;
pub mod observer;
pub mod pending;
pub mod ticker;

pub use crate::{
    error::ChainError,
    head::{HeadFunction, LmdGhostHeadFunction},
    observer::{BeaconChainHead, ObservableBeaconState, ObservableStateProcessor, ObserverInput},
    pending::{ChurnPendingOperations, PendingOperations, PendingOperationsState},
    ticker::SlotTicker,
};
