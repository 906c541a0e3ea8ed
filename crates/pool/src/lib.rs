//! Attestation pool: a staged pipeline that turns raw attestations received from the wire into
//! verified attestations and off-chain aggregates ready for block inclusion.
//!
//! ```text
//! source -> time frame -> sanity -> dedup -> encoding -> identification -> verification -> churn
//! ```
//!
//! Every stage is a task owning its component and one bounded inbound channel. Control events
//! (slots, checkpoints, imported blocks, chain heads) travel in-band with attestations so each
//! stage observes them in the order they were submitted.

pub mod checker;
pub mod churn;
pub mod config;
pub mod error;
pub mod input;
pub mod pool;
pub mod processor;
pub mod registry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod verifier;

pub use crate::{
    config::PoolConfig,
    error::PoolError,
    input::{PoolInput, ReceivedAttestation},
    pool::InMemoryAttestationPool,
};
