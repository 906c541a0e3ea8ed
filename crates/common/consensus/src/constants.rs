//! Preset constants compiled into the client. These follow the mainnet preset.

use alloy_primitives::aliases::B32;

use crate::primitives::{DomainType, Epoch, Gwei, Slot};

pub const PRESET_BASE: &str = "mainnet";

// Misc
pub const GENESIS_SLOT: Slot = 0;
pub const GENESIS_EPOCH: Epoch = 0;
pub const FAR_FUTURE_EPOCH: Epoch = u64::MAX;
pub const MAX_COMMITTEES_PER_SLOT: u64 = 64;
pub const TARGET_COMMITTEE_SIZE: u64 = 128;
pub const MAX_VALIDATORS_PER_COMMITTEE: u64 = 2048;
pub const SHUFFLE_ROUND_COUNT: u8 = 90;
pub const MAX_RANDOM_BYTE: u64 = 255;

// Gwei values
pub const MAX_EFFECTIVE_BALANCE: Gwei = 32_000_000_000;
pub const EFFECTIVE_BALANCE_INCREMENT: Gwei = 1_000_000_000;

// Time parameters
pub const MIN_ATTESTATION_INCLUSION_DELAY: u64 = 1;
pub const SLOTS_PER_EPOCH: u64 = 32;
pub const MIN_SEED_LOOKAHEAD: u64 = 1;

// State list lengths
pub const EPOCHS_PER_HISTORICAL_VECTOR: u64 = 65536;
pub const SLOTS_PER_HISTORICAL_ROOT: u64 = 8192;

// Max operations per block
pub const MAX_PROPOSER_SLASHINGS: u64 = 16;
pub const MAX_ATTESTER_SLASHINGS: u64 = 2;
pub const MAX_ATTESTATIONS: u64 = 128;
pub const MAX_VOLUNTARY_EXITS: u64 = 16;
pub const MAX_TRANSFERS: u64 = 16;

// Domain types
pub const DOMAIN_BEACON_PROPOSER: DomainType = B32::new([0, 0, 0, 0]);
pub const DOMAIN_BEACON_ATTESTER: DomainType = B32::new([1, 0, 0, 0]);
pub const DOMAIN_RANDAO: DomainType = B32::new([2, 0, 0, 0]);
pub const DOMAIN_DEPOSIT: DomainType = B32::new([3, 0, 0, 0]);
pub const DOMAIN_VOLUNTARY_EXIT: DomainType = B32::new([4, 0, 0, 0]);
pub const DOMAIN_TRANSFER: DomainType = B32::new([5, 0, 0, 0]);
