pub mod attestation;
pub mod attestation_data;
pub mod attester_slashing;
pub mod beacon_block_header;
pub mod bls;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod fork;
pub mod fork_data;
pub mod helpers;
pub mod indexed_attestation;
pub mod interop;
pub mod misc;
pub mod pending_attestation;
pub mod phase0;
pub mod primitives;
pub mod proposer_slashing;
pub mod pubkey;
pub mod signature;
pub mod signing_data;
pub mod transfer;
pub mod transition;
pub mod validator;
pub mod voluntary_exit;
