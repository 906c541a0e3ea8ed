pub mod processed;
pub mod unknown;

pub use self::{
    processed::ProcessedAttestations,
    unknown::{InsertOutcome, UnknownAttestationPool},
};
