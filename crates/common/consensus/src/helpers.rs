use crate::{primitives::Epoch, validator::Validator};

/// Check if ``validator`` is active.
pub fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}
