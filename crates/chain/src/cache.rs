use std::collections::{BTreeMap, HashMap, HashSet};

use ream_consensus::{attestation::Attestation, primitives::Slot, pubkey::PubKey};

use crate::pending::PendingOperationsState;

/// The latest attestation seen from each validator, indexed by validator and by slot.
///
/// Both indices are updated together, every validator listed under a slot has its attestation
/// at that slot.
#[derive(Debug, Default)]
pub struct LatestAttestations {
    by_validator: HashMap<PubKey, Attestation>,
    by_slot: BTreeMap<Slot, HashSet<PubKey>>,
}

impl LatestAttestations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record ``attestation`` for ``pubkey`` if it is newer than the one held. Among attestations
    /// of the same slot the first one seen is kept.
    pub fn add(&mut self, pubkey: PubKey, attestation: &Attestation) -> bool {
        if let Some(existing) = self.by_validator.get(&pubkey) {
            if existing.data.slot >= attestation.data.slot {
                return false;
            }
            let slot = existing.data.slot;
            self.unindex(&pubkey, slot);
        }

        self.by_slot
            .entry(attestation.data.slot)
            .or_default()
            .insert(pubkey.clone());
        self.by_validator.insert(pubkey, attestation.clone());
        true
    }

    /// Forget the attestation of ``pubkey`` once an attestation of ``slot`` made it on chain. A
    /// newer attestation is still pending and stays.
    pub fn remove_included(&mut self, pubkey: &PubKey, slot: Slot) -> bool {
        match self.by_validator.get(pubkey) {
            Some(attestation) if attestation.data.slot <= slot => {}
            _ => return false,
        }
        if let Some(attestation) = self.by_validator.remove(pubkey) {
            self.unindex(pubkey, attestation.data.slot);
        }
        true
    }

    /// Drop every attestation of ``slot`` or earlier, returning how many were dropped.
    pub fn purge(&mut self, slot: Slot) -> usize {
        let kept = self.by_slot.split_off(&slot.saturating_add(1));
        let purged = std::mem::replace(&mut self.by_slot, kept);

        let mut count = 0;
        for pubkey in purged.into_values().flatten() {
            if self.by_validator.remove(&pubkey).is_some() {
                count += 1;
            }
        }
        count
    }

    pub fn get(&self, pubkey: &PubKey) -> Option<&Attestation> {
        self.by_validator.get(pubkey)
    }

    pub fn snapshot(&self) -> PendingOperationsState {
        PendingOperationsState::new(self.by_validator.clone())
    }

    pub fn len(&self) -> usize {
        self.by_validator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_validator.is_empty()
    }

    fn unindex(&mut self, pubkey: &PubKey, slot: Slot) {
        if let Some(pubkeys) = self.by_slot.get_mut(&slot) {
            pubkeys.remove(pubkey);
            if pubkeys.is_empty() {
                self.by_slot.remove(&slot);
            }
        }
    }
}
