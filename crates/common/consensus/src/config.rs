use std::{collections::HashMap, fmt, fs, path::Path, sync::LazyLock};

use alloy_primitives::aliases::B32;
use anyhow::{anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        EFFECTIVE_BALANCE_INCREMENT, EPOCHS_PER_HISTORICAL_VECTOR, FAR_FUTURE_EPOCH,
        GENESIS_EPOCH, GENESIS_SLOT, MAX_ATTESTATIONS, MAX_ATTESTER_SLASHINGS,
        MAX_COMMITTEES_PER_SLOT, MAX_EFFECTIVE_BALANCE, MAX_PROPOSER_SLASHINGS, MAX_TRANSFERS,
        MAX_VALIDATORS_PER_COMMITTEE, MAX_VOLUNTARY_EXITS, MIN_ATTESTATION_INCLUSION_DELAY,
        MIN_SEED_LOOKAHEAD, PRESET_BASE, SHUFFLE_ROUND_COUNT, SLOTS_PER_EPOCH,
        SLOTS_PER_HISTORICAL_ROOT, TARGET_COMMITTEE_SIZE,
    },
    primitives::Version,
};

/// Runtime configuration of a beacon chain network.
///
/// Preset values are compiled in (see [`crate::constants`]); everything that may differ between
/// networks sharing a preset lives here. Keys use the upper snake case names of the network
/// config files, so a stock `config.yaml` deserializes directly.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ChainSpec {
    pub config_name: String,
    pub preset_base: String,

    #[serde(with = "serde_utils::quoted_u64")]
    pub seconds_per_slot: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_genesis_time: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub min_genesis_active_validator_count: u64,
    #[serde(with = "serde_utils::quoted_u64")]
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainSpec {
    pub fn mainnet() -> Self {
        Self {
            config_name: "mainnet".to_string(),
            preset_base: PRESET_BASE.to_string(),
            seconds_per_slot: 12,
            min_genesis_time: 1606824000,
            min_genesis_active_validator_count: 16384,
            genesis_delay: 604800,
            genesis_fork_version: B32::new([0, 0, 0, 0]),
        }
    }

    /// Local interop network: short slots, small validator set, immediate genesis.
    pub fn dev() -> Self {
        Self {
            config_name: "dev".to_string(),
            preset_base: PRESET_BASE.to_string(),
            seconds_per_slot: 6,
            min_genesis_time: 0,
            min_genesis_active_validator_count: 64,
            genesis_delay: 0,
            genesis_fork_version: B32::new([0, 0, 0, 1]),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let spec: ChainSpec = serde_yaml::from_str(yaml)
            .map_err(|err| anyhow!("Failed to parse chain config: {err}"))?;
        ensure!(
            spec.preset_base == PRESET_BASE,
            "Config expects preset {}, client is compiled with preset {PRESET_BASE}",
            spec.preset_base
        );
        ensure!(spec.seconds_per_slot > 0, "SECONDS_PER_SLOT must be positive");
        Ok(spec)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path)
            .map_err(|err| anyhow!("Failed to read chain config {}: {err}", path.display()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Look up a preset constant or config value by its upper snake case name.
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        LOOKUP_TABLE.get(key).map(|resolve| resolve(self))
    }

    pub fn keys() -> impl Iterator<Item = &'static str> {
        LOOKUP_TABLE.keys().copied()
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConfigValue {
    Number(u64),
    Bytes(Vec<u8>),
    Text(String),
}

impl ConfigValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ConfigValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Number(value) => write!(f, "{value}"),
            ConfigValue::Bytes(bytes) => write!(f, "0x{}", alloy_primitives::hex::encode(bytes)),
            ConfigValue::Text(text) => f.write_str(text),
        }
    }
}

type Resolver = fn(&ChainSpec) -> ConfigValue;

macro_rules! preset {
    ($key:literal, $value:expr) => {
        ($key, (|_: &ChainSpec| ConfigValue::Number($value as u64)) as Resolver)
    };
}

macro_rules! config {
    ($key:literal, $spec:ident => $value:expr) => {
        ($key, (|$spec: &ChainSpec| $value) as Resolver)
    };
}

static LOOKUP_TABLE: LazyLock<HashMap<&'static str, Resolver>> = LazyLock::new(|| {
    HashMap::from([
        config!("CONFIG_NAME", spec => ConfigValue::Text(spec.config_name.clone())),
        config!("PRESET_BASE", spec => ConfigValue::Text(spec.preset_base.clone())),
        config!("SECONDS_PER_SLOT", spec => ConfigValue::Number(spec.seconds_per_slot)),
        config!("MIN_GENESIS_TIME", spec => ConfigValue::Number(spec.min_genesis_time)),
        config!(
            "MIN_GENESIS_ACTIVE_VALIDATOR_COUNT",
            spec => ConfigValue::Number(spec.min_genesis_active_validator_count)
        ),
        config!("GENESIS_DELAY", spec => ConfigValue::Number(spec.genesis_delay)),
        config!(
            "GENESIS_FORK_VERSION",
            spec => ConfigValue::Bytes(spec.genesis_fork_version.to_vec())
        ),
        preset!("GENESIS_SLOT", GENESIS_SLOT),
        preset!("GENESIS_EPOCH", GENESIS_EPOCH),
        preset!("FAR_FUTURE_EPOCH", FAR_FUTURE_EPOCH),
        preset!("MAX_COMMITTEES_PER_SLOT", MAX_COMMITTEES_PER_SLOT),
        preset!("TARGET_COMMITTEE_SIZE", TARGET_COMMITTEE_SIZE),
        preset!("MAX_VALIDATORS_PER_COMMITTEE", MAX_VALIDATORS_PER_COMMITTEE),
        preset!("SHUFFLE_ROUND_COUNT", SHUFFLE_ROUND_COUNT),
        preset!("MAX_EFFECTIVE_BALANCE", MAX_EFFECTIVE_BALANCE),
        preset!("EFFECTIVE_BALANCE_INCREMENT", EFFECTIVE_BALANCE_INCREMENT),
        preset!("MIN_ATTESTATION_INCLUSION_DELAY", MIN_ATTESTATION_INCLUSION_DELAY),
        preset!("SLOTS_PER_EPOCH", SLOTS_PER_EPOCH),
        preset!("MIN_SEED_LOOKAHEAD", MIN_SEED_LOOKAHEAD),
        preset!("EPOCHS_PER_HISTORICAL_VECTOR", EPOCHS_PER_HISTORICAL_VECTOR),
        preset!("SLOTS_PER_HISTORICAL_ROOT", SLOTS_PER_HISTORICAL_ROOT),
        preset!("MAX_PROPOSER_SLASHINGS", MAX_PROPOSER_SLASHINGS),
        preset!("MAX_ATTESTER_SLASHINGS", MAX_ATTESTER_SLASHINGS),
        preset!("MAX_ATTESTATIONS", MAX_ATTESTATIONS),
        preset!("MAX_VOLUNTARY_EXITS", MAX_VOLUNTARY_EXITS),
        preset!("MAX_TRANSFERS", MAX_TRANSFERS),
    ])
});

#[cfg(test)]
mod tests {
    use super::*;

    #[rstest::rstest]
    #[case("SLOTS_PER_EPOCH", ConfigValue::Number(32))]
    #[case("SHUFFLE_ROUND_COUNT", ConfigValue::Number(90))]
    #[case("SECONDS_PER_SLOT", ConfigValue::Number(12))]
    #[case("CONFIG_NAME", ConfigValue::Text("mainnet".to_string()))]
    #[case("GENESIS_FORK_VERSION", ConfigValue::Bytes(vec![0, 0, 0, 0]))]
    fn test_lookup_by_key(#[case] key: &str, #[case] expected: ConfigValue) {
        assert_eq!(ChainSpec::mainnet().get(key), Some(expected));
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(ChainSpec::mainnet().get("SLOTS_PER_EPOCHS"), None);
    }

    #[test]
    fn test_from_yaml_overrides_and_defaults() {
        let yaml = r#"
CONFIG_NAME: "devnet-3"
PRESET_BASE: "mainnet"
SECONDS_PER_SLOT: 4
MIN_GENESIS_ACTIVE_VALIDATOR_COUNT: "128"
GENESIS_FORK_VERSION: "0x10000038"
DEPOSIT_CHAIN_ID: 1
"#;
        let spec = ChainSpec::from_yaml_str(yaml).unwrap();

        assert_eq!(spec.config_name, "devnet-3");
        assert_eq!(spec.seconds_per_slot, 4);
        assert_eq!(spec.min_genesis_active_validator_count, 128);
        assert_eq!(spec.genesis_fork_version, B32::new([0x10, 0, 0, 0x38]));
        assert_eq!(spec.genesis_delay, ChainSpec::mainnet().genesis_delay);
        assert_eq!(spec.get("SECONDS_PER_SLOT").and_then(|v| v.as_u64()), Some(4));
    }

    #[test]
    fn test_preset_mismatch_is_rejected() {
        let yaml = "PRESET_BASE: minimal\n";
        assert!(ChainSpec::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_every_key_resolves() {
        let spec = ChainSpec::dev();
        for key in ChainSpec::keys() {
            assert!(spec.get(key).is_some(), "{key} did not resolve");
        }
    }
}
