use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use ream_consensus::config::ChainSpec;
use ream_pool::PoolConfig;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the node
    #[command(name = "node")]
    Node(NodeCommand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Mainnet,
    Dev,
}

#[derive(Debug, Parser)]
pub struct NodeCommand {
    /// Verbosity level
    #[arg(short, long, default_value_t = 3)]
    pub verbosity: u8,

    /// Network whose configuration is used unless a config file is given
    #[arg(long, value_enum, default_value_t = Network::Dev, env = "REAM_NETWORK")]
    pub network: Network,

    /// YAML chain configuration overriding the network defaults
    #[arg(long, env = "REAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of interop validators at genesis
    #[arg(long, default_value_t = 64)]
    pub interop_validators: u64,

    /// Max number of attestations verified in one batch
    #[arg(long)]
    pub verifier_buffer_size: Option<usize>,

    /// Max time in milliseconds an attestation waits for its batch
    #[arg(long)]
    pub verifier_interval_ms: Option<u64>,

    /// Max number of attestations waiting for an unknown block
    #[arg(long)]
    pub max_unknown_attestations: Option<usize>,

    /// Max number of attestations remembered to skip duplicates
    #[arg(long)]
    pub max_processed_attestations: Option<usize>,
}

impl NodeCommand {
    pub fn chain_spec(&self) -> anyhow::Result<ChainSpec> {
        match &self.config {
            Some(path) => ChainSpec::from_yaml_file(path),
            None => Ok(match self.network {
                Network::Mainnet => ChainSpec::mainnet(),
                Network::Dev => ChainSpec::dev(),
            }),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::default();
        if let Some(size) = self.verifier_buffer_size {
            config.verifier_buffer_size = size;
        }
        if let Some(interval) = self.verifier_interval_ms {
            config.verifier_interval = Duration::from_millis(interval);
        }
        if let Some(max) = self.max_unknown_attestations {
            config.max_unknown_attestations = max;
        }
        if let Some(max) = self.max_processed_attestations {
            config.max_processed_attestations = max;
        }
        config
    }

    /// Default log filter for the verbosity level.
    pub fn log_level(&self) -> &'static str {
        match self.verbosity {
            0 => "off",
            1 => "error",
            2 => "warn",
            3 => "info",
            4 => "debug",
            _ => "trace",
        }
    }
}
