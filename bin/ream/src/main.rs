use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use ream::{
    cli::{Cli, Commands, NodeCommand},
    devnet::Devnet,
};
use ream_executor::ReamExecutor;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Node(cmd) => {
            // Set the default log level from the verbosity if not set
            if std::env::var("RUST_LOG").is_err() {
                std::env::set_var("RUST_LOG", cmd.log_level());
            }

            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .init();

            run_node(cmd)
        }
    }
}

fn run_node(cmd: NodeCommand) -> anyhow::Result<()> {
    info!("Starting node");
    let spec = cmd.chain_spec()?;
    let genesis_time = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let executor = ReamExecutor::new()?;
    let spawner = executor.spawner();
    let mut devnet = Devnet::new(spec, cmd.interop_validators, genesis_time, cmd.pool_config())?;

    let result = executor.block_on(async {
        devnet.start(&spawner).await?;
        tokio::select! {
            result = devnet.run(&spawner) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                Ok(())
            }
        }
    });

    executor.shutdown();
    result
}
