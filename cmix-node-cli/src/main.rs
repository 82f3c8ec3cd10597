//! Minimal CLI entry point for a cMix node (spec §6): loads a
//! [`cmix_node::config::NodeConfig`], sets up logging, and recovers a
//! persisted [`cmix_node::ErrorRecord`] if one exists.
//!
//! Everything past that line — the gateway/permissioning handshake that
//! actually assigns this node to a circuit, and the wire transport that
//! carries phase messages — is out of scope for this crate; those are
//! where a concrete deployment plugs the `cmix-node` library in.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cmix_node::config::NodeConfig;
use cmix_node::error_record::{ErrorRecordStore, FileErrorRecordStore};

/// Starts a cMix node from a configuration record.
#[derive(Parser, Debug)]
#[command(name = "cmix-node", version)]
struct Args {
    /// Path to a JSON-encoded `NodeConfig`.
    #[arg(long)]
    config_path: PathBuf,
    /// This node's position in its circuit(s). Overrides the config
    /// file's `index` if given.
    #[arg(long)]
    index: Option<u32>,
}

fn load_config(args: &Args) -> eyre::Result<NodeConfig> {
    let bytes = std::fs::read(&args.config_path)?;
    let mut config: NodeConfig = serde_json::from_slice(&bytes)?;
    if let Some(index) = args.index {
        config.index = index;
    }
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load node configuration");
            return ExitCode::FAILURE;
        }
    };

    let error_store = FileErrorRecordStore::new(&config.error_record_path);
    match error_store.recover() {
        Ok(Some(record)) => {
            tracing::error!(round = %record.round_id, message = %record.message, "recovered a persisted error record; starting in Error");
            return ExitCode::SUCCESS;
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!(error = %err, "failed to read error record");
            return ExitCode::FAILURE;
        }
    }

    tracing::info!(index = config.index, batch_size = config.batch_size, "node ready");
    ExitCode::SUCCESS
}
