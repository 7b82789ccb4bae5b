//! Chain Cost CLI
//!
//! Validates or executes a process chain stored as JSON and prints the
//! result as JSON on stdout.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `RUST_LOG`: Log level filter (default: process_chain=info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: pretty)
//!
//! Logs go to stderr so stdout stays machine-readable.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --features cli --bin chain_cost -- validate chain.json
//! cargo run --features cli --bin chain_cost -- execute chain.json --input-kg 1728 --policy policy.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use process_chain::{ChainExecutor, CostingPolicyV1, GraphValidator, ProcessChain};

/// Deterministic cost allocation for process chains
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that a chain is a legal production plan
    Validate {
        /// Path to the chain JSON file
        chain: PathBuf,
        /// Path to a costing policy JSON file
        #[arg(long)]
        policy: Option<PathBuf>,
    },
    /// Cost every leaf output of a chain for a given input weight
    Execute {
        /// Path to the chain JSON file
        chain: PathBuf,
        /// Weight fed into the chain, in kilograms
        #[arg(long)]
        input_kg: f64,
        /// Path to a costing policy JSON file
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Caller batch reference, echoed in the result
        #[arg(long)]
        batch_ref: Option<String>,
    },
}

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "process_chain=info,chain_cost=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
    Ok(value)
}

fn load_policy(path: Option<&Path>) -> Result<CostingPolicyV1, Box<dyn std::error::Error>> {
    match path {
        Some(path) => read_json(path),
        None => Ok(CostingPolicyV1::default()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a command, returning whether its outcome was a success.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Command::Validate { chain, policy } => {
            let policy = load_policy(policy.as_deref())?;
            let chain: ProcessChain = read_json(&chain)?;
            info!(
                chain_version = chain.version,
                nodes = chain.num_nodes(),
                edges = chain.num_edges(),
                policy_hash = %policy.params_hash(),
                "Validating chain"
            );

            let result = GraphValidator::new(policy).validate(&chain);
            print_json(&result)?;
            Ok(result.valid)
        }
        Command::Execute {
            chain,
            input_kg,
            policy,
            batch_ref,
        } => {
            let policy = load_policy(policy.as_deref())?;
            let chain: ProcessChain = read_json(&chain)?;
            info!(
                chain_version = chain.version,
                input_kg,
                policy_hash = %policy.params_hash(),
                "Executing chain"
            );

            let mut executor = ChainExecutor::new(policy);
            if let Some(batch_ref) = batch_ref {
                executor = executor.with_batch_ref(batch_ref);
            }
            let result = executor.execute(&chain, input_kg);
            print_json(&result)?;
            Ok(result.success)
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "chain_cost failed");
            ExitCode::from(2)
        }
    }
}
