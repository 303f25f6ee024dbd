//! tempo-agent: reference host for the Tempo telemetry engine.
//!
//! Real deployments embed `tempo-core` inside an editor plugin host; this
//! binary is the standalone equivalent for local spooling and debugging.
//! It reads editor event JSON lines from stdin, drives scheduler ticks on
//! a timer, and tears down cleanly on EOF.
//!
//! The HTTP transport is intentionally not implemented here: the binary
//! wires the offline transport, so every payload spools into the local
//! queue until an integrator's transport drains it.
//!
//! ## Subcommands
//!
//! - `run`: event loop (reads JSON lines from stdin)
//! - `status`: print queue depth, lease holder, and flow state as JSON

mod logging;
mod run;

use clap::{Parser, Subcommand};

use tempo_core::StorageConfig;

#[derive(Parser)]
#[command(name = "tempo-agent")]
#[command(about = "Tempo telemetry agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (reads editor event JSON lines from stdin)
    Run {
        /// Seconds between scheduler ticks
        #[arg(long, default_value_t = 30)]
        tick_secs: u64,
    },

    /// Print current agent state as JSON
    Status,
}

fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::from_home() {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("tempo-agent: {}", err);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run { tick_secs } => {
            logging::init(&storage.logs_dir());
            if let Err(err) = run::run(storage, tick_secs) {
                tracing::error!(error = %err, "tempo-agent run failed");
                std::process::exit(1);
            }
        }
        Commands::Status => {
            if let Err(err) = run::print_status(&storage) {
                eprintln!("tempo-agent: {}", err);
                std::process::exit(1);
            }
        }
    }
}
