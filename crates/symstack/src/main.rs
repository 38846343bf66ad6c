//! SymStack - Symbolic EVM Stack Tracker
//!
//! Replays an EVM execution trace and shows which stack slots hold which
//! source-level variables at every step.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use eyre::Result;
use symstack_engine::EngineConfig;
use tracing::Level;

mod cmd;
mod render;

/// Command-line interface for SymStack
#[derive(Debug, Parser)]
#[command(name = "symstack")]
#[command(about = "Symbolic EVM stack tracker - map stack slots to source-level variables")]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (TOML). Falls back to $SYMSTACK_CONFIG, then defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report a stack overflow above this depth
    #[arg(long)]
    pub max_stack_depth: Option<usize>,

    /// Swap variables positionally instead of keeping their identity in place
    #[arg(long)]
    pub no_swap_pinning: bool,

    /// Do not record which slots each value was derived from
    #[arg(long)]
    pub no_provenance: bool,

    /// Ignore concrete stacks recorded in the trace
    #[arg(long)]
    pub no_depth_check: bool,

    /// Also write logs to a file under the system temp directory
    #[arg(long)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay a trace file and print the symbolic stack
    Replay {
        /// Trace file (JSON struct logs)
        trace: PathBuf,

        /// Variable bindings to apply during the replay (JSON)
        #[arg(long)]
        bindings: Option<PathBuf>,

        /// Only print the stack at this step
        #[arg(long)]
        step: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show the stack effect of opcode mnemonics
    Opcode {
        /// Mnemonics to resolve
        #[arg(required = true)]
        mnemonics: Vec<String>,
    },
}

impl Cli {
    /// Build the engine configuration from the config file and flag overrides
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::discover()?,
        };

        if let Some(depth) = self.max_stack_depth {
            config = config.with_max_stack_depth(depth);
        }
        if self.no_swap_pinning {
            config = config.with_swap_pinning(false);
        }
        if self.no_provenance {
            config = config.with_provenance(false);
        }
        if self.no_depth_check {
            config = config.with_concrete_depth_check(false);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    symstack_common::logging::init_logging("symstack", Level::WARN, cli.log_file)?;

    match &cli.command {
        Commands::Replay { trace, bindings, step, format } => {
            let config = cli.engine_config()?;
            tracing::debug!(?config, "engine configuration");
            cmd::replay_trace(trace, bindings.as_deref(), *step, *format, config)
        }
        Commands::Opcode { mnemonics } => cmd::show_opcodes(mnemonics),
    }
}
