use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

/// Curtin's custom storage engine (§6 "External interfaces").
#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full storage pipeline against the current host
    #[clap(name = "block-meta")]
    BlockMeta {
        #[clap(subcommand)]
        action: BlockMetaAction,
    },

    /// Tear down the holder stack above one or more devices
    #[clap(name = "clear-holders")]
    ClearHolders {
        /// Print the ordered shutdown plan without executing it
        #[clap(long)]
        shutdown_plan: bool,

        /// Target device paths
        #[clap(required = true)]
        devices: Vec<PathBuf>,
    },

    /// Exit 0 iff none of the given devices still has holders
    #[clap(name = "assert-clear")]
    AssertClear {
        #[clap(required = true)]
        devices: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum BlockMetaAction {
    /// Apply the storage configuration read from `$CONFIG` (§6)
    Custom,
}
