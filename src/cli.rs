use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stow", version, about = "Resumable bulk uploads of directory trees into object storage")]
pub struct Cli {
    /// Configuration file (toml, yaml or json). Settings here override the
    /// user config file; `STOW_*` environment variables override both.
    #[arg(long, short, global = true, env = "STOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// More output (repeat for trace).
    #[arg(long, short, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload every pending job in a table.
    Upload {
        /// Container (bucket) to upload into; created if missing.
        container: String,
        /// Job table filled by `stow prepare`.
        table: String,
        /// Number of concurrent workers.
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        workers: u16,
        /// Strip local paths up to and including the last occurrence of this
        /// text to form object names.
        path_cutoff: Option<String>,
    },
    /// Create a job table listing every file under a directory.
    Prepare {
        directory: PathBuf,
        table: String,
    },
    /// Show how far a job table has got.
    Status {
        table: String,
    },
}

impl Cli {
    /// Default log level from `-v`/`-q`, used when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        }
    }
}
