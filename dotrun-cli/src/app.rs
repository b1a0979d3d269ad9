//! Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A standalone CIL interpreter: runs .NET console assemblies without a
/// managed runtime.
#[derive(Parser)]
#[command(name = "dotrun", version, about)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute an assembly's entry point.
    Run {
        /// Path to the .exe assembly.
        path: PathBuf,

        /// Arguments passed to the program.
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,

        /// Directory probed for referenced assemblies
        /// (defaults to the assembly's directory).
        #[arg(long)]
        search_dir: Option<PathBuf>,
    },

    /// Print the types and methods of an assembly.
    Info {
        /// Path to the .exe or .dll assembly.
        path: PathBuf,
    },
}
