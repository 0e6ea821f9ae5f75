use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-weaver")]
#[command(about = "Weave lazy loading, change tracking and fetch groups into compiled JPA entities")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Ledger database of already woven inputs.
    #[arg(long, value_name = "FILE", global = true)]
    pub db: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Weave jars or class directories in place, or into --output.
    Weave {
        #[arg(short = 'm', long, value_name = "FILE")]
        model: PathBuf,

        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Output jar or directory; only valid with a single input.
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Extra jars or directories probed for optional annotations.
        #[arg(long = "classpath", value_name = "PATH")]
        classpath: Vec<PathBuf>,

        /// Target `java.specification.version`, e.g. 1.8 or 17.
        #[arg(long, value_name = "VER")]
        java_version: Option<String>,

        /// Weave even if the ledger says the input is current.
        #[arg(long)]
        force: bool,

        /// Print per-class reports instead of per-input summaries.
        #[arg(long)]
        report: bool,
    },
    /// Print the structure of a class file, or what weaving would add to it.
    Inspect {
        class_file: PathBuf,

        #[arg(short = 'm', long, value_name = "FILE")]
        model: Option<PathBuf>,
    },
    Stats,
    Clear,
}
