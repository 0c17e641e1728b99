//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

/// Default configuration file.
pub const DEFAULT_CONFIG: &str = "fieldnode.json5";

/// CLI arguments for the node.
#[derive(Parser, Debug, Clone)]
#[command(name = "fieldnode", version, about = "Network-provisioned field sensor node")]
pub struct NodeArgs {
    /// Path to configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the node identity (hex, separators allowed).
    #[arg(long)]
    pub node_id: Option<String>,

    /// Run against an in-process broker with a simulated provisioning
    /// service. Needs no network and no configuration file.
    #[arg(long)]
    pub demo: bool,
}

impl NodeArgs {
    /// Parse CLI arguments from the process environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
