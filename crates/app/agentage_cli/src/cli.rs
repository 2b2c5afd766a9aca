use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_API_URL: &str = "https://agentage.io";

#[derive(Parser, Debug)]
#[command(name = "agentage", version, about = "Agentage command line client")]
pub struct Cli {
    /// Base URL of the Agentage API.
    #[arg(long, global = true, env = "AGENTAGE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Directory holding stored credentials.
    #[arg(long, global = true, env = "AGENTAGE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in through the browser using a one-time device code
    Login,
    /// Show the signed-in user
    Whoami,
    /// Forget the stored credentials
    Logout,
    /// Print version information
    Version,
}
