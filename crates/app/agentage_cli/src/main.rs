// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};

mod cli;
mod client;
mod commands;
mod credentials;
mod logging;

use client::ApiClient;
use credentials::CredentialStore;

fn main() -> Result<()> {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();
    let store = CredentialStore::locate(args.config_dir.as_deref())?;

    match &args.command {
        Commands::Login => commands::login(&ApiClient::new(&args.api_url)?, &store)?,
        Commands::Whoami => {
            // Query the API that issued the stored token.
            let api_url = match store.load()? {
                Some(credentials) => credentials.api_url,
                None => return Err(Error::NotLoggedIn),
            };
            commands::whoami(&ApiClient::new(&api_url)?, &store)?;
        }
        Commands::Logout => commands::logout(&store)?,
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
