//! namedmaps CLI entry point
//!
//! Parses the command line, runs the command, and renders failures with
//! suggestions:
//! - `sanitize` - Neutralize renderer tokens in SQL
//! - `fingerprint` - Print a template's content digest
//! - `validate` - Check a template file
//! - `instantiate` - Dry-run an instantiation
//! - `affected-tables` - Resolve the tables behind a query

use anyhow::Result;
use clap::Parser;
use namedmaps::cli;
use namedmaps::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
