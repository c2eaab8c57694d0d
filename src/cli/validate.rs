//! Template validation command.
//!
//! Loads a template file and checks it against the rules a template store
//! enforces before accepting it:
//!
//! - the format version is supported
//! - the template and placeholder names are well-formed
//! - token-protected templates declare at least one token
//! - declared defaults fit their placeholder types
//! - the layergroup is a JSON object
//!
//! With `--json` the result is printed as `{"valid": bool, "errors": [...]}`
//! and the exit status is still non-zero on failure.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde_json::json;

use crate::config::ServiceConfig;
use crate::template::AuthPolicy;

/// Validate a template file.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Template JSON file.
    template: PathBuf,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

impl ValidateCommand {
    pub async fn execute(self, settings: &ServiceConfig) -> Result<()> {
        let template = super::read_template(settings, &self.template).await?;
        let outcome = template.validate();

        if self.json {
            let errors: Vec<String> =
                outcome.as_ref().err().map(ToString::to_string).into_iter().collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "valid": errors.is_empty(),
                    "errors": errors,
                }))?
            );
        } else if outcome.is_ok() {
            let auth = match &template.auth {
                AuthPolicy::Open => "open".to_string(),
                AuthPolicy::Token {
                    valid_tokens,
                } => format!("token ({} valid)", valid_tokens.len()),
            };
            println!("{} Template '{}' is valid", "✓".green(), template.name);
            println!("  auth: {auth}");
            println!("  placeholders: {}", template.placeholders.len());
        }

        outcome?;
        Ok(())
    }
}
