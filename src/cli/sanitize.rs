//! Neutralize renderer tokens in layer SQL.

use anyhow::Result;
use clap::Args;

use crate::sql;

/// Print SQL with renderer tokens replaced by inert literals.
#[derive(Args, Debug)]
pub struct SanitizeCommand {
    /// SQL to sanitize; read from stdin when omitted.
    sql: Option<String>,
}

impl SanitizeCommand {
    pub async fn execute(self) -> Result<()> {
        let raw = super::arg_or_stdin(self.sql).await?;
        println!("{}", sql::sanitize(&raw));
        Ok(())
    }
}
