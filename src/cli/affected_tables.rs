//! Affected-tables command.

use anyhow::Result;
use clap::Args;

use crate::config::ServiceConfig;

/// Resolve the tables a query depends on, optionally with freshness.
#[derive(Args, Debug)]
pub struct AffectedTablesCommand {
    /// Database user whose database the query runs in.
    #[arg(long)]
    user: String,

    /// Layer SQL; read from stdin when omitted.
    #[arg(long)]
    sql: Option<String>,

    /// Also resolve the last update time of the tables.
    #[arg(long)]
    last_updated: bool,
}

impl AffectedTablesCommand {
    #[cfg(feature = "database")]
    pub async fn execute(self, settings: &ServiceConfig) -> Result<()> {
        use crate::api;
        use crate::database::PgQueryRunner;
        use crate::sql::QueryTablesApi;

        let sql = super::arg_or_stdin(self.sql).await?;
        let runner = PgQueryRunner::new(settings.database.clone())?;
        let resolver = QueryTablesApi::new(runner)
            .with_missing_metadata_policy(settings.freshness.missing_metadata);
        let ctx = settings.instantiation.request_context();

        let response = if self.last_updated {
            let affected =
                resolver.affected_tables_and_last_updated_time(&self.user, &sql, &ctx).await?;
            api::freshness_response(&affected)?
        } else {
            let tables = resolver.affected_tables_in_query(&self.user, &sql, &ctx).await?;
            api::tables_response(&tables)
        };

        println!("{}", response.body.render());
        Ok(())
    }

    #[cfg(not(feature = "database"))]
    pub async fn execute(self, _settings: &ServiceConfig) -> Result<()> {
        let _ = (self.user, self.sql, self.last_updated);
        Err(crate::core::MapsError::Config {
            message: "affected-tables requires namedmaps to be built with the `database` feature"
                .to_string(),
        }
        .into())
    }
}
