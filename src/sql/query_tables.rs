//! Affected-tables and freshness resolution.
//!
//! Given the SQL behind a map layer, [`QueryTablesApi`] asks the user's
//! database which base tables the query reads (through the
//! `CDB_QueryTables` function) and, optionally, the most recent
//! modification time among them (through the `CDB_TableMetadata` table).
//! The answers drive cache validators and surrogate keys at the edge.
//!
//! # Wire Contract
//!
//! `CDB_QueryTables` returns a Postgres array rendered as text, e.g.
//! `{public.parcels,public.roads}`. [`parse_table_list`] is the only place
//! that knows this format; if the database function ever returns a native
//! array, that function is all that changes.
//!
//! # Failure Semantics
//!
//! Any execution failure or empty result set surfaces as one
//! [`MapsError::AffectedTables`] carrying the cause. Partial table lists are
//! never returned.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{contains_render_tokens, sanitize};
use crate::constants::DOLLAR_QUOTE_TAG;
use crate::core::{MapsError, RequestContext, Result};

/// Stage label under which resolver queries are timed.
pub const QUERY_TABLES_STAGE: &str = "queryTables";

/// One result row, every column rendered as text (`None` for SQL NULL).
pub type Row = HashMap<String, Option<String>>;

/// Executes SQL on behalf of a user.
///
/// This is the raw execution transport; connection management, pooling,
/// and reconnection are the implementation's concern.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run `query` against `user`'s database and return every row.
    async fn run(&self, user: &str, query: &str) -> Result<Vec<Row>>;
}

#[async_trait]
impl<T: QueryRunner + ?Sized> QueryRunner for std::sync::Arc<T> {
    async fn run(&self, user: &str, query: &str) -> Result<Vec<Row>> {
        (**self).run(user, query).await
    }
}

/// How tables without a `CDB_TableMetadata` row affect freshness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMetadataPolicy {
    /// Untracked tables are left out of the max; only tracked tables count.
    #[default]
    Ignore,
    /// Any untracked table makes the whole result unknown (timestamp 0).
    Unknown,
}

/// Tables a query depends on and the last time any of them changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedTables {
    /// Fully-qualified table names, in the order the database reported them.
    #[serde(rename = "affectedTables")]
    pub tables: Vec<String>,
    /// Epoch milliseconds of the most recent write; `0` means unknown and
    /// must be treated as stale.
    pub last_updated_time: i64,
}

impl AffectedTables {
    /// Last update as a timestamp, `None` when unknown.
    #[must_use]
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        if self.last_updated_time == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.last_updated_time)
    }
}

/// Parse the brace-delimited table list returned by `CDB_QueryTables`.
///
/// The whole value must be wrapped in braces and fit on one line; the inner
/// text is split on commas. An empty list, or a value that is not
/// brace-delimited, yields no tables.
///
/// # Examples
///
/// ```rust
/// use namedmaps::sql::parse_table_list;
///
/// assert_eq!(parse_table_list("{public.parcels,public.roads}"), vec!["public.parcels", "public.roads"]);
/// assert!(parse_table_list("{}").is_empty());
/// ```
#[must_use]
pub fn parse_table_list(raw: &str) -> Vec<String> {
    raw.strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|inner| !inner.is_empty() && !inner.contains(['\n', '\r', '\u{2028}', '\u{2029}']))
        .map(|inner| inner.split(',').map(str::to_string).collect())
        .unwrap_or_default()
}

/// Wrap `sql` in a dollar-quoted literal whose tag does not occur in it.
fn dollar_quote(sql: &str) -> String {
    let mut tag = DOLLAR_QUOTE_TAG.to_string();
    let mut suffix = 0usize;
    // A body ending in `$tag` would merge with the closing delimiter.
    let guarded = format!("{sql}$");
    while guarded.contains(&format!("${tag}$")) {
        suffix += 1;
        tag = format!("{DOLLAR_QUOTE_TAG}{suffix}");
    }
    format!("${tag}${sql}${tag}$")
}

/// Compose the query resolving the tables `sql` depends on.
#[must_use]
pub fn affected_tables_query(sql: &str) -> String {
    format!("SELECT CDB_QueryTables({})::text AS cdb_querytables", dollar_quote(&sanitize(sql)))
}

/// Compose the query resolving tables plus their latest update time.
#[must_use]
pub fn affected_tables_and_last_updated_time_query(sql: &str) -> String {
    [
        "WITH querytables AS (",
        &format!(
            "SELECT * FROM CDB_QueryTables({}) as tablenames",
            dollar_quote(&sanitize(sql))
        ),
        ")",
        "SELECT (SELECT tablenames FROM querytables)::text AS tablenames,",
        "EXTRACT(EPOCH FROM max(updated_at))::text as max,",
        "count(m.tabname)::text as tracked",
        "FROM CDB_TableMetadata m",
        "WHERE m.tabname = any ((SELECT tablenames from querytables)::regclass[])",
    ]
    .join(" ")
}

/// Resolves the tables a query reads and their freshness.
///
/// Every database call runs through the caller's [`RequestContext`], so a
/// cancelled or timed-out request abandons the query.
///
/// # Examples
///
/// ```rust,no_run
/// use namedmaps::core::RequestContext;
/// use namedmaps::sql::{QueryRunner, QueryTablesApi};
///
/// # async fn example(runner: impl QueryRunner) -> namedmaps::core::Result<()> {
/// let api = QueryTablesApi::new(runner);
/// let affected = api
///     .affected_tables_and_last_updated_time(
///         "alice",
///         "SELECT * FROM roads WHERE the_geom && !bbox!",
///         &RequestContext::new(),
///     )
///     .await?;
/// println!("{:?} last changed at {}", affected.tables, affected.last_updated_time);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueryTablesApi<R> {
    runner: R,
    missing_metadata: MissingMetadataPolicy,
}

impl<R: QueryRunner> QueryTablesApi<R> {
    /// Create a resolver using the default [`MissingMetadataPolicy::Ignore`].
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            missing_metadata: MissingMetadataPolicy::default(),
        }
    }

    /// Override how untracked tables affect freshness.
    #[must_use]
    pub fn with_missing_metadata_policy(mut self, policy: MissingMetadataPolicy) -> Self {
        self.missing_metadata = policy;
        self
    }

    /// The underlying query runner.
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Tables that `sql` depends on.
    ///
    /// # Errors
    ///
    /// [`MapsError::AffectedTables`] when the query fails, returns no rows,
    /// or lacks the `cdb_querytables` column; [`MapsError::Cancelled`] or
    /// [`MapsError::DeadlineExceeded`] when `ctx` interrupts it.
    pub async fn affected_tables_in_query(
        &self,
        user: &str,
        sql: &str,
        ctx: &RequestContext,
    ) -> Result<Vec<String>> {
        const CONTEXT: &str = "could not fetch source tables";

        log_render_tokens(sql);
        let query = affected_tables_query(sql);
        debug!(user, query = %query, "Resolving affected tables");

        let rows = ctx
            .run(QUERY_TABLES_STAGE, self.runner.run(user, &query))
            .await
            .map_err(|e| resolution_error(CONTEXT, e))?;
        let row = first_row(CONTEXT, &rows)?;
        let raw = text_column(CONTEXT, row, "cdb_querytables")?;

        Ok(parse_table_list(raw))
    }

    /// Tables that `sql` depends on and the last time any of them changed.
    ///
    /// A query that reads no tables resolves to `{tables: [], last_updated_time: 0}`.
    ///
    /// # Errors
    ///
    /// [`MapsError::AffectedTables`] when the query fails, returns no rows,
    /// or lacks the `tablenames` column; [`MapsError::Cancelled`] or
    /// [`MapsError::DeadlineExceeded`] when `ctx` interrupts it.
    pub async fn affected_tables_and_last_updated_time(
        &self,
        user: &str,
        sql: &str,
        ctx: &RequestContext,
    ) -> Result<AffectedTables> {
        const CONTEXT: &str = "could not fetch affected tables and last updated time";

        log_render_tokens(sql);
        let query = affected_tables_and_last_updated_time_query(sql);
        debug!(user, query = %query, "Resolving affected tables and last updated time");

        let rows = ctx
            .run(QUERY_TABLES_STAGE, self.runner.run(user, &query))
            .await
            .map_err(|e| resolution_error(CONTEXT, e))?;
        let row = first_row(CONTEXT, &rows)?;

        let tables = parse_table_list(text_column(CONTEXT, row, "tablenames")?);
        let max_epoch_millis = row.get("max").and_then(|v| v.as_deref()).and_then(epoch_to_millis);
        let tracked = row
            .get("tracked")
            .and_then(|v| v.as_deref())
            .and_then(|t| t.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let last_updated_time = match self.missing_metadata {
            MissingMetadataPolicy::Unknown if tracked < tables.len() => {
                debug!(
                    tracked,
                    tables = tables.len(),
                    "Some affected tables have no metadata; freshness unknown"
                );
                0
            }
            _ => max_epoch_millis.unwrap_or(0),
        };

        Ok(AffectedTables {
            tables,
            last_updated_time,
        })
    }
}

fn log_render_tokens(sql: &str) {
    if contains_render_tokens(sql) {
        debug!("Neutralizing renderer tokens before dependency analysis");
    }
}

fn resolution_error(context: &str, cause: MapsError) -> MapsError {
    let reason = match cause {
        interrupted @ (MapsError::Cancelled {
            ..
        }
        | MapsError::DeadlineExceeded {
            ..
        }) => return interrupted,
        MapsError::AffectedTables {
            reason,
            ..
        } => reason,
        other => other.to_string(),
    };
    warn!(context, reason = %reason, "Affected tables resolution failed");
    MapsError::AffectedTables {
        context: context.to_string(),
        reason,
    }
}

fn first_row<'a>(context: &str, rows: &'a [Row]) -> Result<&'a Row> {
    rows.first()
        .ok_or_else(|| resolution_error(context, MapsError::validation("query returned no rows")))
}

fn text_column<'a>(context: &str, row: &'a Row, column: &str) -> Result<&'a str> {
    match row.get(column) {
        Some(Some(value)) => Ok(value.as_str()),
        Some(None) => Ok(""),
        None => Err(resolution_error(
            context,
            MapsError::validation(format!("result has no '{column}' column")),
        )),
    }
}

/// Convert `EXTRACT(EPOCH ...)` text (fractional seconds) to milliseconds.
fn epoch_to_millis(raw: &str) -> Option<i64> {
    let seconds: f64 = raw.trim().parse().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    // `as` saturates on overflow.
    Some(millis as i64)
}
