use std::sync::Arc;
use std::time::Duration;

use namedmaps::core::{MapsError, RequestContext};
use namedmaps::sql::{AffectedTables, MissingMetadataPolicy, QueryTablesApi};
use namedmaps::test_utils::FakeQueryRunner;
use tokio_util::sync::CancellationToken;

/// The bbox token is neutralized before the query reaches the database.
#[tokio::test]
async fn test_roads_query_with_bbox() {
    let runner = Arc::new(
        FakeQueryRunner::new()
            .with_rows(vec![FakeQueryRunner::row(&[("cdb_querytables", Some("{roads}"))])]),
    );
    let api = QueryTablesApi::new(runner.clone());

    let tables = api
        .affected_tables_in_query(
            "alice",
            "SELECT * FROM roads WHERE ST_Intersects(geom, !bbox!)",
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(tables, vec!["roads"]);

    let queries = runner.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0, "alice");
    assert!(queries[0].1.contains("ST_Intersects(geom, ST_MakeEnvelope(0,0,0,0))"));
    assert!(!queries[0].1.contains("!bbox!"));
}

/// A query reading no tables is fresh-unknown, not an error.
#[tokio::test]
async fn test_no_dependencies() {
    let runner = FakeQueryRunner::new().with_rows(vec![FakeQueryRunner::row(&[
        ("tablenames", Some("{}")),
        ("max", None),
        ("tracked", Some("0")),
    ])]);
    let api = QueryTablesApi::new(runner);

    let affected = api
        .affected_tables_and_last_updated_time("alice", "SELECT 1", &RequestContext::new())
        .await
        .unwrap();
    assert_eq!(affected, AffectedTables {
        tables: vec![],
        last_updated_time: 0
    });
}

#[tokio::test]
async fn test_freshness_with_all_renderer_tokens() {
    let runner = Arc::new(FakeQueryRunner::new().with_rows(vec![FakeQueryRunner::row(&[
        ("tablenames", Some("{public.parcels}")),
        ("max", Some("1609459200.123")),
        ("tracked", Some("1")),
    ])]));
    let api = QueryTablesApi::new(runner.clone());

    let sql = "SELECT *, !scale_denominator! * !pixel_width! / !pixel_height! FROM parcels \
               WHERE the_geom && !bbox!";
    let affected =
        api
            .affected_tables_and_last_updated_time("alice", sql, &RequestContext::new())
            .await
            .unwrap();
    assert_eq!(affected.tables, vec!["public.parcels"]);
    assert_eq!(affected.last_updated_time, 1_609_459_200_123);

    let query = &runner.queries()[0].1;
    for token in ["!bbox!", "!scale_denominator!", "!pixel_width!", "!pixel_height!"] {
        assert!(!query.contains(token), "{token} leaked into {query}");
    }
}

#[tokio::test]
async fn test_unknown_policy_with_untracked_table() {
    let runner = FakeQueryRunner::new().with_rows(vec![FakeQueryRunner::row(&[
        ("tablenames", Some("{public.parcels,public.scratch}")),
        ("max", Some("1609459200")),
        ("tracked", Some("1")),
    ])]);
    let api =
        QueryTablesApi::new(runner).with_missing_metadata_policy(MissingMetadataPolicy::Unknown);

    let affected = api
        .affected_tables_and_last_updated_time(
            "alice",
            "SELECT * FROM parcels, scratch",
            &RequestContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(affected.tables.len(), 2);
    assert_eq!(affected.last_updated_time, 0);
}

#[tokio::test]
async fn test_database_error_is_wrapped() {
    let runner = FakeQueryRunner::new().with_error(MapsError::collaborator(
        "database",
        "syntax error at or near \"SELEC\"",
    ));
    let api = QueryTablesApi::new(runner);

    let err = api
        .affected_tables_and_last_updated_time("alice", "SELEC 1", &RequestContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MapsError::AffectedTables { .. }));
    assert_eq!(err.status_code(), 400);
    assert_eq!(
        err.to_string(),
        "could not fetch affected tables and last updated time: database failed: syntax error at \
         or near \"SELEC\""
    );
}

#[tokio::test]
async fn test_empty_result_is_error() {
    let api = QueryTablesApi::new(FakeQueryRunner::new());

    let err =
        api
            .affected_tables_in_query("alice", "SELECT 1", &RequestContext::new())
            .await
            .unwrap_err();
    assert_eq!(err.to_string(), "could not fetch source tables: query returned no rows");
}

/// A slow database is abandoned once the request is cancelled or runs out of time.
#[tokio::test]
async fn test_slow_database_is_interrupted() {
    let runner = FakeQueryRunner::new()
        .with_rows(vec![FakeQueryRunner::row(&[("cdb_querytables", Some("{roads}"))])])
        .with_delay(Duration::from_secs(30));
    let api = QueryTablesApi::new(runner);

    let token = CancellationToken::new();
    token.cancel();
    let ctx = RequestContext::new().with_cancellation(token);
    let err = api.affected_tables_in_query("alice", "SELECT * FROM roads", &ctx).await.unwrap_err();
    assert!(matches!(err, MapsError::Cancelled { .. }));
    assert_eq!(err.status_code(), 499);

    let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
    let err = api
        .affected_tables_and_last_updated_time("alice", "SELECT * FROM roads", &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, MapsError::DeadlineExceeded { .. }));
    assert_eq!(err.status_code(), 504);
}
