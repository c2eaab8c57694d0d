use std::sync::Arc;
use std::time::Duration;

use namedmaps::core::{MapsError, RequestContext};
use namedmaps::named_maps::{InstantiationRequest, NamedMapsCacheEntry, NamedMapsService};
use namedmaps::template::{Params, fingerprint_prefix};
use namedmaps::test_utils::{
    FakeRenderer, MemoryTemplateStore, RecordingSurrogateKeys, StaticMapKeys, fixtures,
    init_test_logging,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct Setup {
    store: Arc<MemoryTemplateStore>,
    renderer: Arc<FakeRenderer>,
    tags: Arc<RecordingSurrogateKeys>,
    service: NamedMapsService,
}

fn setup() -> Setup {
    init_test_logging(None);
    let store = Arc::new(MemoryTemplateStore::new());
    let renderer = Arc::new(FakeRenderer::new("abc123:1700000000000"));
    let tags = Arc::new(RecordingSurrogateKeys::new());
    let service = NamedMapsService::new(
        store.clone(),
        Arc::new(StaticMapKeys::new("alice-api-key")),
        renderer.clone(),
        tags.clone(),
    );
    Setup {
        store,
        renderer,
        tags,
        service,
    }
}

/// Open template instantiated with no params yields `alice@<8 hex>@<renderer id>`.
#[tokio::test]
async fn test_open_template_public_id() {
    let s = setup();
    let template = fixtures::open_template("t1");
    let prefix = fingerprint_prefix(&template).unwrap();
    s.store.insert("alice", template);

    let result = s
        .service
        .instantiate(InstantiationRequest::new("alice", "t1"), &RequestContext::new())
        .await
        .unwrap();

    let parts: Vec<&str> = result.public_layergroup_id.splitn(3, '@').collect();
    assert_eq!(parts[0], "alice");
    assert_eq!(parts[1].len(), 8);
    assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(parts[1], prefix);
    assert_eq!(parts[2], "abc123:1700000000000");

    assert_eq!(s.tags.tags(), vec![(
        result.public_layergroup_id.clone(),
        NamedMapsCacheEntry::new("alice", "t1")
    )]);
}

/// Missing template for bob is a 404.
#[tokio::test]
async fn test_missing_template_is_not_found() {
    let s = setup();

    let err = s
        .service
        .instantiate(InstantiationRequest::new("bob", "missing"), &RequestContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MapsError::NotFound { .. }));
    assert_eq!(err.status_code(), 404);
    assert_eq!(err.to_string(), "Template 'missing' of user 'bob' not found");
    assert!(s.renderer.calls().is_empty());
}

/// Templates are namespaced by owner.
#[tokio::test]
async fn test_template_of_other_owner_is_not_found() {
    let s = setup();
    s.store.insert("alice", fixtures::open_template("t1"));

    let err = s
        .service
        .instantiate(InstantiationRequest::new("bob", "t1"), &RequestContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

/// Wrong token is a 403, not a 400.
#[tokio::test]
async fn test_wrong_token_is_forbidden() {
    let s = setup();
    s.store.insert("alice", fixtures::token_template("secret_map", "S"));

    for token in [Some("wrong"), Some(""), None] {
        let mut request = InstantiationRequest::new("alice", "secret_map");
        if let Some(token) = token {
            request = request.with_auth_token(token);
        }
        let err = s.service.instantiate(request, &RequestContext::new()).await.unwrap_err();
        assert!(matches!(err, MapsError::Forbidden { .. }), "token {token:?}: {err:?}");
        assert_eq!(err.status_code(), 403);
    }

    let request = InstantiationRequest::new("alice", "secret_map").with_auth_token("S");
    s.service.instantiate(request, &RequestContext::new()).await.unwrap();
}

#[tokio::test]
async fn test_owner_from_path_segment() {
    let s = setup();
    s.store.insert("alice", fixtures::open_template("t1"));

    let request = InstantiationRequest::for_path("bob", "alice@t1").unwrap();
    let result = s.service.instantiate(request, &RequestContext::new()).await.unwrap();
    assert!(result.public_layergroup_id.starts_with("alice@"));

    let calls = s.renderer.calls();
    assert_eq!(calls[0].1.user, "alice");
    assert_eq!(calls[0].1.api_key, "alice-api-key");
}

#[tokio::test]
async fn test_params_reach_renderer() {
    let s = setup();
    s.store.insert("alice", fixtures::parameterized_template("parcels"));

    let mut params = Params::new();
    params.insert("min_area".to_string(), json!(250));
    params.insert("color".to_string(), json!("#00ff00"));
    let request = InstantiationRequest::new("alice", "parcels").with_params(params);
    s.service.instantiate(request, &RequestContext::new()).await.unwrap();

    let (layergroup, _) = &s.renderer.calls()[0];
    let options = &layergroup["layers"][0]["options"];
    assert_eq!(options["sql"], "SELECT * FROM parcels WHERE area > 250");
    assert_eq!(options["cartocss"], "#layer { polygon-fill: #00ff00; }");
}

/// A required parameter with no default fails instead of substituting nothing.
#[tokio::test]
async fn test_missing_parameter_is_bad_request() {
    let s = setup();
    s.store.insert("alice", fixtures::parameterized_template("parcels"));

    let err = s
        .service
        .instantiate(InstantiationRequest::new("alice", "parcels"), &RequestContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, MapsError::MissingParameter { ref name } if name == "min_area"));
    assert_eq!(err.status_code(), 400);
    assert!(s.renderer.calls().is_empty());
}

#[tokio::test]
async fn test_store_failure_keeps_its_status() {
    let s = setup();
    s.store.fail_with(MapsError::Collaborator {
        collaborator: "template store".into(),
        message: "connection refused".into(),
        status: Some(503),
    });

    let err = s
        .service
        .instantiate(InstantiationRequest::new("alice", "t1"), &RequestContext::new())
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_cancellation_aborts_remaining_stages() {
    let s = setup();
    s.store.insert("alice", fixtures::open_template("t1"));
    s.renderer.delay_by(Duration::from_secs(30));

    let token = CancellationToken::new();
    let ctx = RequestContext::new().with_cancellation(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = s
        .service
        .instantiate(InstantiationRequest::new("alice", "t1"), &ctx)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, MapsError::Cancelled { ref stage } if stage == "createLayergroup"));
    assert_eq!(err.status_code(), 499);
    assert!(s.tags.tags().is_empty());
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let s = setup();
    s.store.insert("alice", fixtures::open_template("t1"));
    s.renderer.delay_by(Duration::from_secs(30));

    let ctx = RequestContext::new().with_timeout(Duration::from_millis(20));
    let err = s
        .service
        .instantiate(InstantiationRequest::new("alice", "t1"), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, MapsError::DeadlineExceeded { .. }));
    assert_eq!(err.status_code(), 504);
}

#[tokio::test]
async fn test_concurrent_instantiations_of_same_template() {
    let s = setup();
    s.store.insert("alice", fixtures::open_template("t1"));
    let service = Arc::new(s.service);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .instantiate(InstantiationRequest::new("alice", "t1"), &RequestContext::new())
                    .await
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().public_layergroup_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "same template and renderer id must give the same public id");
    assert_eq!(s.tags.tags().len(), 16);
}
