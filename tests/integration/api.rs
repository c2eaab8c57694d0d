use std::sync::Arc;

use namedmaps::api::{
    error_response, finish_instantiation, jsonp_wrap, parse_instantiation_body,
    parse_jsonp_request,
};
use namedmaps::constants::{LAYERGROUP_ID_HEADER, SURROGATE_KEY_HEADER};
use namedmaps::core::RequestContext;
use namedmaps::named_maps::{InstantiationRequest, NamedMapsCacheEntry, NamedMapsService};
use namedmaps::test_utils::{
    FakeRenderer, MemoryTemplateStore, RecordingSurrogateKeys, StaticMapKeys, fixtures,
};
use serde_json::json;

fn service() -> NamedMapsService {
    let store = Arc::new(MemoryTemplateStore::new());
    store.insert("alice", fixtures::parameterized_template("parcels"));
    store.insert("alice", fixtures::token_template("private", "S"));
    NamedMapsService::new(
        store,
        Arc::new(StaticMapKeys::new("k")),
        Arc::new(FakeRenderer::new("r1")),
        Arc::new(RecordingSurrogateKeys::new()),
    )
}

/// POST body → instantiation → JSON response with id headers.
#[tokio::test]
async fn test_post_instantiation_round_trip() {
    let params =
        parse_instantiation_body(Some("application/json"), br#"{"min_area": 10}"#).unwrap();
    let request = InstantiationRequest::for_path("alice", "parcels").unwrap().with_params(params);

    let response = finish_instantiation(service().instantiate(request, &RequestContext::new()).await);

    assert_eq!(response.status, 200);
    let public_id = response.header(LAYERGROUP_ID_HEADER).unwrap().to_string();
    assert!(public_id.starts_with("alice@"));
    assert!(public_id.ends_with("@r1"));
    assert_eq!(response.json_body().unwrap()["layergroupid"], json!(public_id));
    assert_eq!(
        response.header(SURROGATE_KEY_HEADER),
        Some(NamedMapsCacheEntry::new("alice", "parcels").key().as_str())
    );
}

#[tokio::test]
async fn test_forbidden_response_shape() {
    let request = InstantiationRequest::new("alice", "private").with_auth_token("nope");

    let response = finish_instantiation(service().instantiate(request, &RequestContext::new()).await);

    assert_eq!(response.status, 403);
    assert_eq!(
        response.json_body().unwrap(),
        &json!({ "errors": ["Unauthorized template instantiation"] })
    );
    assert!(response.header(LAYERGROUP_ID_HEADER).is_none());
}

#[tokio::test]
async fn test_jsonp_instantiation() {
    let jsonp = parse_jsonp_request(Some("loaded"), Some(r#"{"min_area":1}"#)).unwrap();
    let request = InstantiationRequest::new("alice", "parcels").with_params(jsonp.params);

    let response = jsonp_wrap(
        &jsonp.callback,
        finish_instantiation(service().instantiate(request, &RequestContext::new()).await),
    );

    assert_eq!(response.status, 200);
    let body = response.body.render();
    assert!(body.starts_with("/**/ typeof loaded === 'function' && loaded({"));
    assert!(body.ends_with("});"));
    assert!(response.header(LAYERGROUP_ID_HEADER).is_some());
}

#[test]
fn test_wrong_content_type_response() {
    let err = parse_instantiation_body(Some("application/x-www-form-urlencoded"), b"a=1")
        .unwrap_err();
    let response = error_response(&err);
    assert_eq!(response.status, 400);
    assert_eq!(
        response.json_body().unwrap(),
        &json!({ "errors": ["template POST data must be of type application/json"] })
    );
}
