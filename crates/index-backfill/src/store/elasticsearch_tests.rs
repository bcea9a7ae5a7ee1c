//! Tests for the Elasticsearch store.

use super::*;
use crate::document::DocumentRef;
use crate::store::DocumentStore;
use serde_json::Map;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(url: &str) -> ElasticsearchConfig {
    ElasticsearchConfig {
        url: url.to_string(),
        username: None,
        password: None,
        api_key: None,
        timeout_secs: 5,
        search_retries: 0,
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn page_body(scroll_id: &str, ids: &[&str]) -> Value {
    let hits: Vec<Value> = ids
        .iter()
        .map(|id| json!({"_index": "projects", "_type": "download", "_id": id, "_source": {}}))
        .collect();
    json!({"_scroll_id": scroll_id, "hits": {"total": ids.len(), "hits": hits}})
}

#[test]
fn test_elasticsearch_config_defaults() {
    let json = r#"{"url":"http://localhost:9200"}"#;
    let config: ElasticsearchConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.timeout_secs, 30);
    assert_eq!(config.search_retries, 3);
    assert!(config.api_key.is_none());
}

#[test]
fn test_backend_type() {
    let store = ElasticsearchStore::new(test_config("http://localhost:9200"));
    assert_eq!(store.backend_type(), "elasticsearch");
}

#[test]
fn test_build_search_url() {
    let store = ElasticsearchStore::new(test_config("http://localhost:9200/"));
    let request = SearchRequest::in_index_order("initializr-2015", "request", None, 10, "5m");
    assert_eq!(
        store.build_search_url(&request).unwrap().as_str(),
        "http://localhost:9200/initializr-2015/request/_search?scroll=5m"
    );
}

#[test]
fn test_build_search_url_encodes_names() {
    // Arrange
    let store = ElasticsearchStore::new(test_config("http://localhost:9200"));
    let request = SearchRequest::in_index_order("logs 2015/a", "doc?", None, 10, "5m&size=1");

    // Act
    let url = store.build_search_url(&request).unwrap();

    // Assert
    assert_eq!(
        url.as_str(),
        "http://localhost:9200/logs%202015%2Fa/doc%3F/_search?scroll=5m%26size%3D1"
    );
}

#[test]
fn test_build_url_keeps_base_path() {
    let store = ElasticsearchStore::new(test_config("https://example.com/es/"));
    assert_eq!(
        store.build_url(&["_bulk"]).unwrap().as_str(),
        "https://example.com/es/_bulk"
    );
}

#[test]
fn test_build_url_rejects_unparsable_base() {
    let store = ElasticsearchStore::new(test_config("not a url"));
    let err = store.build_url(&["_bulk"]).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_encode_bulk_update_is_partial_doc() {
    let actions = vec![WriteAction::Update {
        target: DocumentRef {
            index: "projects".to_string(),
            doc_type: "download".to_string(),
            id: "42".to_string(),
        },
        doc: object(json!({"totalCount": 5})),
    }];
    let body = encode_bulk(&actions).unwrap();
    let lines: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert!(body.ends_with('\n'));
    assert_eq!(
        lines[0],
        json!({"update": {"_index": "projects", "_type": "download", "_id": "42"}})
    );
    assert_eq!(lines[1], json!({"doc": {"totalCount": 5}}));
}

#[test]
fn test_encode_bulk_insert_has_no_id() {
    let actions = vec![WriteAction::insert(
        "downloads-major",
        "generation",
        object(json!({"generation": "1", "count": 3})),
    )];
    let body = encode_bulk(&actions).unwrap();
    let meta: Value = serde_json::from_str(body.lines().next().unwrap()).unwrap();

    assert_eq!(
        meta,
        json!({"index": {"_index": "downloads-major", "_type": "generation"}})
    );
}

#[test]
fn test_bulk_response_conversion() {
    let raw = json!({
        "took": 3,
        "errors": true,
        "items": [
            {"update": {"_index": "projects", "_id": "1", "status": 200}},
            {"update": {"_index": "projects", "_id": "2", "status": 409,
                "error": {"type": "version_conflict_engine_exception", "reason": "conflict"}}}
        ]
    });
    let api: BulkApiResponse = serde_json::from_value(raw).unwrap();
    let response = BulkResponse::from(api);

    assert_eq!(response.items.len(), 2);
    assert!(!response.items[0].is_failure());
    let failed: Vec<_> = response.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id.as_deref(), Some("2"));
    assert_eq!(
        failed[0].error.as_deref(),
        Some("version_conflict_engine_exception: conflict")
    );
}

#[tokio::test]
async fn test_search_sends_scroll_and_doc_sort() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/download/_search"))
        .and(query_param("scroll", "5m"))
        .and(body_json(json!({
            "query": {"match_all": {}},
            "size": 2,
            "sort": ["_doc"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body("scroll-1", &["a", "b"])))
        .expect(1)
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri()));
    let request = SearchRequest::in_index_order("projects", "download", None, 2, "5m");
    let page = store.search(&request).await.unwrap();

    assert_eq!(page.hits.len(), 2);
    assert_eq!(page.scroll_id.as_deref(), Some("scroll-1"));
}

#[tokio::test]
async fn test_search_failure_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("index_not_found_exception"))
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri()))
        .with_search_retry(RetryConfig::no_retry());
    let request = SearchRequest::in_index_order("missing", "doc", None, 2, "5m");
    let err = store.search(&request).await.unwrap_err();

    assert!(matches!(err, Error::Backend(_)));
}

#[tokio::test]
async fn test_search_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri()));
    let request = SearchRequest::in_index_order("projects", "download", None, 2, "5m");
    let err = store.search(&request).await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn test_search_retries_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/projects/download/_search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/download/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body("scroll-1", &["a"])))
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri())).with_search_retry(RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        add_jitter: false,
        ..RetryConfig::default()
    });
    let request = SearchRequest::in_index_order("projects", "download", None, 1, "5m");
    let page = store.search(&request).await.unwrap();

    assert_eq!(page.hits.len(), 1);
}

#[tokio::test]
async fn test_scroll_renews_keep_alive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({"scroll": "5m", "scroll_id": "scroll-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body("scroll-2", &["c"])))
        .expect(1)
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri()));
    let page = store.scroll("scroll-1", "5m").await.unwrap();

    assert_eq!(page.hits[0]["_id"], "c");
    assert_eq!(page.scroll_id.as_deref(), Some("scroll-2"));
}

#[tokio::test]
async fn test_bulk_posts_ndjson_with_api_key() {
    let server = MockServer::start().await;
    let actions = vec![WriteAction::insert(
        "downloads",
        "download",
        object(json!({"count": 1})),
    )];
    let expected_body = encode_bulk(&actions).unwrap();
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("Authorization", "ApiKey secret"))
        .and(header("Content-Type", "application/x-ndjson"))
        .and(body_string(expected_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": false,
            "items": [{"index": {"_index": "downloads", "_id": "gen-1", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config(&server.uri());
    config.api_key = Some("secret".to_string());
    let store = ElasticsearchStore::new(config);
    let response = store.bulk(&actions).await.unwrap();

    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0].action, "index");
    assert_eq!(response.failures().count(), 0);
}

#[tokio::test]
async fn test_clear_scroll() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({"scroll_id": ["scroll-9"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"succeeded": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = ElasticsearchStore::new(test_config(&server.uri()));
    store.clear_scroll("scroll-9").await.unwrap();
}
