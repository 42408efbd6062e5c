//! GitHub Client Integration Tests
//!
//! REST calls of the release store against a mock API server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use podsync::adapters::{ArtifactStore, GitHubReleases, WorkflowTrigger};
use podsync::domain::Platform;

fn releases(server: &MockServer) -> GitHubReleases {
    GitHubReleases::new("owner/pods", Some("secret".to_string()), Duration::from_secs(5))
        .unwrap()
        .with_api_url(server.uri())
}

fn release(name: &str, assets: serde_json::Value) -> serde_json::Value {
    json!({"name": name, "tag_name": name, "assets": assets})
}

#[tokio::test]
async fn test_list_buckets_follows_pagination() {
    let server = MockServer::start().await;

    let first_page: Vec<_> = (0..100)
        .map(|n| release(&format!("feed{}", n), json!([])))
        .collect();
    Mock::given(method("GET"))
        .and(path("/repos/owner/pods/releases"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(first_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/pods/releases"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([release(
            "metadata",
            json!([{"id": 42, "name": "lex.json", "updated_at": "2024-05-01T10:00:00Z"}])
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let buckets = releases(&server).list_buckets().await.unwrap();

    assert_eq!(buckets.len(), 101);
    let metadata = buckets.iter().find(|b| b.name == "metadata").unwrap();
    assert_eq!(metadata.assets[0].id, 42);
    assert_eq!(metadata.assets[0].name, "lex.json");
}

#[tokio::test]
async fn test_list_buckets_surfaces_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
        .mount(&server)
        .await;

    let err = releases(&server).list_buckets().await.unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("401"));
    assert!(message.contains("Bad credentials"));
}

#[tokio::test]
async fn test_trigger_dispatches_single_workflow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/owner/pods/actions/workflows/single.yml/dispatches"))
        .and(body_json(json!({
            "ref": "main",
            "inputs": {"name": "lex", "platform": "bilibili"},
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    releases(&server)
        .trigger("lex", Platform::Bilibili)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_trigger_requires_no_content_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok?"))
        .mount(&server)
        .await;

    let err = releases(&server).trigger("lex", Platform::Youtube).await.unwrap_err();
    assert!(format!("{:#}", err).contains("200"));
}

#[tokio::test]
async fn test_delete_asset() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/repos/owner/pods/releases/assets/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    releases(&server).delete_asset(42).await.unwrap();
}
