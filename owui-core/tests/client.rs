use owui_core::{ApiErrorClass, OpenWebUiClient, OpenWebUiError};
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn upload_file_sends_multipart_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_string_contains("filename=\"docs__notes.md\""))
        .and(body_string_contains("# hello"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "file-1",
            "filename": "docs__notes.md"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let uploaded = client
        .upload_file("docs__notes.md", b"# hello".to_vec(), "text/markdown")
        .await
        .unwrap();

    assert_eq!(uploaded.id, "file-1");
    assert_eq!(uploaded.filename.as_deref(), Some("docs__notes.md"));
}

#[tokio::test]
async fn upload_file_reads_nested_data_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "id": "nested-7" }
        })))
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let uploaded = client
        .upload_file("a.txt", b"a".to_vec(), "text/plain")
        .await
        .unwrap();

    assert_eq!(uploaded.id, "nested-7");
}

#[tokio::test]
async fn upload_file_without_id_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/files/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": true })))
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let err = client
        .upload_file("a.txt", b"a".to_vec(), "text/plain")
        .await
        .expect_err("expected missing id");

    assert!(matches!(err, OpenWebUiError::MissingFileId));
}

#[tokio::test]
async fn add_and_remove_knowledge_file_post_file_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/knowledge/kb-1/file/add"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_json(json!({ "file_id": "file-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "kb-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/knowledge/kb-1/file/remove"))
        .and(body_json(json!({ "file_id": "file-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "kb-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    client.add_file_to_knowledge("kb-1", "file-1").await.unwrap();
    client
        .remove_file_from_knowledge("kb-1", "file-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_file_uses_delete_method() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/files/file-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "ok" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    client.delete_file("file-9").await.unwrap();
}

#[tokio::test]
async fn update_file_content_posts_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/files/file-3/data/content/update"))
        .and(body_json(json!({ "content": "new text" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-3" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    client
        .update_file_content("file-3", "new text")
        .await
        .unwrap();
}

#[tokio::test]
async fn get_knowledge_lists_files_with_display_names() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/knowledge/kb-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "kb-1",
            "name": "Docs",
            "files": [
                { "id": "f1", "filename": "a.md" },
                { "id": "f2", "meta": { "name": "b.md", "content_type": "text/markdown" } },
                { "id": "f3" }
            ]
        })))
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let files = client.get_knowledge("kb-1").await.unwrap().into_files();

    let names: Vec<_> = files.iter().map(|f| f.display_name()).collect();
    assert_eq!(names, vec!["a.md", "b.md", "f3"]);
}

#[tokio::test]
async fn get_knowledge_tolerates_null_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/knowledge/kb-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "kb-1",
            "files": null
        })))
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let files = client.get_knowledge("kb-1").await.unwrap().into_files();
    assert!(files.is_empty());
}

#[tokio::test]
async fn base_url_sub_path_is_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/webui/api/v1/files/f1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&format!("{}/webui", server.uri()), "test-key").unwrap();
    client.delete_file("f1").await.unwrap();
}

#[tokio::test]
async fn api_errors_carry_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/knowledge/kb-1/file/add"))
        .respond_with(ResponseTemplate::new(400).set_body_string("duplicate content"))
        .mount(&server)
        .await;

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let err = client
        .add_file_to_knowledge("kb-1", "file-1")
        .await
        .expect_err("expected api error");

    match &err {
        OpenWebUiError::Api { status, body } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(body, "duplicate content");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.classification(), Some(ApiErrorClass::Permanent));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn classifies_auth_rate_limit_and_server_errors() {
    let server = MockServer::start().await;

    for (file_id, status) in [("auth", 401), ("limit", 429), ("boom", 503)] {
        Mock::given(method("DELETE"))
            .and(path(format!("/api/v1/files/{file_id}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let client = OpenWebUiClient::new(&server.uri(), "test-key").unwrap();
    let auth = client.delete_file("auth").await.unwrap_err();
    let limit = client.delete_file("limit").await.unwrap_err();
    let boom = client.delete_file("boom").await.unwrap_err();

    assert_eq!(auth.classification(), Some(ApiErrorClass::Auth));
    assert!(!auth.is_retryable());
    assert_eq!(limit.classification(), Some(ApiErrorClass::RateLimit));
    assert!(limit.is_retryable());
    assert_eq!(boom.classification(), Some(ApiErrorClass::Transient));
    assert_eq!(boom.status().map(|s| s.as_u16()), Some(503));
}
