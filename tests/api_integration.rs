use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use notebook_lib::database::Database;
use notebook_lib::http::{create_router, AppState};
use notebook_lib::llm_manager::MoonshotClient;
use notebook_lib::server_config::{RateLimitConfig, ServerConfig};

const API_KEY: &str = "sk-test-0123456789abcdefghij";

struct TestApp {
    router: Router,
    _dir: TempDir,
}

fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        encryption_key: Some("integration-test-secret".into()),
        database_path: dir.path().join("notes.db"),
        ..ServerConfig::default()
    }
}

fn build_app(config: ServerConfig, dir: TempDir, base_url: &str) -> TestApp {
    let db = Arc::new(Database::new(&config.database_path).unwrap());
    let client = Arc::new(MoonshotClient::new(base_url, "kimi-k2-turbo-preview", None).unwrap());
    let state = Arc::new(AppState::new(config, db, client));
    TestApp {
        router: create_router(state),
        _dir: dir,
    }
}

fn setup() -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    // 不会被访问的上游地址
    build_app(config, dir, "http://127.0.0.1:9")
}

fn setup_with_upstream(base_url: &str) -> TestApp {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    build_app(config, dir, base_url)
}

fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &TestApp, req: Request<Body>) -> Response {
    app.router.clone().oneshot(req).await.unwrap()
}

async fn create_note(app: &TestApp, title: &str, content: &str) -> Value {
    let resp = send(
        app,
        json_request(
            Method::POST,
            "/api/notes",
            Some(json!({"title": title, "content": content})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    body_json(resp).await["data"].clone()
}

async fn set_key(app: &TestApp) {
    let resp = send(
        app,
        json_request(Method::POST, "/api/ai/set-key", Some(json!({"apiKey": API_KEY}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

fn completion_body(content: &str) -> String {
    json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

// ---------- 健康检查与通用行为 ----------

#[tokio::test]
async fn health_reports_ok_with_security_headers() {
    let app = setup();
    let resp = send(&app, json_request(Method::GET, "/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
    assert_eq!(resp.headers()["x-frame-options"], "SAMEORIGIN");
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn unknown_route_returns_404_with_path() {
    let app = setup();
    let resp = send(&app, json_request(Method::GET, "/api/unknown", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(
        body,
        json!({"success": false, "error": "接口不存在", "path": "/api/unknown"})
    );
}

#[tokio::test]
async fn unrouted_method_returns_404_envelope() {
    let app = setup();
    for (method, uri) in [
        (Method::PATCH, "/api/notes"),
        (Method::POST, "/api/notes/some-id"),
        (Method::PUT, "/api/ai/status"),
    ] {
        let resp = send(&app, json_request(method, uri, None)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(
            body,
            json!({"success": false, "error": "接口不存在", "path": uri})
        );
    }
}

fn malformed_json_request() -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/notes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap()
}

#[tokio::test]
async fn malformed_json_includes_details_outside_production() {
    let app = setup();
    let resp = send(&app, malformed_json_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "请求体不是合法的JSON");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn malformed_json_hides_details_in_production() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        production: true,
        ..test_config(&dir)
    };
    let app = build_app(config, dir, "http://127.0.0.1:9");

    let resp = send(&app, malformed_json_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "请求体不是合法的JSON");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn global_rate_limit_returns_429() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        global_rate_limit: RateLimitConfig {
            max_requests: 2,
            window_secs: 60,
        },
        ..test_config(&dir)
    };
    let app = build_app(config, dir, "http://127.0.0.1:9");

    for remaining in ["1", "0"] {
        let resp = send(&app, json_request(Method::GET, "/api/notes", None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-ratelimit-remaining"], remaining);
    }
    let resp = send(&app, json_request(Method::GET, "/api/todos", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
    let body = body_json(resp).await;
    assert_eq!(body["error"], "请求过于频繁，请稍后再试");

    // 健康检查与未匹配路径共享同一额度
    let resp = send(&app, json_request(Method::GET, "/health", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let resp = send(&app, json_request(Method::GET, "/nope", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn global_rate_limit_counts_health_and_unmatched_paths() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        global_rate_limit: RateLimitConfig {
            max_requests: 2,
            window_secs: 60,
        },
        ..test_config(&dir)
    };
    let app = build_app(config, dir, "http://127.0.0.1:9");

    let resp = send(&app, json_request(Method::GET, "/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "1");
    let resp = send(&app, json_request(Method::GET, "/nope", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");

    let resp = send(&app, json_request(Method::GET, "/api/notes", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"], "请求过于频繁，请稍后再试");
}

#[tokio::test]
async fn ai_rate_limit_is_separate() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        ai_rate_limit: RateLimitConfig {
            max_requests: 1,
            window_secs: 60,
        },
        ..test_config(&dir)
    };
    let app = build_app(config, dir, "http://127.0.0.1:9");

    let resp = send(&app, json_request(Method::GET, "/api/ai/status", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = send(&app, json_request(Method::GET, "/api/ai/status", None)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"], "AI请求过于频繁，请稍后再试");

    let resp = send(&app, json_request(Method::GET, "/api/notes", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------- 笔记 ----------

#[tokio::test]
async fn note_crud_flow() {
    let app = setup();
    let note = create_note(&app, "", "只有内容").await;
    assert_eq!(note["title"], "无标题");
    let id = note["id"].as_str().unwrap().to_string();

    let resp = send(&app, json_request(Method::GET, &format!("/api/notes/{id}"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"]["content"], "只有内容");

    let resp = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/notes/{id}"),
            Some(json!({"title": "新标题"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = body_json(resp).await["data"].clone();
    assert_eq!(updated["title"], "新标题");
    assert_eq!(updated["content"], "只有内容");
    assert_eq!(updated["createdAt"], note["createdAt"]);

    let resp = send(&app, json_request(Method::DELETE, &format!("/api/notes/{id}"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "笔记已删除");

    let resp = send(&app, json_request(Method::GET, &format!("/api/notes/{id}"), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "笔记不存在");

    let resp = send(&app, json_request(Method::DELETE, &format!("/api/notes/{id}"), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn note_validation_errors() {
    let app = setup();
    let resp = send(
        &app,
        json_request(Method::POST, "/api/notes", Some(json!({"title": "", "content": ""}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "标题和内容不能同时为空");

    let note = create_note(&app, "标题", "").await;
    let resp = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/notes/{}", note["id"].as_str().unwrap()),
            Some(json!({"title": "长".repeat(201)})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "标题长度不能超过200个字符");

    let resp = send(
        &app,
        json_request(Method::PUT, "/api/notes/missing", Some(json!({"title": "x"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn search_ranks_title_matches_first() {
    let app = setup();
    create_note(&app, "other", "about rust").await;
    create_note(&app, "Rust notes", "content").await;
    create_note(&app, "unrelated", "nothing").await;

    let resp = send(&app, json_request(Method::GET, "/api/notes/search/rust", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["data"][0]["title"], "Rust notes");
    assert_eq!(body["data"][1]["title"], "other");

    let resp = send(&app, json_request(Method::GET, "/api/notes/search/%20", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "搜索关键词不能为空");
}

#[tokio::test]
async fn batch_delete_counts_existing_notes() {
    let app = setup();
    let a = create_note(&app, "a", "").await;
    let b = create_note(&app, "b", "").await;

    let resp = send(&app, json_request(Method::DELETE, "/api/notes", Some(json!({"ids": []})))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "请提供要删除的笔记ID列表");

    let resp = send(
        &app,
        json_request(
            Method::DELETE,
            "/api/notes",
            Some(json!({"ids": [a["id"], b["id"], "missing"]})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["deletedCount"], 2);
    assert_eq!(body["message"], "成功删除 2 个笔记");

    let resp = send(&app, json_request(Method::GET, "/api/notes", None)).await;
    assert_eq!(body_json(resp).await["data"], json!([]));
}

#[tokio::test]
async fn note_stats_and_recent() {
    let app = setup();
    create_note(&app, "one", "abc").await;
    create_note(&app, "two", "de").await;
    create_note(&app, "three", "f").await;

    let resp = send(&app, json_request(Method::GET, "/api/notes/stats/summary", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["stats"]["totalNotes"], 3);
    assert_eq!(body["stats"]["totalWords"], 6);
    assert_eq!(body["stats"]["notesToday"], 3);
    assert_eq!(body["database"]["totalNotes"], 3);

    let resp = send(&app, json_request(Method::GET, "/api/notes/recent?limit=2", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"].as_array().unwrap().len(), 2);
}

// ---------- 待办事项 ----------

#[tokio::test]
async fn todo_lifecycle() {
    let app = setup();
    let resp = send(
        &app,
        json_request(Method::POST, "/api/todos", Some(json!({"content": "buy milk"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "待办事项创建成功");
    assert_eq!(body["todo"]["content"], "buy milk");
    assert_eq!(body["todo"]["completed"], false);
    assert!(body["todo"]["createdAt"].is_string());
    let id = body["todo"]["id"].as_str().unwrap().to_string();

    let resp = send(
        &app,
        json_request(
            Method::PUT,
            &format!("/api/todos/{id}"),
            Some(json!({"completed": true})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["todo"]["completed"], true);
    assert_eq!(body["message"], "待办事项更新成功");

    let resp = send(&app, json_request(Method::GET, "/api/todos/stats/summary", None)).await;
    assert_eq!(
        body_json(resp).await["stats"],
        json!({"total": 1, "completed": 1, "pending": 0})
    );

    let resp = send(&app, json_request(Method::DELETE, "/api/todos/cleanup/completed", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["deletedCount"], 1);
    assert_eq!(body["message"], "已清理 1 条已完成的待办事项");

    let resp = send(&app, json_request(Method::GET, &format!("/api/todos/{id}"), None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"], "待办事项不存在");
}

#[tokio::test]
async fn todo_validation() {
    let app = setup();
    let resp = send(&app, json_request(Method::POST, "/api/todos", Some(json!({"content": "  "})))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "待办事项内容不能为空");

    let resp = send(
        &app,
        json_request(Method::PUT, "/api/todos/todo_missing", Some(json!({}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&app, json_request(Method::POST, "/api/todos", Some(json!({"content": "x"})))).await;
    let id = body_json(resp).await["todo"]["id"].as_str().unwrap().to_string();
    let resp = send(
        &app,
        json_request(Method::PUT, &format!("/api/todos/{id}"), Some(json!({}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "没有提供要更新的字段");
}

// ---------- AI ----------

#[tokio::test]
async fn ai_without_key_is_service_unavailable() {
    let app = setup();
    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/polish", Some(json!({"text": "hello"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Kimi API密钥"));

    let resp = send(&app, json_request(Method::GET, "/api/ai/status", None)).await;
    let body = body_json(resp).await;
    assert_eq!(
        body,
        json!({"success": true, "hasApiKey": false, "status": "not_configured"})
    );
}

#[tokio::test]
async fn ai_input_validation_precedes_credentials() {
    let app = setup();
    let resp = send(&app, json_request(Method::POST, "/api/ai/chat", Some(json!({"message": " "})))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "消息内容不能为空");

    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/set-key", Some(json!({"apiKey": "short"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "API密钥格式不正确，密钥长度过短");

    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/set-key", Some(json!({"apiKey": 42}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "API密钥不能为空");
}

#[tokio::test]
async fn polish_proxies_to_upstream() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", format!("Bearer {API_KEY}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("  润色后的文本  "))
        .create_async()
        .await;

    let app = setup_with_upstream(&server.url());
    set_key(&app).await;

    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/polish", Some(json!({"text": "原始文本"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["original"], "原始文本");
    assert_eq!(body["polished"], "润色后的文本");
    mock.assert_async().await;

    let resp = send(&app, json_request(Method::GET, "/api/ai/status", None)).await;
    let body = body_json(resp).await;
    assert_eq!(body["hasApiKey"], true);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn upstream_401_maps_to_unauthorized() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"invalid key"}}"#)
        .create_async()
        .await;

    let app = setup_with_upstream(&server.url());
    set_key(&app).await;

    let resp = send(
        &app,
        json_request(
            Method::POST,
            "/api/ai/translate",
            Some(json!({"text": "你好", "targetLanguage": "en"})),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"], "Kimi API密钥无效");
}

#[tokio::test]
async fn semantic_search_scores_stored_notes() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_body("0.8"))
        .create_async()
        .await;

    let app = setup_with_upstream(&server.url());
    set_key(&app).await;
    create_note(&app, "会议记录", "讨论季度计划").await;
    create_note(&app, "购物清单", "牛奶 面包").await;

    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/semantic-search", Some(json!({"query": "计划"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let results = body_json(resp).await["results"].clone();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["relevanceScore"], 0.8);
    assert!(results[0]["id"].is_string());

    let resp = send(
        &app,
        json_request(
            Method::POST,
            "/api/ai/semantic-search",
            Some(json!({"query": "计划", "notes": [{"title": "外部", "content": "传入的笔记", "id": 7}]})),
        ),
    )
    .await;
    let results = body_json(resp).await["results"].clone();
    assert_eq!(results.as_array().unwrap().len(), 1);
    assert_eq!(results[0]["id"], 7);
}

#[tokio::test]
async fn remove_key_disables_ai() {
    let app = setup();
    set_key(&app).await;
    let resp = send(&app, json_request(Method::DELETE, "/api/ai/remove-key", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["message"], "API密钥删除成功");

    let resp = send(
        &app,
        json_request(Method::POST, "/api/ai/summarize", Some(json!({"text": "内容"}))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
