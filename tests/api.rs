//! HTTP-level tests driving the router without binding a socket.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use cardkey_portal::{AppState, config::Config, router, storage::JsonFileStorage};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const IMPORT_TEXT: &str = "租户URL：http://tenant-a\n访问令牌(Token)：secret-a\n邮箱：alice@example.com\n实际到期日：2025-01-01\n查询参数：q=1\n----------------\n租户URL：http://tenant-b\n访问令牌(Token)：secret-b\n邮箱：bob@example.com\n实际到期日：2025-02-01\n查询参数：q=2\n----------------\n租户URL：http://broken\n邮箱：nobody@example.com\n----------------";

struct TestApp {
    app: Router,
    _temp: TempDir,
}

async fn setup_with(extra: &[(&str, &str)]) -> TestApp {
    let temp = TempDir::new().unwrap();
    let data_path = temp.path().join("cardkeys.json");

    let mut vars = vec![
        ("JWT_SECRET".to_string(), "test-signing-key".to_string()),
        ("DATA_PATH".to_string(), data_path.display().to_string()),
        ("BASE_URL".to_string(), "http://cards.test".to_string()),
    ];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let config = Config::from_vars(vars).unwrap();

    let storage = Arc::new(JsonFileStorage::open(&data_path).await.unwrap());
    let mut state = AppState::new(storage, config);
    state.auth = state.auth.clone().with_bcrypt_cost(4);

    TestApp {
        app: router(state),
        _temp: temp,
    }
}

async fn setup() -> TestApp {
    setup_with(&[]).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Log in with the bootstrap credentials and return the `name=value` cookie pair.
async fn login(app: &Router) -> String {
    let (status, headers, _) = send(
        app,
        json_request(
            "POST",
            "/api/admin/login",
            None,
            json!({ "username": "admin", "password": "admin123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let set_cookie = headers
        .get(header::SET_COOKIE)
        .expect("login sets a cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie.split(';').next().unwrap().to_string()
}

async fn import(app: &Router, cookie: &str) -> Vec<String> {
    let (status, _, body) = send(
        app,
        json_request(
            "POST",
            "/api/admin/cardkeys",
            Some(cookie),
            json!({ "text": IMPORT_TEXT }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["count"], 2);
    body["links"]
        .as_array()
        .unwrap()
        .iter()
        .map(|link| {
            let link = link.as_str().unwrap();
            assert!(link.starts_with("http://cards.test/key/"));
            link.rsplit('/').next().unwrap().to_string()
        })
        .collect()
}

async fn first_card_id(app: &Router, cookie: &str) -> (String, String) {
    let (_, _, body) = send(app, get("/api/admin/cardkeys", Some(cookie))).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    let card = &body["cardKeys"][0];
    (
        card["id"].as_str().unwrap().to_string(),
        card["secure_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_health_reports_backend() {
    let test = setup().await;
    let (status, _, body) = send(&test.app, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "json");
}

#[tokio::test]
async fn test_admin_routes_require_session() {
    let test = setup().await;

    let (status, _, body) = send(&test.app, get("/api/admin/cardkeys", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _, _) = send(
        &test.app,
        get("/api/admin/cardkeys", Some("admin-token=forged.jwt.value")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let test = setup().await;

    let (status, _, _) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/login",
            None,
            json!({ "username": "admin", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &test.app,
        json_request("POST", "/api/admin/login", None, json!({ "username": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_init_admin_only_once() {
    let test = setup().await;

    let (status, _, _) = send(
        &test.app,
        json_request("POST", "/api/admin/init", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, _) = send(
        &test.app,
        json_request("POST", "/api/admin/init", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_check_then_confirm_redemption() {
    let test = setup().await;
    let cookie = login(&test.app).await;
    let tokens = import(&test.app, &cookie).await;
    let token = &tokens[0];

    let (status, _, body) = send(&test.app, get(&format!("/api/key/{token}?check=true"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], true);
    assert!(body["cardKey"].get("access_token").is_none());
    assert_eq!(body["cardKey"]["is_used"], false);

    let (status, _, body) =
        send(&test.app, get(&format!("/api/key/{token}?confirm=true"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], false);
    assert_eq!(body["cardKey"]["access_token"], "secret-a");
    assert_eq!(body["cardKey"]["is_used"], true);
    assert!(body["formatted"].as_str().unwrap().contains("secret-a"));

    let (_, _, body) = send(&test.app, get(&format!("/api/key/{token}?check=true"), None)).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], false);
    assert_eq!(body["cardKey"]["access_token"], "secret-a");

    let (_, _, body) = send(&test.app, get("/api/admin/cardkeys?status=used", Some(&cookie))).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["cardKeys"].as_array().unwrap().len(), 1);
    assert_eq!(body["stats"], json!({ "total": 2, "used": 1, "unused": 1 }));
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let test = setup().await;

    let (status, _, body) = send(&test.app, get("/api/key/deadbeef?check=true", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_direct_fetch_follows_policy() {
    let open = setup().await;
    let cookie = login(&open.app).await;
    let token = import(&open.app, &cookie).await.remove(0);
    let (_, _, body) = send(&open.app, get(&format!("/api/key/{token}"), None)).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], false);
    assert_eq!(body["cardKey"]["is_used"], true);

    let gated = setup_with(&[("DIRECT_FETCH_POLICY", "gated")]).await;
    let cookie = login(&gated.app).await;
    let token = import(&gated.app, &cookie).await.remove(0);
    let (_, _, body) = send(&gated.app, get(&format!("/api/key/{token}"), None)).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], true);
    assert_eq!(body["cardKey"]["is_used"], false);
}

#[tokio::test]
async fn test_batch_without_valid_blocks_is_rejected() {
    let test = setup().await;
    let cookie = login(&test.app).await;

    let (status, _, _) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/cardkeys",
            Some(&cookie),
            json!({ "text": "租户URL：http://only\n----------------" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = send(&test.app, get("/api/admin/cardkeys", Some(&cookie))).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["stats"]["total"], 0);
}

#[tokio::test]
async fn test_single_add() {
    let test = setup().await;
    let cookie = login(&test.app).await;

    let record = json!({
        "tenant_url": "http://tenant",
        "access_token": "tok",
        "email": "single@example.com",
        "expiry_date": "2025-01-01",
        "query_params": "q=1",
    });
    let (status, _, body) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/cardkeys",
            Some(&cookie),
            json!({ "text": record.to_string(), "single": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let body: Value = serde_json::from_slice(&body).unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["link"], format!("http://cards.test/key/{token}"));
}

#[tokio::test]
async fn test_mark_restore_and_delete() {
    let test = setup().await;
    let cookie = login(&test.app).await;
    import(&test.app, &cookie).await;
    let (id, token) = first_card_id(&test.app, &cookie).await;
    let uri = format!("/api/admin/cardkeys/{id}");

    let (status, _, _) = send(
        &test.app,
        json_request("PATCH", &uri, Some(&cookie), json!({ "action": "restore" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &test.app,
        json_request("PATCH", &uri, Some(&cookie), json!({ "action": "mark_used" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &test.app,
        json_request("PATCH", &uri, Some(&cookie), json!({ "action": "mark_used" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &test.app,
        json_request("PATCH", &uri, Some(&cookie), json!({ "action": "restore" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&test.app, delete).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&test.app, get(&format!("/api/key/{token}?check=true"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &test.app,
        json_request("PATCH", &uri, Some(&cookie), json!({ "action": "restore" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_exports_and_backup() {
    let test = setup().await;
    let cookie = login(&test.app).await;

    let (status, _, _) = send(&test.app, get("/api/admin/cardkeys/export/links", Some(&cookie))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let tokens = import(&test.app, &cookie).await;

    let (status, headers, body) =
        send(&test.app, get("/api/admin/cardkeys/export/links", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"unused-cardkey-links-")
    );
    let text = String::from_utf8(body).unwrap();
    assert_eq!(text.lines().count(), 2);
    for token in &tokens {
        assert!(text.contains(token.as_str()));
    }

    let (status, _, body) =
        send(&test.app, get("/api/admin/cardkeys/export/details", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("secret-b"));

    let (status, headers, body) = send(&test.app, get("/api/admin/backup", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("cardkeys-backup-")
    );
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["version"], "1.0");
    assert_eq!(body["stats"]["total"], 2);
    assert_eq!(body["cardKeys"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_change_password_and_logout() {
    let test = setup().await;
    let cookie = login(&test.app).await;

    let (status, _, _) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/change-password",
            Some(&cookie),
            json!({ "currentPassword": "admin123", "newPassword": "short" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/change-password",
            Some(&cookie),
            json!({ "currentPassword": "admin123", "newPassword": "much-longer-secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(
        &test.app,
        json_request(
            "POST",
            "/api/admin/login",
            None,
            json!({ "username": "admin", "password": "much-longer-secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, _) = send(
        &test.app,
        json_request("POST", "/api/admin/logout", Some(&cookie), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cleared = headers[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.starts_with("admin-token=;"));
    assert!(cleared.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_status_reports_policy() {
    let test = setup_with(&[("DIRECT_FETCH_POLICY", "gated")]).await;
    let cookie = login(&test.app).await;

    let (status, _, body) = send(&test.app, get("/api/admin/status", Some(&cookie))).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["storageBackend"], "json");
    assert_eq!(body["directFetchPolicy"], "gated");
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let test = setup().await;
    let cookie = login(&test.app).await;
    import(&test.app, &cookie).await;
    let (id, token) = first_card_id(&test.app, &cookie).await;

    let requests = vec![
        json_request(
            "PATCH",
            &format!("/api/admin/cardkeys/{id}"),
            Some(&cookie),
            json!({ "action": "bogus" }),
        ),
        json_request(
            "PATCH",
            "/api/admin/cardkeys/not-a-uuid",
            Some(&cookie),
            json!({ "action": "restore" }),
        ),
        json_request(
            "POST",
            "/api/admin/cardkeys",
            Some(&cookie),
            json!({ "text": 5 }),
        ),
        get(&format!("/api/key/{token}?check=1"), None),
        get("/api/admin/cardkeys?status=sometimes", Some(&cookie)),
    ];

    for request in requests {
        let uri = request.uri().to_string();
        let (status, headers, body) = send(&test.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("application/json"),
            "{uri}"
        );
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "invalid_request", "{uri}");
    }

    // Nothing was consumed by the rejected check.
    let (_, _, body) = send(&test.app, get(&format!("/api/key/{token}?check=true"), None)).await;
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["requiresConfirmation"], true);
}
