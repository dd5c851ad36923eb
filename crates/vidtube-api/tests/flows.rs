use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use vidtube_api::staging::Staging;
use vidtube_api::tokens::TokenConfig;
use vidtube_api::{AppState, AppStateInner, router};
use vidtube_db::Database;
use vidtube_media::{MediaStore, UploadedAsset};

// ─── Test helpers ───────────────────────────────────────────────────────

const BOUNDARY: &str = "vidtube-test-boundary";
const MAX_FILE_BYTES: usize = 1024;

/// In-memory asset store that records calls and can be told to fail.
#[derive(Default)]
struct FakeMedia {
    /// Uploads of staged files whose name ends with one of these fail.
    fail_uploads_ending_with: Vec<&'static str>,
    fail_deletes: bool,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeMedia {
    fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn upload(&self, path: &Path) -> Result<UploadedAsset> {
        if !tokio::fs::try_exists(path).await? {
            bail!("File not found at path: {}", path.display());
        }
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if self.fail_uploads_ending_with.iter().any(|s| name.ends_with(s)) {
            bail!("remote rejected {name}");
        }
        let bytes = tokio::fs::metadata(path).await?.len();
        let mut uploads = self.uploads.lock().unwrap();
        let public_id = format!("asset-{}", uploads.len() + 1);
        uploads.push(public_id.clone());
        Ok(UploadedAsset {
            url: format!("https://res.example/{public_id}"),
            public_id,
            bytes,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        self.deletes.lock().unwrap().push(public_id.to_string());
        if self.fail_deletes {
            bail!("remote refused to delete {public_id}");
        }
        Ok(())
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    media: Arc<FakeMedia>,
    staging_dir: TempDir,
}

impl TestApp {
    async fn new(media: FakeMedia) -> Self {
        let staging_dir = tempfile::tempdir().unwrap();
        let staging = Staging::new(staging_dir.path().to_path_buf(), MAX_FILE_BYTES)
            .await
            .unwrap();
        let media = Arc::new(media);
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            media: media.clone(),
            staging,
            tokens: TokenConfig {
                access_secret: "test-access-secret".into(),
                access_ttl: Duration::minutes(15),
                refresh_secret: "test-refresh-secret".into(),
                refresh_ttl: Duration::days(10),
            },
            secure_cookies: false,
        });
        Self {
            router: router(state.clone()),
            state,
            media,
            staging_dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<String>, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, cookies, json)
    }

    fn staged_file_count(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path()).unwrap().count()
    }

    fn stored_refresh_token(&self, email: &str) -> Option<String> {
        self.state
            .db
            .find_user_by_email_or_username(email, None)
            .unwrap()
            .unwrap()
            .refresh_token
    }

    fn user_exists(&self, email: &str) -> bool {
        self.state
            .db
            .find_user_by_email_or_username(email, None)
            .unwrap()
            .is_some()
    }

    fn fail_user_inserts(&self) {
        self.state
            .db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_users BEFORE INSERT ON users
                     BEGIN SELECT RAISE(ABORT, 'disk on fire'); END;",
                )?;
                Ok(())
            })
            .unwrap();
    }

    /// Another writer grabs the username between the duplicate check and the
    /// insert.
    fn take_username_during_insert(&self, username: &str) {
        let sql = format!(
            "CREATE TRIGGER steal_username BEFORE INSERT ON users
             WHEN NEW.username = '{username}'
             BEGIN
                 INSERT INTO users (id, username, email, fullname, avatar, password)
                 VALUES ('racer', NEW.username, 'racer@x.com', 'R', 'r', 'h');
             END;"
        );
        self.state
            .db
            .with_conn(|conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .unwrap();
    }

    /// Rows are written with a timestamp the reload cannot parse.
    fn corrupt_inserted_users(&self) {
        self.state
            .db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER corrupt_users AFTER INSERT ON users
                     BEGIN UPDATE users SET created_at = 'yesterday' WHERE id = NEW.id; END;",
                )?;
                Ok(())
            })
            .unwrap();
    }

    async fn register_default(&self) -> Value {
        let (status, _, body) = self
            .send(register_request(&default_fields(), &[("avatar", "a.png", &b"avatar"[..])]))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    async fn login(&self, email: &str, password: &str) -> (StatusCode, Vec<String>, Value) {
        self.send(json_request(
            "/api/v1/users/login",
            json!({ "email": email, "password": password }),
        ))
        .await
    }
}

fn default_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("fullname", "A B"),
        ("email", "a@x.com"),
        ("username", "ab"),
        ("password", "p1"),
    ]
}

fn register_request(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, filename, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/v1/users/register")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn refresh_with_body(token: &str) -> Request<Body> {
    json_request("/api/v1/users/refresh-token", json!({ "refreshToken": token }))
}

fn logout_request(access_token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/users/logout")
        .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
        .body(Body::empty())
        .unwrap()
}

fn token(body: &Value, key: &str) -> String {
    body["data"][key].as_str().unwrap().to_string()
}

// ─── Registration ───────────────────────────────────────────────────────

#[tokio::test]
async fn register_with_avatar_only_returns_sanitized_user() {
    let app = TestApp::new(FakeMedia::default()).await;

    let mut fields = default_fields();
    fields[2] = ("username", "AB");
    let (status, _, body) = app
        .send(register_request(&fields, &[("avatar", "a.png", &b"avatar"[..])]))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["success"], true);
    let user = body["data"].as_object().unwrap();
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("refreshToken"));
    assert_eq!(user["username"], "ab");
    assert_eq!(user["avatar"], "https://res.example/asset-1");
    assert_eq!(user["coverImage"], "");

    assert_eq!(app.media.uploads(), vec!["asset-1"]);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn register_with_cover_stores_both_urls() {
    let app = TestApp::new(FakeMedia::default()).await;

    let (status, _, body) = app
        .send(register_request(
            &default_fields(),
            &[("avatar", "a.png", &b"avatar"[..]), ("coverImage", "c.png", &b"cover"[..])],
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["coverImage"], "https://res.example/asset-2");
    assert_eq!(app.media.uploads().len(), 2);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn blank_field_is_rejected_before_any_upload() {
    let app = TestApp::new(FakeMedia::default()).await;

    for blank in ["fullname", "email", "username", "password"] {
        let fields: Vec<_> = default_fields()
            .into_iter()
            .map(|(k, v)| if k == blank { (k, "   ") } else { (k, v) })
            .collect();
        let (status, _, body) = app
            .send(register_request(&fields, &[("avatar", "a.png", &b"avatar"[..])]))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{blank}");
        assert_eq!(body["success"], false);
    }

    let missing: Vec<_> = default_fields().into_iter().filter(|(k, _)| *k != "email").collect();
    let (status, _, _) = app
        .send(register_request(&missing, &[("avatar", "a.png", &b"avatar"[..])]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.media.uploads().is_empty());
    assert!(!app.user_exists("a@x.com"));
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn duplicate_identity_conflicts_before_upload() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let mut same_email = default_fields();
    same_email[2] = ("username", "someone-else");
    let (status, _, body) = app
        .send(register_request(&same_email, &[("avatar", "a.png", &b"avatar"[..])]))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "User with email or username already exists");

    let mut same_username = default_fields();
    same_username[1] = ("email", "other@x.com");
    same_username[2] = ("username", "AB");
    let (status, _, _) = app
        .send(register_request(&same_username, &[("avatar", "a.png", &b"avatar"[..])]))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    assert_eq!(app.media.uploads().len(), 1);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn missing_avatar_is_rejected_before_upload() {
    let app = TestApp::new(FakeMedia::default()).await;

    let (status, _, body) = app
        .send(register_request(&default_fields(), &[("coverImage", "c.png", &b"cover"[..])]))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Avatar file is required");
    assert!(app.media.uploads().is_empty());
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn avatar_upload_failure_creates_nothing_and_cleans_nothing() {
    let app = TestApp::new(FakeMedia {
        fail_uploads_ending_with: vec!["-a.png"],
        ..Default::default()
    })
    .await;

    let (status, _, body) = app
        .send(register_request(
            &default_fields(),
            &[("avatar", "a.png", &b"avatar"[..]), ("coverImage", "c.png", &b"cover"[..])],
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to upload one or more files");
    assert!(!app.user_exists("a@x.com"));
    assert!(app.media.deletes().is_empty());
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn cover_upload_failure_is_not_fatal() {
    let app = TestApp::new(FakeMedia {
        fail_uploads_ending_with: vec!["-c.png"],
        ..Default::default()
    })
    .await;

    let (status, _, body) = app
        .send(register_request(
            &default_fields(),
            &[("avatar", "a.png", &b"avatar"[..]), ("coverImage", "c.png", &b"cover"[..])],
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["avatar"], "https://res.example/asset-1");
    assert_eq!(body["data"]["coverImage"], "");
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn creation_failure_deletes_each_uploaded_asset_once() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.fail_user_inserts();

    let (status, _, body) = app
        .send(register_request(
            &default_fields(),
            &[("avatar", "a.png", &b"avatar"[..]), ("coverImage", "c.png", &b"cover"[..])],
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to register user");
    let mut deletes = app.media.deletes();
    deletes.sort();
    assert_eq!(deletes, vec!["asset-1", "asset-2"]);
}

#[tokio::test]
async fn cleanup_failure_does_not_mask_original_error() {
    let app = TestApp::new(FakeMedia {
        fail_deletes: true,
        ..Default::default()
    })
    .await;
    app.fail_user_inserts();

    let (status, _, body) = app
        .send(register_request(&default_fields(), &[("avatar", "a.png", &b"avatar"[..])]))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to register user");
    assert_eq!(app.media.deletes(), vec!["asset-1"]);
}

#[tokio::test]
async fn duplicate_key_at_insert_conflicts_and_cleans_up() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.take_username_during_insert("ab");

    let (status, _, body) = app
        .send(register_request(
            &default_fields(),
            &[("avatar", "a.png", &b"avatar"[..]), ("coverImage", "c.png", &b"cover"[..])],
        ))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Username or email already exists");
    let mut deletes = app.media.deletes();
    deletes.sort();
    assert_eq!(deletes, vec!["asset-1", "asset-2"]);
    assert!(!app.user_exists("a@x.com"));
}

#[tokio::test]
async fn reload_failure_removes_the_record_and_its_assets() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.corrupt_inserted_users();

    let (status, _, body) = app
        .send(register_request(&default_fields(), &[("avatar", "a.png", &b"avatar"[..])]))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to create user after file upload");
    assert_eq!(app.media.deletes(), vec!["asset-1"]);
    assert!(!app.user_exists("a@x.com"));
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn oversized_file_is_rejected_and_not_left_on_disk() {
    let app = TestApp::new(FakeMedia::default()).await;
    let big = vec![7u8; MAX_FILE_BYTES + 1];

    let (status, _, _) = app
        .send(register_request(&default_fields(), &[("avatar", "big.png", &big[..])]))
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.media.uploads().is_empty());
    assert_eq!(app.staged_file_count(), 0);
}

// ─── Login ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn login_issues_tokens_and_cookies() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let (status, cookies, body) = app.login("a@x.com", "p1").await;

    assert_eq!(status, StatusCode::OK);
    let access = token(&body, "accessToken");
    let refresh = token(&body, "refreshToken");
    assert!(!access.is_empty());
    assert!(!refresh.is_empty());
    assert_ne!(access, refresh);

    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
    assert!(cookies.iter().all(|c| !c.contains("Secure")));

    let user = body["data"]["user"].as_object().unwrap();
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("refreshToken"));

    assert_eq!(app.stored_refresh_token("a@x.com"), Some(refresh));
}

#[tokio::test]
async fn login_by_username_with_any_email() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let (status, _, _) = app
        .send(json_request(
            "/api/v1/users/login",
            json!({ "email": "nobody@x.com", "username": "AB", "password": "p1" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn failed_logins_never_touch_the_stored_token() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let (status, _, _) = app.login("a@x.com", "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app.login("nobody@x.com", "p1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User not found");

    let (status, _, _) = app
        .send(json_request("/api/v1/users/login", json!({ "password": "p1" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(json_request("/api/v1/users/login", json!({ "email": "a@x.com" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.stored_refresh_token("a@x.com"), None);

    let (_, _, body) = app.login("a@x.com", "p1").await;
    let issued = token(&body, "refreshToken");
    app.login("a@x.com", "wrong").await;
    assert_eq!(app.stored_refresh_token("a@x.com"), Some(issued));
}

#[tokio::test]
async fn second_login_supersedes_first_session() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let (_, _, first) = app.login("a@x.com", "p1").await;
    let (_, _, second) = app.login("a@x.com", "p1").await;

    let (status, _, _) = app.send(refresh_with_body(&token(&first, "refreshToken"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app.send(refresh_with_body(&token(&second, "refreshToken"))).await;
    assert_eq!(status, StatusCode::OK);
}

// ─── Refresh ────────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_rotates_and_rejects_the_previous_token() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;
    let (_, _, login) = app.login("a@x.com", "p1").await;
    let old = token(&login, "refreshToken");

    let (status, cookies, body) = app.send(refresh_with_body(&old)).await;
    assert_eq!(status, StatusCode::OK);
    let new = token(&body, "refreshToken");
    assert!(!token(&body, "accessToken").is_empty());
    assert_ne!(new, old);
    assert_eq!(cookies.len(), 2);
    assert_eq!(app.stored_refresh_token("a@x.com"), Some(new.clone()));

    let (status, _, body) = app.send(refresh_with_body(&old)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _, _) = app.send(refresh_with_body(&new)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_accepts_cookie() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;
    let (_, _, login) = app.login("a@x.com", "p1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh-token")
        .header(
            header::COOKIE,
            format!("refreshToken={}", token(&login, "refreshToken")),
        )
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_cookie_wins_over_an_unrelated_body() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;
    let (_, _, login) = app.login("a@x.com", "p1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh-token")
        .header(
            header::COOKIE,
            format!("refreshToken={}", token(&login, "refreshToken")),
        )
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("foo=bar"))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn refresh_accepts_urlencoded_body() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;
    let (_, _, login) = app.login("a@x.com", "p1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh-token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!(
            "refreshToken={}",
            token(&login, "refreshToken")
        )))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_with_unparseable_body_is_unauthorized() {
    let app = TestApp::new(FakeMedia::default()).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Refresh token is required");
}

#[tokio::test]
async fn login_ignores_unknown_keys() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let (status, _, _) = app
        .send(json_request(
            "/api/v1/users/login",
            json!({ "email": "a@x.com", "password": "p1", "rememberMe": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_without_or_with_bad_token_is_unauthorized() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;

    let empty = Request::builder()
        .method("POST")
        .uri("/api/v1/users/refresh-token")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.send(empty).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Refresh token is required");

    let (status, _, _) = app.send(refresh_with_body("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // An access token is signed with the other secret.
    let (_, _, login) = app.login("a@x.com", "p1").await;
    let (status, _, _) = app.send(refresh_with_body(&token(&login, "accessToken"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ─── Logout ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn logout_clears_session_and_is_idempotent() {
    let app = TestApp::new(FakeMedia::default()).await;
    app.register_default().await;
    let (_, _, login) = app.login("a@x.com", "p1").await;
    let access = token(&login, "accessToken");
    let refresh = token(&login, "refreshToken");

    let (status, cookies, body) = app.send(logout_request(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({}));
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0") || c.contains("Expires=")));
    assert_eq!(app.stored_refresh_token("a@x.com"), None);

    let (status, _, _) = app.send(logout_request(&access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.stored_refresh_token("a@x.com"), None);

    let (status, _, _) = app.send(refresh_with_body(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_requires_authentication() {
    let app = TestApp::new(FakeMedia::default()).await;

    let anonymous = Request::builder()
        .method("POST")
        .uri("/api/v1/users/logout")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.send(anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app.send(logout_request("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new(FakeMedia::default()).await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
