use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use parley_api::router;
use parley_api::state::AppStateInner;
use parley_db::{DocumentStore, JsonFileStore, Storage};
use parley_types::api::{ErrorResponse, MessagesResponse};
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tower::ServiceExt;

fn app_with(storage: Arc<dyn Storage>) -> Router {
    router(AppStateInner::new(storage).unwrap())
}

fn json_app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(JsonFileStore::open(dir.path().to_path_buf()).unwrap());
    (dir, app_with(storage))
}

fn document_app() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(DocumentStore::open(&dir.path().join("parley.db")).unwrap());
    (dir, app_with(storage))
}

async fn call(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

async fn body_json<T: DeserializeOwned>(resp: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(resp: &Response<Body>) -> &str {
    resp.headers()[header::LOCATION].to_str().unwrap()
}

/// `name=value` pair from the session Set-Cookie header.
fn session_cookie(resp: &Response<Body>) -> String {
    let set_cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn sign_up_and_log_in(app: &Router, email: &str, username: &str, password: &str) -> String {
    let resp = call(
        app,
        post_form(
            "/signup",
            &format!("email={email}&username={username}&password={password}"),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    let resp = call(
        app,
        post_form(
            "/login",
            &format!("username_or_email={username}&password={password}"),
            None,
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    session_cookie(&resp)
}

async fn chat_flow(app: Router) {
    let cookie = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(&app, post_form("/send", "message=hi", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let sent: MessagesResponse = body_json(resp).await;
    assert_eq!(sent.messages.len(), 1);

    let resp = call(&app, get("/get_messages", None)).await;
    let listed: MessagesResponse = body_json(resp).await;
    assert_eq!(listed.messages.len(), 1);
    let message = &listed.messages[0];
    assert_eq!(message.sender, "alice");
    assert_eq!(message.content, "hi");
    assert!(!message.deleted);

    let resp = call(&app, post_form("/delete/1", "", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let after: MessagesResponse = body_json(resp).await;
    assert!(after.messages[0].deleted);

    let resp = call(&app, get("/", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("This message was deleted."));
}

#[tokio::test]
async fn chat_flow_on_json_files() {
    let (_dir, app) = json_app();
    chat_flow(app).await;
}

#[tokio::test]
async fn chat_flow_on_document_store() {
    let (_dir, app) = document_app();
    chat_flow(app).await;
}

#[tokio::test]
async fn get_messages_is_public() {
    let (_dir, app) = json_app();
    let resp = call(&app, get("/get_messages", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: MessagesResponse = body_json(resp).await;
    assert!(body.messages.is_empty());
}

#[tokio::test]
async fn posting_requires_a_session() {
    let (_dir, app) = json_app();

    let resp = call(&app, post_form("/send", "message=hi", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = body_json(resp).await;
    assert!(!err.error.is_empty());

    let resp = call(&app, post_form("/delete/1", "", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let stale = "parley_session=00000000-0000-0000-0000-000000000000";
    let resp = call(&app, post_form("/send", "message=hi", Some(stale))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_requests_are_refused_before_parsing() {
    let (_dir, app) = json_app();

    let bare = Request::builder()
        .method("POST")
        .uri("/send")
        .body(Body::empty())
        .unwrap();
    let resp = call(&app, bare).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = body_json(resp).await;
    assert_eq!(err.error, "You must be logged in.");

    let resp = call(&app, post_form("/delete/abc", "", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = body_json(resp).await;
    assert_eq!(err.error, "You must be logged in.");
}

#[tokio::test]
async fn malformed_input_from_logged_in_users() {
    let (_dir, app) = json_app();
    let cookie = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(&app, post_form("/delete/abc", "", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let _: ErrorResponse = body_json(resp).await;

    let bare = Request::builder()
        .method("POST")
        .uri("/send")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let resp = call(&app, bare).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_rotates_the_session_cookie() {
    let (_dir, app) = json_app();
    let first = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(
        &app,
        post_form("/login", "username_or_email=alice&password=pw1", Some(&first)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let second = session_cookie(&resp);
    assert_ne!(first, second);

    let resp = call(&app, post_form("/send", "message=hi", Some(&first))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = call(&app, post_form("/send", "message=hi", Some(&second))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn session_cookie_is_scoped_and_expires() {
    let (_dir, app) = json_app();
    sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(
        &app,
        post_form("/login", "username_or_email=alice&password=pw1", None),
    )
    .await;
    let set_cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("parley_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age="));
}

#[tokio::test]
async fn index_redirects_anonymous_users_to_login() {
    let (_dir, app) = json_app();
    let resp = call(&app, get("/", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let (_dir, app) = json_app();
    let cookie = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(&app, post_form("/send", "message=", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = call(&app, get("/get_messages", None)).await;
    let body: MessagesResponse = body_json(resp).await;
    assert!(body.messages.is_empty());
}

#[tokio::test]
async fn signup_validation_and_conflicts() {
    let (_dir, app) = json_app();

    let resp = call(&app, post_form("/signup", "email=&username=bob&password=pw", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = call(&app, post_form("/signup", "username=bob", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    sign_up_and_log_in(&app, "b%40x.com", "bob", "pw").await;
    let resp = call(&app, post_form("/signup", "email=c%40x.com&username=bob&password=pw", None)).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_by_email_and_bad_password() {
    let (_dir, app) = json_app();
    sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(&app, post_form("/login", "username_or_email=a%40x.com&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(resp.headers().contains_key(header::SET_COOKIE));

    let resp = call(&app, post_form("/login", "username_or_email=alice&password=nope", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let err: ErrorResponse = body_json(resp).await;
    assert_eq!(err.error, "Invalid username/email or password.");

    let resp = call(&app, post_form("/login", "username_or_email=&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cannot_delete_someone_elses_message() {
    let (_dir, app) = json_app();
    let alice = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;
    let bob = sign_up_and_log_in(&app, "b%40x.com", "bob", "pw2").await;

    call(&app, post_form("/send", "message=mine", Some(&alice))).await;

    let resp = call(&app, post_form("/delete/1", "", Some(&bob))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&app, post_form("/delete/99", "", Some(&alice))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = call(&app, get("/get_messages", None)).await;
    let body: MessagesResponse = body_json(resp).await;
    assert!(!body.messages[0].deleted);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (_dir, app) = json_app();
    let cookie = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;

    let resp = call(&app, get("/login", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = call(&app, get("/logout", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = call(&app, post_form("/send", "message=hi", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = call(&app, get("/login", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_routes_redirect_by_session() {
    let (_dir, app) = json_app();

    let resp = call(&app, get("/nope", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/signup");

    let cookie = sign_up_and_log_in(&app, "a%40x.com", "alice", "pw1").await;
    let resp = call(&app, get("/nope", Some(&cookie))).await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn forms_are_served() {
    let (_dir, app) = json_app();

    let resp = call(&app, get("/signup", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Sign up"));

    let resp = call(&app, get("/login", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("username_or_email"));
}
