use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    routing::post,
};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use yamdb_api::{
    AppState, HttpMailer, create_router,
    config::AppConfig,
    mailer::{MailError, Mailer, OutgoingMail},
    repository::{InMemoryRepository, Repository},
};

const API_KEY: &str = "relay-test-key";

/// What the stub relay saw: authorization header and JSON body per request.
type Received = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn accept(
    State(received): State<Received>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    received.lock().unwrap().push((auth, body));
    StatusCode::OK
}

async fn reject() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "relay down")
}

/// Serves a stub mail relay on an ephemeral port: `/ok` accepts, `/fail` answers 500.
async fn spawn_relay() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
        .route("/ok", post(accept))
        .route("/fail", post(reject))
        .with_state(received.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{}", port), received)
}

fn mailer(endpoint: &str) -> HttpMailer {
    HttpMailer::new(endpoint, API_KEY, Duration::from_secs(5)).unwrap()
}

fn sample_mail() -> OutgoingMail {
    OutgoingMail {
        subject: "alice, your Confirmation code".to_string(),
        body: "abc-123".to_string(),
        from: "admin@yamdb.local".to_string(),
        to: vec!["a@x.io".to_string()],
    }
}

#[tokio::test]
async fn test_relay_success_posts_mail_with_bearer_key() {
    let (address, received) = spawn_relay().await;

    let result = mailer(&format!("{address}/ok")).send(sample_mail()).await;
    assert_eq!(result, Ok(()));

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (auth, body) = &received[0];
    assert_eq!(auth.as_deref(), Some("Bearer relay-test-key"));
    assert_eq!(
        *body,
        json!({
            "subject": "alice, your Confirmation code",
            "body": "abc-123",
            "from": "admin@yamdb.local",
            "to": ["a@x.io"],
        })
    );
}

#[tokio::test]
async fn test_relay_error_status_is_rejected() {
    let (address, _) = spawn_relay().await;

    let result = mailer(&format!("{address}/fail")).send(sample_mail()).await;
    assert_eq!(
        result,
        Err(MailError::Rejected {
            status: 500,
            body: "relay down".to_string(),
        })
    );
}

#[tokio::test]
async fn test_unreachable_relay_is_transport_error() {
    // Bind then drop, so nothing is listening on the port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = mailer(&format!("http://127.0.0.1:{port}/send"))
        .send(sample_mail())
        .await;
    assert!(
        matches!(result, Err(MailError::Transport(_))),
        "expected transport error, got {result:?}"
    );
}

#[tokio::test]
async fn test_signup_through_failing_relay_is_bad_gateway() {
    let (address, _) = spawn_relay().await;
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone(),
        mailer: Arc::new(mailer(&format!("{address}/fail"))),
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let request = Request::post("/api/v1/auth/signup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"username": "alice", "email": "a@x.io"}).to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["detail"].as_str().unwrap().contains("500"));

    // The account survives the failed delivery; a retry reuses it.
    let user = repo.get_user_by_username("alice").await.unwrap();
    assert!(user.is_some());
}
