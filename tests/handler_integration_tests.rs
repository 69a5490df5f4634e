use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use yamdb_api::{
    AppState, create_router,
    auth::issue_token,
    config::AppConfig,
    mailer::MockMailer,
    models::{NewUser, User},
    repository::{InMemoryRepository, Repository},
    roles::Role,
};

// --- Test Harness ---

struct TestApp {
    router: Router,
    repo: Arc<InMemoryRepository>,
    mailer: MockMailer,
    config: AppConfig,
}

impl TestApp {
    fn new() -> Self {
        Self::with_mailer(MockMailer::new())
    }

    fn with_mailer(mailer: MockMailer) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let config = AppConfig::default();
        let state = AppState {
            repo: repo.clone(),
            mailer: Arc::new(mailer.clone()),
            config: config.clone(),
        };
        TestApp {
            router: create_router(state),
            repo,
            mailer,
            config,
        }
    }

    async fn seed_user(&self, username: &str, role: Role) -> (User, String) {
        let user = self
            .repo
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                role,
                ..NewUser::default()
            })
            .await
            .unwrap();
        let token = issue_token(&user, &self.config).unwrap();
        (user, token)
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// POST with a body that is not necessarily valid JSON.
    async fn post_raw(
        &self,
        uri: &str,
        token: &str,
        content_type: &str,
        body: &'static str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Creates a category, a genre and one title as admin; returns the title id.
    async fn seed_title(&self, admin_token: &str) -> i64 {
        let (status, _) = self
            .post(
                "/api/v1/categories",
                Some(admin_token),
                json!({"name": "Film", "slug": "film"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = self
            .post(
                "/api/v1/genres",
                Some(admin_token),
                json!({"name": "Drama", "slug": "drama"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, title) = self
            .post(
                "/api/v1/titles",
                Some(admin_token),
                json!({"name": "Stalker", "year": 1979, "category": "film", "genre": ["drama"]}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        title["id"].as_i64().unwrap()
    }
}

// --- Health ---

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

// --- Signup & Token ---

#[tokio::test]
async fn test_signup_then_token_then_me() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "alice", "email": "a@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"username": "alice", "email": "a@x.io"}));

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "alice, your Confirmation code");
    assert_eq!(sent[0].from, "admin@yamdb.local");
    assert_eq!(sent[0].to, vec!["a@x.io".to_string()]);

    let code = app.mailer.last_body_for("a@x.io").unwrap();
    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({"username": "alice", "confirmation_code": code}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, me) = app.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "alice");
    assert_eq!(me["role"], "user");
}

#[tokio::test]
async fn test_signup_is_idempotent_for_same_pair() {
    let app = TestApp::new();
    let payload = json!({"username": "alice", "email": "a@x.io"});

    let (first, _) = app.post("/api/v1/auth/signup", None, payload.clone()).await;
    let (second, _) = app.post("/api/v1/auth/signup", None, payload).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(app.mailer.sent().len(), 2);
    assert_eq!(app.repo.list_users(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_signup_rejects_reserved_username() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "me", "email": "me@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("username").is_some());
    assert!(app.mailer.sent().is_empty());

    // Only the exact lowercase literal is reserved.
    let (status, _) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "Me", "email": "me@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_signup_conflicts_attributed_to_field() {
    let app = TestApp::new();
    app.post(
        "/api/v1/auth/signup",
        None,
        json!({"username": "alice", "email": "a@x.io"}),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "alice", "email": "other@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("username").is_some());

    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "alicia", "email": "a@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());
}

#[tokio::test]
async fn test_signup_mail_failure_keeps_user() {
    let app = TestApp::with_mailer(MockMailer::new_failing());
    let (status, body) = app
        .post(
            "/api/v1/auth/signup",
            None,
            json!({"username": "alice", "email": "a@x.io"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.get("detail").is_some());
    assert!(
        app.repo
            .get_user_by_username("alice")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_token_rejections() {
    let app = TestApp::new();
    app.post(
        "/api/v1/auth/signup",
        None,
        json!({"username": "alice", "email": "a@x.io"}),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({"username": "alice", "confirmation_code": "0-00000000000000000000"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("confirmation_code").is_some());

    let (status, _) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({"username": "nobody", "confirmation_code": "x"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.post("/api/v1/auth/token", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("username").is_some());
    assert!(body.get("confirmation_code").is_some());
}

#[tokio::test]
async fn test_code_of_one_user_does_not_work_for_another() {
    let app = TestApp::new();
    app.post(
        "/api/v1/auth/signup",
        None,
        json!({"username": "alice", "email": "a@x.io"}),
    )
    .await;
    app.post(
        "/api/v1/auth/signup",
        None,
        json!({"username": "bob", "email": "b@x.io"}),
    )
    .await;
    let alice_code = app.mailer.last_body_for("a@x.io").unwrap();

    let (status, _) = app
        .post(
            "/api/v1/auth/token",
            None,
            json!({"username": "bob", "confirmation_code": alice_code}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// --- Catalog ---

#[tokio::test]
async fn test_catalog_writes_are_admin_only() {
    let app = TestApp::new();
    let (_, user_token) = app.seed_user("user1", Role::User).await;
    let (_, mod_token) = app.seed_user("mod1", Role::Moderator).await;
    let body = json!({"name": "Music", "slug": "music"});

    let (status, _) = app.post("/api/v1/categories", None, body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .post("/api/v1/categories", Some(&user_token), body.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post("/api/v1/categories", Some(&mod_token), body)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = app.get("/api/v1/categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_category_lifecycle() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;

    let (status, created) = app
        .post(
            "/api/v1/categories",
            Some(&admin),
            json!({"name": "Books", "slug": "books"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({"name": "Books", "slug": "books"}));

    let (status, body) = app
        .post(
            "/api/v1/categories",
            Some(&admin),
            json!({"name": "Other books", "slug": "books"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("slug").is_some());

    app.post(
        "/api/v1/categories",
        Some(&admin),
        json!({"name": "Music", "slug": "music"}),
    )
    .await;
    let (_, found) = app.get("/api/v1/categories?search=mus", None).await;
    assert_eq!(found, json!([{"name": "Music", "slug": "music"}]));

    let (status, _) = app.delete("/api/v1/categories/books", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.delete("/api/v1/categories/books", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_title_validation() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;

    let (status, body) = app
        .post(
            "/api/v1/titles",
            Some(&admin),
            json!({"name": "Future", "year": 9999}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("year").is_some());

    let (status, body) = app
        .post(
            "/api/v1/titles",
            Some(&admin),
            json!({"name": "Orphan", "year": 2000, "category": "missing", "genre": ["nope"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("category").is_some());
    assert!(body.get("genre").is_some());
}

#[tokio::test]
async fn test_title_without_year_is_field_error() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;

    let (status, body) = app
        .post("/api/v1/titles", Some(&admin), json!({"name": "Yearless"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["year"], json!(["This field is required."]));

    let (status, body) = app
        .post(
            "/api/v1/titles",
            Some(&admin),
            json!({"name": "Typed", "year": 1990, "genre": [3]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("genre").is_some());
}

#[tokio::test]
async fn test_malformed_review_bodies_are_field_errors() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, alice) = app.seed_user("alice", Role::User).await;
    let title_id = app.seed_title(&admin).await;
    let reviews = format!("/api/v1/titles/{title_id}/reviews");

    let (status, body) = app
        .post(&reviews, Some(&alice), json!({"text": "good"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["score"], json!(["This field is required."]));

    let (status, body) = app
        .post(&reviews, Some(&alice), json!({"text": "good", "score": "7"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("score").is_some());

    let (status, body) = app
        .post_raw(&reviews, &alice, "application/json", "{\"text\": ")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("non_field_errors").is_some());

    let (status, body) = app
        .post_raw(&reviews, &alice, "text/plain", "{}")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("non_field_errors").is_some());

    let (_, list) = app.get(&reviews, None).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_title_read_filters_and_update() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let title_id = app.seed_title(&admin).await;

    let (status, title) = app.get(&format!("/api/v1/titles/{title_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(title["category"]["slug"], "film");
    assert_eq!(title["genre"][0]["slug"], "drama");
    assert_eq!(title["rating"], Value::Null);

    let (_, by_genre) = app.get("/api/v1/titles?genre=drama", None).await;
    assert_eq!(by_genre.as_array().unwrap().len(), 1);
    let (_, by_year) = app.get("/api/v1/titles?year=1980", None).await;
    assert_eq!(by_year, json!([]));
    let (_, by_name) = app.get("/api/v1/titles?name=stalk", None).await;
    assert_eq!(by_name.as_array().unwrap().len(), 1);

    let (status, updated) = app
        .patch(
            &format!("/api/v1/titles/{title_id}"),
            Some(&admin),
            json!({"description": "Zone"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["description"], "Zone");
    assert_eq!(updated["name"], "Stalker");

    let (status, _) = app.get("/api/v1/titles/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_title_patch_null_clears_optional_fields() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let title_id = app.seed_title(&admin).await;
    let url = format!("/api/v1/titles/{title_id}");

    let (status, _) = app
        .patch(&url, Some(&admin), json!({"description": "Zone"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Absent keys leave both fields alone.
    let (status, untouched) = app.patch(&url, Some(&admin), json!({"year": 1980})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(untouched["description"], "Zone");
    assert_eq!(untouched["category"]["slug"], "film");

    let (status, cleared) = app
        .patch(
            &url,
            Some(&admin),
            json!({"description": null, "category": null}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["description"], Value::Null);
    assert_eq!(cleared["category"], Value::Null);
    assert_eq!(cleared["genre"][0]["slug"], "drama");
    assert_eq!(cleared["year"], 1980);

    let (status, reattached) = app
        .patch(&url, Some(&admin), json!({"category": "film"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reattached["category"]["slug"], "film");
}

// --- Reviews: the alice / bob / carol walkthrough ---

#[tokio::test]
async fn test_review_lifecycle_and_rating() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, alice) = app.seed_user("alice", Role::User).await;
    let (_, bob) = app.seed_user("bob", Role::User).await;
    let (_, carol) = app.seed_user("carol", Role::User).await;
    let (_, moderator) = app.seed_user("mod", Role::Moderator).await;
    let title_id = app.seed_title(&admin).await;
    let reviews = format!("/api/v1/titles/{title_id}/reviews");

    let (status, alice_review) = app
        .post(&reviews, Some(&alice), json!({"text": "Great", "score": 7}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(alice_review["author"], "alice");

    let (status, body) = app
        .post(&reviews, Some(&alice), json!({"text": "Again", "score": 8}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("non_field_errors").is_some());

    let (status, bob_review) = app
        .post(&reviews, Some(&bob), json!({"text": "Meh", "score": 3}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let bob_review_url = format!("{reviews}/{}", bob_review["id"]);

    let (_, title) = app.get(&format!("/api/v1/titles/{title_id}"), None).await;
    assert_eq!(title["rating"], 5);

    // carol is neither author, moderator nor admin.
    let (status, _) = app
        .patch(&bob_review_url, Some(&carol), json!({"text": "hacked"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, moderated) = app
        .patch(&bob_review_url, Some(&moderator), json!({"text": "[moderated]"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moderated["text"], "[moderated]");
    assert_eq!(moderated["author"], "bob");
    assert_eq!(moderated["score"], 3);

    let (status, _) = app
        .post(&reviews, None, json!({"text": "anon", "score": 5}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.delete(&bob_review_url, Some(&bob)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, title) = app.get(&format!("/api/v1/titles/{title_id}"), None).await;
    assert_eq!(title["rating"], 7);

    let (status, list) = app.get(&reviews, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_author_patch_skips_duplicate_check() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, alice) = app.seed_user("alice", Role::User).await;
    let title_id = app.seed_title(&admin).await;
    let reviews = format!("/api/v1/titles/{title_id}/reviews");

    let (_, review) = app
        .post(&reviews, Some(&alice), json!({"text": "Good", "score": 6}))
        .await;
    let (status, updated) = app
        .patch(
            &format!("{reviews}/{}", review["id"]),
            Some(&alice),
            json!({"score": 9}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["score"], 9);

    let (status, body) = app
        .patch(
            &format!("{reviews}/{}", review["id"]),
            Some(&alice),
            json!({"score": 11}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("score").is_some());
}

#[tokio::test]
async fn test_review_under_wrong_title_is_not_found() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, alice) = app.seed_user("alice", Role::User).await;
    let title_id = app.seed_title(&admin).await;
    let (_, other) = app
        .post(
            "/api/v1/titles",
            Some(&admin),
            json!({"name": "Solaris", "year": 1972}),
        )
        .await;
    let other_id = other["id"].as_i64().unwrap();

    let (_, review) = app
        .post(
            &format!("/api/v1/titles/{title_id}/reviews"),
            Some(&alice),
            json!({"text": "Good", "score": 6}),
        )
        .await;

    let (status, _) = app
        .get(
            &format!("/api/v1/titles/{other_id}/reviews/{}", review["id"]),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/api/v1/titles/424242/reviews",
            Some(&alice),
            json!({"text": "ghost", "score": 5}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_comment_permissions_and_cascade() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, alice) = app.seed_user("alice", Role::User).await;
    let (_, bob) = app.seed_user("bob", Role::User).await;
    let title_id = app.seed_title(&admin).await;

    let (_, review) = app
        .post(
            &format!("/api/v1/titles/{title_id}/reviews"),
            Some(&alice),
            json!({"text": "Good", "score": 6}),
        )
        .await;
    let review_url = format!("/api/v1/titles/{title_id}/reviews/{}", review["id"]);
    let comments = format!("{review_url}/comments");

    let (status, comment) = app
        .post(&comments, Some(&bob), json!({"text": "Disagree"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["author"], "bob");
    let comment_url = format!("{comments}/{}", comment["id"]);

    let (status, _) = app.delete(&comment_url, Some(&alice)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, edited) = app
        .patch(&comment_url, Some(&bob), json!({"text": "Partly disagree"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["text"], "Partly disagree");

    let (status, _) = app.get(&comment_url, None).await;
    assert_eq!(status, StatusCode::OK);

    // Admin removes the review; its comments go with it.
    let (status, _) = app.delete(&review_url, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&comments, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_title_cascades_reviews() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (alice_user, alice) = app.seed_user("alice", Role::User).await;
    let title_id = app.seed_title(&admin).await;

    app.post(
        &format!("/api/v1/titles/{title_id}/reviews"),
        Some(&alice),
        json!({"text": "Good", "score": 6}),
    )
    .await;

    let (status, _) = app
        .delete(&format!("/api/v1/titles/{title_id}"), Some(&admin))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(
        !app.repo
            .review_exists(title_id, alice_user.id)
            .await
            .unwrap()
    );
}

// --- Users ---

#[tokio::test]
async fn test_users_collection_is_admin_only() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;
    let (_, user) = app.seed_user("plain", Role::User).await;
    let (_, moderator) = app.seed_user("mod", Role::Moderator).await;

    let (status, _) = app.get("/api/v1/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/api/v1/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/v1/users", Some(&moderator)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    // No ownership exception: a user cannot read their own record here.
    let (status, _) = app.get("/api/v1/users/plain", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, list) = app.get("/api/v1/users?search=pla", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["username"], "plain");
}

#[tokio::test]
async fn test_admin_user_management() {
    let app = TestApp::new();
    let (_, admin) = app.seed_user("boss", Role::Admin).await;

    let (status, created) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({"username": "newmod", "email": "newmod@x.io", "role": "moderator"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "moderator");

    let (status, body) = app
        .post(
            "/api/v1/users",
            Some(&admin),
            json!({"username": "other", "email": "newmod@x.io"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("email").is_some());

    let (status, updated) = app
        .patch(
            "/api/v1/users/newmod",
            Some(&admin),
            json!({"role": "admin", "bio": "promoted"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "admin");
    assert_eq!(updated["bio"], "promoted");

    let (status, _) = app.delete("/api/v1/users/newmod", Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get("/api/v1/users/newmod", Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_patch_ignores_role() {
    let app = TestApp::new();
    let (_, token) = app.seed_user("climber", Role::User).await;

    let (status, me) = app
        .patch(
            "/api/v1/users/me",
            Some(&token),
            json!({"role": "admin", "first_name": "Cli"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "user");
    assert_eq!(me["first_name"], "Cli");

    let stored = app
        .repo
        .get_user_by_username("climber")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.role, Role::User);
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/v1/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_superuser_with_user_role_acts_as_admin() {
    let app = TestApp::new();
    let root = app
        .repo
        .create_user(NewUser {
            username: "root".to_string(),
            email: "root@x.io".to_string(),
            role: Role::User,
            is_superuser: true,
            ..NewUser::default()
        })
        .await
        .unwrap();
    let token = issue_token(&root, &app.config).unwrap();

    let (status, _) = app.get("/api/v1/users", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(
            "/api/v1/genres",
            Some(&token),
            json!({"name": "Noir", "slug": "noir"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}
