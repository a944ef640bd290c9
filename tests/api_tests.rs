//! API integration tests
//!
//! Drive the full router in-process over the in-memory backend.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use libris_server::{api, config::AppConfig, repository::Repository, AppState};

const ADMIN_EMAIL: &str = "admin@libris.test";
const ADMIN_PASSWORD: &str = "administrator";

struct TestApp {
    router: Router,
    state: AppState,
}

impl TestApp {
    async fn new() -> Self {
        let state = AppState::new(AppConfig::default(), Repository::in_memory());
        state
            .services
            .users
            .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("admin bootstrap");
        Self {
            router: api::create_router(state.clone()),
            state,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(Method::POST, "/auth/login", None, Some(json!({ "email": email, "password": password })))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["token_type"], "Bearer");
        body["token"].as_str().expect("token").to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn member_token(&self, email: &str) -> String {
        let (status, _) = self
            .send(
                Method::POST,
                "/auth/signup",
                None,
                Some(json!({
                    "email": email,
                    "password": "reading-is-fun",
                    "first_name": "Member",
                    "last_name": "Reader"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        self.login(email, "reading-is-fun").await
    }

    async fn create_item(&self, admin: &str, body: Value) -> Value {
        let (status, item) = self.send(Method::POST, "/admin/items", Some(admin), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", item);
        item
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_signup_login_and_profile() {
    let app = TestApp::new().await;
    let token = app.member_token("reader@libris.test").await;

    let (status, profile) = app.send(Method::GET, "/auth/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "reader@libris.test");
    assert_eq!(profile["role"], "member");
    assert!(profile.get("password_hash").is_none());

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/signup",
            None,
            Some(json!({
                "email": "reader@libris.test",
                "password": "another-password",
                "first_name": "Dup",
                "last_name": "Licate"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(Method::POST, "/auth/login", None, Some(json!({ "email": "reader@libris.test", "password": "wrong" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = TestApp::new().await;
    let member = app.member_token("member@libris.test").await;
    let book = json!({ "title": "Dune", "author": "Frank Herbert", "description": "Spice" });

    let (status, _) = app.send(Method::POST, "/admin/items", None, Some(book.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::POST, "/admin/items", Some(&member), Some(book)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/admin/loans/active", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_borrow_and_return_flow() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let alice = app.member_token("alice@libris.test").await;
    let bob = app.member_token("bob@libris.test").await;

    let item = app
        .create_item(
            &admin,
            json!({ "title": "Neuromancer", "author": "William Gibson", "description": "Cyberspace", "total_copies": 1 }),
        )
        .await;
    let id = item["id"].as_str().expect("id").to_string();
    assert!(id.starts_with("BOOK-"));
    assert_eq!(item["available_copies"], 1);
    assert_eq!(item["available_status"], "Available");

    let borrow = format!("/items/{}/borrow", id);
    let (status, loan) = app.send(Method::POST, &borrow, Some(&alice), Some(json!({ "days": 14 }))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", loan);
    assert_eq!(loan["returned"], false);

    let (status, body) = app.send(Method::POST, &borrow, Some(&alice), Some(json!({ "days": 14 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "RuleViolation");

    let (status, _) = app.send(Method::POST, &borrow, Some(&bob), Some(json!({ "days": 14 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, item) = app.send(Method::GET, &format!("/items/{}", id), None, None).await;
    assert_eq!(item["available_copies"], 0);
    assert_eq!(item["available_status"], "Checked Out");

    let (status, mine) = app.send(Method::GET, "/loans/me", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
    assert_eq!(mine[0]["item_title"], "Neuromancer");

    let (status, _) = app.send(Method::POST, &format!("/items/{}/return", id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, returned) = app.send(Method::POST, &format!("/items/{}/return", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["returned"], true);

    let (_, item) = app.send(Method::GET, &format!("/items/{}", id), None, None).await;
    assert_eq!(item["available_copies"], 1);

    let (_, history) = app.send(Method::GET, "/loans/me/history", Some(&alice), None).await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_borrow_rejections() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let member = app.member_token("carol@libris.test").await;

    let (status, _) = app
        .send(Method::POST, "/items/BOOK-FFFFFF/borrow", Some(&member), Some(json!({ "days": 7 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let video = app
        .create_item(
            &admin,
            json!({ "title": "Koyaanisqatsi", "author": "Godfrey Reggio", "description": "Film", "media_type": "video" }),
        )
        .await;
    assert_eq!(video["kind"], "digital");
    let (status, _) = app
        .send(
            Method::POST,
            &format!("/items/{}/borrow", video["id"].as_str().expect("id")),
            Some(&member),
            Some(json!({ "days": 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let book = app
        .create_item(&admin, json!({ "title": "Solaris", "author": "Stanislaw Lem", "description": "Ocean" }))
        .await;
    let borrow = format!("/items/{}/borrow", book["id"].as_str().expect("id"));
    for days in [0, 31] {
        let (status, _) = app.send(Method::POST, &borrow, Some(&member), Some(json!({ "days": days }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} days", days);
    }
    let (status, _) = app.send(Method::POST, &borrow, Some(&member), Some(json!({ "days": 30 }))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_return_and_listings() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let member = app.member_token("dave@libris.test").await;

    let book = app
        .create_item(
            &admin,
            json!({ "title": "Foundation", "author": "Isaac Asimov", "description": "Psychohistory", "total_copies": 2 }),
        )
        .await;
    let id = book["id"].as_str().expect("id").to_string();

    let (_, loan) = app
        .send(Method::POST, &format!("/items/{}/borrow", id), Some(&member), Some(json!({ "days": 3 })))
        .await;
    let loan_id = loan["id"].as_i64().expect("loan id");

    let (status, active) = app.send(Method::GET, "/admin/loans/active", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active[0]["user_email"], "dave@libris.test");

    let (status, _) = app.send(Method::DELETE, &format!("/admin/items/{}", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let admin_return = format!("/admin/items/{}/loans/{}/return", id, loan_id);
    let (status, closed) = app.send(Method::POST, &admin_return, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["returned"], true);

    let (status, _) = app.send(Method::POST, &admin_return, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, overdue) = app.send(Method::GET, "/admin/loans/overdue", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overdue, json!([]));

    let (status, _) = app.send(Method::DELETE, &format!("/admin/items/{}", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_featured_rotation() {
    let app = TestApp::new().await;

    let (status, empty) = app.send(Method::GET, "/featured", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty["items"], json!([]));

    // An empty set is current now; an explicit refresh picks up new items
    let admin = app.admin_token().await;
    for n in 0..6 {
        app.create_item(
            &admin,
            json!({ "title": format!("Volume {}", n), "author": "Various", "description": "Anthology" }),
        )
        .await;
    }

    let (status, refreshed) = app.send(Method::POST, "/admin/featured/refresh", Some(&admin), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(refreshed["items"].as_array().map(Vec::len), Some(4));

    let (_, first) = app.send(Method::GET, "/featured", None, None).await;
    let (_, second) = app.send(Method::GET, "/featured", None, None).await;
    assert_eq!(first["id"], refreshed["id"]);
    assert_eq!(first["items"], second["items"]);
    assert_eq!(first["is_current"], true);
    assert_eq!(app.state.services.featured.failure_count(), 0);
}

#[tokio::test]
async fn test_search_categories_and_download() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let (status, _) = app
        .send(Method::POST, "/admin/categories", Some(&admin), Some(json!({ "name": "Science Fiction" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    app.create_item(
        &admin,
        json!({
            "title": "The Left Hand of Darkness",
            "author": "Ursula K. Le Guin",
            "description": "Gethen",
            "categories": ["science fiction"]
        }),
    )
    .await;
    app.create_item(
        &admin,
        json!({ "title": "Hidden Draft", "author": "Ursula K. Le Guin", "description": "-", "is_available": false }),
    )
    .await;
    let ebook = app
        .create_item(
            &admin,
            json!({
                "title": "Le Guin Essays",
                "author": "Ursula K. Le Guin",
                "description": "Essays",
                "kind": "digital",
                "external_source": "https://files.libris.test/essays.epub",
                "download_permission": "authenticated"
            }),
        )
        .await;

    let (status, page) = app.send(Method::GET, "/items?q=le%20guin", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["per_page"], 20);

    let (_, page) = app.send(Method::GET, "/items?q=le%20guin&include_unlisted=true", None, None).await;
    assert_eq!(page["total"], 2);
    let (_, page) = app
        .send(Method::GET, "/items?q=le%20guin&include_unlisted=true", Some(&admin), None)
        .await;
    assert_eq!(page["total"], 3);

    let (_, page) = app.send(Method::GET, "/items?category=Science%20Fiction", None, None).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["categories"], json!(["Science Fiction"]));

    let download = format!("/items/{}/download", ebook["id"].as_str().expect("id"));
    let (status, _) = app.send(Method::GET, &download, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, link) = app.send(Method::GET, &download, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["url"], "https://files.libris.test/essays.epub");

    let (status, stats) = app.send(Method::GET, "/stats", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_items"], 3);
    assert_eq!(stats["listed_items"], 2);
    assert_eq!(stats["users"], 1);
}

#[tokio::test]
async fn test_user_administration() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.member_token("erin@libris.test").await;

    let (status, users) = app.send(Method::GET, "/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let erin = users
        .as_array()
        .expect("users")
        .iter()
        .find(|u| u["email"] == "erin@libris.test")
        .expect("erin")
        .clone();
    let erin_id = erin["id"].as_i64().expect("id");

    let (status, promoted) = app
        .send(Method::PUT, &format!("/admin/users/{}/role", erin_id), Some(&admin), Some(json!({ "role": "admin" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(promoted["role"], "admin");

    let (status, _) = app.send(Method::DELETE, &format!("/admin/users/{}", erin_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send(Method::DELETE, &format!("/admin/users/{}", erin_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleted_account_token_is_rejected() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let member = app.member_token("frank@libris.test").await;
    let (_, profile) = app.send(Method::GET, "/auth/profile", Some(&member), None).await;
    let member_id = profile["id"].as_i64().expect("id");

    let book = app
        .create_item(&admin, json!({ "title": "Hyperion", "author": "Dan Simmons", "description": "Shrike" }))
        .await;

    let (status, _) = app.send(Method::DELETE, &format!("/admin/users/{}", member_id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let borrow = format!("/items/{}/borrow", book["id"].as_str().expect("id"));
    let (status, body) = app.send(Method::POST, &borrow, Some(&member), Some(json!({ "days": 7 }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "NotAuthenticated");

    let (_, active) = app.send(Method::GET, "/admin/loans/active", Some(&admin), None).await;
    assert_eq!(active, json!([]));

    // Optional-auth routes reject the stale token too
    let download = format!("/items/{}/download", book["id"].as_str().expect("id"));
    let (status, _) = app.send(Method::GET, &download, Some(&member), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demoted_admin_loses_admin_routes() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let grace = app.member_token("grace@libris.test").await;
    let (_, profile) = app.send(Method::GET, "/auth/profile", Some(&grace), None).await;
    let role_path = format!("/admin/users/{}/role", profile["id"].as_i64().expect("id"));

    let (status, _) = app.send(Method::PUT, &role_path, Some(&admin), Some(json!({ "role": "admin" }))).await;
    assert_eq!(status, StatusCode::OK);
    // Promotion applies to the token already issued
    let (status, _) = app.send(Method::GET, "/admin/loans/active", Some(&grace), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::PUT, &role_path, Some(&admin), Some(json!({ "role": "member" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send(Method::GET, "/admin/loans/active", Some(&grace), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_page_far_past_the_end() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_item(&admin, json!({ "title": "Ubik", "author": "Philip K. Dick", "description": "Spray" }))
        .await;

    let (status, page) = app.send(Method::GET, "/items?page=9223372036854775807", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn test_contact_form_and_inquiry_listing() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let member = app.member_token("henry@libris.test").await;

    let inquiry = |subject: &str| {
        json!({
            "name": "Henry",
            "email": "henry@libris.test",
            "subject": subject,
            "message": "Could you order more copies?"
        })
    };

    let (status, created) = app.send(Method::POST, "/contact", None, Some(inquiry("More copies"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    assert_eq!(created["is_resolved"], false);
    let (status, _) = app.send(Method::POST, "/contact", None, Some(inquiry("Opening hours"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(
            Method::POST,
            "/contact",
            None,
            Some(json!({ "name": "Henry", "email": "nope", "subject": "x", "message": "y" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(Method::GET, "/admin/inquiries", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, listed) = app.send(Method::GET, "/admin/inquiries", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(2));
    assert_eq!(listed[0]["subject"], "Opening hours");
}

#[tokio::test]
async fn test_related_items_and_suggestions() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    for name in ["Cyberpunk", "Space Opera"] {
        let (status, _) = app
            .send(Method::POST, "/admin/categories", Some(&admin), Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let source = app
        .create_item(
            &admin,
            json!({ "title": "Count Zero", "author": "William Gibson", "description": "Sprawl",
                    "categories": ["Cyberpunk", "Space Opera"] }),
        )
        .await;
    app.create_item(
        &admin,
        json!({ "title": "Mona Lisa Overdrive", "author": "William Gibson", "description": "Sprawl",
                "categories": ["Cyberpunk"] }),
    )
    .await;
    app.create_item(
        &admin,
        json!({ "title": "Snow Crash", "author": "Neal Stephenson", "description": "Metaverse",
                "categories": ["Cyberpunk", "Space Opera"] }),
    )
    .await;
    app.create_item(&admin, json!({ "title": "Emma", "author": "Jane Austen", "description": "Regency" }))
        .await;

    let related = format!("/items/{}/related", source["id"].as_str().expect("id"));
    let (status, items) = app.send(Method::GET, &related, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = items
        .as_array()
        .expect("items")
        .iter()
        .filter_map(|i| i["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Snow Crash", "Mona Lisa Overdrive"]);

    let (status, _) = app.send(Method::GET, "/items/BOOK-FFFFFF/related", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, suggestions) = app.send(Method::GET, "/search/suggestions?q=gib", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(suggestions, json!([{ "type": "author", "value": "William Gibson" }]));

    let (_, suggestions) = app.send(Method::GET, "/search/suggestions?q=snow", None, None).await;
    assert_eq!(suggestions[0]["type"], "title");
    assert_eq!(suggestions[0]["value"], "Snow Crash");
    assert!(suggestions[0]["item_id"].is_string());

    let (_, suggestions) = app.send(Method::GET, "/search/suggestions", None, None).await;
    assert_eq!(suggestions, json!([]));
}
