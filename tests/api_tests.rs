use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use blog_admin::{
    AppConfig, AppState, MemoryRepository, create_router,
    auth::permissions,
    config::Env,
    models::{Category, Post, User},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_ID: Uuid = Uuid::from_u128(1);
const EDITOR_ID: Uuid = Uuid::from_u128(2);
const AUTHOR_ID: Uuid = Uuid::from_u128(3);
const OTHER_AUTHOR_ID: Uuid = Uuid::from_u128(4);
const CATEGORY_ID: Uuid = Uuid::from_u128(100);

struct TestApp {
    router: Router,
}

fn spawn_app() -> TestApp {
    let repo = MemoryRepository::new();
    for (id, name, role) in [
        (ADMIN_ID, "Admin", "Admin"),
        (EDITOR_ID, "Editor", "Editor"),
        (AUTHOR_ID, "Author One", "Author"),
        (OTHER_AUTHOR_ID, "Author Two", "Author"),
    ] {
        repo.add_user(
            User {
                id,
                name: name.to_string(),
                email: format!("{}@blog.test", name.to_lowercase().replace(' ', ".")),
            },
            &[role],
        );
    }
    repo.grant_role_permission("Author", permissions::CREATE_POSTS);
    repo.add_category(Category {
        id: CATEGORY_ID,
        name: "General".to_string(),
        slug: "general".to_string(),
    });
    for (owner, title) in [(AUTHOR_ID, "Mine"), (OTHER_AUTHOR_ID, "Theirs")] {
        repo.add_post(Post {
            id: Uuid::new_v4(),
            category_id: CATEGORY_ID,
            user_id: owner,
            title: title.to_string(),
            slug: title.to_lowercase(),
            ..Post::default()
        });
    }

    // Local mode enables the x-user-id header.
    let config = AppConfig {
        env: Env::Local,
        ..AppConfig::default()
    };
    let state = AppState {
        repo: Arc::new(repo),
        config,
    };

    TestApp {
        router: create_router(state),
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = user {
            builder = builder.header("x-user-id", id.to_string());
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        // Plain-text bodies (e.g. /health) come back as Null.
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app();
    let (status, _) = app.send(Method::GET, "/health", None, None).await;
    assert!(status.is_success());
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = spawn_app();
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_protected_routes_require_identity() {
    let app = spawn_app();

    for uri in ["/me", "/posts", "/tags", "/admin/categories", "/admin/roles"] {
        let (status, body) = app.send(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["status"], 401);
    }
}

#[tokio::test]
async fn test_author_listing_is_scoped() {
    let app = spawn_app();

    let (status, body) = app.send(Method::GET, "/posts", Some(AUTHOR_ID), None).await;
    assert_eq!(status, StatusCode::OK);
    let posts = body.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "Mine");
    assert!(posts[0].get("author_name").is_none());

    let (_, body) = app.send(Method::GET, "/posts", Some(EDITOR_ID), None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_routes_enforce_policies() {
    let app = spawn_app();

    let (status, body) = app.send(Method::GET, "/admin/roles", Some(EDITOR_ID), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["title"], "Forbidden");

    let (status, body) = app.send(Method::GET, "/admin/roles", Some(ADMIN_ID), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, _) = app.send(Method::GET, "/admin/categories", Some(AUTHOR_ID), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/admin/permissions", Some(ADMIN_ID), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_post_lifecycle_for_author() {
    let app = spawn_app();

    let (status, created) = app
        .send(
            Method::POST,
            "/posts",
            Some(AUTHOR_ID),
            Some(json!({
                "title": "Primer Post",
                "excerpt": "Resumen",
                "content": "Contenido",
                "category_id": CATEGORY_ID,
                "user_id": OTHER_AUTHOR_ID,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["slug"], "primer-post");
    assert_eq!(created["user_id"], AUTHOR_ID.to_string());

    let uri = format!("/posts/{}/published", created["id"].as_str().unwrap());
    let (status, published) = app
        .send(Method::PATCH, &uri, Some(AUTHOR_ID), Some(json!({ "published": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["published"], true);
    assert!(published["published_at"].is_string());

    // Another author cannot see it.
    let uri = format!("/posts/{}", created["id"].as_str().unwrap());
    let (status, _) = app.send(Method::GET, &uri, Some(OTHER_AUTHOR_ID), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, &uri, Some(AUTHOR_ID), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_bulk_delete_posts_forbidden_for_editor() {
    let app = spawn_app();

    let (status, _) = app
        .send(
            Method::POST,
            "/posts/bulk-delete",
            Some(EDITOR_ID),
            Some(json!({ "ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_category_in_use_cannot_be_deleted() {
    let app = spawn_app();
    let uri = format!("/admin/categories/{}", CATEGORY_ID);

    let (status, body) = app.send(Method::DELETE, &uri, Some(ADMIN_ID), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], 409);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = spawn_app();
    let (status, body) = app.send(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/posts"].is_object());
    assert!(body["paths"]["/admin/roles"].is_object());
}
