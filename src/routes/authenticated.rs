use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post},
};

/// Authenticated Router Module
///
/// Routes for any authenticated user. The layer above rejects unauthenticated requests
/// with 401; each handler then consults the matching policy and answers 403 on denial.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Profile, resolved roles and permissions, and UI abilities.
        .route("/me", get(handlers::get_me))
        // GET/POST /posts
        // Listing is always row-scoped: non-staff users only see their own posts.
        .route("/posts", get(handlers::list_posts).post(handlers::create_post))
        // POST /posts/bulk-delete
        // Admin only.
        .route("/posts/bulk-delete", post(handlers::bulk_delete_posts))
        // GET/PUT/DELETE /posts/{id}
        // Admin, Editor or the post's owner.
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .put(handlers::update_post)
                .delete(handlers::delete_post),
        )
        // PATCH /posts/{id}/published
        .route("/posts/{id}/published", patch(handlers::set_post_published))
        // GET/POST /tags
        .route("/tags", get(handlers::list_tags).post(handlers::create_tag))
}
