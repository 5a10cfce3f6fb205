use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Admin Router Module
///
/// Blog taxonomy and access-control metadata. Reading categories is open to Admin and
/// Editor; deleting them, and reading roles or permissions, is Admin only. Each handler
/// checks its policy after the `AuthUser` extractor has resolved the caller.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /admin/categories
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        // POST /admin/categories/bulk-delete
        .route("/categories/bulk-delete", post(handlers::bulk_delete_categories))
        // DELETE /admin/categories/{id}
        .route("/categories/{id}", delete(handlers::delete_category))
        // GET /admin/roles
        .route("/roles", get(handlers::list_roles))
        // GET /admin/permissions
        .route("/permissions", get(handlers::list_permissions))
}
