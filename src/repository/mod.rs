use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, Role},
    error::RepoError,
    models::{
        Category, NewCategory, NewPost, Permission, Post, PostSummary, RoleDetail, Tag,
        UpdatePostRequest, User,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// PostScope
///
/// Row-level visibility of posts. Every repository method that enumerates or looks up
/// posts takes one, so the restriction holds no matter which screen or endpoint asks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    /// Admin and Editor see every post.
    All,
    /// Everyone else sees only the posts they own.
    OwnedBy(Uuid),
    /// No resolved user: nothing is visible.
    Nothing,
}

impl PostScope {
    pub fn for_user<'a>(user: impl Into<Option<&'a AuthUser>>) -> Self {
        match user.into() {
            Some(u) if u.has_any_role(&[Role::Admin, Role::Editor]) => PostScope::All,
            Some(u) => PostScope::OwnedBy(u.id),
            None => PostScope::Nothing,
        }
    }

    /// Whether a post owned by `owner_id` falls inside this scope.
    pub fn permits(&self, owner_id: Uuid) -> bool {
        match self {
            PostScope::All => true,
            PostScope::OwnedBy(id) => *id == owner_id,
            PostScope::Nothing => false,
        }
    }
}

/// PostSort
///
/// Listing order. A leading `-` means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
pub enum PostSort {
    #[default]
    #[serde(rename = "created")]
    Newest,
    #[serde(rename = "title")]
    TitleAsc,
    #[serde(rename = "-title")]
    TitleDesc,
    #[serde(rename = "category")]
    CategoryAsc,
    #[serde(rename = "-category")]
    CategoryDesc,
}

/// PostFilter
///
/// Optional listing filters applied on top of the mandatory `PostScope`.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub category_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub published: Option<bool>,
    /// Case-insensitive match on the post title or the category name.
    pub search: Option<String>,
    pub sort: PostSort,
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, so handlers never know whether
/// Postgres or the in-memory store sits behind them.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum's tasks.
/// Lookups that fail at the database are logged and reported as empty results, which the
/// authorization layer treats as "no roles, no permissions, no rows".
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity & Capabilities ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn resolve_roles(&self, user_id: Uuid) -> BTreeSet<String>;
    // Role-granted permissions plus permissions granted to the user directly.
    async fn resolve_permissions(&self, user_id: Uuid) -> BTreeSet<String>;

    // --- Posts (always scoped) ---
    async fn list_posts(&self, scope: PostScope, filter: &PostFilter) -> Vec<PostSummary>;
    async fn get_post(&self, id: Uuid, scope: PostScope) -> Option<Post>;
    async fn create_post(&self, post: NewPost) -> Result<Post, RepoError>;
    // Partial update; `Ok(None)` when the post is gone or outside `scope`.
    async fn update_post(
        &self,
        id: Uuid,
        scope: PostScope,
        changes: UpdatePostRequest,
    ) -> Result<Option<Post>, RepoError>;
    // False when nothing inside `scope` was removed.
    async fn delete_post(&self, id: Uuid, scope: PostScope) -> bool;
    // Bulk delete restricted to the given scope; returns the number of rows removed.
    async fn delete_posts(&self, ids: &[Uuid], scope: PostScope) -> u64;

    // --- Categories ---
    async fn list_categories(&self, search: Option<String>) -> Vec<Category>;
    async fn get_category(&self, id: Uuid) -> Option<Category>;
    async fn create_category(&self, category: NewCategory) -> Result<Category, RepoError>;
    // Fails with `Conflict` while posts still reference the category.
    async fn delete_category(&self, id: Uuid) -> Result<bool, RepoError>;
    async fn delete_categories(&self, ids: &[Uuid]) -> Result<u64, RepoError>;

    // --- Tags ---
    async fn list_tags(&self) -> Vec<Tag>;
    async fn create_tag(&self, name: String) -> Result<Tag, RepoError>;

    // --- Roles & Permissions ---
    async fn list_roles(&self) -> Vec<RoleDetail>;
    async fn list_permissions(&self) -> Vec<Permission>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
