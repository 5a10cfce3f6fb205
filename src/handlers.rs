use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, ErrorBody},
    models::{
        Abilities, BulkDeleteRequest, BulkDeleteResponse, Category, CreateCategoryRequest,
        CreatePostRequest, CreateTagRequest, NewCategory, NewPost, Permission, Post, PostSummary,
        RoleDetail, SetPublishedRequest, Tag, UpdatePostRequest, UserProfile, publish_stamp,
    },
    policy::{
        Ability, CategoryPolicy, PermissionPolicy, PostPolicy, RolePolicy, TagPolicy, authorize,
    },
    repository::{PostFilter, PostScope, PostSort},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// PostListQuery
///
/// Query parameters accepted by GET /posts.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct PostListQuery {
    pub category_id: Option<Uuid>,
    /// Author filter. Ignored for callers who may not filter by author.
    pub user_id: Option<Uuid>,
    pub published: Option<bool>,
    /// Case-insensitive match on title or category name.
    pub search: Option<String>,
    /// `created` (default), `title`, `-title`, `category`, `-category`.
    pub sort: Option<PostSort>,
}

/// CategoryListQuery
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct CategoryListQuery {
    pub search: Option<String>,
}

fn post_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("post {}", id))
}

/// Loads a post through the caller's scope; posts outside it are reported as missing.
async fn load_post(state: &AppState, user: &AuthUser, id: Uuid) -> Result<Post, AppError> {
    state
        .repo
        .get_post(id, PostScope::for_user(user))
        .await
        .ok_or_else(|| post_not_found(id))
}

// --- Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's profile, resolved roles and permissions, and the
/// list-level abilities the admin UI should expose.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Unauthenticated", body = ErrorBody)
    )
)]
pub async fn get_me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let record = state.repo.get_user(user.id).await.ok_or(AppError::Unauthorized)?;

    Ok(Json(UserProfile {
        id: record.id,
        name: record.name,
        email: record.email,
        roles: user.roles.iter().cloned().collect(),
        permissions: user.permissions.iter().cloned().collect(),
        abilities: abilities(&user),
    }))
}

/// abilities
///
/// Evaluates every list-level policy for one user.
pub fn abilities(user: &AuthUser) -> Abilities {
    Abilities {
        view_posts: PostPolicy::view_any(user),
        create_posts: PostPolicy::create(user),
        bulk_delete_posts: PostPolicy::delete_any(user),
        assign_post_author: PostPolicy::assign_author(user),
        view_categories: CategoryPolicy::view_any(user),
        create_categories: CategoryPolicy::create(user),
        bulk_delete_categories: CategoryPolicy::delete_any(user),
        view_tags: TagPolicy::view_any(user),
        create_tags: TagPolicy::create(user),
        view_roles: RolePolicy::view_any(user),
        view_permissions: PermissionPolicy::view_any(user),
    }
}

/// list_posts
///
/// [Authenticated Route] Lists posts visible to the caller.
///
/// *Security*: the repository applies `PostScope::for_user`, so anyone without Admin or
/// Editor only ever receives their own posts, whatever filters they send.
#[utoipa::path(
    get,
    path = "/posts",
    params(PostListQuery),
    responses(
        (status = 200, description = "Scoped post listing", body = [PostSummary]),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn list_posts(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Vec<PostSummary>>, AppError> {
    authorize(PostPolicy::view_any(&user), &user, "posts", Ability::ViewAny)?;

    let filter = PostFilter {
        category_id: query.category_id,
        user_id: query.user_id.filter(|_| PostPolicy::filter_by_author(&user)),
        published: query.published,
        search: query.search.filter(|s| !s.trim().is_empty()),
        sort: query.sort.unwrap_or_default(),
    };

    let mut posts = state.repo.list_posts(PostScope::for_user(&user), &filter).await;

    if !PostPolicy::see_author(&user) {
        for post in &mut posts {
            post.author_name = None;
        }
    }

    Ok(Json(posts))
}

/// get_post
///
/// [Authenticated Route] A single post with its tags.
#[utoipa::path(
    get,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Found", body = Post),
        (status = 404, description = "Not found or not visible", body = ErrorBody)
    )
)]
pub async fn get_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Post>, AppError> {
    let post = load_post(&state, &user, id).await?;
    authorize(PostPolicy::view(&user, &post), &user, "posts", Ability::View)?;
    Ok(Json(post))
}

/// create_post
///
/// [Authenticated Route] Creates a post. The owner is the caller unless the caller may
/// assign authors and names another user.
#[utoipa::path(
    post,
    path = "/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Created", body = Post),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 409, description = "Duplicate slug", body = ErrorBody),
        (status = 422, description = "Invalid payload", body = ErrorBody)
    )
)]
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    authorize(PostPolicy::create(&user), &user, "posts", Ability::Create)?;
    payload.validate().map_err(AppError::Validation)?;

    let owner = match payload.user_id {
        Some(requested) if PostPolicy::assign_author(&user) => requested,
        _ => user.id,
    };

    let post = state.repo.create_post(NewPost::from_request(payload, owner)).await?;
    tracing::info!(post_id = %post.id, owner = %post.user_id, "post created");

    Ok((StatusCode::CREATED, Json(post)))
}

/// update_post
///
/// [Authenticated Route] Partial update. Requires the update policy (Admin, Editor or owner).
/// A change of owner is dropped unless the caller may assign authors.
#[utoipa::path(
    put,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Not found or not visible", body = ErrorBody)
    )
)]
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let post = load_post(&state, &user, id).await?;
    authorize(PostPolicy::update(&user, &post), &user, "posts", Ability::Update)?;
    payload.validate().map_err(AppError::Validation)?;

    if !PostPolicy::assign_author(&user) {
        payload.user_id = None;
    }
    if let Some(published) = payload.published {
        payload.published_at = payload
            .published_at
            .or_else(|| publish_stamp(published, post.published_at));
    }

    let updated = state
        .repo
        .update_post(id, PostScope::for_user(&user), payload)
        .await?
        .ok_or_else(|| post_not_found(id))?;

    Ok(Json(updated))
}

/// set_post_published
///
/// [Authenticated Route] Publishes or unpublishes a post. Publishing a post that has no
/// publication date stamps it with the current time.
#[utoipa::path(
    patch,
    path = "/posts/{id}/published",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = SetPublishedRequest,
    responses(
        (status = 200, description = "Updated", body = Post),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Not found or not visible", body = ErrorBody)
    )
)]
pub async fn set_post_published(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetPublishedRequest>,
) -> Result<Json<Post>, AppError> {
    let post = load_post(&state, &user, id).await?;
    authorize(PostPolicy::update(&user, &post), &user, "posts", Ability::Update)?;

    let changes = UpdatePostRequest {
        published: Some(payload.published),
        published_at: publish_stamp(payload.published, post.published_at),
        ..UpdatePostRequest::default()
    };

    let updated = state
        .repo
        .update_post(id, PostScope::for_user(&user), changes)
        .await?
        .ok_or_else(|| post_not_found(id))?;

    Ok(Json(updated))
}

/// delete_post
///
/// [Authenticated Route] Deletes one post. Requires the delete policy (Admin, Editor or owner).
#[utoipa::path(
    delete,
    path = "/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Not found or not visible", body = ErrorBody)
    )
)]
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let post = load_post(&state, &user, id).await?;
    authorize(PostPolicy::delete(&user, &post), &user, "posts", Ability::Delete)?;

    if state.repo.delete_post(id, PostScope::for_user(&user)).await {
        tracing::info!(post_id = %id, user_id = %user.id, "post deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(post_not_found(id))
    }
}

/// bulk_delete_posts
///
/// [Authenticated Route] Deletes many posts at once. Admin only.
#[utoipa::path(
    post,
    path = "/posts/bulk-delete",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Deleted", body = BulkDeleteResponse),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn bulk_delete_posts(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    authorize(PostPolicy::delete_any(&user), &user, "posts", Ability::DeleteAny)?;

    let deleted = state
        .repo
        .delete_posts(&payload.ids, PostScope::for_user(&user))
        .await;
    tracing::info!(deleted, user_id = %user.id, "posts bulk deleted");

    Ok(Json(BulkDeleteResponse { deleted }))
}

/// list_tags
#[utoipa::path(
    get,
    path = "/tags",
    responses(
        (status = 200, description = "Tags", body = [Tag]),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn list_tags(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Tag>>, AppError> {
    authorize(TagPolicy::view_any(&user), &user, "tags", Ability::ViewAny)?;
    Ok(Json(state.repo.list_tags().await))
}

/// create_tag
#[utoipa::path(
    post,
    path = "/tags",
    request_body = CreateTagRequest,
    responses(
        (status = 201, description = "Created", body = Tag),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 409, description = "Duplicate name", body = ErrorBody)
    )
)]
pub async fn create_tag(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), AppError> {
    authorize(TagPolicy::create(&user), &user, "tags", Ability::Create)?;
    payload.validate().map_err(AppError::Validation)?;

    let tag = state.repo.create_tag(payload.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// list_categories
///
/// [Admin Route] Categories ordered by name. Admin or Editor.
#[utoipa::path(
    get,
    path = "/admin/categories",
    params(CategoryListQuery),
    responses(
        (status = 200, description = "Categories", body = [Category]),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn list_categories(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<CategoryListQuery>,
) -> Result<Json<Vec<Category>>, AppError> {
    authorize(CategoryPolicy::view_any(&user), &user, "categories", Ability::ViewAny)?;
    let search = query.search.filter(|s| !s.trim().is_empty());
    Ok(Json(state.repo.list_categories(search).await))
}

/// create_category
///
/// [Admin Route] Creates a category; the slug is derived from the name when not given.
#[utoipa::path(
    post,
    path = "/admin/categories",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 409, description = "Duplicate name or slug", body = ErrorBody),
        (status = 422, description = "Invalid name", body = ErrorBody)
    )
)]
pub async fn create_category(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    authorize(CategoryPolicy::create(&user), &user, "categories", Ability::Create)?;
    payload.validate().map_err(AppError::Validation)?;

    let category = state.repo.create_category(NewCategory::from(payload)).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// delete_category
///
/// [Admin Route] Admin only. A category that still has posts cannot be deleted (409).
#[utoipa::path(
    delete,
    path = "/admin/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Category in use", body = ErrorBody)
    )
)]
pub async fn delete_category(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let category = state
        .repo
        .get_category(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("category {}", id)))?;
    authorize(CategoryPolicy::delete(&user, &category), &user, "categories", Ability::Delete)?;

    if state.repo.delete_category(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("category {}", id)))
    }
}

/// bulk_delete_categories
///
/// [Admin Route] Admin only.
#[utoipa::path(
    post,
    path = "/admin/categories/bulk-delete",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Deleted", body = BulkDeleteResponse),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 409, description = "A category is in use", body = ErrorBody)
    )
)]
pub async fn bulk_delete_categories(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    authorize(CategoryPolicy::delete_any(&user), &user, "categories", Ability::DeleteAny)?;
    let deleted = state.repo.delete_categories(&payload.ids).await?;
    Ok(Json(BulkDeleteResponse { deleted }))
}

/// list_roles
///
/// [Admin Route] Roles with the permissions they grant. Admin only.
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses(
        (status = 200, description = "Roles", body = [RoleDetail]),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn list_roles(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleDetail>>, AppError> {
    authorize(RolePolicy::view_any(&user), &user, "roles", Ability::ViewAny)?;
    Ok(Json(state.repo.list_roles().await))
}

/// list_permissions
///
/// [Admin Route] Admin only.
#[utoipa::path(
    get,
    path = "/admin/permissions",
    responses(
        (status = 200, description = "Permissions", body = [Permission]),
        (status = 403, description = "Forbidden", body = ErrorBody)
    )
)]
pub async fn list_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Permission>>, AppError> {
    authorize(PermissionPolicy::view_any(&user), &user, "permissions", Ability::ViewAny)?;
    Ok(Json(state.repo.list_permissions().await))
}
