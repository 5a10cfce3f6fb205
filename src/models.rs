use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

pub const CATEGORY_NAME_MIN: usize = 4;
pub const CATEGORY_NAME_MAX: usize = 200;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Identity record from the `users` table. Roles and permissions are resolved separately
/// (see `Repository::resolve_roles` / `resolve_permissions`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Category
///
/// Row from `categories`. Both `name` and `slug` are unique.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Tag
///
/// Row from `tags`; attached to posts through `post_tag`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

/// Post
///
/// Full post record from `posts`, with its tags loaded from `post_tag`.
/// `user_id` is the owner and the only field the authorization layer reads.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub category_id: Uuid,
    // FK to users.id (Owner / Author).
    pub user_id: Uuid,
    pub image: Option<String>,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub published: bool,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,

    // Loaded with a second query.
    #[sqlx(skip)]
    pub tags: Vec<Tag>,

    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PostSummary
///
/// One row of the post listing: the post joined with its category name, author name and tag names.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PostSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub image: Option<String>,
    pub category_id: Uuid,
    pub category_name: String,
    pub user_id: Uuid,
    /// Omitted for callers who only ever see their own posts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub tag_names: Vec<String>,
    pub published: bool,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Permission
///
/// Row from `permissions`, e.g. `view posts`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Permission {
    pub id: i64,
    pub name: String,
}

/// RoleDetail
///
/// A role together with the names of the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct RoleDetail {
    pub id: i64,
    pub name: String,
    pub permissions: Vec<String>,
}

/// --- Request Payloads (Input Schemas) ---

/// CreatePostRequest
///
/// Input payload for POST /posts. `slug` is derived from `title` when absent.
/// `user_id` is honored only for callers allowed to assign authors.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub excerpt: String,
    pub content: String,
    pub category_id: Uuid,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
}

impl CreatePostRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_text("title", &self.title)?;
        require_text("excerpt", &self.excerpt)?;
        require_text("content", &self.content)?;
        if let Some(slug) = &self.slug {
            if slugify(slug).is_empty() {
                return Err("slug must contain at least one letter or digit".to_string());
            }
        }
        if slugify(&self.title).is_empty() && self.slug.is_none() {
            return Err("title must contain at least one letter or digit".to_string());
        }
        Ok(())
    }
}

/// UpdatePostRequest
///
/// Partial update payload for PUT /posts/{id}. Only provided fields change;
/// `tag_ids`, when present, replaces the whole tag set. The slug is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<Uuid>>,
}

impl UpdatePostRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(excerpt) = &self.excerpt {
            require_text("excerpt", excerpt)?;
        }
        if let Some(content) = &self.content {
            require_text("content", content)?;
        }
        Ok(())
    }
}

/// SetPublishedRequest
///
/// Body of PATCH /posts/{id}/published.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetPublishedRequest {
    pub published: bool,
}

/// CreateCategoryRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl CreateCategoryRequest {
    pub fn validate(&self) -> Result<(), String> {
        let len = self.name.trim().chars().count();
        if !(CATEGORY_NAME_MIN..=CATEGORY_NAME_MAX).contains(&len) {
            return Err(format!(
                "name must be between {} and {} characters",
                CATEGORY_NAME_MIN, CATEGORY_NAME_MAX
            ));
        }
        if slugify(self.slug.as_deref().unwrap_or(&self.name)).is_empty() {
            return Err("slug must contain at least one letter or digit".to_string());
        }
        Ok(())
    }
}

/// CreateTagRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTagRequest {
    pub name: String,
}

impl CreateTagRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_text("name", &self.name)
    }
}

/// BulkDeleteRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

/// BulkDeleteResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

// --- Resolved Inserts ---

/// NewPost
///
/// A create request after the handler has fixed the owner, the slug and the publish stamp.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub category_id: Uuid,
    pub user_id: Uuid,
    pub image: Option<String>,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub content: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub tag_ids: Vec<Uuid>,
}

impl NewPost {
    pub fn from_request(req: CreatePostRequest, owner: Uuid) -> Self {
        let slug = slugify(req.slug.as_deref().unwrap_or(&req.title));
        let published_at = publish_stamp(req.published, req.published_at);
        Self {
            id: Uuid::new_v4(),
            category_id: req.category_id,
            user_id: owner,
            image: req.image,
            title: req.title.trim().to_string(),
            slug,
            excerpt: req.excerpt,
            content: req.content,
            published: req.published,
            published_at,
            tag_ids: req.tag_ids,
        }
    }
}

/// NewCategory
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<CreateCategoryRequest> for NewCategory {
    fn from(req: CreateCategoryRequest) -> Self {
        let slug = slugify(req.slug.as_deref().unwrap_or(&req.name));
        Self {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            slug,
        }
    }
}

/// --- Profile Schemas (Output) ---

/// Abilities
///
/// List-level actions the admin UI should offer the caller. A `false` entry means
/// the affordance is hidden; the server still enforces every check on use.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct Abilities {
    pub view_posts: bool,
    pub create_posts: bool,
    pub bulk_delete_posts: bool,
    pub assign_post_author: bool,
    pub view_categories: bool,
    pub create_categories: bool,
    pub bulk_delete_categories: bool,
    pub view_tags: bool,
    pub create_tags: bool,
    pub view_roles: bool,
    pub view_permissions: bool,
}

/// UserProfile
///
/// Output schema for GET /me.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub abilities: Abilities,
}

// --- Helpers ---

/// Publishing without an explicit date stamps the post with the current time.
pub fn publish_stamp(published: bool, published_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (published, published_at) {
        (true, None) => Some(Utc::now()),
        (_, at) => at,
    }
}

/// slugify
///
/// URL slug for a title or name: lowercase ASCII alphanumerics separated by single dashes.
/// Accented Latin letters fold to their base letter; anything else is a separator.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        let folded = fold_latin(ch.to_lowercase().next().unwrap_or(ch));
        match folded {
            Some(c) if c.is_ascii_alphanumeric() => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            _ => pending_dash = true,
        }
    }

    slug
}

fn fold_latin(ch: char) -> Option<char> {
    if ch.is_ascii() {
        return Some(ch);
    }
    let base = match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(base)
}

fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}
