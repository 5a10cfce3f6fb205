use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{PostFilter, PostScope, PostSort, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, NewCategory, NewPost, Permission, Post, PostSummary, RoleDetail, Tag,
        UpdatePostRequest, User,
    },
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    // role name -> role id
    roles: BTreeMap<String, i64>,
    // permission name -> permission id
    permissions: BTreeMap<String, i64>,
    user_roles: HashMap<Uuid, BTreeSet<String>>,
    role_permissions: HashMap<String, BTreeSet<String>>,
    user_permissions: HashMap<Uuid, BTreeSet<String>>,
    categories: HashMap<Uuid, Category>,
    tags: HashMap<Uuid, Tag>,
    posts: HashMap<Uuid, Post>,
}

impl Tables {
    fn next_id(map: &BTreeMap<String, i64>) -> i64 {
        map.values().max().copied().unwrap_or(0) + 1
    }

    fn ensure_role(&mut self, name: &str) {
        if !self.roles.contains_key(name) {
            let id = Self::next_id(&self.roles);
            self.roles.insert(name.to_string(), id);
        }
    }

    fn ensure_permission(&mut self, name: &str) {
        if !self.permissions.contains_key(name) {
            let id = Self::next_id(&self.permissions);
            self.permissions.insert(name.to_string(), id);
        }
    }

    fn resolve_tags(&self, ids: &[Uuid]) -> Result<Vec<Tag>, RepoError> {
        let mut tags = ids
            .iter()
            .map(|id| {
                self.tags
                    .get(id)
                    .cloned()
                    .ok_or_else(|| RepoError::MissingReference(format!("tag {}", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags.dedup_by_key(|t| t.id);
        Ok(tags)
    }

    fn check_references(&self, category_id: Option<Uuid>, user_id: Option<Uuid>) -> Result<(), RepoError> {
        if let Some(id) = category_id {
            if !self.categories.contains_key(&id) {
                return Err(RepoError::MissingReference(format!("category {}", id)));
            }
        }
        if let Some(id) = user_id {
            if !self.users.contains_key(&id) {
                return Err(RepoError::MissingReference(format!("user {}", id)));
            }
        }
        Ok(())
    }

    fn summarize(&self, post: &Post) -> PostSummary {
        PostSummary {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
            image: post.image.clone(),
            category_id: post.category_id,
            category_name: self
                .categories
                .get(&post.category_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            user_id: post.user_id,
            author_name: self.users.get(&post.user_id).map(|u| u.name.clone()),
            tag_names: post.tags.iter().map(|t| t.name.clone()).collect(),
            published: post.published,
            published_at: post.published_at,
            created_at: post.created_at,
        }
    }
}

/// MemoryRepository
///
/// In-process `Repository` with the same scoping, uniqueness and reference rules as the
/// Postgres implementation. Used by the test suite and for running the API without a database.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Seeding ---

    /// Inserts a user holding the given roles.
    pub fn add_user(&self, user: User, roles: &[&str]) {
        let mut tables = self.write();
        for role in roles {
            tables.ensure_role(role);
        }
        tables
            .user_roles
            .insert(user.id, roles.iter().map(|r| r.to_string()).collect());
        tables.users.insert(user.id, user);
    }

    pub fn grant_role_permission(&self, role: &str, permission: &str) {
        let mut tables = self.write();
        tables.ensure_role(role);
        tables.ensure_permission(permission);
        tables
            .role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(permission.to_string());
    }

    /// Grants a permission to one user outside any role.
    pub fn grant_user_permission(&self, user_id: Uuid, permission: &str) {
        let mut tables = self.write();
        tables.ensure_permission(permission);
        tables
            .user_permissions
            .entry(user_id)
            .or_default()
            .insert(permission.to_string());
    }

    pub fn add_category(&self, category: Category) {
        self.write().categories.insert(category.id, category);
    }

    pub fn add_tag(&self, tag: Tag) {
        self.write().tags.insert(tag.id, tag);
    }

    pub fn add_post(&self, post: Post) {
        self.write().posts.insert(post.id, post);
    }

    pub fn post_count(&self) -> usize {
        self.read().posts.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.read().users.get(&id).cloned()
    }

    async fn resolve_roles(&self, user_id: Uuid) -> BTreeSet<String> {
        self.read().user_roles.get(&user_id).cloned().unwrap_or_default()
    }

    async fn resolve_permissions(&self, user_id: Uuid) -> BTreeSet<String> {
        let tables = self.read();
        let mut granted: BTreeSet<String> = tables
            .user_permissions
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        if let Some(roles) = tables.user_roles.get(&user_id) {
            for role in roles {
                if let Some(perms) = tables.role_permissions.get(role) {
                    granted.extend(perms.iter().cloned());
                }
            }
        }
        granted
    }

    async fn list_posts(&self, scope: PostScope, filter: &PostFilter) -> Vec<PostSummary> {
        let tables = self.read();
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut posts: Vec<PostSummary> = tables
            .posts
            .values()
            .filter(|p| scope.permits(p.user_id))
            .filter(|p| filter.category_id.is_none_or(|id| p.category_id == id))
            .filter(|p| filter.user_id.is_none_or(|id| p.user_id == id))
            .filter(|p| filter.published.is_none_or(|flag| p.published == flag))
            .map(|p| tables.summarize(p))
            .filter(|s| {
                needle.as_ref().is_none_or(|n| {
                    s.title.to_lowercase().contains(n) || s.category_name.to_lowercase().contains(n)
                })
            })
            .collect();

        match filter.sort {
            PostSort::Newest => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PostSort::TitleAsc => posts.sort_by(|a, b| a.title.cmp(&b.title)),
            PostSort::TitleDesc => posts.sort_by(|a, b| b.title.cmp(&a.title)),
            PostSort::CategoryAsc => posts.sort_by(|a, b| a.category_name.cmp(&b.category_name)),
            PostSort::CategoryDesc => posts.sort_by(|a, b| b.category_name.cmp(&a.category_name)),
        }

        posts
    }

    async fn get_post(&self, id: Uuid, scope: PostScope) -> Option<Post> {
        self.read()
            .posts
            .get(&id)
            .filter(|p| scope.permits(p.user_id))
            .cloned()
    }

    async fn create_post(&self, new_post: NewPost) -> Result<Post, RepoError> {
        let mut tables = self.write();
        tables.check_references(Some(new_post.category_id), Some(new_post.user_id))?;
        if tables.posts.values().any(|p| p.slug == new_post.slug) {
            return Err(RepoError::Conflict(format!("slug {}", new_post.slug)));
        }
        let tags = tables.resolve_tags(&new_post.tag_ids)?;

        let now = Utc::now();
        let post = Post {
            id: new_post.id,
            category_id: new_post.category_id,
            user_id: new_post.user_id,
            image: new_post.image,
            title: new_post.title,
            slug: new_post.slug,
            excerpt: new_post.excerpt,
            content: new_post.content,
            published: new_post.published,
            published_at: new_post.published_at,
            tags,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(
        &self,
        id: Uuid,
        scope: PostScope,
        changes: UpdatePostRequest,
    ) -> Result<Option<Post>, RepoError> {
        let mut tables = self.write();
        tables.check_references(changes.category_id, changes.user_id)?;
        let tags = match &changes.tag_ids {
            Some(ids) => Some(tables.resolve_tags(ids)?),
            None => None,
        };

        let Some(post) = tables
            .posts
            .get_mut(&id)
            .filter(|p| scope.permits(p.user_id))
        else {
            return Ok(None);
        };

        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(excerpt) = changes.excerpt {
            post.excerpt = excerpt;
        }
        if let Some(content) = changes.content {
            post.content = content;
        }
        if let Some(category_id) = changes.category_id {
            post.category_id = category_id;
        }
        if let Some(user_id) = changes.user_id {
            post.user_id = user_id;
        }
        if let Some(image) = changes.image {
            post.image = Some(image);
        }
        if let Some(published) = changes.published {
            post.published = published;
        }
        if let Some(published_at) = changes.published_at {
            post.published_at = Some(published_at);
        }
        if let Some(tags) = tags {
            post.tags = tags;
        }
        post.updated_at = Utc::now();

        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid, scope: PostScope) -> bool {
        self.delete_posts(&[id], scope).await > 0
    }

    async fn delete_posts(&self, ids: &[Uuid], scope: PostScope) -> u64 {
        let mut tables = self.write();
        let mut deleted = 0;
        for id in ids {
            let in_scope = tables.posts.get(id).is_some_and(|p| scope.permits(p.user_id));
            if in_scope && tables.posts.remove(id).is_some() {
                deleted += 1;
            }
        }
        deleted
    }

    async fn list_categories(&self, search: Option<String>) -> Vec<Category> {
        let needle = search.map(|s| s.to_lowercase());
        let mut categories: Vec<Category> = self
            .read()
            .categories
            .values()
            .filter(|c| {
                needle.as_ref().is_none_or(|n| {
                    c.name.to_lowercase().contains(n) || c.slug.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        categories
    }

    async fn get_category(&self, id: Uuid) -> Option<Category> {
        self.read().categories.get(&id).cloned()
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepoError> {
        let mut tables = self.write();
        if let Some(existing) = tables
            .categories
            .values()
            .find(|c| c.name == category.name || c.slug == category.slug)
        {
            return Err(RepoError::Conflict(format!("category {}", existing.name)));
        }
        let created = Category {
            id: category.id,
            name: category.name,
            slug: category.slug,
        };
        tables.categories.insert(created.id, created.clone());
        Ok(created)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, RepoError> {
        self.delete_categories(&[id]).await.map(|n| n > 0)
    }

    async fn delete_categories(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        let mut tables = self.write();
        // All or nothing, like a single DELETE statement hitting the RESTRICT key.
        if tables.posts.values().any(|p| ids.contains(&p.category_id)) {
            return Err(RepoError::Conflict("category still has posts".to_string()));
        }
        let deleted = ids
            .iter()
            .filter(|id| tables.categories.remove(*id).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn list_tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = self.read().tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    async fn create_tag(&self, name: String) -> Result<Tag, RepoError> {
        let name = name.trim().to_string();
        let mut tables = self.write();
        if tables.tags.values().any(|t| t.name == name) {
            return Err(RepoError::Conflict(format!("tag {}", name)));
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name,
        };
        tables.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn list_roles(&self) -> Vec<RoleDetail> {
        let tables = self.read();
        tables
            .roles
            .iter()
            .map(|(name, id)| RoleDetail {
                id: *id,
                name: name.clone(),
                permissions: tables
                    .role_permissions
                    .get(name)
                    .map(|perms| perms.iter().cloned().collect())
                    .unwrap_or_default(),
            })
            .collect()
    }

    async fn list_permissions(&self) -> Vec<Permission> {
        self.read()
            .permissions
            .iter()
            .map(|(name, id)| Permission {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }
}
