use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{PostFilter, PostScope, PostSort, Repository};
use crate::{
    error::RepoError,
    models::{
        Category, NewCategory, NewPost, Permission, Post, PostSummary, RoleDetail, Tag,
        UpdatePostRequest, User,
    },
};

const POST_COLUMNS: &str = "id, category_id, user_id, image, title, slug, excerpt, content, \
                            published, published_at, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Expected tables:
/// `users`, `roles`, `permissions`, `role_user`, `permission_role`, `permission_user`,
/// `categories`, `tags`, `posts` (FK `category_id` RESTRICT, `user_id`) and
/// `post_tag` (cascades with its post and tag).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn tags_for(&self, post_id: Uuid) -> Vec<Tag> {
        sqlx::query_as::<_, Tag>(
            r#"SELECT t.id, t.name FROM tags t
               JOIN post_tag pt ON pt.tag_id = t.id
               WHERE pt.post_id = $1
               ORDER BY t.name"#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("tags_for error: {:?}", e);
            vec![]
        })
    }
}

/// Appends the row-level visibility restriction to a query over `posts p`.
fn push_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: PostScope) {
    match scope {
        PostScope::All => {}
        PostScope::OwnedBy(owner) => {
            builder.push(" AND p.user_id = ");
            builder.push_bind(owner);
        }
        PostScope::Nothing => {
            builder.push(" AND FALSE");
        }
    }
}

fn order_clause(sort: PostSort) -> &'static str {
    match sort {
        PostSort::Newest => " ORDER BY p.created_at DESC",
        PostSort::TitleAsc => " ORDER BY p.title ASC",
        PostSort::TitleDesc => " ORDER BY p.title DESC",
        PostSort::CategoryAsc => " ORDER BY c.name ASC, p.created_at DESC",
        PostSort::CategoryDesc => " ORDER BY c.name DESC, p.created_at DESC",
    }
}

/// Escapes `LIKE` wildcards so the search text matches literally, then wraps it in `%`.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for ch in search.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn list_posts_query(scope: PostScope, filter: &PostFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT
            p.id, p.title, p.slug, p.image, p.category_id, c.name AS category_name,
            p.user_id, u.name AS author_name,
            COALESCE(ARRAY_AGG(t.name ORDER BY t.name) FILTER (WHERE t.id IS NOT NULL), '{}'::text[]) AS tag_names,
            p.published, p.published_at, p.created_at
        FROM posts p
        JOIN categories c ON c.id = p.category_id
        LEFT JOIN users u ON u.id = p.user_id
        LEFT JOIN post_tag pt ON pt.post_id = p.id
        LEFT JOIN tags t ON t.id = pt.tag_id
        WHERE TRUE
        "#,
    );

    push_scope(&mut builder, scope);

    if let Some(category_id) = filter.category_id {
        builder.push(" AND p.category_id = ");
        builder.push_bind(category_id);
    }

    if let Some(user_id) = filter.user_id {
        builder.push(" AND p.user_id = ");
        builder.push_bind(user_id);
    }

    if let Some(published) = filter.published {
        builder.push(" AND p.published = ");
        builder.push_bind(published);
    }

    if let Some(search) = &filter.search {
        let pattern = like_pattern(search);
        builder.push(" AND (p.title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR c.name ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    builder.push(" GROUP BY p.id, c.name, u.name");
    builder.push(order_clause(filter.sort));
    builder
}

fn get_post_query(id: Uuid, scope: PostScope) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM posts p WHERE p.id = ", POST_COLUMNS));
    builder.push_bind(id);
    push_scope(&mut builder, scope);
    builder
}

fn update_post_query(
    id: Uuid,
    scope: PostScope,
    changes: &UpdatePostRequest,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE posts p SET title = COALESCE(");
    builder.push_bind(changes.title.clone());
    builder.push(", p.title), excerpt = COALESCE(");
    builder.push_bind(changes.excerpt.clone());
    builder.push(", p.excerpt), content = COALESCE(");
    builder.push_bind(changes.content.clone());
    builder.push(", p.content), category_id = COALESCE(");
    builder.push_bind(changes.category_id);
    builder.push(", p.category_id), user_id = COALESCE(");
    builder.push_bind(changes.user_id);
    builder.push(", p.user_id), image = COALESCE(");
    builder.push_bind(changes.image.clone());
    builder.push(", p.image), published = COALESCE(");
    builder.push_bind(changes.published);
    builder.push(", p.published), published_at = COALESCE(");
    builder.push_bind(changes.published_at);
    builder.push(", p.published_at), updated_at = NOW() WHERE p.id = ");
    builder.push_bind(id);
    push_scope(&mut builder, scope);
    builder.push(format!(" RETURNING {}", POST_COLUMNS));
    builder
}

fn delete_posts_query(ids: &[Uuid], scope: PostScope) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("DELETE FROM posts p WHERE p.id = ANY(");
    builder.push_bind(ids.to_vec());
    builder.push(")");
    push_scope(&mut builder, scope);
    builder
}

fn category_in_use(err: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_foreign_key_violation() {
            return RepoError::Conflict("category still has posts".to_string());
        }
    }
    err.into()
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn resolve_roles(&self, user_id: Uuid) -> BTreeSet<String> {
        sqlx::query_scalar::<_, String>(
            r#"SELECT r.name FROM roles r
               JOIN role_user ru ON ru.role_id = r.id
               WHERE ru.user_id = $1"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map(|names| names.into_iter().collect())
        .unwrap_or_else(|e| {
            // Empty set: every policy denies.
            tracing::error!("resolve_roles error: {:?}", e);
            BTreeSet::new()
        })
    }

    async fn resolve_permissions(&self, user_id: Uuid) -> BTreeSet<String> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name FROM permissions p
            JOIN permission_role pr ON pr.permission_id = p.id
            JOIN role_user ru ON ru.role_id = pr.role_id
            WHERE ru.user_id = $1
            UNION
            SELECT p.name FROM permissions p
            JOIN permission_user pu ON pu.permission_id = p.id
            WHERE pu.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map(|names| names.into_iter().collect())
        .unwrap_or_else(|e| {
            tracing::error!("resolve_permissions error: {:?}", e);
            BTreeSet::new()
        })
    }

    /// list_posts
    ///
    /// Builds the listing with QueryBuilder so every filter value is bound, never interpolated.
    /// The scope clause is pushed before any optional filter.
    async fn list_posts(&self, scope: PostScope, filter: &PostFilter) -> Vec<PostSummary> {
        let mut builder = list_posts_query(scope, filter);

        match builder.build_query_as::<PostSummary>().fetch_all(&self.pool).await {
            Ok(posts) => posts,
            Err(e) => {
                tracing::error!("list_posts error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_post(&self, id: Uuid, scope: PostScope) -> Option<Post> {
        let post = get_post_query(id, scope)
            .build_query_as::<Post>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_post error: {:?}", e);
                None
            });

        match post {
            Some(mut post) => {
                post.tags = self.tags_for(post.id).await;
                Some(post)
            }
            None => None,
        }
    }

    /// create_post
    ///
    /// Inserts the post and its tag links in one transaction.
    async fn create_post(&self, new_post: NewPost) -> Result<Post, RepoError> {
        let mut tx = self.pool.begin().await?;

        let mut post = sqlx::query_as::<_, Post>(&format!(
            r#"INSERT INTO posts
                 (id, category_id, user_id, image, title, slug, excerpt, content,
                  published, published_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
               RETURNING {}"#,
            POST_COLUMNS
        ))
        .bind(new_post.id)
        .bind(new_post.category_id)
        .bind(new_post.user_id)
        .bind(&new_post.image)
        .bind(&new_post.title)
        .bind(&new_post.slug)
        .bind(&new_post.excerpt)
        .bind(&new_post.content)
        .bind(new_post.published)
        .bind(new_post.published_at)
        .fetch_one(&mut *tx)
        .await?;

        if !new_post.tag_ids.is_empty() {
            sqlx::query("INSERT INTO post_tag (post_id, tag_id) SELECT $1, UNNEST($2::uuid[])")
                .bind(post.id)
                .bind(&new_post.tag_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        post.tags = self.tags_for(post.id).await;
        Ok(post)
    }

    /// update_post
    ///
    /// `COALESCE` keeps every column whose field in `changes` is `None`. The scope is part of
    /// the `WHERE` clause, so a post that left the caller's scope is not touched.
    async fn update_post(
        &self,
        id: Uuid,
        scope: PostScope,
        changes: UpdatePostRequest,
    ) -> Result<Option<Post>, RepoError> {
        let mut tx = self.pool.begin().await?;

        let updated = update_post_query(id, scope, &changes)
            .build_query_as::<Post>()
            .fetch_optional(&mut *tx)
            .await?;

        let Some(mut post) = updated else {
            return Ok(None);
        };

        if let Some(tag_ids) = &changes.tag_ids {
            sqlx::query("DELETE FROM post_tag WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO post_tag (post_id, tag_id) SELECT $1, UNNEST($2::uuid[])")
                .bind(id)
                .bind(tag_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        post.tags = self.tags_for(post.id).await;
        Ok(Some(post))
    }

    async fn delete_post(&self, id: Uuid, scope: PostScope) -> bool {
        self.delete_posts(&[id], scope).await > 0
    }

    async fn delete_posts(&self, ids: &[Uuid], scope: PostScope) -> u64 {
        match delete_posts_query(ids, scope).build().execute(&self.pool).await {
            Ok(res) => res.rows_affected(),
            Err(e) => {
                tracing::error!("delete_posts error: {:?}", e);
                0
            }
        }
    }

    async fn list_categories(&self, search: Option<String>) -> Vec<Category> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM categories WHERE TRUE");

        if let Some(s) = search {
            let pattern = like_pattern(&s);
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR slug ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        builder.push(" ORDER BY name ASC");

        builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_categories error: {:?}", e);
                vec![]
            })
    }

    async fn get_category(&self, id: Uuid) -> Option<Category> {
        sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_category error: {:?}", e);
                None
            })
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepoError> {
        let created = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3) RETURNING id, name, slug",
        )
        .bind(category.id)
        .bind(&category.name)
        .bind(&category.slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, RepoError> {
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map(|res| res.rows_affected() > 0)
            .map_err(category_in_use)
    }

    async fn delete_categories(&self, ids: &[Uuid]) -> Result<u64, RepoError> {
        sqlx::query("DELETE FROM categories WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await
            .map(|res| res.rows_affected())
            .map_err(category_in_use)
    }

    async fn list_tags(&self) -> Vec<Tag> {
        sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_tags error: {:?}", e);
                vec![]
            })
    }

    async fn create_tag(&self, name: String) -> Result<Tag, RepoError> {
        let tag = sqlx::query_as::<_, Tag>("INSERT INTO tags (id, name) VALUES ($1, $2) RETURNING id, name")
            .bind(Uuid::new_v4())
            .bind(name.trim())
            .fetch_one(&self.pool)
            .await?;
        Ok(tag)
    }

    async fn list_roles(&self) -> Vec<RoleDetail> {
        sqlx::query_as::<_, RoleDetail>(
            r#"
            SELECT r.id, r.name,
                   COALESCE(ARRAY_AGG(p.name ORDER BY p.name) FILTER (WHERE p.id IS NOT NULL), '{}'::text[]) AS permissions
            FROM roles r
            LEFT JOIN permission_role pr ON pr.role_id = r.id
            LEFT JOIN permissions p ON p.id = pr.permission_id
            GROUP BY r.id, r.name
            ORDER BY r.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_roles error: {:?}", e);
            vec![]
        })
    }

    async fn list_permissions(&self) -> Vec<Permission> {
        sqlx::query_as::<_, Permission>("SELECT id, name FROM permissions ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_permissions error: {:?}", e);
                vec![]
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Uuid = Uuid::from_u128(7);

    fn compact(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_push_scope_sql() {
        let scoped = |scope| {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT 1 FROM posts p WHERE TRUE");
            push_scope(&mut builder, scope);
            builder.sql().to_string()
        };

        assert_eq!(scoped(PostScope::All), "SELECT 1 FROM posts p WHERE TRUE");
        assert_eq!(
            scoped(PostScope::OwnedBy(OWNER)),
            "SELECT 1 FROM posts p WHERE TRUE AND p.user_id = $1"
        );
        assert_eq!(scoped(PostScope::Nothing), "SELECT 1 FROM posts p WHERE TRUE AND FALSE");
    }

    #[test]
    fn test_single_post_statements_carry_scope() {
        let get = get_post_query(OWNER, PostScope::OwnedBy(OWNER));
        assert!(get.sql().ends_with("WHERE p.id = $1 AND p.user_id = $2"));

        let delete = delete_posts_query(&[OWNER], PostScope::OwnedBy(OWNER));
        assert_eq!(
            delete.sql(),
            "DELETE FROM posts p WHERE p.id = ANY($1) AND p.user_id = $2"
        );

        let delete_all = delete_posts_query(&[OWNER], PostScope::All);
        assert_eq!(delete_all.sql(), "DELETE FROM posts p WHERE p.id = ANY($1)");

        let update = update_post_query(OWNER, PostScope::OwnedBy(OWNER), &UpdatePostRequest::default());
        let sql = compact(update.sql());
        assert!(sql.starts_with("UPDATE posts p SET title = COALESCE($1, p.title)"));
        assert!(sql.contains("WHERE p.id = $9 AND p.user_id = $10 RETURNING"));

        let update_none = update_post_query(OWNER, PostScope::Nothing, &UpdatePostRequest::default());
        assert!(update_none.sql().contains("WHERE p.id = $9 AND FALSE RETURNING"));
    }

    #[test]
    fn test_list_posts_scope_precedes_filters() {
        let filter = PostFilter {
            user_id: Some(OWNER),
            search: Some("news".to_string()),
            sort: PostSort::TitleDesc,
            ..PostFilter::default()
        };
        let sql = compact(list_posts_query(PostScope::OwnedBy(OWNER), &filter).sql());

        assert!(sql.contains(
            "WHERE TRUE AND p.user_id = $1 AND p.user_id = $2 AND (p.title ILIKE $3 OR c.name ILIKE $4)"
        ));
        assert!(sql.ends_with("GROUP BY p.id, c.name, u.name ORDER BY p.title DESC"));

        let sql = compact(list_posts_query(PostScope::Nothing, &PostFilter::default()).sql());
        assert!(sql.contains("WHERE TRUE AND FALSE GROUP BY"));
    }

    #[test]
    fn test_order_clause() {
        assert_eq!(order_clause(PostSort::Newest), " ORDER BY p.created_at DESC");
        assert_eq!(order_clause(PostSort::TitleAsc), " ORDER BY p.title ASC");
        assert_eq!(order_clause(PostSort::TitleDesc), " ORDER BY p.title DESC");
        assert_eq!(
            order_clause(PostSort::CategoryAsc),
            " ORDER BY c.name ASC, p.created_at DESC"
        );
        assert_eq!(
            order_clause(PostSort::CategoryDesc),
            " ORDER BY c.name DESC, p.created_at DESC"
        );
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("news"), "%news%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("snake_case"), "%snake\\_case%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
