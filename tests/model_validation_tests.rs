use blog_admin::{
    models::{
        CreateCategoryRequest, CreatePostRequest, CreateTagRequest, NewCategory, NewPost,
        PostSummary, UpdatePostRequest, publish_stamp, slugify,
    },
    repository::PostSort,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

// --- Slugs ---

#[test]
fn test_slugify_basic_titles() {
    assert_eq!(slugify("Hola Mundo!"), "hola-mundo");
    assert_eq!(slugify("  Rust   2024: what's new?  "), "rust-2024-what-s-new");
    assert_eq!(slugify("already-a-slug"), "already-a-slug");
}

#[test]
fn test_slugify_folds_accents_and_drops_symbols() {
    assert_eq!(slugify("Categoría Ñandú"), "categoria-nandu");
    assert_eq!(slugify("Crème brûlée"), "creme-brulee");
    assert_eq!(slugify("---"), "");
    assert_eq!(slugify("日本"), "");
}

// --- Post payloads ---

fn post_request() -> CreatePostRequest {
    CreatePostRequest {
        title: "A title".to_string(),
        excerpt: "An excerpt".to_string(),
        content: "Some content".to_string(),
        category_id: Uuid::new_v4(),
        ..CreatePostRequest::default()
    }
}

#[test]
fn test_create_post_validation() {
    assert!(post_request().validate().is_ok());

    let blank_title = CreatePostRequest {
        title: "  ".to_string(),
        ..post_request()
    };
    assert!(blank_title.validate().is_err());

    let blank_content = CreatePostRequest {
        content: String::new(),
        ..post_request()
    };
    assert!(blank_content.validate().unwrap_err().contains("content"));

    let symbol_title = CreatePostRequest {
        title: "!!!".to_string(),
        ..post_request()
    };
    assert!(symbol_title.validate().is_err());

    let symbol_title_with_slug = CreatePostRequest {
        title: "!!!".to_string(),
        slug: Some("exclamations".to_string()),
        ..post_request()
    };
    assert!(symbol_title_with_slug.validate().is_ok());
}

#[test]
fn test_create_post_request_defaults_from_json() {
    let body = format!(
        r#"{{"title":"T","excerpt":"E","content":"C","category_id":"{}"}}"#,
        Uuid::nil()
    );
    let req: CreatePostRequest = serde_json::from_str(&body).unwrap();

    assert!(!req.published);
    assert!(req.tag_ids.is_empty());
    assert!(req.user_id.is_none());
    assert!(req.slug.is_none());
}

#[test]
fn test_update_post_validation_only_checks_present_fields() {
    assert!(UpdatePostRequest::default().validate().is_ok());

    let blank = UpdatePostRequest {
        excerpt: Some(" ".to_string()),
        ..UpdatePostRequest::default()
    };
    assert!(blank.validate().is_err());
}

#[test]
fn test_new_post_from_request() {
    let owner = Uuid::new_v4();
    let req = CreatePostRequest {
        title: "  Primer Post  ".to_string(),
        published: true,
        ..post_request()
    };

    let new_post = NewPost::from_request(req, owner);

    assert_eq!(new_post.user_id, owner);
    assert_eq!(new_post.title, "Primer Post");
    assert_eq!(new_post.slug, "primer-post");
    assert!(new_post.published_at.is_some());

    let explicit = CreatePostRequest {
        slug: Some("Custom Slug".to_string()),
        ..post_request()
    };
    let new_post = NewPost::from_request(explicit, owner);
    assert_eq!(new_post.slug, "custom-slug");
    assert!(new_post.published_at.is_none());
}

#[test]
fn test_publish_stamp() {
    let earlier = Utc::now() - Duration::days(3);

    assert!(publish_stamp(true, None).is_some());
    assert_eq!(publish_stamp(true, Some(earlier)), Some(earlier));
    assert_eq!(publish_stamp(false, Some(earlier)), Some(earlier));
    assert_eq!(publish_stamp(false, None), None);
}

// --- Categories and tags ---

#[test]
fn test_category_name_length_bounds() {
    let named = |name: &str| CreateCategoryRequest {
        name: name.to_string(),
        slug: None,
    };

    assert!(named("News").validate().is_ok());
    assert!(named("Art").validate().is_err());
    // Surrounding whitespace does not count.
    assert!(named("  Art  ").validate().is_err());
    assert!(named(&"x".repeat(200)).validate().is_ok());
    assert!(named(&"x".repeat(201)).validate().is_err());
    // Length is counted in characters, not bytes.
    assert!(named("Ñañú").validate().is_ok());
}

#[test]
fn test_new_category_derives_slug() {
    let category = NewCategory::from(CreateCategoryRequest {
        name: "  Tech News ".to_string(),
        slug: None,
    });
    assert_eq!(category.name, "Tech News");
    assert_eq!(category.slug, "tech-news");

    let category = NewCategory::from(CreateCategoryRequest {
        name: "Tech News".to_string(),
        slug: Some("tech".to_string()),
    });
    assert_eq!(category.slug, "tech");
}

#[test]
fn test_tag_name_required() {
    assert!(CreateTagRequest { name: "rust".to_string() }.validate().is_ok());
    assert!(CreateTagRequest { name: "   ".to_string() }.validate().is_err());
}

// --- Serialization ---

#[test]
fn test_post_summary_omits_hidden_author() {
    let summary = PostSummary {
        title: "Hidden".to_string(),
        ..PostSummary::default()
    };
    let json = serde_json::to_value(&summary).unwrap();
    assert!(json.get("author_name").is_none());

    let summary = PostSummary {
        author_name: Some("Ana".to_string()),
        ..summary
    };
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["author_name"], "Ana");
}

#[test]
fn test_post_sort_accepts_listing_keys() {
    let parse = |raw: &str| serde_json::from_str::<PostSort>(&format!("\"{}\"", raw));

    assert_eq!(parse("created").unwrap(), PostSort::Newest);
    assert_eq!(parse("title").unwrap(), PostSort::TitleAsc);
    assert_eq!(parse("-title").unwrap(), PostSort::TitleDesc);
    assert_eq!(parse("category").unwrap(), PostSort::CategoryAsc);
    assert_eq!(parse("-category").unwrap(), PostSort::CategoryDesc);
    assert!(parse("random").is_err());
    assert_eq!(PostSort::default(), PostSort::Newest);
}
