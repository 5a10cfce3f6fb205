//! Router Module Index
//!
//! Splits the API by who may reach it. Authentication is enforced by the `AuthUser`
//! extractor; per-entity authorization is decided inside each handler by the policies.

/// Routes accessible to anyone (monitoring).
pub mod public;

/// Routes behind the `auth_middleware` layer: profile, posts and tags.
pub mod authenticated;

/// Administrative metadata: categories, roles and permissions, nested under `/admin`.
pub mod admin;
