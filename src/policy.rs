//! Authorization policies.
//!
//! Each policy is a set of pure decision functions over the acting user and, for
//! row-level checks, the target record. Every function accepts `Option<&AuthUser>`
//! (a plain `&AuthUser` converts) and answers `false` for `None`, so an unresolved
//! identity can never be allowed. Handlers turn a `false` into `AppError::Forbidden`
//! with [`authorize`].

use std::fmt;

use crate::{
    auth::{AuthUser, Role, permissions},
    error::AppError,
    models::{Category, Post},
};

/// Ability
///
/// The operation being authorized; used for denial logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ability {
    ViewAny,
    View,
    Create,
    Update,
    Delete,
    DeleteAny,
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ability::ViewAny => "viewAny",
            Ability::View => "view",
            Ability::Create => "create",
            Ability::Update => "update",
            Ability::Delete => "delete",
            Ability::DeleteAny => "deleteAny",
        };
        f.write_str(name)
    }
}

/// authorize
///
/// Converts a policy decision into a result: `false` becomes `AppError::Forbidden`.
pub fn authorize(
    allowed: bool,
    user: &AuthUser,
    resource: &'static str,
    ability: Ability,
) -> Result<(), AppError> {
    if allowed {
        return Ok(());
    }
    tracing::warn!(user_id = %user.id, resource, %ability, "access denied");
    Err(AppError::Forbidden)
}

const STAFF: &[Role] = &[Role::Admin, Role::Editor];
const WRITERS: &[Role] = &[Role::Admin, Role::Editor, Role::Author];

/// PostPolicy
///
/// Role membership or a named permission for list/create; role or ownership for
/// instance-level access; Admin only for bulk deletion.
pub struct PostPolicy;

impl PostPolicy {
    pub fn view_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| {
            u.has_any_role(WRITERS) || u.has_permission(permissions::VIEW_POSTS)
        })
    }

    pub fn view<'a>(user: impl Into<Option<&'a AuthUser>>, post: &Post) -> bool {
        user.into()
            .is_some_and(|u| u.has_any_role(STAFF) || u.owns(post.user_id))
    }

    pub fn create<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| {
            u.has_any_role(WRITERS) || u.has_permission(permissions::CREATE_POSTS)
        })
    }

    pub fn update<'a>(user: impl Into<Option<&'a AuthUser>>, post: &Post) -> bool {
        Self::view(user, post)
    }

    pub fn delete<'a>(user: impl Into<Option<&'a AuthUser>>, post: &Post) -> bool {
        Self::view(user, post)
    }

    pub fn delete_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_role(Role::Admin))
    }

    /// May the user set a post's owner to someone other than themselves?
    pub fn assign_author<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into()
            .is_some_and(|u| u.has_roles() && !u.has_role(Role::Author))
    }

    /// May the listing be filtered by author? Same rule as [`PostPolicy::assign_author`].
    pub fn filter_by_author<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        Self::assign_author(user)
    }

    /// Authors only ever list their own posts, so the author column is dropped for them.
    pub fn see_author<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| !u.has_role(Role::Author))
    }
}

/// CategoryPolicy
///
/// Role-only; categories have no owner.
pub struct CategoryPolicy;

impl CategoryPolicy {
    pub fn view_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_any_role(STAFF))
    }

    pub fn create<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_any_role(STAFF))
    }

    pub fn delete<'a>(user: impl Into<Option<&'a AuthUser>>, _category: &Category) -> bool {
        user.into().is_some_and(|u| u.has_role(Role::Admin))
    }

    pub fn delete_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_role(Role::Admin))
    }
}

/// TagPolicy
///
/// Anyone who may write posts may list and create the tags attached to them.
pub struct TagPolicy;

impl TagPolicy {
    pub fn view_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        PostPolicy::create(user)
    }

    pub fn create<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        PostPolicy::create(user)
    }
}

/// PermissionPolicy
pub struct PermissionPolicy;

impl PermissionPolicy {
    pub fn view_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_role(Role::Admin))
    }
}

/// RolePolicy
pub struct RolePolicy;

impl RolePolicy {
    pub fn view_any<'a>(user: impl Into<Option<&'a AuthUser>>) -> bool {
        user.into().is_some_and(|u| u.has_role(Role::Admin))
    }
}
