//! # Access Control
//!
//! [`RequestContext`] bundles the acting user with their [`Permissions`] and
//! is passed explicitly into every workflow.
//!
//! Rules:
//! - admin scope: everything.
//! - read: `cloud_controller.read` plus any role in the space.
//! - write: `cloud_controller.write` plus the developer role in the space.
//!
//! A failed read check surfaces as 404 so callers cannot probe for the
//! existence of resources they cannot see; a failed write check on a
//! visible resource is 403.

use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use cc_core::{Guid, SpaceRole, SpaceRoleKind};
use thiserror::Error;

use crate::auth::{Actor, Scopes};
use crate::error::ApiError;
use crate::state::AppState;

/// The actor lacks the scope or space role for an operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("not authorized")]
pub struct NotAuthorized;

/// Kind of access being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Delete,
}

/// What the actor may do, per space.
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    scopes: Scopes,
    roles: HashMap<Guid, Vec<SpaceRoleKind>>,
}

impl Permissions {
    pub fn new(scopes: Scopes, roles: Vec<SpaceRole>) -> Self {
        let mut by_space: HashMap<Guid, Vec<SpaceRoleKind>> = HashMap::new();
        for role in roles {
            by_space.entry(role.space_guid).or_default().push(role.role);
        }
        Self {
            scopes,
            roles: by_space,
        }
    }

    pub fn admin() -> Self {
        Self::new(Scopes::admin(), Vec::new())
    }

    pub fn is_admin(&self) -> bool {
        self.scopes.admin
    }

    pub fn can_read(&self, space_guid: &Guid) -> bool {
        self.is_admin() || (self.scopes.read && self.roles.contains_key(space_guid))
    }

    pub fn can_write(&self, space_guid: &Guid) -> bool {
        self.is_admin()
            || (self.scopes.write
                && self
                    .roles
                    .get(space_guid)
                    .is_some_and(|roles| roles.contains(&SpaceRoleKind::Developer)))
    }

    /// Authorize `op` against a resource in `space_guid`.
    pub fn validate_access(&self, op: Operation, space_guid: &Guid) -> Result<(), NotAuthorized> {
        let allowed = match op {
            Operation::Read => self.can_read(space_guid),
            Operation::Create | Operation::Delete => self.can_write(space_guid),
        };
        if allowed {
            Ok(())
        } else {
            Err(NotAuthorized)
        }
    }

    /// Gate for endpoints that read anything at all.
    pub fn require_read_scope(&self) -> Result<(), NotAuthorized> {
        if self.scopes.can_read() {
            Ok(())
        } else {
            Err(NotAuthorized)
        }
    }

    /// Gate for endpoints that mutate anything at all.
    pub fn require_write_scope(&self) -> Result<(), NotAuthorized> {
        if self.scopes.can_write() {
            Ok(())
        } else {
            Err(NotAuthorized)
        }
    }

    /// Spaces whose resources appear in listings; `None` means all spaces.
    pub fn readable_spaces(&self) -> Option<Vec<Guid>> {
        if self.is_admin() {
            None
        } else if self.scopes.read {
            let mut spaces: Vec<Guid> = self.roles.keys().cloned().collect();
            spaces.sort();
            Some(spaces)
        } else {
            Some(Vec::new())
        }
    }
}

/// Request-scoped actor and authorization decisions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub permissions: Permissions,
}

impl RequestContext {
    pub fn new(actor: Actor, permissions: Permissions) -> Self {
        Self { actor, permissions }
    }

    /// Context for internal callers and tests that bypass authorization.
    pub fn admin() -> Self {
        Self::new(Actor::admin(), Permissions::admin())
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        let permissions = if actor.is_admin() {
            Permissions::admin()
        } else {
            let roles = state.store.space_roles_for(&actor.guid).await?;
            Permissions::new(actor.scopes, roles)
        };
        Ok(Self { actor, permissions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(space: &str, role: SpaceRoleKind) -> SpaceRole {
        SpaceRole {
            user_guid: Guid::from("user"),
            space_guid: Guid::from(space),
            role,
        }
    }

    fn read_write() -> Scopes {
        Scopes {
            read: true,
            write: true,
            admin: false,
        }
    }

    #[test]
    fn developer_reads_and_writes_own_space() {
        let perms = Permissions::new(read_write(), vec![role("dev", SpaceRoleKind::Developer)]);
        let space = Guid::from("dev");
        assert!(perms.validate_access(Operation::Read, &space).is_ok());
        assert!(perms.validate_access(Operation::Create, &space).is_ok());
        assert!(perms.validate_access(Operation::Delete, &space).is_ok());
        assert!(!perms.can_read(&Guid::from("other")));
    }

    #[test]
    fn auditor_reads_but_cannot_write() {
        let perms = Permissions::new(read_write(), vec![role("dev", SpaceRoleKind::Auditor)]);
        let space = Guid::from("dev");
        assert!(perms.can_read(&space));
        assert_eq!(
            perms.validate_access(Operation::Create, &space),
            Err(NotAuthorized)
        );
    }

    #[test]
    fn missing_write_scope_blocks_developer() {
        let scopes = Scopes {
            read: true,
            write: false,
            admin: false,
        };
        let perms = Permissions::new(scopes, vec![role("dev", SpaceRoleKind::Developer)]);
        assert!(!perms.can_write(&Guid::from("dev")));
        assert!(perms.require_write_scope().is_err());
        assert!(perms.require_read_scope().is_ok());
    }

    #[test]
    fn readable_spaces_follow_roles() {
        let perms = Permissions::new(
            read_write(),
            vec![
                role("b", SpaceRoleKind::Manager),
                role("a", SpaceRoleKind::Auditor),
                role("a", SpaceRoleKind::Developer),
            ],
        );
        assert_eq!(
            perms.readable_spaces(),
            Some(vec![Guid::from("a"), Guid::from("b")])
        );
        assert_eq!(Permissions::admin().readable_spaces(), None);
        assert_eq!(
            Permissions::new(Scopes::default(), vec![role("a", SpaceRoleKind::Developer)])
                .readable_spaces(),
            Some(vec![])
        );
    }

    #[test]
    fn admin_is_allowed_everywhere() {
        let perms = Permissions::admin();
        assert!(perms.can_read(&Guid::from("any")));
        assert!(perms.can_write(&Guid::from("any")));
    }
}
