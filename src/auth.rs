//! Capability checks consumed by the API layer
//!
//! Identity and role management live outside this crate. The API only asks
//! "does this actor hold at least this role on this project?".

use crate::graph::ProjectId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Project roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Admin => "admin",
        })
    }
}

/// Opaque identifier of whoever is calling the API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answers role queries for the API layer
pub trait Authorizer: Send + Sync {
    fn has_role(&self, actor: &ActorId, project: &ProjectId, role: Role) -> bool;
}

/// Grants every request. For single-user tools and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_role(&self, _actor: &ActorId, _project: &ProjectId, _role: Role) -> bool {
        true
    }
}

/// In-memory grants: one role per actor per project
#[derive(Debug, Default)]
pub struct StaticGrants {
    grants: DashMap<(ActorId, ProjectId), Role>,
}

impl StaticGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(self, actor: impl Into<ActorId>, project: ProjectId, role: Role) -> Self {
        self.grant(actor, project, role);
        self
    }

    /// Set an actor's role on a project, replacing any previous grant
    pub fn grant(&self, actor: impl Into<ActorId>, project: ProjectId, role: Role) {
        self.grants.insert((actor.into(), project), role);
    }

    pub fn revoke(&self, actor: &ActorId, project: &ProjectId) -> Option<Role> {
        self.grants
            .remove(&(actor.clone(), *project))
            .map(|(_, role)| role)
    }
}

impl Authorizer for StaticGrants {
    fn has_role(&self, actor: &ActorId, project: &ProjectId, role: Role) -> bool {
        self.grants
            .get(&(actor.clone(), *project))
            .is_some_and(|granted| *granted >= role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_ordered() {
        assert!(Role::Viewer < Role::Editor);
        assert!(Role::Editor < Role::Admin);
    }

    #[test]
    fn higher_role_implies_lower() {
        let project = ProjectId::new();
        let grants = StaticGrants::new().with_grant("ada", project, Role::Editor);
        let ada = ActorId::from("ada");

        assert!(grants.has_role(&ada, &project, Role::Viewer));
        assert!(grants.has_role(&ada, &project, Role::Editor));
        assert!(!grants.has_role(&ada, &project, Role::Admin));
        assert!(!grants.has_role(&ada, &ProjectId::new(), Role::Viewer));
        assert!(!grants.has_role(&ActorId::from("bob"), &project, Role::Viewer));
    }

    #[test]
    fn revoke_removes_access() {
        let project = ProjectId::new();
        let grants = StaticGrants::new().with_grant("ada", project, Role::Admin);
        let ada = ActorId::from("ada");

        assert_eq!(grants.revoke(&ada, &project), Some(Role::Admin));
        assert!(!grants.has_role(&ada, &project, Role::Viewer));
    }
}
