//! Who may use a project's chat.
//!
//! Membership is decided outside this service. The policy only answers the
//! question; it never grants or revokes anything.

use uuid::Uuid;

use muster_db::{Database, DbError};

pub trait AccessPolicy: Send + Sync {
    fn can_access(&self, db: &Database, project_id: Uuid, user_id: Uuid) -> Result<bool, DbError>;
}

/// Every authenticated user may use every chat. Suitable for a single
/// organization deployment where all accounts are trusted.
pub struct OpenAccess;

impl AccessPolicy for OpenAccess {
    fn can_access(&self, _db: &Database, _project_id: Uuid, _user_id: Uuid) -> Result<bool, DbError> {
        Ok(true)
    }
}

/// Only users listed in `project_members` for the chat's project.
pub struct ProjectRoster;

impl AccessPolicy for ProjectRoster {
    fn can_access(&self, db: &Database, project_id: Uuid, user_id: Uuid) -> Result<bool, DbError> {
        db.is_project_member(project_id, user_id)
    }
}

/// Look up a policy by its config name (`open` or `roster`).
pub fn policy_from_name(name: &str) -> Option<Box<dyn AccessPolicy>> {
    match name {
        "open" => Some(Box::new(OpenAccess)),
        "roster" => Some(Box::new(ProjectRoster)),
        _ => None,
    }
}
