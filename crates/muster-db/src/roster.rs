//! Project membership, owned by the project service. The chat server only
//! reads it; the write helpers exist for seeding and tests.

use uuid::Uuid;

use crate::{Database, Result};

impl Database {
    pub fn is_project_member(&self, project_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let member = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2)",
                [project_id.to_string(), user_id.to_string()],
                |r| r.get(0),
            )?;
            Ok(member)
        })
    }

    pub fn add_project_member(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO project_members (project_id, user_id) VALUES (?1, ?2)",
                [project_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn remove_project_member(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                [project_id.to_string(), user_id.to_string()],
            )?;
            Ok(())
        })
    }
}
