use std::sync::Arc;

use tracing::info;

use mission_db::Database;
use mission_types::{Registration, User};

use crate::error::{Result, require_name};

/// Creates and resolves users by their unique name. There are no passwords:
/// knowing a name is enough to act as that user.
pub struct IdentityManager {
    db: Arc<Database>,
}

impl IdentityManager {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn register(&self, name: &str) -> Result<Registration> {
        let name = require_name(name, "User name")?;

        if let Some(existing) = self.db.get_user_by_name(name)? {
            return Ok(Registration::AlreadyExists(User::try_from(existing)?));
        }

        let user_id = self.db.create_user(name)?;
        let row = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", user_id))?;
        let user = User::try_from(row)?;

        info!(user_id = %user.id, name = %user.name, "User registered");
        Ok(Registration::Created(user))
    }

    /// Resolves a name to its identity handle; `None` when nobody has that name.
    pub fn authenticate(&self, name: &str) -> Result<Option<User>> {
        let name = require_name(name, "User name")?;

        let Some(row) = self.db.get_user_by_name(name)? else {
            return Ok(None);
        };
        let user = User::try_from(row)?;

        info!(user_id = %user.id, name = %user.name, "User logged in");
        Ok(Some(user))
    }
}
