use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, PaginatorTrait, QueryFilter,
    QuerySelect, RelationTrait, Set,
};
use tracing::warn;

use crate::auth::{Role, RoleSet};
use crate::entities::{prelude::*, roles, user_roles, users};

pub struct RoleRepository {
    conn: DatabaseConnection,
}

impl RoleRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn role_id(&self, role: Role) -> Result<i32> {
        let row = Roles::find()
            .filter(roles::Column::Name.eq(role.as_str()))
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Role not seeded: {role}"))?;

        Ok(row.id)
    }

    /// Reads the role set straight from the join table; nothing is cached.
    pub async fn roles_for_user(&self, user_id: &str) -> Result<RoleSet> {
        let rows = Roles::find()
            .join(JoinType::InnerJoin, roles::Relation::UserRoles.def())
            .filter(user_roles::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await
            .context("Failed to load user roles")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.name.parse::<Role>() {
                Ok(role) => Some(role),
                Err(e) => {
                    warn!(user_id, "Ignoring {e}");
                    None
                }
            })
            .collect())
    }

    /// Returns false when the identity already held the role.
    pub async fn assign(&self, user_id: &str, role: Role) -> Result<bool> {
        let role_id = self.role_id(role).await?;

        let existing = UserRoles::find_by_id((user_id.to_string(), role_id))
            .one(&self.conn)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        UserRoles::insert(user_roles::ActiveModel {
            user_id: Set(user_id.to_string()),
            role_id: Set(role_id),
        })
        .exec_without_returning(&self.conn)
        .await?;

        Ok(true)
    }

    /// Returns false when the identity did not hold the role.
    pub async fn revoke(&self, user_id: &str, role: Role) -> Result<bool> {
        let role_id = self.role_id(role).await?;

        let result = UserRoles::delete_by_id((user_id.to_string(), role_id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn count_members(&self, role: Role) -> Result<u64> {
        let role_id = self.role_id(role).await?;

        let count = UserRoles::find()
            .filter(user_roles::Column::RoleId.eq(role_id))
            .count(&self.conn)
            .await?;

        Ok(count)
    }

    /// Members whose identity can still sign in.
    pub async fn count_active_members(&self, role: Role) -> Result<u64> {
        let role_id = self.role_id(role).await?;

        let count = UserRoles::find()
            .join(JoinType::InnerJoin, user_roles::Relation::User.def())
            .filter(user_roles::Column::RoleId.eq(role_id))
            .filter(users::Column::IsActive.eq(true))
            .count(&self.conn)
            .await
            .context("Failed to count active role members")?;

        Ok(count)
    }
}
