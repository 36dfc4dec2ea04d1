use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;

use crate::auth::{LockoutPolicy, LockoutState, Role};
use crate::entities::{prelude::*, roles, user_roles, users};

/// Identity record without credential material.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for Identity {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            phone_number: model.phone_number,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// What a password sign-in needs to decide its outcome.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: Identity,
    pub password_hash: String,
    pub lockout: LockoutState,
}

impl From<users::Model> for Credentials {
    fn from(model: users::Model) -> Self {
        let lockout = LockoutState {
            failed_count: u32::try_from(model.access_failed_count).unwrap_or(0),
            lockout_end: model.lockout_end.as_deref().and_then(parse_timestamp),
        };
        let password_hash = model.password_hash.clone();

        Self {
            identity: Identity::from(model),
            password_hash,
            lockout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
}

/// Canonical form used for storing and matching emails.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_matches(email: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(users::Column::Email))).eq(normalize_email(email))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Identity>> {
        let user = Users::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(Identity::from))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let user = Users::find()
            .filter(email_matches(email))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(Identity::from))
    }

    pub async fn get_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        let user = Users::find()
            .filter(email_matches(email))
            .one(&self.conn)
            .await
            .context("Failed to query user for sign-in")?;

        Ok(user.map(Credentials::from))
    }

    pub async fn get_credentials_by_id(&self, id: &str) -> Result<Option<Credentials>> {
        let user = Users::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .context("Failed to query user credentials")?;

        Ok(user.map(Credentials::from))
    }

    pub async fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool> {
        let existing = Users::find()
            .filter(
                sea_orm::Condition::any()
                    .add(email_matches(email))
                    .add(
                        Expr::expr(Func::lower(Expr::col(users::Column::Username)))
                            .eq(username.trim().to_lowercase()),
                    ),
            )
            .one(&self.conn)
            .await
            .context("Failed to check for existing user")?;

        Ok(existing.is_some())
    }

    /// Inserts the identity and its initial roles in one transaction.
    pub async fn create(
        &self,
        new: NewIdentity,
        password_hash: String,
        initial_roles: &[Role],
    ) -> Result<Identity> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let txn = self.conn.begin().await?;

        let model = users::ActiveModel {
            id: Set(id.clone()),
            username: Set(new.username),
            email: Set(normalize_email(&new.email)),
            password_hash: Set(password_hash),
            first_name: Set(new.first_name),
            last_name: Set(new.last_name),
            phone_number: Set(new.phone_number),
            is_active: Set(true),
            access_failed_count: Set(0),
            lockout_end: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .context("Failed to insert user")?;

        for role in initial_roles {
            let role_row = Roles::find()
                .filter(roles::Column::Name.eq(role.as_str()))
                .one(&txn)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Role not seeded: {role}"))?;

            UserRoles::insert(user_roles::ActiveModel {
                user_id: Set(id.clone()),
                role_id: Set(role_row.id),
            })
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(Identity::from(model))
    }

    pub async fn record_lockout(&self, id: &str, state: &LockoutState) -> Result<()> {
        Users::update_many()
            .col_expr(
                users::Column::AccessFailedCount,
                Expr::value(i32::try_from(state.failed_count).unwrap_or(i32::MAX)),
            )
            .col_expr(
                users::Column::LockoutEnd,
                Expr::value(state.lockout_end.map(|end| end.to_rfc3339())),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to record lockout state")?;

        Ok(())
    }

    /// Counts one failed password check. The increment runs in SQL inside a
    /// write transaction so concurrent failures are never lost; the attempt
    /// that reaches the limit opens the lockout window and resets the
    /// counter. Returns true for that attempt.
    pub async fn record_failed_sign_in(
        &self,
        id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let txn = self.conn.begin().await?;

        Users::update_many()
            .col_expr(
                users::Column::AccessFailedCount,
                Expr::col(users::Column::AccessFailedCount).add(1),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&txn)
            .await
            .context("Failed to count failed sign-in")?;

        let Some(user) = Users::find_by_id(id.to_string()).one(&txn).await? else {
            txn.rollback().await?;
            return Ok(false);
        };

        let failed_count = u32::try_from(user.access_failed_count).unwrap_or(0);
        let tripped = policy.trips(failed_count);

        if tripped {
            Users::update_many()
                .col_expr(users::Column::AccessFailedCount, Expr::value(0))
                .col_expr(
                    users::Column::LockoutEnd,
                    Expr::value(Some(policy.window_end(now).to_rfc3339())),
                )
                .filter(users::Column::Id.eq(id))
                .exec(&txn)
                .await
                .context("Failed to start lockout window")?;
        }

        txn.commit().await?;
        Ok(tripped)
    }

    pub async fn update_password_hash(&self, id: &str, password_hash: String) -> Result<()> {
        let user = Users::find_by_id(id.to_string())
            .one(&self.conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(password_hash);
        active.updated_at = Set(Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(())
    }

    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Option<Identity>> {
        let Some(user) = Users::find_by_id(id.to_string()).one(&self.conn).await? else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        active.first_name = Set(update.first_name);
        active.last_name = Set(update.last_name);
        active.phone_number = Set(update.phone_number);
        active.updated_at = Set(Utc::now().to_rfc3339());
        let model = active.update(&self.conn).await?;

        Ok(Some(Identity::from(model)))
    }

    /// Returns false when no such identity exists.
    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<bool> {
        let result = Users::update_many()
            .col_expr(users::Column::IsActive, Expr::value(is_active))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(Utc::now().to_rfc3339()),
            )
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
