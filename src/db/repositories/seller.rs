use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::{prelude::*, sellers};

#[derive(Debug, Clone)]
pub struct SellerInput {
    pub business_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub tax_id: Option<String>,
    pub owner_user_id: Option<String>,
}

pub struct SellerRepository {
    conn: DatabaseConnection,
}

impl SellerRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list_active(&self) -> Result<Vec<sellers::Model>> {
        let rows = Sellers::find()
            .filter(sellers::Column::IsActive.eq(true))
            .order_by_asc(sellers::Column::BusinessName)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn get(&self, id: i32) -> Result<Option<sellers::Model>> {
        Ok(Sellers::find_by_id(id).one(&self.conn).await?)
    }

    /// Active sellers only; a soft-deleted seller reads as missing.
    pub async fn get_active(&self, id: i32) -> Result<Option<sellers::Model>> {
        Ok(self.get(id).await?.filter(|s| s.is_active))
    }

    pub async fn create(&self, input: SellerInput) -> Result<sellers::Model> {
        let model = sellers::ActiveModel {
            business_name: Set(input.business_name),
            email: Set(input.email),
            phone_number: Set(input.phone_number),
            address: Set(input.address),
            tax_id: Set(input.tax_id),
            owner_user_id: Set(input.owner_user_id),
            is_active: Set(true),
            created_at: Set(Utc::now().to_rfc3339()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(model)
    }

    pub async fn update(&self, id: i32, input: SellerInput) -> Result<Option<sellers::Model>> {
        let Some(existing) = self.get_active(id).await? else {
            return Ok(None);
        };

        let mut active: sellers::ActiveModel = existing.into();
        active.business_name = Set(input.business_name);
        active.email = Set(input.email);
        active.phone_number = Set(input.phone_number);
        active.address = Set(input.address);
        active.tax_id = Set(input.tax_id);
        active.owner_user_id = Set(input.owner_user_id);
        active.updated_at = Set(Some(Utc::now().to_rfc3339()));

        Ok(Some(active.update(&self.conn).await?))
    }

    pub async fn deactivate(&self, id: i32) -> Result<Option<sellers::Model>> {
        let Some(existing) = self.get_active(id).await? else {
            return Ok(None);
        };

        let mut active: sellers::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Some(Utc::now().to_rfc3339()));

        Ok(Some(active.update(&self.conn).await?))
    }
}
