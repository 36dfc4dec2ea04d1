use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
    sea_query::Expr,
};

use crate::db::WriteOutcome;
use crate::domain::ProductStatus;
use crate::entities::{prelude::*, products, sellers};

#[derive(Debug, Clone)]
pub struct ProductInput {
    pub seller_id: i32,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub stock_quantity: i32,
}

pub struct ProductRepository {
    conn: DatabaseConnection,
}

impl ProductRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list_active(&self) -> Result<Vec<products::Model>> {
        let rows = Products::find()
            .filter(products::Column::IsActive.eq(true))
            .order_by_asc(products::Column::Id)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    /// Every product paired with its seller, for stock overviews.
    pub async fn list_with_sellers(&self) -> Result<Vec<(products::Model, Option<sellers::Model>)>> {
        let rows = Products::find()
            .find_also_related(Sellers)
            .order_by_asc(products::Column::Id)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn get(&self, id: i32) -> Result<Option<products::Model>> {
        Ok(Products::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn exists(&self, id: i32) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    pub async fn create(&self, input: ProductInput) -> Result<products::Model> {
        let model = products::ActiveModel {
            seller_id: Set(input.seller_id),
            name: Set(input.name),
            description: Set(input.description),
            category: Set(input.category),
            price_cents: Set(input.price_cents),
            stock_quantity: Set(input.stock_quantity),
            status: Set(ProductStatus::for_stock(input.stock_quantity).to_string()),
            is_active: Set(true),
            version: Set(1),
            created_at: Set(Utc::now().to_rfc3339()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(model)
    }

    /// Replaces the editable fields if the row is still at `expected_version`.
    pub async fn update(
        &self,
        id: i32,
        expected_version: i32,
        input: ProductInput,
    ) -> Result<WriteOutcome> {
        let status = ProductStatus::for_stock(input.stock_quantity).to_string();

        let result = Products::update_many()
            .col_expr(products::Column::SellerId, Expr::value(input.seller_id))
            .col_expr(products::Column::Name, Expr::value(input.name))
            .col_expr(products::Column::Description, Expr::value(input.description))
            .col_expr(products::Column::Category, Expr::value(input.category))
            .col_expr(products::Column::PriceCents, Expr::value(input.price_cents))
            .col_expr(products::Column::StockQuantity, Expr::value(input.stock_quantity))
            .col_expr(products::Column::Status, Expr::value(status))
            .col_expr(
                products::Column::UpdatedAt,
                Expr::value(Some(Utc::now().to_rfc3339())),
            )
            .col_expr(products::Column::Version, Expr::col(products::Column::Version).add(1))
            .filter(products::Column::Id.eq(id))
            .filter(products::Column::Version.eq(expected_version))
            .exec(&self.conn)
            .await?;

        Ok(WriteOutcome::from_rows(result.rows_affected))
    }

    pub async fn set_stock(
        &self,
        id: i32,
        expected_version: i32,
        stock_quantity: i32,
    ) -> Result<WriteOutcome> {
        let status = ProductStatus::for_stock(stock_quantity).to_string();

        let result = Products::update_many()
            .col_expr(products::Column::StockQuantity, Expr::value(stock_quantity))
            .col_expr(products::Column::Status, Expr::value(status))
            .col_expr(
                products::Column::UpdatedAt,
                Expr::value(Some(Utc::now().to_rfc3339())),
            )
            .col_expr(products::Column::Version, Expr::col(products::Column::Version).add(1))
            .filter(products::Column::Id.eq(id))
            .filter(products::Column::Version.eq(expected_version))
            .exec(&self.conn)
            .await?;

        Ok(WriteOutcome::from_rows(result.rows_affected))
    }

    /// Returns false when the product did not exist.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = Products::delete_by_id(id).exec(&self.conn).await?;
        Ok(result.rows_affected > 0)
    }

    /// Products created or modified inside the window.
    pub async fn list_touched_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<products::Model>> {
        let mut query = Products::find();

        if let Some(from) = from {
            query = query.filter(
                Condition::any()
                    .add(products::Column::CreatedAt.gte(from.clone()))
                    .add(products::Column::UpdatedAt.gte(from)),
            );
        }

        if let Some(to) = to {
            query = query.filter(
                Condition::any()
                    .add(products::Column::CreatedAt.lte(to.clone()))
                    .add(products::Column::UpdatedAt.lte(to)),
            );
        }

        let mut rows = query.all(&self.conn).await?;
        rows.sort_by(|a, b| {
            let a_key = a.updated_at.as_deref().unwrap_or(&a.created_at);
            let b_key = b.updated_at.as_deref().unwrap_or(&b.created_at);
            b_key.cmp(a_key)
        });

        Ok(rows)
    }
}
