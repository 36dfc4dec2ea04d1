use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait, sea_query::Expr,
};

use crate::db::WriteOutcome;
use crate::domain::{OrderStatus, PaymentStatus, numbers};
use crate::entities::{orders, payments, prelude::*};

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i32,
    pub user_id: String,
    pub amount_cents: i64,
    pub payment_method: String,
}

pub struct PaymentRepository {
    conn: DatabaseConnection,
}

impl PaymentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list_all(&self) -> Result<Vec<payments::Model>> {
        let rows = Payments::find()
            .order_by_desc(payments::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_by_order(&self, order_id: i32) -> Result<Vec<payments::Model>> {
        let rows = Payments::find()
            .filter(payments::Column::OrderId.eq(order_id))
            .order_by_asc(payments::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_created_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<payments::Model>> {
        let mut query = Payments::find().order_by_desc(payments::Column::CreatedAt);

        if let Some(from) = from {
            query = query.filter(payments::Column::CreatedAt.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(payments::Column::CreatedAt.lte(to));
        }

        Ok(query.all(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<payments::Model>> {
        Ok(Payments::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn exists(&self, id: i32) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    pub async fn create(&self, new: NewPayment) -> Result<payments::Model> {
        let now = Utc::now();

        let model = payments::ActiveModel {
            payment_number: Set(numbers::payment_number(now)),
            order_id: Set(new.order_id),
            user_id: Set(new.user_id),
            amount_cents: Set(new.amount_cents),
            payment_method: Set(new.payment_method),
            status: Set(PaymentStatus::Pending.to_string()),
            transaction_id: Set(None),
            version: Set(1),
            created_at: Set(now.to_rfc3339()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&self.conn)
        .await?;

        Ok(model)
    }

    pub async fn set_status(
        &self,
        id: i32,
        expected_version: i32,
        status: PaymentStatus,
    ) -> Result<WriteOutcome> {
        let result = Payments::update_many()
            .col_expr(payments::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                payments::Column::UpdatedAt,
                Expr::value(Some(Utc::now().to_rfc3339())),
            )
            .col_expr(payments::Column::Version, Expr::col(payments::Column::Version).add(1))
            .filter(payments::Column::Id.eq(id))
            .filter(payments::Column::Version.eq(expected_version))
            .exec(&self.conn)
            .await?;

        Ok(WriteOutcome::from_rows(result.rows_affected))
    }

    /// Marks the payment and its order refunded together. The order update
    /// is unconditional; only the payment row carries the version guard.
    pub async fn refund(&self, payment: &payments::Model) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;
        let now = Utc::now().to_rfc3339();

        let result = Payments::update_many()
            .col_expr(
                payments::Column::Status,
                Expr::value(PaymentStatus::Refunded.as_str()),
            )
            .col_expr(payments::Column::UpdatedAt, Expr::value(Some(now.clone())))
            .col_expr(payments::Column::Version, Expr::col(payments::Column::Version).add(1))
            .filter(payments::Column::Id.eq(payment.id))
            .filter(payments::Column::Version.eq(payment.version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(WriteOutcome::Stale);
        }

        Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Refunded.as_str()))
            .col_expr(orders::Column::UpdatedAt, Expr::value(Some(now)))
            .col_expr(orders::Column::Version, Expr::col(orders::Column::Version).add(1))
            .filter(orders::Column::Id.eq(payment.order_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(WriteOutcome::Applied)
    }
}
