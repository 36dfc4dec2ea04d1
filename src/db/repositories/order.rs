use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use std::collections::HashMap;

use crate::db::WriteOutcome;
use crate::domain::{OrderStatus, ProductStatus, numbers};
use crate::entities::{order_items, orders, prelude::*, products};

#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: orders::Model,
    pub items: Vec<order_items::Model>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderLine {
    pub product_id: i32,
    pub quantity: i32,
}

/// Result of placing an order. Anything but `Placed` rolled back every
/// stock change.
#[derive(Debug)]
pub enum PlaceOrder {
    Placed(OrderWithItems),
    UnknownProduct(i32),
    InsufficientStock { product_id: i32, name: String },
    /// The order total does not fit in `i64` cents.
    TotalTooLarge,
    Conflict,
}

pub struct OrderRepository {
    conn: DatabaseConnection,
}

impl OrderRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    async fn attach_items(&self, rows: Vec<orders::Model>) -> Result<Vec<OrderWithItems>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|o| o.id).collect();
        let items = OrderItems::find()
            .filter(order_items::Column::OrderId.is_in(ids))
            .order_by_asc(order_items::Column::Id)
            .all(&self.conn)
            .await?;

        let mut by_order: HashMap<i32, Vec<order_items::Model>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(rows
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<OrderWithItems>> {
        let rows = Orders::find()
            .order_by_desc(orders::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        self.attach_items(rows).await
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<OrderWithItems>> {
        let rows = Orders::find()
            .filter(orders::Column::UserId.eq(user_id))
            .order_by_desc(orders::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        self.attach_items(rows).await
    }

    pub async fn list_in_statuses(&self, statuses: &[OrderStatus]) -> Result<Vec<orders::Model>> {
        let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();

        let rows = Orders::find()
            .filter(orders::Column::Status.is_in(names))
            .order_by_asc(orders::Column::CreatedAt)
            .all(&self.conn)
            .await?;

        Ok(rows)
    }

    pub async fn list_created_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<orders::Model>> {
        let mut query = Orders::find().order_by_desc(orders::Column::CreatedAt);

        if let Some(from) = from {
            query = query.filter(orders::Column::CreatedAt.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(orders::Column::CreatedAt.lte(to));
        }

        Ok(query.all(&self.conn).await?)
    }

    pub async fn get(&self, id: i32) -> Result<Option<orders::Model>> {
        Ok(Orders::find_by_id(id).one(&self.conn).await?)
    }

    pub async fn get_with_items(&self, id: i32) -> Result<Option<OrderWithItems>> {
        let Some(order) = self.get(id).await? else {
            return Ok(None);
        };

        Ok(self.attach_items(vec![order]).await?.pop())
    }

    pub async fn exists(&self, id: i32) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Reserves stock for every line and records the order in one
    /// transaction. Each stock decrement is guarded by the product version.
    pub async fn place(
        &self,
        user_id: &str,
        shipping_address: String,
        lines: &[OrderLine],
    ) -> Result<PlaceOrder> {
        let txn = self.conn.begin().await?;
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let mut total_cents: i64 = 0;
        let mut priced = Vec::with_capacity(lines.len());

        for line in lines {
            let Some(product) = Products::find_by_id(line.product_id).one(&txn).await? else {
                txn.rollback().await?;
                return Ok(PlaceOrder::UnknownProduct(line.product_id));
            };

            if !product.is_active {
                txn.rollback().await?;
                return Ok(PlaceOrder::UnknownProduct(line.product_id));
            }

            if product.stock_quantity < line.quantity {
                txn.rollback().await?;
                return Ok(PlaceOrder::InsufficientStock {
                    product_id: product.id,
                    name: product.name,
                });
            }

            let Some(total) = product
                .price_cents
                .checked_mul(i64::from(line.quantity))
                .and_then(|line_total| total_cents.checked_add(line_total))
            else {
                txn.rollback().await?;
                return Ok(PlaceOrder::TotalTooLarge);
            };
            total_cents = total;

            let remaining = product.stock_quantity - line.quantity;
            let outcome = reserve_stock(&txn, &product, remaining, &now_str).await?;
            if outcome == WriteOutcome::Stale {
                txn.rollback().await?;
                return Ok(PlaceOrder::Conflict);
            }

            priced.push((line.product_id, line.quantity, product.price_cents));
        }

        let order = orders::ActiveModel {
            order_number: Set(numbers::order_number(now)),
            user_id: Set(user_id.to_string()),
            shipping_address: Set(shipping_address),
            total_cents: Set(total_cents),
            status: Set(OrderStatus::Pending.to_string()),
            version: Set(1),
            created_at: Set(now_str),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for (product_id, quantity, unit_price_cents) in priced {
            let item = order_items::ActiveModel {
                order_id: Set(order.id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price_cents: Set(unit_price_cents),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;
        Ok(PlaceOrder::Placed(OrderWithItems { order, items }))
    }

    /// Moves the order to `status` if it is still at `expected_version`.
    pub async fn set_status(
        &self,
        id: i32,
        expected_version: i32,
        status: OrderStatus,
    ) -> Result<WriteOutcome> {
        let result = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                orders::Column::UpdatedAt,
                Expr::value(Some(Utc::now().to_rfc3339())),
            )
            .col_expr(orders::Column::Version, Expr::col(orders::Column::Version).add(1))
            .filter(orders::Column::Id.eq(id))
            .filter(orders::Column::Version.eq(expected_version))
            .exec(&self.conn)
            .await?;

        Ok(WriteOutcome::from_rows(result.rows_affected))
    }

    /// Cancels the order and returns its reserved quantities to stock.
    pub async fn cancel(&self, id: i32, expected_version: i32) -> Result<WriteOutcome> {
        let txn = self.conn.begin().await?;
        let now = Utc::now().to_rfc3339();

        let result = Orders::update_many()
            .col_expr(orders::Column::Status, Expr::value(OrderStatus::Cancelled.as_str()))
            .col_expr(orders::Column::UpdatedAt, Expr::value(Some(now.clone())))
            .col_expr(orders::Column::Version, Expr::col(orders::Column::Version).add(1))
            .filter(orders::Column::Id.eq(id))
            .filter(orders::Column::Version.eq(expected_version))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(WriteOutcome::Stale);
        }

        let items = OrderItems::find()
            .filter(order_items::Column::OrderId.eq(id))
            .all(&txn)
            .await?;

        for item in items {
            // Vanished products are skipped; there is nothing to restock.
            Products::update_many()
                .col_expr(
                    products::Column::StockQuantity,
                    Expr::col(products::Column::StockQuantity).add(item.quantity),
                )
                .col_expr(
                    products::Column::Status,
                    Expr::value(ProductStatus::InStock.as_str()),
                )
                .col_expr(products::Column::UpdatedAt, Expr::value(Some(now.clone())))
                .col_expr(products::Column::Version, Expr::col(products::Column::Version).add(1))
                .filter(products::Column::Id.eq(item.product_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(WriteOutcome::Applied)
    }
}

async fn reserve_stock(
    txn: &DatabaseTransaction,
    product: &products::Model,
    remaining: i32,
    now: &str,
) -> Result<WriteOutcome> {
    let result = Products::update_many()
        .col_expr(products::Column::StockQuantity, Expr::value(remaining))
        .col_expr(
            products::Column::Status,
            Expr::value(ProductStatus::for_stock(remaining).as_str()),
        )
        .col_expr(products::Column::UpdatedAt, Expr::value(Some(now.to_string())))
        .col_expr(products::Column::Version, Expr::col(products::Column::Version).add(1))
        .filter(products::Column::Id.eq(product.id))
        .filter(products::Column::Version.eq(product.version))
        .exec(txn)
        .await?;

    Ok(WriteOutcome::from_rows(result.rows_affected))
}
