//! Read-only reports for the audit team.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, AuditLogDto, DateRangeQuery};
use crate::db::{AuditFilter, Identity};

const DEFAULT_LOG_LIMIT: u64 = 100;
const MAX_LOG_LIMIT: u64 = 1000;

#[derive(Debug, Serialize)]
pub struct OrderReportRow {
    pub id: i32,
    pub order_number: String,
    pub total_cents: i64,
    pub status: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionReportRow {
    pub id: i32,
    pub payment_number: String,
    pub amount_cents: i64,
    pub status: String,
    pub payment_method: String,
    pub transaction_id: Option<String>,
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InventoryReportRow {
    pub id: i32,
    pub name: String,
    pub stock_quantity: i32,
    pub category: String,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    #[serde(alias = "entityName")]
    pub entity_name: Option<String>,
    pub action: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: Option<String>,
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
    pub limit: Option<u64>,
}

/// Resolves each distinct user id once. Ids that no longer resolve are
/// simply absent from the map.
pub(super) async fn customer_directory<'a>(
    state: &AppState,
    user_ids: impl Iterator<Item = &'a str>,
) -> Result<HashMap<String, Identity>, ApiError> {
    let mut directory = HashMap::new();
    for user_id in user_ids {
        if directory.contains_key(user_id) {
            continue;
        }
        if let Some(user) = state.store().get_user(user_id).await? {
            directory.insert(user_id.to_string(), user);
        }
    }
    Ok(directory)
}

/// GET /api/audit/orders
pub async fn order_report(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ApiResponse<Vec<OrderReportRow>>>, ApiError> {
    let (from, to) = range.bounds()?;
    let orders = state.store().list_orders_created_between(from, to).await?;
    let customers =
        customer_directory(&state, orders.iter().map(|o| o.user_id.as_str())).await?;

    let rows = orders
        .into_iter()
        .map(|order| {
            let customer = customers.get(&order.user_id);
            OrderReportRow {
                id: order.id,
                order_number: order.order_number,
                total_cents: order.total_cents,
                status: order.status,
                customer_name: customer.map(|c| c.username.clone()),
                customer_email: customer.map(|c| c.email.clone()),
                created_at: order.created_at,
                updated_at: order.updated_at,
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(rows)))
}

/// GET /api/audit/transactions
///
/// The customer is the owner of the paid order, not the payer.
pub async fn transaction_report(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ApiResponse<Vec<TransactionReportRow>>>, ApiError> {
    let (from, to) = range.bounds()?;
    let payments = state.store().list_payments_created_between(from, to).await?;

    let mut orders = HashMap::new();
    for payment in &payments {
        if orders.contains_key(&payment.order_id) {
            continue;
        }
        if let Some(order) = state.store().get_order(payment.order_id).await? {
            orders.insert(payment.order_id, order);
        }
    }
    let customers =
        customer_directory(&state, orders.values().map(|o| o.user_id.as_str())).await?;

    let rows = payments
        .into_iter()
        .map(|payment| {
            let order = orders.get(&payment.order_id);
            let customer = order.and_then(|o| customers.get(&o.user_id));
            TransactionReportRow {
                id: payment.id,
                payment_number: payment.payment_number,
                amount_cents: payment.amount_cents,
                status: payment.status,
                payment_method: payment.payment_method,
                transaction_id: payment.transaction_id,
                order_number: order.map(|o| o.order_number.clone()),
                customer_name: customer.map(|c| c.username.clone()),
                customer_email: customer.map(|c| c.email.clone()),
                created_at: payment.created_at,
                updated_at: payment.updated_at,
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(rows)))
}

/// GET /api/audit/inventory
pub async fn inventory_report(
    State(state): State<Arc<AppState>>,
    Query(range): Query<DateRangeQuery>,
) -> Result<Json<ApiResponse<Vec<InventoryReportRow>>>, ApiError> {
    let (from, to) = range.bounds()?;
    let products = state.store().list_products_touched_between(from, to).await?;

    let rows = products
        .into_iter()
        .map(|product| InventoryReportRow {
            id: product.id,
            name: product.name,
            stock_quantity: product.stock_quantity,
            category: product.category,
            created_at: product.created_at,
            updated_at: product.updated_at,
            is_active: product.is_active,
        })
        .collect();

    Ok(Json(ApiResponse::success(rows)))
}

/// GET /api/audit/logs
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogDto>>>, ApiError> {
    let (from, to) = DateRangeQuery {
        start_date: query.start_date,
        end_date: query.end_date,
    }
    .bounds()?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);

    let entries = state
        .store()
        .list_audit(AuditFilter {
            entity_name: query.entity_name,
            action: query.action,
            user_id: query.user_id,
            from,
            to,
            limit: Some(limit),
        })
        .await?;

    Ok(Json(ApiResponse::success(
        entries.into_iter().map(AuditLogDto::from).collect(),
    )))
}
