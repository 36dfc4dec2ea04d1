//! Delivery queue. Only orders that are Processing or Shipped are visible
//! here, and each can be closed out as delivered or as a failed delivery.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::audit::customer_directory;
use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState};
use crate::db::WriteOutcome;
use crate::domain::OrderStatus;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Delivery";

const IN_DELIVERY: &[OrderStatus] = &[OrderStatus::Processing, OrderStatus::Shipped];

#[derive(Debug, Serialize)]
pub struct DeliveryOrder {
    pub id: i32,
    pub order_number: String,
    pub shipping_address: String,
    pub status: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryIssueRequest {
    pub issue_description: String,
}

#[derive(Debug, Serialize)]
pub struct DeliveryUpdate {
    pub order_id: i32,
    pub status: OrderStatus,
    pub updated_at: Option<String>,
}

/// GET /api/delivery/orders
pub async fn list_orders_to_deliver(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<DeliveryOrder>>>, ApiError> {
    let orders = state.store().list_orders_in_statuses(IN_DELIVERY).await?;
    let customers =
        customer_directory(&state, orders.iter().map(|o| o.user_id.as_str())).await?;

    let queue = orders
        .into_iter()
        .map(|order| {
            let customer = customers.get(&order.user_id);
            DeliveryOrder {
                id: order.id,
                order_number: order.order_number,
                shipping_address: order.shipping_address,
                status: order.status,
                customer_name: customer.map(|c| c.username.clone()),
                customer_email: customer.map(|c| c.email.clone()),
                created_at: order.created_at,
                updated_at: order.updated_at,
            }
        })
        .collect();

    Ok(Json(ApiResponse::success(queue)))
}

/// POST /api/delivery/{id}/deliver
pub async fn mark_delivered(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<DeliveryUpdate>>, ApiError> {
    let update = close_delivery(
        &state,
        id,
        OrderStatus::Delivered,
        "Order is not in a state that can be delivered",
    )
    .await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(ENTITY, "Deliver", json!({ "orderId": id }))
                .entity(id)
                .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(update)))
}

/// POST /api/delivery/{id}/report-issue
///
/// A failed delivery cancels the order.
pub async fn report_issue(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<DeliveryIssueRequest>,
) -> Result<Json<ApiResponse<DeliveryUpdate>>, ApiError> {
    if payload.issue_description.trim().is_empty() {
        return Err(ApiError::validation("Issue description is required"));
    }

    let update = close_delivery(
        &state,
        id,
        OrderStatus::Cancelled,
        "Cannot report issues for orders that are not in delivery",
    )
    .await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "ReportIssue",
                json!({ "orderId": id, "issueDescription": payload.issue_description }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(update)))
}

async fn close_delivery(
    state: &AppState,
    id: i32,
    target: OrderStatus,
    wrong_state: &str,
) -> Result<DeliveryUpdate, ApiError> {
    let order = state
        .store()
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order", id))?;

    let status: OrderStatus = order.status.parse()?;
    if !status.is_in_delivery() {
        return Err(ApiError::validation(wrong_state));
    }

    if state.store().set_order_status(id, order.version, target).await? == WriteOutcome::Stale {
        let exists = state.store().order_exists(id).await?;
        return Err(ApiError::stale("Order", id, exists));
    }

    let updated = state
        .store()
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order", id))?;

    Ok(DeliveryUpdate {
        order_id: updated.id,
        status: target,
        updated_at: updated.updated_at,
    })
}
