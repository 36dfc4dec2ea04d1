//! Order endpoints. Customers see and cancel their own orders; support
//! and finance staff see all of them.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse, OrderDto};
use crate::auth::Role;
use crate::db::{OrderLine, PlaceOrder, WriteOutcome};
use crate::domain::OrderStatus;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Order";

/// May read every order.
pub const ORDER_READERS: &[Role] = &[Role::Administrator, Role::CustomerSupport, Role::FinanceTeam];

/// May cancel any order and move it through fulfilment.
pub const ORDER_CANCELLERS: &[Role] = &[Role::Administrator, Role::CustomerSupport];

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i32,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub items: Vec<OrderItemRequest>,
}

/// GET /api/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
) -> Result<Json<ApiResponse<Vec<OrderDto>>>, ApiError> {
    let orders = if caller.has_any(ORDER_READERS) {
        state.store().list_orders().await?
    } else {
        state.store().list_orders_for_user(caller.id()).await?
    };

    Ok(Json(ApiResponse::success(
        orders.into_iter().map(OrderDto::from).collect(),
    )))
}

/// GET /api/orders/{id}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderDto>>, ApiError> {
    let order = state
        .store()
        .get_order_with_items(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    caller.ensure_owner(Some(&order.order.user_id), ORDER_READERS)?;

    Ok(Json(ApiResponse::success(OrderDto::from(order))))
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDto>>), ApiError> {
    if payload.shipping_address.trim().is_empty() {
        return Err(ApiError::validation("Shipping address is required"));
    }
    if payload.items.is_empty() {
        return Err(ApiError::validation("An order needs at least one item"));
    }
    if payload.items.iter().any(|item| item.quantity <= 0) {
        return Err(ApiError::validation("Quantity must be greater than zero"));
    }

    let lines: Vec<OrderLine> = payload
        .items
        .iter()
        .map(|item| OrderLine {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();

    let placed = match state
        .store()
        .place_order(caller.id(), payload.shipping_address, &lines)
        .await?
    {
        PlaceOrder::Placed(placed) => placed,
        PlaceOrder::UnknownProduct(product_id) => {
            return Err(ApiError::validation(format!(
                "Product with ID {product_id} not found"
            )));
        }
        PlaceOrder::InsufficientStock { name, .. } => {
            return Err(ApiError::validation(format!(
                "Insufficient stock for product {name}"
            )));
        }
        PlaceOrder::TotalTooLarge => {
            return Err(ApiError::validation("Order total is too large"));
        }
        PlaceOrder::Conflict => {
            return Err(ApiError::Conflict(
                "Stock changed while the order was placed; please retry".to_string(),
            ));
        }
    };

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Create",
                json!({
                    "orderId": placed.order.id,
                    "orderNumber": placed.order.order_number,
                    "totalCents": placed.order.total_cents,
                    "itemCount": placed.items.len(),
                }),
            )
            .entity(placed.order.id)
            .actor(Some(caller.id())),
        )
        .await;

    metrics::counter!("orders_placed_total").increment(1);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderDto::from(placed))),
    ))
}

/// PUT /api/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let order = state
        .store()
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    caller.ensure_owner(Some(&order.user_id), ORDER_CANCELLERS)?;

    let status: OrderStatus = order.status.parse()?;
    if !status.can_cancel() {
        return Err(ApiError::validation(
            "Order cannot be cancelled in its current state",
        ));
    }

    if state.store().cancel_order(id, order.version).await? == WriteOutcome::Stale {
        let exists = state.store().order_exists(id).await?;
        return Err(ApiError::stale(ENTITY, id, exists));
    }

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Cancel",
                json!({ "orderId": id, "orderNumber": order.order_number, "previousStatus": status }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Order cancelled successfully",
    ))))
}

/// PUT /api/orders/{id}/process
///
/// Hands a pending order to fulfilment.
pub async fn process_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderDto>>, ApiError> {
    advance_order(
        &state,
        &caller,
        &ctx,
        id,
        (OrderStatus::Pending, OrderStatus::Processing),
        "Process",
    )
    .await
}

/// PUT /api/orders/{id}/ship
pub async fn ship_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<OrderDto>>, ApiError> {
    advance_order(
        &state,
        &caller,
        &ctx,
        id,
        (OrderStatus::Processing, OrderStatus::Shipped),
        "Ship",
    )
    .await
}

async fn advance_order(
    state: &AppState,
    caller: &CurrentUser,
    ctx: &RequestContext,
    id: i32,
    (from, to): (OrderStatus, OrderStatus),
    action: &'static str,
) -> Result<Json<ApiResponse<OrderDto>>, ApiError> {
    let order = state
        .store()
        .get_order(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    let status: OrderStatus = order.status.parse()?;
    if status != from {
        return Err(ApiError::validation(format!(
            "Only {from} orders can move to {to}"
        )));
    }

    if state.store().set_order_status(id, order.version, to).await? == WriteOutcome::Stale {
        let exists = state.store().order_exists(id).await?;
        return Err(ApiError::stale(ENTITY, id, exists));
    }

    state
        .auditor()
        .record(
            ctx,
            AuditEvent::new(
                ENTITY,
                action,
                json!({
                    "orderId": id,
                    "orderNumber": order.order_number,
                    "previousStatus": from,
                    "status": to,
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    let updated = state
        .store()
        .get_order_with_items(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    Ok(Json(ApiResponse::success(OrderDto::from(updated))))
}
