//! Payment endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse, PaymentDto};
use crate::auth::Role;
use crate::db::{NewPayment, WriteOutcome};
use crate::domain::PaymentStatus;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Payment";

/// May read any payment.
pub const PAYMENT_READERS: &[Role] = &[Role::Administrator, Role::FinanceTeam];

/// May pay for someone else's order.
pub const PAYMENT_CREATORS: &[Role] = &[Role::Administrator];

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: i32,
    pub payment_method: String,
    pub amount_cents: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub payment_id: i32,
    pub status: PaymentStatus,
    pub updated_at: Option<String>,
}

/// GET /api/payments
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<PaymentDto>>>, ApiError> {
    let payments = state.store().list_payments().await?;
    Ok(Json(ApiResponse::success(
        payments.into_iter().map(PaymentDto::from).collect(),
    )))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<PaymentDto>>, ApiError> {
    let payment = state
        .store()
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    caller.ensure_owner(Some(&payment.user_id), PAYMENT_READERS)?;

    Ok(Json(ApiResponse::success(PaymentDto::from(payment))))
}

/// GET /api/payments/order/{order_id}
///
/// Ownership follows the user of the first payment on the order.
pub async fn list_payments_for_order(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    Path(order_id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<PaymentDto>>>, ApiError> {
    let payments = state.store().list_payments_for_order(order_id).await?;

    let Some(first) = payments.first() else {
        return Err(ApiError::NotFound(format!(
            "No payments found for order {order_id}"
        )));
    };

    caller.ensure_owner(Some(&first.user_id), PAYMENT_READERS)?;

    Ok(Json(ApiResponse::success(
        payments.into_iter().map(PaymentDto::from).collect(),
    )))
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<Json<ApiResponse<PaymentDto>>, ApiError> {
    if payload.amount_cents <= 0 {
        return Err(ApiError::validation("Amount must be greater than zero"));
    }
    if payload.payment_method.trim().is_empty() {
        return Err(ApiError::validation("Payment method is required"));
    }

    let order = state
        .store()
        .get_order(payload.order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order", payload.order_id))?;

    caller.ensure_owner(Some(&order.user_id), PAYMENT_CREATORS)?;

    let payment = state
        .store()
        .create_payment(NewPayment {
            order_id: order.id,
            user_id: caller.id().to_string(),
            amount_cents: payload.amount_cents,
            payment_method: payload.payment_method,
        })
        .await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Create",
                json!({
                    "id": payment.id,
                    "orderId": payment.order_id,
                    "amountCents": payment.amount_cents,
                    "paymentMethod": payment.payment_method,
                }),
            )
            .entity(payment.id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(PaymentDto::from(payment))))
}

/// POST /api/payments/{id}/refund
pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    payload: Option<Json<RefundRequest>>,
) -> Result<Json<ApiResponse<RefundResponse>>, ApiError> {
    let payment = state
        .store()
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    let status: PaymentStatus = payment.status.parse()?;
    if !status.can_refund() {
        return Err(ApiError::validation(
            "Only completed payments can be refunded",
        ));
    }

    if state.store().refund_payment(&payment).await? == WriteOutcome::Stale {
        let exists = state.store().payment_exists(id).await?;
        return Err(ApiError::stale(ENTITY, id, exists));
    }

    let reason = payload.and_then(|Json(body)| body.reason);

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Refund",
                json!({
                    "paymentId": id,
                    "oldStatus": status,
                    "newStatus": PaymentStatus::Refunded,
                    "reason": reason,
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    let refunded = state
        .store()
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    Ok(Json(ApiResponse::success(RefundResponse {
        payment_id: refunded.id,
        status: PaymentStatus::Refunded,
        updated_at: refunded.updated_at,
    })))
}

/// PUT /api/payments/{id}/status
///
/// Body is the bare status name as a JSON string.
pub async fn update_payment_status(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(new_status): Json<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let new_status: PaymentStatus = new_status
        .parse()
        .map_err(|e: crate::domain::UnknownStatus| ApiError::validation(e.to_string()))?;

    let payment = state
        .store()
        .get_payment(id)
        .await?
        .ok_or_else(|| ApiError::not_found(ENTITY, id))?;

    let old_status: PaymentStatus = payment.status.parse()?;
    if !old_status.is_mutable() {
        return Err(ApiError::validation("Cannot update completed payment"));
    }

    let outcome = state
        .store()
        .set_payment_status(id, payment.version, new_status)
        .await?;

    if outcome == WriteOutcome::Stale {
        let exists = state.store().payment_exists(id).await?;
        return Err(ApiError::stale(ENTITY, id, exists));
    }

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "UpdateStatus",
                json!({ "paymentId": id, "oldStatus": old_status, "newStatus": new_status }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Payment status updated successfully",
    ))))
}
