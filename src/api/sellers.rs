//! Seller directory endpoints. Deletion is a soft deactivate.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse, SellerDto};
use crate::db::SellerInput;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Seller";

#[derive(Debug, Deserialize)]
pub struct SellerRequest {
    pub business_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub owner_user_id: Option<String>,
}

impl SellerRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.business_name.trim().is_empty() {
            return Err(ApiError::validation("Business name is required"));
        }
        if !self.email.contains('@') {
            return Err(ApiError::validation("A valid email is required"));
        }
        Ok(())
    }

    fn into_input(self) -> SellerInput {
        SellerInput {
            business_name: self.business_name,
            email: self.email,
            phone_number: self.phone_number,
            address: self.address,
            tax_id: self.tax_id,
            owner_user_id: self.owner_user_id,
        }
    }
}

fn seller_not_found() -> ApiError {
    ApiError::NotFound("Seller not found".to_string())
}

/// GET /api/sellers
pub async fn list_sellers(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<SellerDto>>>, ApiError> {
    let sellers = state.store().list_sellers().await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(ENTITY, "View", json!({ "action": "ViewAll" }))
                .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(
        sellers.into_iter().map(SellerDto::from).collect(),
    )))
}

/// GET /api/sellers/{id}
pub async fn get_seller(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<SellerDto>>, ApiError> {
    let seller = state
        .store()
        .get_active_seller(id)
        .await?
        .ok_or_else(seller_not_found)?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "View",
                json!({ "sellerId": id, "businessName": seller.business_name }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(SellerDto::from(seller))))
}

/// POST /api/sellers
pub async fn create_seller(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<SellerRequest>,
) -> Result<Json<ApiResponse<SellerDto>>, ApiError> {
    payload.validate()?;

    let seller = state.store().create_seller(payload.into_input()).await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Create",
                json!({
                    "sellerId": seller.id,
                    "businessName": seller.business_name,
                    "email": seller.email,
                }),
            )
            .entity(seller.id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(SellerDto::from(seller))))
}

/// PUT /api/sellers/{id}
pub async fn update_seller(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<SellerRequest>,
) -> Result<Json<ApiResponse<SellerDto>>, ApiError> {
    payload.validate()?;

    let before = state
        .store()
        .get_active_seller(id)
        .await?
        .ok_or_else(seller_not_found)?;

    let seller = state
        .store()
        .update_seller(id, payload.into_input())
        .await?
        .ok_or_else(seller_not_found)?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Update",
                json!({
                    "sellerId": id,
                    "oldSeller": {
                        "businessName": before.business_name,
                        "email": before.email,
                        "phoneNumber": before.phone_number,
                        "address": before.address,
                    },
                    "newSeller": {
                        "businessName": seller.business_name,
                        "email": seller.email,
                        "phoneNumber": seller.phone_number,
                        "address": seller.address,
                    },
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(SellerDto::from(seller))))
}

/// DELETE /api/sellers/{id}
pub async fn delete_seller(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let seller = state
        .store()
        .deactivate_seller(id)
        .await?
        .ok_or_else(seller_not_found)?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Delete",
                json!({ "sellerId": id, "businessName": seller.business_name }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Seller deleted successfully",
    ))))
}
