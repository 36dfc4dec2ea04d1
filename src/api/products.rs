//! Product catalog endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse, ProductDto};
use crate::db::{ProductInput, WriteOutcome};
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Product";

/// Upper bound on a unit price, in cents.
pub const MAX_PRICE_CENTS: i64 = 100_000_000_000;

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub seller_id: i32,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub stock_quantity: i32,
    /// Version the client last read; defaults to the current one.
    #[serde(default)]
    pub version: Option<i32>,
}

impl ProductRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::validation("Product name is required"));
        }
        if self.price_cents < 0 {
            return Err(ApiError::validation("Price must not be negative"));
        }
        if self.price_cents > MAX_PRICE_CENTS {
            return Err(ApiError::validation(format!(
                "Price must not exceed {MAX_PRICE_CENTS} cents"
            )));
        }
        if self.stock_quantity < 0 {
            return Err(ApiError::validation("Stock quantity must not be negative"));
        }
        Ok(())
    }

    fn into_input(self) -> ProductInput {
        ProductInput {
            seller_id: self.seller_id,
            name: self.name,
            description: self.description,
            category: self.category,
            price_cents: self.price_cents,
            stock_quantity: self.stock_quantity,
        }
    }
}

async fn ensure_seller(state: &AppState, seller_id: i32) -> Result<(), ApiError> {
    if state.store().get_active_seller(seller_id).await?.is_none() {
        return Err(ApiError::validation(format!(
            "Seller with ID {seller_id} not found"
        )));
    }
    Ok(())
}

/// GET /api/products
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    caller: Option<CurrentUser>,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<ProductDto>>>, ApiError> {
    let products = state.store().list_products().await?;

    if let Some(caller) = &caller {
        state
            .auditor()
            .record(
                &ctx,
                AuditEvent::new(ENTITY, "View", json!({ "action": "ViewAll" }))
                    .actor(Some(caller.id())),
            )
            .await;
    }

    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductDto::from).collect(),
    )))
}

/// GET /api/products/{id}
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    caller: Option<CurrentUser>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ProductDto>>, ApiError> {
    let product = state
        .store()
        .get_product(id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::not_found("Product", id))?;

    if let Some(caller) = &caller {
        state
            .auditor()
            .record(
                &ctx,
                AuditEvent::new(
                    ENTITY,
                    "View",
                    json!({ "productId": id, "productName": product.name }),
                )
                .entity(id)
                .actor(Some(caller.id())),
            )
            .await;
    }

    Ok(Json(ApiResponse::success(ProductDto::from(product))))
}

/// POST /api/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ApiResponse<ProductDto>>, ApiError> {
    payload.validate()?;
    ensure_seller(&state, payload.seller_id).await?;

    let product = state.store().create_product(payload.into_input()).await?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Create",
                json!({
                    "productId": product.id,
                    "productName": product.name,
                    "sellerId": product.seller_id,
                    "priceCents": product.price_cents,
                    "stockQuantity": product.stock_quantity,
                }),
            )
            .entity(product.id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(ProductDto::from(product))))
}

/// PUT /api/products/{id}
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<ApiResponse<ProductDto>>, ApiError> {
    payload.validate()?;

    let before = state
        .store()
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", id))?;

    ensure_seller(&state, payload.seller_id).await?;

    let expected_version = payload.version.unwrap_or(before.version);
    let outcome = state
        .store()
        .update_product(id, expected_version, payload.into_input())
        .await?;

    if outcome == WriteOutcome::Stale {
        let exists = state.store().product_exists(id).await?;
        return Err(ApiError::stale(ENTITY, id, exists));
    }

    let after = state
        .store()
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", id))?;

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Update",
                json!({
                    "productId": id,
                    "oldProduct": {
                        "name": before.name,
                        "description": before.description,
                        "priceCents": before.price_cents,
                        "stockQuantity": before.stock_quantity,
                        "category": before.category,
                        "sellerId": before.seller_id,
                        "status": before.status,
                    },
                    "newProduct": {
                        "name": after.name,
                        "description": after.description,
                        "priceCents": after.price_cents,
                        "stockQuantity": after.stock_quantity,
                        "category": after.category,
                        "sellerId": after.seller_id,
                        "status": after.status,
                    },
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(ProductDto::from(after))))
}

/// DELETE /api/products/{id}
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let product = state
        .store()
        .get_product(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Product", id))?;

    if !state.store().delete_product(id).await? {
        return Err(ApiError::not_found("Product", id));
    }

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Delete",
                json!({
                    "productId": id,
                    "productName": product.name,
                    "sellerId": product.seller_id,
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Product deleted successfully",
    ))))
}
