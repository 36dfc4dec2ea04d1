//! Stock level endpoints.
//!
//! Both writes take an optional `?version=` so a client can assert the
//! product has not changed since it was read; without it the current
//! version is used and only concurrent writers in flight can conflict.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use super::gate::CurrentUser;
use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::auth::Role;
use crate::db::WriteOutcome;
use crate::services::{AuditEvent, RequestContext};

const ENTITY: &str = "Inventory";

/// May remove stock from any seller's product.
pub const STOCK_OVERRIDES: &[Role] = &[Role::Administrator, Role::InventoryManager];

#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct InventoryItem {
    pub id: i32,
    pub name: String,
    pub stock_quantity: i32,
    pub seller_id: i32,
    pub seller_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockRemoved {
    pub product_id: i32,
    pub new_stock_quantity: i32,
    pub updated_at: Option<String>,
}

fn product_not_found() -> ApiError {
    ApiError::NotFound("Product not found".to_string())
}

/// GET /api/inventory
pub async fn list_inventory(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
) -> Result<Json<ApiResponse<Vec<InventoryItem>>>, ApiError> {
    let rows = state.store().list_products_with_sellers().await?;

    let items = rows
        .into_iter()
        .map(|(product, seller)| InventoryItem {
            id: product.id,
            name: product.name,
            stock_quantity: product.stock_quantity,
            seller_id: product.seller_id,
            seller_name: seller.map(|s| s.business_name),
        })
        .collect();

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(ENTITY, "View", json!({ "action": "ViewAll" }))
                .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(items)))
}

/// PUT /api/inventory/{id}/stock
///
/// Body is the new stock level as a bare integer.
pub async fn update_stock(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Query(query): Query<VersionQuery>,
    Json(new_stock): Json<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if new_stock < 0 {
        return Err(ApiError::validation("Stock level must not be negative"));
    }

    let Some(product) = state.store().get_product(id).await? else {
        return Err(ApiError::not_found("Product", id));
    };

    let expected_version = query.version.unwrap_or(product.version);
    let outcome = state
        .store()
        .set_product_stock(id, expected_version, new_stock)
        .await?;

    if outcome == WriteOutcome::Stale {
        let exists = state.store().product_exists(id).await?;
        return Err(ApiError::stale("Product", id, exists));
    }

    let seller_name = state
        .store()
        .get_seller(product.seller_id)
        .await?
        .map(|s| s.business_name);

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "UpdateStock",
                json!({
                    "productId": id,
                    "oldStock": product.stock_quantity,
                    "newStock": new_stock,
                    "productName": product.name,
                    "sellerName": seller_name,
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Stock updated successfully",
    ))))
}

/// DELETE /api/inventory/{id}/stock
///
/// Body is the quantity to remove as a bare integer. Sellers may only
/// touch their own products.
pub async fn remove_stock(
    State(state): State<Arc<AppState>>,
    caller: CurrentUser,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Query(query): Query<VersionQuery>,
    Json(quantity): Json<i32>,
) -> Result<Json<ApiResponse<StockRemoved>>, ApiError> {
    if quantity <= 0 {
        return Err(ApiError::validation("Quantity must be greater than zero"));
    }

    let product = state
        .store()
        .get_product(id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(product_not_found)?;

    let owner = state
        .store()
        .get_seller(product.seller_id)
        .await?
        .and_then(|s| s.owner_user_id);
    caller.ensure_owner(owner.as_deref(), STOCK_OVERRIDES)?;

    if product.stock_quantity < quantity {
        return Err(ApiError::validation("Insufficient stock"));
    }

    let new_quantity = product.stock_quantity - quantity;
    let expected_version = query.version.unwrap_or(product.version);
    let outcome = state
        .store()
        .set_product_stock(id, expected_version, new_quantity)
        .await?;

    if outcome == WriteOutcome::Stale {
        let exists = state.store().product_exists(id).await?;
        return Err(ApiError::stale("Product", id, exists));
    }

    state
        .auditor()
        .record(
            &ctx,
            AuditEvent::new(
                ENTITY,
                "Update",
                json!({
                    "productId": id,
                    "oldQuantity": product.stock_quantity,
                    "newQuantity": new_quantity,
                    "productName": product.name,
                    "action": "RemoveStock",
                }),
            )
            .entity(id)
            .actor(Some(caller.id())),
        )
        .await;

    let updated = state
        .store()
        .get_product(id)
        .await?
        .ok_or_else(product_not_found)?;

    Ok(Json(ApiResponse::success(StockRemoved {
        product_id: updated.id,
        new_stock_quantity: updated.stock_quantity,
        updated_at: updated.updated_at,
    })))
}
