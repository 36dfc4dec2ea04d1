use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::db::OrderWithItems;
use crate::entities::{audit_logs, order_items, payments, products, sellers};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Optional `startDate`/`endDate` window for report endpoints. Accepts
/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates; a plain end date covers
/// the whole day.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    #[serde(alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "endDate")]
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    pub fn bounds(&self) -> Result<(Option<String>, Option<String>), ApiError> {
        let from = self
            .start_date
            .as_deref()
            .map(|raw| parse_bound(raw, false))
            .transpose()?;
        let to = self
            .end_date
            .as_deref()
            .map(|raw| parse_bound(raw, true))
            .transpose()?;

        Ok((from, to))
    }
}

fn parse_bound(raw: &str, end_of_day: bool) -> Result<String, ApiError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc).to_rfc3339());
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("Invalid date: {raw}")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ApiError::internal("Invalid time of day"))?;

    Ok(date.and_time(time).and_utc().to_rfc3339())
}

#[derive(Debug, Serialize)]
pub struct SellerDto {
    pub id: i32,
    pub business_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub tax_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<sellers::Model> for SellerDto {
    fn from(model: sellers::Model) -> Self {
        Self {
            id: model.id,
            business_name: model.business_name,
            email: model.email,
            phone_number: model.phone_number,
            address: model.address,
            tax_id: model.tax_id,
            owner_user_id: model.owner_user_id,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductDto {
    pub id: i32,
    pub seller_id: i32,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price_cents: i64,
    pub stock_quantity: i32,
    pub status: String,
    pub version: i32,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<products::Model> for ProductDto {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            seller_id: model.seller_id,
            name: model.name,
            description: model.description,
            category: model.category,
            price_cents: model.price_cents,
            stock_quantity: model.stock_quantity,
            status: model.status,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderItemDto {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

impl From<order_items::Model> for OrderItemDto {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            quantity: model.quantity,
            unit_price_cents: model.unit_price_cents,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderDto {
    pub id: i32,
    pub order_number: String,
    pub user_id: String,
    pub shipping_address: String,
    pub total_cents: i64,
    pub status: String,
    pub version: i32,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub items: Vec<OrderItemDto>,
}

impl From<OrderWithItems> for OrderDto {
    fn from(row: OrderWithItems) -> Self {
        let order = row.order;
        Self {
            id: order.id,
            order_number: order.order_number,
            user_id: order.user_id,
            shipping_address: order.shipping_address,
            total_cents: order.total_cents,
            status: order.status,
            version: order.version,
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: row.items.into_iter().map(OrderItemDto::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentDto {
    pub id: i32,
    pub payment_number: String,
    pub order_id: i32,
    pub user_id: String,
    pub amount_cents: i64,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub version: i32,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<payments::Model> for PaymentDto {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            payment_number: model.payment_number,
            order_id: model.order_id,
            user_id: model.user_id,
            amount_cents: model.amount_cents,
            payment_method: model.payment_method,
            status: model.status,
            transaction_id: model.transaction_id,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditLogDto {
    pub id: i64,
    pub entity_name: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub user_id: Option<String>,
    pub details: String,
    pub ip_address: String,
    pub timestamp: String,
}

impl From<audit_logs::Model> for AuditLogDto {
    fn from(model: audit_logs::Model) -> Self {
        Self {
            id: model.id,
            entity_name: model.entity_name,
            entity_id: model.entity_id,
            action: model.action,
            user_id: model.user_id,
            details: model.details,
            ip_address: model.ip_address,
            timestamp: model.timestamp,
        }
    }
}
