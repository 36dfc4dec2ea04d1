use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{PolicyRegistry, Requirement, Role, SessionCookies};
use crate::config::Config;
use crate::services::{AuthService, Auditor};
use crate::state::SharedState;

mod admin;
mod audit;
pub mod auth;
mod delivery;
mod error;
pub mod gate;
mod inventory;
mod observability;
mod orders;
mod payments;
mod products;
mod sellers;
mod types;

pub use error::ApiError;
pub use gate::{CurrentUser, gated};
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auditor(&self) -> &Auditor {
        &self.shared.auditor
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyRegistry {
        &self.shared.policies
    }

    #[must_use]
    pub fn cookies(&self) -> &SessionCookies {
        &self.shared.cookies
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Builds the full HTTP surface.
///
/// # Errors
///
/// Fails when a route names a policy missing from the authorization config.
pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let api_router = api_routes(&state)?.with_state(state.clone());

    let cors_origins = &state.config().server.cors_allowed_origins;
    let cors_layer = if cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Ok(Router::new().nest("/api", api_router).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(observability::logging_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(observability::security_headers_middleware))
            .layer(cors_layer.allow_methods(Any).allow_headers(Any)),
    ))
}

fn api_routes(state: &Arc<AppState>) -> anyhow::Result<Router<Arc<AppState>>> {
    use Requirement::{Anonymous, AnyRole, Authenticated};

    let policy = |name: &str| state.policies().requirement(name);
    let s = state;

    let product_writers = || AnyRole(vec![Role::Administrator, Role::ProductManager]);
    let stock_managers = || AnyRole(vec![Role::Administrator, Role::InventoryManager]);
    let order_handlers = || AnyRole(orders::ORDER_CANCELLERS.to_vec());

    Ok(Router::new()
        // Account
        .route("/auth/register", gated(s, Anonymous, post(auth::register)))
        .route("/auth/login", gated(s, Anonymous, post(auth::login)))
        .route("/auth/logout", gated(s, Anonymous, post(auth::logout)))
        .route(
            "/auth/profile",
            gated(s, Authenticated, get(auth::get_profile).put(auth::update_profile)),
        )
        .route(
            "/auth/change-password",
            gated(s, Authenticated, post(auth::change_password)),
        )
        .route(
            "/auth/account",
            gated(s, Authenticated, delete(auth::delete_account)),
        )
        // Catalogue
        .route(
            "/products",
            gated(s, Anonymous, get(products::list_products))
                .merge(gated(s, product_writers(), post(products::create_product))),
        )
        .route(
            "/products/{id}",
            gated(s, Anonymous, get(products::get_product))
                .merge(gated(s, product_writers(), put(products::update_product)))
                .merge(gated(
                    s,
                    AnyRole(vec![Role::Administrator]),
                    delete(products::delete_product),
                )),
        )
        .route(
            "/sellers",
            gated(s, Authenticated, get(sellers::list_sellers)).merge(gated(
                s,
                policy("RequireProductManagerRole")?,
                post(sellers::create_seller),
            )),
        )
        .route(
            "/sellers/{id}",
            gated(s, Authenticated, get(sellers::get_seller)).merge(gated(
                s,
                policy("RequireProductManagerRole")?,
                put(sellers::update_seller).delete(sellers::delete_seller),
            )),
        )
        // Orders
        .route(
            "/orders",
            gated(
                s,
                Authenticated,
                get(orders::list_orders).post(orders::create_order),
            ),
        )
        .route("/orders/{id}", gated(s, Authenticated, get(orders::get_order)))
        .route(
            "/orders/{id}/cancel",
            gated(s, Authenticated, put(orders::cancel_order)),
        )
        .route(
            "/orders/{id}/process",
            gated(s, order_handlers(), put(orders::process_order)),
        )
        .route(
            "/orders/{id}/ship",
            gated(s, order_handlers(), put(orders::ship_order)),
        )
        // Payments
        .route(
            "/payments",
            gated(
                s,
                policy("RequireFinanceTeamRole")?,
                get(payments::list_payments),
            )
            .merge(gated(s, Authenticated, post(payments::create_payment))),
        )
        .route(
            "/payments/{id}",
            gated(s, Authenticated, get(payments::get_payment)),
        )
        .route(
            "/payments/order/{order_id}",
            gated(s, Authenticated, get(payments::list_payments_for_order)),
        )
        .route(
            "/payments/{id}/refund",
            gated(
                s,
                policy("RequireFinanceTeamRole")?,
                post(payments::refund_payment),
            ),
        )
        .route(
            "/payments/{id}/status",
            gated(
                s,
                AnyRole(vec![Role::Administrator, Role::FinanceTeam]),
                put(payments::update_payment_status),
            ),
        )
        // Inventory
        .route(
            "/inventory",
            gated(s, stock_managers(), get(inventory::list_inventory)),
        )
        .route(
            "/inventory/{id}/stock",
            gated(s, stock_managers(), put(inventory::update_stock))
                .merge(gated(s, Authenticated, delete(inventory::remove_stock))),
        )
        // Delivery
        .route(
            "/delivery/orders",
            gated(
                s,
                policy("RequireDeliveryTeamRole")?,
                get(delivery::list_orders_to_deliver),
            ),
        )
        .route(
            "/delivery/{id}/deliver",
            gated(
                s,
                policy("RequireDeliveryTeamRole")?,
                post(delivery::mark_delivered),
            ),
        )
        .route(
            "/delivery/{id}/report-issue",
            gated(
                s,
                policy("RequireDeliveryTeamRole")?,
                post(delivery::report_issue),
            ),
        )
        // Audit
        .route(
            "/audit/orders",
            gated(s, policy("RequireAuditTeamRole")?, get(audit::order_report)),
        )
        .route(
            "/audit/transactions",
            gated(
                s,
                policy("RequireAuditTeamRole")?,
                get(audit::transaction_report),
            ),
        )
        .route(
            "/audit/inventory",
            gated(
                s,
                policy("RequireAuditTeamRole")?,
                get(audit::inventory_report),
            ),
        )
        .route(
            "/audit/logs",
            gated(s, policy("RequireAuditTeamRole")?, get(audit::list_audit_logs)),
        )
        // Administration
        .route(
            "/admin/users/{id}/roles/{role}",
            gated(
                s,
                policy("RequireAdministratorRole")?,
                put(admin::assign_role).delete(admin::revoke_role),
            ),
        )
        .route(
            "/admin/users/{id}/deactivate",
            gated(
                s,
                policy("RequireAdministratorRole")?,
                post(admin::deactivate_user),
            ),
        )
        .route(
            "/metrics",
            gated(
                s,
                policy("RequireAdministratorRole")?,
                get(observability::get_metrics),
            ),
        )
        .route("/health", gated(s, Anonymous, get(observability::health))))
}
