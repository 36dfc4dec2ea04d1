use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use storefront_gate::api::AppState;
use storefront_gate::auth::Role;
use storefront_gate::config::Config;
use storefront_gate::db::{AuditFilter, ProductInput, SellerInput};
use tower::ServiceExt;

const PASSWORD: &str = "Passw0rd!";
const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "Admin123!";

struct TestApp {
    state: Arc<AppState>,
    router: Router,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn spawn_app() -> TestApp {
    let db_path =
        std::env::temp_dir().join(format!("storefront-api-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.server.secure_cookies = false;
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;

    let state = storefront_gate::api::create_app_state_from_config(config, None)
        .await
        .expect("failed to create app state");
    let router = storefront_gate::api::router(state.clone()).expect("failed to build router");

    TestApp { state, router }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Reply {
            status,
            headers,
            body,
        }
    }

    async fn register(&self, email: &str) -> String {
        let reply = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": PASSWORD,
                    "first_name": "Test",
                    "last_name": "User",
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

        self.state
            .store()
            .get_user_by_email(email)
            .await
            .unwrap()
            .expect("registered user")
            .id
    }

    async fn login(&self, email: &str, password: &str) -> Reply {
        self.send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn session(&self, email: &str, password: &str) -> String {
        let reply = self.login(email, password).await;
        assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
        session_cookie(&reply.headers)
    }

    async fn customer(&self, email: &str) -> (String, String) {
        let id = self.register(email).await;
        let cookie = self.session(email, PASSWORD).await;
        (id, cookie)
    }

    async fn staff(&self, email: &str, role: Role) -> String {
        let id = self.register(email).await;
        self.state.store().assign_role(&id, role).await.unwrap();
        self.session(email, PASSWORD).await
    }

    async fn product(&self, stock: i32) -> i32 {
        let seller = self
            .state
            .store()
            .create_seller(SellerInput {
                business_name: "Acme".to_string(),
                email: "sales@acme.test".to_string(),
                phone_number: "555-0100".to_string(),
                address: "1 Main St".to_string(),
                tax_id: None,
                owner_user_id: None,
            })
            .await
            .unwrap();

        self.state
            .store()
            .create_product(ProductInput {
                seller_id: seller.id,
                name: "Widget".to_string(),
                description: "A widget".to_string(),
                category: "Tools".to_string(),
                price_cents: 1999,
                stock_quantity: stock,
            })
            .await
            .unwrap()
            .id
    }
}

fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

#[tokio::test]
async fn test_protected_route_requires_session() {
    let app = spawn_app().await;
    let user_id = app.register("alice@example.com").await;

    let reply = app.send("GET", "/api/auth/profile", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["success"], false);

    let reply = app
        .send("GET", "/api/auth/profile", Some("ECommerceAuth=forged"), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let (_, expired) = app
        .state
        .cookies()
        .issue(&user_id, false, Utc::now() - Duration::days(8))
        .unwrap();
    let expired = expired.to_str().unwrap().split(';').next().unwrap().to_string();
    let reply = app
        .send("GET", "/api/auth/profile", Some(&expired), None)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    // Admin-only routes answer 401, not 403, without a session.
    let reply = app.send("GET", "/api/metrics", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = spawn_app().await;
    app.register("bob@example.com").await;

    let reply = app.login("bob@example.com", PASSWORD).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["message"], "Login successful");

    let set_cookie = reply.headers[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("ECommerceAuth="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(!set_cookie.contains("Max-Age"));

    let cookie = session_cookie(&reply.headers);
    let reply = app
        .send("GET", "/api/auth/profile", Some(&cookie), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["email"], "bob@example.com");
    assert_eq!(reply.body["data"]["roles"], json!(["Customer"]));

    let reply = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "bob@example.com",
                "password": PASSWORD,
                "first_name": "Bob",
                "last_name": "Again",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_logout_is_repeatable() {
    let app = spawn_app().await;
    let (_, cookie) = app.customer("carol@example.com").await;

    let reply = app.send("POST", "/api/auth/logout", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["message"], "Logout successful");

    for _ in 0..2 {
        let reply = app.send("POST", "/api/auth/logout", None, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.headers.contains_key(header::SET_COOKIE));
    }

    // Only the signed-in logout is audited.
    let logouts = app
        .state
        .store()
        .list_audit(AuditFilter {
            entity_name: Some("User".to_string()),
            action: Some("Logout".to_string()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(logouts.len(), 1);
}

#[tokio::test]
async fn test_deactivated_identity_loses_live_session() {
    let app = spawn_app().await;
    let (id, cookie) = app.customer("erin@example.com").await;
    let admin = app.session(ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let reply = app.send("GET", "/api/auth/profile", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send(
            "POST",
            &format!("/api/admin/users/{id}/deactivate"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    // The cookie itself is still unexpired and correctly sealed.
    let reply = app.send("GET", "/api/auth/profile", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_last_active_administrator_is_protected() {
    let app = spawn_app().await;
    let admin = app.session(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let admin_id = app
        .state
        .store()
        .get_user_by_email(ADMIN_EMAIL)
        .await
        .unwrap()
        .unwrap()
        .id;

    // A deactivated Administrator does not keep the role covered.
    let (dormant_id, _) = app.customer("dormant@example.com").await;
    let reply = app
        .send(
            "PUT",
            &format!("/api/admin/users/{dormant_id}/roles/Administrator"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    let reply = app
        .send(
            "POST",
            &format!("/api/admin/users/{dormant_id}/deactivate"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send(
            "DELETE",
            &format!("/api/admin/users/{admin_id}/roles/Administrator"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app.send("DELETE", "/api/auth/account", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app.send("GET", "/api/auth/profile", Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_email_is_case_insensitive() {
    let app = spawn_app().await;
    app.register("Frank@Example.com").await;

    let reply = app.login("frank@EXAMPLE.com", PASSWORD).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "FRANK@example.com",
                "password": PASSWORD,
                "first_name": "Frank",
                "last_name": "Dup",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fifth_wrong_password_locks_account() {
    let app = spawn_app().await;
    app.register("dave@example.com").await;

    for _ in 0..4 {
        let reply = app.login("dave@example.com", "Wrong-pass1").await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"], "Invalid email or password");
    }

    let reply = app.login("dave@example.com", "Wrong-pass1").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Account is locked out");

    let reply = app.login("dave@example.com", PASSWORD).await;
    assert_eq!(reply.body["error"], "Account is locked out");
    assert!(!reply.headers.contains_key(header::SET_COOKIE));
}

#[tokio::test]
async fn test_unknown_email_attempt_is_audited() {
    let app = spawn_app().await;

    let reply = app.login("nobody@example.com", PASSWORD).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Invalid email or password");

    let entries = app
        .state
        .store()
        .list_audit(AuditFilter {
            entity_name: Some("User".to_string()),
            action: Some("LoginAttempt".to_string()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, None);
    assert_eq!(entries[0].ip_address, "Unknown");
    assert!(entries[0].details.contains("User not found"));
    assert!(entries[0].details.contains("nobody@example.com"));
}

#[tokio::test]
async fn test_customer_is_forbidden_from_finance_routes() {
    let app = spawn_app().await;
    let (id, cookie) = app.customer("erin@example.com").await;

    let reply = app.send("GET", "/api/payments", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // Roles are read per request, so a grant applies to the live session.
    app.state
        .store()
        .assign_role(&id, Role::FinanceTeam)
        .await
        .unwrap();
    let reply = app.send("GET", "/api/payments", Some(&cookie), None).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_order_ownership() {
    let app = spawn_app().await;
    let product_id = app.product(10).await;
    let (_, owner) = app.customer("frank@example.com").await;
    let (_, other) = app.customer("grace@example.com").await;
    let support = app
        .staff("support@example.com", Role::CustomerSupport)
        .await;

    let reply = app
        .send(
            "POST",
            "/api/orders",
            Some(&owner),
            Some(json!({
                "shipping_address": "2 Side St",
                "items": [{ "product_id": product_id, "quantity": 3 }],
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    assert_eq!(reply.body["data"]["total_cents"], 3 * 1999);
    let order_id = reply.body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/orders/{order_id}");

    assert_eq!(app.send("GET", &uri, Some(&owner), None).await.status, StatusCode::OK);
    assert_eq!(
        app.send("GET", &uri, Some(&other), None).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.send("GET", &uri, Some(&support), None).await.status, StatusCode::OK);

    let reply = app.send("GET", "/api/orders", Some(&other), None).await;
    assert_eq!(reply.body["data"], json!([]));

    let cancel = format!("/api/orders/{order_id}/cancel");
    assert_eq!(
        app.send("PUT", &cancel, Some(&other), None).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.send("PUT", &cancel, Some(&owner), None).await.status, StatusCode::OK);

    let product = app.state.store().get_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock_quantity, 10);
}

#[tokio::test]
async fn test_order_rejects_insufficient_stock() {
    let app = spawn_app().await;
    let product_id = app.product(1).await;
    let (_, cookie) = app.customer("heidi@example.com").await;

    let reply = app
        .send(
            "POST",
            "/api/orders",
            Some(&cookie),
            Some(json!({
                "shipping_address": "3 Side St",
                "items": [{ "product_id": product_id, "quantity": 2 }],
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "Insufficient stock for product Widget");
}

#[tokio::test]
async fn test_stock_updates_detect_conflicts() {
    let app = spawn_app().await;
    let product_id = app.product(5).await;
    let admin = app.session(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let uri = format!("/api/inventory/{product_id}/stock");

    let reply = app
        .send("PUT", &format!("{uri}?version=1"), Some(&admin), Some(json!(20)))
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    // Same version again: someone else already moved it on.
    let reply = app
        .send("PUT", &format!("{uri}?version=1"), Some(&admin), Some(json!(30)))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);

    let reply = app
        .send("DELETE", &format!("/api/products/{product_id}"), Some(&admin), None)
        .await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = app
        .send("PUT", &format!("{uri}?version=2"), Some(&admin), Some(json!(30)))
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_remove_stock_rules() {
    let app = spawn_app().await;
    let product_id = app.product(4).await;
    let (_, customer) = app.customer("ivan@example.com").await;
    let manager = app
        .staff("stock@example.com", Role::InventoryManager)
        .await;
    let uri = format!("/api/inventory/{product_id}/stock");

    let reply = app.send("DELETE", &uri, Some(&customer), Some(json!(1))).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    let reply = app.send("DELETE", &uri, Some(&manager), Some(json!(0))).await;
    assert_eq!(reply.body["error"], "Quantity must be greater than zero");

    let reply = app.send("DELETE", &uri, Some(&manager), Some(json!(9))).await;
    assert_eq!(reply.body["error"], "Insufficient stock");

    let reply = app.send("DELETE", &uri, Some(&manager), Some(json!(3))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["new_stock_quantity"], 1);
}

#[tokio::test]
async fn test_policy_and_role_routes() {
    let app = spawn_app().await;
    let (customer_id, customer) = app.customer("judy@example.com").await;
    let admin = app.session(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let grant = format!("/api/admin/users/{customer_id}/roles/ProductManager");

    assert_eq!(
        app.send("PUT", &grant, Some(&customer), None).await.status,
        StatusCode::FORBIDDEN
    );

    let reply = app.send("PUT", &grant, Some(&admin), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"]["roles"], json!(["ProductManager", "Customer"]));

    let reply = app
        .send(
            "PUT",
            &format!("/api/admin/users/{customer_id}/roles/Wizard"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = app
        .send(
            "PUT",
            "/api/admin/users/missing/roles/Customer",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    // The sellers policy now admits the customer.
    let reply = app
        .send(
            "POST",
            "/api/sellers",
            Some(&customer),
            Some(json!({
                "business_name": "Judy's",
                "email": "judy@shop.test",
                "phone_number": "555-0101",
                "address": "4 Side St",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);

    let reply = app.send("DELETE", &grant, Some(&admin), None).await;
    assert_eq!(reply.body["data"]["roles"], json!(["Customer"]));
}

#[tokio::test]
async fn test_anonymous_catalogue_and_security_headers() {
    let app = spawn_app().await;
    app.product(2).await;

    let reply = app.send("GET", "/api/products", None, None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["data"].as_array().unwrap().len(), 1);
    assert_eq!(reply.headers["x-content-type-options"], "nosniff");
    assert_eq!(reply.headers["x-frame-options"], "DENY");
}
