use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::auth::{LockoutPolicy, LockoutState, Role, RoleSet};
use crate::domain::{OrderStatus, PaymentStatus};
use crate::entities::{audit_logs, orders, payments, products, sellers};

pub mod migrator;
pub mod repositories;

pub use repositories::audit::{AuditFilter, NewAuditEntry};
pub use repositories::order::{OrderLine, OrderWithItems, PlaceOrder};
pub use repositories::payment::NewPayment;
pub use repositories::product::ProductInput;
pub use repositories::seller::SellerInput;
pub use repositories::user::{Credentials, Identity, NewIdentity, ProfileUpdate, normalize_email};

/// Result of a version-guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// No row matched the id and expected version.
    Stale,
}

impl WriteOutcome {
    #[must_use]
    pub const fn from_rows(rows_affected: u64) -> Self {
        if rows_affected > 0 {
            Self::Applied
        } else {
            Self::Stale
        }
    }
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        // Each in-memory connection is its own database, so the pool must
        // hold exactly one connection for its whole life.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn role_repo(&self) -> repositories::role::RoleRepository {
        repositories::role::RoleRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    fn seller_repo(&self) -> repositories::seller::SellerRepository {
        repositories::seller::SellerRepository::new(self.conn.clone())
    }

    fn product_repo(&self) -> repositories::product::ProductRepository {
        repositories::product::ProductRepository::new(self.conn.clone())
    }

    fn order_repo(&self) -> repositories::order::OrderRepository {
        repositories::order::OrderRepository::new(self.conn.clone())
    }

    fn payment_repo(&self) -> repositories::payment::PaymentRepository {
        repositories::payment::PaymentRepository::new(self.conn.clone())
    }

    // Identities

    pub async fn get_user(&self, id: &str) -> Result<Option<Identity>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<Identity>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn get_credentials_by_email(&self, email: &str) -> Result<Option<Credentials>> {
        self.user_repo().get_credentials_by_email(email).await
    }

    pub async fn get_credentials_by_id(&self, id: &str) -> Result<Option<Credentials>> {
        self.user_repo().get_credentials_by_id(id).await
    }

    pub async fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool> {
        self.user_repo().email_or_username_taken(email, username).await
    }

    pub async fn create_user(
        &self,
        new: NewIdentity,
        password_hash: String,
        initial_roles: &[Role],
    ) -> Result<Identity> {
        self.user_repo().create(new, password_hash, initial_roles).await
    }

    pub async fn record_lockout(&self, id: &str, state: &LockoutState) -> Result<()> {
        self.user_repo().record_lockout(id, state).await
    }

    pub async fn record_failed_sign_in(
        &self,
        id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.user_repo().record_failed_sign_in(id, policy, now).await
    }

    pub async fn update_password_hash(&self, id: &str, password_hash: String) -> Result<()> {
        self.user_repo().update_password_hash(id, password_hash).await
    }

    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Option<Identity>> {
        self.user_repo().update_profile(id, update).await
    }

    pub async fn set_user_active(&self, id: &str, is_active: bool) -> Result<bool> {
        self.user_repo().set_active(id, is_active).await
    }

    // Roles

    pub async fn roles_for_user(&self, user_id: &str) -> Result<RoleSet> {
        self.role_repo().roles_for_user(user_id).await
    }

    pub async fn assign_role(&self, user_id: &str, role: Role) -> Result<bool> {
        self.role_repo().assign(user_id, role).await
    }

    pub async fn revoke_role(&self, user_id: &str, role: Role) -> Result<bool> {
        self.role_repo().revoke(user_id, role).await
    }

    pub async fn count_role_members(&self, role: Role) -> Result<u64> {
        self.role_repo().count_members(role).await
    }

    pub async fn count_active_role_members(&self, role: Role) -> Result<u64> {
        self.role_repo().count_active_members(role).await
    }

    // Audit log

    pub async fn append_audit(&self, entry: NewAuditEntry) -> Result<i64> {
        self.audit_repo().append(entry).await
    }

    pub async fn list_audit(&self, filter: AuditFilter) -> Result<Vec<audit_logs::Model>> {
        self.audit_repo().list(filter).await
    }

    // Sellers

    pub async fn list_sellers(&self) -> Result<Vec<sellers::Model>> {
        self.seller_repo().list_active().await
    }

    pub async fn get_seller(&self, id: i32) -> Result<Option<sellers::Model>> {
        self.seller_repo().get(id).await
    }

    pub async fn get_active_seller(&self, id: i32) -> Result<Option<sellers::Model>> {
        self.seller_repo().get_active(id).await
    }

    pub async fn create_seller(&self, input: SellerInput) -> Result<sellers::Model> {
        self.seller_repo().create(input).await
    }

    pub async fn update_seller(&self, id: i32, input: SellerInput) -> Result<Option<sellers::Model>> {
        self.seller_repo().update(id, input).await
    }

    pub async fn deactivate_seller(&self, id: i32) -> Result<Option<sellers::Model>> {
        self.seller_repo().deactivate(id).await
    }

    // Products

    pub async fn list_products(&self) -> Result<Vec<products::Model>> {
        self.product_repo().list_active().await
    }

    pub async fn list_products_with_sellers(
        &self,
    ) -> Result<Vec<(products::Model, Option<sellers::Model>)>> {
        self.product_repo().list_with_sellers().await
    }

    pub async fn get_product(&self, id: i32) -> Result<Option<products::Model>> {
        self.product_repo().get(id).await
    }

    pub async fn product_exists(&self, id: i32) -> Result<bool> {
        self.product_repo().exists(id).await
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<products::Model> {
        self.product_repo().create(input).await
    }

    pub async fn update_product(
        &self,
        id: i32,
        expected_version: i32,
        input: ProductInput,
    ) -> Result<WriteOutcome> {
        self.product_repo().update(id, expected_version, input).await
    }

    pub async fn set_product_stock(
        &self,
        id: i32,
        expected_version: i32,
        stock_quantity: i32,
    ) -> Result<WriteOutcome> {
        self.product_repo()
            .set_stock(id, expected_version, stock_quantity)
            .await
    }

    pub async fn delete_product(&self, id: i32) -> Result<bool> {
        self.product_repo().delete(id).await
    }

    pub async fn list_products_touched_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<products::Model>> {
        self.product_repo().list_touched_between(from, to).await
    }

    // Orders

    pub async fn list_orders(&self) -> Result<Vec<OrderWithItems>> {
        self.order_repo().list_all().await
    }

    pub async fn list_orders_for_user(&self, user_id: &str) -> Result<Vec<OrderWithItems>> {
        self.order_repo().list_for_user(user_id).await
    }

    pub async fn list_orders_in_statuses(
        &self,
        statuses: &[OrderStatus],
    ) -> Result<Vec<orders::Model>> {
        self.order_repo().list_in_statuses(statuses).await
    }

    pub async fn list_orders_created_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<orders::Model>> {
        self.order_repo().list_created_between(from, to).await
    }

    pub async fn get_order(&self, id: i32) -> Result<Option<orders::Model>> {
        self.order_repo().get(id).await
    }

    pub async fn get_order_with_items(&self, id: i32) -> Result<Option<OrderWithItems>> {
        self.order_repo().get_with_items(id).await
    }

    pub async fn order_exists(&self, id: i32) -> Result<bool> {
        self.order_repo().exists(id).await
    }

    pub async fn place_order(
        &self,
        user_id: &str,
        shipping_address: String,
        lines: &[OrderLine],
    ) -> Result<PlaceOrder> {
        self.order_repo().place(user_id, shipping_address, lines).await
    }

    pub async fn set_order_status(
        &self,
        id: i32,
        expected_version: i32,
        status: OrderStatus,
    ) -> Result<WriteOutcome> {
        self.order_repo().set_status(id, expected_version, status).await
    }

    pub async fn cancel_order(&self, id: i32, expected_version: i32) -> Result<WriteOutcome> {
        self.order_repo().cancel(id, expected_version).await
    }

    // Payments

    pub async fn list_payments(&self) -> Result<Vec<payments::Model>> {
        self.payment_repo().list_all().await
    }

    pub async fn list_payments_for_order(&self, order_id: i32) -> Result<Vec<payments::Model>> {
        self.payment_repo().list_by_order(order_id).await
    }

    pub async fn list_payments_created_between(
        &self,
        from: Option<String>,
        to: Option<String>,
    ) -> Result<Vec<payments::Model>> {
        self.payment_repo().list_created_between(from, to).await
    }

    pub async fn get_payment(&self, id: i32) -> Result<Option<payments::Model>> {
        self.payment_repo().get(id).await
    }

    pub async fn payment_exists(&self, id: i32) -> Result<bool> {
        self.payment_repo().exists(id).await
    }

    pub async fn create_payment(&self, new: NewPayment) -> Result<payments::Model> {
        self.payment_repo().create(new).await
    }

    pub async fn set_payment_status(
        &self,
        id: i32,
        expected_version: i32,
        status: PaymentStatus,
    ) -> Result<WriteOutcome> {
        self.payment_repo().set_status(id, expected_version, status).await
    }

    pub async fn refund_payment(&self, payment: &payments::Model) -> Result<WriteOutcome> {
        self.payment_repo().refund(payment).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> Store {
        let path = std::env::temp_dir().join(format!("storefront-db-{}.db", uuid::Uuid::new_v4()));
        Store::new(&format!("sqlite:{}", path.display()))
            .await
            .expect("store")
    }

    async fn seed_product(store: &Store, stock: i32) -> products::Model {
        let seller = store
            .create_seller(SellerInput {
                business_name: "Acme".to_string(),
                email: "acme@example.com".to_string(),
                phone_number: "555-0100".to_string(),
                address: "1 Main St".to_string(),
                tax_id: None,
                owner_user_id: None,
            })
            .await
            .expect("seller");

        store
            .create_product(ProductInput {
                seller_id: seller.id,
                name: "Widget".to_string(),
                description: "A widget".to_string(),
                category: "Tools".to_string(),
                price_cents: 1250,
                stock_quantity: stock,
            })
            .await
            .expect("product")
    }

    #[test]
    fn write_outcome_from_rows() {
        assert_eq!(WriteOutcome::from_rows(0), WriteOutcome::Stale);
        assert_eq!(WriteOutcome::from_rows(1), WriteOutcome::Applied);
    }

    #[tokio::test]
    async fn roles_are_seeded_and_assignable() {
        let store = temp_store().await;
        let user = store
            .create_user(
                NewIdentity {
                    username: "jane".to_string(),
                    email: "jane@example.com".to_string(),
                    first_name: "Jane".to_string(),
                    last_name: "Doe".to_string(),
                    phone_number: None,
                },
                "hash".to_string(),
                &[Role::Customer],
            )
            .await
            .unwrap();

        assert!(store.assign_role(&user.id, Role::FinanceTeam).await.unwrap());
        assert!(!store.assign_role(&user.id, Role::FinanceTeam).await.unwrap());

        let roles = store.roles_for_user(&user.id).await.unwrap();
        assert!(roles.contains(Role::Customer));
        assert!(roles.contains(Role::FinanceTeam));

        assert!(store.revoke_role(&user.id, Role::FinanceTeam).await.unwrap());
        assert!(!store.revoke_role(&user.id, Role::FinanceTeam).await.unwrap());
        assert_eq!(store.count_role_members(Role::Customer).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_not_applied() {
        let store = temp_store().await;
        let product = seed_product(&store, 10).await;

        let first = store
            .set_product_stock(product.id, product.version, 7)
            .await
            .unwrap();
        assert_eq!(first, WriteOutcome::Applied);

        let second = store
            .set_product_stock(product.id, product.version, 3)
            .await
            .unwrap();
        assert_eq!(second, WriteOutcome::Stale);

        let current = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(current.stock_quantity, 7);
        assert_eq!(current.version, product.version + 1);
    }

    #[tokio::test]
    async fn placing_and_cancelling_an_order_moves_stock() {
        let store = temp_store().await;
        let product = seed_product(&store, 5).await;

        let lines = [OrderLine {
            product_id: product.id,
            quantity: 2,
        }];
        let PlaceOrder::Placed(placed) = store
            .place_order("user-1", "1 Main St".to_string(), &lines)
            .await
            .unwrap()
        else {
            panic!("order was not placed");
        };

        assert_eq!(placed.order.total_cents, 2500);
        assert_eq!(placed.items.len(), 1);
        assert_eq!(
            store.get_product(product.id).await.unwrap().unwrap().stock_quantity,
            3
        );

        let outcome = store
            .cancel_order(placed.order.id, placed.order.version)
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);
        assert_eq!(
            store.get_product(product.id).await.unwrap().unwrap().stock_quantity,
            5
        );

        let order = store.get_order(placed.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, "Cancelled");
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_product_untouched() {
        let store = temp_store().await;
        let product = seed_product(&store, 1).await;

        let lines = [OrderLine {
            product_id: product.id,
            quantity: 4,
        }];
        let outcome = store
            .place_order("user-1", "1 Main St".to_string(), &lines)
            .await
            .unwrap();

        assert!(matches!(outcome, PlaceOrder::InsufficientStock { .. }));
        assert_eq!(
            store.get_product(product.id).await.unwrap().unwrap().stock_quantity,
            1
        );

        let unknown = store
            .place_order(
                "user-1",
                "1 Main St".to_string(),
                &[OrderLine {
                    product_id: 999,
                    quantity: 1,
                }],
            )
            .await
            .unwrap();
        assert!(matches!(unknown, PlaceOrder::UnknownProduct(999)));
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected() {
        let store = temp_store().await;
        let product = seed_product(&store, 5).await;
        let pricey = store
            .create_product(ProductInput {
                seller_id: product.seller_id,
                name: "Yacht".to_string(),
                description: "Large".to_string(),
                category: "Boats".to_string(),
                price_cents: i64::MAX / 2 + 1,
                stock_quantity: 5,
            })
            .await
            .unwrap();

        let outcome = store
            .place_order(
                "user-1",
                "1 Main St".to_string(),
                &[
                    OrderLine {
                        product_id: product.id,
                        quantity: 1,
                    },
                    OrderLine {
                        product_id: pricey.id,
                        quantity: 2,
                    },
                ],
            )
            .await
            .unwrap();

        assert!(matches!(outcome, PlaceOrder::TotalTooLarge));
        assert_eq!(
            store.get_product(product.id).await.unwrap().unwrap().stock_quantity,
            5
        );
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refund_marks_order_refunded() {
        let store = temp_store().await;
        let product = seed_product(&store, 5).await;

        let PlaceOrder::Placed(placed) = store
            .place_order(
                "user-1",
                "1 Main St".to_string(),
                &[OrderLine {
                    product_id: product.id,
                    quantity: 1,
                }],
            )
            .await
            .unwrap()
        else {
            panic!("order was not placed");
        };

        let payment = store
            .create_payment(NewPayment {
                order_id: placed.order.id,
                user_id: "user-1".to_string(),
                amount_cents: placed.order.total_cents,
                payment_method: "Card".to_string(),
            })
            .await
            .unwrap();
        assert!(payment.payment_number.starts_with("PAY-"));

        store
            .set_payment_status(payment.id, payment.version, PaymentStatus::Completed)
            .await
            .unwrap();
        let completed = store.get_payment(payment.id).await.unwrap().unwrap();

        assert_eq!(
            store.refund_payment(&completed).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.refund_payment(&completed).await.unwrap(),
            WriteOutcome::Stale
        );

        let order = store.get_order(placed.order.id).await.unwrap().unwrap();
        assert_eq!(order.status, "Refunded");
    }
}
