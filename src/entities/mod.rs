pub mod prelude;

pub mod audit_logs;
pub mod order_items;
pub mod orders;
pub mod payments;
pub mod products;
pub mod roles;
pub mod sellers;
pub mod user_roles;
pub mod users;
