pub use super::audit_logs::Entity as AuditLogs;
pub use super::order_items::Entity as OrderItems;
pub use super::orders::Entity as Orders;
pub use super::payments::Entity as Payments;
pub use super::products::Entity as Products;
pub use super::roles::Entity as Roles;
pub use super::sellers::Entity as Sellers;
pub use super::user_roles::Entity as UserRoles;
pub use super::users::Entity as Users;
