use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub entity_name: String,
    pub entity_id: Option<String>,
    pub action: String,
    /// Null for anonymous actions such as a sign-in with an unknown email.
    pub user_id: Option<String>,
    /// JSON document.
    pub details: String,
    pub ip_address: String,
    pub timestamp: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
