use sea_orm_migration::prelude::*;

mod m20250101_000001_identity;
mod m20250101_000002_audit_logs;
mod m20250101_000003_catalog;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_identity::Migration),
            Box::new(m20250101_000002_audit_logs::Migration),
            Box::new(m20250101_000003_catalog::Migration),
        ]
    }
}
