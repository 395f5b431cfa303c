pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20260810_000001_directory;
mod m20260810_000002_shard_records;
mod m20260812_000001_analytics;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260810_000001_directory::Migration),
            Box::new(m20260810_000002_shard_records::Migration),
            Box::new(m20260812_000001_analytics::Migration),
        ]
    }
}
