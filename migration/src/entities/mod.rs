pub mod click_aggregate;
pub mod click_event;
pub mod directory_entry;
pub mod shard_record;

pub use click_aggregate::Entity as ClickAggregateEntity;
pub use click_event::Entity as ClickEventEntity;
pub use directory_entry::Entity as DirectoryEntryEntity;
pub use shard_record::Entity as ShardRecordEntity;
