//! Entity module - Contains the SeaORM entity definitions for the database.
//! The storage area keeps every persisted collection as one serialized value
//! per key, so a single key-value table is all the schema there is.

pub mod storage_entry;

pub use storage_entry::{
    Column as StorageEntryColumn, Entity as StorageEntry, Model as StorageEntryModel,
};
