pub mod base;
pub mod plain_store;
pub mod rest_store;

pub use base::{create_profile_store, ProfileStore, ProfileStoreConfig};
