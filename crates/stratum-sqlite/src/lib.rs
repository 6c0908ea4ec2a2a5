#![doc = include_str!("../README.md")]

/// This module provides the pooled `SQLite` connections used by factories and
/// sessions.
pub mod connection;

/// This module provides the convention-based automapper and the serializable
/// engine configuration it produces.
pub mod mapping;

/// This module provides the file-backed cache of a built engine
/// configuration.
pub mod config_cache;

mod factory;
mod session;
mod store;

pub use factory::SqliteSessionFactory;
pub use store::{add_store, init, CacheConfig, InitStoreError, StoreConfig};
