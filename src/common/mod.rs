//! Common utilities and types shared across shardmesh

pub mod config;
pub mod error;
pub mod hash;

pub use config::{CacheConfig, Config};
pub use error::{Error, Result};
pub use hash::{key_hash, HASH_SPACE_END};
