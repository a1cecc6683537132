//! Shard-map cache: an eventually-consistent local view of shard placement
//!
//! - Placement records and the shard-document schema (`record`)
//! - The concurrent database → shard-set table (`table`)
//! - The change-feed boundary the cache consumes (`feed`)
//! - The cache itself: subscriber task, restart, fatal escalation (`cache`)

pub mod cache;
pub mod feed;
pub mod record;
pub mod table;

pub use cache::{ShardMapCache, SubscriberState};
pub use feed::{ChangeEvent, ChangeFeed, ChangeSource, Cursor};
pub use record::{covers_hash_space, parse_shard_doc, HashRange, ShardRecord};
pub use table::ShardTable;
