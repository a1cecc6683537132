//! # shardmesh
//!
//! Cluster-coordination substrate for a distributed document store:
//! - Shard-map cache: an eventually-consistent local view of which shards
//!   of which databases live on which nodes, driven by an authoritative
//!   change feed and surviving subscription failures
//! - Call supervision: per-call liveness tracking of remote workers with
//!   at-most-once termination notices and race-free shutdown
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐  events   ┌───────────────┐  replace/remove
//!  │ ChangeSource ├──────────▶│ ShardMapCache ├───────────────┐
//!  │ (collaborator)│          │  subscriber   │               ▼
//!  └──────────────┘           └───────────────┘        ┌────────────┐
//!                                                      │ ShardTable │
//!  ┌──────────────┐   lookup / lookup_key              └─────▲──────┘
//!  │ Coordinator  ├──────────────────────────────────────────┘
//!  │ (collaborator)│
//!  └──────┬───────┘
//!         │ start/stop                 ┌────────────────┐  watch
//!         └───────────────────────────▶│ CallSupervisor ├────────▶ workers
//!                 TerminationNotice ◀──┤  per-call task │
//!                                      └────────────────┘
//! ```
//!
//! The coordinator, the change feed's transport, and the RPC layer are
//! collaborators: this crate consumes a [`shards::ChangeSource`] and a
//! [`monitor::LivenessSource`] and exposes the table and the supervisor.
//!
//! ## Usage
//!
//! ```ignore
//! let cache = ShardMapCache::spawn(change_source, Config::load()?.cache);
//! let table = cache.table();
//! let shards = table.lookup_key("orders", "order-8421")?;
//!
//! let supervisor = CallSupervisor::new(liveness_source);
//! let (tx, mut rx) = supervisor.channel();
//! let monitor = supervisor.start(tx, &workers);
//! // ... gather responses, consume rx for dead workers ...
//! supervisor.stop(monitor).await;
//! ```

pub mod common;
pub mod monitor;
pub mod shards;

// Re-export commonly used types
pub use common::{CacheConfig, Config, Error, Result};
pub use monitor::{
    CallSupervisor, ExitReason, LivenessSource, MonitorId, NoticeReceiver, NoticeSender,
    TerminationNotice, WorkerRef,
};
pub use shards::{ChangeEvent, ChangeSource, Cursor, ShardMapCache, ShardRecord, ShardTable};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
