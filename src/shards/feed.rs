//! Change-feed boundary
//!
//! The authoritative shard configuration lives elsewhere; this module
//! defines the events and the subscription trait the shard-map cache
//! consumes. The trait is injectable so tests (and embedders) can bind the
//! cache to any feed implementation.

use crate::common::Result;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, totally-ordered position in the change feed.
///
/// `Cursor::zero()` is "beginning of time": a subscription opened there
/// replays the full history.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Cursor(u64);

impl Cursor {
    pub fn zero() -> Self {
        Cursor(0)
    }

    pub fn new(seq: u64) -> Self {
        Cursor(seq)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One event on the shard-configuration feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Stream opened.
    Begin,
    /// The shard configuration of database `id` changed (or the database
    /// was deleted). `doc` is the new shard document; `seq` the position
    /// the cache may resume from once the event is applied.
    Changed {
        id: String,
        deleted: bool,
        doc: serde_json::Value,
        seq: Cursor,
    },
    /// Periodic liveness ping; carries no position.
    Heartbeat,
    /// The source closed the stream deliberately (e.g. caught up to the
    /// current end). `last_seq` is the resume point.
    Ended { last_seq: Cursor },
}

/// A live subscription: an ordered stream of events. `Err` items are
/// transient transport failures; the consumer reopens the subscription.
pub type ChangeFeed = BoxStream<'static, Result<ChangeEvent>>;

/// A source of shard-configuration changes.
pub trait ChangeSource: Send + Sync + 'static {
    /// Open the feed named `feed`, replaying from `since` onward. The
    /// source may redeliver events at or before `since`; consumers must
    /// apply idempotently.
    fn subscribe(&self, feed: &str, since: Cursor) -> BoxFuture<'static, Result<ChangeFeed>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_ordering() {
        assert!(Cursor::zero() < Cursor::new(1));
        assert!(Cursor::new(41) < Cursor::new(42));
        assert_eq!(Cursor::default(), Cursor::zero());
    }

    #[test]
    fn test_cursor_display() {
        assert_eq!(Cursor::new(42).to_string(), "42");
    }
}
