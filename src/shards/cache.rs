//! Shard-map cache
//!
//! Owns the single subscriber task that drives the [`ShardTable`] from a
//! [`ChangeSource`]. The subscriber is an explicit state machine:
//!
//! ```text
//! Starting ──open ok──▶ Listening ──ended/stream lost──▶ Restarting
//!    ▲                      │                                │
//!    └────────── backoff elapsed ◀───────────────────────────┘
//!                           │
//!                 table corrupted (fatal)
//!                           ▼
//!                        Stopped
//! ```
//!
//! Transient subscription failures are retried forever with a fixed backoff,
//! resuming from the last acknowledged cursor. A structurally unusable table
//! is fatal: the cache signals its supervisor once and stops, since the
//! table's contents can no longer be trusted and only a full rebuild helps.

use crate::common::{CacheConfig, Error, Result};
use crate::shards::feed::{ChangeEvent, ChangeFeed, ChangeSource, Cursor};
use crate::shards::record::parse_shard_doc;
use crate::shards::table::ShardTable;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Subscriber lifecycle. Cursor bookkeeping lives in the variants so the
/// resume logic is visible in the transitions themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Opening a subscription from `since`.
    Starting { since: Cursor },
    /// Consuming events; `last` is the cursor of the last applied event.
    Listening { last: Cursor },
    /// Waiting out the backoff before reopening from `resume`.
    Restarting { resume: Cursor },
    /// Terminal: clean shutdown or fatal table failure.
    Stopped,
}

/// Input alphabet of the subscriber state machine. [`run`] turns IO
/// outcomes into signals; [`transition`] is the pure step function, so
/// the resume-cursor rules can be checked without a live feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedSignal {
    /// Subscription opened.
    Opened,
    /// Subscription could not be opened.
    OpenFailed,
    /// One event applied; cursor after it.
    Applied(Cursor),
    /// The source closed the stream deliberately at this cursor.
    StreamEnded(Cursor),
    /// The stream failed or closed without an end event.
    StreamLost,
    /// The table is structurally unusable.
    TableFatal,
    ShutdownRequested,
    BackoffElapsed,
}

fn transition(state: SubscriberState, signal: FeedSignal) -> SubscriberState {
    use FeedSignal::*;
    use SubscriberState::*;
    match (state, signal) {
        (_, ShutdownRequested) | (_, TableFatal) => Stopped,
        (Starting { since }, Opened) => Listening { last: since },
        (Starting { since }, OpenFailed) => Restarting { resume: since },
        (Listening { .. }, Applied(cursor)) => Listening { last: cursor },
        (Listening { .. }, StreamEnded(resume)) => Restarting { resume },
        (Listening { last }, StreamLost) => Restarting { resume: last },
        (Restarting { resume }, BackoffElapsed) => Starting { since: resume },
        // A signal that cannot arise in a state leaves it unchanged.
        (state, _) => state,
    }
}

/// Outcome of applying one feed event.
#[derive(Debug, PartialEq, Eq)]
enum Applied {
    /// Keep listening; cursor after this event.
    Advanced(Cursor),
    /// The source closed the stream deliberately; resume from here.
    Ended(Cursor),
}

/// Apply one event to the table. Only table corruption is an error; a
/// malformed shard document is logged and skipped so one bad database
/// cannot take down the whole cluster view.
fn apply_event(table: &ShardTable, event: ChangeEvent, cursor: Cursor) -> Result<Applied> {
    match event {
        ChangeEvent::Begin => {
            debug!("Shard feed started");
            Ok(Applied::Advanced(cursor))
        }
        ChangeEvent::Heartbeat => Ok(Applied::Advanced(cursor)),
        ChangeEvent::Changed {
            id,
            deleted: true,
            seq,
            ..
        } => {
            table.remove(&id)?;
            debug!("Dropped shard map for {} (seq {})", id, seq);
            Ok(Applied::Advanced(seq))
        }
        ChangeEvent::Changed {
            id,
            deleted: false,
            doc,
            seq,
        } => {
            match parse_shard_doc(&id, &doc) {
                Ok(records) => {
                    table.replace(&id, records)?;
                    debug!("Updated shard map for {} (seq {})", id, seq);
                }
                Err(e) => warn!("Skipping shard document for {}: {}", id, e),
            }
            Ok(Applied::Advanced(seq))
        }
        ChangeEvent::Ended { last_seq } => Ok(Applied::Ended(last_seq)),
    }
}

async fn run(
    source: Arc<dyn ChangeSource>,
    table: Arc<ShardTable>,
    config: CacheConfig,
    mut shutdown: watch::Receiver<bool>,
    fatal: oneshot::Sender<Error>,
) {
    let mut fatal = Some(fatal);
    let mut feed: Option<ChangeFeed> = None;
    let mut state = SubscriberState::Starting {
        since: Cursor::zero(),
    };

    loop {
        let signal = match state {
            SubscriberState::Starting { since } => {
                debug!("Opening shard feed {} from cursor {}", config.feed, since);
                tokio::select! {
                    _ = shutdown.changed() => FeedSignal::ShutdownRequested,
                    opened = source.subscribe(&config.feed, since) => match opened {
                        Ok(stream) => {
                            feed = Some(stream);
                            FeedSignal::Opened
                        }
                        Err(e) => {
                            warn!("Shard feed open failed, retrying from {}: {}", since, e);
                            FeedSignal::OpenFailed
                        }
                    }
                }
            }

            SubscriberState::Listening { last } => {
                enum Next {
                    Shutdown,
                    Item(Option<Result<ChangeEvent>>),
                }
                let next = match feed.as_mut() {
                    Some(stream) => tokio::select! {
                        _ = shutdown.changed() => Next::Shutdown,
                        item = stream.next() => Next::Item(item),
                    },
                    None => Next::Item(None),
                };
                match next {
                    Next::Shutdown => FeedSignal::ShutdownRequested,
                    Next::Item(Some(Ok(event))) => match apply_event(&table, event, last) {
                        Ok(Applied::Advanced(cursor)) => FeedSignal::Applied(cursor),
                        Ok(Applied::Ended(resume)) => {
                            feed = None;
                            debug!("Shard feed ended at cursor {}", resume);
                            FeedSignal::StreamEnded(resume)
                        }
                        Err(e) => {
                            error!("Shard table unusable, cache stopping: {}", e);
                            if let Some(tx) = fatal.take() {
                                let _ = tx.send(e);
                            }
                            FeedSignal::TableFatal
                        }
                    },
                    Next::Item(Some(Err(e))) => {
                        feed = None;
                        warn!("Shard feed failed, resuming from {}: {}", last, e);
                        FeedSignal::StreamLost
                    }
                    Next::Item(None) => {
                        feed = None;
                        warn!("Shard feed closed without end event, resuming from {}", last);
                        FeedSignal::StreamLost
                    }
                }
            }

            SubscriberState::Restarting { .. } => {
                tokio::select! {
                    _ = shutdown.changed() => FeedSignal::ShutdownRequested,
                    _ = tokio::time::sleep(config.retry_interval()) => FeedSignal::BackoffElapsed,
                }
            }

            SubscriberState::Stopped => break,
        };
        state = transition(state, signal);
    }

    info!("Shard-map subscriber stopped");
}

/// Process-wide shard-map cache: one table, one subscriber task.
///
/// Created at startup, torn down at shutdown. A fatal table failure is
/// reported through [`ShardMapCache::fatal`]; the supervisor's job is then
/// to rebuild the cache from scratch, replaying the feed from the
/// beginning of time.
pub struct ShardMapCache {
    table: Arc<ShardTable>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
    fatal: Option<oneshot::Receiver<Error>>,
}

impl ShardMapCache {
    /// Create the table and start the subscriber. Exactly one subscriber
    /// task runs per cache instance.
    pub fn spawn(source: Arc<dyn ChangeSource>, config: CacheConfig) -> Self {
        let table = Arc::new(ShardTable::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fatal_tx, fatal_rx) = oneshot::channel();

        info!(
            "Starting shard-map cache on feed {} (retry every {:?})",
            config.feed,
            config.retry_interval()
        );
        let task = tokio::spawn(run(source, table.clone(), config, shutdown_rx, fatal_tx));

        Self {
            table,
            shutdown: shutdown_tx,
            task: Some(task),
            fatal: Some(fatal_rx),
        }
    }

    /// Read handle for routing lookups.
    pub fn table(&self) -> Arc<ShardTable> {
        self.table.clone()
    }

    /// Resolves with the fatal error if the cache dies on an unusable
    /// table; resolves with `None` if the cache was shut down cleanly.
    pub async fn fatal(&mut self) -> Option<Error> {
        match self.fatal.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }

    /// Stop the subscriber and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
