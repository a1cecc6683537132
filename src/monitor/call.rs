//! Per-call worker supervision
//!
//! A coordinator fans one logical request out to a set of remote workers
//! and must learn about every worker that dies before answering. Each call
//! gets one monitor: a task that watches the whole worker set and forwards
//! at most one [`TerminationNotice`] per worker to the owner's channel.
//!
//! Owners receive notices through a [`NoticeReceiver`] obtained from
//! [`CallSupervisor::channel`]. The receiver only yields notices whose
//! monitor is still registered, so `stop` drains in both directions: it
//! deregisters the monitor (burying anything already buffered in the
//! channel), signals the task, and waits for it to exit (preventing any
//! further sends). Once `stop` returns, nothing for that monitor can ever
//! be read again, and owners can reuse the channel for the next call
//! without fear of stale notices.

use crate::monitor::liveness::{ExitReason, LivenessSource, WorkerRef};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Identifier of one call monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(Uuid);

impl MonitorId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivered to the call owner when a monitored worker terminates.
/// At most one per worker per monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationNotice {
    pub monitor: MonitorId,
    pub worker: WorkerRef,
    pub reason: ExitReason,
}

/// Channel end a call owner hands to [`CallSupervisor::start`].
pub type NoticeSender = mpsc::UnboundedSender<TerminationNotice>;

struct MonitorHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<MonitorId, MonitorHandle>>>;

/// Owner side of the notice channel. Notices from monitors that have been
/// stopped (or were never started by this supervisor) are silently
/// discarded instead of delivered, even if they were already buffered when
/// the stop happened.
pub struct NoticeReceiver {
    rx: mpsc::UnboundedReceiver<TerminationNotice>,
    monitors: Registry,
}

impl NoticeReceiver {
    /// Next notice from a still-registered monitor, or `None` once every
    /// sender is gone.
    pub async fn recv(&mut self) -> Option<TerminationNotice> {
        while let Some(notice) = self.rx.recv().await {
            if self.is_live(&notice) {
                return Some(notice);
            }
            debug!("Discarding notice from stopped monitor {}", notice.monitor);
        }
        None
    }

    /// Non-blocking variant of [`NoticeReceiver::recv`].
    pub fn try_recv(&mut self) -> Result<TerminationNotice, mpsc::error::TryRecvError> {
        loop {
            let notice = self.rx.try_recv()?;
            if self.is_live(&notice) {
                return Ok(notice);
            }
            debug!("Discarding notice from stopped monitor {}", notice.monitor);
        }
    }

    fn is_live(&self, notice: &TerminationNotice) -> bool {
        self.monitors.lock().unwrap().contains_key(&notice.monitor)
    }
}

/// Registry of live call monitors, bound to one liveness source.
pub struct CallSupervisor {
    liveness: Arc<dyn LivenessSource>,
    monitors: Registry,
}

impl CallSupervisor {
    pub fn new(liveness: Arc<dyn LivenessSource>) -> Self {
        Self {
            liveness,
            monitors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a notice channel bound to this supervisor. The sender goes to
    /// [`CallSupervisor::start`]; the receiver drops notices from stopped
    /// monitors, which is what makes the channel safe to reuse across
    /// calls.
    pub fn channel(&self) -> (NoticeSender, NoticeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            NoticeReceiver {
                rx,
                monitors: self.monitors.clone(),
            },
        )
    }

    /// Begin observing every worker in `workers` for one distributed call.
    /// Returns immediately; notices arrive on `owner` as workers terminate.
    /// Duplicate references in the set are observed once.
    pub fn start(&self, owner: NoticeSender, workers: &[WorkerRef]) -> MonitorId {
        let id = MonitorId::new();

        let mut seen = HashSet::new();
        let watchers: FuturesUnordered<BoxFuture<'static, (WorkerRef, ExitReason)>> =
            FuturesUnordered::new();
        for worker in workers {
            if !seen.insert(worker.clone()) {
                continue;
            }
            let worker = worker.clone();
            let exit = self.liveness.watch(&worker);
            watchers.push(Box::pin(async move { (worker, exit.await) }));
        }

        debug!("Monitor {} watching {} workers", id, watchers.len());
        let (stop_tx, stop_rx) = oneshot::channel();
        // Register under the lock so the task cannot observe (or clear) a
        // registry the monitor is not in yet.
        let mut monitors = self.monitors.lock().unwrap();
        let task = tokio::spawn(run_monitor(
            id,
            watchers,
            owner,
            stop_rx,
            self.monitors.clone(),
        ));
        monitors.insert(id, MonitorHandle { stop_tx, task });
        id
    }

    /// Stop a monitor and wait until it can no longer deliver anything:
    /// the monitor is deregistered first, so notices it already buffered
    /// are dead on arrival, then the task is joined so nothing further is
    /// sent. Idempotent: stopping an unknown or already-stopped monitor is
    /// a no-op. Other monitors are unaffected.
    pub async fn stop(&self, id: MonitorId) {
        let handle = self.monitors.lock().unwrap().remove(&id);
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(());
            let _ = handle.task.await;
            debug!("Monitor {} stopped", id);
        }
    }

    /// Number of monitors currently registered.
    pub fn len(&self) -> usize {
        self.monitors.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn run_monitor(
    id: MonitorId,
    mut watchers: FuturesUnordered<BoxFuture<'static, (WorkerRef, ExitReason)>>,
    owner: NoticeSender,
    mut stop_rx: oneshot::Receiver<()>,
    monitors: Registry,
) {
    loop {
        tokio::select! {
            // Stop requested (or the supervisor itself was dropped): exit
            // without forwarding anything further, discarding terminations
            // that raced with the stop.
            _ = &mut stop_rx => {
                debug!("Monitor {} draining on stop", id);
                return;
            }
            terminated = watchers.next() => match terminated {
                Some((worker, reason)) => {
                    debug!("Monitor {}: worker {} terminated ({})", id, worker, reason);
                    let notice = TerminationNotice { monitor: id, worker, reason };
                    if owner.send(notice).is_err() {
                        // Owner went away without stopping us; deregister
                        // so the registry does not collect dead entries.
                        monitors.lock().unwrap().remove(&id);
                        debug!("Monitor {} owner gone, deregistered", id);
                        return;
                    }
                }
                // Every worker has terminated and been reported; stay
                // parked until stop so a late stop still joins cleanly.
                None => {
                    let _ = (&mut stop_rx).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Liveness source whose terminations are fired by the test.
    #[derive(Default)]
    struct FakeLiveness {
        exits: Mutex<HashMap<WorkerRef, oneshot::Sender<ExitReason>>>,
    }

    impl FakeLiveness {
        fn kill(&self, worker: &WorkerRef, reason: ExitReason) {
            let tx = self
                .exits
                .lock()
                .unwrap()
                .remove(worker)
                .expect("worker not watched");
            let _ = tx.send(reason);
        }
    }

    impl LivenessSource for FakeLiveness {
        fn watch(&self, worker: &WorkerRef) -> BoxFuture<'static, ExitReason> {
            let (tx, rx) = oneshot::channel();
            self.exits.lock().unwrap().insert(worker.clone(), tx);
            Box::pin(async move { rx.await.unwrap_or(ExitReason::Unreachable) })
        }
    }

    fn setup() -> (Arc<FakeLiveness>, CallSupervisor) {
        let liveness = Arc::new(FakeLiveness::default());
        let supervisor = CallSupervisor::new(liveness.clone());
        (liveness, supervisor)
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_notice_delivered_on_crash() {
        let (liveness, supervisor) = setup();
        let (tx, mut rx) = supervisor.channel();
        let worker = WorkerRef::new("node2@db2");
        let id = supervisor.start(tx, &[worker.clone()]);

        liveness.kill(&worker, ExitReason::Crash("badmatch".into()));

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.monitor, id);
        assert_eq!(notice.worker, worker);
        assert_eq!(notice.reason, ExitReason::Crash("badmatch".into()));
    }

    #[tokio::test]
    async fn test_duplicate_refs_observed_once() {
        let (liveness, supervisor) = setup();
        let (tx, mut rx) = supervisor.channel();
        let worker = WorkerRef::new("node1@db1");
        let id = supervisor.start(tx, &[worker.clone(), worker.clone(), worker.clone()]);

        liveness.kill(&worker, ExitReason::Normal);

        assert!(rx.recv().await.is_some());
        supervisor.stop(id).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_liveness, supervisor) = setup();
        let (tx, _rx) = supervisor.channel();
        let id = supervisor.start(tx, &[WorkerRef::new("node1@db1")]);

        supervisor.stop(id).await;
        supervisor.stop(id).await;
        assert!(supervisor.is_empty());
    }

    #[tokio::test]
    async fn test_monitors_are_isolated() {
        let (liveness, supervisor) = setup();
        let (tx_a, mut rx_a) = supervisor.channel();
        let (tx_b, mut rx_b) = supervisor.channel();
        let worker_a = WorkerRef::new("node1@db1");
        let worker_b = WorkerRef::new("node2@db2");
        let id_a = supervisor.start(tx_a, &[worker_a.clone()]);
        let id_b = supervisor.start(tx_b, &[worker_b.clone()]);

        supervisor.stop(id_a).await;
        liveness.kill(&worker_b, ExitReason::Disconnected("noconnection".into()));

        let notice = rx_b.recv().await.unwrap();
        assert_eq!(notice.monitor, id_b);
        assert!(rx_a.recv().await.is_none());
        supervisor.stop(id_b).await;
    }

    #[tokio::test]
    async fn test_all_workers_reported_then_stop_joins() {
        let (liveness, supervisor) = setup();
        let (tx, mut rx) = supervisor.channel();
        let w1 = WorkerRef::new("node1@db1");
        let w2 = WorkerRef::new("node2@db2");
        let id = supervisor.start(tx, &[w1.clone(), w2.clone()]);

        liveness.kill(&w1, ExitReason::Normal);
        liveness.kill(&w2, ExitReason::Normal);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());

        // Monitor has nothing left to report; stop still returns cleanly.
        supervisor.stop(id).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_buffered_notice_is_buried_by_stop() {
        let (liveness, supervisor) = setup();
        let (tx, mut rx) = supervisor.channel();
        let worker = WorkerRef::new("node1@db1");
        let id = supervisor.start(tx, &[worker.clone()]);

        // The notice lands in the owner channel while the owner is busy.
        liveness.kill(&worker, ExitReason::Crash("boom".into()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        supervisor.stop(id).await;

        // The buffered notice must not surface after stop.
        assert!(rx.try_recv().is_err());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_owner_going_away_deregisters_monitor() {
        let (liveness, supervisor) = setup();
        let (tx, rx) = supervisor.channel();
        let worker = WorkerRef::new("node1@db1");
        let id = supervisor.start(tx, &[worker.clone()]);
        assert_eq!(supervisor.len(), 1);

        // Owner abandons the channel; the next termination makes the
        // monitor notice and clean itself out of the registry.
        drop(rx);
        liveness.kill(&worker, ExitReason::Normal);

        let s = &supervisor;
        wait_for(move || s.is_empty()).await;
        // A late stop for the vanished monitor is still a no-op.
        supervisor.stop(id).await;
    }
}
