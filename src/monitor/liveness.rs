//! Worker references and the liveness-subscription boundary

use futures_util::future::BoxFuture;
use std::fmt;
use uuid::Uuid;

/// Reference to one remote worker of a distributed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerRef {
    /// Cluster member hosting the worker
    pub node: String,
    /// Worker identity on that node
    pub id: Uuid,
}

impl WorkerRef {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            id: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for WorkerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.id)
    }
}

/// Why a worker stopped being live. Passed through to the call owner
/// verbatim, never reinterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Worker finished normally.
    Normal,
    /// Worker crashed; carries the remote exit reason.
    Crash(String),
    /// Connection to the worker's node was lost.
    Disconnected(String),
    /// The liveness source cannot observe this worker at all.
    Unreachable,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Crash(reason) => write!(f, "crash: {}", reason),
            ExitReason::Disconnected(reason) => write!(f, "disconnected: {}", reason),
            ExitReason::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Subscription to the liveness of remote worker references.
///
/// `watch` resolves at most once, when the worker terminates for any
/// reason. Implementations that cannot observe a worker at all (transport
/// unavailable, unknown node) must resolve promptly with
/// [`ExitReason::Unreachable`] instead of hanging: the call owner's quorum
/// accounting depends on receiving a terminal event for every worker.
pub trait LivenessSource: Send + Sync + 'static {
    fn watch(&self, worker: &WorkerRef) -> BoxFuture<'static, ExitReason>;
}
