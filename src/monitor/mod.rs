//! Call supervision: liveness tracking for scatter/gather workers
//!
//! - Worker references and the liveness-subscription boundary (`liveness`)
//! - Per-call monitors with race-free drain-on-stop (`call`)

pub mod call;
pub mod liveness;

pub use call::{CallSupervisor, MonitorId, NoticeReceiver, NoticeSender, TerminationNotice};
pub use liveness::{ExitReason, LivenessSource, WorkerRef};
