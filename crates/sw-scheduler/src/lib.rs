//! Multi-tier background work scheduler.
//!
//! Four queues (media info, fingerprint, intro skip, episode refresh) each
//! get a long-running [`QueueWorker`] that wakes at most once per throttle
//! interval, drains its queue, and dispatches the batch under one of two
//! shared [`ConcurrencyBudget`]s. Business logic is supplied per queue
//! through [`QueueHandler`].

pub mod admission;
pub mod barrier;
pub mod budget;
pub mod context;
pub mod handler;
pub mod handoff;
pub mod hooks;
pub mod lifecycle;
pub mod queue;
pub mod scope;
pub mod status;
pub mod sweep;
pub mod worker;

pub use admission::{ActiveScans, ScanProbe};
pub use budget::{BudgetPermit, ConcurrencyBudget};
pub use context::{ConfigStore, SchedulerContext};
pub use handler::{DispatchContext, Handlers, QueueHandler};
pub use hooks::{EnqueueHooks, LibraryEvent};
pub use lifecycle::Scheduler;
pub use queue::WorkQueue;
pub use scope::{ItemScope, ItemScopes};
pub use status::SchedulerStatus;
pub use sweep::SweepSource;
pub use worker::{QueueWorker, WorkerState};
