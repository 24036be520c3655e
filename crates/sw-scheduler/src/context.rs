//! Shared scheduler context.
//!
//! [`SchedulerContext`] is the central struct shared by every worker, hook
//! and sweep. It wraps the queues, budgets and registries in `Arc`s and the
//! live configuration in a [`ConfigStore`] with reload support.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use sw_core::config::{Config, SchedulerConfig, StageConfig, SweepConfig};
use sw_core::events::{EventBus, EventPayload};
use sw_core::{QueueKind, WorkItem};

use crate::admission::{ActiveScans, ScanProbe};
use crate::budget::ConcurrencyBudget;
use crate::handler::Handlers;
use crate::queue::{WorkQueue, WorkQueues};
use crate::scope::ItemScopes;

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Live configuration read by workers at the start of every cycle.
///
/// All sections are behind [`RwLock`] so readers never block each other and
/// writes are short-lived.
#[derive(Debug)]
pub struct ConfigStore {
    scheduler: RwLock<SchedulerConfig>,
    stages: RwLock<StageConfig>,
    sweep: RwLock<SweepConfig>,
    /// Path to the config file for reloads (None = in-memory only).
    config_path: Option<PathBuf>,
}

impl ConfigStore {
    /// Build a new store from the given config and optional file path.
    pub fn new(config: &Config, config_path: Option<PathBuf>) -> Self {
        Self {
            scheduler: RwLock::new(config.scheduler.clone()),
            stages: RwLock::new(config.stages.clone()),
            sweep: RwLock::new(config.sweep.clone()),
            config_path,
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        self.scheduler.read().clone()
    }

    pub fn stages(&self) -> StageConfig {
        self.stages.read().clone()
    }

    pub fn sweep(&self) -> SweepConfig {
        self.sweep.read().clone()
    }

    /// Read a consistent snapshot of every section.
    pub fn snapshot(&self) -> Config {
        Config {
            scheduler: self.scheduler(),
            stages: self.stages(),
            sweep: self.sweep(),
        }
    }

    /// Replace every section.
    pub fn update(&self, config: &Config) {
        *self.scheduler.write() = config.scheduler.clone();
        *self.stages.write() = config.stages.clone();
        *self.sweep.write() = config.sweep.clone();
    }

    /// Re-read the config file, returning the new config on success.
    ///
    /// Parse or read failures are logged and leave the store untouched.
    pub fn reload(&self) -> Option<Config> {
        let path = self.config_path.as_ref()?;

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to read config for reload from {}: {e}", path.display());
                return None;
            }
        };

        match Config::from_json(&contents) {
            Ok(config) => {
                for warning in config.validate() {
                    tracing::warn!("Config warning: {warning}");
                }
                self.update(&config);
                tracing::info!("Config reloaded from {}", path.display());
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid config at {}: {e}", path.display());
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SchedulerContext
// ---------------------------------------------------------------------------

/// Everything a worker needs, cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct SchedulerContext {
    /// The four work queues.
    pub queues: Arc<WorkQueues>,
    /// Budget shared by all extraction-type work.
    pub primary: Arc<ConcurrencyBudget>,
    /// Budget for season aggregation and metadata-only refresh.
    pub secondary: Arc<ConcurrencyBudget>,
    /// Live configuration.
    pub config: Arc<ConfigStore>,
    /// Library scan state consulted by admission.
    pub scans: Arc<dyn ScanProbe>,
    /// Progress events.
    pub events: Arc<EventBus>,
    /// Scopes of in-flight dispatches.
    pub scopes: Arc<ItemScopes>,
    /// Queue-specific business logic.
    pub handlers: Arc<Handlers>,
}

impl SchedulerContext {
    /// Build a context with budgets sized from `config_store`.
    pub fn new(
        config_store: Arc<ConfigStore>,
        handlers: Handlers,
        scans: Arc<dyn ScanProbe>,
    ) -> Self {
        let sched = config_store.scheduler();
        Self {
            queues: Arc::new(WorkQueues::new()),
            primary: Arc::new(ConcurrencyBudget::new("primary", sched.primary())),
            secondary: Arc::new(ConcurrencyBudget::new("secondary", sched.secondary())),
            config: config_store,
            scans,
            events: Arc::new(EventBus::default()),
            scopes: Arc::new(ItemScopes::new()),
            handlers: Arc::new(handlers),
        }
    }

    /// Convenience constructor with an in-memory config and scan tracker.
    pub fn in_memory(config: &Config, handlers: Handlers) -> (Self, Arc<ActiveScans>) {
        let scans = Arc::new(ActiveScans::new());
        let store = Arc::new(ConfigStore::new(config, None));
        (Self::new(store, handlers, scans.clone()), scans)
    }

    pub fn queue(&self, kind: QueueKind) -> &WorkQueue {
        self.queues.get(kind)
    }

    /// The budget a queue's per-item work runs under.
    ///
    /// Metadata-only refresh is low priority and shares the secondary budget
    /// with season aggregation; everything else is extraction work.
    pub fn item_budget(&self, kind: QueueKind) -> &Arc<ConcurrencyBudget> {
        match kind {
            QueueKind::EpisodeRefresh => &self.secondary,
            _ => &self.primary,
        }
    }

    /// Push an item onto a queue and announce it.
    pub fn enqueue(&self, kind: QueueKind, item: WorkItem) {
        let item_id = item.id;
        self.queue(kind).enqueue(item);
        tracing::trace!(queue = %kind, item_id = %item_id, "Item queued");
        self.events
            .broadcast(EventPayload::ItemQueued { queue: kind, item_id });
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .finish_non_exhaustive()
    }
}
