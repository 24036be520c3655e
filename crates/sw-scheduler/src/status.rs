//! Serializable status snapshots.

use serde::Serialize;

use sw_core::QueueKind;

use crate::budget::ConcurrencyBudget;
use crate::worker::WorkerCounters;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub queues: Vec<QueueStatus>,
    pub primary: BudgetStatus,
    pub secondary: BudgetStatus,
    /// Item scopes currently registered by in-flight dispatches.
    pub active_scopes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue: QueueKind,
    pub pending: usize,
    pub running: bool,
    /// Counters of the most recent worker, if one was ever started.
    pub worker: Option<WorkerCounters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub name: &'static str,
    pub capacity: usize,
    pub available: usize,
    pub in_flight: usize,
    pub generation: u64,
}

impl BudgetStatus {
    pub fn of(budget: &ConcurrencyBudget) -> Self {
        Self {
            name: budget.name(),
            capacity: budget.capacity(),
            available: budget.available(),
            in_flight: budget.in_flight(),
            generation: budget.generation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_status_serializes() {
        let budget = ConcurrencyBudget::new("primary", 2);
        let _permit = budget.try_acquire().unwrap();
        let status = BudgetStatus::of(&budget);
        assert_eq!(status.available, 1);
        assert_eq!(status.in_flight, 1);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["name"], "primary");
        assert_eq!(json["capacity"], 2);
    }
}
