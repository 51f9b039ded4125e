//! A priority queue of simulation plans.
//!
//! Every simulation step is made of several phases that must run in a fixed order at the same
//! simulation time: agents move, the spatial index is rebuilt from the new positions, the disease
//! state machine consumes the neighbor sets, and finally agents steer away from threats for the
//! next step. `Context` stores these phases (and any user callbacks) as *plans* in a `Queue`
//! ordered by time, then by [`StepPhase`], then by insertion order.
//!
//! Adding a plan is *O*(log(*n*)); cancellation and retrieval are *O*(1) amortized.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{HashMap, HashMapExt};

/// The phase a plan belongs to. Plans scheduled for the same time run in this order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepPhase {
    /// Positions advance and velocities are re-randomized.
    Movement,
    /// Per-status spatial structures are rebuilt and neighbor sets attached.
    Indexing,
    /// Contagion, transitions, diagnosis, isolation, hospitalization, restrictions.
    Disease,
    /// Velocity directions are turned away from nearby threats.
    Avoidance,
    /// Anything that should observe the completed step, e.g. stopping the run.
    Observation,
}

/// A time-ordered queue of plans carrying data of type `T`.
///
/// The ordering keys are kept in a binary heap; the payloads live in a map keyed by plan id.
/// Cancelling a plan removes its payload and the stale heap entry is skipped on retrieval.
pub struct Queue<T> {
    queue: BinaryHeap<Entry>,
    data_map: HashMap<u64, T>,
    plan_counter: u64,
}

impl<T> Queue<T> {
    #[must_use]
    pub fn new() -> Queue<T> {
        Queue {
            queue: BinaryHeap::new(),
            data_map: HashMap::new(),
            plan_counter: 0,
        }
    }

    /// Adds a plan at `time` in the given phase and returns an id that can cancel it.
    pub fn add_plan(&mut self, time: f64, data: T, phase: StepPhase) -> PlanId {
        let id = self.plan_counter;
        self.queue.push(Entry { time, phase, id });
        self.data_map.insert(id, data);
        self.plan_counter += 1;
        PlanId { id }
    }

    /// Cancels a pending plan. Returns `false` if it already ran or was cancelled.
    pub fn cancel_plan(&mut self, id: PlanId) -> bool {
        self.data_map.remove(&id.id).is_some()
    }

    /// Removes and returns the earliest pending plan.
    pub fn get_next_plan(&mut self) -> Option<Plan<T>> {
        while let Some(entry) = self.queue.pop() {
            if let Some(data) = self.data_map.remove(&entry.id) {
                return Some(Plan {
                    time: entry.time,
                    phase: entry.phase,
                    data,
                });
            }
        }
        None
    }

    /// Number of plans still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_map.is_empty()
    }

    /// Drops every pending plan.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.data_map.clear();
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PartialEq, Debug)]
struct Entry {
    time: f64,
    phase: StepPhase,
    id: u64,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `BinaryHeap` is a max-heap, so every comparison is reversed to pop the earliest time, then the
/// earliest phase, then the oldest plan.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.phase.cmp(&other.phase))
            .then(self.id.cmp(&other.id))
            .reverse()
    }
}

/// Identifies a plan added to a `Queue`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlanId {
    id: u64,
}

/// A plan popped from the queue.
pub struct Plan<T> {
    pub time: f64,
    pub phase: StepPhase,
    pub data: T,
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::{Queue, StepPhase};

    #[test]
    fn empty_queue() {
        let mut plan_queue = Queue::<()>::new();
        assert!(plan_queue.get_next_plan().is_none());
        assert!(plan_queue.is_empty());
    }

    #[test]
    fn plans_pop_in_time_order() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1, StepPhase::Movement);
        plan_queue.add_plan(3.0, 3, StepPhase::Movement);
        plan_queue.add_plan(2.0, 2, StepPhase::Movement);

        let times: Vec<(f64, i32)> = std::iter::from_fn(|| plan_queue.get_next_plan())
            .map(|plan| (plan.time, plan.data))
            .collect();
        assert_eq!(times, vec![(1.0, 1), (2.0, 2), (3.0, 3)]);
    }

    #[test]
    fn phases_order_plans_at_the_same_time() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, "avoid", StepPhase::Avoidance);
        plan_queue.add_plan(1.0, "disease", StepPhase::Disease);
        plan_queue.add_plan(1.0, "index", StepPhase::Indexing);
        plan_queue.add_plan(1.0, "move", StepPhase::Movement);
        plan_queue.add_plan(0.5, "earlier", StepPhase::Observation);

        let order: Vec<&str> = std::iter::from_fn(|| plan_queue.get_next_plan())
            .map(|plan| plan.data)
            .collect();
        assert_eq!(order, vec!["earlier", "move", "index", "disease", "avoid"]);
    }

    #[test]
    fn same_time_and_phase_keeps_insertion_order() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1, StepPhase::Disease);
        plan_queue.add_plan(1.0, 2, StepPhase::Disease);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 1);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 2);
    }

    #[test]
    fn cancelled_plans_are_skipped() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1, StepPhase::Movement);
        let plan_to_cancel = plan_queue.add_plan(2.0, 2, StepPhase::Movement);
        plan_queue.add_plan(3.0, 3, StepPhase::Movement);
        assert!(plan_queue.cancel_plan(plan_to_cancel));
        assert!(!plan_queue.cancel_plan(plan_to_cancel));
        assert_eq!(plan_queue.len(), 2);

        assert_eq!(plan_queue.get_next_plan().unwrap().data, 1);
        assert_eq!(plan_queue.get_next_plan().unwrap().data, 3);
        assert!(plan_queue.get_next_plan().is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let mut plan_queue = Queue::new();
        plan_queue.add_plan(1.0, 1, StepPhase::Movement);
        plan_queue.clear();
        assert!(plan_queue.get_next_plan().is_none());
    }
}
