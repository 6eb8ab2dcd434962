//! Request slot bookkeeping and idle-slot acquisition.
//!
//! The pool mirrors the engine's fixed slot array: which slots are busy and
//! which logical index each one last carried. It never touches the engine's
//! output buffers; harvesting is the dispatcher's job. The only blocking
//! point is [`RequestPool::acquire_idle`], which waits on the engine when no
//! slot is idle.

use crate::engine::{EngineError, InferenceEngine, SlotId, WaitKind};

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    busy: bool,
    /// Logical index of the last call submitted to this slot, `None` until
    /// first use. Survives `mark_idle` so drain can still route the harvest.
    occupant: Option<u64>,
}

/// Bookkeeping for the engine's fixed pool of request slots.
#[derive(Debug)]
pub struct RequestPool {
    slots: Vec<SlotState>,
}

impl RequestPool {
    pub fn new(num_slots: usize) -> Self {
        Self {
            slots: vec![SlotState::default(); num_slots],
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        (0..self.slots.len()).map(SlotId::new).collect()
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    /// Logical index that previously occupied `slot`, or `None` if the slot
    /// has never run a request. Tells the dispatcher whose result to harvest
    /// before reuse.
    pub fn previous_occupant(&self, slot: SlotId) -> Option<u64> {
        self.slots.get(slot.index()).and_then(|s| s.occupant)
    }

    pub fn mark_busy(&mut self, slot: SlotId, index: u64) {
        let Some(state) = self.slots.get_mut(slot.index()) else {
            debug_assert!(false, "mark_busy on unknown slot {slot}");
            tracing::error!(slot = %slot, "Bug: mark_busy on unknown slot");
            return;
        };
        state.busy = true;
        state.occupant = Some(index);
    }

    pub fn mark_idle(&mut self, slot: SlotId) {
        let Some(state) = self.slots.get_mut(slot.index()) else {
            debug_assert!(false, "mark_idle on unknown slot {slot}");
            tracing::error!(slot = %slot, "Bug: mark_idle on unknown slot");
            return;
        };
        state.busy = false;
    }

    /// Get an idle slot, blocking on the engine if none is available.
    ///
    /// A wait failure, or the engine reporting no idle slot after a
    /// successful wait, is fatal and never retried.
    pub async fn acquire_idle<E>(&self, engine: &E) -> Result<SlotId, EngineError>
    where
        E: InferenceEngine + ?Sized,
    {
        if let Some(slot) = engine.idle_request() {
            return self.check(slot);
        }

        tracing::trace!("no idle slot, waiting on engine");
        engine.wait(WaitKind::AnyIdle).await?;
        let slot = engine.idle_request().ok_or(EngineError::NoIdleSlot)?;
        self.check(slot)
    }

    fn check(&self, slot: SlotId) -> Result<SlotId, EngineError> {
        if slot.index() >= self.slots.len() {
            return Err(EngineError::InvalidSlot(slot));
        }
        Ok(slot)
    }
}
