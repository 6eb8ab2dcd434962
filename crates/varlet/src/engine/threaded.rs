//! Engine implementation backed by the tokio blocking pool.
//!
//! Wraps a synchronous model function in the engine contract: each busy slot
//! corresponds to one in-flight `spawn_blocking` job, completion is observed
//! through per-slot state plus a generation counter on a watch channel.
//! Useful for local models and as the reference implementation of the
//! [`InferenceEngine`](super::InferenceEngine) contract.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use super::{EngineError, InferenceEngine, SlotId, WaitKind};
use crate::feeder::ImageTensor;

enum SlotState {
    Empty,
    Running,
    Done(Vec<f32>),
}

impl SlotState {
    fn is_running(&self) -> bool {
        matches!(self, SlotState::Running)
    }
}

type ModelFn = dyn Fn(&ImageTensor) -> Vec<f32> + Send + Sync;

pub struct ThreadedEngine {
    model: Arc<ModelFn>,
    slots: Arc<Vec<Mutex<SlotState>>>,
    /// Bumped once per completed request; waiters resubscribe and re-check.
    completions: watch::Sender<u64>,
}

impl ThreadedEngine {
    /// # Panics
    ///
    /// Panics if `num_slots` is zero.
    pub fn new<F>(num_slots: usize, model: F) -> Self
    where
        F: Fn(&ImageTensor) -> Vec<f32> + Send + Sync + 'static,
    {
        assert!(num_slots > 0, "engine needs at least one request slot");
        let (completions, _) = watch::channel(0);
        Self {
            model: Arc::new(model),
            slots: Arc::new((0..num_slots).map(|_| Mutex::new(SlotState::Empty)).collect()),
            completions,
        }
    }

    fn slot(&self, slot: SlotId) -> Result<&Mutex<SlotState>, EngineError> {
        self.slots
            .get(slot.index())
            .ok_or(EngineError::InvalidSlot(slot))
    }

    fn satisfied(&self, kind: WaitKind) -> bool {
        let running = |m: &Mutex<SlotState>| {
            m.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_running()
        };
        match kind {
            WaitKind::AnyIdle => !self.slots.iter().all(running),
            WaitKind::All => !self.slots.iter().any(running),
        }
    }
}

#[async_trait::async_trait]
impl InferenceEngine for ThreadedEngine {
    fn num_requests(&self) -> usize {
        self.slots.len()
    }

    fn idle_request(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|m| {
                !m.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .is_running()
            })
            .map(SlotId::new)
    }

    fn start_infer(&self, slot: SlotId, tensor: ImageTensor) -> Result<(), EngineError> {
        {
            let mut state = self
                .slot(slot)?
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if state.is_running() {
                return Err(EngineError::Infer {
                    slot,
                    message: "slot is still running".into(),
                });
            }
            *state = SlotState::Running;
        }

        let model = Arc::clone(&self.model);
        let slots = Arc::clone(&self.slots);
        let completions = self.completions.clone();
        tokio::task::spawn_blocking(move || {
            let output = (model)(&tensor);
            *slots[slot.index()]
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = SlotState::Done(output);
            completions.send_modify(|n| *n += 1);
        });
        tracing::trace!(slot = %slot, "blocking inference started");
        Ok(())
    }

    async fn wait(&self, kind: WaitKind) -> Result<(), EngineError> {
        let mut rx = self.completions.subscribe();
        loop {
            if self.satisfied(kind) {
                return Ok(());
            }
            rx.changed()
                .await
                .map_err(|_| EngineError::WaitFailed("engine dropped mid-wait".into()))?;
        }
    }

    fn read_output(&self, slot: SlotId) -> Result<Vec<f32>, EngineError> {
        let state = self
            .slot(slot)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*state {
            SlotState::Done(output) => Ok(output.clone()),
            _ => Err(EngineError::OutputUnavailable(slot)),
        }
    }
}
