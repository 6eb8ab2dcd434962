//! Hardware inference engine seam.
//!
//! The pipeline never talks to inference hardware directly; it drives an
//! [`InferenceEngine`]: a fixed pool of request slots, each running at most
//! one asynchronous inference at a time. Completion is observed by polling
//! ([`InferenceEngine::idle_request`]) and by blocking waits
//! ([`InferenceEngine::wait`]), never through callbacks.

mod threaded;

pub use threaded::ThreadedEngine;

use crate::feeder::ImageTensor;

/// Identifier of one inference request slot, `0..N-1` for a pool of `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition to block on in [`InferenceEngine::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// At least one slot is idle (completed, or never used).
    AnyIdle,
    /// Every in-flight request has completed.
    All,
}

/// Engine failures. All of these are unrecoverable: a stalled or errored
/// engine cannot make partial progress safely, so the pipeline aborts rather
/// than retry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine wait failed: {0}")]
    WaitFailed(String),

    /// The engine reported a successful wait but still has no idle slot.
    #[error("no idle slot after successful wait")]
    NoIdleSlot,

    #[error("invalid slot id {0}")]
    InvalidSlot(SlotId),

    #[error("failed to start inference on slot {slot}: {message}")]
    Infer { slot: SlotId, message: String },

    /// Output buffer read before the slot's request completed.
    #[error("output buffer not ready on slot {0}")]
    OutputUnavailable(SlotId),
}

/// Contract of an asynchronous inference engine with a fixed request pool.
///
/// A slot is *idle* when it has never run a request or when its last request
/// has completed; an idle slot's output buffer stays readable until the slot
/// is reused. `wait(WaitKind::All)` with nothing in flight must return
/// immediately.
#[async_trait::async_trait]
pub trait InferenceEngine: Send + Sync + 'static {
    /// Size of the request pool.
    fn num_requests(&self) -> usize;

    /// An idle slot, if any. Does not block.
    fn idle_request(&self) -> Option<SlotId>;

    /// Start asynchronous inference on `slot`. Does not block; the result
    /// becomes readable via [`read_output`](Self::read_output) once a wait
    /// reports the slot idle again. The caller must only start requests on
    /// idle slots.
    fn start_infer(&self, slot: SlotId, tensor: ImageTensor) -> Result<(), EngineError>;

    /// Block until `kind` holds.
    async fn wait(&self, kind: WaitKind) -> Result<(), EngineError>;

    /// Read the completed output vector for `slot`.
    fn read_output(&self, slot: SlotId) -> Result<Vec<f32>, EngineError>;
}
