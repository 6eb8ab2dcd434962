//! In-order reassembly of out-of-order completions.
//!
//! Every submitted candidate gets a pending entry keyed by its logical index
//! (submission order). Completions fill entries in whatever order the engine
//! finishes them; [`Reassembler::pop_ready`] releases entries strictly in
//! logical-index order. This is the only place output ordering is enforced.

use std::collections::BTreeMap;

/// Bookkeeping bugs surfaced as errors: a harvest routed to an index the
/// reassembler does not know about, or filled twice. Fatal, like any other
/// slot-accounting failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReassemblyError {
    #[error("no pending call for logical index {0}")]
    UnknownIndex(u64),

    #[error("call {0} already has probabilities")]
    AlreadyFilled(u64),
}

/// A submitted call awaiting its probabilities.
///
/// `probabilities` is the explicit completion flag: `None` until the slot's
/// output buffer is harvested, then filled exactly once. An all-zero vector
/// is a completed result like any other.
#[derive(Debug)]
struct PendingCall {
    variant: Vec<u8>,
    alt_allele_indices: Vec<u8>,
    probabilities: Option<Vec<f32>>,
}

/// A completed call, popped in submission order.
#[derive(Debug)]
pub struct CompletedCall {
    pub index: u64,
    pub variant: Vec<u8>,
    pub alt_allele_indices: Vec<u8>,
    pub probabilities: Vec<f32>,
}

/// Sparse buffer of completed-but-blocked calls.
///
/// Invariant: every index below `next_expected` has been popped and removed;
/// the buffer holds only the tail still waiting on completion or on a lower
/// index. Its size is bounded by in-flight requests plus one batch.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: BTreeMap<u64, PendingCall>,
    next_expected: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call at submission time, probabilities unset.
    pub fn insert(&mut self, index: u64, variant: Vec<u8>, alt_allele_indices: Vec<u8>) {
        debug_assert!(index >= self.next_expected, "logical indices never reused");
        let replaced = self.pending.insert(
            index,
            PendingCall {
                variant,
                alt_allele_indices,
                probabilities: None,
            },
        );
        debug_assert!(replaced.is_none(), "logical index {index} inserted twice");
    }

    /// Store a harvested output vector. Fills exactly once.
    pub fn fill(&mut self, index: u64, probabilities: Vec<f32>) -> Result<(), ReassemblyError> {
        let call = self
            .pending
            .get_mut(&index)
            .ok_or(ReassemblyError::UnknownIndex(index))?;
        if call.probabilities.is_some() {
            return Err(ReassemblyError::AlreadyFilled(index));
        }
        call.probabilities = Some(probabilities);
        Ok(())
    }

    /// Whether `index` already has probabilities (popped entries count as
    /// filled).
    pub fn is_filled(&self, index: u64) -> bool {
        if index < self.next_expected {
            return true;
        }
        self.pending
            .get(&index)
            .is_some_and(|call| call.probabilities.is_some())
    }

    /// Pop the next-expected call if it has completed.
    ///
    /// Call repeatedly after every harvest and during drain; stops at the
    /// first gap or unfilled entry.
    pub fn pop_ready(&mut self) -> Option<CompletedCall> {
        let front = self.pending.get(&self.next_expected)?;
        front.probabilities.as_ref()?;

        let index = self.next_expected;
        // Both lookups succeeded above.
        let call = self.pending.remove(&index)?;
        self.next_expected += 1;
        Some(CompletedCall {
            index,
            variant: call.variant,
            alt_allele_indices: call.alt_allele_indices,
            probabilities: call.probabilities?,
        })
    }

    /// Next logical index to emit; equals the count of calls popped so far.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
