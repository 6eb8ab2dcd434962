//! Test doubles shared across unit tests.
//!
//! `StubEngine` simulates the engine contract with a scripted completion
//! order, so ordering tests can force any interleaving of completions
//! independent of submission order.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::engine::{EngineError, InferenceEngine, SlotId, WaitKind};
use crate::feeder::{CandidateInput, ImageTensor};

/// Route pipeline logs to the test writer, honoring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A tiny valid tensor whose first byte tags the candidate.
pub(crate) fn tensor(tag: u8) -> ImageTensor {
    ImageTensor::new([1, 2, 2], vec![tag, 0, 0, 0]).unwrap()
}

/// Candidate `i`, with the tag recoverable from the variant blob.
pub(crate) fn candidate(i: usize) -> CandidateInput {
    CandidateInput {
        image: tensor(i as u8),
        variant: vec![i as u8],
        alt_allele_indices: vec![i as u8, 0xAA],
    }
}

/// Deterministic genotype probabilities for tag `i`.
///
/// Built from binary fractions with short exact decimal expansions, so the
/// vector sums to exactly 1.0 and survives precision-10 rounding unchanged.
pub(crate) fn probs_for(tag: u8) -> Vec<f32> {
    let p = tag as f32 / 1024.0;
    vec![p, 0.5 - p, 0.5]
}

enum Slot {
    Empty,
    Running { seq: u64, output: Vec<f32> },
    Done { output: Vec<f32> },
}

impl Slot {
    fn is_running(&self) -> bool {
        matches!(self, Slot::Running { .. })
    }
}

struct Inner {
    slots: Vec<Slot>,
    /// Submission sequence numbers to complete, in order. Entries not yet
    /// running are skipped over; when the script is exhausted, the newest
    /// running request completes first (maximum disorder).
    script: VecDeque<u64>,
    next_seq: u64,
    running: usize,
    max_running: usize,
    waits: usize,
    fail_wait_at: Option<usize>,
}

impl Inner {
    fn complete_one(&mut self) {
        let running_seq = |slots: &[Slot], seq: u64| {
            slots.iter().any(|s| matches!(s, Slot::Running { seq: q, .. } if *q == seq))
        };

        let chosen = self
            .script
            .iter()
            .position(|seq| running_seq(&self.slots, *seq))
            .and_then(|pos| self.script.remove(pos))
            .or_else(|| {
                // Script exhausted (or nothing in it is running yet).
                self.slots
                    .iter()
                    .filter_map(|s| match s {
                        Slot::Running { seq, .. } => Some(*seq),
                        _ => None,
                    })
                    .max()
            });

        let Some(chosen) = chosen else {
            panic!("complete_one with no running request");
        };
        for slot in &mut self.slots {
            if matches!(slot, Slot::Running { seq, .. } if *seq == chosen) {
                let Slot::Running { output, .. } = std::mem::replace(slot, Slot::Empty) else {
                    unreachable!();
                };
                *slot = Slot::Done { output };
                self.running -= 1;
                return;
            }
        }
        unreachable!("chosen seq not running");
    }
}

pub(crate) struct StubEngine {
    inner: Mutex<Inner>,
}

impl StubEngine {
    /// `script` lists submission sequence numbers (== logical indices, since
    /// the dispatcher submits in logical order) in desired completion order.
    pub(crate) fn new(num_slots: usize, script: Vec<u64>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: (0..num_slots).map(|_| Slot::Empty).collect(),
                script: script.into(),
                next_seq: 0,
                running: 0,
                max_running: 0,
                waits: 0,
                fail_wait_at: None,
            }),
        }
    }

    /// Fail the `n`-th wait call (0-based).
    pub(crate) fn with_wait_failure(self, n: usize) -> Self {
        self.inner.lock().unwrap().fail_wait_at = Some(n);
        self
    }

    pub(crate) fn waits(&self) -> usize {
        self.inner.lock().unwrap().waits
    }

    /// High-water mark of concurrently running requests.
    pub(crate) fn max_running(&self) -> usize {
        self.inner.lock().unwrap().max_running
    }
}

#[async_trait::async_trait]
impl InferenceEngine for StubEngine {
    fn num_requests(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    fn idle_request(&self) -> Option<SlotId> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .position(|s| !s.is_running())
            .map(SlotId::new)
    }

    fn start_infer(&self, slot: SlotId, tensor: ImageTensor) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            !inner.slots[slot.index()].is_running(),
            "start_infer on running slot {slot}"
        );
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots[slot.index()] = Slot::Running {
            seq,
            output: probs_for(tensor.data()[0]),
        };
        inner.running += 1;
        inner.max_running = inner.max_running.max(inner.running);
        Ok(())
    }

    async fn wait(&self, kind: WaitKind) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let wait_no = inner.waits;
        inner.waits += 1;
        if inner.fail_wait_at == Some(wait_no) {
            return Err(EngineError::WaitFailed("injected wait failure".into()));
        }

        match kind {
            WaitKind::AnyIdle => {
                if inner.slots.iter().all(|s| s.is_running()) {
                    inner.complete_one();
                }
            }
            WaitKind::All => {
                while inner.running > 0 {
                    inner.complete_one();
                }
            }
        }
        Ok(())
    }

    fn read_output(&self, slot: SlotId) -> Result<Vec<f32>, EngineError> {
        let inner = self.inner.lock().unwrap();
        match &inner.slots[slot.index()] {
            Slot::Done { output } => Ok(output.clone()),
            _ => Err(EngineError::OutputUnavailable(slot)),
        }
    }
}
