//! Producer loop: feed candidates into engine slots, harvest completions,
//! keep the reassembler advancing.
//!
//! Completion is detected lazily, at slot-reuse time: when the engine hands
//! back a slot as idle, whatever ran there last has finished and its output
//! buffer is read before the slot is reused. No completion callbacks exist
//! anywhere in the pipeline.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::{InferenceEngine, SlotId, WaitKind};
use crate::feeder::{BatchSource, CandidateInput};
use crate::likelihood;
use crate::pipeline::{CallOutput, PipelineConfig, PipelineError};
use crate::pool::RequestPool;
use crate::reassembly::Reassembler;

/// The pipeline context: single owner of the engine handle, slot table and
/// reassembly buffer. Runs on one spawned task; only finished calls cross
/// the task boundary, through the output channel.
pub(crate) struct Dispatcher<E: ?Sized, S> {
    engine: Arc<E>,
    source: S,
    pool: RequestPool,
    reassembler: Reassembler,
    next_index: u64,
    config: PipelineConfig,
    tx: mpsc::Sender<Result<CallOutput, PipelineError>>,
}

impl<E, S> Dispatcher<E, S>
where
    E: InferenceEngine + ?Sized,
    S: BatchSource,
{
    pub(crate) fn new(
        engine: Arc<E>,
        source: S,
        config: PipelineConfig,
        tx: mpsc::Sender<Result<CallOutput, PipelineError>>,
    ) -> Self {
        let pool = RequestPool::new(engine.num_requests());
        Self {
            engine,
            source,
            pool,
            reassembler: Reassembler::new(),
            next_index: 0,
            config,
            tx,
        }
    }

    /// Run to completion. Fatal errors are forwarded into the output channel
    /// so the consumer sees them instead of a silent end-of-stream.
    pub(crate) async fn run(mut self) {
        match self.produce().await {
            Ok(()) => {
                tracing::debug!(submitted = self.next_index, "pipeline drained");
            }
            Err(PipelineError::OutputClosed) => {
                tracing::debug!("consumer dropped, stopping producer");
            }
            Err(err) => {
                tracing::error!(error = %err, "pipeline failed");
                let _ = self.tx.send(Err(err)).await;
            }
        }
    }

    async fn produce(&mut self) -> Result<(), PipelineError> {
        let mut batches: u64 = 0;
        while let Some(batch) = self.source.next_batch().await? {
            for item in batch {
                self.submit(item).await?;
            }
            batches += 1;
            if self.config.max_batches.is_some_and(|max| batches >= max) {
                tracing::info!(batches, "batch limit reached, draining");
                break;
            }
        }
        self.drain().await
    }

    async fn submit(&mut self, item: CandidateInput) -> Result<(), PipelineError> {
        let slot = self.pool.acquire_idle(self.engine.as_ref()).await?;
        self.harvest(slot)?;

        let index = self.next_index;
        self.next_index += 1;
        self.reassembler
            .insert(index, item.variant, item.alt_allele_indices);
        self.pool.mark_busy(slot, index);
        self.engine.start_infer(slot, item.image)?;
        tracing::trace!(slot = %slot, index, "inference started");

        if self.config.log_every_n > 0 && index % self.config.log_every_n == 0 {
            tracing::info!(
                submitted = index + 1,
                emitted = self.reassembler.next_expected(),
                "pipeline progress"
            );
        }

        self.flush_ready().await
    }

    /// Copy the completed output of `slot`'s previous occupant into its
    /// pending call, unless it was already harvested.
    fn harvest(&mut self, slot: SlotId) -> Result<(), PipelineError> {
        if let Some(prev) = self.pool.previous_occupant(slot)
            && !self.reassembler.is_filled(prev)
        {
            let probabilities = self.engine.read_output(slot)?;
            self.reassembler.fill(prev, probabilities)?;
            tracing::trace!(slot = %slot, index = prev, "harvested completion");
        }
        Ok(())
    }

    /// Emit every call the reassembler can release, in logical-index order.
    async fn flush_ready(&mut self) -> Result<(), PipelineError> {
        while let Some(call) = self.reassembler.pop_ready() {
            let gls = likelihood::round_gls(&call.probabilities, self.config.gl_precision)
                .map_err(|source| PipelineError::InvalidProbabilities {
                    index: call.index,
                    source,
                })?;
            let output = CallOutput {
                variant: call.variant,
                alt_allele_indices: call.alt_allele_indices,
                genotype_probabilities: gls,
            };
            if self.tx.send(Ok(output)).await.is_err() {
                return Err(PipelineError::OutputClosed);
            }
        }
        Ok(())
    }

    /// On input exhaustion: wait for every in-flight request, harvest each
    /// slot's final occupant, flush the rest of the buffer in order.
    async fn drain(&mut self) -> Result<(), PipelineError> {
        self.engine.wait(WaitKind::All).await?;
        for slot in self.pool.slot_ids() {
            self.harvest(slot)?;
            self.pool.mark_idle(slot);
        }
        self.flush_ready().await?;

        debug_assert!(self.reassembler.is_empty(), "drain left buffered calls");
        debug_assert_eq!(
            self.reassembler.next_expected(),
            self.next_index,
            "drain emitted fewer calls than were submitted"
        );
        Ok(())
    }
}
