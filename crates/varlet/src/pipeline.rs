//! Pipeline assembly: spawn the producer task, hand back the ordered
//! consumer.
//!
//! `spawn` wires a [`BatchSource`] and an [`InferenceEngine`] to a producer
//! task and returns a [`CallStream`]. The stream yields one result per
//! submitted candidate, in exact submission order regardless of the engine's
//! completion order; a fatal producer error arrives as the final `Err` item
//! before end-of-stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::engine::{EngineError, InferenceEngine};
use crate::feeder::{BatchSource, FeedError};
use crate::likelihood::{self, LikelihoodError};
use crate::reassembly::ReassemblyError;

/// Fatal pipeline failures, as observed by the consumer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),

    #[error("invalid genotype probabilities for call {index}: {source}")]
    InvalidProbabilities {
        index: u64,
        #[source]
        source: LikelihoodError,
    },

    /// The consumer dropped its stream; the producer stops quietly. Never
    /// delivered to a consumer (there is none left to see it).
    #[error("output channel closed by consumer")]
    OutputClosed,
}

/// One genotyped candidate: the opaque blobs carried through from the input
/// plus the (rounded) genotype probability vector, hom-ref / het / hom-alt.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallOutput {
    pub variant: Vec<u8>,
    pub alt_allele_indices: Vec<u8>,
    pub genotype_probabilities: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Decimal places for genotype-likelihood rounding; `None` disables
    /// rounding (the sum-to-one check still applies).
    pub gl_precision: Option<u32>,

    /// Capacity of the output channel between producer and consumer.
    pub channel_capacity: usize,

    /// Emit a progress log line every this many submissions; 0 disables.
    pub log_every_n: u64,

    /// Stop pulling input after this many batches and drain. `None` runs to
    /// source exhaustion.
    pub max_batches: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gl_precision: Some(likelihood::GL_PRECISION),
            channel_capacity: 1024,
            log_every_n: 15_000,
            max_batches: None,
        }
    }
}

/// Spawn the producer task and return the ordered result stream.
pub fn spawn<E, S>(engine: Arc<E>, source: S, config: PipelineConfig) -> CallStream
where
    E: InferenceEngine + ?Sized,
    S: BatchSource,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let dispatcher = Dispatcher::new(engine, source, config, tx);
    let handle = tokio::spawn(dispatcher.run());
    CallStream {
        rx,
        _producer: handle,
    }
}

/// Pull-based consumer side of the pipeline.
///
/// Results arrive in submission order. After a fatal error the next poll
/// yields end-of-stream; dropping the stream stops the producer at its next
/// emission.
pub struct CallStream {
    rx: mpsc::Receiver<Result<CallOutput, PipelineError>>,
    _producer: tokio::task::JoinHandle<()>,
}

impl CallStream {
    /// Next ordered result. `None` once the producer has terminated and the
    /// queue is drained.
    pub async fn next(&mut self) -> Option<Result<CallOutput, PipelineError>> {
        self.rx.recv().await
    }
}

impl futures::Stream for CallStream {
    type Item = Result<CallOutput, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
