//! varlet: asynchronous multi-request inference pipeline for genotype
//! classification.
//!
//! A producer task pulls candidate batches from a [`BatchSource`], keeps a
//! fixed pool of engine request slots saturated, and harvests completions as
//! slots come back idle; a [`CallStream`] hands results to the consumer in
//! exact submission order, however the engine interleaves completions.

mod dispatcher;

pub mod engine;
pub mod feeder;
pub mod likelihood;
pub mod pipeline;
pub mod pool;
pub mod reassembly;

#[cfg(test)]
mod testutil;

pub use engine::{EngineError, InferenceEngine, SlotId, ThreadedEngine, WaitKind};
pub use feeder::{BatchSource, CandidateInput, FeedError, ImageTensor, VecSource};
pub use likelihood::{GL_PRECISION, LikelihoodError, NUM_GENOTYPES, round_gls};
pub use pipeline::{CallOutput, CallStream, PipelineConfig, PipelineError, spawn};
pub use pool::RequestPool;
pub use reassembly::{CompletedCall, Reassembler, ReassemblyError};
