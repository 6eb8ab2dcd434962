//! Input feeding: candidate batches pulled from an upstream source.
//!
//! The feeder is purely sequential. It yields fixed-size batches of
//! [`CandidateInput`]s; the dispatcher consumes each input exactly once.

use std::collections::VecDeque;

use async_trait::async_trait;

/// Feeder-boundary failures. Malformed input is not repaired: it surfaces as
/// a fatal pipeline error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    #[error("image shape mismatch: {shape:?} needs {expected} bytes, got {actual}")]
    ShapeMismatch {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("input source error: {0}")]
    Source(String),
}

/// One candidate pileup image, height x width x channels, u8 pixels.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    shape: [usize; 3],
    data: Vec<u8>,
}

impl ImageTensor {
    /// Build a tensor, checking that `data` matches `shape`.
    pub fn new(shape: [usize; 3], data: Vec<u8>) -> Result<Self, FeedError> {
        let expected = shape[0] * shape[1] * shape[2];
        if data.len() != expected {
            return Err(FeedError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One candidate variant record: the pileup image plus two opaque blobs
/// (serialized variant and alt-allele-indices protos) carried through to the
/// output untouched.
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub image: ImageTensor,
    pub variant: Vec<u8>,
    pub alt_allele_indices: Vec<u8>,
}

/// A lazy, pull-based sequence of candidate batches.
///
/// `Ok(None)` signals end of input (normal termination, triggers drain);
/// `Err` is fatal and aborts the pipeline.
#[async_trait]
pub trait BatchSource: Send + 'static {
    async fn next_batch(&mut self) -> Result<Option<Vec<CandidateInput>>, FeedError>;
}

/// In-memory batch source.
pub struct VecSource {
    items: VecDeque<CandidateInput>,
    batch_size: usize,
}

impl VecSource {
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn new(items: Vec<CandidateInput>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be positive");
        Self {
            items: items.into(),
            batch_size,
        }
    }
}

#[async_trait]
impl BatchSource for VecSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<CandidateInput>>, FeedError> {
        if self.items.is_empty() {
            return Ok(None);
        }
        let take = self.batch_size.min(self.items.len());
        Ok(Some(self.items.drain(..take).collect()))
    }
}
