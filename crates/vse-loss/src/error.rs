use thiserror::Error;

/// Errors raised by contrastive-loss configuration and evaluation.
///
/// These are programmer or configuration errors, never transient failures:
/// nothing here is retried, every failure propagates synchronously to the
/// caller.
#[derive(Debug, Error)]
pub enum ContrastiveLossError {
    /// `max_violation` and `sum_violation` select different hinge reductions
    /// and cannot both be enabled.
    #[error("max_violation and sum_violation are mutually exclusive")]
    ConflictingViolationFlags,

    /// The bank top-k count must select at least one negative.
    #[error("mb_k must be at least 1, got {mb_k}")]
    InvalidTopK { mb_k: usize },

    /// The hinge margin cannot be negative.
    #[error("margin must be non-negative, got {margin}")]
    NegativeMargin { margin: f64 },

    /// An empty batch has no positive pairs to rank against.
    #[error("batch must contain at least one image/caption pair")]
    EmptyBatch,

    /// Image and caption batches must be parallel: same count, same dimension.
    #[error("image batch of shape {images:?} does not match caption batch of shape {captions:?}")]
    BatchShapeMismatch {
        images: [usize; 2],
        captions: [usize; 2],
    },

    /// One identity per batch sample.
    #[error("expected {expected} batch identities, got {actual}")]
    IdentityCountMismatch { expected: usize, actual: usize },

    /// Bank rows must live in the same embedding space as the batch.
    #[error("bank embedding dimension {bank} does not match batch embedding dimension {batch}")]
    EmbeddingDimMismatch { bank: usize, batch: usize },
}
