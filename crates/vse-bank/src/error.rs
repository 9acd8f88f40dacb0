use thiserror::Error;

/// Errors raised by memory-bank operations.
#[derive(Debug, Error)]
pub enum BankError {
    /// The three parallel bank arrays must always agree in length.
    #[error(
        "bank arrays disagree in length: {images} image rows, {captions} caption rows, {identities} identities"
    )]
    LengthMismatch {
        images: usize,
        captions: usize,
        identities: usize,
    },

    /// Rows stored in the bank must match its embedding dimension.
    #[error("expected embeddings of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type alias for bank operations.
pub type BankResult<T> = Result<T, BankError>;
