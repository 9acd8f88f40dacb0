//! Input structures for retrieval metrics.
//!
//! This module contains the input structures used by the metrics to pass
//! loss values and score matrices along with other required data.

use burn::{prelude::*, tensor::backend::Backend};
use derive_new::new;

/// Ranking loss metric input.
#[derive(new, Debug, Clone)]
pub struct RankingLossInput<B: Backend> {
    /// Loss tensor with shape `[1]`.
    pub loss: Tensor<B, 1>,
    /// Batch size for averaging.
    pub batch_size: usize,
}

/// Recall metric input.
///
/// Row `i` scores image `i` against every caption; the diagonal holds the
/// matched pairs.
#[derive(new, Debug, Clone)]
pub struct RetrievalInput<B: Backend> {
    /// Score matrix with shape `[batch_size, batch_size]`.
    pub scores: Tensor<B, 2>,
}
