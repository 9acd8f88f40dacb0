//! Training metrics for cross-modal retrieval.
//!
//! This crate provides the metrics tracked while training image/caption
//! embedding models with the Burn framework: a running ranking-loss average
//! and Recall@K over batch score matrices.
//!
//! ## Implemented Metrics
//!
//! - [`RankingLossMetric`]: running loss average weighted by batch size
//! - [`RecallMetric`]: Recall@K in either retrieval direction
//!
//! ## Usage
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::data::dataloader::Progress;
//! use burn::tensor::Tensor;
//! use burn::train::metric::{Metric, MetricMetadata, Numeric};
//! use vse_metric::{RecallMetric, RetrievalInput};
//!
//! let device = Default::default();
//! let scores = Tensor::<NdArray, 2>::from_floats([[0.9, 0.1], [0.2, 0.8]], &device);
//! let metadata = MetricMetadata {
//!     progress: Progress { items_processed: 2, items_total: 2 },
//!     epoch: 0,
//!     epoch_total: 1,
//!     iteration: 0,
//!     lr: None,
//! };
//!
//! let mut recall = RecallMetric::new();
//! recall.update(&RetrievalInput::new(scores), &metadata);
//! assert_eq!(recall.value(), 1.0);
//! ```
//!
//! ## Architecture
//!
//! The crate follows Burn's metric patterns: generic over `Backend`, built
//! on the `Metric`, `Numeric`, and `NumericMetricState` traits, with one
//! metric per module and plain input structs carrying the tensors.

pub mod input;
pub mod loss;
pub mod recall;

pub use input::{RankingLossInput, RetrievalInput};
pub use loss::RankingLossMetric;
pub use recall::{RecallMetric, RecallMetricConfig, RetrievalDirection};

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, data::dataloader::Progress, train::metric::MetricMetadata};

    pub type TestBackend = NdArray;

    /// Metadata stand-in for driving metrics outside a learner loop.
    pub fn metadata() -> MetricMetadata {
        MetricMetadata {
            progress: Progress {
                items_processed: 1,
                items_total: 1,
            },
            epoch: 0,
            epoch_total: 1,
            iteration: 0,
            lr: None,
        }
    }
}
