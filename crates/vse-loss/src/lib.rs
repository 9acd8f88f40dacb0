//! Ranking losses and hard-negative mining for cross-modal retrieval.
//!
//! This crate scores batches of paired image and caption embeddings and
//! turns the score matrix into a training loss using the Burn deep learning
//! framework. Everything is backend-agnostic and stateless per call; the
//! memory bank feeding the mining stage lives in [`vse_bank`].
//!
//! ## Components
//!
//! - **[`Similarity`]**: cosine and order-embedding score matrices over
//!   batches of unit-normalized embeddings
//! - **[`HardNegativeWeighter`]**: mines a memory-bank snapshot for the
//!   hardest negatives and emits detached per-pair and per-sample weights
//! - **[`ContrastiveLoss`]**: hinge (sum or max violation) and smooth
//!   log-weighted formulations behind a single validated configuration
//!
//! ## Usage Example
//!
//! ```rust
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//! use vse_loss::ContrastiveLossConfig;
//!
//! let device = Default::default();
//! let images = Tensor::<NdArray, 2>::from_floats([[1.0, 0.0], [0.0, 1.0]], &device);
//! let captions = images.clone();
//!
//! let loss = ContrastiveLossConfig::new()
//!     .with_margin(0.2)
//!     .with_max_violation(true)
//!     .init::<NdArray>()
//!     .unwrap();
//!
//! let value = loss.forward(images, captions, &[0, 1], None).unwrap();
//! assert_eq!(value.dims(), [1]);
//! ```
//!
//! ## Formulation Selection
//!
//! The violation flags pick the formulation once at `init` time: exactly one
//! of them selects the matching hinge reduction, neither selects the smooth
//! log-weighted loss, and both together fail validation. Only the smooth
//! formulation consumes a bank snapshot; a snapshot whose identities all
//! collide with the batch degrades to the in-batch loss instead of failing.

mod contrastive;
mod error;
mod similarity;
mod weighting;

pub use contrastive::{ContrastiveLoss, ContrastiveLossConfig, Formulation};
pub use error::ContrastiveLossError;
pub use similarity::{cosine_sim, l2norm, order_sim, Similarity};
pub use weighting::{HardNegativeWeighter, HardNegativeWeighterConfig, MiningWeights};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
