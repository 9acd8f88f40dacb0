//! Bidirectional ranking loss over an image/caption score matrix.
//!
//! One configuration bundle selects between two mutually exclusive
//! formulations. The hinge formulation ranks every positive pair above the
//! in-batch negatives by a fixed margin:
//!
//! ```text
//! cost_cap(i, j) = max(0, margin + score(i, j) - score(i, i))
//! cost_img(i, j) = max(0, margin + score(i, j) - score(j, j))
//! ```
//!
//! reduced per anchor either over every violator (`sum_violation`) or over
//! the single hardest one (`max_violation`). The smooth formulation replaces
//! the hinge with a log-sum-exp over all negatives,
//!
//! ```text
//! S(i, j)  = exp(local_alpha * w(i, j) * (score_(i, j) - local_ep))
//! loss_i   = log(1 + col_sum_i(S)) / local_alpha
//!          + log(1 + row_sum_i(S)) / local_alpha
//!          - log(1 + relu(d_i * wii_i))
//! ```
//!
//! where `score_` is the score matrix with its diagonal zeroed, `d` the
//! positive-pair scores, and `w`/`wii` the detached mining weights from
//! [`HardNegativeWeighter`] (all ones without a usable memory bank).

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    tensor::{activation, backend::Backend, Tensor},
};
use vse_bank::BankSnapshot;

use crate::{
    error::ContrastiveLossError,
    similarity::{identity, Similarity},
    weighting::{HardNegativeWeighter, HardNegativeWeighterConfig, MiningWeights},
};

/// Configuration for creating a [contrastive loss](ContrastiveLoss).
///
/// The bundle is validated once at construction; an initialized module can
/// no longer hold a contradictory flag combination.
#[derive(Config, Debug)]
pub struct ContrastiveLossConfig {
    /// Similarity measure for every score matrix. Default: cosine
    #[config(default = "Similarity::Cosine")]
    pub measure: Similarity,

    /// Required gap between a positive pair and a negative before its hinge
    /// cost reaches zero. Default: 0.2
    #[config(default = 0.2)]
    pub margin: f64,

    /// Hinge formulation keeping only the hardest violator per anchor.
    /// Mutually exclusive with `sum_violation`. Default: false
    #[config(default = false)]
    pub max_violation: bool,

    /// Hinge formulation summing every violator. Mutually exclusive with
    /// `max_violation`. Default: false
    #[config(default = false)]
    pub sum_violation: bool,

    /// Mining scale inside the positive-consistency masses. Default: 40.0
    #[config(default = 40.0)]
    pub global_alpha: f64,

    /// Mining scale inside the negative masses. Default: 40.0
    #[config(default = 40.0)]
    pub global_beta: f64,

    /// Offset subtracted from a score before the positive-consistency
    /// exponential. Default: 0.2
    #[config(default = 0.2)]
    pub global_ep_posi: f64,

    /// Offset subtracted from the scaled score in the negative exponential.
    /// Default: 0.1
    #[config(default = 0.1)]
    pub global_ep_nega: f64,

    /// Sharpness of the smooth formulation's exponential. Default: 30.0
    #[config(default = 30.0)]
    pub local_alpha: f64,

    /// Score offset inside the smooth formulation's exponential.
    /// Default: 0.3
    #[config(default = 0.3)]
    pub local_ep: f64,

    /// Hardest bank negatives aggregated per anchor while mining.
    /// Default: 50
    #[config(default = 50)]
    pub mb_k: usize,
}

impl ContrastiveLossConfig {
    /// Checks the bundle for contradictory or out-of-range settings.
    pub fn validate(&self) -> Result<(), ContrastiveLossError> {
        if self.max_violation && self.sum_violation {
            return Err(ContrastiveLossError::ConflictingViolationFlags);
        }
        if self.mb_k < 1 {
            return Err(ContrastiveLossError::InvalidTopK { mb_k: self.mb_k });
        }
        if self.margin < 0.0 {
            return Err(ContrastiveLossError::NegativeMargin {
                margin: self.margin,
            });
        }
        Ok(())
    }

    /// Validates the bundle and initializes a [`ContrastiveLoss`].
    pub fn init<B: Backend>(&self) -> Result<ContrastiveLoss<B>, ContrastiveLossError> {
        self.validate()?;
        let formulation = if self.max_violation {
            Formulation::MaxViolation
        } else if self.sum_violation {
            Formulation::SumViolation
        } else {
            Formulation::Smooth
        };
        Ok(ContrastiveLoss {
            measure: Ignored(self.measure.clone()),
            formulation: Ignored(formulation),
            margin: self.margin,
            local_alpha: self.local_alpha,
            local_ep: self.local_ep,
            weighter: HardNegativeWeighterConfig::new()
                .with_measure(self.measure.clone())
                .with_global_alpha(self.global_alpha)
                .with_global_beta(self.global_beta)
                .with_global_ep_posi(self.global_ep_posi)
                .with_global_ep_nega(self.global_ep_nega)
                .with_mb_k(self.mb_k)
                .init(),
        })
    }
}

/// Loss formulation derived from the violation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formulation {
    /// Hinge cost of the hardest violator per anchor.
    MaxViolation,
    /// Hinge cost summed over every violator.
    SumViolation,
    /// Smooth log-weighted cost over all pairs (default).
    Smooth,
}

/// Bidirectional ranking loss for image/caption embedding batches.
///
/// Stateless per call: the loss is a pure function of the batch embeddings,
/// the batch identities, an optional bank snapshot and the configuration.
/// The memory bank itself is owned and refreshed by the caller.
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct ContrastiveLoss<B: Backend> {
    /// Similarity measure shared by scoring and mining.
    pub measure: Ignored<Similarity>,
    /// Formulation derived from the violation flags at construction.
    pub formulation: Ignored<Formulation>,
    /// Hinge margin.
    pub margin: f64,
    /// Sharpness of the smooth exponential.
    pub local_alpha: f64,
    /// Score offset of the smooth exponential.
    pub local_ep: f64,
    /// Bank mining stage used by the smooth formulation.
    pub weighter: HardNegativeWeighter<B>,
}

impl<B: Backend> ModuleDisplay for ContrastiveLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("measure", &format!("{:?}", self.measure.0))
            .add("formulation", &format!("{:?}", self.formulation.0))
            .add("margin", &self.margin)
            .add("local_alpha", &self.local_alpha)
            .add("local_ep", &self.local_ep)
            .optional()
    }
}

impl<B: Backend> ContrastiveLoss<B> {
    /// Computes the scalar ranking loss for one batch.
    ///
    /// `batch_ids` names the dataset sample behind each row; bank rows
    /// duplicating a current identity are kept out of the negative pool.
    /// The smooth formulation mines `bank` for hard negatives when one is
    /// given; the hinge formulations ignore it. A bank that turns out empty
    /// after filtering degrades to the in-batch-only loss without failing.
    ///
    /// # Shapes
    /// - `images`: `[B, D]`, unit-normalized rows
    /// - `captions`: `[B, D]`, unit-normalized rows, parallel to `images`
    /// - output: `[1]`
    pub fn forward(
        &self,
        images: Tensor<B, 2>,
        captions: Tensor<B, 2>,
        batch_ids: &[i64],
        bank: Option<&BankSnapshot<B>>,
    ) -> Result<Tensor<B, 1>, ContrastiveLossError> {
        let [b, d] = images.dims();
        let [cap_rows, cap_dim] = captions.dims();
        if b == 0 {
            return Err(ContrastiveLossError::EmptyBatch);
        }
        if b != cap_rows || d != cap_dim {
            return Err(ContrastiveLossError::BatchShapeMismatch {
                images: [b, d],
                captions: [cap_rows, cap_dim],
            });
        }
        if batch_ids.len() != b {
            return Err(ContrastiveLossError::IdentityCountMismatch {
                expected: b,
                actual: batch_ids.len(),
            });
        }
        if let Some(snapshot) = bank {
            if snapshot.embed_dim() != d {
                return Err(ContrastiveLossError::EmbeddingDimMismatch {
                    bank: snapshot.embed_dim(),
                    batch: d,
                });
            }
        }

        // Both formulations share one score matrix, computed up front.
        let scores = self.measure.0.score(images.clone(), captions.clone());

        let loss = match self.formulation.0 {
            Formulation::MaxViolation => self.hinge(scores, true),
            Formulation::SumViolation => self.hinge(scores, false),
            Formulation::Smooth => {
                let weights = bank.and_then(|snapshot| {
                    self.weighter
                        .forward(scores.clone(), images, captions, batch_ids, snapshot)
                });
                self.smooth(scores, weights)
            }
        };
        Ok(loss)
    }

    /// Triplet ranking cost with a fixed margin over in-batch negatives.
    fn hinge(&self, scores: Tensor<B, 2>, max_violation: bool) -> Tensor<B, 1> {
        let [b, _] = scores.dims();
        let eye = identity::<B>(b, &scores.device());
        let diag_mask = eye.clone().greater_elem(0.5);
        let d = (scores.clone() * eye).sum_dim(1); // [B, 1] positive scores

        // Image anchor against candidate captions, and the transposed
        // direction; a sample is never its own negative.
        let cost_cap = (scores.clone() - d.clone() + self.margin)
            .clamp_min(0.0)
            .mask_fill(diag_mask.clone(), 0.0);
        let cost_img = (scores - d.transpose() + self.margin)
            .clamp_min(0.0)
            .mask_fill(diag_mask, 0.0);

        if max_violation {
            cost_cap.max_dim(1).sum() + cost_img.max_dim(0).sum()
        } else {
            cost_cap.sum() + cost_img.sum()
        }
    }

    /// Log-weighted cost over all pairs, optionally rescaled by mining
    /// weights.
    fn smooth(&self, scores: Tensor<B, 2>, weights: Option<MiningWeights<B>>) -> Tensor<B, 1> {
        let [b, _] = scores.dims();
        let eye = identity::<B>(b, &scores.device());

        let s_diag = scores.clone() * eye;
        let negatives = scores - s_diag.clone(); // diagonal zeroed
        let d = s_diag.sum_dim(0).squeeze::<1>(0); // [B] positive scores

        let (exponent, confident) = match weights {
            Some(w) => ((negatives - self.local_ep) * w.pair, d * w.positive),
            None => (negatives - self.local_ep, d),
        };
        let s_ = exponent.mul_scalar(self.local_alpha).exp();

        let caption_term = s_
            .clone()
            .sum_dim(0)
            .log1p()
            .div_scalar(self.local_alpha)
            .squeeze::<1>(0);
        let image_term = s_
            .sum_dim(1)
            .log1p()
            .div_scalar(self.local_alpha)
            .squeeze::<1>(1);
        // The relu keeps the log1p argument at or above one.
        let positive_term = activation::relu(confident).log1p().neg();

        (caption_term + image_term + positive_term).mean()
    }
}
