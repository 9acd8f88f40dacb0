//! Memory-bank hard-negative mining.
//!
//! Given the in-batch score matrix and a snapshot of previously seen
//! embeddings, the weighter measures how much bank evidence there is that a
//! given off-diagonal pair is a genuinely hard negative, and how confidently
//! each positive pair is separated from its hardest bank competition. The
//! resulting weights rescale the smooth loss; they carry no gradient.

use std::marker::PhantomData;

use burn::{
    config::Config,
    module::{Ignored, Module},
    tensor::{backend::Backend, Int, Tensor},
};
use vse_bank::{exclusion_mask, BankSnapshot};

use crate::similarity::{identity, Similarity};

/// Configuration for [`HardNegativeWeighter`].
#[derive(Config, Debug)]
pub struct HardNegativeWeighterConfig {
    /// Similarity measure used against the bank. Default: cosine
    #[config(default = "Similarity::Cosine")]
    pub measure: Similarity,

    /// Scale applied inside the positive-consistency masses. Default: 40.0
    #[config(default = 40.0)]
    pub global_alpha: f64,

    /// Scale applied inside the negative masses. Default: 40.0
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

    /// How many of the hardest bank negatives each anchor aggregates.
    /// Clamped down to the filtered bank size per call. Default: 50
    #[config(default = 50)]
    pub mb_k: usize,
}

impl HardNegativeWeighterConfig {
    /// Initialize a [`HardNegativeWeighter`].
    ///
    /// # Panics
    /// Panics if `mb_k` is zero.
    pub fn init<B: Backend>(&self) -> HardNegativeWeighter<B> {
        self.assertions();
        HardNegativeWeighter {
            measure: Ignored(self.measure.clone()),
            global_alpha: self.global_alpha,
            global_beta: self.global_beta,
            global_ep_posi: self.global_ep_posi,
            global_ep_nega: self.global_ep_nega,
            mb_k: self.mb_k,
            _phantom: PhantomData,
        }
    }

    fn assertions(&self) {
        assert!(self.mb_k >= 1, "Top-k count for mining must be at least 1");
    }
}

/// Importance weights produced by the mining stage.
///
/// Both tensors are detached: they multiply the loss as constants and do not
/// route gradient back into the scores that produced them.
#[derive(Debug, Clone)]
pub struct MiningWeights<B: Backend> {
    /// Pairwise hard-negative weight, `[B, B]`, zero on the diagonal.
    /// Near 1 when the bank suggests pair (i, j) is hard relative to how
    /// separated the true positives already are, near 0 otherwise.
    pub pair: Tensor<B, 2>,
    /// Per-sample positive confidence, `[B]`. Down-weights the positive-pair
    /// term while the bank still holds negatives scoring close to it.
    pub positive: Tensor<B, 1>,
}

/// Mines the memory bank for hard negatives and turns the evidence into
/// detached loss weights.
#[derive(Module, Debug)]
pub struct HardNegativeWeighter<B: Backend> {
    measure: Ignored<Similarity>,
    global_alpha: f64,
    global_beta: f64,
    global_ep_posi: f64,
    global_ep_nega: f64,
    mb_k: usize,
    _phantom: PhantomData<B>,
}

impl<B: Backend> HardNegativeWeighter<B> {
    /// Computes pair and positive weights for the current batch.
    ///
    /// Bank rows whose identity occurs in `batch_ids` are disguised positives
    /// and are filtered out first. Returns `None` when no usable bank row
    /// remains, in which case the caller falls back to the in-batch-only
    /// loss.
    ///
    /// # Shapes
    /// - `scores`: `[B, B]` in-batch score matrix (image rows, caption cols)
    /// - `images`, `captions`: `[B, D]` current-batch embeddings
    pub fn forward(
        &self,
        scores: Tensor<B, 2>,
        images: Tensor<B, 2>,
        captions: Tensor<B, 2>,
        batch_ids: &[i64],
        bank: &BankSnapshot<B>,
    ) -> Option<MiningWeights<B>> {
        // The whole stage is gradient-free; its outputs enter the loss as
        // constants.
        let scores = scores.detach();
        let images = images.detach();
        let captions = captions.detach();
        let device = scores.device();

        let keep = exclusion_mask(bank.ids(), batch_ids);
        let kept: Vec<i64> = keep
            .iter()
            .enumerate()
            .filter(|(_, &usable)| usable)
            .map(|(row, _)| row as i64)
            .collect();
        if kept.is_empty() {
            return None;
        }
        let k = self.mb_k.min(kept.len());

        let index = Tensor::<B, 1, Int>::from_ints(kept.as_slice(), &device);
        let bank_images = bank.images().detach().select(0, index.clone());
        let bank_captions = bank.captions().detach().select(0, index);

        // Hardest bank distractors per anchor, in both retrieval directions.
        let i2t_top = self.measure.0.score(images, bank_captions).topk(k, 1);
        let t2i_top = self.measure.0.score(captions, bank_images).topk(k, 1);

        // exp(beta * s - ep_nega): how much near-positive mass the bank holds.
        let neg_i2t = i2t_top
            .clone()
            .mul_scalar(self.global_beta)
            .sub_scalar(self.global_ep_nega)
            .exp()
            .sum_dim(1);
        let neg_t2i = t2i_top
            .clone()
            .mul_scalar(self.global_beta)
            .sub_scalar(self.global_ep_nega)
            .exp()
            .sum_dim(1);

        // exp(alpha * (s - ep_posi)): bank competition against the positive.
        let pos_i2t = i2t_top
            .sub_scalar(self.global_ep_posi)
            .mul_scalar(self.global_alpha)
            .exp()
            .sum_dim(1);
        let pos_t2i = t2i_top
            .sub_scalar(self.global_ep_posi)
            .mul_scalar(self.global_alpha)
            .exp()
            .sum_dim(1);

        let [b, _] = scores.dims();
        let eye = identity::<B>(b, &device);
        let diag_mask = eye.clone().greater_elem(0.5);
        let d = (scores * eye).sum_dim(1); // [B, 1] positive-pair scores

        // Pair weight: bank negative mass against the positives' own mass.
        let own = d.clone().mul_scalar(self.global_beta).exp();
        let negative = neg_i2t + neg_t2i.transpose();
        let own = own.clone() + own.transpose();
        let pair = (negative.clone() / (negative + own)).mask_fill(diag_mask, 0.0);

        // Positive confidence: share of the positive's mass among the
        // hardest bank competition in both directions.
        let p = d
            .sub_scalar(self.global_ep_posi)
            .mul_scalar(self.global_alpha)
            .exp();
        let ratio = p.clone() / (p + pos_i2t + pos_t2i);
        let positive = (ratio.ones_like() - ratio).squeeze::<1>(1);

        Some(MiningWeights { pair, positive })
    }
}
