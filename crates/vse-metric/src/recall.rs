//! Recall@K retrieval metric.
//!
//! Ranks every anchor's matched pair inside a batch score matrix and
//! reports the fraction of anchors whose positive lands in the top `k`
//! candidates. Ties with the positive score do not push it down a rank.

use core::marker::PhantomData;

use burn::{
    prelude::*,
    tensor::{backend::Backend, cast::ToElement, Tensor, TensorData},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use super::input::RetrievalInput;

/// Which side of the score matrix provides the anchors.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum RetrievalDirection {
    /// Image anchors ranked against every caption.
    ImageToText,
    /// Caption anchors ranked against every image.
    TextToImage,
}

/// Configuration for the [recall metric](RecallMetric).
#[derive(Config, Debug)]
pub struct RecallMetricConfig {
    /// Number of top candidates counted as a hit. Default: 1
    #[config(default = 1)]
    pub k: usize,

    /// Ranking direction. Default: image-to-text
    #[config(default = "RetrievalDirection::ImageToText")]
    pub direction: RetrievalDirection,
}

impl RecallMetricConfig {
    /// Initializes a [`RecallMetric`].
    pub fn init<B: Backend>(&self) -> RecallMetric<B> {
        assert!(self.k >= 1, "Recall cutoff must be at least 1, got {}", self.k);
        RecallMetric {
            state: NumericMetricState::default(),
            sum: 0.0,
            count: 0,
            k: self.k,
            direction: self.direction.clone(),
            _b: PhantomData,
        }
    }
}

/// Running Recall@K over batch score matrices, weighted by batch size.
pub struct RecallMetric<B: Backend> {
    state: NumericMetricState,
    sum: f64,
    count: usize,
    k: usize,
    direction: RetrievalDirection,
    _b: PhantomData<B>,
}

impl<B: Backend> RecallMetric<B> {
    /// Creates a Recall@1 metric over image anchors.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Default for RecallMetric<B> {
    fn default() -> Self {
        RecallMetricConfig::new().init()
    }
}

impl<B: Backend> Metric for RecallMetric<B> {
    type Input = RetrievalInput<B>;

    fn name(&self) -> String {
        let direction = match self.direction {
            RetrievalDirection::ImageToText => "i2t",
            RetrievalDirection::TextToImage => "t2i",
        };
        format!("Recall@{} ({direction})", self.k)
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let scores = match self.direction {
            RetrievalDirection::ImageToText => item.scores.clone(),
            RetrievalDirection::TextToImage => item.scores.clone().transpose(),
        };
        let [batch_size, _] = scores.dims();
        let eye = identity::<B>(batch_size, &scores.device());
        let positives = (scores.clone() * eye).sum_dim(1); // [B, 1]

        // Entries strictly above the matched score push the positive down
        // one rank each.
        let outranked = (scores - positives).greater_elem(0.0).int().sum_dim(1);
        let hits = outranked.lower_elem(self.k as i64).float().mean();
        let recall = hits.into_scalar().to_f64();

        // `NumericMetricState` reports only the latest batch through its
        // value accessor, so the running totals live on the metric itself.
        self.sum += recall * batch_size as f64;
        self.count += batch_size;
        self.state.update(
            recall,
            batch_size,
            FormatOptions::new(self.name()).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
        self.sum = 0.0;
        self.count = 0;
    }
}

impl<B: Backend> Numeric for RecallMetric<B> {
    fn value(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}

fn identity<B: Backend>(size: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0_f32; size * size];
    for i in 0..size {
        values[i * size + i] = 1.0;
    }
    Tensor::from_data(TensorData::new(values, [size, size]), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{metadata, TestBackend};

    fn update(metric: &mut RecallMetric<TestBackend>, rows: [[f32; 3]; 3]) -> f64 {
        let device = Default::default();
        let input = RetrievalInput::new(Tensor::from_floats(rows, &device));
        metric.update(&input, &metadata());
        metric.value()
    }

    #[test]
    fn dominant_diagonal_gives_full_recall() {
        let mut metric = RecallMetric::new();
        let value = update(
            &mut metric,
            [[0.9, 0.1, 0.2], [0.2, 0.8, 0.1], [0.3, 0.1, 0.7]],
        );
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn outranked_anchors_miss_at_one() {
        let mut metric = RecallMetric::new();
        // Anchor 0's positive sits at rank two behind the 1.0 entry.
        let value = update(
            &mut metric,
            [[0.9, 1.0, 0.1], [0.2, 0.8, 0.3], [0.1, 0.2, 0.7]],
        );
        assert!((value - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn larger_cutoffs_recover_nearby_positives() {
        let mut metric = RecallMetricConfig::new().with_k(2).init::<TestBackend>();
        let value = update(
            &mut metric,
            [[0.9, 1.0, 0.1], [0.2, 0.8, 0.3], [0.1, 0.2, 0.7]],
        );
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn text_to_image_ranks_along_columns() {
        // The 0.8 entry outranks anchor 2's positive along its row but
        // stays below anchor 0's positive along its column.
        let rows = [[0.9, 0.0, 0.0], [0.0, 0.8, 0.0], [0.8, 0.0, 0.7]];

        let mut i2t = RecallMetric::new();
        let value = update(&mut i2t, rows);
        assert!((value - 2.0 / 3.0).abs() < 1e-6);

        let mut t2i = RecallMetricConfig::new()
            .with_direction(RetrievalDirection::TextToImage)
            .init::<TestBackend>();
        let value = update(&mut t2i, rows);
        assert!((value - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ties_do_not_outrank_the_positive() {
        let device = Default::default();
        let mut metric = RecallMetric::<TestBackend>::new();
        let input = RetrievalInput::new(Tensor::from_floats([[0.9, 0.9], [0.1, 0.5]], &device));
        metric.update(&input, &metadata());
        assert!((metric.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn updates_accumulate_weighted_by_batch_size() {
        let device = Default::default();
        let mut metric = RecallMetric::<TestBackend>::new();

        metric.update(
            &RetrievalInput::new(Tensor::from_floats([[0.9, 0.1], [0.1, 0.8]], &device)),
            &metadata(),
        );
        metric.update(
            &RetrievalInput::new(Tensor::from_floats([[0.0, 1.0], [0.0, 0.5]], &device)),
            &metadata(),
        );

        // The weighted average across both batches, not the latest 0.5.
        assert!((metric.value() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn name_reflects_cutoff_and_direction() {
        let i2t = RecallMetricConfig::new().with_k(5).init::<TestBackend>();
        assert_eq!(i2t.name(), "Recall@5 (i2t)");

        let t2i = RecallMetricConfig::new()
            .with_direction(RetrievalDirection::TextToImage)
            .init::<TestBackend>();
        assert_eq!(t2i.name(), "Recall@1 (t2i)");
    }

    #[test]
    #[should_panic = "Recall cutoff must be at least 1"]
    fn zero_cutoff_panics() {
        let _ = RecallMetricConfig::new().with_k(0).init::<TestBackend>();
    }
}
