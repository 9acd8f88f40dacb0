//! Ranking loss tracking metric.
//!
//! This module implements a simple loss tracking metric used during
//! embedding training and evaluation.

use core::marker::PhantomData;

use burn::{
    tensor::{backend::Backend, cast::ToElement},
    train::metric::{
        state::{FormatOptions, NumericMetricState},
        Metric, MetricEntry, MetricMetadata, Numeric,
    },
};

use super::input::RankingLossInput;

/// Running average of the ranking loss, weighted by batch size.
#[derive(Default)]
pub struct RankingLossMetric<B: Backend> {
    state: NumericMetricState,
    sum: f64,
    count: usize,
    _b: PhantomData<B>,
}

impl<B: Backend> RankingLossMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for RankingLossMetric<B> {
    type Input = RankingLossInput<B>;

    fn name(&self) -> String {
        "Ranking Loss".to_owned()
    }

    fn update(&mut self, item: &Self::Input, _metadata: &MetricMetadata) -> MetricEntry {
        let loss = item.loss.clone().into_scalar().to_f64();
        // `NumericMetricState` reports only the latest batch through its
        // value accessor, so the running totals live on the metric itself.
        self.sum += loss * item.batch_size as f64;
        self.count += item.batch_size;
        self.state.update(
            loss,
            item.batch_size,
            FormatOptions::new(self.name()).precision(5),
        )
    }

    fn clear(&mut self) {
        self.state.reset();
        self.sum = 0.0;
        self.count = 0;
    }
}

impl<B: Backend> Numeric for RankingLossMetric<B> {
    fn value(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }
}
