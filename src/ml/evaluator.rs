// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Runs a classifier over a labelled split without gradients and
// reports mean cross-entropy, accuracy and a confusion matrix.
//
// AD is the positive class:
//
//                    predicted AD   predicted NC
//   actual AD        true_ad        false_nc
//   actual NC        false_ad       true_nc
//
// Used for classifier validation every epoch and for the final
// test report.

use anyhow::{anyhow, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::{batcher::ScanBatcher, dataset::ScanDataset};
use crate::domain::scan::Label;
use crate::ml::model::EmbeddingClassifier;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_ad:  usize,
    pub false_ad: usize,
    pub true_nc:  usize,
    pub false_nc: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, actual: Label, predicted: Label) {
        match (actual, predicted) {
            (Label::Ad, Label::Ad) => self.true_ad  += 1,
            (Label::Nc, Label::Ad) => self.false_ad += 1,
            (Label::Nc, Label::Nc) => self.true_nc  += 1,
            (Label::Ad, Label::Nc) => self.false_nc += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_ad + self.false_ad + self.true_nc + self.false_nc
    }

    pub fn correct(&self) -> usize {
        self.true_ad + self.true_nc
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Recall of AD
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_ad, self.true_ad + self.false_nc)
    }

    /// Recall of NC
    pub fn specificity(&self) -> f64 {
        ratio(self.true_nc, self.true_nc + self.false_ad)
    }
}

/// NaN when there is nothing to divide by, like the training metrics.
fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 { num as f64 / den as f64 } else { f64::NAN }
}

/// Result of evaluating a classifier on one split.
///
/// Metrics without data (an empty split, or no images of a class)
/// are NaN and serialise as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Mean cross-entropy per image
    pub loss:        f64,
    pub accuracy:    f64,
    pub sensitivity: f64,
    pub specificity: f64,
    pub confusion:   ConfusionMatrix,
}

impl Evaluation {
    fn from_parts(loss_sum: f64, confusion: ConfusionMatrix) -> Self {
        let n = confusion.total();
        Self {
            loss:        if n > 0 { loss_sum / n as f64 } else { f64::NAN },
            accuracy:    confusion.accuracy(),
            sensitivity: confusion.sensitivity(),
            specificity: confusion.specificity(),
            confusion,
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.confusion;
        writeln!(f, "images       {}", c.total())?;
        writeln!(f, "loss         {:.4}", self.loss)?;
        writeln!(f, "accuracy     {:.2}%", self.accuracy * 100.0)?;
        writeln!(f, "sensitivity  {:.2}%", self.sensitivity * 100.0)?;
        writeln!(f, "specificity  {:.2}%", self.specificity * 100.0)?;
        writeln!(f, "              pred AD  pred NC")?;
        writeln!(f, "  actual AD   {:>7}  {:>7}", c.true_ad, c.false_nc)?;
        write!(f,   "  actual NC   {:>7}  {:>7}", c.false_ad, c.true_nc)
    }
}

/// Evaluate `model` on every image of `dataset`.
///
/// Pass a model obtained from `.valid()` (or loaded for inference)
/// so dropout is off and batch norm uses its running statistics.
pub fn evaluate<B: Backend>(
    model:       &EmbeddingClassifier<B>,
    dataset:     ScanDataset,
    batch_size:  usize,
    num_workers: usize,
    device:      &B::Device,
) -> Result<Evaluation> {
    let loader = DataLoaderBuilder::new(ScanBatcher::<B>::new(device.clone()))
        .batch_size(batch_size.max(1))
        .num_workers(num_workers.max(1))
        .build(dataset);
    let ce = CrossEntropyLossConfig::new().init(device);

    let mut loss_sum  = 0.0f64;
    let mut confusion = ConfusionMatrix::default();

    for batch in loader.iter() {
        let n      = batch.labels.dims()[0];
        let logits = model.forward(batch.images);

        let batch_loss: f64 = ce
            .forward(logits.clone(), batch.labels.clone())
            .into_scalar()
            .elem::<f64>();
        loss_sum += batch_loss * n as f64;

        // argmax(1) returns [batch, 1]; flatten to [batch]
        let predicted = to_indices(logits.argmax(1).flatten::<1>(0, 1))?;
        let actual    = to_indices(batch.labels)?;
        for (a, p) in actual.into_iter().zip(predicted) {
            confusion.record(a, p);
        }
    }

    Ok(Evaluation::from_parts(loss_sum, confusion))
}

fn to_indices<B: Backend>(t: Tensor<B, 1, Int>) -> Result<Vec<Label>> {
    let raw: Vec<i64> = t
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read class indices: {e:?}"))?;
    raw.into_iter()
        .map(|i| {
            usize::try_from(i)
                .ok()
                .and_then(Label::from_index)
                .ok_or_else(|| anyhow!("Class index {i} out of range"))
        })
        .collect()
}
