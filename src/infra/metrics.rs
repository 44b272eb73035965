// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per (stage, epoch):
//
//   stage,epoch,train_loss,val_loss,train_acc,val_acc
//   siamese,1,0.912345,0.887654,0.612000,0.598000
//   classifier,1,0.690123,0.671234,0.554000,0.571000
//
// For the siamese stage "accuracy" is the fraction of triplets
// whose positive is closer to the anchor than the negative.
//
// val_* is NaN when the validation split is empty.
//
// Output file: checkpoints/metrics.csv (truncated per run)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

/// Which training stage a row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Siamese,
    Classifier,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Siamese, Stage::Classifier];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Siamese    => "siamese",
            Stage::Classifier => "classifier",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub stage:      Stage,
    /// Starts at 1
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    pub train_acc:  f64,
    pub val_acc:    f64,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best val_loss.
    /// Without a validation split every epoch counts as an improvement.
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss.is_nan() || self.val_loss < best_val_loss
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh metrics file in `dir`, replacing any previous run.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        // Header only; rows are appended as epochs finish
        let mut w = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        w.write_record(["stage", "epoch", "train_loss", "val_loss", "train_acc", "val_acc"])?;
        w.flush()?;

        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        w.serialize(m)?;
        w.flush()?;

        tracing::debug!(
            "Logged {} epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.stage, m.epoch, m.train_loss, m.val_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Read every row back, e.g. for plotting.
    pub fn read(csv_path: impl AsRef<Path>) -> Result<Vec<EpochMetrics>> {
        let csv_path = csv_path.as_ref();
        let mut r = csv::Reader::from_path(csv_path)
            .with_context(|| format!("Cannot read metrics from '{}'", csv_path.display()))?;
        r.deserialize()
            .collect::<Result<Vec<EpochMetrics>, _>>()
            .with_context(|| format!("Malformed metrics file '{}'", csv_path.display()))
    }
}
