// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: List labelled images           (Layer 4 - data)
//   Step 2: Patient-level split + verify   (Layer 4 - data)
//   Step 3: Save config + partition        (Layer 6 - infra)
//   Step 4: Decode and resize images       (Layer 4 - data)
//   Step 5: Siamese + classifier training  (Layer 5 - ml)
//   Step 6: Save test report               (Layer 6 - infra)
//   Step 7: Plot training curves           (Layer 6 - infra)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::data::{
    dataset::ScanStore,
    loader::ImageFolderLoader,
    preprocessor::{ImagePreprocessor, DEFAULT_HEIGHT, DEFAULT_WIDTH},
    splitter::PatientSplitter,
};
use crate::domain::{
    partition::{PartitionSummary, PatientPartition},
    traits::ScanSource,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
    plot::plot_curves,
};
use crate::ml::{
    evaluator::Evaluation,
    model::{ClassifierHeadConfig, EmbeddingNetConfig},
    trainer::{run_training, SplitStores},
};

pub const PARTITION_FILE: &str = "partition.json";
pub const TEST_REPORT_FILE: &str = "test_report.json";

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved next to the checkpoints so `predict` can rebuild the
// exact architecture and input size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:            String,
    /// Separate held-out directory; without it the test split is
    /// carved out of `data_dir`
    pub test_dir:            Option<String>,
    pub checkpoint_dir:      String,
    pub height:              usize,
    pub width:               usize,
    pub batch_size:          usize,
    pub num_workers:         usize,
    pub siamese_epochs:      usize,
    pub classifier_epochs:   usize,
    pub lr:                  f64,
    pub classifier_lr:       f64,
    pub margin:              f64,
    pub channels:            Vec<usize>,
    pub hidden:              usize,
    pub embedding_dim:       usize,
    pub head_hidden:         usize,
    pub dropout:             f64,
    pub train_fraction:      f64,
    pub validation_fraction: f64,
    pub seed:                u64,
    pub fine_tune_tower:     bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:            "AD_NC/train".to_string(),
            test_dir:            Some("AD_NC/test".to_string()),
            checkpoint_dir:      "checkpoints".to_string(),
            height:              DEFAULT_HEIGHT,
            width:               DEFAULT_WIDTH,
            batch_size:          32,
            num_workers:         2,
            siamese_epochs:      20,
            classifier_epochs:   10,
            lr:                  1e-4,
            classifier_lr:       1e-3,
            margin:              1.0,
            channels:            vec![16, 32, 64, 128],
            hidden:              256,
            embedding_dim:       128,
            head_hidden:         64,
            dropout:             0.2,
            train_fraction:      0.9,
            validation_fraction: 0.1,
            seed:                42,
            fine_tune_tower:     false,
        }
    }
}

impl TrainConfig {
    pub fn embedding_config(&self) -> EmbeddingNetConfig {
        EmbeddingNetConfig::new()
            .with_channels(self.channels.clone())
            .with_hidden(self.hidden)
            .with_embedding_dim(self.embedding_dim)
            .with_dropout(self.dropout)
    }

    pub fn head_config(&self) -> ClassifierHeadConfig {
        ClassifierHeadConfig::new(self.embedding_dim)
            .with_hidden(self.head_hidden)
            .with_dropout(self.dropout)
    }

    pub fn preprocessor(&self) -> ImagePreprocessor {
        ImagePreprocessor::new(self.height, self.width)
    }

    /// Reject settings that would leave a stage without a best checkpoint.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.siamese_epochs > 0, "siamese_epochs must be at least 1");
        ensure!(self.classifier_epochs > 0, "classifier_epochs must be at least 1");
        Ok(())
    }
}

/// What `partition.json` holds: per-split counts plus every image path.
#[derive(Serialize)]
struct PartitionManifest<'a> {
    summary: PartitionSummary,
    #[serde(flatten)]
    splits:  &'a PatientPartition,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end.
    /// Returns the test-split evaluation when there is a test split.
    pub fn execute(&self) -> Result<Option<Evaluation>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Steps 1-2: List images and split by patient ──────────────────────
        let partition = self.partition()?;
        let summary   = partition.summary();
        tracing::info!("Patient-level split:\n{}", summary);

        // ── Step 3: Save config + partition for inference / audit ────────────
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt.ensure_dir()?;
        ckpt.save_config(cfg)?;
        ckpt.save_json(PARTITION_FILE, &PartitionManifest { summary, splits: &partition })?;

        // ── Step 4: Decode every image once, up front ─────────────────────────
        let preprocessor = cfg.preprocessor();
        tracing::info!("Decoding images at {}×{} (H×W)", cfg.height, cfg.width);
        let stores = SplitStores {
            train:      Arc::new(ScanStore::load(&partition.train, &preprocessor)),
            validation: Arc::new(ScanStore::load(&partition.validation, &preprocessor)),
            test:       Arc::new(ScanStore::load(&partition.test, &preprocessor)),
        };
        tracing::info!(
            "Decoded {} train, {} validation, {} test images",
            stores.train.len(), stores.validation.len(), stores.test.len(),
        );

        // ── Step 5: Run both training stages (Layer 5) ────────────────────────
        let metrics = MetricsLogger::create(ckpt.dir())?;
        let report  = run_training(cfg, &stores, &ckpt, &metrics)?;

        // ── Step 6: Test report ───────────────────────────────────────────────
        if let Some(report) = &report {
            ckpt.save_json(TEST_REPORT_FILE, report)?;
        }

        // ── Step 7: Training curves ───────────────────────────────────────────
        let rows = MetricsLogger::read(metrics.csv_path())?;
        plot_curves(&rows, &ckpt.dir().join("plots"))?;

        Ok(report)
    }

    /// Three-way split of `data_dir`, or a train / validation split
    /// of `data_dir` plus `test_dir` as the held-out test set.
    pub fn partition(&self) -> Result<PatientPartition> {
        let cfg      = &self.config;
        let records  = ImageFolderLoader::new(&cfg.data_dir).load_records()?;
        let splitter = PatientSplitter::new(cfg.train_fraction, cfg.validation_fraction, cfg.seed)?;

        let test_dir = cfg.test_dir.as_deref().filter(|dir| {
            let exists = Path::new(dir).is_dir();
            if !exists {
                tracing::warn!("Test directory '{}' not found; carving the test split out of '{}'", dir, cfg.data_dir);
            }
            exists
        });

        let partition = match test_dir {
            Some(dir) => {
                let test = ImageFolderLoader::new(dir).load_records()?;
                splitter.split_with_test_set(records, test)?
            }
            None => splitter.split(records)?,
        };
        Ok(partition)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::partition::Split;
    use image::{GrayImage, Luma};
    use std::fs;

    /// `<root>/AD/<p>_<slice>.png` and `<root>/NC/...`, `per_class`
    /// patients with two slices each.
    fn write_dataset(root: &Path, first_patient: usize, per_class: usize) {
        for (class, value) in [("AD", 220u8), ("NC", 30u8)] {
            let dir = root.join(class);
            fs::create_dir_all(&dir).unwrap();
            for p in 0..per_class {
                let id = first_patient + p + if class == "AD" { 0 } else { 500 };
                for slice in 0..2 {
                    GrayImage::from_pixel(20, 18, Luma([value + slice as u8]))
                        .save(dir.join(format!("{id}_{slice}.png")))
                        .unwrap();
                }
            }
        }
    }

    #[test]
    fn test_partition_uses_separate_test_dir() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("train"), 0, 10);
        write_dataset(&tmp.path().join("test"), 100, 3);

        let cfg = TrainConfig {
            data_dir: tmp.path().join("train").display().to_string(),
            test_dir: Some(tmp.path().join("test").display().to_string()),
            ..TrainConfig::default()
        };
        let partition = TrainUseCase::new(cfg).partition().unwrap();

        assert_eq!(partition.test.len(), 12);
        assert_eq!(partition.train.len() + partition.validation.len(), 40);
        assert_eq!(partition.patients(Split::Validation).len(), 2);
    }

    #[test]
    fn test_missing_test_dir_falls_back_to_three_way_split() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(tmp.path(), 0, 10);

        let cfg = TrainConfig {
            data_dir:            tmp.path().display().to_string(),
            test_dir:            Some(tmp.path().join("nope").display().to_string()),
            train_fraction:      0.6,
            validation_fraction: 0.2,
            ..TrainConfig::default()
        };
        let partition = TrainUseCase::new(cfg).partition().unwrap();
        assert_eq!(partition.patients(Split::Train).len(), 12);
        assert_eq!(partition.patients(Split::Validation).len(), 4);
        assert_eq!(partition.patients(Split::Test).len(), 4);
    }

    #[test]
    fn test_leaking_test_dir_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(&tmp.path().join("train"), 0, 5);
        write_dataset(&tmp.path().join("test"), 0, 5);

        let cfg = TrainConfig {
            data_dir: tmp.path().join("train").display().to_string(),
            test_dir: Some(tmp.path().join("test").display().to_string()),
            ..TrainConfig::default()
        };
        assert!(TrainUseCase::new(cfg).partition().is_err());
    }

    #[test]
    fn test_zero_epochs_fail_before_any_output() {
        let tmp = tempfile::tempdir().unwrap();
        write_dataset(tmp.path(), 0, 4);
        let ckpt_dir = tmp.path().join("ckpt");

        for cfg in [
            TrainConfig { siamese_epochs: 0, ..TrainConfig::default() },
            TrainConfig { classifier_epochs: 0, ..TrainConfig::default() },
        ] {
            let cfg = TrainConfig {
                data_dir:       tmp.path().display().to_string(),
                checkpoint_dir: ckpt_dir.display().to_string(),
                ..cfg
            };
            let err = TrainUseCase::new(cfg).execute().unwrap_err();
            assert!(err.to_string().contains("must be at least 1"), "{err}");
        }
        assert!(!ckpt_dir.exists());
    }

    #[test]
    fn test_model_configs_follow_train_config() {
        let cfg = TrainConfig { embedding_dim: 32, head_hidden: 16, ..TrainConfig::default() };
        assert_eq!(cfg.embedding_config().embedding_dim, 32);
        assert_eq!(cfg.head_config().embedding_dim, 32);
        assert_eq!(cfg.head_config().hidden, 16);
        assert_eq!(cfg.preprocessor().height, DEFAULT_HEIGHT);
    }
}
