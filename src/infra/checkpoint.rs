// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder,
// plus the JSON side files needed to rebuild a model.
//
// File naming convention:
//   checkpoints/
//     train_config.json          ← full TrainConfig
//     partition.json             ← image paths of each split
//     siamese_epoch_1.mpk.gz     ← tower weights after epoch 1
//     siamese_best.mpk.gz        ← tower with the lowest val loss
//     siamese_best.json          ← which epoch that was
//     classifier_epoch_1.mpk.gz
//     classifier_best.mpk.gz
//     classifier_best.json
//     test_report.json
//
// Loading fails if the rebuilt architecture doesn't match the
// saved record, so the config is always saved before training.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::infra::metrics::Stage;

const CONFIG_FILE: &str = "train_config.json";

/// Pointer to the best epoch of a stage.
///
/// `val_loss` is `None` when the stage ran without a validation split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub stage:    Stage,
    pub epoch:    usize,
    pub val_loss: Option<f64>,
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the checkpoint directory (like `mkdir -p`)
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    /// Save weights of `module` after `epoch` of `stage`.
    pub fn save_epoch<B: Backend, M: Module<B>>(&self, module: &M, stage: Stage, epoch: usize) -> Result<()> {
        self.record::<B, M>(module, self.dir.join(format!("{stage}_epoch_{epoch}")))?;
        tracing::debug!("Saved checkpoint: {} epoch {}", stage, epoch);
        Ok(())
    }

    /// Save `module` as the best model of `stage` so far.
    pub fn save_best<B: Backend, M: Module<B>>(&self, module: &M, best: BestCheckpoint) -> Result<()> {
        self.record::<B, M>(module, self.best_path(best.stage))?;
        self.save_json(&format!("{}_best.json", best.stage), &best)?;
        match best.val_loss {
            Some(loss) => tracing::info!("New best {} model: epoch {} (val_loss={:.4})", best.stage, best.epoch, loss),
            None       => tracing::info!("New best {} model: epoch {} (no validation)", best.stage, best.epoch),
        }
        Ok(())
    }

    /// Load the best weights of `stage` into `module`.
    ///
    /// `module` must have the architecture the checkpoint was
    /// saved with, or loading fails.
    pub fn load_best<B: Backend, M: Module<B>>(
        &self,
        module: M,
        stage:  Stage,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.best_path(stage);
        let record = <CompactRecorder as Recorder<B>>::load(&CompactRecorder::new(), path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;
        tracing::info!("Loaded {} weights from '{}'", stage, path.display());
        Ok(module.load_record(record))
    }

    pub fn best_checkpoint(&self, stage: Stage) -> Result<BestCheckpoint> {
        self.load_json(&format!("{stage}_best.json"))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.save_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.load_json(CONFIG_FILE).with_context(|| {
            "Cannot load training config. Make sure you have run 'train' before 'predict'."
        })
    }

    /// Write any serialisable value as pretty JSON under the checkpoint dir.
    pub fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed JSON in '{}'", path.display()))
    }

    fn best_path(&self, stage: Stage) -> PathBuf {
        self.dir.join(format!("{stage}_best"))
    }

    fn record<B: Backend, M: Module<B>>(&self, module: &M, path: PathBuf) -> Result<()> {
        let recorder = CompactRecorder::new();
        <CompactRecorder as Recorder<B>>::record(&recorder, module.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))
    }
}
