// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Labels images with the best trained classifier. The input may be:
//
//   scan.png          a single image
//   some/dir/         every image directly inside it
//   AD_NC/test/       an AD/ + NC/ dataset; accuracy is reported
//                     against the folder labels

use anyhow::{bail, Result};
use burn::prelude::Backend;
use std::path::{Path, PathBuf};

use crate::data::loader::{list_images, ImageFolderLoader};
use crate::domain::traits::ScanSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    evaluator::ConfusionMatrix,
    inferencer::{InferBackend, Prediction, Predictor},
};

#[derive(Debug)]
pub struct PredictReport {
    pub predictions: Vec<Prediction>,
    /// Present when the input was a labelled dataset
    pub confusion:   Option<ConfusionMatrix>,
}

pub struct PredictUseCase<B: Backend> {
    predictor: Predictor<B>,
}

impl PredictUseCase<InferBackend> {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let ckpt = CheckpointManager::new(checkpoint_dir);
        Ok(Self::with_predictor(Predictor::from_checkpoint_dir(&ckpt)?))
    }
}

impl<B: Backend> PredictUseCase<B> {
    pub fn with_predictor(predictor: Predictor<B>) -> Self {
        Self { predictor }
    }

    pub fn execute(&self, input: &Path) -> Result<PredictReport> {
        if input.is_file() {
            let prediction = self.predictor.predict_path(input)?;
            return Ok(PredictReport { predictions: vec![prediction], confusion: None });
        }
        if !input.is_dir() {
            bail!("Input '{}' does not exist", input.display());
        }

        if ImageFolderLoader::looks_like_dataset(input) {
            return self.execute_labelled(input);
        }

        let mut paths = list_images(input)?;
        paths.sort();
        if paths.is_empty() {
            bail!("No images found in '{}'", input.display());
        }
        tracing::info!("Predicting {} images from '{}'", paths.len(), input.display());
        Ok(PredictReport { predictions: self.predictor.predict_all(&paths)?, confusion: None })
    }

    fn execute_labelled(&self, root: &Path) -> Result<PredictReport> {
        let records = ImageFolderLoader::new(root).load_records()?;
        let paths: Vec<PathBuf> = records.iter().map(|r| r.path.clone()).collect();
        tracing::info!("Evaluating on labelled dataset '{}' ({} images)", root.display(), paths.len());

        let predictions = self.predictor.predict_all(&paths)?;
        let mut confusion = ConfusionMatrix::default();
        for (record, prediction) in records.iter().zip(&predictions) {
            confusion.record(record.label, prediction.label);
        }
        tracing::info!("Accuracy: {:.2}%", confusion.accuracy() * 100.0);

        Ok(PredictReport { predictions, confusion: Some(confusion) })
    }
}
