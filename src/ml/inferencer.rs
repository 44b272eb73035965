// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the classifier from train_config.json plus the best
// classifier weights, then labels image files:
//
//   path ─► preprocess (same H×W as training) ─► tower ─► head
//        ─► softmax ─► P(AD), argmax label

use anyhow::{anyhow, Result};
use burn::{backend::wgpu::WgpuDevice, prelude::*};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::data::{batcher::images_to_tensor, preprocessor::{ImagePreprocessor, ScanImage}};
use crate::domain::scan::Label;
use crate::infra::{checkpoint::CheckpointManager, metrics::Stage};
use crate::ml::model::EmbeddingClassifier;

pub type InferBackend = burn::backend::Wgpu;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub path:           PathBuf,
    pub label:          Label,
    pub ad_probability: f32,
}

pub struct Predictor<B: Backend> {
    model:        EmbeddingClassifier<B>,
    preprocessor: ImagePreprocessor,
    batch_size:   usize,
    device:       B::Device,
}

impl Predictor<InferBackend> {
    /// Load on the default WGPU device.
    pub fn from_checkpoint_dir(ckpt: &CheckpointManager) -> Result<Self> {
        Self::from_checkpoint(ckpt, WgpuDevice::default())
    }
}

impl<B: Backend> Predictor<B> {
    pub fn from_checkpoint(ckpt: &CheckpointManager, device: B::Device) -> Result<Self> {
        let cfg   = ckpt.load_config()?;
        let model = EmbeddingClassifier::new(
            cfg.embedding_config().init::<B>(&device),
            cfg.head_config().init::<B>(&device),
        );
        let model = ckpt.load_best::<B, _>(model, Stage::Classifier, &device)?;
        let best  = ckpt.best_checkpoint(Stage::Classifier)?;
        tracing::info!(
            "Classifier ready: epoch {} weights, {}×{} inputs",
            best.epoch, cfg.height, cfg.width,
        );
        Ok(Self {
            model,
            preprocessor: cfg.preprocessor(),
            batch_size:   cfg.batch_size.max(1),
            device,
        })
    }

    pub fn predict_path(&self, path: &Path) -> Result<Prediction> {
        self.predict_all(&[path.to_path_buf()])?
            .pop()
            .ok_or_else(|| anyhow!("No prediction for '{}'", path.display()))
    }

    /// Predict every path, in order. Any undecodable file is an error.
    pub fn predict_all(&self, paths: &[PathBuf]) -> Result<Vec<Prediction>> {
        let mut out = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(self.batch_size) {
            let images = chunk
                .iter()
                .map(|p| self.preprocessor.load(p))
                .collect::<Result<Vec<ScanImage>, _>>()?;
            let refs: Vec<&ScanImage> = images.iter().collect();

            let probs: Vec<f32> = self
                .model
                .probabilities(images_to_tensor::<B>(&refs, &self.device))
                .into_data()
                .convert::<f32>()
                .to_vec()
                .map_err(|e| anyhow!("Cannot read probabilities: {e:?}"))?;

            // Row-major [N, 2]: column 0 is AD, column 1 is NC
            for (path, row) in chunk.iter().zip(probs.chunks(Label::ALL.len())) {
                let ad    = row[Label::Ad.index()];
                let label = if ad >= row[Label::Nc.index()] { Label::Ad } else { Label::Nc };
                tracing::debug!("{} → {} (P(AD)={:.3})", path.display(), label, ad);
                out.push(Prediction { path: path.clone(), label, ad_probability: ad });
            }
        }
        Ok(out)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::infra::checkpoint::BestCheckpoint;
    use burn::backend::NdArray;
    use image::{GrayImage, Luma};

    type TestBackend = NdArray;

    fn save_random_classifier(ckpt: &CheckpointManager) -> TrainConfig {
        let cfg = TrainConfig {
            height:        12,
            width:         10,
            batch_size:    2,
            channels:      vec![2],
            hidden:        4,
            embedding_dim: 3,
            head_hidden:   4,
            ..TrainConfig::default()
        };
        let device = Default::default();
        let model  = EmbeddingClassifier::new(
            cfg.embedding_config().init::<TestBackend>(&device),
            cfg.head_config().init::<TestBackend>(&device),
        );
        ckpt.save_config(&cfg).unwrap();
        ckpt.save_best::<TestBackend, _>(
            &model,
            BestCheckpoint { stage: Stage::Classifier, epoch: 1, val_loss: Some(0.5) },
        )
        .unwrap();
        cfg
    }

    #[test]
    fn test_predicts_every_file_in_order() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        save_random_classifier(&ckpt);

        // Sizes differ from the training size on purpose
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| {
                let p = tmp.path().join(format!("{i}_0.png"));
                GrayImage::from_pixel(30 + i, 25, Luma([(i * 40) as u8])).save(&p).unwrap();
                p
            })
            .collect();

        let predictor = Predictor::<TestBackend>::from_checkpoint(&ckpt, Default::default()).unwrap();
        let preds = predictor.predict_all(&paths).unwrap();

        assert_eq!(preds.len(), 5);
        for (pred, path) in preds.iter().zip(&paths) {
            assert_eq!(&pred.path, path);
            assert!((0.0..=1.0).contains(&pred.ad_probability));
            assert_eq!(pred.label == Label::Ad, pred.ad_probability >= 0.5);
        }

        let single = predictor.predict_path(&paths[3]).unwrap();
        assert!((single.ad_probability - preds[3].ad_probability).abs() < 1e-5);
    }

    #[test]
    fn test_loads_classifier_trained_without_validation() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        save_random_classifier(&ckpt);
        ckpt.save_json(
            "classifier_best.json",
            &BestCheckpoint { stage: Stage::Classifier, epoch: 4, val_loss: None },
        )
        .unwrap();

        assert!(Predictor::<TestBackend>::from_checkpoint(&ckpt, Default::default()).is_ok());
    }

    #[test]
    fn test_untrained_checkpoint_dir_is_an_error() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        assert!(Predictor::<TestBackend>::from_checkpoint(&ckpt, Default::default()).is_err());
    }

    #[test]
    fn test_unreadable_image_is_an_error() {
        let tmp  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        save_random_classifier(&ckpt);
        let bad = tmp.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();

        let predictor = Predictor::<TestBackend>::from_checkpoint(&ckpt, Default::default()).unwrap();
        assert!(predictor.predict_path(&bad).is_err());
    }
}
