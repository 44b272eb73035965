// ============================================================
// Layer 5 — Training Loops
// ============================================================
// Two stages, each a train + validation loop using Burn's
// DataLoader and Adam:
//
//   Stage 1 (siamese)    triplets → shared tower → triplet loss
//   Stage 2 (classifier) images → best tower → head → cross-entropy
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() returns the model on B::InnerBackend, which
//     also switches off dropout and freezes batch-norm statistics
//   - Validation batchers must therefore use B::InnerBackend
//
// Both loops are generic over the backend; run_training picks
// Autodiff<Wgpu>, tests use Autodiff<NdArray>.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ScanBatcher, TripletBatcher},
    dataset::{ScanDataset, ScanStore, TripletDataset},
    sampler::TripletSampler,
};
use crate::infra::{
    checkpoint::{BestCheckpoint, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger, Stage},
};
use crate::ml::{
    evaluator::{evaluate, Evaluation},
    loss::TripletLossConfig,
    model::{EmbeddingClassifier, EmbeddingNet, SiameseNet},
};

pub type TrainBackend = Autodiff<Wgpu>;

/// Validation triplets are rebuilt each epoch from `seed + 1`.
/// With several loader workers the draw order, and so the exact
/// triplets, can still vary.
const VAL_SEED_OFFSET: u64 = 1;

/// Decoded images of the three splits
pub struct SplitStores {
    pub train:      Arc<ScanStore>,
    pub validation: Arc<ScanStore>,
    pub test:       Arc<ScanStore>,
}

/// Run both stages on the default WGPU device and evaluate the
/// best classifier on the test split (None when it is empty).
pub fn run_training(
    cfg:     &TrainConfig,
    stores:  &SplitStores,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
) -> Result<Option<Evaluation>> {
    let device = WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_and_test::<TrainBackend>(cfg, stores, ckpt, metrics, &device)
}

pub fn train_and_test<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    stores:  &SplitStores,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
    device:  &B::Device,
) -> Result<Option<Evaluation>> {
    let tower = train_siamese::<B>(cfg, stores.train.clone(), stores.validation.clone(), ckpt, metrics, device)?;
    let model = train_classifier::<B>(cfg, tower, stores.train.clone(), stores.validation.clone(), ckpt, metrics, device)?;

    if stores.test.is_empty() {
        tracing::warn!("Test split is empty; skipping test evaluation");
        return Ok(None);
    }
    let report = evaluate(
        &model.valid(),
        ScanDataset::new(stores.test.clone()),
        cfg.batch_size,
        cfg.num_workers,
        device,
    )?;
    tracing::info!(
        "Test: loss={:.4} accuracy={:.2}% over {} images",
        report.loss, report.accuracy * 100.0, report.confusion.total(),
    );
    Ok(Some(report))
}

// ─── Stage 1: triplet training ────────────────────────────────────────────────

/// Train the embedding tower with triplet loss and return the
/// weights of the best validation epoch.
pub fn train_siamese<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    train:   Arc<ScanStore>,
    val:     Arc<ScanStore>,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
    device:  &B::Device,
) -> Result<EmbeddingNet<B>> {
    let mut model = SiameseNet::new(cfg.embedding_config().init::<B>(device));
    tracing::info!(
        "Siamese tower ready: channels={:?}, embedding_dim={}",
        cfg.embedding_config().channels, cfg.embedding_dim,
    );

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let loss_fn   = TripletLossConfig::new().with_margin(cfg.margin).init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_len    = train.len();
    let train_loader = DataLoaderBuilder::new(TripletBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size.max(1))
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers.max(1))
        .build(TripletDataset::new(train, cfg.seed)?);

    let validate = match TripletSampler::new(val.labels()) {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Siamese validation disabled: {e}");
            false
        }
    };

    let mut best_val_loss = f64::INFINITY;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.siamese_epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let pb = epoch_bar(Stage::Siamese, epoch, cfg.siamese_epochs, train_len, cfg.batch_size)?;
        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in train_loader.iter() {
            let emb = model.forward_triplet(batch.anchors, batch.positives, batch.negatives);
            let out = loss_fn.forward(emb.anchor, emb.positive, emb.negative);
            let n   = out.dist_positive.dims()[0];

            correct  += out.correct_count();
            loss_sum += out.loss.clone().into_scalar().elem::<f64>() * n as f64;
            seen     += n;

            // Backward pass + Adam update
            let grads = out.loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);

            pb.inc(n as u64);
        }
        pb.finish_and_clear();

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → SiameseNet<B::InnerBackend>
        let (val_loss, val_acc) = if validate {
            let model_valid = model.valid();
            let val_loader  = DataLoaderBuilder::new(TripletBatcher::<B::InnerBackend>::new(device.clone()))
                .batch_size(cfg.batch_size.max(1))
                .num_workers(cfg.num_workers.max(1))
                .build(TripletDataset::new(val.clone(), cfg.seed.wrapping_add(VAL_SEED_OFFSET))?);

            let mut v_loss = 0.0f64;
            let mut v_ok   = 0usize;
            let mut v_seen = 0usize;
            for batch in val_loader.iter() {
                let emb = model_valid.forward_triplet(batch.anchors, batch.positives, batch.negatives);
                let out = loss_fn.forward(emb.anchor, emb.positive, emb.negative);
                let n   = out.dist_positive.dims()[0];
                v_ok   += out.correct_count();
                v_loss += out.loss.into_scalar().elem::<f64>() * n as f64;
                v_seen += n;
            }
            (mean(v_loss, v_seen), ratio(v_ok, v_seen))
        } else {
            (f64::NAN, f64::NAN)
        };

        let row = EpochMetrics {
            stage:      Stage::Siamese,
            epoch,
            train_loss: mean(loss_sum, seen),
            val_loss,
            train_acc:  ratio(correct, seen),
            val_acc,
        };
        finish_epoch(&row, cfg.siamese_epochs, metrics)?;

        ckpt.save_epoch::<B, _>(&model.tower, Stage::Siamese, epoch)?;
        if row.is_improvement(best_val_loss) {
            best_val_loss = if val_loss.is_nan() { best_val_loss } else { val_loss };
            ckpt.save_best::<B, _>(&model.tower, BestCheckpoint { stage: Stage::Siamese, epoch, val_loss: known(val_loss) })?;
        }
    }

    tracing::info!("Siamese training complete");
    ckpt.load_best::<B, _>(model.tower, Stage::Siamese, device)
}

// ─── Stage 2: classifier training ─────────────────────────────────────────────

/// Train a classification head on top of `tower` and return the
/// classifier of the best validation epoch.
pub fn train_classifier<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    tower:   EmbeddingNet<B>,
    train:   Arc<ScanStore>,
    val:     Arc<ScanStore>,
    ckpt:    &CheckpointManager,
    metrics: &MetricsLogger,
    device:  &B::Device,
) -> Result<EmbeddingClassifier<B>> {
    let freeze = !cfg.fine_tune_tower;
    let mut model = EmbeddingClassifier::new(tower, cfg.head_config().init::<B>(device));
    tracing::info!(
        "Classifier head ready: {} → {} → 2 ({})",
        cfg.embedding_dim,
        cfg.head_config().hidden,
        if freeze { "tower frozen" } else { "fine-tuning tower" },
    );

    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();
    let ce        = CrossEntropyLossConfig::new().init(device);

    let train_len    = train.len();
    let train_loader = DataLoaderBuilder::new(ScanBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size.max(1))
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers.max(1))
        .build(ScanDataset::new(train));

    let validate = !val.is_empty();
    if !validate {
        tracing::warn!("Validation split is empty; every classifier epoch is kept as best");
    }

    let mut best_val_loss = f64::INFINITY;

    for epoch in 1..=cfg.classifier_epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let pb = epoch_bar(Stage::Classifier, epoch, cfg.classifier_epochs, train_len, cfg.batch_size)?;
        let mut loss_sum = 0.0f64;
        let mut correct  = 0usize;
        let mut seen     = 0usize;

        for batch in train_loader.iter() {
            let n      = batch.labels.dims()[0];
            let logits = model.forward_train(batch.images, freeze);
            let loss   = ce.forward(logits.clone(), batch.labels.clone());

            let hits: i64 = logits
                .argmax(1)
                .flatten::<1>(0, 1)
                .equal(batch.labels)
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>();
            correct  += hits as usize;
            loss_sum += loss.clone().into_scalar().elem::<f64>() * n as f64;
            seen     += n;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.classifier_lr, model, grads);

            pb.inc(n as u64);
        }
        pb.finish_and_clear();

        // ── Validation phase ──────────────────────────────────────────────────
        let (val_loss, val_acc) = if validate {
            let eval = evaluate(
                &model.valid(),
                ScanDataset::new(val.clone()),
                cfg.batch_size,
                cfg.num_workers,
                device,
            )?;
            (eval.loss, eval.accuracy)
        } else {
            (f64::NAN, f64::NAN)
        };

        let row = EpochMetrics {
            stage:      Stage::Classifier,
            epoch,
            train_loss: mean(loss_sum, seen),
            val_loss,
            train_acc:  ratio(correct, seen),
            val_acc,
        };
        finish_epoch(&row, cfg.classifier_epochs, metrics)?;

        ckpt.save_epoch::<B, _>(&model, Stage::Classifier, epoch)?;
        if row.is_improvement(best_val_loss) {
            best_val_loss = if val_loss.is_nan() { best_val_loss } else { val_loss };
            ckpt.save_best::<B, _>(&model, BestCheckpoint { stage: Stage::Classifier, epoch, val_loss: known(val_loss) })?;
        }
    }

    tracing::info!("Classifier training complete");
    ckpt.load_best::<B, _>(model, Stage::Classifier, device)
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn epoch_bar(stage: Stage, epoch: usize, epochs: usize, images: usize, batch_size: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(images as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "  [{prefix}] {elapsed_precise} │{bar:40.cyan/blue}│ {pos}/{len} images • eta {eta}",
        )?
        .progress_chars("█▓░"),
    );
    pb.set_prefix(format!("{stage} {epoch}/{epochs}"));
    tracing::debug!("{} epoch {}: {} images in batches of {}", stage, epoch, images, batch_size);
    Ok(pb)
}

fn finish_epoch(row: &EpochMetrics, epochs: usize, metrics: &MetricsLogger) -> Result<()> {
    println!(
        "[{:<10}] Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | train_acc={:.1}% | val_acc={:.1}%",
        row.stage, row.epoch, epochs, row.train_loss, row.val_loss,
        row.train_acc * 100.0, row.val_acc * 100.0,
    );
    metrics.log(row)
}

fn mean(sum: f64, n: usize) -> f64 {
    if n > 0 { sum / n as f64 } else { f64::NAN }
}

fn ratio(num: usize, n: usize) -> f64 {
    if n > 0 { num as f64 / n as f64 } else { f64::NAN }
}

/// NaN marks a metric with no data behind it.
fn known(value: f64) -> Option<f64> {
    (!value.is_nan()).then_some(value)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::ScanImage;
    use crate::domain::scan::{Label, PatientId, ScanRecord};
    use burn::backend::NdArray;

    type TestBackend = Autodiff<NdArray>;

    /// AD images are bright, NC images dark, with a little per-image variation.
    fn store(n_per_class: usize, offset: usize) -> Arc<ScanStore> {
        let mut records = Vec::new();
        let mut images  = Vec::new();
        for label in Label::ALL {
            for i in 0..n_per_class {
                let id   = offset + label.index() * 100 + i;
                let base = if label == Label::Ad { 200u8 } else { 40u8 };
                records.push(ScanRecord::new(format!("{id}.png"), PatientId::new(id.to_string()), label));
                images.push(ScanImage::from_pixels(16, 16, vec![base + (i as u8) * 3; 256]).unwrap());
            }
        }
        Arc::new(ScanStore::from_parts(records, images))
    }

    fn tiny_config(dir: &std::path::Path) -> TrainConfig {
        TrainConfig {
            checkpoint_dir:    dir.display().to_string(),
            height:            16,
            width:             16,
            batch_size:        4,
            num_workers:       1,
            siamese_epochs:    2,
            classifier_epochs: 2,
            channels:          vec![4, 8],
            hidden:            16,
            embedding_dim:     8,
            head_hidden:       8,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_two_stage_training_end_to_end() {
        let tmp     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(tmp.path());
        let ckpt    = CheckpointManager::new(tmp.path());
        let metrics = MetricsLogger::create(tmp.path()).unwrap();
        let stores  = SplitStores {
            train:      store(6, 0),
            validation: store(2, 1000),
            test:       store(2, 2000),
        };

        let report = train_and_test::<TestBackend>(&cfg, &stores, &ckpt, &metrics, &Default::default())
            .unwrap()
            .expect("test split is not empty");
        assert_eq!(report.confusion.total(), 4);

        let rows = MetricsLogger::read(metrics.csv_path()).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| r.stage == Stage::Siamese).count(), 2);
        assert!(rows.iter().all(|r| r.train_loss.is_finite() && r.val_loss.is_finite()));

        for name in [
            "siamese_epoch_1.mpk.gz",
            "siamese_epoch_2.mpk.gz",
            "siamese_best.mpk.gz",
            "classifier_epoch_2.mpk.gz",
            "classifier_best.mpk.gz",
        ] {
            assert!(tmp.path().join(name).exists(), "missing {name}");
        }
        let best = ckpt.best_checkpoint(Stage::Classifier).unwrap();
        assert!((1..=2).contains(&best.epoch));
        assert!(best.val_loss.is_some_and(f64::is_finite));
    }

    #[test]
    fn test_empty_validation_keeps_latest_epoch() {
        let tmp     = tempfile::tempdir().unwrap();
        let cfg     = TrainConfig { classifier_epochs: 1, ..tiny_config(tmp.path()) };
        let ckpt    = CheckpointManager::new(tmp.path());
        let metrics = MetricsLogger::create(tmp.path()).unwrap();
        let empty   = Arc::new(ScanStore::default());

        let device = Default::default();
        let tower  = train_siamese::<TestBackend>(&cfg, store(4, 0), empty, &ckpt, &metrics, &device).unwrap();
        let best = ckpt.best_checkpoint(Stage::Siamese).unwrap();
        assert_eq!((best.epoch, best.val_loss), (2, None));

        let rows = MetricsLogger::read(metrics.csv_path()).unwrap();
        assert!(rows.iter().all(|r| r.val_loss.is_nan()));

        let x = Tensor::<TestBackend, 4>::ones([1, 1, 16, 16], &device);
        assert_eq!(tower.forward(x).dims(), [1, 8]);
    }
    #[test]
    fn test_single_class_validation_skips_triplet_validation() {
        let tmp     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(tmp.path());
        let ckpt    = CheckpointManager::new(tmp.path());
        let metrics = MetricsLogger::create(tmp.path()).unwrap();
        let nc_only = Arc::new(ScanStore::from_parts(
            vec![ScanRecord::new("900.png", PatientId::new("900"), Label::Nc)],
            vec![ScanImage::from_pixels(16, 16, vec![40; 256]).unwrap()],
        ));

        train_siamese::<TestBackend>(&cfg, store(4, 0), nc_only, &ckpt, &metrics, &Default::default()).unwrap();

        let rows = MetricsLogger::read(metrics.csv_path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.val_loss.is_nan() && r.train_loss.is_finite()));
        assert_eq!(ckpt.best_checkpoint(Stage::Siamese).unwrap().val_loss, None);
    }
}
