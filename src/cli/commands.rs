// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `train`, `predict` and `plot`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{builder::RangedU64ValueParser, Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::preprocessor::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the Siamese tower, then the AD/NC classifier
    Train(TrainArgs),

    /// Label images with a trained checkpoint
    Predict(PredictArgs),

    /// Redraw loss / accuracy curves from metrics.csv
    Plot(PlotArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Image-folder dataset with AD/ and NC/ subdirectories
    #[arg(long, default_value = "AD_NC/train")]
    pub data_dir: String,

    /// Held-out test dataset; if missing, the test split is taken
    /// from --data-dir
    #[arg(long, default_value = "AD_NC/test")]
    pub test_dir: String,

    /// Ignore --test-dir and always carve the test split out of
    /// --data-dir
    #[arg(long, conflicts_with = "test_dir")]
    pub no_test_dir: bool,

    /// Directory for checkpoints, metrics, reports and plots
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Image height after resizing
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    pub height: usize,

    /// Image width after resizing
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    pub width: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Epochs of triplet training (at least 1)
    #[arg(long, default_value_t = 20, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub siamese_epochs: usize,

    /// Epochs of classifier training on the learned embeddings (at least 1)
    #[arg(long, default_value_t = 10, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub classifier_epochs: usize,

    /// Adam learning rate for the Siamese tower
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Adam learning rate for the classifier
    #[arg(long, default_value_t = 1e-3)]
    pub classifier_lr: f64,

    /// Triplet loss margin
    #[arg(long, default_value_t = 1.0)]
    pub margin: f64,

    /// Size of the embedding vector
    #[arg(long, default_value_t = 128)]
    pub embedding_dim: usize,

    /// Dropout probability in the tower and the head
    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Share of patients used for training
    #[arg(long, default_value_t = 0.9)]
    pub train_fraction: f64,

    /// Share of patients used for validation (ignored when a
    /// separate test directory is used: validation gets the rest)
    #[arg(long, default_value_t = 0.1)]
    pub validation_fraction: f64,

    /// Seed for the split, shuffling and triplet sampling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Data loader worker threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    /// Keep training the tower during the classifier stage
    /// instead of freezing it
    #[arg(long)]
    pub fine_tune_tower: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:            a.data_dir,
            test_dir:            (!a.no_test_dir).then_some(a.test_dir),
            checkpoint_dir:      a.checkpoint_dir,
            height:              a.height,
            width:               a.width,
            batch_size:          a.batch_size,
            num_workers:         a.num_workers,
            siamese_epochs:      a.siamese_epochs,
            classifier_epochs:   a.classifier_epochs,
            lr:                  a.lr,
            classifier_lr:       a.classifier_lr,
            margin:              a.margin,
            embedding_dim:       a.embedding_dim,
            dropout:             a.dropout,
            train_fraction:      a.train_fraction,
            validation_fraction: a.validation_fraction,
            seed:                a.seed,
            fine_tune_tower:     a.fine_tune_tower,
            ..TrainConfig::default()
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// An image, a directory of images, or an AD/NC dataset
    #[arg(long)]
    pub input: PathBuf,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,
}

/// All arguments for the `plot` command
#[derive(Args, Debug)]
pub struct PlotArgs {
    /// Directory holding metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Where to write the PNGs (default: <checkpoint-dir>/plots)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
