// ============================================================
// Layer 3 — Data Errors
// ============================================================
// Typed failures of the data pipeline. Everything above the
// data layer wraps these in anyhow::Error.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::scan::{Label, PatientId};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("class directory for {} not found under '{}'", label, root.display())]
    MissingClassDir { root: PathBuf, label: Label },

    #[error("no images found under '{}'", .0.display())]
    EmptyDataset(PathBuf),

    #[error("invalid split fractions: train={train}, validation={validation}")]
    InvalidFraction { train: f64, validation: f64 },

    #[error("patient {patient} appears in both the {first} and {second} splits")]
    PatientLeakage {
        patient: PatientId,
        first:   &'static str,
        second:  &'static str,
    },

    #[error("cannot sample triplets: {0}")]
    NoTripletCandidates(String),

    #[error("cannot decode image '{}': {}", path.display(), reason)]
    ImageDecode { path: PathBuf, reason: String },
}
