// ============================================================
// Layer 4 — Patient-Level Splitter
// ============================================================
// Splits a dataset into train / validation / test by PATIENT,
// not by image.
//
// Why split by patient?
//   Each patient contributes ~20 near-identical slices. An
//   image-level shuffle would put slices of the same brain on
//   both sides of the split and the validation score would
//   measure memorisation instead of generalisation.
//
// Algorithm:
//   1. Group records by patient ID
//   2. Stratify patients by label so AD/NC ratios carry over
//   3. Shuffle each class's patients with a seeded RNG
//   4. First floor(n * train_fraction) patients → train,
//      next floor(n * validation_fraction) → validation,
//      rest → test
//
// When train + validation == 1 the rounding remainder goes to
// validation instead, so 0.9 / 0.1 gives a two-way split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::BTreeMap;

use crate::domain::{
    error::DataError,
    partition::PatientPartition,
    scan::{Label, PatientId, ScanRecord},
};

const FRACTION_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
pub struct PatientSplitter {
    pub train_fraction:      f64,
    pub validation_fraction: f64,
    pub seed:                u64,
}

impl PatientSplitter {
    pub fn new(train_fraction: f64, validation_fraction: f64, seed: u64) -> Result<Self, DataError> {
        let valid = |f: f64| (0.0..=1.0).contains(&f);
        if !valid(train_fraction)
            || !valid(validation_fraction)
            || train_fraction + validation_fraction > 1.0 + FRACTION_EPS
        {
            return Err(DataError::InvalidFraction {
                train:      train_fraction,
                validation: validation_fraction,
            });
        }
        Ok(Self { train_fraction, validation_fraction, seed })
    }

    /// Three-way split of a single pool of records.
    pub fn split(&self, records: Vec<ScanRecord>) -> Result<PatientPartition, DataError> {
        let mut rng       = StdRng::seed_from_u64(self.seed);
        let mut partition = PatientPartition::default();
        let two_way       = self.train_fraction + self.validation_fraction >= 1.0 - FRACTION_EPS;

        for (label, mut patients) in group_by_label(records) {
            patients.shuffle(&mut rng);

            let total   = patients.len();
            let n_train = ((total as f64) * self.train_fraction).floor() as usize;
            let n_val   = if two_way {
                total - n_train
            } else {
                (((total as f64) * self.validation_fraction).floor() as usize).min(total - n_train)
            };

            for (i, (_, images)) in patients.into_iter().enumerate() {
                let bucket = if i < n_train {
                    &mut partition.train
                } else if i < n_train + n_val {
                    &mut partition.validation
                } else {
                    &mut partition.test
                };
                bucket.extend(images);
            }

            tracing::debug!(
                "{}: {} patients → {} train, {} validation, {} test",
                label, total, n_train, n_val, total - n_train - n_val,
            );
        }

        partition.verify()?;
        Ok(partition)
    }

    /// Split `pool` into train / validation and use a separately
    /// provided directory as the test set.
    pub fn split_with_test_set(
        &self,
        pool: Vec<ScanRecord>,
        test: Vec<ScanRecord>,
    ) -> Result<PatientPartition, DataError> {
        let two_way = Self {
            validation_fraction: 1.0 - self.train_fraction,
            ..*self
        };
        let mut partition = two_way.split(pool)?;
        partition.test = test;
        partition.verify()?;
        Ok(partition)
    }
}

type PatientGroup = (PatientId, Vec<ScanRecord>);

/// Group records by patient, then bucket patients by label.
///
/// A patient whose images carry both labels is assigned to the
/// label of the majority of its images; all its images stay
/// together either way.
fn group_by_label(records: Vec<ScanRecord>) -> BTreeMap<Label, Vec<PatientGroup>> {
    let mut by_patient: BTreeMap<PatientId, Vec<ScanRecord>> = BTreeMap::new();
    for r in records {
        by_patient.entry(r.patient.clone()).or_default().push(r);
    }

    let mut by_label: BTreeMap<Label, Vec<PatientGroup>> = BTreeMap::new();
    for (patient, images) in by_patient {
        let ad = images.iter().filter(|r| r.label == Label::Ad).count();
        let label = if ad * 2 >= images.len() { Label::Ad } else { Label::Nc };
        by_label.entry(label).or_default().push((patient, images));
    }
    by_label
}
