// ============================================================
// Layer 3 — Patient Partition
// ============================================================
// The train / validation / test split of a dataset.
//
// Invariant: every patient lives in exactly one split. Slices
// of the same brain are nearly identical, so a patient in both
// train and validation would leak labels into the validation
// score.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use crate::domain::error::DataError;
use crate::domain::scan::{Label, PatientId, ScanRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    pub fn name(self) -> &'static str {
        match self {
            Split::Train      => "train",
            Split::Validation => "validation",
            Split::Test       => "test",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatientPartition {
    pub train:      Vec<ScanRecord>,
    pub validation: Vec<ScanRecord>,
    pub test:       Vec<ScanRecord>,
}

impl PatientPartition {
    pub fn records(&self, split: Split) -> &[ScanRecord] {
        match split {
            Split::Train      => &self.train,
            Split::Validation => &self.validation,
            Split::Test       => &self.test,
        }
    }

    /// Distinct patients in one split
    pub fn patients(&self, split: Split) -> BTreeSet<PatientId> {
        self.records(split).iter().map(|r| r.patient.clone()).collect()
    }

    /// Check the no-leakage invariant across all three splits.
    pub fn verify(&self) -> Result<(), DataError> {
        let mut owner: HashMap<&PatientId, Split> = HashMap::new();

        for split in Split::ALL {
            for record in self.records(split) {
                match owner.get(&record.patient) {
                    Some(&other) if other != split => {
                        return Err(DataError::PatientLeakage {
                            patient: record.patient.clone(),
                            first:   other.name(),
                            second:  split.name(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(&record.patient, split);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> PartitionSummary {
        let rows = Split::ALL
            .into_iter()
            .map(|split| {
                let records = self.records(split);
                let count = |label: Label| records.iter().filter(|r| r.label == label).count();
                SplitSummary {
                    split,
                    patients: self.patients(split).len(),
                    ad_images: count(Label::Ad),
                    nc_images: count(Label::Nc),
                }
            })
            .collect();
        PartitionSummary { rows }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub split:     Split,
    pub patients:  usize,
    pub ad_images: usize,
    pub nc_images: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub rows: Vec<SplitSummary>,
}

impl fmt::Display for PartitionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(
                f,
                "{:<10} | patients={:>5} | AD images={:>6} | NC images={:>6}",
                row.split.name(), row.patients, row.ad_images, row.nc_images,
            )?;
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn rec(patient: &str, slice: usize, label: Label) -> ScanRecord {
        ScanRecord::new(
            format!("{}/{patient}_{slice}.png", label.dir_name()),
            PatientId::new(patient),
            label,
        )
    }

    #[test]
    fn test_disjoint_partition_verifies() {
        let p = PatientPartition {
            train:      vec![rec("1", 0, Label::Ad), rec("1", 1, Label::Ad)],
            validation: vec![rec("2", 0, Label::Nc)],
            test:       vec![rec("3", 0, Label::Ad)],
        };
        assert!(p.verify().is_ok());
    }

    #[test]
    fn test_leaking_patient_is_rejected() {
        let p = PatientPartition {
            train:      vec![rec("1", 0, Label::Ad)],
            validation: vec![rec("2", 0, Label::Nc)],
            test:       vec![rec("1", 7, Label::Ad)],
        };
        match p.verify() {
            Err(DataError::PatientLeakage { patient, first, second }) => {
                assert_eq!(patient, PatientId::new("1"));
                assert_eq!(first, "train");
                assert_eq!(second, "test");
            }
            other => panic!("expected leakage error, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_counts() {
        let p = PatientPartition {
            train:      vec![rec("1", 0, Label::Ad), rec("1", 1, Label::Ad), rec("4", 0, Label::Nc)],
            validation: vec![rec("2", 0, Label::Nc)],
            test:       Vec::new(),
        };
        let s = p.summary();
        assert_eq!(s.rows[0].patients, 2);
        assert_eq!(s.rows[0].ad_images, 2);
        assert_eq!(s.rows[0].nc_images, 1);
        assert_eq!(s.rows[2].patients, 0);
    }
}
