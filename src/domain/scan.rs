// ============================================================
// Layer 3 — Scan Domain Types
// ============================================================
// A dataset image is identified by its path, the patient it
// was taken from, and its diagnosis label.
//
// ADNI file names look like `218391_78.jpeg`: the patient ID
// is everything before the first underscore, the rest is the
// slice number.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

// ─── Label ────────────────────────────────────────────────────────────────────
/// Diagnosis label of a scan.
///
/// Class indices follow alphabetical order of the class
/// directories (`AD` < `NC`), the same order an image-folder
/// loader assigns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// Alzheimer's disease
    Ad,
    /// Normal cognition
    Nc,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Ad, Label::Nc];

    pub fn index(self) -> usize {
        match self {
            Label::Ad => 0,
            Label::Nc => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Label::Ad),
            1 => Some(Label::Nc),
            _ => None,
        }
    }

    /// Directory name used in the image-folder layout
    pub fn dir_name(self) -> &'static str {
        match self {
            Label::Ad => "AD",
            Label::Nc => "NC",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|l| l.dir_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

// ─── PatientId ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the patient ID from an image file name.
    /// Returns None when the prefix before the first `_` is empty.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let prefix = file_name.split('_').next()?;
        // Files without an underscore still carry an extension
        let prefix = match prefix.rsplit_once('.') {
            Some((stem, _)) if !file_name.contains('_') => stem,
            _ => prefix,
        };
        if prefix.is_empty() {
            None
        } else {
            Some(Self::new(prefix))
        }
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── ScanRecord ───────────────────────────────────────────────────────────────
/// One labelled image on disk, before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub path:    PathBuf,
    pub patient: PatientId,
    pub label:   Label,
}

impl ScanRecord {
    pub fn new(path: impl Into<PathBuf>, patient: PatientId, label: Label) -> Self {
        Self { path: path.into(), patient, label }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_id_from_adni_name() {
        let id = PatientId::from_file_name("218391_78.jpeg").unwrap();
        assert_eq!(id, PatientId::new("218391"));
    }

    #[test]
    fn test_patient_id_keeps_only_first_segment() {
        let id = PatientId::from_file_name("1182968_94_extra.png").unwrap();
        assert_eq!(id, PatientId::new("1182968"));
    }

    #[test]
    fn test_patient_id_without_underscore_drops_extension() {
        let id = PatientId::from_file_name("808819.png").unwrap();
        assert_eq!(id.to_string(), "808819");
    }

    #[test]
    fn test_patient_id_empty_prefix() {
        assert!(PatientId::from_file_name("_12.png").is_none());
        assert!(PatientId::from_file_name("").is_none());
    }

    #[test]
    fn test_label_indices_follow_directory_order() {
        assert_eq!(Label::Ad.index(), 0);
        assert_eq!(Label::Nc.index(), 1);
        assert_eq!(Label::from_index(1), Some(Label::Nc));
        assert_eq!(Label::from_index(2), None);
    }

    #[test]
    fn test_label_from_dir_name_is_case_insensitive() {
        assert_eq!(Label::from_dir_name("ad"), Some(Label::Ad));
        assert_eq!(Label::from_dir_name("NC"), Some(Label::Nc));
        assert_eq!(Label::from_dir_name("MCI"), None);
    }
}
