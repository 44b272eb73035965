// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Enumerates a dataset laid out as one directory per class:
//
//   AD_NC/train/
//     AD/  218391_78.jpeg  218391_79.jpeg ...
//     NC/  808819_88.jpeg  ...
//
// Only paths and labels are collected here; decoding happens
// in the preprocessor so a bad file never aborts the scan.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    error::DataError,
    scan::{Label, PatientId, ScanRecord},
    traits::ScanSource,
};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

pub struct ImageFolderLoader {
    root: PathBuf,
}

impl ImageFolderLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// True when `root` holds at least one class directory
    pub fn looks_like_dataset(root: &Path) -> bool {
        Label::ALL
            .into_iter()
            .any(|label| find_class_dir(root, label).is_some())
    }
}

impl ScanSource for ImageFolderLoader {
    fn load_records(&self) -> Result<Vec<ScanRecord>> {
        let mut records = Vec::new();

        for label in Label::ALL {
            let class_dir = find_class_dir(&self.root, label).ok_or_else(|| {
                DataError::MissingClassDir { root: self.root.clone(), label }
            })?;

            let mut paths = list_images(&class_dir)?;
            // read_dir order is filesystem dependent
            paths.sort();

            for path in paths {
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                match PatientId::from_file_name(file_name) {
                    Some(patient) => records.push(ScanRecord::new(path, patient, label)),
                    None => tracing::warn!(
                        "Skipping '{}': no patient ID in file name",
                        path.display()
                    ),
                }
            }
        }

        if records.is_empty() {
            return Err(DataError::EmptyDataset(self.root.clone()).into());
        }

        tracing::info!(
            "Found {} images under '{}'",
            records.len(),
            self.root.display()
        );
        Ok(records)
    }
}

/// Locate `<root>/AD` or `<root>/NC`, ignoring case.
fn find_class_dir(root: &Path, label: Label) -> Option<PathBuf> {
    fs::read_dir(root)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(Label::from_dir_name)
                == Some(label)
        })
}

/// All image files directly inside `dir`.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    Ok(paths)
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) {
        File::create(dir.join(name)).unwrap();
    }

    #[test]
    fn test_loads_both_classes_with_patient_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let ad = tmp.path().join("AD");
        let nc = tmp.path().join("NC");
        fs::create_dir_all(&ad).unwrap();
        fs::create_dir_all(&nc).unwrap();
        touch(&ad, "100_1.png");
        touch(&ad, "100_2.png");
        touch(&nc, "200_1.jpeg");
        touch(&nc, "notes.txt");

        let records = ImageFolderLoader::new(tmp.path()).load_records().unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[..2].iter().all(|r| r.label == Label::Ad && r.patient == PatientId::new("100")));
        assert_eq!(records[2].label, Label::Nc);
        assert_eq!(records[2].patient, PatientId::new("200"));
    }

    #[test]
    fn test_class_dirs_are_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("ad")).unwrap();
        fs::create_dir_all(tmp.path().join("nc")).unwrap();
        touch(&tmp.path().join("ad"), "1_1.png");
        touch(&tmp.path().join("nc"), "2_1.png");

        let records = ImageFolderLoader::new(tmp.path()).load_records().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_class_dir_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("AD")).unwrap();
        touch(&tmp.path().join("AD"), "1_1.png");

        let err = ImageFolderLoader::new(tmp.path()).load_records().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DataError>(),
            Some(DataError::MissingClassDir { label: Label::Nc, .. })
        ));
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("AD")).unwrap();
        fs::create_dir_all(tmp.path().join("NC")).unwrap();

        let err = ImageFolderLoader::new(tmp.path()).load_records().unwrap_err();
        assert!(matches!(err.downcast_ref::<DataError>(), Some(DataError::EmptyDataset(_))));
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(!is_image(Path::new("a/b.txt")));
        assert!(!is_image(Path::new("a/b")));
    }
}
