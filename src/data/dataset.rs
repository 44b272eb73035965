use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

use crate::data::{
    preprocessor::{ImagePreprocessor, ScanImage},
    sampler::TripletSampler,
};
use crate::domain::{
    error::DataError,
    scan::{Label, ScanRecord},
};

/// Decoded images of one split, in record order.
#[derive(Debug, Default)]
pub struct ScanStore {
    records: Vec<ScanRecord>,
    images:  Vec<Arc<ScanImage>>,
}

impl ScanStore {
    /// Decode every record in parallel. Files that fail to decode
    /// are logged and dropped.
    pub fn load(records: &[ScanRecord], preprocessor: &ImagePreprocessor) -> Self {
        let (records, images): (Vec<_>, Vec<_>) = records
            .par_iter()
            .filter_map(|r| match preprocessor.load(&r.path) {
                Ok(img) => Some((r.clone(), Arc::new(img))),
                Err(e) => {
                    tracing::warn!("Skipping image: {e}");
                    None
                }
            })
            .unzip();

        tracing::debug!("Decoded {} images", images.len());
        Self { records, images }
    }

    #[cfg(test)]
    pub fn from_parts(records: Vec<ScanRecord>, images: Vec<ScanImage>) -> Self {
        assert_eq!(records.len(), images.len(), "one image per record");
        Self {
            records,
            images: images.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.records.iter().map(|r| r.label).collect()
    }

    fn item(&self, index: usize) -> Option<ScanItem> {
        Some(ScanItem {
            image: self.images.get(index)?.clone(),
            label: self.records[index].label,
        })
    }
}

// ─── Labelled images ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct ScanItem {
    pub image: Arc<ScanImage>,
    pub label: Label,
}

/// Plain labelled images, used by the classifier stage and for evaluation.
pub struct ScanDataset {
    store: Arc<ScanStore>,
}

impl ScanDataset {
    pub fn new(store: Arc<ScanStore>) -> Self {
        Self { store }
    }
}

impl Dataset<ScanItem> for ScanDataset {
    fn get(&self, index: usize) -> Option<ScanItem> {
        self.store.item(index)
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

// ─── Triplets ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TripletItem {
    pub anchor:   Arc<ScanImage>,
    pub positive: Arc<ScanImage>,
    pub negative: Arc<ScanImage>,
}

/// Item `i` is image `i` as anchor, with a positive and negative
/// drawn afresh on every access, so each epoch sees new triplets.
pub struct TripletDataset {
    store:   Arc<ScanStore>,
    sampler: TripletSampler,
    rng:     Mutex<StdRng>,
}

impl TripletDataset {
    pub fn new(store: Arc<ScanStore>, seed: u64) -> Result<Self, DataError> {
        let sampler = TripletSampler::new(store.labels())?;
        Ok(Self {
            store,
            sampler,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }
}

impl Dataset<TripletItem> for TripletDataset {
    fn get(&self, index: usize) -> Option<TripletItem> {
        if index >= self.store.len() {
            return None;
        }
        let (pos, neg) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.sampler.sample(index, &mut *rng)
        };
        Some(TripletItem {
            anchor:   self.store.images[index].clone(),
            positive: self.store.images[pos].clone(),
            negative: self.store.images[neg].clone(),
        })
    }

    fn len(&self) -> usize {
        self.store.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::scan::PatientId;
    use image::{GrayImage, Luma};

    /// Image pixels encode the record index so items can be traced back.
    pub(crate) fn synthetic_store(labels: &[Label]) -> ScanStore {
        let records = labels
            .iter()
            .enumerate()
            .map(|(i, &l)| ScanRecord::new(format!("{i}.png"), PatientId::new(i.to_string()), l))
            .collect();
        let images = (0..labels.len())
            .map(|i| ScanImage::from_pixels(2, 2, vec![i as u8; 4]).unwrap())
            .collect();
        ScanStore::from_parts(records, images)
    }

    #[test]
    fn test_triplet_items_respect_labels() {
        let labels = [Label::Ad, Label::Ad, Label::Nc, Label::Nc, Label::Ad];
        let ds = TripletDataset::new(Arc::new(synthetic_store(&labels)), 3).unwrap();
        assert_eq!(ds.len(), 5);
        for _ in 0..50 {
            for i in 0..ds.len() {
                let item = ds.get(i).unwrap();
                let idx = |img: &ScanImage| (img.to_floats()[0] * 255.0).round() as usize;
                assert_eq!(idx(&item.anchor), i);
                assert_ne!(idx(&item.positive), i);
                assert_eq!(labels[idx(&item.positive)], labels[i]);
                assert_ne!(labels[idx(&item.negative)], labels[i]);
            }
        }
        assert!(ds.get(5).is_none());
    }

    #[test]
    fn test_triplet_dataset_requires_both_classes() {
        let store = Arc::new(synthetic_store(&[Label::Nc, Label::Nc, Label::Nc]));
        assert!(TripletDataset::new(store, 0).is_err());
    }

    #[test]
    fn test_scan_dataset_items() {
        let ds = ScanDataset::new(Arc::new(synthetic_store(&[Label::Nc, Label::Ad])));
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().label, Label::Ad);
        assert!(ds.get(2).is_none());
    }

    #[test]
    fn test_store_skips_undecodable_files() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("1_1.png");
        let bad  = tmp.path().join("2_1.png");
        GrayImage::from_pixel(10, 10, Luma([200])).save(&good).unwrap();
        std::fs::write(&bad, b"garbage").unwrap();

        let records = vec![
            ScanRecord::new(&good, PatientId::new("1"), Label::Ad),
            ScanRecord::new(&bad,  PatientId::new("2"), Label::Nc),
        ];
        let store = ScanStore::load(&records, &ImagePreprocessor::new(4, 4));
        assert_eq!(store.len(), 1);
        assert_eq!(store.records[0].path, good);
    }
}
