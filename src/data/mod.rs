// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from an image-folder directory to tensor batches:
//
//   AD_NC/train/{AD,NC}/*.jpeg
//       │
//       ▼
//   ImageFolderLoader  → ScanRecords (path, patient, label)
//       │
//       ▼
//   PatientSplitter    → train / validation / test, no shared patients
//       │
//       ▼
//   ImagePreprocessor  → grey, 256 × 240, u8
//       │
//       ▼
//   ScanStore          → decoded images of one split
//       │
//       ├──▶ TripletDataset + TripletSampler → TripletBatcher
//       └──▶ ScanDataset                     → ScanBatcher
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Walks `<root>/AD` and `<root>/NC`
pub mod loader;

/// Decodes and resizes images
pub mod preprocessor;

/// Patient-level train / validation / test split
pub mod splitter;

/// Anchor / positive / negative index sampling
pub mod sampler;

/// Burn Dataset implementations
pub mod dataset;

/// Burn Batcher implementations
pub mod batcher;
