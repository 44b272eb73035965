// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types describing the dataset:
//
//   scan.rs      — Label, PatientId, ScanRecord
//   partition.rs — PatientPartition and the no-leakage check
//   error.rs     — typed data errors
//   traits.rs    — ScanSource abstraction
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

pub mod scan;

pub mod partition;

pub mod error;

pub mod traits;
