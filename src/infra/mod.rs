// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs — model weights (Burn CompactRecorder) and the
//                   JSON side files: config, best-epoch pointers,
//                   partition manifest, test report
//
//   metrics.rs    — per-epoch metrics CSV
//
//   plot.rs       — loss / accuracy curves rendered from the CSV
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Training curve rendering
pub mod plot;
