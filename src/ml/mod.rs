// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains the Burn model, loss and training code.
// Data batchers in Layer 4 produce tensors; everything that
// builds, trains or runs a network lives here.
//
// What's in this layer:
//
//   model.rs      — the shared convolutional embedding tower,
//                   the Siamese wrapper that runs it three
//                   times per triplet, and the classifier head
//
//   loss.rs       — triplet margin loss and pairwise distance
//
//   trainer.rs    — stage 1 (triplet) and stage 2 (classifier)
//                   training loops with validation, per-epoch
//                   checkpoints and best-model tracking
//
//   evaluator.rs  — loss / accuracy / confusion matrix of a
//                   classifier on a labelled split
//
//   inferencer.rs — loads the best classifier and labels images
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Schroff et al. (2015) FaceNet

/// Embedding tower, Siamese wrapper and classifier
pub mod model;

/// Triplet margin loss
pub mod loss;

/// Two-stage training loop with validation and checkpointing
pub mod trainer;

/// Classifier evaluation
pub mod evaluator;

/// Inference engine — loads checkpoint and predicts labels
pub mod inferencer;
