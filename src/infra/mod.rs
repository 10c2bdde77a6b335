// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles the concerns shared by `segment` and `resume`:
//
//   checkpoint.rs — Corpus state persistence
//                   Saves the pipeline config and corpus
//                   snapshot as JSON, the classifier through
//                   its trainer (Burn recorder), and the final
//                   per-video segmentations.
//
//   metrics.rs    — Accuracy logging
//                   Appends one CSV row per accuracy-log entry
//                   (MoF, IoU, decoded/skipped videos).
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Config, corpus snapshot and classifier persistence
pub mod checkpoint;

/// Accuracy CSV logger
pub mod metrics;
