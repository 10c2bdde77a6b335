// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to segment a corpus
// of videos and to continue a run from a checkpoint.
//
// Rules for this layer:
//   - No tensor code here (that's Layer 5 - ml)
//   - No printing here (that's Layer 1)
//   - No direct file formats (that's Layer 4 and 6)
//   - Workflow coordination and corpus state only
//
// corpus.rs is the one stateful piece: it owns the videos,
// the pseudo-labels and the current classifier, and enforces
// the order embed → cluster → train → refine → finalize.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Per-round accuracy history
pub mod accuracy_log;

// Corpus state machine and the refinement loop
pub mod corpus;

// The full `segment` workflow
pub mod segment_use_case;

// Continue refinement from a checkpoint
pub mod resume_use_case;
