// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits describing the corpus:
// videos, the shared frame feature store, pseudo-labelings,
// and the capabilities the pipeline needs from collaborators
// (loading, embedding, training, scoring).
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Everything in here is testable without a model or a dataset.

/// Dense row-major feature matrices and the global frame store
pub mod feature_store;

/// A single video: name, frame range, ground truth, prediction
pub mod video;

/// Global frame index → label mapping
pub mod labeling;

/// Core abstractions (traits) that other layers implement
pub mod traits;
