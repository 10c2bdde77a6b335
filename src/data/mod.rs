// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from raw feature files on
// disk all the way to tensor batches for the ml layer.
//
// The pipeline flows in this order:
//
//   features/*.txt + groundTruth/*
//       │
//       ▼
//   TxtFeatureLoader  → reads files, builds Videos + FeatureStore
//       │
//       ▼
//   Standardizer      → optional per-column z-scoring
//       │
//       ▼
//   assemble_dataset  → (feature row, target) pairs per frame
//       │
//       ▼
//   split_into_batches → shuffled mini-batch indices per epoch
//       │
//       ▼
//   FrameBatcher      → stacks rows into tensor batches
//
// Each module is responsible for exactly one step.
// This makes each step independently testable and replaceable.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Loads text features and ground truth from a dataset root
pub mod loader;

/// Per-column feature standardisation
pub mod preprocessor;

/// Builds training sets from a label-derivation closure
pub mod dataset;

/// Stacks frame rows into Burn tensors
pub mod batcher;

/// Shuffles frame indices into mini-batches
pub mod splitter;
