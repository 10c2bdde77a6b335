// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn model and optimiser code.
// Apart from the tensor batcher in Layer 4, no other layer
// imports from burn directly — only this one.
//
// Why isolate Burn code here?
//   - If Burn's API changes, we only update this layer
//   - The refinement loop in Layer 2 only sees the Scorer,
//     ModelTrainer and Embedder traits, so it is testable
//     with a stub trainer and no tensors at all
//
// What's in this layer:
//
//   model.rs      — The two small MLPs
//                   • SubactionClassifier: D → 2D (ReLU) → K
//                   • TemporalEmbeddingModel: D → E (sigmoid) → 1
//                   Weights are drawn from a seeded RNG so a
//                   fixed seed reproduces a run exactly.
//
//   trainer.rs    — BurnClassifierTrainer (ModelTrainer impl)
//                   Forward pass, cross-entropy loss, backward
//                   pass and Adam step over shuffled batches;
//                   save/load of trained classifiers
//
//   inferencer.rs — BurnScorer (Scorer impl)
//                   Runs the trained classifier on the inner
//                   backend and returns softmax posteriors
//
//   embedder.rs   — EmbeddingKind and its two embedders
//                   (MLP relative-time regression, identity)
//
// Backend: CPU ndarray. Training wraps it in Autodiff;
// model.valid() strips the wrapper for inference.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Kukleva et al. (2019) Unsupervised Learning of
//            Action Classes with Continuous Temporal Embedding

/// Backend used while training (gradients tracked)
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Backend used for scoring and embedding (no autodiff overhead)
pub type InferBackend = burn::backend::NdArray;

/// Device shared by both backends
pub type Device = burn::backend::ndarray::NdArrayDevice;

/// Classifier and temporal-embedding MLP architectures
pub mod model;

/// Classifier training loop and persistence
pub mod trainer;

/// Trained classifier as a Scorer
pub mod inferencer;

/// Embedding selection and the MLP / identity embedders
pub mod embedder;
