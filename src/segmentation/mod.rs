// ============================================================
// Layer 5 — Segmentation Algorithms
// ============================================================
// Framework-free algorithms of the refinement loop:
//
//   decoder.rs    — monotonic Viterbi decoding of one video
//   clustering.rs — k-means for the initial pseudo ground truth
//   priors.rs     — learned label order and mean durations
//   accuracy.rs   — Hungarian-matched MoF / IoU evaluation
//
// Nothing here touches Burn or the filesystem.

pub mod accuracy;
pub mod clustering;
pub mod decoder;
pub mod priors;
