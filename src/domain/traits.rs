// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The refinement loop only needs four capabilities from the
// outside world, and each one is a trait here:
//
//   FeatureSource → loads videos + frame features for an activity
//   Embedder      → maps raw frame features to an embedding
//   ModelTrainer  → trains a classifier on (features, labels)
//   Scorer        → the trained classifier: features → posteriors
//
// The orchestrator is written against these traits, so the
// Burn-backed implementations in the ml layer can be swapped
// for a deterministic stub in tests.

use anyhow::Result;
use std::path::Path;
use thiserror::Error;

use crate::domain::{feature_store::{FeatureMatrix, FeatureStore}, video::Video};

// ─── FeatureSource ────────────────────────────────────────────────────────────
/// Videos and the shared feature store for one activity class.
#[derive(Debug, Clone)]
pub struct LoadedCorpus {
    pub videos: Vec<Video>,
    pub store:  FeatureStore,
}

/// Any component that can load a video corpus.
///
/// Implementations:
///   - TxtFeatureLoader → Breakfast / 50 Salads text feature layout
pub trait FeatureSource {
    /// Load every video whose name matches `activity`
    /// (`"all"` selects every video).
    fn load(&self, activity: &str) -> Result<LoadedCorpus>;
}

// ─── Embedder ─────────────────────────────────────────────────────────────────
/// Maps an F × D feature matrix to an F × E embedding.
pub trait Embedder {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// True when `embed` returns its input unchanged.
    fn is_identity(&self) -> bool {
        false
    }

    fn embed(&self, features: &FeatureMatrix) -> Result<FeatureMatrix>;

    /// Persist whatever was learned; stateless embedders write nothing.
    fn save(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }
}

// ─── Scorer ───────────────────────────────────────────────────────────────────
/// A trained frame classifier.
pub trait Scorer {
    fn num_classes(&self) -> usize;

    /// Per-frame class posteriors: F × `num_classes()`, rows sum to 1.
    fn score(&self, features: &FeatureMatrix) -> Result<FeatureMatrix>;
}

// ─── ModelTrainer ─────────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("training diverged at epoch {epoch} (loss = {loss})")]
    Diverged { epoch: usize, loss: f64 },

    #[error("no frames to train on")]
    EmptyTrainingSet,

    #[error("{features} feature rows but {labels} labels")]
    LabelCount { features: usize, labels: usize },

    #[error("label {label} out of range for {num_classes} classes")]
    InvalidLabel { label: usize, num_classes: usize },
}

impl TrainError {
    /// Divergence is the only failure worth retrying with fresh weights.
    pub fn is_divergence(&self) -> bool {
        matches!(self, TrainError::Diverged { .. })
    }
}

/// Trains classifiers for the refinement loop.
///
/// `attempt` is 0 for the first try and 1 for the single retry after a
/// divergence; implementations re-initialise their weights from it so
/// the whole run stays deterministic for a fixed seed.
pub trait ModelTrainer {
    type Scorer: Scorer;

    fn train(
        &self,
        features:    &FeatureMatrix,
        labels:      &[usize],
        num_classes: usize,
        attempt:     u32,
    ) -> std::result::Result<Self::Scorer, TrainError>;

    /// Persist a trained scorer into `dir`.
    fn save_scorer(&self, scorer: &Self::Scorer, dir: &Path) -> Result<()>;

    /// Restore a scorer written by `save_scorer`.
    fn load_scorer(&self, dir: &Path) -> Result<Self::Scorer>;
}
