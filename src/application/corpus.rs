// ============================================================
// Layer 2 — Corpus (Refinement Orchestrator)
// ============================================================
// Owns everything one activity needs: the videos, the shared
// feature store, the embedded features, the current pseudo-
// labeling, the label order, the classifier and the accuracy
// log. Every operation is only valid in certain states:
//
//   Initialized ──embed──► EmbeddingTrained ─┐
//        └───────embed(identity)──► NoEmbedding ─┤
//                                             cluster
//                                                ▼
//                                            Clustered
//                                                │ train_classifier
//                                                ▼
//                                        ClassifierTrained
//                                                │ refine_round (×N)
//                                                ▼
//                                            Refining ──finalize──► Finalized
//
// One refinement round:
//   1. Score every frame with the current classifier (once)
//   2. Decode each video in parallel (rayon), merged in video
//      order; videos the decoder cannot segment keep their old
//      segmentation and are listed as skipped
//   3. Rebuild the PseudoLabeling from all videos
//   4. Retrain the classifier on the frames of decoded videos
//   5. Append the round's accuracy to the log
//
// A training divergence is retried once with fresh weights;
// a second divergence aborts the loop but the log so far stays.
//
// snapshot() / resume() let a run stop after any round and
// continue later with exactly the same state.

use anyhow::anyhow;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::application::accuracy_log::{AccuracyLog, RoundStats, RoundTag};
use crate::data::dataset::assemble_dataset;
use crate::domain::{
    feature_store::{FeatureMatrix, FeatureStore, ShapeError},
    labeling::PseudoLabeling,
    traits::{Embedder, LoadedCorpus, ModelTrainer, Scorer, TrainError},
    video::Video,
};
use crate::segmentation::{
    accuracy::evaluate,
    clustering::{ClusterError, KMeans},
    decoder::{DecodeError, DecodePrior, DecoderConfig, SegmentationDecoder},
    priors::{canonical_order, mean_durations},
};

// ─── State and Errors ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorpusState {
    Initialized,
    EmbeddingTrained,
    NoEmbedding,
    Clustered,
    ClassifierTrained,
    Refining,
    Finalized,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("video '{video}' covers frames {start}..{end}, expected it to start at {expected}")]
    RangeMismatch { video: String, start: usize, end: usize, expected: usize },

    #[error("videos cover {covered} frames but the feature store holds {stored}")]
    StoreCoverage { covered: usize, stored: usize },

    #[error("video '{video}' has {actual} ground-truth labels for {expected} frames")]
    GroundTruthLength { video: String, expected: usize, actual: usize },

    #[error("background label {label} is not one of the {classes} sub-activities")]
    BackgroundLabel { label: usize, classes: usize },

    #[error("cannot {operation} in state {state:?}")]
    InvalidTransition { operation: &'static str, state: CorpusState },

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("scoring failed: {0:#}")]
    Scoring(anyhow::Error),

    #[error("clustering failed: {0}")]
    Clustering(#[from] ClusterError),

    #[error("classifier training failed: {0}")]
    Training(TrainError),

    #[error("video '{video}': {source}")]
    Shape { video: String, source: ShapeError },

    #[error("pseudo-labeling does not match the store: {0}")]
    Labeling(ShapeError),

    #[error("invalid snapshot: {0}")]
    Snapshot(String),
}

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// K, the number of latent sub-activities
    pub num_subactions: usize,

    pub decoder: DecoderConfig,

    /// Stop refining once a round leaves the pseudo-labeling unchanged
    pub early_stop: bool,
}

impl CorpusConfig {
    pub fn new(num_subactions: usize) -> Self {
        Self { num_subactions, decoder: DecoderConfig::default(), early_stop: false }
    }
}

// ─── Snapshot and Outcome ─────────────────────────────────────────────────────
/// Everything needed to continue refining later (except the
/// classifier weights, which the trainer persists itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub config:           CorpusConfig,
    pub videos:           Vec<Video>,
    pub store:            FeatureStore,
    pub embedded:         Option<FeatureMatrix>,
    pub labeling:         PseudoLabeling,
    pub label_order:      Vec<usize>,
    pub rounds_completed: usize,
    pub state:            CorpusState,
    pub log:              AccuracyLog,
}

/// Result of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationOutcome {
    pub log:           AccuracyLog,
    /// (video name, one label per frame), in load order
    pub segmentations: Vec<(String, Vec<usize>)>,
}

// ─── Corpus ───────────────────────────────────────────────────────────────────
pub struct Corpus<T: ModelTrainer> {
    config:      CorpusConfig,
    trainer:     T,
    decoder:     SegmentationDecoder,
    videos:      Vec<Video>,
    store:       FeatureStore,
    embedded:    Option<FeatureMatrix>,
    labeling:    Option<PseudoLabeling>,
    label_order: Vec<usize>,
    classifier:  Option<T::Scorer>,
    state:       CorpusState,
    rounds_done: usize,
    log:         AccuracyLog,
}

impl<T: ModelTrainer> Corpus<T> {
    /// Check the loaded corpus and take ownership of it.
    pub fn new(config: CorpusConfig, trainer: T, loaded: LoadedCorpus) -> Result<Self, CorpusError> {
        validate_corpus(&config, &loaded.videos, &loaded.store)?;
        tracing::info!(
            "Corpus: {} videos, {} frames, K = {}",
            loaded.videos.len(), loaded.store.len(), config.num_subactions
        );
        Ok(Self {
            decoder:     SegmentationDecoder::new(&config.decoder),
            config,
            trainer,
            videos:      loaded.videos,
            store:       loaded.store,
            embedded:    None,
            labeling:    None,
            label_order: Vec::new(),
            classifier:  None,
            state:       CorpusState::Initialized,
            rounds_done: 0,
            log:         AccuracyLog::new(),
        })
    }

    /// Continue a run from a snapshot and its saved classifier.
    pub fn resume(snapshot: CorpusSnapshot, classifier: T::Scorer, trainer: T) -> Result<Self, CorpusError> {
        if !matches!(snapshot.state, CorpusState::ClassifierTrained | CorpusState::Refining) {
            return Err(CorpusError::InvalidTransition { operation: "resume", state: snapshot.state });
        }
        validate_corpus(&snapshot.config, &snapshot.videos, &snapshot.store)?;

        let k = snapshot.config.num_subactions;
        if snapshot.labeling.len() != snapshot.store.len() {
            return Err(CorpusError::Snapshot(format!(
                "{} pseudo-labels for {} frames",
                snapshot.labeling.len(), snapshot.store.len()
            )));
        }
        if let Some(embedded) = &snapshot.embedded {
            if embedded.rows() != snapshot.store.len() {
                return Err(CorpusError::Snapshot(format!(
                    "{} embedded rows for {} frames",
                    embedded.rows(), snapshot.store.len()
                )));
            }
        }
        if classifier.num_classes() != k {
            return Err(CorpusError::Snapshot(format!(
                "classifier has {} classes, corpus expects {}",
                classifier.num_classes(), k
            )));
        }
        for video in &snapshot.videos {
            if video.predicted_segmentation().len() != video.len() {
                return Err(CorpusError::Snapshot(format!("video '{}' has no segmentation", video.name())));
            }
        }

        tracing::info!(
            "Resuming corpus after {} rounds ({} videos, {} frames)",
            snapshot.rounds_completed, snapshot.videos.len(), snapshot.store.len()
        );
        Ok(Self {
            decoder:     SegmentationDecoder::new(&snapshot.config.decoder),
            config:      snapshot.config,
            trainer,
            videos:      snapshot.videos,
            store:       snapshot.store,
            embedded:    snapshot.embedded,
            labeling:    Some(snapshot.labeling),
            label_order: snapshot.label_order,
            classifier:  Some(classifier),
            state:       CorpusState::Refining,
            rounds_done: snapshot.rounds_completed,
            log:         snapshot.log,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────────
    pub fn classifier(&self) -> Option<&T::Scorer> {
        self.classifier.as_ref()
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    pub fn rounds_completed(&self) -> usize {
        self.rounds_done
    }

    pub fn log(&self) -> &AccuracyLog {
        &self.log
    }

    /// Frames as the clusterer and classifier see them.
    pub fn features(&self) -> &FeatureMatrix {
        self.embedded.as_ref().unwrap_or_else(|| self.store.matrix())
    }

    // ── Pipeline steps ────────────────────────────────────────────────────────
    /// Map every frame through `embedder`.
    pub fn embed(&mut self, embedder: &dyn Embedder) -> Result<(), CorpusError> {
        self.expect_state("embed", &[CorpusState::Initialized])?;

        if embedder.is_identity() {
            tracing::info!("Using raw features (no embedding)");
            self.state = CorpusState::NoEmbedding;
            return Ok(());
        }

        let embedded = embedder
            .embed(self.store.matrix())
            .map_err(CorpusError::Embedding)?;
        if embedded.rows() != self.store.len() {
            return Err(CorpusError::Embedding(anyhow!(
                "{} embedded rows for {} frames",
                embedded.rows(), self.store.len()
            )));
        }
        tracing::info!("Embedded {} frames with '{}' ({} dims)", embedded.rows(), embedder.name(), embedded.cols());
        self.embedded = Some(embedded);
        self.state    = CorpusState::EmbeddingTrained;
        Ok(())
    }

    /// Initial pseudo-labels from k-means over the whole corpus.
    pub fn cluster(&mut self, kmeans: &KMeans) -> Result<(), CorpusError> {
        self.expect_state("cluster", &[CorpusState::EmbeddingTrained, CorpusState::NoEmbedding])?;

        let k          = self.config.num_subactions;
        let clustering = kmeans.fit(self.features(), k)?;
        tracing::info!(
            "Clustered {} frames into {} groups (inertia={:.4}, {} iterations)",
            clustering.assignment.len(), k, clustering.inertia, clustering.iterations
        );

        for video in &mut self.videos {
            let labels = clustering.assignment[video.global_range()].to_vec();
            video
                .set_segmentation(labels)
                .map_err(|source| CorpusError::Shape { video: video.name().to_string(), source })?;
        }

        self.labeling    = Some(PseudoLabeling::new(clustering.assignment));
        self.label_order = canonical_order(
            &self.videos,
            k,
            self.config.decoder.background_label,
            Video::predicted_segmentation,
        );
        tracing::info!("Label order: {:?}", self.label_order);
        self.state = CorpusState::Clustered;
        Ok(())
    }

    /// First classifier, trained on the clustering labels.
    pub fn train_classifier(&mut self) -> Result<(), CorpusError> {
        self.expect_state("train the classifier", &[CorpusState::Clustered])?;
        let labeling = self
            .labeling
            .as_ref()
            .ok_or(CorpusError::InvalidTransition { operation: "train the classifier", state: self.state })?;
        let classifier  = self.fit_classifier(&self.videos, labeling, &HashSet::new())?;
        self.classifier = Some(classifier);
        self.state      = CorpusState::ClassifierTrained;
        Ok(())
    }

    /// Append an accuracy entry for the current segmentations.
    pub fn evaluate(&mut self, tag: RoundTag) -> Result<&RoundStats, CorpusError> {
        if matches!(
            self.state,
            CorpusState::Initialized | CorpusState::EmbeddingTrained | CorpusState::NoEmbedding
        ) {
            return Err(CorpusError::InvalidTransition { operation: "evaluate", state: self.state });
        }
        Ok(self.record(tag, self.videos.len(), Vec::new()))
    }

    /// One decode → relabel → retrain → evaluate round.
    ///
    /// Returns whether the pseudo-labeling changed.
    pub fn refine_round(&mut self) -> Result<bool, CorpusError> {
        self.expect_state("refine", &[CorpusState::ClassifierTrained, CorpusState::Refining])?;
        let round = self.rounds_done + 1;
        let k     = self.config.num_subactions;

        // ── 1. Score every frame once ─────────────────────────────────────────
        let classifier = self
            .classifier
            .as_ref()
            .ok_or(CorpusError::InvalidTransition { operation: "refine", state: self.state })?;
        let scores = classifier.score(self.features()).map_err(CorpusError::Scoring)?;
        if scores.rows() != self.store.len() || scores.cols() != k {
            return Err(CorpusError::Scoring(anyhow!(
                "scores are {}×{}, expected {}×{}",
                scores.rows(), scores.cols(), self.store.len(), k
            )));
        }

        // ── 2. Decode videos in parallel ──────────────────────────────────────
        let prior = DecodePrior {
            order:          self.label_order.clone(),
            mean_durations: self
                .config
                .decoder
                .duration_prior
                .then(|| mean_durations(&self.videos, k)),
            background:     self.config.decoder.background_label,
        };
        let decoder = &self.decoder;
        let results: Vec<Result<Vec<usize>, DecodeError>> = self
            .videos
            .par_iter()
            .map(|video| decoder.decode(&scores.slice_rows(video.global_range()), &prior))
            .collect();

        // Nothing below touches `self` until retraining has succeeded,
        // so a failed round leaves the previous round's state intact.
        let mut videos  = self.videos.clone();
        let mut decoded = 0usize;
        let mut skipped = Vec::new();
        for (video, result) in videos.iter_mut().zip(results) {
            match result {
                Ok(labels) => {
                    video
                        .set_segmentation(labels)
                        .map_err(|source| CorpusError::Shape { video: video.name().to_string(), source })?;
                    decoded += 1;
                }
                Err(e) => {
                    tracing::warn!("Round {}: skipping '{}': {}", round, video.name(), e);
                    skipped.push(video.name().to_string());
                }
            }
        }

        // ── 3. Rebuild the pseudo-labeling ────────────────────────────────────
        let labeling = PseudoLabeling::from_videos(&videos, self.store.len())
            .map_err(CorpusError::Labeling)?;
        let changed = self.labeling.as_ref() != Some(&labeling);

        // ── 4. Retrain on decoded videos ──────────────────────────────────────
        let classifier = if decoded == 0 {
            tracing::warn!("Round {}: no video could be decoded, keeping the previous classifier", round);
            None
        } else {
            let excluded: HashSet<String> = skipped.iter().cloned().collect();
            Some(self.fit_classifier(&videos, &labeling, &excluded)?)
        };

        // ── 5. Commit and record ──────────────────────────────────────────────
        self.videos   = videos;
        self.labeling = Some(labeling);
        if classifier.is_some() {
            self.classifier = classifier;
        }
        self.state       = CorpusState::Refining;
        self.rounds_done = round;
        self.record(RoundTag::Round(round), decoded, skipped);
        Ok(changed)
    }

    /// Run up to `rounds` refinement rounds. Returns how many ran.
    pub fn refine(&mut self, rounds: usize) -> Result<usize, CorpusError> {
        self.expect_state("refine", &[CorpusState::ClassifierTrained, CorpusState::Refining])?;
        for done in 0..rounds {
            let changed = self.refine_round()?;
            if self.config.early_stop && !changed {
                tracing::info!("Pseudo-labeling unchanged after round {}, stopping early", self.rounds_done);
                return Ok(done + 1);
            }
        }
        Ok(rounds)
    }

    /// Record the final accuracy and hand back the segmentations.
    pub fn finalize(&mut self) -> Result<SegmentationOutcome, CorpusError> {
        self.expect_state("finalize", &[CorpusState::ClassifierTrained, CorpusState::Refining])?;
        self.record(RoundTag::Final, self.videos.len(), Vec::new());
        self.state = CorpusState::Finalized;

        Ok(SegmentationOutcome {
            log:           self.log.clone(),
            segmentations: self
                .videos
                .iter()
                .map(|v| (v.name().to_string(), v.predicted_segmentation().to_vec()))
                .collect(),
        })
    }

    /// Serialisable copy of the refinement state.
    pub fn snapshot(&self) -> Result<CorpusSnapshot, CorpusError> {
        self.expect_state("snapshot", &[CorpusState::ClassifierTrained, CorpusState::Refining])?;
        let labeling = self
            .labeling
            .clone()
            .ok_or(CorpusError::InvalidTransition { operation: "snapshot", state: self.state })?;

        Ok(CorpusSnapshot {
            config:           self.config.clone(),
            videos:           self.videos.clone(),
            store:            self.store.clone(),
            embedded:         self.embedded.clone(),
            labeling,
            label_order:      self.label_order.clone(),
            rounds_completed: self.rounds_done,
            state:            self.state,
            log:              self.log.clone(),
        })
    }

    // ── Helpers ───────────────────────────────────────────────────────────────
    fn expect_state(&self, operation: &'static str, allowed: &[CorpusState]) -> Result<(), CorpusError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CorpusError::InvalidTransition { operation, state: self.state })
        }
    }

    /// Train on `labeling` for every video not in `excluded`.
    fn fit_classifier(
        &self,
        videos:   &[Video],
        labeling: &PseudoLabeling,
        excluded: &HashSet<String>,
    ) -> Result<T::Scorer, CorpusError> {
        let set = assemble_dataset(videos, self.features(), |video, _, global| {
            (!excluded.contains(video.name())).then(|| labeling.get(global))
        });
        let k = self.config.num_subactions;

        match self.trainer.train(&set.features, &set.targets, k, 0) {
            Ok(scorer) => Ok(scorer),
            Err(e) if e.is_divergence() => {
                tracing::warn!("Classifier training diverged ({}), retrying with fresh weights", e);
                self.trainer
                    .train(&set.features, &set.targets, k, 1)
                    .map_err(CorpusError::Training)
            }
            Err(e) => Err(CorpusError::Training(e)),
        }
    }

    fn record(&mut self, tag: RoundTag, decoded_videos: usize, skipped_videos: Vec<String>) -> &RoundStats {
        let evaluation = evaluate(&self.videos);
        match &evaluation {
            Some(e) => {
                tracing::info!(
                    "[{}] MoF={:.4} IoU={:.4} over {} frames | decoded={} skipped={}",
                    tag, e.mof, e.mean_iou, e.frames, decoded_videos, skipped_videos.len()
                );
                tracing::debug!("[{}] cluster -> class matching: {:?}", tag, e.matching);
            }
            None => tracing::info!(
                "[{}] no ground truth | decoded={} skipped={}",
                tag, decoded_videos, skipped_videos.len()
            ),
        }
        self.log.push(RoundStats { tag, evaluation, decoded_videos, skipped_videos });
        // just pushed, so never empty
        &self.log.entries()[self.log.len() - 1]
    }
}

// Observation points for tests.
#[cfg(test)]
impl<T: ModelTrainer> Corpus<T> {
    pub fn state(&self) -> CorpusState {
        self.state
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn labeling(&self) -> Option<&PseudoLabeling> {
        self.labeling.as_ref()
    }
}

/// Ranges must tile the store in order; ground truth must match lengths.
fn validate_corpus(config: &CorpusConfig, videos: &[Video], store: &FeatureStore) -> Result<(), CorpusError> {
    let mut expected = 0usize;
    for video in videos {
        let range = video.global_range();
        if range.start != expected || range.end < range.start {
            return Err(CorpusError::RangeMismatch {
                video: video.name().to_string(),
                start: range.start,
                end:   range.end,
                expected,
            });
        }
        if let Some(gt) = video.ground_truth() {
            if gt.len() != video.len() {
                return Err(CorpusError::GroundTruthLength {
                    video:    video.name().to_string(),
                    expected: video.len(),
                    actual:   gt.len(),
                });
            }
        }
        expected = range.end;
    }
    if expected != store.len() {
        return Err(CorpusError::StoreCoverage { covered: expected, stored: store.len() });
    }
    if let Some(label) = config.decoder.background_label {
        if label >= config.num_subactions {
            return Err(CorpusError::BackgroundLabel { label, classes: config.num_subactions });
        }
    }
    Ok(())
}
