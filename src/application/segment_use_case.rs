// ============================================================
// Layer 2 — SegmentUseCase
// ============================================================
// Orchestrates the full pipeline for every selected activity:
//
//   Step 1: Load features + ground truth   (Layer 4 - data)
//   Step 2: Resolve K                       (config or ground truth)
//   Step 3: Train, load or skip the embedding (Layer 5 - ml)
//   Step 4: Cluster → initial pseudo-labels (Layer 5 - segmentation)
//   Step 5: Train the first classifier      (Layer 5 - ml)
//   Step 6: Refine for N rounds             (Layer 2 - corpus)
//   Step 7: Checkpoint the refinement state (Layer 6 - infra)
//   Step 8: Finalize, write metrics + labels (Layer 6 - infra)
//
// Activities are independent corpora and run one after another.
// The summary weights each activity's final MoF by its frames.
//
// Reference: Rust Book §13 (Iterators and Closures)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use crate::application::{
    accuracy_log::{RoundStats, RoundTag},
    corpus::{Corpus, CorpusConfig},
};
use crate::data::loader::TxtFeatureLoader;
use crate::domain::traits::{FeatureSource, LoadedCorpus, ModelTrainer};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    embedder::{build_embedder, EmbeddingKind},
    trainer::{BurnClassifierTrainer, ClassifierConfig},
};
use crate::segmentation::{
    clustering::{ClusterConfig, KMeans},
    decoder::DecoderConfig,
};

/// Breakfast Actions activity classes.
pub const BREAKFAST_ACTIVITIES: [&str; 10] = [
    "coffee", "cereals", "tea", "milk", "juice",
    "sandwich", "scrambledegg", "friedegg", "salat", "pancake",
];

// ─── Pipeline Configuration ───────────────────────────────────────────────────
// Every setting of a run. Serialisable so it can be read from
// --config, saved next to each checkpoint and reloaded by `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_root:       String,
    pub output_dir:         String,
    /// Activity selector for a single run ("all" = every video)
    pub activity:           String,
    /// Run every entry of `activities` as its own corpus
    pub all_activities:     bool,
    pub activities:         Vec<String>,
    pub rounds:             usize,
    /// Drives the embedding, clustering and classifier RNGs
    pub seed:               u64,
    /// K; None means "number of ground-truth classes"
    pub num_subactions:     Option<usize>,
    pub normalize_features: bool,
    pub early_stop:         bool,
    pub embedding:          EmbeddingKind,
    /// Output directory of an earlier run whose trained embedding
    /// (<dir>/<activity>/embedding) is reused instead of retrained
    pub load_embedding:     Option<String>,
    pub cluster:            ClusterConfig,
    pub classifier:         ClassifierConfig,
    pub decoder:            DecoderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_root:       "data/breakfast".to_string(),
            output_dir:         "output".to_string(),
            activity:           "coffee".to_string(),
            all_activities:     false,
            activities:         BREAKFAST_ACTIVITIES.iter().map(|s| s.to_string()).collect(),
            rounds:             30,
            seed:               42,
            num_subactions:     None,
            normalize_features: false,
            early_stop:         false,
            embedding:          EmbeddingKind::default(),
            load_embedding:     None,
            cluster:            ClusterConfig::default(),
            classifier:         ClassifierConfig::default(),
            decoder:            DecoderConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn selected_activities(&self) -> Vec<String> {
        if self.all_activities {
            self.activities.clone()
        } else {
            vec![self.activity.clone()]
        }
    }

    /// Checkpoint directory of one activity.
    pub fn activity_dir(&self, activity: &str) -> PathBuf {
        Path::new(&self.output_dir).join(activity)
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityResult {
    pub activity:  String,
    pub final_mof: Option<f64>,
    /// Frames with ground truth
    pub frames:    usize,
    pub rounds:    usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub results:      Vec<ActivityResult>,
    /// Frame-weighted mean of the activities' final MoF
    pub weighted_mof: Option<f64>,
}

impl RunSummary {
    pub fn from_results(results: Vec<ActivityResult>) -> Self {
        let (sum, frames) = results
            .iter()
            .filter_map(|r| r.final_mof.map(|m| (m * r.frames as f64, r.frames)))
            .fold((0.0, 0usize), |(s, f), (m, n)| (s + m, f + n));
        let weighted_mof = (frames > 0).then(|| sum / frames as f64);
        Self { results, weighted_mof }
    }
}

// ─── SegmentUseCase ───────────────────────────────────────────────────────────
pub struct SegmentUseCase {
    config: PipelineConfig,
}

impl SegmentUseCase {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline for every selected activity.
    pub fn execute(&self) -> Result<RunSummary> {
        let activities = self.config.selected_activities();
        let metrics    = MetricsLogger::new(&self.config.output_dir)?;

        let mut results = Vec::with_capacity(activities.len());
        for activity in &activities {
            tracing::info!("══ Activity '{}' ══", activity);
            let result = self
                .run_activity(activity, &metrics)
                .with_context(|| format!("Activity '{activity}' failed"))?;
            results.push(result);
        }

        let summary = RunSummary::from_results(results);
        if let Some(mof) = summary.weighted_mof {
            tracing::info!("Frame-weighted MoF over {} activities: {:.4}", activities.len(), mof);
        }
        tracing::info!("Accuracy log written to '{}'", metrics.csv_path().display());
        Ok(summary)
    }

    fn run_activity(&self, activity: &str, metrics: &MetricsLogger) -> Result<ActivityResult> {
        let cfg = &self.config;

        // ── Step 1: Load features ─────────────────────────────────────────────
        let loader = TxtFeatureLoader::new(&cfg.dataset_root)
            .with_normalization(cfg.normalize_features);
        let loaded = loader.load(activity)?;

        // ── Step 2: Resolve K ─────────────────────────────────────────────────
        let k = match cfg.num_subactions {
            Some(k) => k,
            None => ground_truth_classes(&loaded).context(
                "No ground truth to infer the number of sub-activities from; pass --num-subactions",
            )?,
        };

        let ckpt = CheckpointManager::new(cfg.activity_dir(activity))?;
        ckpt.save_config(cfg)?;

        // ── Step 3: Embedding ─────────────────────────────────────────────────
        let pretrained = match &cfg.load_embedding {
            Some(root) => Some(CheckpointManager::open(Path::new(root).join(activity))?.embedding_dir()),
            None       => None,
        };
        let embedder = build_embedder(&cfg.embedding, &loaded.videos, &loaded.store, cfg.seed, pretrained.as_deref())?;
        ckpt.save_embedder(embedder.as_ref())?;

        let corpus_cfg = CorpusConfig {
            num_subactions: k,
            decoder:        cfg.decoder.clone(),
            early_stop:     cfg.early_stop,
        };
        let trainer    = BurnClassifierTrainer::new(cfg.classifier.clone(), cfg.seed);
        let mut corpus = Corpus::new(corpus_cfg, trainer, loaded)?;
        corpus.embed(embedder.as_ref())?;

        // ── Step 4-5: Initial pseudo-labels and classifier ────────────────────
        let kmeans = KMeans::new(ClusterConfig { seed: cfg.seed, ..cfg.cluster.clone() });
        corpus.cluster(&kmeans)?;
        corpus.train_classifier()?;
        corpus.evaluate(RoundTag::Initial)?;

        // ── Step 6-8: Refine, checkpoint, finalize ────────────────────────────
        refine_and_finish(&mut corpus, cfg.rounds, &ckpt, metrics, activity, 0)
    }
}

/// Shared tail of `segment` and `resume`.
///
/// Runs `rounds` rounds, checkpoints the state, finalizes, and
/// writes every log entry past `logged` to the metrics CSV. If a
/// round fails, the entries recorded so far are still written.
pub(crate) fn refine_and_finish<T: ModelTrainer>(
    corpus:   &mut Corpus<T>,
    rounds:   usize,
    ckpt:     &CheckpointManager,
    metrics:  &MetricsLogger,
    activity: &str,
    logged:   usize,
) -> Result<ActivityResult> {
    if let Err(e) = corpus.refine(rounds) {
        metrics.log_entries(activity, corpus.log(), logged)?;
        return Err(e).context("Refinement aborted");
    }

    ckpt.save_snapshot(&corpus.snapshot()?)?;
    if let Some(classifier) = corpus.classifier() {
        ckpt.save_classifier(corpus.trainer(), classifier)?;
    }

    let outcome = corpus.finalize()?;
    metrics.log_entries(activity, &outcome.log, logged)?;
    ckpt.save_segmentations(&outcome.segmentations)?;

    tracing::info!("Checkpoint for '{}' saved to '{}'", activity, ckpt.dir().display());

    let last = outcome.log.last();
    Ok(ActivityResult {
        activity:  activity.to_string(),
        final_mof: last.and_then(RoundStats::mof),
        frames:    last.and_then(|s| s.evaluation.as_ref()).map_or(0, |e| e.frames),
        rounds:    corpus.rounds_completed(),
    })
}

/// Number of distinct ground-truth classes, if any video has ground truth.
fn ground_truth_classes(loaded: &LoadedCorpus) -> Option<usize> {
    let classes: BTreeSet<usize> = loaded
        .videos
        .iter()
        .filter_map(|v| v.ground_truth())
        .flatten()
        .copied()
        .collect();
    (!classes.is_empty()).then_some(classes.len())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ml::embedder::MlpEmbeddingConfig;
    use crate::testing::write_two_step_dataset;
    use std::fs;

    pub(crate) fn config(root: &Path, out: &Path) -> PipelineConfig {
        PipelineConfig {
            dataset_root: root.display().to_string(),
            output_dir:   out.display().to_string(),
            activities:   vec!["coffee".into(), "tea".into()],
            rounds:       2,
            embedding:    EmbeddingKind::Identity,
            classifier:   ClassifierConfig { epochs: 5, batch_size: 8, lr: 0.05, init_std: 0.1, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn test_summary_weights_by_frames() {
        let summary = RunSummary::from_results(vec![
            ActivityResult { activity: "a".into(), final_mof: Some(1.0), frames: 30, rounds: 1 },
            ActivityResult { activity: "b".into(), final_mof: Some(0.5), frames: 10, rounds: 1 },
            ActivityResult { activity: "c".into(), final_mof: None,      frames: 0,  rounds: 1 },
        ]);
        assert_eq!(summary.weighted_mof, Some(0.875));
    }

    #[test]
    fn test_selected_activities() {
        let mut cfg = PipelineConfig::default();
        assert_eq!(cfg.selected_activities(), vec!["coffee".to_string()]);
        cfg.all_activities = true;
        assert_eq!(cfg.selected_activities().len(), BREAKFAST_ACTIVITIES.len());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"rounds": 3, "decoder": {"duration_prior": true}}"#).unwrap();
        assert_eq!(cfg.rounds, 3);
        assert!(cfg.decoder.duration_prior);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn test_end_to_end_two_activities() {
        let data = tempfile::tempdir().unwrap();
        let out  = tempfile::tempdir().unwrap();
        write_two_step_dataset(data.path(), &["coffee", "tea"]);

        let mut cfg = config(data.path(), out.path());
        cfg.all_activities = true;
        let summary = SegmentUseCase::new(cfg).execute().unwrap();

        assert_eq!(summary.results.len(), 2);
        assert!(summary.results.iter().all(|r| r.frames == 30 && r.rounds == 2));
        assert!(summary.weighted_mof.is_some());

        for activity in ["coffee", "tea"] {
            let dir = out.path().join(activity);
            assert!(dir.join("corpus_state.json").is_file());
            assert!(dir.join("pipeline_config.json").is_file());
            assert!(dir.join(format!("segmentation/P01_{activity}.txt")).is_file());
        }
        // header + (initial, 2 rounds, final) per activity
        let csv = fs::read_to_string(out.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 2 * 4);
    }

    #[test]
    fn test_embedding_reused_from_earlier_run() {
        let data   = tempfile::tempdir().unwrap();
        let first  = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        write_two_step_dataset(data.path(), &["coffee"]);

        let mut cfg = config(data.path(), first.path());
        cfg.rounds    = 1;
        cfg.embedding = EmbeddingKind::Mlp(MlpEmbeddingConfig { embed_dim: 3, epochs: 2, batch_size: 8, ..Default::default() });
        SegmentUseCase::new(cfg.clone()).execute().unwrap();
        assert!(first.path().join("coffee/embedding/embedding.json").is_file());

        // a different seed would train a different embedding
        cfg.output_dir     = second.path().display().to_string();
        cfg.seed           = 7;
        cfg.load_embedding = Some(first.path().display().to_string());
        SegmentUseCase::new(cfg).execute().unwrap();

        let embedded = |out: &Path| {
            CheckpointManager::open(out.join("coffee")).unwrap().load_snapshot().unwrap().embedded
        };
        assert!(embedded(first.path()).is_some());
        assert_eq!(embedded(first.path()), embedded(second.path()));
    }

    #[test]
    fn test_k_required_without_ground_truth() {
        let data = tempfile::tempdir().unwrap();
        let out  = tempfile::tempdir().unwrap();
        write_two_step_dataset(data.path(), &["coffee", "tea"]);
        fs::remove_dir_all(data.path().join("groundTruth")).unwrap();

        let err = SegmentUseCase::new(config(data.path(), out.path())).execute().unwrap_err();
        assert!(format!("{err:#}").contains("--num-subactions"));
    }
}
