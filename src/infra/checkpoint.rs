// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything needed to resume refinement.
//
// What gets saved per activity:
//   1. pipeline_config.json — the PipelineConfig of the run
//   2. corpus_state.json    — CorpusSnapshot: videos, features,
//                             embedding, pseudo-labels, label
//                             order, round counter, accuracy log
//   3. classifier/          — the current classifier, written
//                             by the ModelTrainer that trained it
//   4. embedding/           — the trained temporal embedding, if
//                             any; later runs may load it
//   5. segmentation/        — final labels, one file per video
//
// Why save the config separately?
//   `resume` rebuilds the trainer (seed, learning rate, epochs)
//   and the output layout from it; the snapshot alone only
//   describes the corpus.
//
// File layout:
//   <output>/<activity>/
//     pipeline_config.json
//     corpus_state.json
//     classifier/
//       classifier.mpk.gz
//       classifier.json
//     embedding/
//       embedding.mpk.gz
//       embedding.json
//     segmentation/
//       <video>.txt
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::{corpus::CorpusSnapshot, segment_use_case::PipelineConfig};
use crate::domain::traits::{Embedder, ModelTrainer};

const CONFIG_FILE:      &str = "pipeline_config.json";
const SNAPSHOT_FILE:    &str = "corpus_state.json";
const CLASSIFIER_DIR:   &str = "classifier";
const EMBEDDING_DIR:    &str = "embedding";
const SEGMENTATION_DIR: &str = "segmentation";

/// Manages one checkpoint directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            anyhow::bail!("Checkpoint directory '{}' does not exist", dir.display());
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn classifier_dir(&self) -> PathBuf {
        self.dir.join(CLASSIFIER_DIR)
    }

    pub fn embedding_dir(&self) -> PathBuf {
        self.dir.join(EMBEDDING_DIR)
    }

    pub fn save_embedder(&self, embedder: &dyn Embedder) -> Result<()> {
        embedder.save(&self.embedding_dir())
    }

    pub fn save_config(&self, cfg: &PipelineConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<PipelineConfig> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_snapshot(&self, snapshot: &CorpusSnapshot) -> Result<()> {
        self.write_json(SNAPSHOT_FILE, snapshot)?;
        tracing::debug!(
            "Saved corpus state after round {} to '{}'",
            snapshot.rounds_completed, self.dir.display()
        );
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<CorpusSnapshot> {
        self.read_json(SNAPSHOT_FILE)
    }

    /// Persist a classifier through the trainer that produced it.
    pub fn save_classifier<T: ModelTrainer>(&self, trainer: &T, scorer: &T::Scorer) -> Result<()> {
        trainer.save_scorer(scorer, &self.classifier_dir())
    }

    pub fn load_classifier<T: ModelTrainer>(&self, trainer: &T) -> Result<T::Scorer> {
        trainer.load_scorer(&self.classifier_dir()).with_context(|| {
            format!(
                "Cannot load classifier from '{}'. Has 'segment' been run for this activity?",
                self.classifier_dir().display()
            )
        })
    }

    /// One `<video>.txt` per video under `segmentation/`, one label per line.
    pub fn save_segmentations(&self, segmentations: &[(String, Vec<usize>)]) -> Result<()> {
        let dir = self.dir.join(SEGMENTATION_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        for (name, labels) in segmentations {
            let text: String = labels.iter().map(|l| format!("{l}\n")).collect();
            let path = dir.join(format!("{name}.txt"));
            fs::write(&path, text)
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
        }
        tracing::debug!("Wrote {} segmentations to '{}'", segmentations.len(), dir.display());
        Ok(())
    }

    fn write_json<V: Serialize>(&self, file: &str, value: &V) -> Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    fn read_json<V: DeserializeOwned>(&self, file: &str) -> Result<V> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        accuracy_log::AccuracyLog,
        corpus::{CorpusConfig, CorpusState},
    };
    use crate::domain::{
        feature_store::{FeatureMatrix, FeatureStore},
        labeling::PseudoLabeling,
        traits::Scorer,
        video::Video,
    };
    use crate::testing::NearestCentroidTrainer;

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("coffee")).unwrap();
        let cfg  = PipelineConfig { rounds: 7, activity: "coffee".into(), ..Default::default() };

        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap(), cfg);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();

        let mut video = Video::new("v", 0..2, Some(vec![0, 1]));
        video.set_segmentation(vec![1, 0]).unwrap();
        let snapshot = CorpusSnapshot {
            config:           CorpusConfig::new(2),
            videos:           vec![video],
            store:            FeatureStore::from(FeatureMatrix::from_rows(&[vec![0.1], vec![0.7]]).unwrap()),
            embedded:         None,
            labeling:         PseudoLabeling::new(vec![1, 0]),
            label_order:      vec![1, 0],
            rounds_completed: 3,
            state:            CorpusState::Refining,
            log:              AccuracyLog::new(),
        };

        ckpt.save_snapshot(&snapshot).unwrap();
        assert_eq!(ckpt.load_snapshot().unwrap(), snapshot);
    }

    #[test]
    fn test_classifier_round_trip() {
        let dir     = tempfile::tempdir().unwrap();
        let ckpt    = CheckpointManager::new(dir.path()).unwrap();
        let trainer = NearestCentroidTrainer::default();
        let feats   = FeatureMatrix::from_rows(&[vec![0.0], vec![4.0]]).unwrap();
        let scorer  = trainer.train(&feats, &[0, 1], 2, 0).unwrap();

        ckpt.save_classifier(&trainer, &scorer).unwrap();
        let loaded = ckpt.load_classifier(&trainer).unwrap();
        assert_eq!(loaded, scorer);
        assert_eq!(loaded.num_classes(), 2);
    }

    #[test]
    fn test_segmentations_written_per_video() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        ckpt.save_segmentations(&[("a".into(), vec![0, 0, 1]), ("b".into(), vec![1])]).unwrap();

        let a = fs::read_to_string(dir.path().join("segmentation/a.txt")).unwrap();
        assert_eq!(a, "0\n0\n1\n");
        assert!(dir.path().join("segmentation/b.txt").is_file());
    }

    #[test]
    fn test_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointManager::open(dir.path().join("nope")).is_err());
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.load_snapshot().is_err());
    }
}
