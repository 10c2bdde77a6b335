// ============================================================
// Layer 2 — ResumeUseCase
// ============================================================
// Continues refinement from a checkpoint written by `segment`
// (or by an earlier `resume`):
//
//   Step 1: Load pipeline_config.json     (Layer 6 - infra)
//   Step 2: Load corpus_state.json        (Layer 6 - infra)
//   Step 3: Rebuild the trainer, load the classifier
//   Step 4: Corpus::resume → Refining     (Layer 2 - corpus)
//   Step 5: Refine N more rounds, checkpoint, finalize
//
// Embedding and clustering are not repeated; rounds continue
// numbering from the snapshot and new accuracy rows are
// appended to the same metrics.csv.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::application::{
    corpus::Corpus,
    segment_use_case::{refine_and_finish, ActivityResult},
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::trainer::BurnClassifierTrainer;

pub struct ResumeUseCase {
    checkpoint_dir: PathBuf,
    rounds:         usize,
}

impl ResumeUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, rounds: usize) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), rounds }
    }

    pub fn execute(&self) -> Result<ActivityResult> {
        // ── Step 1-2: Configuration and corpus state ──────────────────────────
        let ckpt     = CheckpointManager::open(&self.checkpoint_dir)?;
        let cfg      = ckpt.load_config()?;
        let snapshot = ckpt.load_snapshot()?;
        let activity = self
            .checkpoint_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(cfg.activity.as_str())
            .to_string();

        // ── Step 3: Trainer and classifier ────────────────────────────────────
        let trainer    = BurnClassifierTrainer::new(cfg.classifier.clone(), cfg.seed);
        let classifier = ckpt.load_classifier(&trainer)?;

        // ── Step 4: Re-enter the refinement loop ──────────────────────────────
        let logged     = snapshot.log.len();
        let mut corpus = Corpus::resume(snapshot, classifier, trainer)
            .context("Checkpoint cannot be resumed")?;
        tracing::info!(
            "Resuming '{}' at round {} for {} more rounds",
            activity, corpus.rounds_completed() + 1, self.rounds
        );

        // ── Step 5: Refine, checkpoint, finalize ──────────────────────────────
        // metrics.csv lives next to the activity directories
        let output  = self.checkpoint_dir.parent().unwrap_or_else(|| Path::new("."));
        let metrics = MetricsLogger::new(output)?;
        refine_and_finish(&mut corpus, self.rounds, &ckpt, &metrics, &activity, logged)
    }
}
