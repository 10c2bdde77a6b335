// ============================================================
// Layer 2 — Accuracy Log
// ============================================================
// Every evaluation of the corpus produces one RoundStats value
// that is appended to the AccuracyLog. Entries are never edited
// or removed, so the log is the full history of a run:
//
//   initial   → right after clustering
//   round 1.. → after each decode / relabel / retrain round
//   final     → after finalize()
//
// The log is part of the resumable snapshot, so a resumed run
// continues the same history.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::segmentation::accuracy::Evaluation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundTag {
    Initial,
    Round(usize),
    Final,
}

impl fmt::Display for RoundTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundTag::Initial  => write!(f, "initial"),
            RoundTag::Round(i) => write!(f, "round_{i}"),
            RoundTag::Final    => write!(f, "final"),
        }
    }
}

/// Accuracy and bookkeeping for one evaluation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    pub tag: RoundTag,

    /// None when no video carries ground truth
    pub evaluation: Option<Evaluation>,

    /// Videos whose segmentation was (re)computed at this point
    pub decoded_videos: usize,

    /// Videos the decoder could not segment this round
    pub skipped_videos: Vec<String>,
}

impl RoundStats {
    pub fn mof(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|e| e.mof)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyLog {
    entries: Vec<RoundStats>,
}

impl AccuracyLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stats: RoundStats) {
        self.entries.push(stats);
    }

    pub fn entries(&self) -> &[RoundStats] {
        &self.entries
    }

    pub fn last(&self) -> Option<&RoundStats> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
