// ============================================================
// Test Support — Deterministic Trainer Stub
// ============================================================
// A ModelTrainer that needs no tensors: it memorises the mean
// feature vector of every class and scores frames with a
// softmax over negative squared distances to those means.
// Training is a pure function of (features, labels), so the
// refinement loop becomes exactly reproducible in tests.
//
// It also records what it was asked to do (attempt numbers and
// training-set sizes) and can be told to diverge on purpose.
//
// write_two_step_dataset lays out a tiny on-disk dataset for the
// use-case tests.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{cell::{Cell, RefCell}, fs, path::Path};

use crate::domain::{
    feature_store::FeatureMatrix,
    traits::{ModelTrainer, Scorer, TrainError},
};

/// When the stub pretends training blew up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivergencePlan {
    #[default]
    Never,
    /// Only the very first train call diverges
    FirstAttemptOnly,
    /// Every call from this (0-based) call index on diverges
    FromCall(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroidScorer {
    /// One mean per class; None for classes without frames
    centroids: Vec<Option<Vec<f64>>>,
}

impl Scorer for NearestCentroidScorer {
    fn num_classes(&self) -> usize {
        self.centroids.len()
    }

    fn score(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        let k = self.num_classes();
        let mut out = Vec::with_capacity(features.rows() * k);
        for row in features.iter_rows() {
            let logits: Vec<f64> = self
                .centroids
                .iter()
                .map(|c| match c {
                    Some(c) => -row.iter().zip(c).map(|(&x, m)| (f64::from(x) - m).powi(2)).sum::<f64>(),
                    None    => f64::NEG_INFINITY,
                })
                .collect();
            let max  = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
            let sum: f64 = exps.iter().sum();
            out.extend(exps.iter().map(|e| (e / sum) as f32));
        }
        Ok(FeatureMatrix::from_vec(features.rows(), k, out)?)
    }
}

#[derive(Debug, Default)]
pub struct NearestCentroidTrainer {
    plan:     DivergencePlan,
    calls:    Cell<usize>,
    attempts: RefCell<Vec<u32>>,
    sizes:    RefCell<Vec<usize>>,
}

impl NearestCentroidTrainer {
    pub fn with_plan(plan: DivergencePlan) -> Self {
        Self { plan, ..Default::default() }
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.attempts.borrow().clone()
    }

    /// Training-set size of every successful call
    pub fn training_sizes(&self) -> Vec<usize> {
        self.sizes.borrow().clone()
    }
}

impl ModelTrainer for NearestCentroidTrainer {
    type Scorer = NearestCentroidScorer;

    fn train(
        &self,
        features:    &FeatureMatrix,
        labels:      &[usize],
        num_classes: usize,
        attempt:     u32,
    ) -> Result<NearestCentroidScorer, TrainError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        self.attempts.borrow_mut().push(attempt);

        let diverge = match self.plan {
            DivergencePlan::Never            => false,
            DivergencePlan::FirstAttemptOnly => call == 0,
            DivergencePlan::FromCall(n)      => call >= n,
        };
        if diverge {
            return Err(TrainError::Diverged { epoch: 1, loss: f64::NAN });
        }
        if labels.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        if features.rows() != labels.len() {
            return Err(TrainError::LabelCount { features: features.rows(), labels: labels.len() });
        }

        let mut sums   = vec![vec![0.0f64; features.cols()]; num_classes];
        let mut counts = vec![0usize; num_classes];
        for (row, &label) in features.iter_rows().zip(labels) {
            if label >= num_classes {
                return Err(TrainError::InvalidLabel { label, num_classes });
            }
            for (s, &x) in sums[label].iter_mut().zip(row) {
                *s += f64::from(x);
            }
            counts[label] += 1;
        }

        let centroids = sums
            .into_iter()
            .zip(&counts)
            .map(|(s, &n)| (n > 0).then(|| s.into_iter().map(|v| v / n as f64).collect()))
            .collect();
        self.sizes.borrow_mut().push(labels.len());
        Ok(NearestCentroidScorer { centroids })
    }

    fn save_scorer(&self, scorer: &NearestCentroidScorer, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join("centroids.json"), serde_json::to_string(scorer)?)?;
        Ok(())
    }

    fn load_scorer(&self, dir: &Path) -> Result<NearestCentroidScorer> {
        Ok(serde_json::from_str(&fs::read_to_string(dir.join("centroids.json"))?)?)
    }
}

/// Three 10-frame videos per activity under `root`, each made of
/// two clean steps (`take_cup` then `pour`) with ground truth.
pub fn write_two_step_dataset(root: &Path, activities: &[&str]) {
    for sub in ["features", "groundTruth", "mapping"] {
        fs::create_dir_all(root.join(sub)).unwrap();
    }
    fs::write(root.join("mapping/mapping.txt"), "0 take_cup\n1 pour\n").unwrap();

    for activity in activities {
        for (v, split) in [(1usize, 4usize), (2, 6), (3, 5)] {
            let name      = format!("P0{v}_{activity}");
            let mut feats = String::new();
            let mut gt    = String::new();
            for f in 0..10 {
                let jitter = ((f + v) % 3) as f32 * 0.1;
                if f < split {
                    feats += &format!("{jitter} 5\n");
                    gt    += "take_cup\n";
                } else {
                    feats += &format!("5 {jitter}\n");
                    gt    += "pour\n";
                }
            }
            fs::write(root.join(format!("features/{name}.txt")), feats).unwrap();
            fs::write(root.join(format!("groundTruth/{name}")), gt).unwrap();
        }
    }
}
