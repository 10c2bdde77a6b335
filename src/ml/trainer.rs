// ============================================================
// Layer 5 — Classifier Training Loop
// ============================================================
// BurnClassifierTrainer implements the ModelTrainer trait for
// the refinement loop: given frame features and their current
// pseudo-labels it trains a fresh SubactionClassifier.
//
// Per call:
//   1. Validate (non-empty, one label per row, labels < K)
//   2. Initialise weights from seed + attempt (a retry after a
//      divergence starts from different weights)
//   3. For each epoch: shuffle frames into mini-batches,
//      forward → cross-entropy → backward → Adam step
//   4. A NaN/inf loss aborts with TrainError::Diverged
//   5. model.valid() → inner backend, wrapped as a BurnScorer
//
// Key Burn insight:
//   - Training uses TrainBackend (Autodiff<NdArray>) for gradients
//   - model.valid() returns the model on InferBackend (NdArray)
//
// Persistence: weights via NamedMpkGzFileRecorder (full
// precision, so a resumed run scores exactly like the uninterrupted one)
// plus classifier.json holding the architecture.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{batcher::FrameBatcher, splitter::split_into_batches};
use crate::domain::{
    feature_store::FeatureMatrix,
    traits::{ModelTrainer, TrainError},
};
use crate::ml::{
    inferencer::BurnScorer,
    model::{SubactionClassifier, SubactionClassifierConfig},
    Device, InferBackend, TrainBackend,
};

/// Seed offset between a first attempt and its retry.
const RETRY_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

const WEIGHTS_FILE: &str = "classifier";
const CONFIG_FILE:  &str = "classifier.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub epochs:       usize,
    pub batch_size:   usize,
    pub lr:           f64,
    pub weight_decay: f64,
    pub init_std:     f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            epochs:       10,
            batch_size:   256,
            lr:           1e-3,
            weight_decay: 1e-4,
            init_std:     0.01,
        }
    }
}

pub struct BurnClassifierTrainer {
    config: ClassifierConfig,
    seed:   u64,
    device: Device,
}

impl BurnClassifierTrainer {
    pub fn new(config: ClassifierConfig, seed: u64) -> Self {
        Self { config, seed, device: Device::default() }
    }

    fn fit(
        &self,
        features:    &FeatureMatrix,
        labels:      &[usize],
        num_classes: usize,
        attempt:     u32,
    ) -> Result<SubactionClassifier<InferBackend>, TrainError> {
        let seed = self.seed.wrapping_add(u64::from(attempt).wrapping_mul(RETRY_SEED_STRIDE));

        // ── Build model ───────────────────────────────────────────────────────
        let model_cfg = SubactionClassifierConfig::new(features.cols(), num_classes)
            .with_init_std(self.config.init_std);
        let mut model: SubactionClassifier<TrainBackend> = model_cfg.init(seed, &self.device);

        // ── Adam optimiser with L2 weight decay ───────────────────────────────
        let mut optim = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(self.config.weight_decay as _)))
            .init();

        let ce: CrossEntropyLoss<TrainBackend> = CrossEntropyLossConfig::new().init(&self.device);
        let batcher = FrameBatcher::<TrainBackend>::new(self.device.clone());
        let mut rng = StdRng::seed_from_u64(seed);

        // ── Epoch loop ────────────────────────────────────────────────────────
        for epoch in 1..=self.config.epochs {
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;

            for rows in split_into_batches(features.rows(), self.config.batch_size, &mut rng) {
                let batch  = batcher.classes(features, labels, &rows);
                let logits = model.forward(batch.features);
                let loss   = ce.forward(logits, batch.targets);

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    return Err(TrainError::Diverged { epoch, loss: loss_val });
                }
                loss_sum += loss_val;
                batches  += 1;

                // Backward pass + Adam update
                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(self.config.lr, model, grads);
            }

            tracing::debug!(
                "Classifier epoch {:>3}/{} | loss={:.4}",
                epoch, self.config.epochs, loss_sum / batches.max(1) as f64
            );
        }

        Ok(model.valid())
    }
}

impl ModelTrainer for BurnClassifierTrainer {
    type Scorer = BurnScorer;

    fn train(
        &self,
        features:    &FeatureMatrix,
        labels:      &[usize],
        num_classes: usize,
        attempt:     u32,
    ) -> Result<BurnScorer, TrainError> {
        if features.is_empty() || labels.is_empty() {
            return Err(TrainError::EmptyTrainingSet);
        }
        if features.rows() != labels.len() {
            return Err(TrainError::LabelCount { features: features.rows(), labels: labels.len() });
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
            return Err(TrainError::InvalidLabel { label, num_classes });
        }

        tracing::debug!(
            "Training classifier: {} frames, {} classes, attempt {}",
            labels.len(), num_classes, attempt
        );
        let model  = self.fit(features, labels, num_classes, attempt)?;
        let config = SubactionClassifierConfig::new(features.cols(), num_classes)
            .with_init_std(self.config.init_std);
        Ok(BurnScorer::new(model, config, self.device.clone()))
    }

    fn save_scorer(&self, scorer: &BurnScorer, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let path = dir.join(WEIGHTS_FILE);
        NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .record(scorer.model().clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save classifier to '{}'", path.display()))?;

        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(scorer.config())?)
            .with_context(|| format!("Cannot write '{}'", config_path.display()))?;

        tracing::debug!("Saved classifier to '{}'", dir.display());
        Ok(())
    }

    fn load_scorer(&self, dir: &Path) -> Result<BurnScorer> {
        let config_path = dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&config_path)
            .with_context(|| format!("Cannot read '{}'", config_path.display()))?;
        let config: SubactionClassifierConfig = serde_json::from_str(&json)?;

        let path   = dir.join(WEIGHTS_FILE);
        let record = NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), &self.device)
            .with_context(|| format!("Cannot load classifier '{}'", path.display()))?;

        let model = config
            .init::<InferBackend>(self.seed, &self.device)
            .load_record(record);
        tracing::info!("Classifier loaded from '{}'", dir.display());
        Ok(BurnScorer::new(model, config, self.device.clone()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::Scorer;

    fn two_blobs() -> (FeatureMatrix, Vec<usize>) {
        let mut rows   = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let jitter = (i % 5) as f32 * 0.05;
            if i % 2 == 0 {
                rows.push(vec![2.0 + jitter, 0.0]);
                labels.push(0);
            } else {
                rows.push(vec![0.0, 2.0 + jitter]);
                labels.push(1);
            }
        }
        (FeatureMatrix::from_rows(&rows).unwrap(), labels)
    }

    fn trainer() -> BurnClassifierTrainer {
        let config = ClassifierConfig { epochs: 60, batch_size: 8, lr: 0.05, init_std: 0.1, ..Default::default() };
        BurnClassifierTrainer::new(config, 5)
    }

    #[test]
    fn test_learns_separable_classes() {
        let (features, labels) = two_blobs();
        let scorer = trainer().train(&features, &labels, 2, 0).unwrap();
        let pred   = scorer.score(&features).unwrap().argmax_rows();
        assert_eq!(pred, labels);
    }

    #[test]
    fn test_rejects_bad_input() {
        let (features, labels) = two_blobs();
        let t = trainer();
        assert!(matches!(
            t.train(&FeatureMatrix::zeros(0, 2), &[], 2, 0),
            Err(TrainError::EmptyTrainingSet)
        ));
        assert!(matches!(
            t.train(&features, &labels[..3], 2, 0),
            Err(TrainError::LabelCount { .. })
        ));
        assert!(matches!(
            t.train(&features, &labels, 1, 0),
            Err(TrainError::InvalidLabel { label: 1, num_classes: 1 })
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (features, labels) = two_blobs();
        let t      = trainer();
        let scorer = t.train(&features, &labels, 2, 0).unwrap();
        let dir    = tempfile::tempdir().unwrap();

        t.save_scorer(&scorer, dir.path()).unwrap();
        let loaded = t.load_scorer(dir.path()).unwrap();

        assert_eq!(loaded.num_classes(), 2);
        assert_eq!(
            scorer.score(&features).unwrap().as_slice(),
            loaded.score(&features).unwrap().as_slice()
        );
    }
}
