// ============================================================
// Layer 5 — Scorer (Inference)
// ============================================================
// A trained SubactionClassifier on the inner backend, exposed
// through the Scorer trait. Frames are scored in fixed-size
// row chunks so a long corpus never becomes one giant tensor;
// softmax turns each row of logits into a posterior.

use anyhow::{anyhow, Result};
use burn::{prelude::*, tensor::activation::softmax};

use crate::data::batcher::FrameBatcher;
use crate::domain::{feature_store::FeatureMatrix, traits::Scorer};
use crate::ml::{
    model::{SubactionClassifier, SubactionClassifierConfig},
    Device, InferBackend,
};

/// Rows scored per forward pass.
const SCORE_CHUNK: usize = 4096;

pub struct BurnScorer {
    model:  SubactionClassifier<InferBackend>,
    config: SubactionClassifierConfig,
    device: Device,
}

impl BurnScorer {
    pub fn new(model: SubactionClassifier<InferBackend>, config: SubactionClassifierConfig, device: Device) -> Self {
        Self { model, config, device }
    }

    pub fn model(&self) -> &SubactionClassifier<InferBackend> {
        &self.model
    }

    pub fn config(&self) -> &SubactionClassifierConfig {
        &self.config
    }
}

impl Scorer for BurnScorer {
    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn score(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        if features.cols() != self.config.input_dim {
            return Err(anyhow!(
                "classifier expects {} feature columns, got {}",
                self.config.input_dim,
                features.cols()
            ));
        }

        let batcher = FrameBatcher::<InferBackend>::new(self.device.clone());
        let k       = self.num_classes();
        let mut out = Vec::with_capacity(features.rows() * k);

        let mut start = 0;
        while start < features.rows() {
            let end   = (start + SCORE_CHUNK).min(features.rows());
            let chunk = features.slice_rows(start..end);

            let probs = softmax(self.model.forward(batcher.matrix(&chunk)), 1);
            let probs: Vec<f32> = probs
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("Cannot read posteriors: {e:?}"))?;
            out.extend(probs);
            start = end;
        }

        Ok(FeatureMatrix::from_vec(features.rows(), k, out)?)
    }
}
