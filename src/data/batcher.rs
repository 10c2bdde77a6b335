// ============================================================
// Layer 4 — Frame Batcher
// ============================================================
// Converts rows of a FeatureMatrix (plus their targets) into
// Burn tensors for one mini-batch.
//
// How batching works here:
//   Input:  N row indices into an F × D feature matrix
//   Output: features [N, D] and targets [N] (class ids)
//           or [N, 1] (regression values)
//
//   Rows are copied into one flat Vec in index order and
//   reshaped: [r1_d1, ..., r1_dD, r2_d1, ..., rN_dD] → [N, D]
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::feature_store::FeatureMatrix;

/// Features and class targets for a classification step.
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    /// shape: [batch_size, feature_dim]
    pub features: Tensor<B, 2>,

    /// shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Features and scalar targets for a regression step.
#[derive(Debug, Clone)]
pub struct RegressionBatch<B: Backend> {
    /// shape: [batch_size, feature_dim]
    pub features: Tensor<B, 2>,

    /// shape: [batch_size, 1]
    pub targets: Tensor<B, 2>,
}

/// Holds the target device so tensors are created in the right place.
#[derive(Clone, Debug)]
pub struct FrameBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> FrameBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// Stack the given rows of `features` into a [N, D] tensor.
    pub fn features(&self, features: &FeatureMatrix, rows: &[usize]) -> Tensor<B, 2> {
        let flat: Vec<f32> = rows
            .iter()
            .flat_map(|&r| features.row(r).iter().copied())
            .collect();
        Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([rows.len(), features.cols()])
    }

    /// Whole matrix (or a block of it) as one tensor.
    pub fn matrix(&self, features: &FeatureMatrix) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([features.rows(), features.cols()])
    }

    pub fn classes(&self, features: &FeatureMatrix, labels: &[usize], rows: &[usize]) -> ClassBatch<B> {
        let targets: Vec<i64> = rows.iter().map(|&r| labels[r] as i64).collect();
        ClassBatch {
            features: self.features(features, rows),
            targets:  Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device),
        }
    }

    pub fn regression(&self, features: &FeatureMatrix, values: &[f32], rows: &[usize]) -> RegressionBatch<B> {
        let targets: Vec<f32> = rows.iter().map(|&r| values[r]).collect();
        RegressionBatch {
            features: self.features(features, rows),
            targets:  Tensor::<B, 1>::from_floats(targets.as_slice(), &self.device)
                .reshape([rows.len(), 1]),
        }
    }
}
