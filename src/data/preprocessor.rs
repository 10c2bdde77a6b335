// ============================================================
// Layer 4 — Feature Preprocessor
// ============================================================
// Standardises frame features before embedding/clustering.
//
// Why standardise?
//   Breakfast / 50 Salads descriptors mix dimensions with very
//   different ranges. k-means uses plain Euclidean distance, so
//   a few large-range dimensions would dominate every cluster.
//   Z-scoring each column puts all dimensions on the same scale.
//
// Steps:
//   1. Per-column mean over every frame of the corpus
//   2. Per-column standard deviation (population)
//   3. x' = (x - mean) / std, columns with std ≈ 0 only centred
//
// The statistics are corpus-wide, computed once at load time.

use crate::domain::feature_store::FeatureMatrix;

/// Columns whose deviation is below this are only centred.
const MIN_STD: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    mean: Vec<f64>,
    std:  Vec<f64>,
}

impl Standardizer {
    /// Compute per-column statistics of `features`.
    pub fn fit(features: &FeatureMatrix) -> Self {
        let cols = features.cols();
        let n    = features.rows().max(1) as f64;

        let mut mean = vec![0.0f64; cols];
        for row in features.iter_rows() {
            for (m, &x) in mean.iter_mut().zip(row) {
                *m += f64::from(x);
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0f64; cols];
        for row in features.iter_rows() {
            for ((v, &x), m) in var.iter_mut().zip(row).zip(&mean) {
                let d = f64::from(x) - m;
                *v += d * d;
            }
        }
        let std = var.into_iter().map(|v| (v / n).sqrt()).collect();

        Self { mean, std }
    }

    /// Apply the fitted transform to every row.
    pub fn transform(&self, features: &FeatureMatrix) -> FeatureMatrix {
        let data: Vec<f32> = features
            .iter_rows()
            .flat_map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.std))
                    .map(|(&x, (&m, &s))| {
                        let centred = f64::from(x) - m;
                        (if s < MIN_STD { centred } else { centred / s }) as f32
                    })
                    .collect::<Vec<f32>>()
            })
            .collect();
        // same shape as the input, so from_vec cannot fail
        FeatureMatrix::from_vec(features.rows(), features.cols(), data)
            .unwrap_or_else(|_| features.clone())
    }
}
