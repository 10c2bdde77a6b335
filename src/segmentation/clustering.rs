// ============================================================
// Layer 5 — K-Means Clusterer
// ============================================================
// Produces the initial pseudo ground truth: every embedded
// frame is assigned to one of K groups, K being the known
// number of sub-activities of the activity class.
//
//   1. k-means++ seeding (seeded StdRng → deterministic)
//   2. Lloyd iterations: assign to nearest centroid, recompute
//   3. Stop when no centroid moves more than `tolerance`
//      (squared distance) or after `max_iter` iterations
//
// Hitting the cap is not an error: a warning is logged and the
// lowest-inertia assignment seen so far is returned.
//
// Reference: Lloyd (1982), Arthur & Vassilvitskii (2007) k-means++

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::feature_store::FeatureMatrix;

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("number of clusters must be positive")]
    ZeroClusters,

    #[error("cannot form {k} clusters from {points} points")]
    TooFewPoints { k: usize, points: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Iteration cap for Lloyd's algorithm
    pub max_iter: usize,

    /// Convergence threshold on the largest squared centroid shift
    pub tolerance: f64,

    /// Independent k-means++ restarts; the lowest inertia wins
    pub restarts: usize,

    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { max_iter: 300, tolerance: 1e-4, restarts: 1, seed: 0 }
    }
}

/// Result of a clustering run.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// One cluster id per input row
    pub assignment: Vec<usize>,
    /// Sum of squared distances to the assigned centroid
    pub inertia:    f64,
    pub iterations: usize,
    pub converged:  bool,
}

#[derive(Debug, Clone, Default)]
pub struct KMeans {
    config: ClusterConfig,
}

impl KMeans {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    /// Partition the rows of `data` into `k` clusters.
    pub fn fit(&self, data: &FeatureMatrix, k: usize) -> Result<Clustering, ClusterError> {
        if k == 0 {
            return Err(ClusterError::ZeroClusters);
        }
        if data.rows() < k {
            return Err(ClusterError::TooFewPoints { k, points: data.rows() });
        }

        let mut best: Option<Clustering> = None;
        for restart in 0..self.config.restarts.max(1) {
            let seed   = self.config.seed.wrapping_add(restart as u64);
            let result = self.fit_once(data, k, seed);
            tracing::debug!(
                "k-means restart {}: inertia={:.4} after {} iterations",
                restart, result.inertia, result.iterations
            );
            if best.as_ref().map_or(true, |b| result.inertia < b.inertia) {
                best = Some(result);
            }
        }

        // restarts.max(1) guarantees at least one run
        let best = best.ok_or(ClusterError::ZeroClusters)?;
        if !best.converged {
            tracing::warn!(
                "k-means did not converge within {} iterations; using best assignment (inertia={:.4})",
                self.config.max_iter, best.inertia
            );
        }
        Ok(best)
    }

    fn fit_once(&self, data: &FeatureMatrix, k: usize, seed: u64) -> Clustering {
        let mut rng       = StdRng::seed_from_u64(seed);
        let mut centroids = kmeans_plus_plus(data, k, &mut rng);
        let mut assignment = vec![0usize; data.rows()];

        let mut best_inertia    = f64::INFINITY;
        let mut best_assignment = assignment.clone();
        let mut converged       = false;
        let mut iterations      = 0usize;

        while iterations < self.config.max_iter {
            iterations += 1;

            let inertia = assign(data, &centroids, &mut assignment);
            if inertia < best_inertia {
                best_inertia    = inertia;
                best_assignment = assignment.clone();
            }

            let updated = update_centroids(data, &centroids, &mut assignment, k);
            let shift = centroids
                .iter()
                .zip(&updated)
                .map(|(a, b)| squared_distance(a, b))
                .fold(0.0, f64::max);
            centroids = updated;

            if shift <= self.config.tolerance {
                converged = true;
                break;
            }
        }

        // Final assignment against the last centroids
        let inertia = assign(data, &centroids, &mut assignment);
        if inertia <= best_inertia {
            best_inertia    = inertia;
            best_assignment = assignment;
        }

        Clustering {
            assignment: best_assignment,
            inertia:    best_inertia,
            iterations,
            converged,
        }
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn row_distance(row: &[f32], centroid: &[f64]) -> f64 {
    row.iter()
        .zip(centroid)
        .map(|(&x, &c)| {
            let d = f64::from(x) - c;
            d * d
        })
        .sum()
}

/// Nearest centroid for every row (lowest id on ties). Returns the inertia.
fn assign(data: &FeatureMatrix, centroids: &[Vec<f64>], assignment: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (i, row) in data.iter_rows().enumerate() {
        let (best, dist) = centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| (c, row_distance(row, centroid)))
            .fold((0usize, f64::INFINITY), |acc, cur| if cur.1 < acc.1 { cur } else { acc });
        assignment[i] = best;
        inertia      += dist;
    }
    inertia
}

/// Mean of each cluster. An empty cluster is re-seeded with the point
/// farthest from its current centroid, which is moved into it.
fn update_centroids(
    data:       &FeatureMatrix,
    old:        &[Vec<f64>],
    assignment: &mut [usize],
    k:          usize,
) -> Vec<Vec<f64>> {
    let dim = data.cols();
    let mut sums   = vec![vec![0.0f64; dim]; k];
    let mut counts = vec![0usize; k];

    for (row, &c) in data.iter_rows().zip(assignment.iter()) {
        counts[c] += 1;
        for (s, &x) in sums[c].iter_mut().zip(row) {
            *s += f64::from(x);
        }
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let farthest = data
            .iter_rows()
            .enumerate()
            .filter(|(i, _)| counts[assignment[*i]] > 1)
            .map(|(i, row)| (i, row_distance(row, &old[assignment[i]])))
            .fold(None, |acc: Option<(usize, f64)>, cur| match acc {
                Some(a) if a.1 >= cur.1 => Some(a),
                _ => Some(cur),
            });

        if let Some((i, _)) = farthest {
            let from = assignment[i];
            counts[from] -= 1;
            for (s, &x) in sums[from].iter_mut().zip(data.row(i)) {
                *s -= f64::from(x);
            }
            assignment[i] = empty;
            counts[empty] = 1;
            sums[empty]   = data.row(i).iter().map(|&x| f64::from(x)).collect();
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(old)
        .map(|((sum, count), previous)| {
            if count == 0 {
                previous.clone()
            } else {
                sum.into_iter().map(|s| s / count as f64).collect()
            }
        })
        .collect()
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the nearest chosen one.
fn kmeans_plus_plus(data: &FeatureMatrix, k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let to_f64 = |i: usize| -> Vec<f64> { data.row(i).iter().map(|&x| f64::from(x)).collect() };

    let mut centroids = Vec::with_capacity(k);
    centroids.push(to_f64(rng.gen_range(0..data.rows())));

    let mut nearest: Vec<f64> = data
        .iter_rows()
        .map(|row| row_distance(row, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick   = nearest.len() - 1;
            for (i, &d) in nearest.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // all points coincide with a centroid
            rng.gen_range(0..data.rows())
        };

        let centroid = to_f64(chosen);
        for (i, row) in data.iter_rows().enumerate() {
            nearest[i] = nearest[i].min(row_distance(row, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> FeatureMatrix {
        let mut rows = Vec::new();
        for i in 0..10 {
            let j = i as f32 * 0.01;
            rows.push(vec![0.0 + j, 0.0 - j]);
            rows.push(vec![10.0 + j, 10.0 - j]);
            rows.push(vec![-10.0 + j, 10.0 + j]);
        }
        FeatureMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_separates_well_separated_blobs() {
        let data   = blobs();
        let result = KMeans::default().fit(&data, 3).unwrap();

        assert!(result.converged);
        assert_eq!(result.assignment.len(), data.rows());
        // rows 3i, 3i+1, 3i+2 belong to three different blobs
        for i in 0..10 {
            assert_eq!(result.assignment[3 * i],     result.assignment[0]);
            assert_eq!(result.assignment[3 * i + 1], result.assignment[1]);
            assert_eq!(result.assignment[3 * i + 2], result.assignment[2]);
        }
        let mut ids = vec![result.assignment[0], result.assignment[1], result.assignment[2]];
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let data = blobs();
        let cfg  = ClusterConfig { seed: 11, ..ClusterConfig::default() };
        let a = KMeans::new(cfg.clone()).fit(&data, 4).unwrap();
        let b = KMeans::new(cfg).fit(&data, 4).unwrap();
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.inertia, b.inertia);
    }

    #[test]
    fn test_iteration_cap_returns_best_effort() {
        let data = blobs();
        let cfg  = ClusterConfig { max_iter: 1, tolerance: -1.0, ..ClusterConfig::default() };
        let result = KMeans::new(cfg).fit(&data, 3).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert_eq!(result.assignment.len(), data.rows());
    }

    #[test]
    fn test_empty_clusters_are_reseeded_with_far_points() {
        let data = FeatureMatrix::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![10.0]]).unwrap();
        let old  = vec![vec![0.0], vec![100.0], vec![200.0]];
        let mut assignment = vec![0, 0, 0, 0];

        let updated = update_centroids(&data, &old, &mut assignment, 3);

        assert_eq!(assignment, vec![0, 0, 2, 1]);
        assert_eq!(updated, vec![vec![0.5], vec![10.0], vec![2.0]]);
    }

    #[test]
    fn test_rejects_bad_k() {
        let data = blobs();
        assert_eq!(KMeans::default().fit(&data, 0).unwrap_err(), ClusterError::ZeroClusters);
        assert_eq!(
            KMeans::default().fit(&data, 31).unwrap_err(),
            ClusterError::TooFewPoints { k: 31, points: 30 }
        );
    }
}
