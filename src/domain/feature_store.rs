// ============================================================
// Layer 3 — Feature Matrix and Feature Store
// ============================================================
// Every frame of every video is one row of a single global
// matrix. Videos only remember the half-open index range of
// their rows:
//
//   row 0 ─┐
//          │  video "P03_cam01_coffee"   global_range = 0..812
//   row 811┘
//   row 812┐
//          │  video "P04_webcam02_coffee" global_range = 812..1391
//   ...
//
// The store is append-only while a dataset is loaded and
// read-only afterwards. Embeddings, posteriors and other
// per-frame matrices reuse FeatureMatrix with the same row
// indexing, so a video's range slices any of them.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

/// Shape violations when building or extending a matrix.
#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("expected {expected} values for a {rows}x{cols} matrix, got {actual}")]
    DataLength {
        rows:     usize,
        cols:     usize,
        expected: usize,
        actual:   usize,
    },

    #[error("row has {actual} columns, expected {expected}")]
    RowWidth { expected: usize, actual: usize },

    #[error("expected {expected} labels, got {actual}")]
    LabelCount { expected: usize, actual: usize },
}

/// Dense row-major `f32` matrix. Rows are frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Wrap a flat row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected = rows * cols;
        if data.len() != expected {
            return Err(ShapeError::DataLength { rows, cols, expected, actual: data.len() });
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same width.
    #[cfg(test)]
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ShapeError> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(ShapeError::RowWidth { expected: cols, actual: row.len() });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { rows: rows.len(), cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        // chunks_exact panics on a zero chunk size
        let width = self.cols.max(1);
        self.data.chunks_exact(width).take(if self.cols == 0 { 0 } else { self.rows })
    }

    /// Copy a contiguous block of rows.
    pub fn slice_rows(&self, range: Range<usize>) -> FeatureMatrix {
        let data = self.data[range.start * self.cols..range.end * self.cols].to_vec();
        FeatureMatrix { rows: range.len(), cols: self.cols, data }
    }

    /// Copy an arbitrary set of rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        FeatureMatrix { rows: indices.len(), cols: self.cols, data }
    }

    /// Append one row. An empty matrix adopts the width of its first row.
    pub fn push_row(&mut self, row: &[f32]) -> Result<(), ShapeError> {
        if self.rows == 0 && self.cols == 0 {
            self.cols = row.len();
        }
        if row.len() != self.cols {
            return Err(ShapeError::RowWidth { expected: self.cols, actual: row.len() });
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    /// Index of the largest value in each row (first one on ties).
    #[cfg(test)]
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.iter_rows()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 { (i, v) } else { best }
                    })
                    .0
            })
            .collect()
    }
}

/// The global per-frame feature matrix shared by all videos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStore {
    matrix: FeatureMatrix,
}

impl Default for FeatureMatrix {
    fn default() -> Self {
        Self::zeros(0, 0)
    }
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one video's frames and return the global range they occupy.
    pub fn push_video(&mut self, frames: &FeatureMatrix) -> Result<Range<usize>, ShapeError> {
        if !self.matrix.is_empty() && frames.cols() != self.matrix.cols() {
            return Err(ShapeError::RowWidth {
                expected: self.matrix.cols(),
                actual:   frames.cols(),
            });
        }
        let start = self.matrix.rows();
        for row in frames.iter_rows() {
            self.matrix.push_row(row)?;
        }
        Ok(start..self.matrix.rows())
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    /// Number of frames in the store
    pub fn len(&self) -> usize {
        self.matrix.rows()
    }

    /// Feature dimensionality
    pub fn dim(&self) -> usize {
        self.matrix.cols()
    }
}

impl From<FeatureMatrix> for FeatureStore {
    fn from(matrix: FeatureMatrix) -> Self {
        Self { matrix }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = FeatureMatrix::from_vec(2, 3, vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::DataLength { rows: 2, cols: 3, expected: 6, actual: 5 }
        );
    }

    #[test]
    fn test_push_video_returns_contiguous_ranges() {
        let mut store = FeatureStore::new();
        let a = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let b = FeatureMatrix::from_rows(&[vec![5.0, 6.0]]).unwrap();

        assert_eq!(store.push_video(&a).unwrap(), 0..2);
        assert_eq!(store.push_video(&b).unwrap(), 2..3);
        assert_eq!(store.len(), 3);
        assert_eq!(store.matrix().row(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_push_video_rejects_other_width() {
        let mut store = FeatureStore::new();
        store.push_video(&FeatureMatrix::from_rows(&[vec![1.0, 2.0]]).unwrap()).unwrap();
        let wide = FeatureMatrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(
            store.push_video(&wide),
            Err(ShapeError::RowWidth { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_slice_and_select_rows() {
        let m = FeatureMatrix::from_rows(&[vec![0.0], vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        assert_eq!(m.slice_rows(1..3).as_slice(), &[1.0, 2.0]);
        assert_eq!(m.select_rows(&[3, 0]).as_slice(), &[3.0, 0.0]);
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        let m = FeatureMatrix::from_rows(&[vec![0.5, 0.5], vec![0.1, 0.9]]).unwrap();
        assert_eq!(m.argmax_rows(), vec![0, 1]);
    }
}
