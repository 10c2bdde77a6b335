// ============================================================
// Layer 3 — Video Domain Type
// ============================================================
// A video never owns its features. It owns:
//   - its name (the feature file stem)
//   - the range of its rows in the FeatureStore
//   - optional ground truth, used only for evaluation
//   - the current predicted segmentation, one label per frame
//
// Name and range are fixed at load time. The prediction is
// replaced wholesale by clustering and by every decoding round.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::domain::feature_store::ShapeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    name:                   String,
    global_range:           Range<usize>,
    ground_truth:           Option<Vec<usize>>,
    predicted_segmentation: Vec<usize>,
}

impl Video {
    pub fn new(
        name:         impl Into<String>,
        global_range: Range<usize>,
        ground_truth: Option<Vec<usize>>,
    ) -> Self {
        Self {
            name: name.into(),
            global_range,
            ground_truth,
            predicted_segmentation: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn global_range(&self) -> Range<usize> {
        self.global_range.clone()
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.global_range.len()
    }

    pub fn ground_truth(&self) -> Option<&[usize]> {
        self.ground_truth.as_deref()
    }

    /// Relative position of a frame inside the video, in [0, 1).
    pub fn temporal_position(&self, local_frame: usize) -> f32 {
        local_frame as f32 / self.len().max(1) as f32
    }

    pub fn predicted_segmentation(&self) -> &[usize] {
        &self.predicted_segmentation
    }

    /// Replace the prediction. Must cover every frame.
    pub fn set_segmentation(&mut self, labels: Vec<usize>) -> Result<(), ShapeError> {
        if labels.len() != self.len() {
            return Err(ShapeError::LabelCount { expected: self.len(), actual: labels.len() });
        }
        self.predicted_segmentation = labels;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporal_position() {
        let v = Video::new("v", 10..14, None);
        let positions: Vec<f32> = (0..v.len()).map(|i| v.temporal_position(i)).collect();
        assert_eq!(positions, vec![0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_set_segmentation_checks_length() {
        let mut v = Video::new("v", 0..3, None);
        assert!(v.set_segmentation(vec![0, 0]).is_err());
        v.set_segmentation(vec![0, 1, 1]).unwrap();
        assert_eq!(v.predicted_segmentation(), &[0, 1, 1]);
    }
}
