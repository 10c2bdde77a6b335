// ============================================================
// Layer 3 — Pseudo-Labeling
// ============================================================
// Pseudo ground truth: one label id per global frame index.
// It is never patched in place. Clustering and every decoding
// round build a fresh labeling from the videos' current
// segmentations and the corpus swaps it in.

use serde::{Deserialize, Serialize};

use crate::domain::{feature_store::ShapeError, video::Video};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoLabeling {
    labels: Vec<usize>,
}

impl PseudoLabeling {
    pub fn new(labels: Vec<usize>) -> Self {
        Self { labels }
    }

    /// Concatenate every video's predicted segmentation in store order.
    ///
    /// `total_frames` is the size of the feature store; the result must
    /// have exactly one entry per frame.
    pub fn from_videos(videos: &[Video], total_frames: usize) -> Result<Self, ShapeError> {
        let mut labels = vec![0usize; total_frames];
        let mut written = 0usize;
        for video in videos {
            let seg = video.predicted_segmentation();
            if seg.len() != video.len() {
                return Err(ShapeError::LabelCount { expected: video.len(), actual: seg.len() });
            }
            labels[video.global_range()].copy_from_slice(seg);
            written += seg.len();
        }
        if written != total_frames {
            return Err(ShapeError::LabelCount { expected: total_frames, actual: written });
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn get(&self, frame: usize) -> usize {
        self.labels[frame]
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[usize] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_videos_covers_every_frame() {
        let mut a = Video::new("a", 0..2, None);
        let mut b = Video::new("b", 2..5, None);
        a.set_segmentation(vec![0, 1]).unwrap();
        b.set_segmentation(vec![0, 0, 1]).unwrap();

        let labeling = PseudoLabeling::from_videos(&[a, b], 5).unwrap();
        assert_eq!(labeling.as_slice(), &[0, 1, 0, 0, 1]);
    }

    #[test]
    fn test_from_videos_detects_gap() {
        let mut a = Video::new("a", 0..2, None);
        a.set_segmentation(vec![0, 1]).unwrap();
        assert!(PseudoLabeling::from_videos(&[a], 4).is_err());
    }
}
