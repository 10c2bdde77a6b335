// ============================================================
// Layer 4 — Dataset Assembly
// ============================================================
// Every training set in the pipeline is "frame features + one
// target per frame"; only the target changes:
//
//   temporal embedding → relative time of the frame in its video
//   classifier         → current pseudo-label of the frame
//   evaluation         → ground-truth class (when available)
//
// Instead of one dataset type per target, assemble_dataset takes
// a label-derivation closure. The closure sees the video and the
// frame's local/global index and returns Some(target), or None to
// leave the frame out (e.g. videos skipped this round).

use crate::domain::{feature_store::FeatureMatrix, video::Video};

/// Features and one target per kept frame, in store order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet<L> {
    pub features: FeatureMatrix,
    pub targets:  Vec<L>,
}

impl<L> TrainingSet<L> {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Collect (feature row, target) pairs for every frame `label_fn` keeps.
///
/// `label_fn(video, local_frame, global_frame)`
pub fn assemble_dataset<L>(
    videos:       &[Video],
    features:     &FeatureMatrix,
    mut label_fn: impl FnMut(&Video, usize, usize) -> Option<L>,
) -> TrainingSet<L> {
    let mut rows    = Vec::new();
    let mut targets = Vec::new();

    for video in videos {
        for (local, global) in video.global_range().enumerate() {
            if let Some(target) = label_fn(video, local, global) {
                rows.push(global);
                targets.push(target);
            }
        }
    }

    tracing::debug!("Assembled {} training frames from {} videos", targets.len(), videos.len());
    TrainingSet { features: features.select_rows(&rows), targets }
}
