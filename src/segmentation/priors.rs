// ============================================================
// Layer 5 — Ordering and Duration Priors
// ============================================================
// The decoder needs two things the clusterer does not provide:
//
//   canonical order — which label comes first, second, ...
//                     Learned from the clustering: labels are
//                     sorted by the mean relative time of the
//                     frames assigned to them.
//
//   mean durations  — expected run length of each label,
//                     measured on the current segmentations.

use crate::domain::video::Video;

/// Sort labels by the mean temporal position of their frames.
///
/// `labels_of` returns the current label of each frame of a video.
/// Labels that own no frame keep their relative id order at the end.
/// `exclude` (the background label) never appears in the result.
pub fn canonical_order<'a>(
    videos:     &'a [Video],
    num_labels: usize,
    exclude:    Option<usize>,
    labels_of:  impl Fn(&'a Video) -> &'a [usize],
) -> Vec<usize> {
    let mut sums   = vec![0.0f64; num_labels];
    let mut counts = vec![0usize; num_labels];

    for video in videos {
        for (i, &label) in labels_of(video).iter().enumerate() {
            if label < num_labels {
                sums[label]   += f64::from(video.temporal_position(i));
                counts[label] += 1;
            }
        }
    }

    let candidates = (0..num_labels).filter(|&l| Some(l) != exclude);
    let (mut seen, unseen): (Vec<usize>, Vec<usize>) = candidates.partition(|&l| counts[l] > 0);

    seen.sort_by(|&a, &b| {
        let ma = sums[a] / counts[a] as f64;
        let mb = sums[b] / counts[b] as f64;
        ma.total_cmp(&mb).then(a.cmp(&b))
    });
    seen.extend(unseen);
    seen
}

/// Mean run length of every label over the videos' predicted segmentations.
///
/// A label that never appears gets `mean video length / num_labels`.
pub fn mean_durations(videos: &[Video], num_labels: usize) -> Vec<f64> {
    let mut total_len = vec![0usize; num_labels];
    let mut runs      = vec![0usize; num_labels];

    for video in videos {
        let seg = video.predicted_segmentation();
        let mut start = 0usize;
        for end in 1..=seg.len() {
            if end == seg.len() || seg[end] != seg[start] {
                let label = seg[start];
                if label < num_labels {
                    total_len[label] += end - start;
                    runs[label]      += 1;
                }
                start = end;
            }
        }
    }

    let frames: usize  = videos.iter().map(Video::len).sum();
    let mean_video_len = frames as f64 / videos.len().max(1) as f64;
    let fallback       = (mean_video_len / num_labels.max(1) as f64).max(1.0);

    total_len
        .into_iter()
        .zip(runs)
        .map(|(len, n)| if n > 0 { len as f64 / n as f64 } else { fallback })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(name: &str, start: usize, seg: Vec<usize>) -> Video {
        let mut v = Video::new(name, start..start + seg.len(), None);
        v.set_segmentation(seg).unwrap();
        v
    }

    #[test]
    fn test_order_follows_mean_relative_time() {
        // label 2 early, label 0 in the middle, label 1 late
        let videos = vec![
            video("a", 0, vec![2, 2, 0, 0, 1, 1]),
            video("b", 6, vec![2, 0, 0, 1]),
        ];
        let order = canonical_order(&videos, 3, None, |v| v.predicted_segmentation());
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_order_appends_unused_and_skips_background() {
        let videos = vec![video("a", 0, vec![3, 3, 1, 1])];
        let order = canonical_order(&videos, 4, Some(1), |v| v.predicted_segmentation());
        assert_eq!(order, vec![3, 0, 2]);
    }

    #[test]
    fn test_mean_durations() {
        let videos = vec![
            video("a", 0, vec![0, 0, 1, 1, 1, 1]),
            video("b", 6, vec![0, 0, 0, 0, 1, 1]),
        ];
        // label 2 never appears: mean length 6 / 3 labels = 2
        assert_eq!(mean_durations(&videos, 3), vec![3.0, 3.0, 2.0]);
    }
}
