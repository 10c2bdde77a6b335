// ============================================================
// Layer 5 — Segmentation Accuracy
// ============================================================
// Predicted labels are anonymous cluster ids, so they must be
// matched to ground-truth classes before frames can be compared.
// The matching is one-to-one and maximises the total number of
// overlapping frames over the whole corpus (Hungarian algorithm
// on the overlap matrix).
//
// Metrics:
//   MoF      — Mean over Frames: matched overlap / total frames
//   mean IoU — average over ground-truth classes of
//              |gt ∩ pred| / |gt ∪ pred| for the matched pair
//
// Only videos that carry ground truth contribute.
//
// Reference: Kuhn (1955) The Hungarian method for the assignment problem

use serde::{Deserialize, Serialize};

use crate::domain::video::Video;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean over Frames in [0, 1]
    pub mof: f64,

    /// Mean intersection-over-union across ground-truth classes
    pub mean_iou: f64,

    /// Frames that had ground truth
    pub frames: usize,

    /// (predicted label, ground-truth class) pairs of the matching
    pub matching: Vec<(usize, usize)>,
}

/// Evaluate the videos' current predicted segmentations.
///
/// Returns `None` when no video has ground truth.
pub fn evaluate(videos: &[Video]) -> Option<Evaluation> {
    let pairs: Vec<(&[usize], &[usize])> = videos
        .iter()
        .filter_map(|v| v.ground_truth().map(|gt| (v.predicted_segmentation(), gt)))
        .filter(|(pred, gt)| pred.len() == gt.len() && !gt.is_empty())
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let num_pred = pairs.iter().flat_map(|(p, _)| p.iter()).max().map_or(0, |m| m + 1);
    let num_gt   = pairs.iter().flat_map(|(_, g)| g.iter()).max().map_or(0, |m| m + 1);
    let n        = num_pred.max(num_gt);

    // overlap[p][g] = frames predicted p whose ground truth is g
    let mut overlap    = vec![vec![0i64; n]; n];
    let mut pred_count = vec![0i64; n];
    let mut gt_count   = vec![0i64; n];
    let mut frames     = 0usize;
    for (pred, gt) in &pairs {
        for (&p, &g) in pred.iter().zip(gt.iter()) {
            overlap[p][g] += 1;
            pred_count[p] += 1;
            gt_count[g]   += 1;
            frames        += 1;
        }
    }

    let cost: Vec<Vec<i64>> = overlap.iter().map(|row| row.iter().map(|&o| -o).collect()).collect();
    let assignment = hungarian(&cost);

    let mut matched  = 0i64;
    let mut matching = Vec::new();
    let mut iou_sum  = 0.0f64;
    let mut iou_n    = 0usize;
    for (p, &g) in assignment.iter().enumerate() {
        if p < num_pred && g < num_gt {
            matched += overlap[p][g];
            matching.push((p, g));
        }
    }
    for g in 0..num_gt {
        if gt_count[g] == 0 {
            continue;
        }
        let inter = assignment
            .iter()
            .position(|&mg| mg == g)
            .filter(|&p| p < num_pred)
            .map_or(0, |p| overlap[p][g]);
        let union = gt_count[g]
            + assignment.iter().position(|&mg| mg == g).map_or(0, |p| pred_count[p])
            - inter;
        iou_sum += inter as f64 / union.max(1) as f64;
        iou_n   += 1;
    }

    Some(Evaluation {
        mof:      matched as f64 / frames.max(1) as f64,
        mean_iou: if iou_n > 0 { iou_sum / iou_n as f64 } else { 0.0 },
        frames,
        matching,
    })
}

/// Minimum-cost perfect matching on a square cost matrix.
/// Returns `assignment[row] = column`.
pub fn hungarian(cost: &[Vec<i64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }
    const INF: i64 = i64::MAX / 4;

    // 1-indexed potentials; p[j] is the row matched to column j
    let mut u   = vec![0i64; n + 1];
    let mut v   = vec![0i64; n + 1];
    let mut p   = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0   = 0usize;
        let mut minv = vec![INF; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1    = 0usize;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j]  = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1    = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j]    -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0    = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        if p[j] > 0 {
            assignment[p[j] - 1] = j - 1;
        }
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(name: &str, start: usize, pred: Vec<usize>, gt: Vec<usize>) -> Video {
        let mut v = Video::new(name, start..start + pred.len(), Some(gt));
        v.set_segmentation(pred).unwrap();
        v
    }

    #[test]
    fn test_hungarian_small() {
        let cost = vec![vec![4, 1, 3], vec![2, 0, 5], vec![3, 2, 2]];
        let a = hungarian(&cost);
        let total: i64 = a.iter().enumerate().map(|(r, &c)| cost[r][c]).sum();
        assert_eq!(total, 5);
        let mut cols = a.clone();
        cols.sort();
        assert_eq!(cols, vec![0, 1, 2]);
    }

    #[test]
    fn test_permuted_labels_score_perfectly() {
        let videos = vec![
            video("a", 0, vec![1, 1, 0, 0], vec![0, 0, 1, 1]),
            video("b", 4, vec![1, 0, 0], vec![0, 1, 1]),
        ];
        let eval = evaluate(&videos).unwrap();
        assert_eq!(eval.frames, 7);
        assert!((eval.mof - 1.0).abs() < 1e-12);
        assert!((eval.mean_iou - 1.0).abs() < 1e-12);
        assert_eq!(eval.matching, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_partial_agreement() {
        // best match: pred 0 ↔ gt 0 (3 frames), pred 1 ↔ gt 1 (0 frames)
        let videos = vec![video("a", 0, vec![0, 0, 0, 0], vec![0, 0, 0, 1])];
        let eval = evaluate(&videos).unwrap();
        assert!((eval.mof - 0.75).abs() < 1e-12);
        // gt 0: 3 / 4, gt 1: 0 / 1
        assert!((eval.mean_iou - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_no_ground_truth() {
        let mut v = Video::new("a", 0..2, None);
        v.set_segmentation(vec![0, 1]).unwrap();
        assert!(evaluate(&[v]).is_none());
    }
}
