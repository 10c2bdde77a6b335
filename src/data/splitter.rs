// ============================================================
// Layer 4 — Mini-batch Splitter
// ============================================================
// Shuffles frame indices and splits them into mini-batches
// for one training epoch.
//
// Why shuffle every epoch?
//   Frames arrive video by video and, inside a video, in time
//   order, so consecutive frames share a label. Unshuffled
//   batches would contain a single class and the optimiser
//   would zig-zag between classes.
//
// The RNG is passed in (seeded by the trainer), so two runs
// with the same seed see the same batches in the same order.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.

use rand::{seq::SliceRandom, Rng};

/// Shuffle `0..len` and cut it into batches of at most `batch_size`.
pub fn split_into_batches<R: Rng + ?Sized>(
    len:        usize,
    batch_size: usize,
    rng:        &mut R,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);

    // Clamp to avoid chunks(0) panicking
    let batch_size = batch_size.max(1);

    let batches: Vec<Vec<usize>> = indices
        .chunks(batch_size)
        .map(|c| c.to_vec())
        .collect();

    tracing::trace!("Split {} frames into {} batches", len, batches.len());
    batches
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_batch_sizes() {
        let mut rng = StdRng::seed_from_u64(1);
        let batches = split_into_batches(10, 4, &mut rng);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_all_indices_preserved() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut all: Vec<usize> = split_into_batches(50, 7, &mut rng).concat();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_batches() {
        let a = split_into_batches(20, 5, &mut StdRng::seed_from_u64(3));
        let b = split_into_batches(20, 5, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(split_into_batches(0, 8, &mut rng).is_empty());
    }
}
