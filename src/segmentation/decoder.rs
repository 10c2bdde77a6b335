// ============================================================
// Layer 5 — Segmentation Decoder (monotonic Viterbi)
// ============================================================
// Finds the best segmentation of one video under the ordering
// constraint: the K sub-activities appear in a fixed canonical
// order, each exactly once, each as one contiguous run.
//
// The decoder walks a chain of states. Without background the
// chain is simply the ordered labels:
//
//   L0 → L1 → L2 → ... → L(K-1)
//
// With a background label, an optional background slot sits
// before, between and after the ordered labels:
//
//   [B] → L0 → [B] → L1 → [B] → ... → L(K-1) → [B]
//
// Recurrence over (frame t, chain position s):
//
//   V[t][s] = emit(t, s) + max {
//       V[t-1][s]                      (same label continues)
//       V[t-1][s-1]                    (advance to next slot)
//       V[t-1][s-2]                    (skip an empty [B] slot)
//   }
//
// emit(t, s) = ln(max(p[t][label(s)], floor)), so zero or
// negative posteriors cannot produce -inf or NaN.
//
// With a duration prior the decoder works on whole runs instead
// of frames: a run of an ordered label with mean length λ adds
// ln Poisson(len; λ), whose mode sits at λ. Background runs carry
// no duration cost.
//
// Reference: Viterbi (1967)
//            Kukleva et al. (2019) Unsupervised learning of action
//            classes with continuous temporal embedding

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::feature_store::FeatureMatrix;

/// Posteriors are clamped to this before taking the log.
pub const DEFAULT_LOG_FLOOR: f64 = 1e-12;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("{frames} frames cannot hold {labels} ordered labels")]
    Infeasible { frames: usize, labels: usize },

    #[error("label order is empty")]
    EmptyOrder,

    #[error("label {label} appears more than once in the order")]
    DuplicateLabel { label: usize },

    #[error("label {label} is outside the {classes} scored classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("{actual} mean durations given for {expected} classes")]
    DurationCount { expected: usize, actual: usize },
}

/// Decoder settings shared by every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Lower bound applied to posteriors before the log
    pub log_floor: f64,

    /// Estimate mean run lengths from the current segmentation
    /// and bias runs towards them
    pub duration_prior: bool,

    /// Label that may be inserted anywhere outside the ordered runs
    pub background_label: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            log_floor:        DEFAULT_LOG_FLOOR,
            duration_prior:   false,
            background_label: None,
        }
    }
}

/// Per-video priors for one decode call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodePrior {
    /// Canonical order of the labels every video must contain
    pub order: Vec<usize>,

    /// Mean run length per label id (indexed by label, one per class)
    pub mean_durations: Option<Vec<f64>>,

    /// Optional background label, never part of `order`
    pub background: Option<usize>,
}

impl DecodePrior {
    #[cfg(test)]
    pub fn ordered(order: Vec<usize>) -> Self {
        Self { order, mean_durations: None, background: None }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChainSlot {
    label:    usize,
    optional: bool,
}

#[derive(Debug, Clone)]
pub struct SegmentationDecoder {
    log_floor: f64,
}

impl Default for SegmentationDecoder {
    fn default() -> Self {
        Self { log_floor: DEFAULT_LOG_FLOOR }
    }
}

impl SegmentationDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self { log_floor: config.log_floor.max(f64::MIN_POSITIVE) }
    }

    /// Decode one video.
    ///
    /// `scores` is F × C (frames × classes) posterior probabilities.
    /// Returns exactly F labels.
    pub fn decode(&self, scores: &FeatureMatrix, prior: &DecodePrior) -> Result<Vec<usize>, DecodeError> {
        let frames  = scores.rows();
        let classes = scores.cols();
        validate_prior(prior, classes)?;

        let required = prior.order.len();
        if frames < required {
            return Err(DecodeError::Infeasible { frames, labels: required });
        }

        let chain  = build_chain(&prior.order, prior.background);
        let labels = match &prior.mean_durations {
            Some(durations) => self.decode_runs(scores, &chain, durations),
            None            => self.decode_frames(scores, &chain),
        };
        labels.ok_or(DecodeError::Infeasible { frames, labels: required })
    }

    /// Total log score of a labeling, with the same floor as `decode`.
    /// Duration costs are not included.
    #[cfg(test)]
    pub fn log_score(&self, scores: &FeatureMatrix, labels: &[usize]) -> f64 {
        labels
            .iter()
            .enumerate()
            .map(|(t, &l)| self.emit(scores, t, l))
            .sum()
    }

    fn emit(&self, scores: &FeatureMatrix, t: usize, label: usize) -> f64 {
        // f64::max ignores NaN, so NaN posteriors also land on the floor
        f64::from(scores.get(t, label)).max(self.log_floor).ln()
    }

    // ─── Frame-level recursion (no duration prior) ────────────────────────────
    fn decode_frames(&self, scores: &FeatureMatrix, chain: &[ChainSlot]) -> Option<Vec<usize>> {
        let frames = scores.rows();
        let n      = chain.len();
        let emit   = |t: usize, s: usize| self.emit(scores, t, chain[s].label);

        let mut prev = vec![f64::NEG_INFINITY; n];
        let mut back = vec![usize::MAX; frames * n];

        prev[0] = emit(0, 0);
        if chain[0].optional && n > 1 {
            prev[1] = emit(0, 1);
        }

        let mut cur = vec![f64::NEG_INFINITY; n];
        for t in 1..frames {
            for s in 0..n {
                let mut best = prev[s];
                let mut from = s;

                if s >= 1 && prev[s - 1] > best {
                    best = prev[s - 1];
                    from = s - 1;
                }
                if s >= 2 && chain[s - 1].optional && prev[s - 2] > best {
                    best = prev[s - 2];
                    from = s - 2;
                }

                if best > f64::NEG_INFINITY {
                    cur[s]           = best + emit(t, s);
                    back[t * n + s]  = from;
                } else {
                    cur[s] = f64::NEG_INFINITY;
                }
            }
            std::mem::swap(&mut prev, &mut cur);
        }

        // Must finish on the last ordered label or the trailing background.
        let last = n - 1;
        let mut end = last;
        if chain[last].optional && prev[last - 1] >= prev[last] {
            end = last - 1;
        }
        if prev[end] == f64::NEG_INFINITY {
            return None;
        }

        let mut labels = vec![0usize; frames];
        let mut s = end;
        for t in (0..frames).rev() {
            labels[t] = chain[s].label;
            if t > 0 {
                s = back[t * n + s];
            }
        }
        Some(labels)
    }

    // ─── Run-level recursion (explicit durations) ─────────────────────────────
    // best[s][t]: chain slots 0..=s placed, slot s non-empty and
    // ending right before frame t. Each run of an ordered label is
    // scored as a whole with ln Poisson(len; λ), which peaks at λ.
    // Quadratic in the number of frames.
    fn decode_runs(&self, scores: &FeatureMatrix, chain: &[ChainSlot], durations: &[f64]) -> Option<Vec<usize>> {
        let frames = scores.rows();
        let n      = chain.len();
        let w      = frames + 1;

        // cum[s * w + t]: emission sum of slot s over frames 0..t
        let mut cum = vec![0.0f64; n * w];
        for (s, slot) in chain.iter().enumerate() {
            for t in 0..frames {
                cum[s * w + t + 1] = cum[s * w + t] + self.emit(scores, t, slot.label);
            }
        }

        let ln_fact  = ln_factorials(frames);
        let run_cost = |s: usize, len: usize| -> f64 {
            if chain[s].optional {
                0.0
            } else {
                poisson_log_pmf(len, durations[chain[s].label], &ln_fact)
            }
        };

        const START: usize = usize::MAX;
        let mut best = vec![f64::NEG_INFINITY; n * w];
        // (previous slot or START, first frame of the run)
        let mut back = vec![(START, 0usize); n * w];

        for s in 0..n {
            let mut preds = Vec::with_capacity(3);
            if s == 0 || (s == 1 && chain[0].optional) {
                preds.push(START);
            }
            if s >= 1 {
                preds.push(s - 1);
            }
            if s >= 2 && chain[s - 1].optional {
                preds.push(s - 2);
            }

            for t in 1..=frames {
                for u in 0..t {
                    let run = cum[s * w + t] - cum[s * w + u] + run_cost(s, t - u);
                    for &p in &preds {
                        let before = match p {
                            START if u == 0 => 0.0,
                            START           => continue,
                            p               => best[p * w + u],
                        };
                        if before == f64::NEG_INFINITY {
                            continue;
                        }
                        let cand = before + run;
                        if cand > best[s * w + t] {
                            best[s * w + t] = cand;
                            back[s * w + t] = (p, u);
                        }
                    }
                }
            }
        }

        let last = n - 1;
        let mut end = last;
        if chain[last].optional && best[(last - 1) * w + frames] >= best[last * w + frames] {
            end = last - 1;
        }
        if best[end * w + frames] == f64::NEG_INFINITY {
            return None;
        }

        let mut labels = vec![0usize; frames];
        let (mut s, mut t) = (end, frames);
        loop {
            let (p, u) = back[s * w + t];
            labels[u..t].fill(chain[s].label);
            if p == START {
                break;
            }
            s = p;
            t = u;
        }
        Some(labels)
    }
}

/// ln(i!) for i in 0..=n.
fn ln_factorials(n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(n + 1);
    out.push(0.0);
    for i in 1..=n {
        out.push(out[i - 1] + (i as f64).ln());
    }
    out
}

/// ln P(len) under a Poisson length model with mean λ (at least one frame).
fn poisson_log_pmf(len: usize, mean: f64, ln_fact: &[f64]) -> f64 {
    let lambda = if mean.is_finite() { mean.max(1.0) } else { 1.0 };
    len as f64 * lambda.ln() - lambda - ln_fact[len]
}

fn validate_prior(prior: &DecodePrior, classes: usize) -> Result<(), DecodeError> {
    if prior.order.is_empty() {
        return Err(DecodeError::EmptyOrder);
    }
    let mut seen = vec![false; classes];
    for &label in prior.order.iter().chain(prior.background.iter()) {
        if label >= classes {
            return Err(DecodeError::LabelOutOfRange { label, classes });
        }
        if seen[label] {
            return Err(DecodeError::DuplicateLabel { label });
        }
        seen[label] = true;
    }
    if let Some(durations) = &prior.mean_durations {
        if durations.len() != classes {
            return Err(DecodeError::DurationCount { expected: classes, actual: durations.len() });
        }
    }
    Ok(())
}

fn build_chain(order: &[usize], background: Option<usize>) -> Vec<ChainSlot> {
    let mut chain = Vec::with_capacity(order.len() * 2 + 1);
    for &label in order {
        if let Some(bg) = background {
            chain.push(ChainSlot { label: bg, optional: true });
        }
        chain.push(ChainSlot { label, optional: false });
    }
    if let Some(bg) = background {
        chain.push(ChainSlot { label: bg, optional: true });
    }
    chain
}
