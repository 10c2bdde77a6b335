// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records segmentation accuracy to a CSV file, one row per
// accuracy-log entry (initial, every round, final).
//
// Columns:
//   - activity: the activity class the corpus belongs to
//   - tag:      initial | round_<i> | final
//   - mof:      Mean over Frames after Hungarian matching
//   - mean_iou: mean IoU over ground-truth classes
//   - frames:   frames with ground truth
//   - decoded:  videos segmented at this point
//   - skipped:  videos the decoder could not segment
//
// mof / mean_iou / frames are empty when no video has ground
// truth.
//
// Output file: <output>/metrics.csv
//
// Example CSV output:
//   activity,tag,mof,mean_iou,frames,decoded,skipped
//   coffee,initial,0.412300,0.281200,52311,32,0
//   coffee,round_1,0.455100,0.302400,52311,32,0
//   ...
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::application::accuracy_log::{AccuracyLog, RoundStats};

const HEADER: &str = "activity,tag,mof,mean_iou,frames,decoded,skipped";

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    pub activity: String,
    pub tag:      String,
    pub mof:      Option<f64>,
    pub mean_iou: Option<f64>,
    pub frames:   Option<usize>,
    pub decoded:  usize,
    pub skipped:  usize,
}

impl RoundMetrics {
    pub fn from_stats(activity: &str, stats: &RoundStats) -> Self {
        let eval = stats.evaluation.as_ref();
        Self {
            activity: activity.to_string(),
            tag:      stats.tag.to_string(),
            mof:      eval.map(|e| e.mof),
            mean_iou: eval.map(|e| e.mean_iou),
            frames:   eval.map(|e| e.frames),
            decoded:  stats.decoded_videos,
            skipped:  stats.skipped_videos.len(),
        }
    }

    fn csv_row(&self) -> String {
        let opt_f = |v: Option<f64>| v.map(|x| format!("{x:.6}")).unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{}",
            self.activity,
            self.tag,
            opt_f(self.mof),
            opt_f(self.mean_iou),
            self.frames.map(|f| f.to_string()).unwrap_or_default(),
            self.decoded,
            self.skipped,
        )
    }
}

/// Appends accuracy rows to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");

        // Appending across runs keeps one history per output dir
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &RoundMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;
        writeln!(f, "{}", m.csv_row())?;
        Ok(())
    }

    /// Write every entry of `log` past the first `skip` ones.
    pub fn log_entries(&self, activity: &str, log: &AccuracyLog, skip: usize) -> Result<()> {
        for stats in log.entries().iter().skip(skip) {
            self.log(&RoundMetrics::from_stats(activity, stats))?;
        }
        tracing::debug!(
            "Logged {} metric rows for '{}'",
            log.len().saturating_sub(skip), activity
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::accuracy_log::RoundTag;
    use crate::segmentation::accuracy::Evaluation;

    fn log() -> AccuracyLog {
        let mut log = AccuracyLog::new();
        log.push(RoundStats {
            tag:            RoundTag::Initial,
            evaluation:     Some(Evaluation { mof: 0.5, mean_iou: 0.25, frames: 40, matching: vec![] }),
            decoded_videos: 4,
            skipped_videos: vec![],
        });
        log.push(RoundStats {
            tag:            RoundTag::Round(1),
            evaluation:     None,
            decoded_videos: 3,
            skipped_videos: vec!["short".into()],
        });
        log
    }

    #[test]
    fn test_rows_are_appended() {
        let dir    = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log_entries("tea", &log(), 0).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![
            HEADER,
            "tea,initial,0.500000,0.250000,40,4,0",
            "tea,round_1,,,,3,1",
        ]);
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        MetricsLogger::new(dir.path()).unwrap().log_entries("a", &log(), 1).unwrap();
        MetricsLogger::new(dir.path()).unwrap().log_entries("b", &log(), 1).unwrap();

        let text = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().filter(|l| *l == HEADER).count(), 1);
        assert_eq!(text.lines().count(), 3);
    }
}
