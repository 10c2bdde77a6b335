// ============================================================
// Layer 4 — Feature Loader
// ============================================================
// Loads per-frame features (and ground truth, when present)
// from the Breakfast / 50 Salads text layout:
//
//   <root>/
//     features/
//       P03_cam01_P03_coffee.txt   ← one frame per line,
//       ...                          whitespace-separated floats
//     groundTruth/
//       P03_cam01_P03_coffee       ← one class name per line
//       ...                          (optional, evaluation only)
//     mapping/
//       mapping.txt                ← "<id> <class name>" per line
//
// A video belongs to an activity when its file stem contains the
// activity name; "all" selects every video. Files are visited in
// sorted order so global frame indices are reproducible.
//
// Feature and ground-truth files sometimes differ by a frame or
// two; both are truncated to the shorter length with a warning.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

use crate::data::preprocessor::Standardizer;
use crate::domain::{
    feature_store::{FeatureMatrix, FeatureStore},
    traits::{FeatureSource, LoadedCorpus},
    video::Video,
};

/// Activity selector that matches every video.
pub const ALL_ACTIVITIES: &str = "all";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{file}:{line}: cannot parse '{token}' as a number")]
    Parse { file: String, line: usize, token: String },

    #[error("{file}:{line}: {actual} values, expected {expected}")]
    RowWidth { file: String, line: usize, expected: usize, actual: usize },

    #[error("{file}:{line}: class '{label}' is not in the mapping")]
    UnknownLabel { file: String, line: usize, label: String },

    #[error("{file}:{line}: malformed mapping entry")]
    Mapping { file: String, line: usize },

    #[error("no feature files for activity '{activity}' under '{dir}'")]
    NoVideos { activity: String, dir: String },
}

/// Loads `.txt` frame features from a dataset root.
/// Implements the FeatureSource trait from Layer 3.
pub struct TxtFeatureLoader {
    root:      PathBuf,
    normalize: bool,
}

impl TxtFeatureLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), normalize: false }
    }

    /// Z-score every feature column over the loaded corpus.
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn features_dir(&self) -> PathBuf {
        self.root.join("features")
    }

    fn ground_truth_path(&self, stem: &str) -> Option<PathBuf> {
        let dir = self.root.join("groundTruth");
        [dir.join(stem), dir.join(format!("{stem}.txt"))]
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Read `mapping/mapping.txt`; an absent file means no ground truth.
    fn load_mapping(&self) -> Result<Option<HashMap<String, usize>>> {
        let path = self.root.join("mapping").join("mapping.txt");
        if !path.exists() {
            tracing::warn!("No mapping file at '{}' — ground truth disabled", path.display());
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;

        let mut mapping = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(id), Some(name)) = (parts.next(), parts.next()) else {
                return Err(LoadError::Mapping { file: path.display().to_string(), line: i + 1 }.into());
            };
            let id: usize = id
                .parse()
                .map_err(|_| LoadError::Mapping { file: path.display().to_string(), line: i + 1 })?;
            mapping.insert(name.to_string(), id);
        }
        tracing::debug!("Loaded {} class names from mapping", mapping.len());
        Ok(Some(mapping))
    }
}

impl FeatureSource for TxtFeatureLoader {
    fn load(&self, activity: &str) -> Result<LoadedCorpus> {
        let dir = self.features_dir();
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .filter(|p| activity == ALL_ACTIVITIES || file_stem(p).contains(activity))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(LoadError::NoVideos {
                activity: activity.to_string(),
                dir:      dir.display().to_string(),
            }
            .into());
        }

        let mapping = self.load_mapping()?;

        let mut store  = FeatureStore::new();
        let mut videos = Vec::with_capacity(files.len());

        for path in &files {
            let stem         = file_stem(path);
            let mut features = read_feature_file(path)?;

            let mut ground_truth = match (&mapping, self.ground_truth_path(&stem)) {
                (Some(mapping), Some(gt_path)) => Some(read_ground_truth(&gt_path, mapping)?),
                _ => None,
            };

            if let Some(gt) = ground_truth.as_mut() {
                if gt.len() != features.rows() {
                    let len = gt.len().min(features.rows());
                    tracing::warn!(
                        "'{}': {} feature frames vs {} ground-truth frames, truncating to {}",
                        stem, features.rows(), gt.len(), len
                    );
                    gt.truncate(len);
                    features = features.slice_rows(0..len);
                }
            }

            if features.is_empty() {
                tracing::warn!("Skipping '{}': no frames", stem);
                continue;
            }

            let range = store
                .push_video(&features)
                .with_context(|| format!("Feature width mismatch in '{}'", path.display()))?;
            tracing::debug!("Loaded: {} ({} frames)", stem, range.len());
            videos.push(Video::new(stem, range, ground_truth));
        }

        if self.normalize {
            let standardizer = Standardizer::fit(store.matrix());
            store = FeatureStore::from(standardizer.transform(store.matrix()));
        }

        tracing::info!(
            "Loaded {} videos / {} frames (dim {}) for activity '{}'",
            videos.len(), store.len(), store.dim(), activity
        );
        Ok(LoadedCorpus { videos, store })
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// Parse one frame per non-empty line.
fn read_feature_file(path: &Path) -> Result<FeatureMatrix> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    let file = path.display().to_string();

    let mut matrix = FeatureMatrix::default();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f32>().map_err(|_| LoadError::Parse {
                    file:  file.clone(),
                    line:  i + 1,
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<f32>, LoadError>>()?;

        let expected = if matrix.is_empty() { row.len() } else { matrix.cols() };
        matrix.push_row(&row).map_err(|_| LoadError::RowWidth {
            file: file.clone(),
            line: i + 1,
            expected,
            actual: row.len(),
        })?;
    }
    Ok(matrix)
}

/// One class name per line, mapped to its id.
fn read_ground_truth(path: &Path, mapping: &HashMap<String, usize>) -> Result<Vec<usize>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;

    text.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            let label = l.trim();
            mapping.get(label).copied().ok_or_else(|| {
                LoadError::UnknownLabel {
                    file:  path.display().to_string(),
                    line:  i + 1,
                    label: label.to_string(),
                }
                .into()
            })
        })
        .collect()
}
