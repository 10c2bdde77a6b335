// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `segment` and `resume`, and all
// their configurable flags.
//
// `segment --config run.json` reads a full PipelineConfig from
// JSON instead; the other flags are then ignored. Missing keys
// in the file fall back to the defaults.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::fs;

use crate::application::segment_use_case::PipelineConfig;
use crate::ml::{
    embedder::{EmbeddingKind, MlpEmbeddingConfig},
    trainer::ClassifierConfig,
};
use crate::segmentation::decoder::DecoderConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed, cluster and iteratively refine one or all activities
    Segment(SegmentArgs),

    /// Continue refinement from an activity's checkpoint directory
    Resume(ResumeArgs),
}

/// All arguments for the `segment` command.
#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// JSON file with a PipelineConfig; overrides every other flag
    #[arg(long)]
    pub config: Option<String>,

    /// Dataset root with features/, groundTruth/ and mapping/
    #[arg(long, default_value = "data/breakfast")]
    pub dataset_root: String,

    /// Where checkpoints, segmentations and metrics.csv go
    #[arg(long, default_value = "output")]
    pub output_dir: String,

    /// Activity to segment ("all" uses every video as one corpus)
    #[arg(long, default_value = "coffee")]
    pub activity: String,

    /// Segment each Breakfast activity as its own corpus
    #[arg(long)]
    pub all_activities: bool,

    /// Refinement rounds after the initial classifier
    #[arg(long, default_value_t = 30)]
    pub rounds: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of sub-activities K. Defaults to the number of
    /// ground-truth classes of the activity
    #[arg(long)]
    pub num_subactions: Option<usize>,

    /// Standardise every feature dimension before embedding
    #[arg(long)]
    pub normalize: bool,

    /// Stop refining once a round no longer changes the pseudo-labels
    #[arg(long)]
    pub early_stop: bool,

    /// Cluster the raw features instead of a learned temporal embedding
    #[arg(long)]
    pub identity_embedding: bool,

    /// Width of the temporal embedding
    #[arg(long, default_value_t = 30)]
    pub embed_dim: usize,

    /// Output directory of an earlier run; its trained embedding
    /// for each activity is loaded instead of trained again
    #[arg(long)]
    pub load_embedding: Option<String>,

    /// Epochs of the temporal embedding MLP
    #[arg(long, default_value_t = 30)]
    pub embed_epochs: usize,

    /// Classifier epochs per round
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Penalise segment lengths far from the cluster's mean duration
    #[arg(long)]
    pub duration_prior: bool,

    /// Sub-activity that may appear anywhere in the order
    #[arg(long)]
    pub background_label: Option<usize>,
}

impl SegmentArgs {
    /// The PipelineConfig for this run: the --config file when
    /// given, otherwise the flags.
    pub fn into_config(self) -> Result<PipelineConfig> {
        match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config file '{path}'"))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Malformed config file '{path}'"))
            }
            None => Ok(self.into()),
        }
    }
}

/// The application layer never sees clap types.
impl From<SegmentArgs> for PipelineConfig {
    fn from(a: SegmentArgs) -> Self {
        let embedding = if a.identity_embedding {
            EmbeddingKind::Identity
        } else {
            EmbeddingKind::Mlp(MlpEmbeddingConfig {
                embed_dim: a.embed_dim,
                epochs:    a.embed_epochs,
                ..Default::default()
            })
        };

        PipelineConfig {
            dataset_root:       a.dataset_root,
            output_dir:         a.output_dir,
            activity:           a.activity,
            all_activities:     a.all_activities,
            rounds:             a.rounds,
            seed:               a.seed,
            num_subactions:     a.num_subactions,
            normalize_features: a.normalize,
            early_stop:         a.early_stop,
            embedding,
            load_embedding:     a.load_embedding,
            classifier: ClassifierConfig {
                epochs:     a.epochs,
                batch_size: a.batch_size,
                lr:         a.lr,
                ..Default::default()
            },
            decoder: DecoderConfig {
                duration_prior:   a.duration_prior,
                background_label: a.background_label,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// All arguments for the `resume` command
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Checkpoint directory of one activity, e.g. output/coffee
    #[arg(long)]
    pub checkpoint_dir: String,

    /// Additional refinement rounds
    #[arg(long, default_value_t = 10)]
    pub rounds: usize,
}
