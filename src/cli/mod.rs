// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and delegates everything else to Layer 2.
//
// Two commands are supported:
//   1. `segment` — full pipeline for one or all activities
//   2. `resume`  — more refinement rounds from a checkpoint
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, ResumeArgs, SegmentArgs};

use crate::application::segment_use_case::ActivityResult;

#[derive(Parser, Debug)]
#[command(
    name = "ute-segment",
    version = "0.1.0",
    about = "Unsupervised temporal segmentation of activity videos into sub-activities."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the use case; the CLI layer never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Segment(args) => run_segment(args),
            Commands::Resume(args)  => run_resume(args),
        }
    }
}

fn run_segment(args: SegmentArgs) -> Result<()> {
    use crate::application::segment_use_case::SegmentUseCase;

    let config = args.into_config()?;
    tracing::info!("Segmenting features under: {}", config.dataset_root);

    let summary = SegmentUseCase::new(config).execute()?;

    println!();
    for result in &summary.results {
        print_result(result);
    }
    if let Some(mof) = summary.weighted_mof {
        println!("Frame-weighted MoF: {:.4}", mof);
    }
    Ok(())
}

fn run_resume(args: ResumeArgs) -> Result<()> {
    use crate::application::resume_use_case::ResumeUseCase;

    tracing::info!("Resuming from checkpoint: {}", args.checkpoint_dir);

    let result = ResumeUseCase::new(&args.checkpoint_dir, args.rounds).execute()?;
    println!();
    print_result(&result);
    Ok(())
}

fn print_result(r: &ActivityResult) {
    match r.final_mof {
        Some(mof) => println!("{:<14} MoF {:.4}  ({} frames, {} rounds)", r.activity, mof, r.frames, r.rounds),
        None      => println!("{:<14} no ground truth  ({} rounds)", r.activity, r.rounds),
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::segment_use_case::PipelineConfig;
    use crate::ml::embedder::EmbeddingKind;

    fn segment_config(argv: &[&str]) -> PipelineConfig {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Segment(args) => args.into_config().unwrap(),
            other => panic!("expected segment, got {other:?}"),
        }
    }

    #[test]
    fn test_segment_defaults_match_config_defaults() {
        let cfg = segment_config(&["ute-segment", "segment"]);
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn test_segment_flags() {
        let cfg = segment_config(&[
            "ute-segment", "segment",
            "--activity", "tea", "--rounds", "5", "--num-subactions", "7",
            "--identity-embedding", "--duration-prior", "--background-label", "0",
        ]);
        assert_eq!(cfg.activity, "tea");
        assert_eq!(cfg.rounds, 5);
        assert_eq!(cfg.num_subactions, Some(7));
        assert_eq!(cfg.embedding, EmbeddingKind::Identity);
        assert!(cfg.decoder.duration_prior);
        assert_eq!(cfg.decoder.background_label, Some(0));
    }

    #[test]
    fn test_config_file_takes_precedence() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"activity": "juice", "rounds": 2}"#).unwrap();

        let cfg = segment_config(&[
            "ute-segment", "segment", "--rounds", "9", "--config", path.to_str().unwrap(),
        ]);
        assert_eq!(cfg.activity, "juice");
        assert_eq!(cfg.rounds, 2);
    }

    #[test]
    fn test_resume_requires_checkpoint_dir() {
        assert!(Cli::try_parse_from(["ute-segment", "resume"]).is_err());
        let cli = Cli::try_parse_from(["ute-segment", "resume", "--checkpoint-dir", "output/tea"]).unwrap();
        match cli.command {
            Commands::Resume(args) => assert_eq!(args.rounds, 10),
            other => panic!("expected resume, got {other:?}"),
        }
    }
}
