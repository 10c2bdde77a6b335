// ============================================================
// Layer 5 — Temporal Embedding
// ============================================================
// Maps raw frame features into a space where frames that occur
// at similar relative times in their videos lie close together.
// Clustering then happens in this space instead of raw features.
//
// How the MLP embedding is learned:
//   target(frame) = local_index / video_len      ∈ [0, 1)
//   model         = Linear(D, E) → sigmoid → Linear(E, 1)
//   loss          = MSE(model(x), target)
//   embedding     = the sigmoid activation, shape [F, E]
//
// The embedding kind is chosen once from configuration and
// resolved to a Box<dyn Embedder>; the Corpus never branches
// on the kind again.
//
// A trained MLP is saved next to the activity's checkpoint
// (embedding.mpk.gz + embedding.json) and can be loaded by a
// later run instead of being retrained.
//
// Reference: Kukleva et al. (2019) §3.1 Continuous Temporal Embedding

use anyhow::{anyhow, bail, Context, Result};
use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{batcher::FrameBatcher, dataset::assemble_dataset, splitter::split_into_batches};
use crate::domain::{
    feature_store::{FeatureMatrix, FeatureStore},
    traits::Embedder,
    video::Video,
};
use crate::ml::{
    model::{TemporalEmbeddingConfig, TemporalEmbeddingModel},
    Device, InferBackend, TrainBackend,
};

/// Rows embedded per forward pass.
const EMBED_CHUNK: usize = 4096;

const WEIGHTS_FILE: &str = "embedding";
const CONFIG_FILE:  &str = "embedding.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpEmbeddingConfig {
    pub embed_dim:    usize,
    pub epochs:       usize,
    pub batch_size:   usize,
    pub lr:           f64,
    pub weight_decay: f64,
    pub init_std:     f64,
}

impl Default for MlpEmbeddingConfig {
    fn default() -> Self {
        Self {
            embed_dim:    30,
            epochs:       30,
            batch_size:   256,
            lr:           1e-3,
            weight_decay: 1e-4,
            init_std:     0.01,
        }
    }
}

/// Which embedding the pipeline uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingKind {
    Mlp(MlpEmbeddingConfig),
    Identity,
}

impl Default for EmbeddingKind {
    fn default() -> Self {
        EmbeddingKind::Mlp(MlpEmbeddingConfig::default())
    }
}

/// Resolve `kind` to an embedder: load the MLP from `pretrained`
/// when given, otherwise train it on the corpus.
pub fn build_embedder(
    kind:       &EmbeddingKind,
    videos:     &[Video],
    store:      &FeatureStore,
    seed:       u64,
    pretrained: Option<&Path>,
) -> Result<Box<dyn Embedder>> {
    match (kind, pretrained) {
        (EmbeddingKind::Identity, _) => Ok(Box::new(IdentityEmbedder)),
        (EmbeddingKind::Mlp(_), Some(dir)) => {
            let embedder = MlpEmbedder::load(dir)?;
            if embedder.input_dim() != store.dim() {
                bail!(
                    "embedding in '{}' expects {}-dim features, the corpus has {}",
                    dir.display(), embedder.input_dim(), store.dim()
                );
            }
            Ok(Box::new(embedder))
        }
        (EmbeddingKind::Mlp(cfg), None) => Ok(Box::new(MlpEmbedder::train(cfg, videos, store.matrix(), seed)?)),
    }
}

// ─── Identity ─────────────────────────────────────────────────────────────────
/// Keeps raw features.
pub struct IdentityEmbedder;

impl Embedder for IdentityEmbedder {
    fn name(&self) -> &str {
        "identity"
    }

    fn is_identity(&self) -> bool {
        true
    }

    fn embed(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        Ok(features.clone())
    }
}

// ─── MLP relative-time regression ─────────────────────────────────────────────
pub struct MlpEmbedder {
    model:  TemporalEmbeddingModel<InferBackend>,
    config: TemporalEmbeddingConfig,
    device: Device,
}

impl MlpEmbedder {
    pub fn train(
        cfg:      &MlpEmbeddingConfig,
        videos:   &[Video],
        features: &FeatureMatrix,
        seed:     u64,
    ) -> Result<Self> {
        let set = assemble_dataset(videos, features, |video, local, _| {
            Some(video.temporal_position(local))
        });
        if set.is_empty() {
            bail!("cannot train an embedding on zero frames");
        }

        let device = Device::default();
        tracing::info!(
            "Training temporal embedding: {} frames, {} → {} dims, {} epochs",
            set.len(), features.cols(), cfg.embed_dim, cfg.epochs
        );

        let config = TemporalEmbeddingConfig::new(features.cols(), cfg.embed_dim)
            .with_init_std(cfg.init_std);
        let mut model: TemporalEmbeddingModel<TrainBackend> = config.init(seed, &device);
        let mut optim = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as _)))
            .init();

        let mse     = MseLoss::new();
        let batcher = FrameBatcher::<TrainBackend>::new(device.clone());
        let mut rng = StdRng::seed_from_u64(seed);

        for epoch in 1..=cfg.epochs {
            let mut loss_sum = 0.0f64;
            let mut batches  = 0usize;

            for rows in split_into_batches(set.len(), cfg.batch_size, &mut rng) {
                let batch = batcher.regression(&set.features, &set.targets, &rows);
                let pred  = model.forward(batch.features);
                let loss  = mse.forward(pred, batch.targets, Reduction::Mean);

                let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
                if !loss_val.is_finite() {
                    bail!("embedding training diverged at epoch {epoch} (loss = {loss_val})");
                }
                loss_sum += loss_val;
                batches  += 1;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &model);
                model = optim.step(cfg.lr, model, grads);
            }

            tracing::debug!(
                "Embedding epoch {:>3}/{} | mse={:.5}",
                epoch, cfg.epochs, loss_sum / batches.max(1) as f64
            );
        }

        Ok(Self { model: model.valid(), config, device })
    }

    /// Feature width the model was trained on.
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&config_path)
            .with_context(|| format!("Cannot read '{}'", config_path.display()))?;
        let config: TemporalEmbeddingConfig = serde_json::from_str(&json)
            .with_context(|| format!("Malformed '{}'", config_path.display()))?;

        let device = Device::default();
        let path   = dir.join(WEIGHTS_FILE);
        let record = NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .load(path.clone(), &device)
            .with_context(|| format!("Cannot load embedding '{}'", path.display()))?;

        let model = config.init::<InferBackend>(0, &device).load_record(record);
        tracing::info!("Temporal embedding loaded from '{}'", dir.display());
        Ok(Self { model, config, device })
    }
}

impl Embedder for MlpEmbedder {
    fn name(&self) -> &str {
        "mlp"
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let path = dir.join(WEIGHTS_FILE);
        NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .record(self.model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save embedding to '{}'", path.display()))?;

        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(&self.config)?)
            .with_context(|| format!("Cannot write '{}'", config_path.display()))?;

        tracing::debug!("Saved temporal embedding to '{}'", dir.display());
        Ok(())
    }

    fn embed(&self, features: &FeatureMatrix) -> Result<FeatureMatrix> {
        let batcher = FrameBatcher::<InferBackend>::new(self.device.clone());
        let dim     = self.config.embed_dim;
        let mut out = Vec::with_capacity(features.rows() * dim);

        let mut start = 0;
        while start < features.rows() {
            let end   = (start + EMBED_CHUNK).min(features.rows());
            let chunk = features.slice_rows(start..end);
            let emb: Vec<f32> = self
                .model
                .embed(batcher.matrix(&chunk))
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow!("Cannot read embedding: {e:?}"))?;
            out.extend(emb);
            start = end;
        }

        Ok(FeatureMatrix::from_vec(features.rows(), dim, out)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> (Vec<Video>, FeatureStore) {
        let mut store  = FeatureStore::new();
        let mut videos = Vec::new();
        for (name, len) in [("a", 6usize), ("b", 9)] {
            let rows: Vec<Vec<f32>> = (0..len)
                .map(|i| vec![i as f32 / len as f32, 1.0 - i as f32 / len as f32])
                .collect();
            let range = store.push_video(&FeatureMatrix::from_rows(&rows).unwrap()).unwrap();
            videos.push(Video::new(name, range, None));
        }
        (videos, store)
    }

    #[test]
    fn test_identity_returns_input() {
        let (videos, store) = corpus();
        let embedder = build_embedder(&EmbeddingKind::Identity, &videos, &store, 0, None).unwrap();
        assert!(embedder.is_identity());
        assert_eq!(embedder.embed(store.matrix()).unwrap(), *store.matrix());
    }

    #[test]
    fn test_mlp_embedding_shape_and_range() {
        let (videos, store) = corpus();
        let kind = EmbeddingKind::Mlp(MlpEmbeddingConfig { embed_dim: 4, epochs: 2, batch_size: 4, ..Default::default() });
        let embedder = build_embedder(&kind, &videos, &store, 1, None).unwrap();
        let emb      = embedder.embed(store.matrix()).unwrap();

        assert!(!embedder.is_identity());
        assert_eq!((emb.rows(), emb.cols()), (15, 4));
        // sigmoid output
        assert!(emb.as_slice().iter().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_mlp_embedding_is_deterministic() {
        let (videos, store) = corpus();
        let cfg = MlpEmbeddingConfig { embed_dim: 3, epochs: 3, batch_size: 5, ..Default::default() };
        let a   = MlpEmbedder::train(&cfg, &videos, store.matrix(), 9).unwrap();
        let b   = MlpEmbedder::train(&cfg, &videos, store.matrix(), 9).unwrap();
        assert_eq!(a.embed(store.matrix()).unwrap(), b.embed(store.matrix()).unwrap());
    }

    #[test]
    fn test_saved_embedding_loads_identically() {
        let (videos, store) = corpus();
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = MlpEmbeddingConfig { embed_dim: 3, epochs: 2, batch_size: 4, ..Default::default() };
        let trained = MlpEmbedder::train(&cfg, &videos, store.matrix(), 4).unwrap();
        trained.save(dir.path()).unwrap();

        let kind   = EmbeddingKind::Mlp(cfg);
        let loaded = build_embedder(&kind, &videos, &store, 99, Some(dir.path())).unwrap();
        assert_eq!(loaded.embed(store.matrix()).unwrap(), trained.embed(store.matrix()).unwrap());
    }

    #[test]
    fn test_saved_embedding_rejects_other_feature_width() {
        let (videos, store) = corpus();
        let dir = tempfile::tempdir().unwrap();
        let cfg = MlpEmbeddingConfig { embed_dim: 2, epochs: 1, batch_size: 4, ..Default::default() };
        MlpEmbedder::train(&cfg, &videos, store.matrix(), 0).unwrap().save(dir.path()).unwrap();

        let wide = FeatureStore::from(FeatureMatrix::zeros(4, 5));
        let err  = build_embedder(&EmbeddingKind::Mlp(cfg), &videos, &wide, 0, Some(dir.path()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("2-dim"), "{err}");
    }

    #[test]
    fn test_missing_embedding_dir() {
        let (videos, store) = corpus();
        let dir = tempfile::tempdir().unwrap();
        let res = build_embedder(&EmbeddingKind::default(), &videos, &store, 0, Some(&dir.path().join("none")));
        assert!(res.is_err());
    }

    #[test]
    fn test_kind_serialises_with_tag() {
        let json = serde_json::to_string(&EmbeddingKind::Identity).unwrap();
        assert_eq!(json, r#"{"kind":"identity"}"#);
        let back: EmbeddingKind = serde_json::from_str(r#"{"kind":"mlp","embed_dim":8}"#).unwrap();
        assert!(matches!(back, EmbeddingKind::Mlp(MlpEmbeddingConfig { embed_dim: 8, epochs: 30, .. })));
    }
}
