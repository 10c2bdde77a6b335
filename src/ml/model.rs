// ============================================================
// Layer 5 — Model Architectures
// ============================================================
// Two small MLPs, both built from seeded weights:
//
//   SubactionClassifier     x → Linear(D, 2D) → ReLU → Linear(2D, K)
//                           Output: logits [batch, K]; the scorer
//                           applies softmax on top.
//
//   TemporalEmbeddingModel  x → Linear(D, E) → sigmoid → Linear(E, 1)
//                           Trained to regress each frame's relative
//                           time; the sigmoid activation [batch, E]
//                           is the embedding.
//
// Weight initialisation:
//   Burn's own initialisers draw from the backend RNG, which is
//   process-global. Instead every weight is drawn from a StdRng
//   seeded by the caller: Normal(0, std), biases zero.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{relu, sigmoid},
};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct SubactionClassifierConfig {
    pub input_dim:   usize,
    pub num_classes: usize,
    #[config(default = 0.01)]
    pub init_std:    f64,
}

impl SubactionClassifierConfig {
    pub fn hidden_dim(&self) -> usize {
        self.input_dim * 2
    }

    pub fn init<B: Backend>(&self, seed: u64, device: &B::Device) -> SubactionClassifier<B> {
        let mut rng = StdRng::seed_from_u64(seed);
        let fc      = seeded_linear(self.input_dim, self.hidden_dim(), self.init_std, &mut rng, device);
        let out_fc  = seeded_linear(self.hidden_dim(), self.num_classes, self.init_std, &mut rng, device);
        SubactionClassifier { fc, out_fc }
    }
}

#[derive(Module, Debug)]
pub struct SubactionClassifier<B: Backend> {
    pub fc:     Linear<B>,
    pub out_fc: Linear<B>,
}

impl<B: Backend> SubactionClassifier<B> {
    /// x: [batch, D] → logits: [batch, K]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.out_fc.forward(relu(self.fc.forward(x)))
    }
}

#[derive(Config, Debug)]
pub struct TemporalEmbeddingConfig {
    pub input_dim: usize,
    pub embed_dim: usize,
    #[config(default = 0.01)]
    pub init_std:  f64,
}

impl TemporalEmbeddingConfig {
    pub fn init<B: Backend>(&self, seed: u64, device: &B::Device) -> TemporalEmbeddingModel<B> {
        let mut rng = StdRng::seed_from_u64(seed);
        let fc      = seeded_linear(self.input_dim, self.embed_dim, self.init_std, &mut rng, device);
        let head    = seeded_linear(self.embed_dim, 1, self.init_std, &mut rng, device);
        TemporalEmbeddingModel { fc, head }
    }
}

#[derive(Module, Debug)]
pub struct TemporalEmbeddingModel<B: Backend> {
    pub fc:   Linear<B>,
    pub head: Linear<B>,
}

impl<B: Backend> TemporalEmbeddingModel<B> {
    /// x: [batch, D] → embedding: [batch, E]
    pub fn embed(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        sigmoid(self.fc.forward(x))
    }

    /// x: [batch, D] → predicted relative time: [batch, 1]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        self.head.forward(self.embed(x))
    }
}

/// A Linear layer with weights drawn from `rng` and a zero bias.
fn seeded_linear<B: Backend>(
    d_input:  usize,
    d_output: usize,
    std:      f64,
    rng:      &mut StdRng,
    device:   &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(d_input, d_output).init(device);

    let count = d_input * d_output;
    // a negative or NaN std leaves the weights at zero
    let weights: Vec<f32> = match Normal::new(0.0f32, std as f32) {
        Ok(normal) => (0..count).map(|_| normal.sample(rng)).collect(),
        Err(_)     => vec![0.0; count],
    };

    // Burn stores Linear weights as [d_input, d_output]
    linear.weight = Param::from_tensor(
        Tensor::<B, 1>::from_floats(weights.as_slice(), device).reshape([d_input, d_output]),
    );
    linear.bias = Some(Param::from_tensor(Tensor::<B, 1>::zeros([d_output], device)));
    linear
}
