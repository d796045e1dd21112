use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Regressor – anything mapping reduced spectra to sO2 estimates
// ---------------------------------------------------------------------------

/// Inference-only view of a model. `inputs` is `(rows, input_width)`, the
/// result has one estimate per row.
pub trait Regressor {
    fn input_width(&self) -> usize;
    fn predict(&self, inputs: ArrayView2<'_, f64>) -> Array1<f64>;
}

// ---------------------------------------------------------------------------
// Linear layer
// ---------------------------------------------------------------------------

/// Fully connected layer, `y = x · Wᵀ + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// `(out_features, in_features)`
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Linear {
    /// Uniform `±1/sqrt(in_features)` initialization for weights and bias.
    fn init(in_features: usize, out_features: usize, rng: &mut ChaCha8Rng) -> Self {
        let bound = 1.0 / (in_features as f64).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::from_shape_fn((out_features, in_features), |_| dist.sample(&mut *rng));
        let bias = Array1::from_shape_fn(out_features, |_| dist.sample(&mut *rng));
        Self { weight, bias }
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    fn forward(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        x.dot(&self.weight.t()) + &self.bias
    }
}

/// Gradient of the loss with respect to one [`Linear`] layer.
#[derive(Debug, Clone)]
pub struct LinearGrad {
    pub weight: Array2<f64>,
    pub bias: Array1<f64>,
}

// ---------------------------------------------------------------------------
// LsdNetwork
// ---------------------------------------------------------------------------

/// Number of hidden layers; each is twice the input width.
pub const HIDDEN_LAYERS: usize = 3;

/// Feed-forward sO2 regressor:
///
/// ```text
/// LeakyReLU → Linear(N, 2N) → LeakyReLU → Linear(2N, 2N)
///           → LeakyReLU → Linear(2N, 2N) → LeakyReLU → Linear(2N, 1)
/// ```
///
/// The activation precedes every linear layer, including the first, and the
/// output is unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct LsdNetwork {
    layers: Vec<Linear>,
    negative_slope: f64,
}

/// Intermediate values of one forward pass, kept for backpropagation.
pub struct ForwardPass {
    /// Input of the activation preceding each linear layer.
    pre_activation: Vec<Array2<f64>>,
    /// Output of that activation, i.e. the linear layer's input.
    activated: Vec<Array2<f64>>,
    pub output: Array1<f64>,
}

impl LsdNetwork {
    /// Fresh network for `input_width` channels; identical seeds give
    /// identical parameters.
    pub fn new(input_width: usize, negative_slope: f64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let hidden = 2 * input_width;

        let mut layers = Vec::with_capacity(HIDDEN_LAYERS + 1);
        layers.push(Linear::init(input_width, hidden, &mut rng));
        for _ in 1..HIDDEN_LAYERS {
            layers.push(Linear::init(hidden, hidden, &mut rng));
        }
        layers.push(Linear::init(hidden, 1, &mut rng));

        Self {
            layers,
            negative_slope,
        }
    }

    /// Build from explicit layers, checking that consecutive shapes chain
    /// and the last layer has a single output.
    pub fn from_layers(layers: Vec<Linear>, negative_slope: f64) -> Result<Self> {
        let first = layers.first().ok_or(PipelineError::EmptyInput("layer list"))?;
        let mut width = first.in_features();
        for layer in &layers {
            if layer.in_features() != width {
                return Err(PipelineError::ShapeMismatch {
                    what: "layer input width",
                    expected: width,
                    actual: layer.in_features(),
                });
            }
            if layer.bias.len() != layer.out_features() {
                return Err(PipelineError::ShapeMismatch {
                    what: "bias length",
                    expected: layer.out_features(),
                    actual: layer.bias.len(),
                });
            }
            width = layer.out_features();
        }
        if width != 1 {
            return Err(PipelineError::ShapeMismatch {
                what: "output width",
                expected: 1,
                actual: width,
            });
        }
        Ok(Self {
            layers,
            negative_slope,
        })
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Linear] {
        &mut self.layers
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weight.len() + l.bias.len())
            .sum()
    }

    fn leaky_relu(&self, x: &Array2<f64>) -> Array2<f64> {
        let slope = self.negative_slope;
        x.mapv(|v| if v > 0.0 { v } else { slope * v })
    }

    /// Forward pass that records what [`backward`](Self::backward) needs.
    pub fn forward_cached(&self, inputs: ArrayView2<'_, f64>) -> ForwardPass {
        let mut pre_activation = Vec::with_capacity(self.layers.len());
        let mut activated = Vec::with_capacity(self.layers.len());

        let mut h = inputs.to_owned();
        for layer in &self.layers {
            let a = self.leaky_relu(&h);
            let z = layer.forward(a.view());
            pre_activation.push(h);
            activated.push(a);
            h = z;
        }

        ForwardPass {
            pre_activation,
            activated,
            output: h.index_axis_move(Axis(1), 0),
        }
    }

    /// Backpropagate `grad_output` (dLoss/dOutput, one entry per row) through
    /// the recorded pass. Gradients are returned in layer order.
    pub fn backward(&self, pass: &ForwardPass, grad_output: ArrayView1<'_, f64>) -> Vec<LinearGrad> {
        let slope = self.negative_slope;
        let mut grads = Vec::with_capacity(self.layers.len());

        // dLoss/dz for the current layer's output, (rows, out_features)
        let mut grad = grad_output.insert_axis(Axis(1)).to_owned();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            grads.push(LinearGrad {
                weight: grad.t().dot(&pass.activated[i]),
                bias: grad.sum_axis(Axis(0)),
            });

            if i > 0 {
                let grad_activated = grad.dot(&layer.weight);
                grad = Zip::from(&grad_activated)
                    .and(&pass.pre_activation[i])
                    .map_collect(|&g, &h| if h > 0.0 { g } else { slope * g });
            }
        }

        grads.reverse();
        grads
    }
}

impl Regressor for LsdNetwork {
    fn input_width(&self) -> usize {
        self.layers[0].in_features()
    }

    fn predict(&self, inputs: ArrayView2<'_, f64>) -> Array1<f64> {
        let mut h = inputs.to_owned();
        for layer in &self.layers {
            h = layer.forward(self.leaky_relu(&h).view());
        }
        h.index_axis_move(Axis(1), 0)
    }
}
