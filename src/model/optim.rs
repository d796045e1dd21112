use ndarray::{Array, Array1, Array2, Dimension, Zip};

use super::network::{LinearGrad, LsdNetwork};

// ---------------------------------------------------------------------------
// Adam
// ---------------------------------------------------------------------------

/// Adam with bias correction, no weight decay.
///
/// Moment estimates live in the optimizer; dropping it and building a new
/// one resets them while the network keeps its parameters.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    moments: Vec<LayerMoments>,
}

#[derive(Debug, Clone)]
struct LayerMoments {
    m_weight: Array2<f64>,
    v_weight: Array2<f64>,
    m_bias: Array1<f64>,
    v_bias: Array1<f64>,
}

impl Adam {
    /// Optimizer with the usual defaults (β1 0.9, β2 0.999, ε 1e-8) and zeroed
    /// moments shaped like `network`'s parameters.
    pub fn new(lr: f64, network: &LsdNetwork) -> Self {
        let moments = network
            .layers()
            .iter()
            .map(|l| LayerMoments {
                m_weight: Array::zeros(l.weight.raw_dim()),
                v_weight: Array::zeros(l.weight.raw_dim()),
                m_bias: Array::zeros(l.bias.raw_dim()),
                v_bias: Array::zeros(l.bias.raw_dim()),
            })
            .collect();
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            moments,
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> i32 {
        self.step
    }

    /// Apply one update from `grads` (one entry per layer, in layer order).
    pub fn step(&mut self, network: &mut LsdNetwork, grads: &[LinearGrad]) {
        debug_assert_eq!(grads.len(), self.moments.len());
        self.step += 1;

        let bias_correction1 = 1.0 - self.beta1.powi(self.step);
        let bias_correction2 = 1.0 - self.beta2.powi(self.step);
        let rule = UpdateRule {
            step_size: self.lr / bias_correction1,
            sqrt_bias_correction2: bias_correction2.sqrt(),
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
        };

        for ((layer, grad), moments) in network
            .layers_mut()
            .iter_mut()
            .zip(grads)
            .zip(&mut self.moments)
        {
            rule.apply(&mut layer.weight, &grad.weight, &mut moments.m_weight, &mut moments.v_weight);
            rule.apply(&mut layer.bias, &grad.bias, &mut moments.m_bias, &mut moments.v_bias);
        }
    }
}

struct UpdateRule {
    step_size: f64,
    sqrt_bias_correction2: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
}

impl UpdateRule {
    fn apply<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        Zip::from(param)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let denom = v.sqrt() / self.sqrt_bias_correction2 + self.epsilon;
                *p -= self.step_size * *m / denom;
            });
    }
}
