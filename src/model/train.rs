use ndarray::Axis;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use super::eval::{evaluate, l1_loss_with_grad};
use super::network::{LsdNetwork, Regressor};
use super::optim::Adam;
use crate::config::TrainingConfig;
use crate::data::preprocess::{ReducedSet, WavelengthSelection};
use crate::error::{PipelineError, Result};

/// ChaCha stream used for per-epoch shuffling; stream 0 initializes weights.
const SHUFFLE_STREAM: u64 = 1;

// ---------------------------------------------------------------------------
// Learning-rate schedule
// ---------------------------------------------------------------------------

/// Step decay every second epoch: epochs `2k` and `2k + 1` both train at
/// `base * decay^k`.
pub fn learning_rate(epoch: usize, base: f64, decay: f64) -> f64 {
    base * decay.powi((epoch / 2) as i32)
}

// ---------------------------------------------------------------------------
// History and result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    /// Zero-based epoch index.
    pub epoch: usize,
    pub learning_rate: f64,
    /// Mean of the per-batch training losses.
    pub train_loss: f64,
    pub val_loss: f64,
    /// Validation median relative error, the lower middle value for an
    /// even count.
    pub val_median_error: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.train_loss).collect()
    }

    pub fn val_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.val_loss).collect()
    }
}

/// A network whose training has finished, with the wavelength selection it
/// was trained on. Read-only from here on.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    network: LsdNetwork,
    selection: WavelengthSelection,
    history: TrainingHistory,
}

impl TrainedModel {
    pub fn network(&self) -> &LsdNetwork {
        &self.network
    }

    pub fn selection(&self) -> &WavelengthSelection {
        &self.selection
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }
}

impl Regressor for TrainedModel {
    fn input_width(&self) -> usize {
        self.network.input_width()
    }

    fn predict(&self, inputs: ndarray::ArrayView2<'_, f64>) -> ndarray::Array1<f64> {
        self.network.predict(inputs)
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives the epoch loop. Everything random derives from `config.seed`, so
/// the same data and config always produce the same model.
pub struct Trainer<'a> {
    config: &'a TrainingConfig,
    selection: WavelengthSelection,
}

impl<'a> Trainer<'a> {
    pub fn new(config: &'a TrainingConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(PipelineError::EmptyInput("batch"));
        }
        Ok(Self {
            selection: config.selection()?,
            config,
        })
    }

    pub fn selection(&self) -> &WavelengthSelection {
        &self.selection
    }

    /// Initialize a network and train it for `config.epochs` epochs,
    /// evaluating on `validation` after every epoch.
    pub fn train(&self, train: &ReducedSet, validation: &ReducedSet) -> Result<TrainedModel> {
        let cfg = self.config;
        let width = self.selection.len();
        if train.is_empty() {
            return Err(PipelineError::EmptyInput("training split"));
        }
        for (what, set) in [("training inputs", train), ("validation inputs", validation)] {
            if set.inputs.ncols() != width {
                return Err(PipelineError::ShapeMismatch {
                    what,
                    expected: width,
                    actual: set.inputs.ncols(),
                });
            }
        }

        let mut network = LsdNetwork::new(width, cfg.negative_slope, cfg.seed);
        let mut shuffle_rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        shuffle_rng.set_stream(SHUFFLE_STREAM);

        log::info!(
            "Training {} parameters on {} spectra ({} validation), {} epochs, batch size {}",
            network.parameter_count(),
            train.len(),
            validation.len(),
            cfg.epochs,
            cfg.batch_size
        );

        let mut history = TrainingHistory::default();
        for epoch in 0..cfg.epochs {
            let lr = learning_rate(epoch, cfg.base_learning_rate, cfg.decay);
            // Moments do not carry over between epochs.
            let mut optimizer = Adam::new(lr, &network);

            let train_loss = train_epoch(
                &mut network,
                &mut optimizer,
                train,
                cfg.batch_size,
                &mut shuffle_rng,
            );
            let validation_result = evaluate(&network, validation, cfg.batch_size)?;

            if !train_loss.is_finite() || !validation_result.loss.is_finite() {
                log::warn!(
                    "EPOCH {}/{}: non-finite loss (train {train_loss}, val {})",
                    epoch + 1,
                    cfg.epochs,
                    validation_result.loss
                );
            }
            log::info!(
                "EPOCH {}/{} \t lr {:.5} \t train loss {:.3} \t val loss {:.3} \t median error fraction {:.4}",
                epoch + 1,
                cfg.epochs,
                lr,
                train_loss,
                validation_result.loss,
                validation_result.lower_median_error
            );

            history.epochs.push(EpochRecord {
                epoch,
                learning_rate: lr,
                train_loss,
                val_loss: validation_result.loss,
                val_median_error: validation_result.lower_median_error,
            });
        }

        Ok(TrainedModel {
            network,
            selection: self.selection.clone(),
            history,
        })
    }
}

/// One pass over `data` in shuffled mini-batches; returns the mean batch loss.
fn train_epoch(
    network: &mut LsdNetwork,
    optimizer: &mut Adam,
    data: &ReducedSet,
    batch_size: usize,
    rng: &mut ChaCha8Rng,
) -> f64 {
    let mut order: Vec<usize> = (0..data.len()).collect();
    order.shuffle(rng);

    let mut batch_losses = Vec::with_capacity(order.len().div_ceil(batch_size));
    for (i, rows) in order.chunks(batch_size).enumerate() {
        let inputs = data.inputs.select(Axis(0), rows);
        let labels = data.labels.select(Axis(0), rows);

        let pass = network.forward_cached(inputs.view());
        let (loss, grad_output) = l1_loss_with_grad(pass.output.view(), labels.view());
        let grads = network.backward(&pass, grad_output.view());
        optimizer.step(network, &grads);

        log::debug!("batch {i}: partial train loss {loss:.6}");
        batch_losses.push(loss);
    }

    batch_losses.iter().sum::<f64>() / batch_losses.len() as f64
}
