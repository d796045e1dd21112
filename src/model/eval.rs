use ndarray::{Array1, ArrayView1, Axis};
use serde::Serialize;

use super::network::Regressor;
use crate::data::preprocess::ReducedSet;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Loss
// ---------------------------------------------------------------------------

/// Mean absolute error.
pub fn l1_loss(predictions: ArrayView1<'_, f64>, labels: ArrayView1<'_, f64>) -> f64 {
    (&predictions - &labels).mapv(f64::abs).mean().unwrap_or(f64::NAN)
}

/// Mean absolute error and its gradient with respect to each prediction
/// (`sign(pred - label) / n`, zero where they are equal).
pub fn l1_loss_with_grad(
    predictions: ArrayView1<'_, f64>,
    labels: ArrayView1<'_, f64>,
) -> (f64, Array1<f64>) {
    let diff = &predictions - &labels;
    let n = diff.len() as f64;
    let loss = diff.mapv(f64::abs).sum() / n;
    let grad = diff.mapv(|d| {
        if d > 0.0 {
            1.0 / n
        } else if d < 0.0 {
            -1.0 / n
        } else {
            0.0
        }
    });
    (loss, grad)
}

// ---------------------------------------------------------------------------
// Relative-error statistics
// ---------------------------------------------------------------------------

/// Quartiles of the absolute relative error `|pred - label| / |label|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

impl ErrorSummary {
    /// Interquartile range.
    pub fn iqr(&self) -> f64 {
        self.q75 - self.q25
    }
}

/// Element-wise absolute relative error. Any zero label is rejected.
pub fn relative_errors(
    predictions: ArrayView1<'_, f64>,
    labels: ArrayView1<'_, f64>,
) -> Result<Array1<f64>> {
    if let Some(pos) = labels.iter().position(|&l| l == 0.0) {
        return Err(PipelineError::ZeroLabel(pos));
    }
    Ok(ndarray::Zip::from(&predictions)
        .and(&labels)
        .map_collect(|&p, &l| ((p - l) / l).abs()))
}

/// Quantile `q` in [0, 1] of already sorted values, linearly interpolated
/// between the two nearest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

/// Lower of the two middle values for an even count, the middle value
/// otherwise.
pub fn lower_median_sorted(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        n => sorted[(n - 1) / 2],
    }
}

/// Ascending copy; NaNs sort last.
fn sorted(values: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Median and quartiles of already sorted values.
pub fn summarize_sorted(sorted: &[f64]) -> ErrorSummary {
    ErrorSummary {
        q25: quantile_sorted(sorted, 0.25),
        median: quantile_sorted(sorted, 0.5),
        q75: quantile_sorted(sorted, 0.75),
    }
}

// ---------------------------------------------------------------------------
// Evaluation routine
// ---------------------------------------------------------------------------

/// Result of running a model over a held-out split.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Mean absolute error over the whole split.
    pub loss: f64,
    pub relative_error: ErrorSummary,
    /// Median relative error without interpolation (the lower middle value
    /// for an even count). Tracked per epoch during training.
    pub lower_median_error: f64,
    /// Predictions in split order.
    pub predictions: Vec<f64>,
}

/// Run `model` over `data` in chunks of `batch_size` rows, concatenate the
/// predictions and score them against the labels.
pub fn evaluate<R: Regressor + ?Sized>(
    model: &R,
    data: &ReducedSet,
    batch_size: usize,
) -> Result<Evaluation> {
    if data.is_empty() {
        return Err(PipelineError::EmptyInput("evaluation split"));
    }
    if data.inputs.ncols() != model.input_width() {
        return Err(PipelineError::ShapeMismatch {
            what: "model input width",
            expected: model.input_width(),
            actual: data.inputs.ncols(),
        });
    }

    let mut predictions = Vec::with_capacity(data.len());
    for chunk in data.inputs.axis_chunks_iter(Axis(0), batch_size.max(1)) {
        predictions.extend(model.predict(chunk).iter().copied());
    }
    let predictions = Array1::from(predictions);

    let errors = sorted(relative_errors(predictions.view(), data.labels.view())?.view());
    Ok(Evaluation {
        loss: l1_loss(predictions.view(), data.labels.view()),
        relative_error: summarize_sorted(&errors),
        lower_median_error: lower_median_sorted(&errors),
        predictions: predictions.to_vec(),
    })
}
