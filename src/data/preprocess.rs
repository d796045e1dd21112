use std::collections::BTreeSet;

use ndarray::{Array1, Array2, ArrayView1};

use super::model::LabelledSpectra;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Normalizer: z-score a spectrum
// ---------------------------------------------------------------------------

/// Relative spread below which a spectrum is treated as constant.
const MIN_RELATIVE_STD: f64 = 1e-12;

/// Z-score a spectrum: `(x - mean) / std` with the population standard
/// deviation.
///
/// Returns [`PipelineError::DegenerateInput`] for fewer than two values,
/// any non-finite value, or a constant spectrum.
pub fn normalize(spectrum: &[f64]) -> Result<Vec<f64>> {
    if spectrum.len() < 2 {
        return Err(PipelineError::DegenerateInput("fewer than two values"));
    }
    if spectrum.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::DegenerateInput("non-finite value"));
    }

    let n = spectrum.len() as f64;
    let mean = spectrum.iter().sum::<f64>() / n;
    let variance = spectrum.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    let scale = spectrum.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if std <= MIN_RELATIVE_STD * scale {
        return Err(PipelineError::DegenerateInput("zero standard deviation"));
    }

    Ok(spectrum.iter().map(|v| (v - mean) / std).collect())
}

// ---------------------------------------------------------------------------
// WavelengthSelection: validated channel subset
// ---------------------------------------------------------------------------

/// Ordered, validated subset of channel indices into a full spectrum.
///
/// Built once per run and applied to every split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavelengthSelection {
    indices: Vec<usize>,
    spectrum_len: usize,
}

impl WavelengthSelection {
    /// Validate `indices` against spectra of `spectrum_len` channels.
    pub fn new(indices: &[usize], spectrum_len: usize) -> Result<Self> {
        if indices.is_empty() {
            return Err(PipelineError::EmptySelection);
        }
        let mut seen = BTreeSet::new();
        for &index in indices {
            if index >= spectrum_len {
                return Err(PipelineError::IndexOutOfRange {
                    index,
                    len: spectrum_len,
                });
            }
            if !seen.insert(index) {
                return Err(PipelineError::DuplicateIndex(index));
            }
        }
        Ok(Self {
            indices: indices.to_vec(),
            spectrum_len,
        })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Length of the full spectra this selection applies to.
    pub fn spectrum_len(&self) -> usize {
        self.spectrum_len
    }

    /// Width of a reduced spectrum.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Selector and batcher
// ---------------------------------------------------------------------------

/// Pick the selected channels (in selection order) and normalize them.
pub fn select(spectrum: &[f64], selection: &WavelengthSelection) -> Result<Vec<f64>> {
    if spectrum.len() != selection.spectrum_len {
        return Err(PipelineError::ShapeMismatch {
            what: "spectrum length",
            expected: selection.spectrum_len,
            actual: spectrum.len(),
        });
    }
    let subset: Vec<f64> = selection.indices.iter().map(|&i| spectrum[i]).collect();
    normalize(&subset)
}

/// Reduce every spectrum of a collection into one row of a matrix.
///
/// Row order and count match the input; the first failing spectrum aborts
/// with its position attached.
pub fn batch(spectra: &[Vec<f64>], selection: &WavelengthSelection) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((spectra.len(), selection.len()));
    for (row, spectrum) in spectra.iter().enumerate() {
        let reduced = select(spectrum, selection).map_err(|e| e.at_row(row))?;
        out.row_mut(row).assign(&ArrayView1::from(&reduced[..]));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// ReducedSet – network-ready split
// ---------------------------------------------------------------------------

/// A labelled split after selection and normalization: one input row per
/// spectrum, labels in the same order.
#[derive(Debug, Clone)]
pub struct ReducedSet {
    pub inputs: Array2<f64>,
    pub labels: Array1<f64>,
}

impl ReducedSet {
    /// Run the batcher over a labelled split.
    pub fn from_split(split: &LabelledSpectra, selection: &WavelengthSelection) -> Result<Self> {
        let inputs = batch(&split.spectra, selection)?;
        Ok(Self {
            inputs,
            labels: Array1::from(split.labels.clone()),
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Normalize already-reduced spectra (e.g. in-vivo pixels measured at the
/// selected wavelengths only) into one matrix.
pub fn normalize_rows(spectra: &[Vec<f64>], width: usize) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((spectra.len(), width));
    for (row, spectrum) in spectra.iter().enumerate() {
        if spectrum.len() != width {
            return Err(PipelineError::ShapeMismatch {
                what: "pixel spectrum length",
                expected: width,
                actual: spectrum.len(),
            }
            .at_row(row));
        }
        let normalized = normalize(spectrum).map_err(|e| e.at_row(row))?;
        out.row_mut(row).assign(&ArrayView1::from(&normalized[..]));
    }
    Ok(out)
}
