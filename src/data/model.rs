
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Wavelength axis
// ---------------------------------------------------------------------------

/// Number of channels in a full simulated spectrum.
pub const FULL_SPECTRUM_LEN: usize = 41;

/// First wavelength of the full spectrum, in nm.
pub const FIRST_WAVELENGTH_NM: f64 = 700.0;

/// Spacing of the full spectrum, in nm.
pub const WAVELENGTH_STEP_NM: f64 = 5.0;

/// Channels measured in the in-vivo scans: 700, 730, 750, 760, 770, 800,
/// 820, 840, 850 and 880 nm.
pub const MEASURED_INDICES: [usize; 10] = [0, 6, 10, 12, 14, 20, 24, 28, 30, 36];

/// Wavelength in nm of channel `index` of a full spectrum.
pub fn wavelength_nm(index: usize) -> f64 {
    FIRST_WAVELENGTH_NM + index as f64 * WAVELENGTH_STEP_NM
}

// ---------------------------------------------------------------------------
// Spectrum – raw absorption measurements for one sample or pixel
// ---------------------------------------------------------------------------

/// Raw initial-pressure spectrum. Immutable once loaded.
pub type Spectrum = Vec<f64>;

// ---------------------------------------------------------------------------
// LabelledSpectra – one dataset split
// ---------------------------------------------------------------------------

/// Spectra paired by position with their ground-truth sO2 fractions.
#[derive(Debug, Clone, Default)]
pub struct LabelledSpectra {
    pub spectra: Vec<Spectrum>,
    pub labels: Vec<f64>,
}

impl LabelledSpectra {
    /// Pair spectra with labels, rejecting a length mismatch.
    pub fn new(spectra: Vec<Spectrum>, labels: Vec<f64>) -> Result<Self> {
        if spectra.len() != labels.len() {
            return Err(PipelineError::ShapeMismatch {
                what: "number of labels",
                expected: spectra.len(),
                actual: labels.len(),
            });
        }
        Ok(Self { spectra, labels })
    }

    /// Number of spectra.
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// Whether the split is empty.
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

/// The three disjoint collections used for training.
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: LabelledSpectra,
    pub validation: LabelledSpectra,
    pub test: LabelledSpectra,
}

// ---------------------------------------------------------------------------
// PixelCoord – image position of a gas-challenge pixel
// ---------------------------------------------------------------------------

/// Column (`x`) and row (`y`) of a pixel in the reconstructed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: u32,
    pub y: u32,
}

impl PixelCoord {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_indices_map_to_scanner_wavelengths() {
        let nm: Vec<f64> = MEASURED_INDICES.iter().map(|&i| wavelength_nm(i)).collect();
        assert_eq!(
            nm,
            vec![700.0, 730.0, 750.0, 760.0, 770.0, 800.0, 820.0, 840.0, 850.0, 880.0]
        );
        assert_eq!(wavelength_nm(FULL_SPECTRUM_LEN - 1), 900.0);
    }

    #[test]
    fn labelled_spectra_rejects_unpaired_labels() {
        let err = LabelledSpectra::new(vec![vec![1.0, 2.0]], vec![0.5, 0.6]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ShapeMismatch { expected: 1, actual: 2, .. }
        ));
    }
}
