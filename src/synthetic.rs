//! Synthetic photoacoustic data for demos and tests.
//!
//! Spectra follow a two-chromophore model: the absorbed energy at each
//! wavelength is a mix of deoxy- and oxy-haemoglobin absorption weighted by
//! sO2, scaled by a random concentration, tilted by a random fluence slope
//! and perturbed by multiplicative Gaussian noise. The curves are smooth
//! stand-ins shaped like the real ones (deoxy dominant below the ~800 nm
//! isosbestic point with a shoulder at 760 nm, oxy dominant above), not
//! tabulated extinction coefficients.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::data::model::{
    wavelength_nm, LabelledSpectra, PixelCoord, Spectrum, FULL_SPECTRUM_LEN, MEASURED_INDICES,
};

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Relative absorption of deoxy-haemoglobin at `nm`.
pub fn deoxy_absorption(nm: f64) -> f64 {
    0.25 + 1.2 * (-(nm - 700.0) / 45.0).exp() + gaussian(nm, 760.0, 12.0, 0.35)
}

/// Relative absorption of oxy-haemoglobin at `nm`.
pub fn oxy_absorption(nm: f64) -> f64 {
    0.12 + 0.38 * (nm - 700.0) / 200.0 + gaussian(nm, 920.0, 60.0, 0.25)
}

/// Noise and nuisance parameters of the spectrum simulator.
#[derive(Debug, Clone, Copy)]
pub struct SpectrumModel {
    /// Relative standard deviation of per-channel noise.
    pub noise: f64,
    /// Maximum fluence slope per 100 nm, drawn uniformly in ±range.
    pub fluence_tilt: f64,
}

impl Default for SpectrumModel {
    fn default() -> Self {
        Self {
            noise: 0.01,
            fluence_tilt: 0.05,
        }
    }
}

impl SpectrumModel {
    /// Simulate one spectrum sampled at `wavelengths` (nm).
    pub fn spectrum<R: Rng + ?Sized>(&self, so2: f64, wavelengths: &[f64], rng: &mut R) -> Spectrum {
        let concentration = rng.gen_range(0.5..2.0);
        let tilt = if self.fluence_tilt > 0.0 {
            rng.gen_range(-self.fluence_tilt..self.fluence_tilt)
        } else {
            0.0
        };
        let noise = Normal::new(0.0, self.noise.max(0.0)).ok();

        wavelengths
            .iter()
            .map(|&nm| {
                let absorption = so2 * oxy_absorption(nm) + (1.0 - so2) * deoxy_absorption(nm);
                let fluence = 1.0 + tilt * (nm - 800.0) / 100.0;
                let jitter = noise.as_ref().map_or(0.0, |n| n.sample(&mut *rng));
                concentration * fluence * absorption * (1.0 + jitter)
            })
            .collect()
    }
}

/// Wavelengths of the full 41-channel spectrum.
pub fn full_wavelengths() -> Vec<f64> {
    (0..FULL_SPECTRUM_LEN).map(wavelength_nm).collect()
}

/// Wavelengths measured in the in-vivo scans.
pub fn measured_wavelengths() -> Vec<f64> {
    MEASURED_INDICES.iter().map(|&i| wavelength_nm(i)).collect()
}

/// `n` full spectra with sO2 labels drawn uniformly from [0.05, 1.0].
pub fn labelled_split(n: usize, model: &SpectrumModel, seed: u64) -> LabelledSpectra {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let wavelengths = full_wavelengths();
    let mut spectra = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for _ in 0..n {
        let so2 = rng.gen_range(0.05..=1.0);
        spectra.push(model.spectrum(so2, &wavelengths, &mut rng));
        labels.push(so2);
    }
    LabelledSpectra { spectra, labels }
}

// ---------------------------------------------------------------------------
// Gas challenge
// ---------------------------------------------------------------------------

/// Layout and response of a simulated gas-challenge scan.
#[derive(Debug, Clone)]
pub struct ChallengeModel {
    pub width: u32,
    pub height: u32,
    /// Offset of the pixel grid inside the image.
    pub origin: PixelCoord,
    pub timesteps: usize,
    /// Timesteps before the breathing gas is switched.
    pub baseline_timesteps: usize,
    /// Final sO2 rise of non-tumour pixels after the switch.
    pub healthy_response: f64,
    /// Final sO2 rise of tumour pixels after the switch.
    pub tumour_response: f64,
    pub spectrum: SpectrumModel,
}

impl Default for ChallengeModel {
    fn default() -> Self {
        Self {
            width: 40,
            height: 30,
            origin: PixelCoord::new(100, 100),
            timesteps: 93,
            baseline_timesteps: 10,
            healthy_response: 0.15,
            tumour_response: 0.03,
            spectrum: SpectrumModel::default(),
        }
    }
}

/// A simulated scan: one frame of pixel spectra per timestep.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub frames: Vec<Vec<Spectrum>>,
    pub pixel_coords: Vec<PixelCoord>,
    pub tumour_coords: Vec<PixelCoord>,
}

impl ChallengeModel {
    /// Pixels inside the ellipse centred in the grid are tumour.
    fn is_tumour(&self, col: u32, row: u32) -> bool {
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;
        let dx = (col as f64 + 0.5 - cx) / (self.width as f64 / 4.0);
        let dy = (row as f64 + 0.5 - cy) / (self.height as f64 / 4.0);
        dx * dx + dy * dy <= 1.0
    }

    pub fn simulate(&self, seed: u64) -> Challenge {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let wavelengths = measured_wavelengths();

        let mut pixel_coords = Vec::new();
        let mut tumour_coords = Vec::new();
        let mut baselines = Vec::new();
        let mut responses = Vec::new();
        for row in 0..self.height {
            for col in 0..self.width {
                let coord = PixelCoord::new(self.origin.x + col, self.origin.y + row);
                let tumour = self.is_tumour(col, row);
                pixel_coords.push(coord);
                if tumour {
                    tumour_coords.push(coord);
                }
                baselines.push(if tumour {
                    rng.gen_range(0.3..0.5)
                } else {
                    rng.gen_range(0.5..0.75)
                });
                responses.push(if tumour {
                    self.tumour_response
                } else {
                    self.healthy_response
                });
            }
        }

        // sO2 rises exponentially towards baseline + response after the switch.
        let frames = (0..self.timesteps)
            .map(|t| {
                let progress = if t < self.baseline_timesteps {
                    0.0
                } else {
                    1.0 - (-((t - self.baseline_timesteps) as f64) / 8.0).exp()
                };
                baselines
                    .iter()
                    .zip(&responses)
                    .map(|(&b, &r)| {
                        let so2 = (b + r * progress).clamp(0.0, 1.0);
                        self.spectrum.spectrum(so2, &wavelengths, &mut rng)
                    })
                    .collect()
            })
            .collect();

        Challenge {
            frames,
            pixel_coords,
            tumour_coords,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocess::{select, WavelengthSelection};

    #[test]
    fn split_is_seeded_and_in_range() {
        let model = SpectrumModel::default();
        let a = labelled_split(50, &model, 3);
        let b = labelled_split(50, &model, 3);
        assert_eq!(a.spectra, b.spectra);
        assert!(a.labels.iter().all(|&l| (0.05..=1.0).contains(&l)));
        assert!(a.spectra.iter().all(|s| s.len() == FULL_SPECTRUM_LEN));

        let selection = WavelengthSelection::new(&MEASURED_INDICES, FULL_SPECTRUM_LEN).unwrap();
        assert!(a.spectra.iter().all(|s| select(s, &selection).is_ok()));
    }

    #[test]
    fn oxygenation_changes_spectral_shape() {
        let model = SpectrumModel {
            noise: 0.0,
            fluence_tilt: 0.0,
        };
        let nm = measured_wavelengths();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let low = model.spectrum(0.1, &nm, &mut rng);
        let high = model.spectrum(0.9, &nm, &mut rng);
        // Red end relative to 700 nm grows with sO2.
        assert!(high[9] / high[0] > low[9] / low[0]);
    }

    #[test]
    fn challenge_layout() {
        let model = ChallengeModel {
            width: 8,
            height: 6,
            timesteps: 12,
            ..ChallengeModel::default()
        };
        let scan = model.simulate(1);
        assert_eq!(scan.frames.len(), 12);
        assert!(scan.frames.iter().all(|f| f.len() == 48));
        assert_eq!(scan.frames[0][0].len(), MEASURED_INDICES.len());
        assert_eq!(scan.pixel_coords.len(), 48);
        assert!(!scan.tumour_coords.is_empty());
        assert!(scan.tumour_coords.len() < 48);
        assert!(scan.tumour_coords.iter().all(|c| scan.pixel_coords.contains(c)));
    }
}
