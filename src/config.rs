use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{FULL_SPECTRUM_LEN, MEASURED_INDICES};
use crate::data::preprocess::WavelengthSelection;

// ---------------------------------------------------------------------------
// Pipeline configuration (JSON file, every field defaulted)
// ---------------------------------------------------------------------------

/// Top-level run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub training: TrainingConfig,
    pub data: DataPaths,
    /// Absent → the gas-challenge phase is skipped.
    pub gas_challenge: Option<GasChallengeConfig>,
    /// Directory for result files; absent → results are only logged.
    pub output_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Read a JSON configuration file.  Relative paths inside it are
    /// resolved against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: PipelineConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Prefix every relative path with `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.data.train);
        fix(&mut self.data.validation);
        fix(&mut self.data.test);
        if let Some(out) = self.output_dir.as_mut() {
            fix(out);
        }
        if let Some(gas) = self.gas_challenge.as_mut() {
            fix(&mut gas.pixel_coords);
            fix(&mut gas.tumour_coords);
            let template = Path::new(&gas.timestep_template);
            if template.is_relative() {
                gas.timestep_template = base.join(template).to_string_lossy().into_owned();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Channels kept from each full spectrum, in order.
    pub wavelength_indices: Vec<usize>,
    /// Channels in a full spectrum.
    pub spectrum_len: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub base_learning_rate: f64,
    /// Learning-rate factor applied every second epoch.
    pub decay: f64,
    /// LeakyReLU slope for negative inputs.
    pub negative_slope: f64,
    /// Seeds parameter initialization and per-epoch shuffling.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            wavelength_indices: MEASURED_INDICES.to_vec(),
            spectrum_len: FULL_SPECTRUM_LEN,
            epochs: 100,
            batch_size: 1024,
            base_learning_rate: 0.01,
            decay: 0.9,
            negative_slope: 0.01,
            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Validated wavelength selection for this run.
    pub fn selection(&self) -> crate::error::Result<WavelengthSelection> {
        WavelengthSelection::new(&self.wavelength_indices, self.spectrum_len)
    }
}

// ---------------------------------------------------------------------------
// Input files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub train: PathBuf,
    pub validation: PathBuf,
    pub test: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            train: PathBuf::from("training.parquet"),
            validation: PathBuf::from("validation.parquet"),
            test: PathBuf::from("test.parquet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Gas challenge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasChallengeConfig {
    /// Path of one timestep file with `{t}` standing for the timestep index.
    pub timestep_template: String,
    pub timesteps: usize,
    /// Leading timesteps averaged into each pixel's baseline.
    pub baseline_timesteps: usize,
    pub pixel_coords: PathBuf,
    pub tumour_coords: PathBuf,
    pub histogram: HistogramConfig,
    /// `[width, height]` of the reconstructed image; enables per-timestep maps.
    pub map_size: Option<[usize; 2]>,
}

impl Default for GasChallengeConfig {
    fn default() -> Self {
        Self {
            timestep_template: "Timestep{t}.parquet".to_string(),
            timesteps: 93,
            baseline_timesteps: 10,
            pixel_coords: PathBuf::from("pixel_coords.csv"),
            tumour_coords: PathBuf::from("tumour_coords.csv"),
            histogram: HistogramConfig::default(),
            map_size: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    pub bins: usize,
    /// Range of the signed time-averaged ΔsO2 histograms, in percent.
    pub signed_range: [f64; 2],
    /// Range of the unsigned time-averaged |ΔsO2| histograms, in percent.
    pub unsigned_range: [f64; 2],
    /// Factor converting sO2 fractions to histogram units.
    pub scale: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bins: 100,
            signed_range: [-30.0, 30.0],
            unsigned_range: [0.0, 30.0],
            scale: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.training.epochs, 100);
        assert_eq!(config.training.batch_size, 1024);
        assert_eq!(config.training.wavelength_indices, MEASURED_INDICES.to_vec());
        assert!(config.gas_challenge.is_none());
        assert_eq!(config.training.selection().unwrap().len(), 10);
    }

    #[test]
    fn partial_sections_fill_in_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"training": {"epochs": 5, "seed": 7},
                "gas_challenge": {"timesteps": 20, "histogram": {"bins": 10}}}"#,
        )
        .unwrap();
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.base_learning_rate, 0.01);
        let gas = config.gas_challenge.unwrap();
        assert_eq!(gas.timesteps, 20);
        assert_eq!(gas.baseline_timesteps, 10);
        assert_eq!(gas.histogram.bins, 10);
        assert_eq!(gas.histogram.signed_range, [-30.0, 30.0]);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut config = PipelineConfig {
            gas_challenge: Some(GasChallengeConfig::default()),
            output_dir: Some(PathBuf::from("/abs/out")),
            ..Default::default()
        };
        config.resolve_relative_to(Path::new("/data/run"));
        assert_eq!(config.data.train, PathBuf::from("/data/run/training.parquet"));
        assert_eq!(config.output_dir, Some(PathBuf::from("/abs/out")));
        let gas = config.gas_challenge.unwrap();
        assert_eq!(gas.timestep_template, "/data/run/Timestep{t}.parquet");
    }
}
