use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::data::loader::load_spectra;
use crate::data::model::Spectrum;

/// Placeholder in a timestep path template replaced by the timestep index.
pub const TIMESTEP_PLACEHOLDER: &str = "{t}";

/// Supplies the raw per-pixel spectra of each gas-challenge timestep.
pub trait TimestepSource {
    fn timesteps(&self) -> usize;
    fn load(&self, timestep: usize) -> Result<Vec<Spectrum>>;
}

// ---------------------------------------------------------------------------
// One file per timestep
// ---------------------------------------------------------------------------

/// Timestep files named by a template such as `data/Timestep{t}.parquet`.
#[derive(Debug, Clone)]
pub struct TimestepFiles {
    template: String,
    count: usize,
}

impl TimestepFiles {
    pub fn new(template: &str, count: usize) -> Result<Self> {
        if !template.contains(TIMESTEP_PLACEHOLDER) {
            bail!("timestep template '{template}' has no '{TIMESTEP_PLACEHOLDER}' placeholder");
        }
        Ok(Self {
            template: template.to_string(),
            count,
        })
    }

    pub fn path(&self, timestep: usize) -> PathBuf {
        PathBuf::from(self.template.replace(TIMESTEP_PLACEHOLDER, &timestep.to_string()))
    }
}

impl TimestepSource for TimestepFiles {
    fn timesteps(&self) -> usize {
        self.count
    }

    fn load(&self, timestep: usize) -> Result<Vec<Spectrum>> {
        load_spectra(&self.path(timestep))
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

impl TimestepSource for Vec<Vec<Spectrum>> {
    fn timesteps(&self) -> usize {
        self.len()
    }

    fn load(&self, timestep: usize) -> Result<Vec<Spectrum>> {
        match self.get(timestep) {
            Some(frame) => Ok(frame.clone()),
            None => bail!("timestep {timestep} out of range ({} available)", self.len()),
        }
    }
}
