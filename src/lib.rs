//! LSD: a small fully connected network that regresses blood oxygen
//! saturation (sO2) from z-scored multi-wavelength photoacoustic spectra,
//! with its training loop, evaluation and gas-challenge post-processing.

pub mod config;
pub mod data;
pub mod error;
pub mod gas;
pub mod model;
pub mod pipeline;
pub mod sink;
pub mod synthetic;

pub use error::{PipelineError, Result};
