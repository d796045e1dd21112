use serde::Serialize;

use super::challenge::GroupedAggregates;
use crate::config::HistogramConfig;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

/// Equal-width histogram over a fixed range.
///
/// Bins are half-open `[lo, hi)` except the last, which also holds the upper
/// edge. Values outside the range and non-finite values are not counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` edges.
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn new(bins: usize, [lo, hi]: [f64; 2]) -> Result<Self> {
        if bins == 0 {
            return Err(PipelineError::InvalidHistogram("zero bins"));
        }
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(PipelineError::InvalidHistogram("range must be finite and increasing"));
        }
        let mut edges: Vec<f64> = (0..bins)
            .map(|i| lo + (hi - lo) * i as f64 / bins as f64)
            .collect();
        edges.push(hi);
        Ok(Self {
            edges,
            counts: vec![0; bins],
        })
    }

    /// Histogram of `values` after multiplying each by `scale`.
    pub fn from_values(values: &[f64], bins: usize, range: [f64; 2], scale: f64) -> Result<Self> {
        let mut hist = Self::new(bins, range)?;
        for &v in values {
            hist.add(v * scale);
        }
        Ok(hist)
    }

    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Count one value; returns whether it fell inside the range.
    pub fn add(&mut self, value: f64) -> bool {
        match self.bin_of(value) {
            Some(i) => {
                self.counts[i] += 1;
                true
            }
            None => false,
        }
    }

    fn bin_of(&self, value: f64) -> Option<usize> {
        let (lo, hi) = (self.lo(), self.hi());
        if !(value >= lo && value <= hi) {
            return None;
        }
        let bins = self.bins();
        if value == hi {
            return Some(bins - 1);
        }
        let mut i = (((value - lo) / (hi - lo)) * bins as f64) as usize;
        i = i.min(bins - 1);
        // Float rounding can land one bin off near an edge.
        if value < self.edges[i] {
            i -= 1;
        } else if i + 1 < bins && value >= self.edges[i + 1] {
            i += 1;
        }
        Some(i)
    }

    /// Total of all counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Centre of each bin.
    pub fn centres(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }
}

// ---------------------------------------------------------------------------
// HistogramReport – the four region/sign groups
// ---------------------------------------------------------------------------

/// Histograms of time-averaged ΔsO2 (signed) and |ΔsO2| (unsigned) for
/// tumour and non-tumour pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramReport {
    pub tumour_signed: Histogram,
    pub non_tumour_signed: Histogram,
    pub tumour_unsigned: Histogram,
    pub non_tumour_unsigned: Histogram,
}

impl HistogramReport {
    pub fn new(groups: &GroupedAggregates, config: &HistogramConfig) -> Result<Self> {
        let signed = |values: &[f64]| {
            Histogram::from_values(values, config.bins, config.signed_range, config.scale)
        };
        let unsigned = |values: &[f64]| {
            Histogram::from_values(values, config.bins, config.unsigned_range, config.scale)
        };
        Ok(Self {
            tumour_signed: signed(&groups.tumour_signed)?,
            non_tumour_signed: signed(&groups.non_tumour_signed)?,
            tumour_unsigned: unsigned(&groups.tumour_unsigned)?,
            non_tumour_unsigned: unsigned(&groups.non_tumour_unsigned)?,
        })
    }

    /// `(name, histogram)` pairs in a fixed order.
    pub fn named(&self) -> [(&'static str, &Histogram); 4] {
        [
            ("tumour_signed", &self.tumour_signed),
            ("non_tumour_signed", &self.non_tumour_signed),
            ("tumour_unsigned", &self.tumour_unsigned),
            ("non_tumour_unsigned", &self.non_tumour_unsigned),
        ]
    }
}
