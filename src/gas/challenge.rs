use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::data::model::{PixelCoord, Spectrum};
use crate::data::preprocess::normalize_rows;
use crate::error::{PipelineError, Result};
use crate::model::Regressor;

// ---------------------------------------------------------------------------
// Per-timestep inference
// ---------------------------------------------------------------------------

/// Z-score every pixel spectrum of one timestep and estimate its sO2.
///
/// In-vivo spectra are already restricted to the measured wavelengths, so
/// there is no channel selection here.
pub fn estimate_timestep<R: Regressor + ?Sized>(model: &R, spectra: &[Spectrum]) -> Result<Array1<f64>> {
    let inputs = normalize_rows(spectra, model.input_width())?;
    Ok(model.predict(inputs.view()))
}

// ---------------------------------------------------------------------------
// PixelTimeSeries
// ---------------------------------------------------------------------------

/// sO2 estimates per pixel, one entry per timestep, grown one timestep at a
/// time. Every pixel always holds the same number of timesteps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelTimeSeries {
    series: Vec<Vec<f64>>,
    timesteps: usize,
}

impl PixelTimeSeries {
    pub fn new(pixels: usize) -> Self {
        Self {
            series: vec![Vec::new(); pixels],
            timesteps: 0,
        }
    }

    /// Wrap already assembled series (one inner vector per pixel). All
    /// pixels must have the same length.
    pub fn from_series(series: Vec<Vec<f64>>) -> Result<Self> {
        let timesteps = series.first().map_or(0, Vec::len);
        if let Some((pixel, s)) = series.iter().enumerate().find(|(_, s)| s.len() != timesteps) {
            return Err(PipelineError::ShapeMismatch {
                what: "timesteps in pixel series",
                expected: timesteps,
                actual: s.len(),
            }
            .at_row(pixel));
        }
        Ok(Self { series, timesteps })
    }

    pub fn pixels(&self) -> usize {
        self.series.len()
    }

    /// Timesteps recorded so far.
    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn series(&self) -> &[Vec<f64>] {
        &self.series
    }

    /// Append one estimate per pixel.
    pub fn push_timestep(&mut self, estimates: &[f64]) -> Result<()> {
        if estimates.len() != self.series.len() {
            return Err(PipelineError::ShapeMismatch {
                what: "pixels in timestep",
                expected: self.series.len(),
                actual: estimates.len(),
            });
        }
        for (pixel, &value) in self.series.iter_mut().zip(estimates) {
            pixel.push(value);
        }
        self.timesteps += 1;
        Ok(())
    }

    /// All pixels' values at timestep `t`.
    pub fn at(&self, t: usize) -> Vec<f64> {
        self.series.iter().map(|s| s[t]).collect()
    }
}

// ---------------------------------------------------------------------------
// Baseline and delta
// ---------------------------------------------------------------------------

/// Mean of the first `window` entries.
pub fn baseline(series: &[f64], window: usize) -> f64 {
    let head = &series[..window.min(series.len())];
    head.iter().sum::<f64>() / head.len() as f64
}

/// Per-pixel change from baseline, with the baseline window removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSeries {
    /// Timesteps averaged into each baseline; delta entry `i` belongs to
    /// timestep `baseline_timesteps + i`.
    pub baseline_timesteps: usize,
    pub baselines: Vec<f64>,
    pub deltas: Vec<Vec<f64>>,
}

impl DeltaSeries {
    pub fn from_series(series: &PixelTimeSeries, baseline_timesteps: usize) -> Result<Self> {
        if baseline_timesteps == 0 {
            return Err(PipelineError::EmptyInput("baseline window"));
        }
        if series.pixels() == 0 {
            return Err(PipelineError::EmptyInput("pixel set"));
        }
        let t = series.timesteps();
        if t <= baseline_timesteps {
            return Err(PipelineError::InsufficientTimesteps {
                baseline: baseline_timesteps,
                actual: t,
            });
        }

        let (baselines, deltas): (Vec<f64>, Vec<Vec<f64>>) = series
            .series()
            .iter()
            .map(|s| {
                let b = baseline(s, baseline_timesteps);
                let delta: Vec<f64> = s[baseline_timesteps..].iter().map(|v| v - b).collect();
                (b, delta)
            })
            .unzip();

        Ok(Self {
            baseline_timesteps,
            baselines,
            deltas,
        })
    }

    pub fn timesteps(&self) -> usize {
        self.deltas.first().map_or(0, Vec::len)
    }

    /// All pixels' deltas at delta index `i`.
    pub fn at(&self, i: usize) -> Vec<f64> {
        self.deltas.iter().map(|d| d[i]).collect()
    }
}

/// Time-averaged signed and unsigned change per pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelAggregates {
    pub mean_delta: Vec<f64>,
    pub mean_abs_delta: Vec<f64>,
}

impl PixelAggregates {
    pub fn from_deltas(deltas: &DeltaSeries) -> Self {
        let mut mean_delta = Vec::with_capacity(deltas.deltas.len());
        let mut mean_abs_delta = Vec::with_capacity(deltas.deltas.len());
        for d in &deltas.deltas {
            let n = d.len() as f64;
            mean_delta.push(d.iter().sum::<f64>() / n);
            mean_abs_delta.push(d.iter().map(|v| v.abs()).sum::<f64>() / n);
        }
        Self {
            mean_delta,
            mean_abs_delta,
        }
    }
}

// ---------------------------------------------------------------------------
// Tumour / non-tumour partition
// ---------------------------------------------------------------------------

/// Split of the chosen pixels into tumour and non-tumour groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TumourPartition {
    is_tumour: Vec<bool>,
}

impl TumourPartition {
    /// Mark every chosen pixel whose coordinate appears in `tumour`. A tumour
    /// coordinate that is not a chosen pixel is an error.
    pub fn from_coords(chosen: &[PixelCoord], tumour: &[PixelCoord]) -> Result<Self> {
        let mut index_of: HashMap<PixelCoord, usize> = HashMap::with_capacity(chosen.len());
        for (i, &coord) in chosen.iter().enumerate() {
            index_of.entry(coord).or_insert(i);
        }

        let mut is_tumour = vec![false; chosen.len()];
        for coord in tumour {
            let &i = index_of
                .get(coord)
                .ok_or(PipelineError::UnknownCoordinate { x: coord.x, y: coord.y })?;
            is_tumour[i] = true;
        }
        Ok(Self { is_tumour })
    }

    pub fn pixels(&self) -> usize {
        self.is_tumour.len()
    }

    pub fn is_tumour(&self, pixel: usize) -> bool {
        self.is_tumour[pixel]
    }

    pub fn tumour_indices(&self) -> Vec<usize> {
        (0..self.is_tumour.len()).filter(|&i| self.is_tumour[i]).collect()
    }

    pub fn non_tumour_indices(&self) -> Vec<usize> {
        (0..self.is_tumour.len()).filter(|&i| !self.is_tumour[i]).collect()
    }

    /// Split per-pixel values into `(tumour, non_tumour)`, keeping pixel order.
    pub fn split(&self, values: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        if values.len() != self.is_tumour.len() {
            return Err(PipelineError::ShapeMismatch {
                what: "per-pixel values",
                expected: self.is_tumour.len(),
                actual: values.len(),
            });
        }
        let (tumour, rest): (Vec<_>, Vec<_>) = values
            .iter()
            .zip(&self.is_tumour)
            .partition(|(_, t)| **t);
        Ok((
            tumour.into_iter().map(|(&v, _)| v).collect(),
            rest.into_iter().map(|(&v, _)| v).collect(),
        ))
    }
}

/// Time-averaged changes grouped by region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedAggregates {
    pub tumour_signed: Vec<f64>,
    pub non_tumour_signed: Vec<f64>,
    pub tumour_unsigned: Vec<f64>,
    pub non_tumour_unsigned: Vec<f64>,
}

impl GroupedAggregates {
    pub fn new(aggregates: &PixelAggregates, partition: &TumourPartition) -> Result<Self> {
        let (tumour_signed, non_tumour_signed) = partition.split(&aggregates.mean_delta)?;
        let (tumour_unsigned, non_tumour_unsigned) = partition.split(&aggregates.mean_abs_delta)?;
        Ok(Self {
            tumour_signed,
            non_tumour_signed,
            tumour_unsigned,
            non_tumour_unsigned,
        })
    }
}

// ---------------------------------------------------------------------------
// Parametric maps
// ---------------------------------------------------------------------------

/// Scatter per-pixel values into a `height × width` image (row = y,
/// column = x), multiplied by `scale`. Unsampled positions are NaN.
pub fn pixel_map(
    values: &[f64],
    coords: &[PixelCoord],
    [width, height]: [usize; 2],
    scale: f64,
) -> Result<Array2<f64>> {
    if values.len() != coords.len() {
        return Err(PipelineError::ShapeMismatch {
            what: "values for pixel map",
            expected: coords.len(),
            actual: values.len(),
        });
    }
    let mut map = Array2::from_elem((height, width), f64::NAN);
    for (&value, coord) in values.iter().zip(coords) {
        let (x, y) = (coord.x as usize, coord.y as usize);
        if x >= width || y >= height {
            return Err(PipelineError::CoordinateOutOfBounds {
                x: coord.x,
                y: coord.y,
                width,
                height,
            });
        }
        map[[y, x]] = value * scale;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayView2;
    use proptest::prelude::*;

    #[test]
    fn baseline_and_delta_of_step_series() {
        let series: Vec<f64> = [vec![5.0; 10], vec![7.0; 10]].concat();
        let ts = PixelTimeSeries::from_series(vec![series.clone(), series]).unwrap();
        let delta = DeltaSeries::from_series(&ts, 10).unwrap();

        assert_eq!(delta.baselines, vec![5.0, 5.0]);
        assert_eq!(delta.deltas[0], vec![2.0; 10]);
        assert_eq!(delta.timesteps(), 10);

        let agg = PixelAggregates::from_deltas(&delta);
        assert_eq!(agg.mean_delta, vec![2.0, 2.0]);
        assert_eq!(agg.mean_abs_delta, vec![2.0, 2.0]);
    }

    #[test]
    fn signed_and_unsigned_means_differ_for_oscillation() {
        let ts = PixelTimeSeries::from_series(vec![vec![0.5, 0.5, 0.6, 0.4, 0.6, 0.4]]).unwrap();
        let delta = DeltaSeries::from_series(&ts, 2).unwrap();
        let agg = PixelAggregates::from_deltas(&delta);
        assert!(agg.mean_delta[0].abs() < 1e-12);
        assert!((agg.mean_abs_delta[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn too_short_series_is_rejected() {
        let ts = PixelTimeSeries::from_series(vec![vec![0.5; 10]]).unwrap();
        assert!(matches!(
            DeltaSeries::from_series(&ts, 10),
            Err(PipelineError::InsufficientTimesteps { baseline: 10, actual: 10 })
        ));
    }

    #[test]
    fn ragged_series_are_rejected() {
        let err = PixelTimeSeries::from_series(vec![vec![0.5; 20], vec![0.5; 5]]).unwrap_err();
        match err {
            PipelineError::Row { row, source } => {
                assert_eq!(row, 1);
                assert!(matches!(
                    *source,
                    PipelineError::ShapeMismatch { expected: 20, actual: 5, .. }
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_pixel_set_counts_timesteps_but_has_no_delta() {
        let mut ts = PixelTimeSeries::new(0);
        for _ in 0..20 {
            ts.push_timestep(&[]).unwrap();
        }
        assert_eq!(ts.timesteps(), 20);
        assert!(matches!(
            DeltaSeries::from_series(&ts, 10),
            Err(PipelineError::EmptyInput("pixel set"))
        ));
    }

    #[test]
    fn series_grows_per_timestep() {
        let mut ts = PixelTimeSeries::new(3);
        ts.push_timestep(&[0.1, 0.2, 0.3]).unwrap();
        ts.push_timestep(&[0.4, 0.5, 0.6]).unwrap();
        assert_eq!(ts.timesteps(), 2);
        assert_eq!(ts.series()[1], vec![0.2, 0.5]);
        assert_eq!(ts.at(1), vec![0.4, 0.5, 0.6]);
        assert!(ts.push_timestep(&[0.1]).is_err());
    }

    struct ThirdChannel;

    impl Regressor for ThirdChannel {
        fn input_width(&self) -> usize {
            3
        }

        fn predict(&self, inputs: ArrayView2<'_, f64>) -> Array1<f64> {
            inputs.rows().into_iter().map(|r| r[2]).collect()
        }
    }

    #[test]
    fn timestep_estimates_use_normalized_spectra() {
        // Any increasing 3-point ramp z-scores to [-√1.5, 0, √1.5].
        let est = estimate_timestep(&ThirdChannel, &[vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]]).unwrap();
        assert!((est[0] - 1.5f64.sqrt()).abs() < 1e-12);
        assert!((est[1] - 1.5f64.sqrt()).abs() < 1e-12);
        assert!(estimate_timestep(&ThirdChannel, &[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn partition_lookup() {
        let chosen = vec![PixelCoord::new(1, 1), PixelCoord::new(2, 1), PixelCoord::new(3, 1)];
        let p = TumourPartition::from_coords(&chosen, &[PixelCoord::new(2, 1)]).unwrap();
        assert_eq!(p.tumour_indices(), vec![1]);
        assert_eq!(p.non_tumour_indices(), vec![0, 2]);
        assert_eq!(p.split(&[0.1, 0.2, 0.3]).unwrap(), (vec![0.2], vec![0.1, 0.3]));

        assert!(matches!(
            TumourPartition::from_coords(&chosen, &[PixelCoord::new(9, 9)]),
            Err(PipelineError::UnknownCoordinate { x: 9, y: 9 })
        ));
    }

    #[test]
    fn map_places_values_by_row_and_column() {
        let coords = [PixelCoord::new(0, 1), PixelCoord::new(2, 0)];
        let map = pixel_map(&[0.5, 0.25], &coords, [3, 2], 100.0).unwrap();
        assert_eq!(map.dim(), (2, 3));
        assert_eq!(map[[1, 0]], 50.0);
        assert_eq!(map[[0, 2]], 25.0);
        assert!(map[[0, 0]].is_nan());

        assert!(matches!(
            pixel_map(&[1.0], &[PixelCoord::new(3, 0)], [3, 2], 1.0),
            Err(PipelineError::CoordinateOutOfBounds { .. })
        ));
    }

    proptest! {
        #[test]
        fn partition_covers_every_pixel_once(
            n in 1usize..60,
            picks in prop::collection::vec(any::<prop::sample::Index>(), 0..30)
        ) {
            let chosen: Vec<PixelCoord> = (0..n as u32).map(|i| PixelCoord::new(i % 7, i / 7)).collect();
            let tumour: Vec<PixelCoord> = picks.iter().map(|ix| chosen[ix.index(n)]).collect();
            let p = TumourPartition::from_coords(&chosen, &tumour).unwrap();

            let mut all: Vec<usize> = p.tumour_indices();
            all.extend(p.non_tumour_indices());
            all.sort_unstable();
            prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
            for ix in &picks {
                prop_assert!(p.is_tumour(ix.index(n)));
            }
        }
    }
}
