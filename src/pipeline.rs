//! End-to-end run: load splits, train, score on the test split, then
//! optionally post-process a gas challenge with the trained model.

use anyhow::{Context, Result};

use crate::config::{GasChallengeConfig, PipelineConfig, TrainingConfig};
use crate::data::loader::{load_coords, load_labelled};
use crate::data::model::{DatasetSplit, PixelCoord};
use crate::data::preprocess::ReducedSet;
use crate::error::PipelineError;
use crate::gas::{
    estimate_timestep, pixel_map, DeltaSeries, GroupedAggregates, HistogramReport,
    PixelAggregates, PixelTimeSeries, TimestepFiles, TimestepSource, TumourPartition,
};
use crate::model::{evaluate, Evaluation, Regressor, TrainedModel, Trainer};
use crate::sink::{MapKind, ResultSink};

// ---------------------------------------------------------------------------
// Training phase
// ---------------------------------------------------------------------------

/// Reduce the three splits, train on `train` (validating every epoch) and
/// evaluate the final model on `test`.
pub fn run_training(
    split: &DatasetSplit,
    config: &TrainingConfig,
    sink: &mut dyn ResultSink,
) -> Result<(TrainedModel, Evaluation)> {
    let trainer = Trainer::new(config).context("invalid training configuration")?;
    let selection = trainer.selection();

    let train = ReducedSet::from_split(&split.train, selection).context("preparing training split")?;
    let validation =
        ReducedSet::from_split(&split.validation, selection).context("preparing validation split")?;
    let test = ReducedSet::from_split(&split.test, selection).context("preparing test split")?;
    log::debug!(
        "Reduced splits to {} channels: {} / {} / {} spectra",
        selection.len(),
        train.len(),
        validation.len(),
        test.len()
    );

    let model = trainer.train(&train, &validation).context("training")?;
    sink.training_history(model.history())?;

    let test_result = evaluate(&model, &test, config.batch_size).context("evaluating test split")?;
    log::info!(
        "Test split: loss {:.4}, median relative error {:.4} (IQR {:.4}, q25 {:.4}, q75 {:.4})",
        test_result.loss,
        test_result.relative_error.median,
        test_result.relative_error.iqr(),
        test_result.relative_error.q25,
        test_result.relative_error.q75
    );
    sink.test_evaluation(&test_result)?;

    Ok((model, test_result))
}

// ---------------------------------------------------------------------------
// Gas-challenge phase
// ---------------------------------------------------------------------------

/// Everything the gas-challenge post-processing produces.
#[derive(Debug, Clone)]
pub struct GasChallengeReport {
    pub series: PixelTimeSeries,
    pub delta: DeltaSeries,
    pub aggregates: PixelAggregates,
    pub groups: GroupedAggregates,
    pub histograms: HistogramReport,
}

/// Estimate sO2 for every pixel at every timestep of `source`, then derive
/// the change from baseline, region aggregates and histograms.
///
/// `pixel_coords[i]` is the image position of pixel row `i` in every
/// timestep; `tumour_coords` must be a subset of it.
pub fn run_gas_challenge<R: Regressor + ?Sized>(
    model: &R,
    source: &dyn TimestepSource,
    pixel_coords: &[PixelCoord],
    tumour_coords: &[PixelCoord],
    config: &GasChallengeConfig,
    sink: &mut dyn ResultSink,
) -> Result<GasChallengeReport> {
    if pixel_coords.is_empty() {
        return Err(PipelineError::EmptyInput("pixel set")).context("gas challenge");
    }
    let timesteps = source.timesteps();
    let scale = config.histogram.scale;
    log::info!(
        "Gas challenge: {} pixels ({} tumour), {} timesteps, baseline {}",
        pixel_coords.len(),
        tumour_coords.len(),
        timesteps,
        config.baseline_timesteps
    );

    let partition = TumourPartition::from_coords(pixel_coords, tumour_coords)
        .context("matching tumour coordinates to pixels")?;

    let mut series = PixelTimeSeries::new(pixel_coords.len());
    for t in 0..timesteps {
        let spectra = source
            .load(t)
            .with_context(|| format!("loading timestep {t}"))?;
        let estimates = estimate_timestep(model, &spectra)
            .with_context(|| format!("estimating sO2 at timestep {t}"))?;
        series
            .push_timestep(&estimates.to_vec())
            .with_context(|| format!("timestep {t}"))?;
        log::debug!("Timestep {t}: {} pixels estimated", spectra.len());

        if let Some(size) = config.map_size {
            let map = pixel_map(&series.at(t), pixel_coords, size, scale)?;
            sink.pixel_map(MapKind::So2, t, &map)?;
        }
    }
    sink.so2_timeseries(&series)?;

    let delta = DeltaSeries::from_series(&series, config.baseline_timesteps)?;
    if let Some(size) = config.map_size {
        for i in 0..delta.timesteps() {
            let map = pixel_map(&delta.at(i), pixel_coords, size, scale)?;
            sink.pixel_map(MapKind::DeltaSo2, delta.baseline_timesteps + i, &map)?;
        }
    }
    sink.delta_series(&delta)?;

    let aggregates = PixelAggregates::from_deltas(&delta);
    let groups = GroupedAggregates::new(&aggregates, &partition)?;
    let histograms = HistogramReport::new(&groups, &config.histogram)?;
    for (name, hist) in histograms.named() {
        log::info!(
            "Histogram {name}: {} pixels in [{}, {}]",
            hist.total(),
            hist.lo(),
            hist.hi()
        );
    }
    sink.histograms(&histograms)?;

    Ok(GasChallengeReport {
        series,
        delta,
        aggregates,
        groups,
        histograms,
    })
}

// ---------------------------------------------------------------------------
// File-driven run
// ---------------------------------------------------------------------------

/// Load the configured splits.
pub fn load_split(config: &PipelineConfig) -> Result<DatasetSplit> {
    let paths = &config.data;
    Ok(DatasetSplit {
        train: load_labelled(&paths.train)?,
        validation: load_labelled(&paths.validation)?,
        test: load_labelled(&paths.test)?,
    })
}

/// Run every configured phase, reading inputs from disk.
pub fn run(config: &PipelineConfig, sink: &mut dyn ResultSink) -> Result<()> {
    let split = load_split(config)?;
    log::info!(
        "Loaded {} training, {} validation and {} test spectra",
        split.train.len(),
        split.validation.len(),
        split.test.len()
    );

    let (model, _) = run_training(&split, &config.training, sink)?;

    match &config.gas_challenge {
        Some(gas) => {
            let source = TimestepFiles::new(&gas.timestep_template, gas.timesteps)?;
            let pixels = load_coords(&gas.pixel_coords)?;
            let tumour = load_coords(&gas.tumour_coords)?;
            run_gas_challenge(&model, &source, &pixels, &tumour, gas, sink)?;
        }
        None => log::info!("No gas challenge configured"),
    }
    Ok(())
}
