use std::path::PathBuf;

use ndarray::Array2;

use lsd_so2::config::{GasChallengeConfig, PipelineConfig, TrainingConfig};
use lsd_so2::data::model::{DatasetSplit, PixelCoord};
use lsd_so2::data::writer::write_parquet;
use lsd_so2::error::PipelineError;
use lsd_so2::gas::{DeltaSeries, HistogramReport, PixelTimeSeries};
use lsd_so2::model::{Evaluation, TrainingHistory};
use lsd_so2::pipeline::{run, run_gas_challenge, run_training};
use lsd_so2::sink::{FileSink, MapKind, NullSink, ResultSink};
use lsd_so2::synthetic::{labelled_split, ChallengeModel, SpectrumModel};

/// Per-test directory under the system temp dir, removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("lsd-so2-{test}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[derive(Default)]
struct Recording {
    history: Option<TrainingHistory>,
    test: Option<Evaluation>,
    series: Option<PixelTimeSeries>,
    delta: Option<DeltaSeries>,
    maps: Vec<(MapKind, usize, (usize, usize))>,
    histograms: Option<HistogramReport>,
}

impl ResultSink for Recording {
    fn training_history(&mut self, history: &TrainingHistory) -> anyhow::Result<()> {
        self.history = Some(history.clone());
        Ok(())
    }

    fn test_evaluation(&mut self, evaluation: &Evaluation) -> anyhow::Result<()> {
        self.test = Some(evaluation.clone());
        Ok(())
    }

    fn so2_timeseries(&mut self, series: &PixelTimeSeries) -> anyhow::Result<()> {
        self.series = Some(series.clone());
        Ok(())
    }

    fn delta_series(&mut self, delta: &DeltaSeries) -> anyhow::Result<()> {
        self.delta = Some(delta.clone());
        Ok(())
    }

    fn pixel_map(&mut self, kind: MapKind, timestep: usize, map: &Array2<f64>) -> anyhow::Result<()> {
        self.maps.push((kind, timestep, map.dim()));
        Ok(())
    }

    fn histograms(&mut self, report: &HistogramReport) -> anyhow::Result<()> {
        self.histograms = Some(report.clone());
        Ok(())
    }
}

fn small_split(seed: u64) -> DatasetSplit {
    let model = SpectrumModel::default();
    DatasetSplit {
        train: labelled_split(256, &model, seed),
        validation: labelled_split(64, &model, seed + 1),
        test: labelled_split(64, &model, seed + 2),
    }
}

fn small_training() -> TrainingConfig {
    TrainingConfig {
        epochs: 3,
        batch_size: 64,
        ..TrainingConfig::default()
    }
}

fn small_challenge() -> ChallengeModel {
    ChallengeModel {
        width: 6,
        height: 5,
        origin: PixelCoord::new(2, 1),
        timesteps: 14,
        baseline_timesteps: 10,
        ..ChallengeModel::default()
    }
}

#[test]
fn training_then_gas_challenge_in_memory() {
    let mut sink = Recording::default();
    let training = small_training();
    let (model, test) = run_training(&small_split(7), &training, &mut sink).unwrap();

    let history = sink.history.as_ref().unwrap();
    assert_eq!(history.epochs.len(), 3);
    assert!(history.train_losses().iter().all(|l| l.is_finite()));
    assert!(history.val_losses().iter().all(|l| l.is_finite()));
    assert_eq!(test.predictions.len(), 64);
    assert!(test.relative_error.q25 <= test.relative_error.median);
    assert!(test.relative_error.median <= test.relative_error.q75);
    assert_eq!(sink.test.as_ref().unwrap().predictions, test.predictions);

    let challenge = small_challenge();
    let scan = challenge.simulate(11);
    let config = GasChallengeConfig {
        timesteps: 14,
        baseline_timesteps: 10,
        map_size: Some([8, 6]),
        ..GasChallengeConfig::default()
    };
    let report = run_gas_challenge(
        &model,
        &scan.frames,
        &scan.pixel_coords,
        &scan.tumour_coords,
        &config,
        &mut sink,
    )
    .unwrap();

    let pixels = scan.pixel_coords.len();
    assert_eq!(pixels, 30);
    assert_eq!(report.series.pixels(), pixels);
    assert_eq!(report.series.timesteps(), 14);
    assert_eq!(report.delta.timesteps(), 4);
    assert_eq!(report.delta.baselines.len(), pixels);
    assert_eq!(
        report.groups.tumour_signed.len() + report.groups.non_tumour_signed.len(),
        pixels
    );
    assert_eq!(report.groups.tumour_signed.len(), scan.tumour_coords.len());

    let hist = sink.histograms.as_ref().unwrap();
    assert!(hist.tumour_signed.total() as usize <= scan.tumour_coords.len());
    assert!(hist.non_tumour_unsigned.total() as usize <= pixels - scan.tumour_coords.len());

    assert_eq!(sink.series.as_ref().unwrap().timesteps(), 14);
    assert_eq!(sink.delta.as_ref().unwrap().deltas.len(), pixels);

    let so2_maps: Vec<_> = sink.maps.iter().filter(|m| m.0 == MapKind::So2).collect();
    let delta_maps: Vec<_> = sink.maps.iter().filter(|m| m.0 == MapKind::DeltaSo2).collect();
    assert_eq!(so2_maps.len(), 14);
    assert_eq!(delta_maps.len(), 4);
    assert_eq!(delta_maps[0].1, 10);
    assert!(sink.maps.iter().all(|m| m.2 == (6, 8)));
}

#[test]
fn gas_challenge_rejects_short_scans_and_unknown_tumour_pixels() {
    let training = TrainingConfig {
        epochs: 1,
        ..small_training()
    };
    let (model, _) = run_training(&small_split(3), &training, &mut NullSink).unwrap();

    let scan = ChallengeModel {
        timesteps: 10,
        ..small_challenge()
    }
    .simulate(0);
    let config = GasChallengeConfig::default();
    assert!(run_gas_challenge(
        &model,
        &scan.frames,
        &scan.pixel_coords,
        &scan.tumour_coords,
        &config,
        &mut NullSink
    )
    .is_err());

    let scan = small_challenge().simulate(0);
    assert!(run_gas_challenge(
        &model,
        &scan.frames,
        &scan.pixel_coords,
        &[PixelCoord::new(500, 500)],
        &config,
        &mut NullSink
    )
    .is_err());

    let empty_frames: Vec<Vec<Vec<f64>>> = vec![Vec::new(); 20];
    let err = run_gas_challenge(&model, &empty_frames, &[], &[], &config, &mut NullSink).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::EmptyInput("pixel set"))
    ));
}

#[test]
fn file_driven_run_writes_results() {
    let scratch = Scratch::new("run");
    let dir = &scratch.0;

    let split = small_split(21);
    for (name, set) in [
        ("training.parquet", &split.train),
        ("validation.parquet", &split.validation),
        ("test.parquet", &split.test),
    ] {
        write_parquet(&dir.join(name), &set.spectra, Some(set.labels.as_slice())).unwrap();
    }

    let scan = small_challenge().simulate(5);
    for (t, frame) in scan.frames.iter().enumerate() {
        write_parquet(&dir.join(format!("Timestep{t}.parquet")), frame, None).unwrap();
    }
    let coords = |c: &[PixelCoord]| serde_json::to_string(&c.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>()).unwrap();
    std::fs::write(dir.join("pixels.json"), coords(&scan.pixel_coords)).unwrap();
    std::fs::write(dir.join("tumour.json"), coords(&scan.tumour_coords)).unwrap();

    let config_json = r#"{
        "training": { "epochs": 2, "batch_size": 64 },
        "gas_challenge": {
            "timesteps": 14,
            "pixel_coords": "pixels.json",
            "tumour_coords": "tumour.json",
            "map_size": [8, 6]
        },
        "output_dir": "results"
    }"#;
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, config_json).unwrap();

    let config = PipelineConfig::from_file(&config_path).unwrap();
    let out = config.output_dir.clone().unwrap();
    let mut sink = FileSink::create(&out).unwrap();
    run(&config, &mut sink).unwrap();

    let history = std::fs::read_to_string(out.join("training_history.csv")).unwrap();
    assert_eq!(history.lines().count(), 3);
    for file in [
        "test_evaluation.json",
        "so2_timeseries_bypixel.json",
        "delta_so2_timeseries_bypixel.json",
        "histograms.json",
        "histogram_tumour_signed.csv",
        "maps/so2_timestep0.csv",
        "maps/delta_so2_timestep13.csv",
    ] {
        assert!(out.join(file).exists(), "missing {file}");
    }

    let series: Vec<Vec<f64>> =
        serde_json::from_str(&std::fs::read_to_string(out.join("so2_timeseries_bypixel.json")).unwrap()).unwrap();
    assert_eq!(series.len(), 30);
    assert!(series.iter().all(|s| s.len() == 14));
}
