use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use lsd_so2::config::{DataPaths, GasChallengeConfig, PipelineConfig, TrainingConfig};
use lsd_so2::data::model::PixelCoord;
use lsd_so2::data::writer::write_parquet;
use lsd_so2::gas::TimestepFiles;
use lsd_so2::synthetic::{labelled_split, ChallengeModel, SpectrumModel};

/// Write a synthetic dataset (training splits, gas-challenge timesteps,
/// coordinate lists) and a matching run configuration.
#[derive(Debug, Parser)]
#[command(name = "generate_sample", about)]
struct Args {
    /// Output directory.
    #[arg(short, long, default_value = "sample_data")]
    out: PathBuf,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 20_000)]
    train: usize,

    #[arg(long, default_value_t = 4_000)]
    validation: usize,

    #[arg(long, default_value_t = 4_000)]
    test: usize,

    /// Gas-challenge timesteps.
    #[arg(long, default_value_t = 93)]
    timesteps: usize,
}

fn write_coords(path: &Path, coords: &[PixelCoord]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for coord in coords {
        writer.serialize(coord)?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    // Labelled splits over the full 41-channel spectrum.
    let spectrum_model = SpectrumModel::default();
    let data = DataPaths::default();
    for (offset, (file, n)) in [
        (&data.train, args.train),
        (&data.validation, args.validation),
        (&data.test, args.test),
    ]
    .into_iter()
    .enumerate()
    {
        let split = labelled_split(n, &spectrum_model, args.seed + offset as u64);
        let path = args.out.join(file);
        write_parquet(&path, &split.spectra, Some(split.labels.as_slice()))?;
        println!("Wrote {n} labelled spectra to {}", path.display());
    }

    // Gas challenge at the ten measured wavelengths.
    let challenge_model = ChallengeModel {
        timesteps: args.timesteps,
        ..ChallengeModel::default()
    };
    let scan = challenge_model.simulate(args.seed + 3);
    let gas = GasChallengeConfig {
        timesteps: args.timesteps,
        baseline_timesteps: challenge_model.baseline_timesteps,
        map_size: Some([
            (challenge_model.origin.x + challenge_model.width) as usize,
            (challenge_model.origin.y + challenge_model.height) as usize,
        ]),
        ..GasChallengeConfig::default()
    };
    let template = args.out.join(&gas.timestep_template);
    let files = TimestepFiles::new(&template.to_string_lossy(), scan.frames.len())?;
    for (t, frame) in scan.frames.iter().enumerate() {
        write_parquet(&files.path(t), frame, None)?;
    }
    println!(
        "Wrote {} timesteps of {} pixels ({} tumour)",
        scan.frames.len(),
        scan.pixel_coords.len(),
        scan.tumour_coords.len()
    );
    write_coords(&args.out.join(&gas.pixel_coords), &scan.pixel_coords)?;
    write_coords(&args.out.join(&gas.tumour_coords), &scan.tumour_coords)?;

    // Paths are relative; they resolve against the config's directory.
    let config = PipelineConfig {
        training: TrainingConfig::default(),
        data,
        gas_challenge: Some(gas),
        output_dir: Some(PathBuf::from("results")),
    };
    let config_path = args.out.join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
