use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use lsd_so2::config::PipelineConfig;
use lsd_so2::pipeline;
use lsd_so2::sink::{FileSink, NullSink, ResultSink};

/// Train the LSD sO2 network and post-process a gas challenge.
#[derive(Debug, Parser)]
#[command(name = "lsd-so2", version, about)]
struct Args {
    /// JSON run configuration.
    #[arg(short, long)]
    config: PathBuf,

    /// Directory for result files (overrides the config).
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of training epochs (overrides the config).
    #[arg(long)]
    epochs: Option<usize>,

    /// Seed for initialization and shuffling (overrides the config).
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = PipelineConfig::from_file(&args.config)?;
    if let Some(dir) = args.output_dir {
        config.output_dir = Some(dir);
    }
    if let Some(epochs) = args.epochs {
        config.training.epochs = epochs;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }

    let mut sink: Box<dyn ResultSink> = match &config.output_dir {
        Some(dir) => {
            log::info!("Writing results to {}", dir.display());
            Box::new(FileSink::create(dir)?)
        }
        None => Box::new(NullSink),
    };

    pipeline::run(&config, sink.as_mut())
}
