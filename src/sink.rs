use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::Serialize;

use crate::gas::{DeltaSeries, HistogramReport, PixelTimeSeries};
use crate::model::{Evaluation, TrainingHistory};

// ---------------------------------------------------------------------------
// ResultSink – where pipeline results go
// ---------------------------------------------------------------------------

/// Which quantity a pixel map shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    /// Absolute sO2, percent.
    So2,
    /// Change from baseline, percent.
    DeltaSo2,
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKind::So2 => write!(f, "so2"),
            MapKind::DeltaSo2 => write!(f, "delta_so2"),
        }
    }
}

/// Receives results as the pipeline produces them. The pipeline always
/// calls every method; each defaults to discarding its input.
pub trait ResultSink {
    fn training_history(&mut self, _history: &TrainingHistory) -> Result<()> {
        Ok(())
    }

    fn test_evaluation(&mut self, _evaluation: &Evaluation) -> Result<()> {
        Ok(())
    }

    fn so2_timeseries(&mut self, _series: &PixelTimeSeries) -> Result<()> {
        Ok(())
    }

    fn delta_series(&mut self, _delta: &DeltaSeries) -> Result<()> {
        Ok(())
    }

    /// One map per timestep; `timestep` counts from the start of the scan.
    fn pixel_map(&mut self, _kind: MapKind, _timestep: usize, _map: &Array2<f64>) -> Result<()> {
        Ok(())
    }

    fn histograms(&mut self, _report: &HistogramReport) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ResultSink for NullSink {}

// ---------------------------------------------------------------------------
// FileSink – JSON / CSV files in one directory
// ---------------------------------------------------------------------------

/// Writes each result into `dir`:
///
/// * `training_history.csv`
/// * `test_evaluation.json`
/// * `so2_timeseries_bypixel.json`, `delta_so2_timeseries_bypixel.json`
/// * `maps/<kind>_timestep<t>.csv`
/// * `histograms.json` and `histogram_<group>.csv`
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)
            .with_context(|| format!("writing {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn csv_writer(&self, path: &Path) -> Result<csv::Writer<std::fs::File>> {
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))
    }
}

#[derive(Serialize)]
struct HistogramRow {
    lo: f64,
    hi: f64,
    centre: f64,
    count: u64,
}

impl ResultSink for FileSink {
    fn training_history(&mut self, history: &TrainingHistory) -> Result<()> {
        let path = self.dir.join("training_history.csv");
        let mut writer = self.csv_writer(&path)?;
        for record in &history.epochs {
            writer.serialize(record).context("writing training history row")?;
        }
        writer.flush().context("flushing training history")?;
        Ok(())
    }

    fn test_evaluation(&mut self, evaluation: &Evaluation) -> Result<()> {
        self.write_json("test_evaluation.json", evaluation)
    }

    fn so2_timeseries(&mut self, series: &PixelTimeSeries) -> Result<()> {
        self.write_json("so2_timeseries_bypixel.json", series.series())
    }

    fn delta_series(&mut self, delta: &DeltaSeries) -> Result<()> {
        self.write_json("delta_so2_timeseries_bypixel.json", delta)
    }

    fn pixel_map(&mut self, kind: MapKind, timestep: usize, map: &Array2<f64>) -> Result<()> {
        let dir = self.dir.join("maps");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{kind}_timestep{timestep}.csv"));

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        for row in map.rows() {
            writer
                .write_record(row.iter().map(|v| v.to_string()))
                .with_context(|| format!("writing {}", path.display()))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn histograms(&mut self, report: &HistogramReport) -> Result<()> {
        self.write_json("histograms.json", report)?;
        for (name, hist) in report.named() {
            let path = self.dir.join(format!("histogram_{name}.csv"));
            let mut writer = self.csv_writer(&path)?;
            for ((edge, count), centre) in hist.edges.windows(2).zip(&hist.counts).zip(hist.centres()) {
                writer.serialize(HistogramRow {
                    lo: edge[0],
                    hi: edge[1],
                    centre,
                    count: *count,
                })?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::Histogram;
    use crate::model::train::EpochRecord;
    use ndarray::array;

    /// Output directory for one test, removed on drop.
    struct OutDir(PathBuf);

    impl OutDir {
        fn new(name: &str) -> Self {
            Self(std::env::temp_dir().join(format!("lsd-so2-sink-{}-{name}", std::process::id())))
        }
    }

    impl Drop for OutDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn file_sink_writes_history_and_histograms() {
        let out = OutDir::new("hist");
        let dir = &out.0;
        let mut sink = FileSink::create(dir).unwrap();

        let history = TrainingHistory {
            epochs: vec![EpochRecord {
                epoch: 0,
                learning_rate: 0.01,
                train_loss: 0.2,
                val_loss: 0.1,
                val_median_error: 0.05,
            }],
        };
        sink.training_history(&history).unwrap();
        let text = std::fs::read_to_string(dir.join("training_history.csv")).unwrap();
        assert!(text.starts_with("epoch,learning_rate,train_loss,val_loss,val_median_error"));

        let h = Histogram::from_values(&[0.1], 2, [0.0, 30.0], 100.0).unwrap();
        let report = HistogramReport {
            tumour_signed: h.clone(),
            non_tumour_signed: h.clone(),
            tumour_unsigned: h.clone(),
            non_tumour_unsigned: h,
        };
        sink.histograms(&report).unwrap();
        let rows = std::fs::read_to_string(dir.join("histogram_tumour_unsigned.csv")).unwrap();
        assert_eq!(rows.lines().count(), 3);
        assert!(dir.join("histograms.json").exists());
    }

    #[test]
    fn file_sink_writes_maps_with_nan() {
        let out = OutDir::new("maps");
        let dir = &out.0;
        let mut sink = FileSink::create(dir).unwrap();
        sink.pixel_map(MapKind::DeltaSo2, 12, &array![[1.5, f64::NAN]]).unwrap();
        let text = std::fs::read_to_string(dir.join("maps/delta_so2_timestep12.csv")).unwrap();
        assert_eq!(text.trim(), "1.5,NaN");
    }

    #[test]
    fn scratch_output_is_removed_after_use() {
        let path = {
            let out = OutDir::new("cleanup");
            FileSink::create(&out.0).unwrap();
            assert!(out.0.exists());
            out.0.clone()
        };
        assert!(!path.exists());
    }

    #[test]
    fn null_sink_accepts_everything() {
        let mut sink = NullSink;
        sink.training_history(&TrainingHistory::default()).unwrap();
        sink.pixel_map(MapKind::So2, 0, &array![[0.0]]).unwrap();
    }
}
