use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, Float32Array, Float64Array, Int32Array, Int64Array, LargeListArray, ListArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{LabelledSpectra, PixelCoord, Spectrum};

/// Column holding the absorption spectrum of each row.
pub const SPECTRUM_COLUMN: &str = "spectrum";
/// Column holding the ground-truth sO2 fraction of each row.
pub const LABEL_COLUMN: &str = "so2";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a labelled dataset split.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – `spectrum` list column and `so2` float column (recommended)
/// * `.json`    – `[{ "spectrum": [...], "so2": 0.71 }, ...]`
/// * `.csv`     – `spectrum` column of semicolon-separated floats, `so2` column
pub fn load_labelled(path: &Path) -> Result<LabelledSpectra> {
    let (spectra, labels) = load_table(path, Some(LABEL_COLUMN))?;
    let labels = labels.context("label column was not read")?;
    log::debug!("Loaded {} labelled spectra from {}", spectra.len(), path.display());
    LabelledSpectra::new(spectra, labels)
        .with_context(|| format!("pairing spectra and labels in {}", path.display()))
}

/// Load unlabelled spectra (one gas-challenge timestep).  Same formats as
/// [`load_labelled`] without the `so2` column.
pub fn load_spectra(path: &Path) -> Result<Vec<Spectrum>> {
    let (spectra, _) = load_table(path, None)?;
    log::debug!("Loaded {} spectra from {}", spectra.len(), path.display());
    Ok(spectra)
}

/// Load pixel coordinates.
///
/// * `.csv`  – integer columns `x` and `y`
/// * `.json` – `[[x, y], ...]`
pub fn load_coords(path: &Path) -> Result<Vec<PixelCoord>> {
    match extension(path).as_str() {
        "csv" => load_coords_csv(path),
        "json" => load_coords_json(path),
        other => bail!("Unsupported coordinate file extension: .{other}"),
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn load_table(path: &Path, label: Option<&str>) -> Result<(Vec<Spectrum>, Option<Vec<f64>>)> {
    let loaded = match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path, label),
        "json" => load_json(path, label),
        "csv" => load_csv(path, label),
        other => bail!("Unsupported file extension: .{other}"),
    };
    loaded.with_context(|| format!("loading {}", path.display()))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "spectrum": [0.12, 0.14, ...], "so2": 0.71 },
///   ...
/// ]
/// ```
fn load_json(path: &Path, label: Option<&str>) -> Result<(Vec<Spectrum>, Option<Vec<f64>>)> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut spectra = Vec::with_capacity(records.len());
    let mut labels = label.map(|_| Vec::with_capacity(records.len()));

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        spectra.push(json_array_to_f64(obj.get(SPECTRUM_COLUMN), i, SPECTRUM_COLUMN)?);

        if let (Some(col), Some(labels)) = (label, labels.as_mut()) {
            let value = obj
                .get(col)
                .and_then(|v| v.as_f64())
                .with_context(|| format!("Row {i}: missing or invalid '{col}' value"))?;
            labels.push(value);
        }
    }

    Ok((spectra, labels))
}

fn json_array_to_f64(val: Option<&JsonValue>, row: usize, col: &str) -> Result<Vec<f64>> {
    let arr = val
        .and_then(|v| v.as_array())
        .with_context(|| format!("Row {row}: missing or invalid '{col}' array"))?;

    arr.iter()
        .enumerate()
        .map(|(j, v)| {
            v.as_f64()
                .with_context(|| format!("Row {row}, {col}[{j}]: not a number"))
        })
        .collect()
}

fn load_coords_json(path: &Path) -> Result<Vec<PixelCoord>> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let pairs: Vec<[u32; 2]> = serde_json::from_str(&text)
        .with_context(|| format!("parsing coordinate pairs in {}", path.display()))?;
    Ok(pairs.into_iter().map(|[x, y]| PixelCoord::new(x, y)).collect())
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout:  header row with column names.
/// The `spectrum` column contains semicolon-separated floats:
///   `"0.12;0.14;0.11"`
/// Other columns are ignored apart from the label column.
fn load_csv(path: &Path, label: Option<&str>) -> Result<(Vec<Spectrum>, Option<Vec<f64>>)> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let spectrum_idx = column_position(&headers, SPECTRUM_COLUMN)?;
    let label_idx = label
        .map(|col| column_position(&headers, col))
        .transpose()?;

    let mut spectra = Vec::new();
    let mut labels = label_idx.map(|_| Vec::new());

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;

        let spectrum = parse_semicolon_floats(
            record.get(spectrum_idx).unwrap_or(""),
            row_no,
            SPECTRUM_COLUMN,
        )?;
        spectra.push(spectrum);

        if let (Some(idx), Some(labels)) = (label_idx, labels.as_mut()) {
            let raw = record.get(idx).unwrap_or("").trim();
            let value = raw
                .parse::<f64>()
                .with_context(|| format!("CSV row {row_no}: label '{raw}' is not a number"))?;
            labels.push(value);
        }
    }

    Ok((spectra, labels))
}

fn column_position(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("CSV missing '{name}' column"))
}

fn parse_semicolon_floats(s: &str, row: usize, col: &str) -> Result<Vec<f64>> {
    s.split(';')
        .enumerate()
        .map(|(j, tok)| {
            tok.trim()
                .parse::<f64>()
                .with_context(|| format!("Row {row}, {col}[{j}]: '{tok}' is not a number"))
        })
        .collect()
}

#[derive(serde::Deserialize)]
struct CoordRecord {
    x: u32,
    y: u32,
}

fn load_coords_csv(path: &Path) -> Result<Vec<PixelCoord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening CSV {}", path.display()))?;
    reader
        .deserialize::<CoordRecord>()
        .enumerate()
        .map(|(row_no, rec)| {
            let rec = rec.with_context(|| format!("{} row {row_no}", path.display()))?;
            Ok(PixelCoord::new(rec.x, rec.y))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file containing spectra.
///
/// Expected schema:
/// - `spectrum`: List<Float64|Float32> or LargeList<…> – absorption values
/// - `so2`: Float64/Float32 (labelled splits only)
/// - Any other columns are ignored
///
/// Works with files written by **Pandas**, **Polars** and the bundled
/// `generate_sample` binary.
fn load_parquet(path: &Path, label: Option<&str>) -> Result<(Vec<Spectrum>, Option<Vec<f64>>)> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut spectra = Vec::new();
    let mut labels = label.map(|_| Vec::new());

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        let n_rows = batch.num_rows();

        let spectrum_idx = schema
            .index_of(SPECTRUM_COLUMN)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{SPECTRUM_COLUMN}' column"))?;
        let spectrum_col = batch.column(spectrum_idx);

        let label_col = match label {
            Some(col) => {
                let idx = schema
                    .index_of(col)
                    .map_err(|_| anyhow::anyhow!("Parquet file missing '{col}' column"))?;
                Some(batch.column(idx))
            }
            None => None,
        };

        for row in 0..n_rows {
            let spectrum = extract_f64_list(spectrum_col, row)
                .with_context(|| format!("Row {row}: failed to read '{SPECTRUM_COLUMN}'"))?;
            spectra.push(spectrum);

            if let (Some(col), Some(labels)) = (label_col, labels.as_mut()) {
                let value = extract_f64_scalar(col, row)
                    .with_context(|| format!("Row {row}: failed to read label"))?;
                labels.push(value);
            }
        }
    }

    Ok((spectra, labels))
}

// -- Parquet / Arrow helpers --

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}

/// Extract a numeric scalar from an Arrow column at a given row.
fn extract_f64_scalar(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        bail!("null label");
    }
    let any = col.as_any();
    let value = match col.data_type() {
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => any.downcast_ref::<Float32Array>().map(|a| a.value(row) as f64),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        other => bail!("Expected a numeric label column, got {other:?}"),
    };
    value.context("label column does not match its declared type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::writer::write_parquet;

    /// Per-test directory under the system temp dir, removed on drop.
    struct Scratch(std::path::PathBuf);

    impl Scratch {
        fn new(test: &str) -> Self {
            let dir = std::env::temp_dir()
                .join(format!("lsd-so2-loader-{}-{test}", std::process::id()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn file(&self, name: &str) -> std::path::PathBuf {
            self.0.join(name)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn json_records_round_through_loader() {
        let scratch = Scratch::new("json");
        let path = scratch.file("split.json");
        std::fs::write(
            &path,
            r#"[{"spectrum": [1.0, 2.0, 3.0], "so2": 0.5},
                {"spectrum": [4.0, 5.0, 6.5], "so2": 0.25, "note": "ignored"}]"#,
        )
        .unwrap();

        let split = load_labelled(&path).unwrap();
        assert_eq!(split.spectra, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.5]]);
        assert_eq!(split.labels, vec![0.5, 0.25]);

        let unlabelled = load_spectra(&path).unwrap();
        assert_eq!(unlabelled.len(), 2);
    }

    #[test]
    fn csv_split_and_missing_label() {
        let scratch = Scratch::new("csv");
        let path = scratch.file("split.csv");
        std::fs::write(&path, "spectrum,so2\n\"1;2;3\",0.9\n\"3;2;1\",0.1\n").unwrap();
        let split = load_labelled(&path).unwrap();
        assert_eq!(split.spectra[1], vec![3.0, 2.0, 1.0]);
        assert_eq!(split.labels, vec![0.9, 0.1]);

        let bare = scratch.file("bare.csv");
        std::fs::write(&bare, "spectrum\n\"1;2;3\"\n").unwrap();
        assert!(load_labelled(&bare).is_err());
        assert_eq!(load_spectra(&bare).unwrap(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn parquet_written_by_writer_loads_back() {
        let scratch = Scratch::new("parquet");
        let path = scratch.file("split.parquet");
        let spectra = vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]];
        write_parquet(&path, &spectra, Some(&[0.3, 0.8][..])).unwrap();

        let split = load_labelled(&path).unwrap();
        assert_eq!(split.spectra, spectra);
        assert_eq!(split.labels, vec![0.3, 0.8]);
    }

    #[test]
    fn coordinates_from_csv_and_json() {
        let scratch = Scratch::new("coords");
        let csv_path = scratch.file("coords.csv");
        std::fs::write(&csv_path, "x,y\n10,20\n11,20\n").unwrap();
        assert_eq!(
            load_coords(&csv_path).unwrap(),
            vec![PixelCoord::new(10, 20), PixelCoord::new(11, 20)]
        );

        let json_path = scratch.file("coords.json");
        std::fs::write(&json_path, "[[3, 4], [5, 6]]").unwrap();
        assert_eq!(
            load_coords(&json_path).unwrap(),
            vec![PixelCoord::new(3, 4), PixelCoord::new(5, 6)]
        );
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = load_spectra(Path::new("scan.hdf5")).unwrap_err();
        assert!(format!("{err:#}").contains("Unsupported file extension"));
    }
}
