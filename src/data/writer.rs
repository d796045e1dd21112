use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Array, Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::loader::{LABEL_COLUMN, SPECTRUM_COLUMN};

/// Write spectra (and optional sO2 labels) as a Parquet file readable by
/// [`super::loader::load_labelled`] / [`super::loader::load_spectra`].
pub fn write_parquet(path: &Path, spectra: &[Vec<f64>], labels: Option<&[f64]>) -> Result<()> {
    if let Some(labels) = labels {
        if labels.len() != spectra.len() {
            bail!(
                "{} spectra but {} labels for {}",
                spectra.len(),
                labels.len(),
                path.display()
            );
        }
    }

    let mut spectrum_builder = ListBuilder::new(Float64Builder::new());
    for row in spectra {
        let values = spectrum_builder.values();
        for &v in row {
            values.append_value(v);
        }
        spectrum_builder.append(true);
    }

    let mut fields = vec![Field::new(
        SPECTRUM_COLUMN,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(spectrum_builder.finish())];

    if let Some(labels) = labels {
        fields.push(Field::new(LABEL_COLUMN, DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(labels.to_vec())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
