//! CSV input, CSV/JSON output and panel spec files.

use std::{
    fs::File,
    io::{self, BufReader, Seek, Write},
    path::Path,
    sync::Arc,
};

use arrow::{array::RecordBatch, compute::concat_batches};
use arrow_csv::{ReaderBuilder, WriterBuilder, reader::Format};
use serde::Serialize;
use snafu::ResultExt;
use timeseries_panel_core::PanelSpec;

use crate::error::{
    CliResult, CreateOutputSnafu, InputMissingSnafu, ReadCsvSnafu, SpecFileSnafu,
    SpecMissingSnafu, WriteCsvSnafu, WriteJsonSnafu,
};

/// Read a headed CSV file into one batch, inferring column types.
pub fn read_csv(path: &Path) -> CliResult<RecordBatch> {
    let display = path.display().to_string();
    let mut file = File::open(path).context(InputMissingSnafu {
        path: display.clone(),
    })?;

    let format = Format::default().with_header(true);
    let (schema, records) = format
        .infer_schema(BufReader::new(&file), None)
        .context(ReadCsvSnafu {
            path: display.clone(),
        })?;
    file.rewind().context(InputMissingSnafu {
        path: display.clone(),
    })?;
    log::debug!("{display}: {records} records, schema {schema:?}");

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(file)
        .context(ReadCsvSnafu {
            path: display.clone(),
        })?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .context(ReadCsvSnafu {
            path: display.clone(),
        })?;
    concat_batches(&schema, &batches).context(ReadCsvSnafu { path: display })
}

/// Read a JSON-encoded [`PanelSpec`].
pub fn read_spec(path: &Path) -> CliResult<PanelSpec> {
    let display = path.display().to_string();
    let file = File::open(path).context(SpecMissingSnafu {
        path: display.clone(),
    })?;
    serde_json::from_reader(BufReader::new(file)).context(SpecFileSnafu { path: display })
}

/// Write `batch` as headed CSV to `output`, or stdout when absent.
pub fn write_csv(batch: &RecordBatch, output: Option<&Path>) -> CliResult<()> {
    match output {
        Some(path) => {
            let file = File::create(path).context(CreateOutputSnafu {
                path: path.display().to_string(),
            })?;
            write_csv_to(batch, file)
        }
        None => write_csv_to(batch, io::stdout().lock()),
    }
}

fn write_csv_to<W: Write>(batch: &RecordBatch, sink: W) -> CliResult<()> {
    let mut writer = WriterBuilder::new().with_header(true).build(sink);
    writer.write(batch).context(WriteCsvSnafu)
}

/// Pretty-print `value` as JSON on stdout.
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context(WriteJsonSnafu)?;
    let _ = writeln!(out);
    Ok(())
}
