use arrow::error::ArrowError;
use timeseries_panel_core::PanelError;

use snafu::Snafu;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Input file not found or not accessible: {path}"))]
    InputMissing {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read CSV {path}: {source}"))]
    ReadCsv { path: String, source: ArrowError },

    #[snafu(display("Failed to read panel spec {path}: {source}"))]
    SpecFile {
        path: String,
        source: serde_json::Error,
    },

    #[snafu(display("Spec file not found or not accessible: {path}"))]
    SpecMissing {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Either --index or --spec is required"))]
    MissingIndex,

    #[snafu(display("Invalid --column-value '{spec}'. Expected NAME=VALUE"))]
    InvalidColumnValue { spec: String },

    #[snafu(display("{source}"))]
    Panel {
        #[snafu(source(from(PanelError, Box::new)))]
        source: Box<PanelError>,
    },

    #[snafu(display("Failed to create output file: {path}"))]
    CreateOutput {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("Failed to write CSV output: {source}"))]
    WriteCsv { source: ArrowError },

    #[snafu(display("Failed to write JSON output: {source}"))]
    WriteJson { source: serde_json::Error },
}
