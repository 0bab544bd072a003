// Error types for kartlap

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum KartlapError {
    // Errors while reading the telemetry export
    #[snafu(display("Unable to open telemetry file"))]
    InputIOError { source: io::Error },
    #[snafu(display("Error reading telemetry table"))]
    CsvError { source: csv::Error },
    #[snafu(display("Telemetry file has no header row: {path}"))]
    MissingHeader { path: String },
    #[snafu(display("No parseable telemetry rows in {path}"))]
    NoParseableRows { path: String },

    // Config management errors
    #[snafu(display("Could not find application config directory"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
    #[snafu(display("Invalid configuration: {reason}"))]
    InvalidConfig { reason: String },

    // Errors for the report writers
    #[snafu(display("Error writing report file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error serializing report"))]
    ReportSerializeError { source: serde_json::Error },

    // Analysis errors surfaced to the CLI
    #[snafu(display("Cannot compare laps: {reason}"))]
    NoComparableLaps { reason: String },
}

impl From<csv::Error> for KartlapError {
    fn from(value: csv::Error) -> Self {
        KartlapError::CsvError { source: value }
    }
}
