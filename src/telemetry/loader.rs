// Reader for delimited data-logger exports (Alfano / dashware style tables)

use std::{collections::HashMap, fs, path::Path};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{KartlapError, config::AnalysisConfig};

use super::{ChannelSet, Sample, Session, TimeFormat, normalize_time};

const MICRODEGREES_PER_DEGREE: f64 = 1_000_000.;

/// Header names of the columns the pipeline reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub lap: String,
    pub time: String,
    pub lat: String,
    pub lon: String,
    pub rpm: String,
    pub speed: String,
    pub gforce_x: String,
    pub gforce_y: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            lap: "Lap".to_string(),
            time: "Time Lap".to_string(),
            lat: "Lat.".to_string(),
            lon: "Lon.".to_string(),
            rpm: "RPM".to_string(),
            speed: "Speed GPS".to_string(),
            gforce_x: "Gf. X".to_string(),
            gforce_y: "Gf. Y".to_string(),
        }
    }
}

/// Unit of the latitude/longitude columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateUnits {
    #[default]
    Degrees,
    /// Degrees scaled by 10^6, as written by some logger exports
    Microdegrees,
}

impl CoordinateUnits {
    fn to_degrees(self, value: f64) -> f64 {
        match self {
            CoordinateUnits::Degrees => value,
            CoordinateUnits::Microdegrees => value / MICRODEGREES_PER_DEGREE,
        }
    }
}

/// Column positions resolved against one header row.
#[derive(Debug, Default)]
struct ColumnIndex {
    lap: Option<usize>,
    time: Option<usize>,
    lat: Option<usize>,
    lon: Option<usize>,
    rpm: Option<usize>,
    speed: Option<usize>,
    gforce_x: Option<usize>,
    gforce_y: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord, names: &ColumnNames) -> Self {
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim(), i))
            .collect();
        let find = |name: &str| positions.get(name.trim()).copied();
        Self {
            lap: find(&names.lap),
            time: find(&names.time),
            lat: find(&names.lat),
            lon: find(&names.lon),
            rpm: find(&names.rpm),
            speed: find(&names.speed),
            gforce_x: find(&names.gforce_x),
            gforce_y: find(&names.gforce_y),
        }
    }

    fn channels(&self) -> ChannelSet {
        ChannelSet {
            lap_index: self.lap.is_some(),
            time: self.time.is_some(),
            position: self.lat.is_some() && self.lon.is_some(),
            rpm: self.rpm.is_some(),
            speed: self.speed.is_some(),
            gforce_x: self.gforce_x.is_some(),
            gforce_y: self.gforce_y.is_some(),
        }
    }
}

/// Loads one export file into a `Session`.
///
/// Fails only when the file cannot be read or holds no parseable row; bad
/// cells become `None` on the affected field.
pub fn load_session(path: &Path, config: &AnalysisConfig) -> Result<Session, KartlapError> {
    let content = fs::read_to_string(path).map_err(|e| KartlapError::InputIOError { source: e })?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("session")
        .to_string();
    info!("Loading telemetry from {:?}", path);
    read_session(&content, &name, config).map_err(|e| match e {
        KartlapError::NoParseableRows { .. } => KartlapError::NoParseableRows {
            path: path.display().to_string(),
        },
        KartlapError::MissingHeader { .. } => KartlapError::MissingHeader {
            path: path.display().to_string(),
        },
        other => other,
    })
}

/// Parses the text of an export. `name` labels the session and error messages.
pub fn read_session(
    content: &str,
    name: &str,
    config: &AnalysisConfig,
) -> Result<Session, KartlapError> {
    let delimiter = match config.delimiter {
        Some(delimiter) if delimiter.is_ascii() => delimiter as u8,
        Some(delimiter) => {
            return Err(KartlapError::InvalidConfig {
                reason: format!("delimiter {:?} is not an ASCII character", delimiter),
            });
        }
        None => sniff_delimiter(content),
    };
    debug!("Using delimiter {:?} for {}", delimiter as char, name);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(KartlapError::MissingHeader {
            path: name.to_string(),
        });
    }

    let columns = ColumnIndex::resolve(&headers, &config.columns);
    let channels = columns.channels();
    if !channels.lap_index {
        warn!(
            "Column {:?} not found, lap grouping will be empty",
            config.columns.lap
        );
    }
    if !channels.time {
        warn!(
            "Column {:?} not found, lap times and sectors are unavailable",
            config.columns.time
        );
    }
    let time_format = columns
        .time
        .and_then(|i| headers.get(i))
        .map(|header| config.time_format.resolve(header))
        .unwrap_or(config.time_format);

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("Skipping unreadable row: {}", e);
                skipped += 1;
                continue;
            }
        };
        match parse_record(&record, &columns, time_format, config) {
            Some(sample) => samples.push(sample),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} rows without any parseable field", skipped);
    }
    if samples.is_empty() {
        return Err(KartlapError::NoParseableRows {
            path: name.to_string(),
        });
    }
    info!("Loaded {} samples from {}", samples.len(), name);

    Ok(Session::new(name, samples, channels))
}

fn parse_record(
    record: &StringRecord,
    columns: &ColumnIndex,
    time_format: TimeFormat,
    config: &AnalysisConfig,
) -> Option<Sample> {
    let cell = |index: Option<usize>| index.and_then(|i| record.get(i)).filter(|c| !c.is_empty());
    let number = |index: Option<usize>| cell(index).and_then(parse_number);

    let lap_cell = cell(columns.lap);
    let time_raw = cell(columns.time).map(str::to_string);
    let time_sec = time_raw
        .as_deref()
        .and_then(|raw| normalize_time(&time_format.to_value(raw)));
    let units = config.coordinate_units;

    let sample = Sample {
        time_sec,
        lap_index: lap_cell.map(parse_lap_index).unwrap_or(0),
        lat: number(columns.lat).map(|v| units.to_degrees(v)),
        lon: number(columns.lon).map(|v| units.to_degrees(v)),
        rpm: number(columns.rpm),
        speed_gps: number(columns.speed),
        gforce_x: number(columns.gforce_x),
        gforce_y: number(columns.gforce_y),
        sector: None,
        time_raw,
    };

    let has_any_field = lap_cell.and_then(parse_number).is_some()
        || sample.time_sec.is_some()
        || sample.lat.is_some()
        || sample.lon.is_some()
        || sample.rpm.is_some()
        || sample.speed_gps.is_some()
        || sample.gforce_x.is_some()
        || sample.gforce_y.is_some();
    has_any_field.then_some(sample)
}

fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Lap cells that are not a non-negative number fall back to the out-lap (0).
fn parse_lap_index(cell: &str) -> u32 {
    match parse_number(cell) {
        Some(value) if value >= 0. && value <= u32::MAX as f64 => value as u32,
        _ => 0,
    }
}

/// Picks `;` or `,` by counting both in the header line.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}
