use serde::{Deserialize, Serialize};

/// Separator between minutes and seconds in logger lap clocks ("1:02.345")
const CLOCK_SEPARATOR: char = ':';
const SECONDS_PER_MINUTE: f64 = 60.;
const TENTHS_PER_SECOND: f64 = 10.;

/// A raw time cell as it appears in a telemetry export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TimeValue {
    /// Elapsed seconds
    Seconds(f64),
    /// Tenths-of-second counter
    Tenths(i64),
    /// Clock string, either "M:SS.sss" or a plain number
    Text(String),
}

/// How the time column of an export should be read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeFormat {
    /// Clock strings or plain seconds. A header mentioning "1/10" is read as tenths.
    #[default]
    Auto,
    Seconds,
    Tenths,
}

impl TimeFormat {
    /// Resolves `Auto` against the time column header.
    pub fn resolve(self, header: &str) -> TimeFormat {
        match self {
            TimeFormat::Auto if header.contains("1/10") => TimeFormat::Tenths,
            other => other,
        }
    }

    /// Wraps a raw cell into the matching `TimeValue`.
    pub fn to_value(self, cell: &str) -> TimeValue {
        let cell = cell.trim();
        match self {
            TimeFormat::Tenths => match cell.parse::<i64>() {
                Ok(tenths) => TimeValue::Tenths(tenths),
                // some exports write the counter as "123.0"
                Err(_) => match cell.parse::<f64>() {
                    Ok(value) if value.is_finite() => TimeValue::Seconds(value / TENTHS_PER_SECOND),
                    _ => TimeValue::Text(cell.to_string()),
                },
            },
            TimeFormat::Seconds | TimeFormat::Auto => TimeValue::Text(cell.to_string()),
        }
    }
}

/// Converts a raw time value to elapsed seconds. Unparseable input yields `None`.
pub fn normalize_time(value: &TimeValue) -> Option<f64> {
    match value {
        TimeValue::Seconds(seconds) if seconds.is_finite() => Some(*seconds),
        TimeValue::Seconds(_) => None,
        TimeValue::Tenths(tenths) => Some(*tenths as f64 / TENTHS_PER_SECOND),
        TimeValue::Text(text) => normalize_time_str(text),
    }
}

/// Parses "M:SS.sss" or a plain number of seconds.
///
/// A clock string must split into exactly two parts around the separator,
/// anything else is rejected.
pub fn normalize_time_str(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains(CLOCK_SEPARATOR) {
        let parts: Vec<&str> = text.split(CLOCK_SEPARATOR).collect();
        if parts.len() != 2 {
            return None;
        }
        let minutes = parse_finite(parts[0])?;
        let seconds = parse_finite(parts[1])?;
        return Some(minutes * SECONDS_PER_MINUTE + seconds);
    }

    parse_finite(text)
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
