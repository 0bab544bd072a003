pub mod loader;
pub mod time;

use serde::{Deserialize, Serialize};

pub use loader::load_session;
pub use time::{TimeFormat, TimeValue, normalize_time, normalize_time_str};

/// One telemetry record from the data logger.
///
/// Signal fields are `None` when the cell was empty, unparseable or the
/// column is absent from the export.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time cell exactly as logged
    pub time_raw: Option<String>,
    /// Lap-relative elapsed seconds
    pub time_sec: Option<f64>,
    /// Lap counter, 0 is the out-lap before the first timing line crossing
    pub lap_index: u32,
    /// Latitude in decimal degrees
    pub lat: Option<f64>,
    /// Longitude in decimal degrees
    pub lon: Option<f64>,
    /// Engine RPM
    pub rpm: Option<f64>,
    /// GPS speed, km/h
    pub speed_gps: Option<f64>,
    /// Longitudinal G, positive under acceleration
    pub gforce_x: Option<f64>,
    /// Lateral G, positive in right-hand corners
    pub gforce_y: Option<f64>,
    /// Sector label, written by the sector assigner
    pub sector: Option<u8>,
}

impl Sample {
    pub fn channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Rpm => self.rpm,
            Channel::Speed => self.speed_gps,
            Channel::LongitudinalG => self.gforce_x,
            Channel::LateralG => self.gforce_y,
        }
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Numeric signal channels carried by a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Rpm,
    Speed,
    LongitudinalG,
    LateralG,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Rpm => write!(f, "RPM"),
            Channel::Speed => write!(f, "Speed"),
            Channel::LongitudinalG => write!(f, "Longitudinal G"),
            Channel::LateralG => write!(f, "Lateral G"),
        }
    }
}

/// Which columns were present in the source header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub lap_index: bool,
    pub time: bool,
    pub position: bool,
    pub rpm: bool,
    pub speed: bool,
    pub gforce_x: bool,
    pub gforce_y: bool,
}

impl ChannelSet {
    /// Every column present.
    pub fn all() -> Self {
        Self {
            lap_index: true,
            time: true,
            position: true,
            rpm: true,
            speed: true,
            gforce_x: true,
            gforce_y: true,
        }
    }

    pub fn has(&self, channel: Channel) -> bool {
        match channel {
            Channel::Rpm => self.rpm,
            Channel::Speed => self.speed,
            Channel::LongitudinalG => self.gforce_x,
            Channel::LateralG => self.gforce_y,
        }
    }
}

/// All samples of one logger export, in file order.
///
/// Laps are index ranges into `samples`; nothing is copied per lap.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub name: String,
    pub samples: Vec<Sample>,
    pub channels: ChannelSet,
}

impl Session {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>, channels: ChannelSet) -> Self {
        Self {
            name: name.into(),
            samples,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
