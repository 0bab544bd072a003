use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::KartlapError;
use crate::comparison::ComparisonThresholds;
use crate::engine::{Gearing, RpmBins};
use crate::events::EventThresholds;
use crate::laps::CategoryThresholds;
use crate::telemetry::TimeFormat;
use crate::telemetry::loader::{ColumnNames, CoordinateUnits};
use crate::track::{CrossingPolicy, Gate, ProjectionConfig};

const CONFIG_DIR_NAME: &str = "kartlap";
const CONFIG_FILE_NAME: &str = "config.json";

/// Everything the analysis can be tuned with. Missing keys in a config file
/// take their default value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub columns: ColumnNames,
    pub time_format: TimeFormat,
    pub coordinate_units: CoordinateUnits,
    /// Field delimiter; sniffed from the header line when unset
    pub delimiter: Option<char>,
    pub projection: ProjectionConfig,
    /// Sector gates in the planar frame, in lap order
    pub gates: Vec<Gate>,
    pub crossing_policy: CrossingPolicy,
    pub categories: CategoryThresholds,
    pub events: EventThresholds,
    pub comparison: ComparisonThresholds,
    /// Bins of the per-sector RPM histograms
    pub rpm_bins: RpmBins,
    /// Sprockets and tire of the session; no gearing suggestion without it
    pub gearing: Option<Gearing>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            time_format: TimeFormat::default(),
            coordinate_units: CoordinateUnits::default(),
            delimiter: None,
            projection: ProjectionConfig::default(),
            gates: Vec::new(),
            crossing_policy: CrossingPolicy::default(),
            categories: CategoryThresholds::default(),
            events: EventThresholds::default(),
            comparison: ComparisonThresholds::default(),
            rpm_bins: RpmBins::default(),
            gearing: None,
        }
    }
}

impl AnalysisConfig {
    pub fn local_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Config from the user's config directory, `None` when there is none.
    pub fn from_local_file() -> Result<Option<Self>, KartlapError> {
        match Self::local_path() {
            Some(path) if path.exists() => Self::from_file(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, KartlapError> {
        let file = std::fs::File::open(path).map_err(|e| KartlapError::ConfigIOError { source: e })?;
        let config: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| KartlapError::ConfigSerializeError { source: e })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), KartlapError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KartlapError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(path).map_err(|e| KartlapError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| KartlapError::ConfigSerializeError { source: e })
    }

    /// Saves into the user's config directory.
    pub fn save_local(&self) -> Result<PathBuf, KartlapError> {
        let path = Self::local_path().ok_or(KartlapError::NoConfigDir)?;
        self.save(&path)?;
        Ok(path)
    }

    pub fn validate(&self) -> Result<(), KartlapError> {
        let invalid = |reason: &str| {
            Err(KartlapError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if !(self.categories.success_below <= self.categories.average_below) {
            return invalid("categories.success_below must not exceed categories.average_below");
        }
        if self.delimiter.is_some_and(|d| !d.is_ascii()) {
            return invalid("delimiter must be an ASCII character");
        }
        if self.gates.len() > u8::MAX as usize {
            return invalid("at most 255 gates are supported");
        }
        if self.gates.iter().any(|g| g.length() == 0.) {
            return invalid("gate endpoints must differ");
        }
        if self.events.corner_window == 0 || self.events.braking_window == 0 {
            return invalid("event windows must be at least one sample");
        }
        if !(self.events.partial_accel_min_gforce < self.events.partial_accel_max_gforce) {
            return invalid("partial acceleration band is empty");
        }
        let bins = &self.rpm_bins;
        if !(bins.width > 0.) || !(bins.max_rpm >= bins.min_rpm + bins.width) {
            return invalid("rpm_bins must hold at least one bin of positive width");
        }
        if let Some(gearing) = &self.gearing {
            if gearing.front_sprocket == 0 || gearing.rear_sprocket == 0 {
                return invalid("gearing sprockets need at least one tooth");
            }
            if !(gearing.tire_diameter_mm > 0.) || !(gearing.speed_divisor > 0.) {
                return invalid("gearing.tire_diameter_mm and gearing.speed_divisor must be positive");
            }
        }
        Ok(())
    }
}
