// RPM distribution per sector, across all laps and on the sector's best lap

use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;
use crate::track::SectorBest;

/// Equal-width RPM bins covering `[min_rpm, max_rpm)`. Each bin is
/// half-open, `[edge, edge + width)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpmBins {
    pub min_rpm: f64,
    pub max_rpm: f64,
    pub width: f64,
}

impl Default for RpmBins {
    fn default() -> Self {
        Self {
            min_rpm: 6000.,
            max_rpm: 13000.,
            width: 250.,
        }
    }
}

impl RpmBins {
    pub fn len(&self) -> usize {
        if !(self.width > 0.) || !(self.max_rpm > self.min_rpm) {
            return 0;
        }
        ((self.max_rpm - self.min_rpm) / self.width).floor() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bin edges, one more than there are bins.
    pub fn edges(&self) -> Vec<f64> {
        (0..=self.len())
            .map(|i| self.min_rpm + i as f64 * self.width)
            .collect()
    }

    /// Bin holding `rpm`, `None` outside the covered range.
    pub fn index(&self, rpm: f64) -> Option<usize> {
        if !(rpm >= self.min_rpm) {
            return None;
        }
        let index = ((rpm - self.min_rpm) / self.width).floor() as usize;
        (index < self.len()).then_some(index)
    }

    pub fn count(&self, values: impl IntoIterator<Item = f64>) -> Vec<usize> {
        let mut counts = vec![0; self.len()];
        for index in values.into_iter().filter_map(|rpm| self.index(rpm)) {
            counts[index] += 1;
        }
        counts
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorRpmHistogram {
    pub sector: u8,
    pub best_lap: u32,
    pub edges: Vec<f64>,
    /// Samples of every lap
    pub all_laps: Vec<usize>,
    /// Samples of the lap with the fastest time in this sector
    pub best_lap_counts: Vec<usize>,
    /// `all_laps` divided by the number of laps that timed the sector
    pub per_lap_average: Vec<f64>,
}

/// RPM histogram of every sector in `summary`, built from the sector labels
/// on `samples`.
pub fn sector_rpm_histograms(
    samples: &[Sample],
    summary: &[SectorBest],
    bins: &RpmBins,
) -> Vec<SectorRpmHistogram> {
    summary
        .iter()
        .map(|best| {
            let in_sector: Vec<&Sample> = samples
                .iter()
                .filter(|s| s.sector == Some(best.sector))
                .collect();
            let all_laps = bins.count(in_sector.iter().filter_map(|s| s.rpm));
            let best_lap_counts = bins.count(
                in_sector
                    .iter()
                    .filter(|s| s.lap_index == best.best_lap)
                    .filter_map(|s| s.rpm),
            );
            let laps = best.laps.max(1) as f64;
            SectorRpmHistogram {
                sector: best.sector,
                best_lap: best.best_lap,
                edges: bins.edges(),
                per_lap_average: all_laps.iter().map(|&n| n as f64 / laps).collect(),
                all_laps,
                best_lap_counts,
            }
        })
        .collect()
}
