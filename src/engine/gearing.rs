// Rear sprocket suggestion from RPM against GPS speed, per sector
//
// For every candidate rear sprocket the speed implied by RPM is compared with
// GPS speed. Errors are weighted by how often the sector's best lap used each
// RPM bin, so the fit favours the engine range the fastest lap lived in.

use std::{f64::consts::PI, ops::RangeInclusive};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;
use crate::track::SectorBest;

use super::histogram::RpmBins;

fn default_rear_delta() -> u32 {
    3
}

fn default_speed_divisor() -> f64 {
    1.
}

/// Drivetrain the session was driven with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gearing {
    pub front_sprocket: u32,
    pub rear_sprocket: u32,
    pub tire_diameter_mm: f64,
    /// Rear sprockets tried on each side of the current one
    #[serde(default = "default_rear_delta")]
    pub rear_delta: u32,
    /// GPS speed is divided by this to get km/h, 10 for loggers storing tenths
    #[serde(default = "default_speed_divisor")]
    pub speed_divisor: f64,
}

impl Gearing {
    pub fn new(front_sprocket: u32, rear_sprocket: u32, tire_diameter_mm: f64) -> Self {
        Self {
            front_sprocket,
            rear_sprocket,
            tire_diameter_mm,
            rear_delta: default_rear_delta(),
            speed_divisor: default_speed_divisor(),
        }
    }

    /// Road speed in km/h at `rpm` with `rear` teeth on the axle.
    pub fn speed_kmh(&self, rpm: f64, rear: u32) -> f64 {
        let ratio = rear as f64 / self.front_sprocket as f64;
        let wheel_rpm = rpm / ratio;
        let metres_per_second = wheel_rpm * PI * self.tire_diameter_mm / 60_000.;
        metres_per_second * 3.6
    }

    pub fn candidates(&self) -> RangeInclusive<u32> {
        let low = self.rear_sprocket.saturating_sub(self.rear_delta).max(1);
        low..=self.rear_sprocket.saturating_add(self.rear_delta)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GearScore {
    pub rear_sprocket: u32,
    /// Weighted RMSE between implied and GPS speed, km/h
    pub rmse: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectorGearing {
    pub sector: u8,
    pub suggested_rear: u32,
    /// Weight of this sector in the overall suggestion
    pub mean_time: f64,
    pub samples: usize,
    pub scores: Vec<GearScore>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GearSuggestion {
    pub front_sprocket: u32,
    pub current_rear: u32,
    /// Per-sector picks averaged with the mean sector time as weight
    pub overall_rear: f64,
    pub sectors: Vec<SectorGearing>,
}

/// Normalised best-lap histogram, `None` when the best lap has no sample in range.
fn reference_weights(counts: &[usize]) -> Option<Vec<f64>> {
    let total: usize = counts.iter().sum();
    (total > 0).then(|| counts.iter().map(|&n| n as f64 / total as f64).collect())
}

fn score_sector(
    points: &[(u32, f64, f64)],
    best: &SectorBest,
    bins: &RpmBins,
    gearing: &Gearing,
) -> Option<SectorGearing> {
    let reference = bins.count(
        points
            .iter()
            .filter(|(lap, _, _)| *lap == best.best_lap)
            .map(|&(_, rpm, _)| rpm),
    );
    let weights = reference_weights(&reference)?;

    let scores: Vec<GearScore> = gearing
        .candidates()
        .filter_map(|rear| {
            let (error, weight) = points
                .iter()
                .filter_map(|&(_, rpm, speed)| {
                    let weight = weights[bins.index(rpm)?];
                    let actual = speed / gearing.speed_divisor;
                    Some((weight * (gearing.speed_kmh(rpm, rear) - actual).powi(2), weight))
                })
                .fold((0., 0.), |(e, w), (de, dw)| (e + de, w + dw));
            (weight > 0.).then(|| GearScore {
                rear_sprocket: rear,
                rmse: (error / weight).sqrt(),
            })
        })
        .collect();

    let suggested = scores.iter().min_by(|a, b| a.rmse.total_cmp(&b.rmse))?;
    Some(SectorGearing {
        sector: best.sector,
        suggested_rear: suggested.rear_sprocket,
        mean_time: best.mean_time,
        samples: points.len(),
        scores,
    })
}

/// Best rear sprocket per sector and their time-weighted average.
///
/// Only samples with a sector label, RPM and GPS speed take part. A sector
/// whose best lap has no RPM inside `bins` is skipped; `None` when every
/// sector is skipped.
pub fn suggest_gearing(
    samples: &[Sample],
    summary: &[SectorBest],
    bins: &RpmBins,
    gearing: &Gearing,
) -> Option<GearSuggestion> {
    let mut sectors = Vec::with_capacity(summary.len());
    for best in summary {
        let points: Vec<(u32, f64, f64)> = samples
            .iter()
            .filter(|s| s.sector == Some(best.sector))
            .filter_map(|s| Some((s.lap_index, s.rpm?, s.speed_gps?)))
            .collect();
        match score_sector(&points, best, bins, gearing) {
            Some(sector) => sectors.push(sector),
            None => debug!(
                "Sector {}: no RPM in range on lap {}, no gearing suggestion",
                best.sector, best.best_lap
            ),
        }
    }

    let total_weight: f64 = sectors.iter().map(|s| s.mean_time).sum();
    if !(total_weight > 0.) {
        return None;
    }
    let weighted: f64 = sectors
        .iter()
        .map(|s| s.suggested_rear as f64 * s.mean_time)
        .sum();
    Some(GearSuggestion {
        front_sprocket: gearing.front_sprocket,
        current_rear: gearing.rear_sprocket,
        overall_rear: weighted / total_weight,
        sectors,
    })
}
