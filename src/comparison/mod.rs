// Index-aligned comparison of a success lap against an average lap
//
// Both laps are truncated to the shorter one and compared sample by sample.
// This assumes equal sample rates and that both laps start in sync at the
// timing line; no time or distance alignment is attempted.

use itertools::{Itertools, MinMaxResult};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::laps::Lap;
use crate::telemetry::{Channel, Sample};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonThresholds {
    /// |speed diff| above this (km/h) marks a significant point
    pub speed_kmh: f64,
    /// |G diff| above this, on either axis, marks a significant point
    pub gforce: f64,
    /// Significant indices at most this far apart share a section
    pub section_gap: usize,
    /// Points listed in the difference analysis
    pub top_points: usize,
}

impl Default for ComparisonThresholds {
    fn default() -> Self {
        Self {
            speed_kmh: 3.0,
            gforce: 0.1,
            section_gap: 3,
            top_points: 10,
        }
    }
}

/// `success - average` per index; `None` where either side is missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDiffs {
    pub speed: Vec<Option<f64>>,
    pub rpm: Vec<Option<f64>>,
    pub gforce_x: Vec<Option<f64>>,
    pub gforce_y: Vec<Option<f64>>,
}

impl ChannelDiffs {
    pub fn channel(&self, channel: Channel) -> &[Option<f64>] {
        match channel {
            Channel::Speed => &self.speed,
            Channel::Rpm => &self.rpm,
            Channel::LongitudinalG => &self.gforce_x,
            Channel::LateralG => &self.gforce_y,
        }
    }

    pub fn len(&self) -> usize {
        self.speed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_empty()
    }
}

/// Summary of one channel. Any field is `None` when it has no values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean_diff: Option<f64>,
    /// Population standard deviation
    pub std_diff: Option<f64>,
    pub max_diff: Option<f64>,
    pub min_diff: Option<f64>,
    pub success_mean: Option<f64>,
    pub average_mean: Option<f64>,
    pub success_max: Option<f64>,
    pub average_max: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStatistics {
    pub speed: ChannelStats,
    pub rpm: ChannelStats,
    pub gforce_x: ChannelStats,
    /// Per-lap mean and max use |lateral G|
    pub gforce_y: ChannelStats,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignificantPoint {
    pub index: usize,
    pub time_sec: Option<f64>,
    pub speed_diff: Option<f64>,
    pub rpm_diff: Option<f64>,
    pub gforce_x_diff: Option<f64>,
    pub gforce_y_diff: Option<f64>,
}

/// Run of significant indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferenceSection {
    pub start: usize,
    pub end: usize,
    pub count: usize,
    pub indices: Vec<usize>,
    pub avg_speed_diff: Option<f64>,
    pub avg_rpm_diff: Option<f64>,
    pub avg_gforce_x_diff: Option<f64>,
    pub avg_gforce_y_diff: Option<f64>,
    /// `count * |avg_speed_diff|`
    pub impact_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub success_lap: u32,
    pub average_lap: u32,
    pub success_time: Option<f64>,
    pub average_time: Option<f64>,
    /// `average_time - success_time`
    pub time_difference: Option<f64>,
    pub diffs: ChannelDiffs,
    pub statistics: ComparisonStatistics,
    pub significant_points: Vec<SignificantPoint>,
    /// Sorted by descending impact score
    pub sections: Vec<DifferenceSection>,
}

impl ComparisonResult {
    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

fn channel_diffs(success: &[Sample], average: &[Sample], channel: Channel) -> Vec<Option<f64>> {
    success
        .iter()
        .zip(average)
        .map(|(s, a)| Some(s.channel(channel)? - a.channel(channel)?))
        .collect()
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (count, sum) = values
        .into_iter()
        .fold((0usize, 0.), |(n, sum), v| (n + 1, sum + v));
    (count > 0).then(|| sum / count as f64)
}

fn max(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    values.into_iter().max_by(f64::total_cmp)
}

fn channel_stats(
    diffs: &[Option<f64>],
    success: &[Sample],
    average: &[Sample],
    channel: Channel,
    absolute: bool,
) -> ChannelStats {
    let present: Vec<f64> = diffs.iter().flatten().copied().collect();
    let mean_diff = mean(present.iter().copied());
    let std_diff = mean_diff.map(|m| {
        let variance = present.iter().map(|d| (d - m).powi(2)).sum::<f64>() / present.len() as f64;
        variance.sqrt()
    });
    let (min_diff, max_diff) = match present.iter().copied().minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => (None, None),
        MinMaxResult::OneElement(v) => (Some(v), Some(v)),
        MinMaxResult::MinMax(min, max) => (Some(min), Some(max)),
    };

    let lap_values = |samples: &[Sample]| -> Vec<f64> {
        samples
            .iter()
            .filter_map(|s| s.channel(channel))
            .map(|v| if absolute { v.abs() } else { v })
            .collect()
    };
    let success_values = lap_values(success);
    let average_values = lap_values(average);

    ChannelStats {
        mean_diff,
        std_diff,
        max_diff,
        min_diff,
        success_mean: mean(success_values.iter().copied()),
        average_mean: mean(average_values.iter().copied()),
        success_max: max(success_values),
        average_max: max(average_values),
    }
}

fn exceeds(diff: Option<f64>, threshold: f64) -> bool {
    diff.is_some_and(|d| d.abs() > threshold)
}

fn build_sections(
    points: &[SignificantPoint],
    diffs: &ChannelDiffs,
    gap: usize,
) -> Vec<DifferenceSection> {
    let indices: Vec<usize> = points.iter().map(|p| p.index).sorted().collect();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for index in indices {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|&last| index - last <= gap) => group.push(index),
            _ => groups.push(vec![index]),
        }
    }

    let mut sections: Vec<DifferenceSection> = groups
        .into_iter()
        .filter_map(|indices| {
            let (&start, &end) = (indices.first()?, indices.last()?);
            let avg = |values: &[Option<f64>]| mean(indices.iter().filter_map(|&i| values[i]));
            let avg_speed_diff = avg(&diffs.speed);
            Some(DifferenceSection {
                start,
                end,
                count: indices.len(),
                avg_speed_diff,
                avg_rpm_diff: avg(&diffs.rpm),
                avg_gforce_x_diff: avg(&diffs.gforce_x),
                avg_gforce_y_diff: avg(&diffs.gforce_y),
                impact_score: indices.len() as f64 * avg_speed_diff.map(f64::abs).unwrap_or(0.),
                indices,
            })
        })
        .collect();
    sections.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
    sections
}

/// Compares two laps index by index over the shorter of the two.
pub fn compare_laps(success: &Lap, average: &Lap, thresholds: &ComparisonThresholds) -> ComparisonResult {
    let length = success.len().min(average.len());
    let (success_samples, average_samples) = (&success.samples[..length], &average.samples[..length]);
    debug!(
        "Comparing lap {} against lap {} over {} samples",
        success.number, average.number, length
    );

    let diffs = ChannelDiffs {
        speed: channel_diffs(success_samples, average_samples, Channel::Speed),
        rpm: channel_diffs(success_samples, average_samples, Channel::Rpm),
        gforce_x: channel_diffs(success_samples, average_samples, Channel::LongitudinalG),
        gforce_y: channel_diffs(success_samples, average_samples, Channel::LateralG),
    };

    let stats = |channel: Channel, absolute: bool| {
        channel_stats(diffs.channel(channel), success_samples, average_samples, channel, absolute)
    };
    let statistics = ComparisonStatistics {
        speed: stats(Channel::Speed, false),
        rpm: stats(Channel::Rpm, false),
        gforce_x: stats(Channel::LongitudinalG, false),
        gforce_y: stats(Channel::LateralG, true),
    };

    let significant_points: Vec<SignificantPoint> = (0..length)
        .filter(|&i| {
            exceeds(diffs.speed[i], thresholds.speed_kmh)
                || exceeds(diffs.gforce_y[i], thresholds.gforce)
                || exceeds(diffs.gforce_x[i], thresholds.gforce)
        })
        .map(|i| SignificantPoint {
            index: i,
            time_sec: success_samples[i].time_sec,
            speed_diff: diffs.speed[i],
            rpm_diff: diffs.rpm[i],
            gforce_x_diff: diffs.gforce_x[i],
            gforce_y_diff: diffs.gforce_y[i],
        })
        .collect();
    let sections = build_sections(&significant_points, &diffs, thresholds.section_gap);

    let (success_time, average_time) = (success.lap_time(), average.lap_time());
    ComparisonResult {
        success_lap: success.number,
        average_lap: average.number,
        success_time,
        average_time,
        time_difference: average_time.zip(success_time).map(|(a, s)| a - s),
        diffs,
        statistics,
        significant_points,
        sections,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferenceAnalysis {
    pub significant_points_count: usize,
    /// Largest |speed diff| first
    pub top_points: Vec<SignificantPoint>,
    pub avg_speed_diff: Option<f64>,
    pub avg_rpm_diff: Option<f64>,
    pub avg_gforce_x_diff: Option<f64>,
    pub avg_gforce_y_diff: Option<f64>,
    pub max_speed_diff_point: Option<SignificantPoint>,
    pub max_gforce_x_diff_point: Option<SignificantPoint>,
    pub max_gforce_y_diff_point: Option<SignificantPoint>,
}

fn largest_by(
    points: &[SignificantPoint],
    key: impl Fn(&SignificantPoint) -> Option<f64>,
) -> Option<SignificantPoint> {
    points
        .iter()
        .filter(|p| key(p).is_some())
        .max_by(|a, b| {
            let (a, b) = (key(a).unwrap_or(0.).abs(), key(b).unwrap_or(0.).abs());
            // first point wins ties
            a.total_cmp(&b).then(std::cmp::Ordering::Greater)
        })
        .copied()
}

/// Ranks and averages the significant points of a comparison.
pub fn analyze_differences(result: &ComparisonResult, top_points: usize) -> DifferenceAnalysis {
    let points = &result.significant_points;
    let by_speed: Vec<SignificantPoint> = points
        .iter()
        .copied()
        .sorted_by(|a, b| {
            let key = |p: &SignificantPoint| p.speed_diff.map(f64::abs).unwrap_or(0.);
            key(b).total_cmp(&key(a))
        })
        .collect();

    DifferenceAnalysis {
        significant_points_count: points.len(),
        top_points: by_speed.iter().take(top_points).copied().collect(),
        avg_speed_diff: mean(points.iter().filter_map(|p| p.speed_diff)),
        avg_rpm_diff: mean(points.iter().filter_map(|p| p.rpm_diff)),
        avg_gforce_x_diff: mean(points.iter().filter_map(|p| p.gforce_x_diff)),
        avg_gforce_y_diff: mean(points.iter().filter_map(|p| p.gforce_y_diff)),
        max_speed_diff_point: largest_by(points, |p| p.speed_diff),
        max_gforce_x_diff_point: largest_by(points, |p| p.gforce_x_diff),
        max_gforce_y_diff_point: largest_by(points, |p| p.gforce_y_diff),
    }
}

/// An inclusive RPM range; `max_rpm = None` is open-ended.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RpmBand {
    pub name: &'static str,
    pub min_rpm: f64,
    pub max_rpm: Option<f64>,
}

impl RpmBand {
    pub fn contains(&self, rpm: f64) -> bool {
        rpm >= self.min_rpm && self.max_rpm.is_none_or(|max| rpm <= max)
    }
}

pub const RPM_BANDS: [RpmBand; 3] = [
    RpmBand {
        name: "low",
        min_rpm: 0.,
        max_rpm: Some(7000.),
    },
    RpmBand {
        name: "mid",
        min_rpm: 7001.,
        max_rpm: Some(10000.),
    },
    RpmBand {
        name: "high",
        min_rpm: 10001.,
        max_rpm: None,
    },
];

/// How one lap behaves inside an RPM band. All zeros for an empty band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandStats {
    pub data_points: usize,
    /// Share of the lap's samples in this band
    pub data_points_ratio: f64,
    pub avg_speed: f64,
    pub max_speed: f64,
    pub avg_rpm: f64,
    pub speed_rpm_ratio: f64,
}

impl BandStats {
    fn of(samples: &[Sample], band: &RpmBand) -> Self {
        let in_band: Vec<&Sample> = samples
            .iter()
            .filter(|s| s.rpm.is_some_and(|rpm| band.contains(rpm)))
            .collect();
        if in_band.is_empty() {
            return Self::default();
        }
        let avg_speed = mean(in_band.iter().filter_map(|s| s.speed_gps)).unwrap_or(0.);
        let avg_rpm = mean(in_band.iter().filter_map(|s| s.rpm)).unwrap_or(0.);
        Self {
            data_points: in_band.len(),
            data_points_ratio: in_band.len() as f64 / samples.len() as f64,
            avg_speed,
            max_speed: max(in_band.iter().filter_map(|s| s.speed_gps)).unwrap_or(0.),
            avg_rpm,
            speed_rpm_ratio: if avg_rpm > 0. { avg_speed / avg_rpm } else { 0. },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RpmBandComparison {
    pub band: RpmBand,
    pub success: BandStats,
    pub average: BandStats,
    /// `success - average`, all zeros unless both laps have samples in the band
    pub differences: BandStats,
}

/// Compares how both laps use each RPM band. Uses the full laps, not the
/// truncated comparison window.
pub fn analyze_rpm_bands(success: &Lap, average: &Lap) -> Vec<RpmBandComparison> {
    RPM_BANDS
        .iter()
        .map(|band| {
            let s = BandStats::of(success.samples, band);
            let a = BandStats::of(average.samples, band);
            let differences = if s.data_points > 0 && a.data_points > 0 {
                BandStats {
                    data_points: 0,
                    data_points_ratio: s.data_points_ratio - a.data_points_ratio,
                    avg_speed: s.avg_speed - a.avg_speed,
                    max_speed: s.max_speed - a.max_speed,
                    avg_rpm: s.avg_rpm - a.avg_rpm,
                    speed_rpm_ratio: s.speed_rpm_ratio - a.speed_rpm_ratio,
                }
            } else {
                BandStats::default()
            };
            RpmBandComparison {
                band: *band,
                success: s,
                average: a,
                differences,
            }
        })
        .collect()
}
