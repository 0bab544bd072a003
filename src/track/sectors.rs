// Sector labelling from gate crossing times, plus sector timing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::telemetry::Sample;

use super::gates::Crossing;

/// Sector number (1-based) for a lap time, given the crossing time of every
/// gate in gate order. The last sector wraps across the lap boundary.
fn sector_for_time(time_sec: f64, gate_times: &[f64]) -> Option<u8> {
    let (&first, &last) = (gate_times.first()?, gate_times.last()?);
    let last_sector = gate_times.len();
    if time_sec >= last || time_sec < first {
        return u8::try_from(last_sector).ok();
    }
    gate_times
        .windows(2)
        .position(|bounds| time_sec >= bounds[0] && time_sec < bounds[1])
        .and_then(|i| u8::try_from(i + 1).ok())
}

/// Labels a lap's samples with sector numbers.
///
/// Nothing is written unless every gate has a crossing. Samples without a
/// valid time keep `None`. Returns whether labels were written.
pub fn assign_sectors(samples: &mut [Sample], crossings: &[Option<Crossing>]) -> bool {
    if crossings.is_empty() || crossings.len() > u8::MAX as usize {
        return false;
    }
    let Some(gate_times) = crossings
        .iter()
        .map(|c| c.map(|c| c.time_sec))
        .collect::<Option<Vec<f64>>>()
    else {
        return false;
    };

    for sample in samples.iter_mut() {
        sample.sector = sample
            .time_sec
            .and_then(|time_sec| sector_for_time(time_sec, &gate_times));
    }
    true
}

/// Time spent in each sector of one lap.
///
/// Each sample contributes the time elapsed since the previous sample (in
/// time order) to its own sector; sectors with no samples are absent.
pub fn sector_times(samples: &[Sample]) -> BTreeMap<u8, f64> {
    let mut timed: Vec<(f64, Option<u8>)> = samples
        .iter()
        .filter_map(|s| s.time_sec.map(|t| (t, s.sector)))
        .collect();
    timed.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut totals = BTreeMap::new();
    let mut previous: Option<f64> = None;
    for (time_sec, sector) in timed {
        let step = previous.map(|p| time_sec - p).unwrap_or(0.);
        previous = Some(time_sec);
        if let Some(sector) = sector {
            *totals.entry(sector).or_insert(0.) += step;
        }
    }
    totals
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorBest {
    pub sector: u8,
    pub best_time: f64,
    pub best_lap: u32,
    pub mean_time: f64,
    pub laps: usize,
}

/// Fastest and mean time of every sector across laps.
pub fn sector_summary(per_lap: &BTreeMap<u32, BTreeMap<u8, f64>>) -> Vec<SectorBest> {
    let mut summary: BTreeMap<u8, SectorBest> = BTreeMap::new();
    for (&lap, sectors) in per_lap {
        for (&sector, &time) in sectors {
            summary
                .entry(sector)
                .and_modify(|best| {
                    if time < best.best_time {
                        best.best_time = time;
                        best.best_lap = lap;
                    }
                    best.mean_time += time;
                    best.laps += 1;
                })
                .or_insert(SectorBest {
                    sector,
                    best_time: time,
                    best_lap: lap,
                    mean_time: time,
                    laps: 1,
                });
        }
    }
    summary
        .into_values()
        .map(|mut best| {
            best.mean_time /= best.laps as f64;
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossing(time_sec: f64) -> Option<Crossing> {
        Some(Crossing {
            x: 0.,
            y: 0.,
            time_sec,
            sample_idx: 0,
        })
    }

    fn lap_samples(times: &[f64]) -> Vec<Sample> {
        times
            .iter()
            .map(|&t| Sample {
                lap_index: 1,
                time_sec: Some(t),
                ..Sample::default()
            })
            .collect()
    }

    fn five_gates() -> Vec<Option<Crossing>> {
        [10., 20., 30., 40., 50.].into_iter().map(crossing).collect()
    }

    #[test]
    fn test_wrap_around_sector() {
        let mut samples = lap_samples(&[5., 55.]);
        assert!(assign_sectors(&mut samples, &five_gates()));
        assert_eq!(samples[0].sector, Some(5));
        assert_eq!(samples[1].sector, Some(5));
    }

    #[test]
    fn test_half_open_sector_bounds() {
        let times: Vec<f64> = (0..60).map(|t| t as f64).collect();
        let mut samples = lap_samples(&times);
        assert!(assign_sectors(&mut samples, &five_gates()));
        let sector_at = |t: usize| samples[t].sector;
        assert_eq!(sector_at(9), Some(5));
        assert_eq!(sector_at(10), Some(1));
        assert_eq!(sector_at(19), Some(1));
        assert_eq!(sector_at(20), Some(2));
        assert_eq!(sector_at(35), Some(3));
        assert_eq!(sector_at(49), Some(4));
        assert_eq!(sector_at(50), Some(5));
    }

    #[test]
    fn test_missing_crossing_skips_whole_lap() {
        let mut samples = lap_samples(&[5., 15., 25.]);
        let mut crossings = five_gates();
        crossings[2] = None;
        assert!(!assign_sectors(&mut samples, &crossings));
        assert!(samples.iter().all(|s| s.sector.is_none()));
        assert!(!assign_sectors(&mut samples, &[]));
    }

    #[test]
    fn test_untimed_sample_stays_unlabeled() {
        let mut samples = lap_samples(&[15.]);
        samples.push(Sample::default());
        assign_sectors(&mut samples, &five_gates());
        assert_eq!(samples[0].sector, Some(1));
        assert_eq!(samples[1].sector, None);
    }

    #[test]
    fn test_sector_times_accumulate_steps() {
        let times: Vec<f64> = (0..60).map(|t| t as f64).collect();
        let mut samples = lap_samples(&times);
        assign_sectors(&mut samples, &five_gates());
        let totals = sector_times(&samples);
        assert_eq!(totals[&1], 10.);
        assert_eq!(totals[&2], 10.);
        // the first sample has no predecessor: 0..9 contributes 9, 50..59 contributes 10
        assert_eq!(totals[&5], 19.);
        assert_eq!(totals.values().sum::<f64>(), 59.);
    }

    #[test]
    fn test_sector_summary() {
        let mut per_lap = BTreeMap::new();
        per_lap.insert(1, BTreeMap::from([(1u8, 10.0), (2u8, 12.0)]));
        per_lap.insert(2, BTreeMap::from([(1u8, 9.5), (2u8, 12.5)]));
        let summary = sector_summary(&per_lap);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].best_lap, 2);
        assert_eq!(summary[0].best_time, 9.5);
        assert_eq!(summary[0].mean_time, 9.75);
        assert_eq!(summary[1].best_lap, 1);
        assert_eq!(summary[1].laps, 2);
    }
}
