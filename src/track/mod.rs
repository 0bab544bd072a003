// Track geometry: planar projection, sector gates and sector labelling

pub mod gates;
pub mod projection;
pub mod sectors;

pub use gates::{Crossing, CrossingPolicy, Gate, TrackPoint, crossings_for_lap, find_crossings};
pub use projection::{PlanarFrame, PlanarPoint, ProjectionConfig, ReferencePoint, project};
pub use sectors::{SectorBest, assign_sectors, sector_summary, sector_times};

use crate::telemetry::Sample;

/// The lap's samples that have both a position fix and a valid time, in
/// sample order, projected into `frame`.
pub fn lap_trajectory(samples: &[Sample], frame: &PlanarFrame) -> Vec<TrackPoint> {
    let positions: Vec<Option<(f64, f64)>> = samples.iter().map(|s| s.position()).collect();
    project(&positions, frame)
        .into_iter()
        .zip(samples)
        .enumerate()
        .filter_map(|(sample_idx, (position, sample))| {
            Some(TrackPoint {
                position: position?,
                time_sec: sample.time_sec?,
                sample_idx,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trajectory_skips_samples_without_fix_or_time() {
        let frame = PlanarFrame::new(35.0, 139.0);
        let samples = vec![
            Sample {
                lat: Some(35.0),
                lon: Some(139.0),
                time_sec: Some(0.),
                ..Sample::default()
            },
            Sample {
                lat: None,
                lon: Some(139.0),
                time_sec: Some(0.1),
                ..Sample::default()
            },
            Sample {
                lat: Some(35.0),
                lon: Some(139.0),
                time_sec: None,
                ..Sample::default()
            },
            Sample {
                lat: Some(35.0001),
                lon: Some(139.0),
                time_sec: Some(0.3),
                ..Sample::default()
            },
        ];
        let trajectory = lap_trajectory(&samples, &frame);
        assert_eq!(trajectory.len(), 2);
        assert_eq!(trajectory[1].sample_idx, 3);
        assert!((trajectory[1].position.y - 11.1).abs() < 1e-6);
    }
}
