// Local planar projection of GPS samples
//
// Flat-earth approximation around a reference point: valid for circuits a
// few kilometres across, not near the poles or over tens of kilometres.

use serde::{Deserialize, Serialize};

/// Meters per degree of latitude
pub const METERS_PER_DEG_LAT: f64 = 111_000.;
/// Meters per degree of longitude at the equator
pub const METERS_PER_DEG_LON: f64 = 111_320.;

/// A point in the local metric frame (x east-ish, y north-ish, meters).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PlanarPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Where the planar frame is anchored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ReferencePoint {
    /// First sample with a position fix
    FirstSample,
    /// Mean of every position fix in the input
    #[default]
    SessionMean,
    /// A fixed anchor, so gate coordinates stay valid across sessions
    Fixed { lat: f64, lon: f64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub reference: ReferencePoint,
    /// Rotate so the dominant track axis lies along x
    pub rotate_to_principal_axis: bool,
}

/// A resolved projection: anchor plus the rotation applied after scaling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanarFrame {
    pub ref_lat: f64,
    pub ref_lon: f64,
    /// Angle of the dominant track axis in the unrotated frame (rad). Points
    /// are rotated by the negative of this angle.
    pub rotation: f64,
}

impl PlanarFrame {
    pub fn new(ref_lat: f64, ref_lon: f64) -> Self {
        Self {
            ref_lat,
            ref_lon,
            rotation: 0.,
        }
    }

    fn lon_scale(&self) -> f64 {
        METERS_PER_DEG_LON * self.ref_lat.to_radians().cos()
    }

    pub fn to_planar(&self, lat: f64, lon: f64) -> PlanarPoint {
        let x = (lon - self.ref_lon) * self.lon_scale();
        let y = (lat - self.ref_lat) * METERS_PER_DEG_LAT;
        rotate(PlanarPoint::new(x, y), -self.rotation)
    }

    /// Inverse of `to_planar`.
    pub fn to_geographic(&self, point: PlanarPoint) -> (f64, f64) {
        let unrotated = rotate(point, self.rotation);
        let lat = self.ref_lat + unrotated.y / METERS_PER_DEG_LAT;
        let lon = self.ref_lon + unrotated.x / self.lon_scale();
        (lat, lon)
    }
}

fn rotate(point: PlanarPoint, angle: f64) -> PlanarPoint {
    if angle == 0. {
        return point;
    }
    let (sin, cos) = angle.sin_cos();
    PlanarPoint::new(
        point.x * cos - point.y * sin,
        point.x * sin + point.y * cos,
    )
}

/// Builds the frame for a set of positions. `None` entries (no GPS fix) are
/// ignored; returns `None` when there is no fix at all.
pub fn resolve_frame(
    positions: &[Option<(f64, f64)>],
    config: &ProjectionConfig,
) -> Option<PlanarFrame> {
    let mut fixes = positions.iter().flatten();
    let mut frame = match config.reference {
        ReferencePoint::Fixed { lat, lon } => PlanarFrame::new(lat, lon),
        ReferencePoint::FirstSample => {
            let &(lat, lon) = fixes.next()?;
            PlanarFrame::new(lat, lon)
        }
        ReferencePoint::SessionMean => {
            let (count, lat_sum, lon_sum) = fixes
                .fold((0usize, 0., 0.), |(n, lat, lon), &(la, lo)| (n + 1, lat + la, lon + lo));
            if count == 0 {
                return None;
            }
            PlanarFrame::new(lat_sum / count as f64, lon_sum / count as f64)
        }
    };

    if config.rotate_to_principal_axis {
        let unrotated: Vec<PlanarPoint> = positions
            .iter()
            .flatten()
            .map(|&(lat, lon)| frame.to_planar(lat, lon))
            .collect();
        frame.rotation = principal_axis_angle(&unrotated).unwrap_or(0.);
    }
    Some(frame)
}

/// Projects positions into `frame`, keeping `None` where there is no fix.
pub fn project(positions: &[Option<(f64, f64)>], frame: &PlanarFrame) -> Vec<Option<PlanarPoint>> {
    positions
        .iter()
        .map(|position| position.map(|(lat, lon)| frame.to_planar(lat, lon)))
        .collect()
}

/// Angle of the eigenvector of the largest eigenvalue of the point cloud's
/// covariance matrix. `None` for fewer than two points.
pub fn principal_axis_angle(points: &[PlanarPoint]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0., 0., 0.);
    for p in points {
        let dx = p.x - mean_x;
        let dy = p.y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    // the common 1/(n-1) factor does not change the eigenvectors
    Some(0.5 * (2. * sxy).atan2(sxx - syy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_reference_point_maps_to_origin() {
        let frame = PlanarFrame::new(35.0, 139.0);
        let origin = frame.to_planar(35.0, 139.0);
        assert_eq!(origin, PlanarPoint::new(0., 0.));
    }

    #[test]
    fn test_degree_scaling() {
        let frame = PlanarFrame::new(60.0, 10.0);
        let point = frame.to_planar(60.001, 10.001);
        assert!((point.y - 111.0).abs() < 1e-6);
        // cos(60°) = 0.5
        assert!((point.x - 55.66).abs() < 1e-6);
    }

    #[test]
    fn test_reference_choices() {
        let positions = vec![None, Some((35.0, 139.0)), Some((35.002, 139.002))];

        let first = resolve_frame(&positions, &ProjectionConfig {
            reference: ReferencePoint::FirstSample,
            rotate_to_principal_axis: false,
        })
        .unwrap();
        assert_eq!((first.ref_lat, first.ref_lon), (35.0, 139.0));

        let mean = resolve_frame(&positions, &ProjectionConfig::default()).unwrap();
        assert!((mean.ref_lat - 35.001).abs() < 1e-12);
        assert!((mean.ref_lon - 139.001).abs() < 1e-12);

        let fixed = resolve_frame(&positions, &ProjectionConfig {
            reference: ReferencePoint::Fixed { lat: 1., lon: 2. },
            rotate_to_principal_axis: false,
        })
        .unwrap();
        assert_eq!((fixed.ref_lat, fixed.ref_lon), (1., 2.));
    }

    #[test]
    fn test_no_fix_gives_no_frame() {
        assert!(resolve_frame(&[None, None], &ProjectionConfig::default()).is_none());
        assert!(resolve_frame(&[], &ProjectionConfig::default()).is_none());
    }

    #[test]
    fn test_principal_axis_of_diagonal_line() {
        let points: Vec<PlanarPoint> = (0..10).map(|i| PlanarPoint::new(i as f64, i as f64)).collect();
        let angle = principal_axis_angle(&points).unwrap();
        assert!((angle - FRAC_PI_4).abs() < 1e-9);
    }

    #[test]
    fn test_rotation_aligns_dominant_axis_with_x() {
        // a straight diagonal run: after rotation y should be flat
        let positions: Vec<Option<(f64, f64)>> = (0..20)
            .map(|i| Some((35.0 + i as f64 * 1e-5, 139.0 + i as f64 * 1e-5)))
            .collect();
        let config = ProjectionConfig {
            reference: ReferencePoint::FirstSample,
            rotate_to_principal_axis: true,
        };
        let frame = resolve_frame(&positions, &config).unwrap();
        let points = project(&positions, &frame);
        for point in points.iter().flatten() {
            assert!(point.y.abs() < 1e-6, "y = {}", point.y);
        }
        let last = points.last().unwrap().unwrap();
        assert!(last.x.abs() > 20.);
    }

    #[test]
    fn test_missing_fix_stays_missing() {
        let frame = PlanarFrame::new(35.0, 139.0);
        let points = project(&[Some((35.0, 139.0)), None], &frame);
        assert!(points[0].is_some());
        assert!(points[1].is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_inverse_recovers_degrees(
            ref_lat in -60.0f64..60.0,
            ref_lon in -179.0f64..179.0,
            d_lat in -0.02f64..0.02,
            d_lon in -0.02f64..0.02,
            rotation in -3.1f64..3.1,
        ) {
            let frame = PlanarFrame { ref_lat, ref_lon, rotation };
            let point = frame.to_planar(ref_lat + d_lat, ref_lon + d_lon);
            let (lat, lon) = frame.to_geographic(point);
            // linear model inverted exactly, only float error remains
            prop_assert!((lat - (ref_lat + d_lat)).abs() < 1e-9);
            prop_assert!((lon - (ref_lon + d_lon)).abs() < 1e-9);
        }
    }
}
