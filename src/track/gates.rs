// Virtual gate crossing detection on a lap trajectory

use log::debug;
use serde::{Deserialize, Serialize};

use super::projection::PlanarPoint;

/// A sector boundary line in the planar frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub start: PlanarPoint,
    pub end: PlanarPoint,
}

impl Gate {
    pub fn new(start: (f64, f64), end: (f64, f64)) -> Self {
        Self {
            start: PlanarPoint::new(start.0, start.1),
            end: PlanarPoint::new(end.0, end.1),
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }
}

/// Where and when a lap trajectory crossed a gate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    pub x: f64,
    pub y: f64,
    pub time_sec: f64,
    /// Index of the trajectory sample that opens the crossed segment
    pub sample_idx: usize,
}

/// One trajectory vertex: planar position and lap time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackPoint {
    pub position: PlanarPoint,
    pub time_sec: f64,
    /// Index of the sample inside its lap
    pub sample_idx: usize,
}

/// How to pick a crossing when a gate is crossed more than once in a lap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingPolicy {
    /// Always the first crossing of each gate
    First,
    /// First crossing of gate 1; for later gates the first crossing at or
    /// after the previous gate's crossing, falling back to the first one
    #[default]
    Sequential,
}

fn orientation(a: &PlanarPoint, b: &PlanarPoint, c: &PlanarPoint) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper intersection of segments p1-p2 and q1-q2: each segment has its
/// endpoints strictly on opposite sides of the other. Touching or collinear
/// overlap does not count.
pub fn segment_intersection(
    p1: &PlanarPoint,
    p2: &PlanarPoint,
    q1: &PlanarPoint,
    q2: &PlanarPoint,
) -> Option<PlanarPoint> {
    let o1 = orientation(q1, q2, p1);
    let o2 = orientation(q1, q2, p2);
    let o3 = orientation(p1, p2, q1);
    let o4 = orientation(p1, p2, q2);
    if o1 * o2 >= 0. || o3 * o4 >= 0. {
        return None;
    }
    // parameter along p1-p2
    let t = o1 / (o1 - o2);
    Some(PlanarPoint::new(
        p1.x + t * (p2.x - p1.x),
        p1.y + t * (p2.y - p1.y),
    ))
}

/// True when `point` lies on the gate line strictly between its endpoints.
fn lies_on_gate(point: &PlanarPoint, gate: &Gate) -> bool {
    if orientation(&gate.start, &gate.end, point) != 0. {
        return false;
    }
    let dx = gate.end.x - gate.start.x;
    let dy = gate.end.y - gate.start.y;
    let along = (point.x - gate.start.x) * dx + (point.y - gate.start.y) * dy;
    along > 0. && along < dx * dx + dy * dy
}

/// Every crossing of `gate` along the trajectory, in trajectory order.
pub fn find_crossings(trajectory: &[TrackPoint], gate: &Gate) -> Vec<Crossing> {
    let mut crossings = Vec::new();
    for (i, pair) in trajectory.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        if let Some(hit) = segment_intersection(&a.position, &b.position, &gate.start, &gate.end) {
            let d1 = a.position.distance(&hit);
            let d2 = b.position.distance(&hit);
            let ratio = d1 / (d1 + d2);
            crossings.push(Crossing {
                x: hit.x,
                y: hit.y,
                time_sec: a.time_sec + ratio * (b.time_sec - a.time_sec),
                sample_idx: a.sample_idx,
            });
            continue;
        }

        // a vertex exactly on the gate is not a proper crossing of either
        // neighbouring segment; count it once when the path goes through
        if i > 0 && lies_on_gate(&a.position, gate) {
            let prev = &trajectory[i - 1].position;
            let side_before = orientation(&gate.start, &gate.end, prev);
            let side_after = orientation(&gate.start, &gate.end, &b.position);
            if side_before * side_after < 0. {
                crossings.push(Crossing {
                    x: a.position.x,
                    y: a.position.y,
                    time_sec: a.time_sec,
                    sample_idx: a.sample_idx,
                });
            }
        }
    }
    crossings
}

/// One crossing per gate (in gate order) chosen by `policy`.
pub fn crossings_for_lap(
    trajectory: &[TrackPoint],
    gates: &[Gate],
    policy: CrossingPolicy,
) -> Vec<Option<Crossing>> {
    let mut chosen: Vec<Option<Crossing>> = Vec::with_capacity(gates.len());
    for (gate_no, gate) in gates.iter().enumerate() {
        let candidates = find_crossings(trajectory, gate);
        if candidates.len() > 1 {
            debug!(
                "Gate {} crossed {} times in one lap",
                gate_no + 1,
                candidates.len()
            );
        }
        let previous = chosen.last().copied().flatten();
        let pick = match (policy, previous) {
            (CrossingPolicy::Sequential, Some(previous)) => candidates
                .iter()
                .find(|c| c.time_sec >= previous.time_sec)
                .or(candidates.first())
                .copied(),
            _ => candidates.first().copied(),
        };
        chosen.push(pick);
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(points: &[(f64, f64, f64)]) -> Vec<TrackPoint> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(x, y, t))| TrackPoint {
                position: PlanarPoint::new(x, y),
                time_sec: t,
                sample_idx: i,
            })
            .collect()
    }

    fn first_crossing(trajectory: &[TrackPoint], gate: &Gate) -> Option<Crossing> {
        find_crossings(trajectory, gate).into_iter().next()
    }

    #[test]
    fn test_straight_crossing_interpolates_time() {
        let trajectory = track(&[(0., 0., 0.), (10., 0., 1.)]);
        let gate = Gate::new((5., -5.), (5., 5.));
        let crossing = first_crossing(&trajectory, &gate).unwrap();
        assert!((crossing.x - 5.).abs() < 1e-12);
        assert!(crossing.y.abs() < 1e-12);
        assert!((crossing.time_sec - 0.5).abs() < 1e-12);
        assert_eq!(crossing.sample_idx, 0);
    }

    #[test]
    fn test_off_centre_crossing() {
        let trajectory = track(&[(0., 0., 10.), (4., 0., 10.4), (8., 0., 10.8)]);
        let gate = Gate::new((7., -1.), (7., 1.));
        let crossing = first_crossing(&trajectory, &gate).unwrap();
        assert!((crossing.time_sec - 10.7).abs() < 1e-9);
        assert_eq!(crossing.sample_idx, 1);
    }

    #[test]
    fn test_no_crossing() {
        let trajectory = track(&[(0., 0., 0.), (4., 0., 1.)]);
        let gate = Gate::new((5., -5.), (5., 5.));
        assert_eq!(first_crossing(&trajectory, &gate), None);
        // passing beyond the end of the gate
        let gate = Gate::new((2., 1.), (2., 5.));
        assert_eq!(first_crossing(&trajectory, &gate), None);
    }

    #[test]
    fn test_touching_is_not_crossing() {
        // trajectory endpoint on the gate, then turning back
        let trajectory = track(&[(0., 0., 0.), (5., 0., 1.), (0., 1., 2.)]);
        let gate = Gate::new((5., -5.), (5., 5.));
        assert_eq!(first_crossing(&trajectory, &gate), None);

        // parallel and collinear segments
        let gate = Gate::new((0., 0.), (10., 0.));
        assert_eq!(first_crossing(&track(&[(1., 0., 0.), (3., 0., 1.)]), &gate), None);
    }

    #[test]
    fn test_vertex_on_gate_counts_once() {
        let trajectory = track(&[(0., 0., 0.), (5., 0., 1.), (10., 0., 2.)]);
        let gate = Gate::new((5., -5.), (5., 5.));
        let crossings = find_crossings(&trajectory, &gate);
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].time_sec, 1.);
        assert_eq!(crossings[0].sample_idx, 1);
    }

    #[test]
    fn test_policy_with_looping_trajectory() {
        // gate 2 is crossed once before gate 1 and once after
        let trajectory = track(&[
            (0., 0., 0.),
            (0., 10., 1.),
            (10., 10., 2.),
            (10., 0., 3.),
            (20., 0., 4.),
            (20., 10., 5.),
        ]);
        let gate_1 = Gate::new((8., 5.), (12., 5.));
        let gate_2 = Gate::new((-2., 5.), (22., 5.));
        let gates = [gate_1, gate_2];

        let first = crossings_for_lap(&trajectory, &gates, CrossingPolicy::First);
        let sequential = crossings_for_lap(&trajectory, &gates, CrossingPolicy::Sequential);
        assert!((first[0].unwrap().time_sec - 2.5).abs() < 1e-9);
        assert!((first[1].unwrap().time_sec - 0.5).abs() < 1e-9);
        assert!((sequential[1].unwrap().time_sec - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_gate_crossing_is_none() {
        let trajectory = track(&[(0., 0., 0.), (10., 0., 1.)]);
        let gates = [Gate::new((5., -5.), (5., 5.)), Gate::new((50., -5.), (50., 5.))];
        let crossings = crossings_for_lap(&trajectory, &gates, CrossingPolicy::Sequential);
        assert!(crossings[0].is_some());
        assert!(crossings[1].is_none());
    }
}
