// Cornering, braking and acceleration event detection over one lap
//
// Two strategies sit behind `EventDetector`: run-length detection with an
// entry and an exit window (corners, braking) and point-wise detection of
// single sample pairs against a compound condition (acceleration). They are
// kept separate on purpose and must not be merged.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::telemetry::{Channel, ChannelSet, Sample};

/// What a detected interval represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LeftCorner,
    RightCorner,
    Braking,
    StrongAcceleration,
    PartialAcceleration,
}

impl EventKind {
    pub fn family(&self) -> EventFamily {
        match self {
            EventKind::LeftCorner | EventKind::RightCorner => EventFamily::Corner,
            EventKind::Braking => EventFamily::Braking,
            EventKind::StrongAcceleration => EventFamily::StrongAcceleration,
            EventKind::PartialAcceleration => EventFamily::PartialAcceleration,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::LeftCorner => write!(f, "left"),
            EventKind::RightCorner => write!(f, "right"),
            EventKind::Braking => write!(f, "braking"),
            EventKind::StrongAcceleration => write!(f, "strong acceleration"),
            EventKind::PartialAcceleration => write!(f, "partial acceleration"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFamily {
    Corner,
    Braking,
    StrongAcceleration,
    PartialAcceleration,
}

/// A contiguous, inclusive range of sample indices within one lap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub start_idx: usize,
    pub end_idx: usize,
    /// Mean of the detector's channel over the range
    pub mean_value: Option<f64>,
}

impl Event {
    /// Number of samples covered.
    pub fn sample_count(&self) -> usize {
        self.end_idx - self.start_idx + 1
    }
}

pub trait EventDetector {
    fn family(&self) -> EventFamily;

    /// Channels that must exist in the export for this detector to run.
    fn required_channels(&self) -> &[Channel];

    /// Detects events over one lap. Must not carry state between calls.
    fn detect(&self, samples: &[Sample]) -> Vec<Event>;
}

/// Per-sample threshold test.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Excursion {
    /// |value| > threshold
    AbsAbove(f64),
    /// value < threshold
    Below(f64),
    /// value > threshold
    Above(f64),
}

impl Excursion {
    pub fn is_satisfied(&self, value: f64) -> bool {
        match *self {
            Excursion::AbsAbove(threshold) => value.abs() > threshold,
            Excursion::Below(threshold) => value < threshold,
            Excursion::Above(threshold) => value > threshold,
        }
    }
}

/// How a closed run-length event gets its kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventLabel {
    Fixed(EventKind),
    /// Right corner when the mean is positive, left otherwise
    CornerBySign,
}

/// Hysteresis detector: an event opens when `entry_window` consecutive
/// samples satisfy the excursion and closes (at the sample before) when
/// `exit_window` consecutive samples fail it. Missing values neither open nor
/// close an event. An event still open at the end closes on the last sample.
#[derive(Clone, Debug)]
pub struct RunLengthDetector {
    channels: [Channel; 1],
    excursion: Excursion,
    entry_window: usize,
    exit_window: usize,
    label: EventLabel,
    family: EventFamily,
}

impl RunLengthDetector {
    pub fn new(
        channel: Channel,
        excursion: Excursion,
        entry_window: usize,
        exit_window: usize,
        label: EventLabel,
    ) -> Self {
        let family = match label {
            EventLabel::Fixed(kind) => kind.family(),
            EventLabel::CornerBySign => EventFamily::Corner,
        };
        Self {
            channels: [channel],
            excursion,
            entry_window: entry_window.max(1),
            exit_window: exit_window.max(1),
            label,
            family,
        }
    }

    fn close(&self, values: &[Option<f64>], start_idx: usize, end_idx: usize) -> Event {
        let mean_value = mean(values[start_idx..=end_idx].iter().flatten().copied());
        let kind = match self.label {
            EventLabel::Fixed(kind) => kind,
            EventLabel::CornerBySign if mean_value.is_some_and(|m| m > 0.) => EventKind::RightCorner,
            EventLabel::CornerBySign => EventKind::LeftCorner,
        };
        Event {
            kind,
            start_idx,
            end_idx,
            mean_value,
        }
    }
}

impl EventDetector for RunLengthDetector {
    fn family(&self) -> EventFamily {
        self.family
    }

    fn required_channels(&self) -> &[Channel] {
        &self.channels
    }

    fn detect(&self, samples: &[Sample]) -> Vec<Event> {
        let values: Vec<Option<f64>> = samples.iter().map(|s| s.channel(self.channels[0])).collect();
        let window_holds = |start: usize, len: usize, expected: bool| {
            values.get(start..start + len).is_some_and(|window| {
                window
                    .iter()
                    .all(|v| v.is_some_and(|v| self.excursion.is_satisfied(v) == expected))
            })
        };

        let mut events = Vec::new();
        let mut open: Option<usize> = None;
        for i in 0..values.len() {
            match open {
                None if window_holds(i, self.entry_window, true) => open = Some(i),
                Some(start) if window_holds(i, self.exit_window, false) => {
                    events.push(self.close(&values, start, i - 1));
                    open = None;
                }
                _ => {}
            }
        }
        if let Some(start) = open {
            events.push(self.close(&values, start, values.len() - 1));
        }
        events
    }
}

/// RPM movement required between a sample and the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpmTrend {
    Rising,
    NonFalling,
}

impl RpmTrend {
    fn holds(&self, current: f64, next: f64) -> bool {
        match self {
            RpmTrend::Rising => next > current,
            RpmTrend::NonFalling => next >= current,
        }
    }
}

/// Flags every sample pair `(i, i + 1)` where the longitudinal G at `i` is
/// strictly inside `(lower, upper)` and RPM follows `rpm_trend`.
#[derive(Clone, Debug)]
pub struct PointwiseDetector {
    kind: EventKind,
    lower: f64,
    upper: f64,
    rpm_trend: RpmTrend,
}

const POINTWISE_CHANNELS: [Channel; 2] = [Channel::LongitudinalG, Channel::Rpm];

impl PointwiseDetector {
    pub fn new(kind: EventKind, lower: f64, upper: f64, rpm_trend: RpmTrend) -> Self {
        Self {
            kind,
            lower,
            upper,
            rpm_trend,
        }
    }
}

impl EventDetector for PointwiseDetector {
    fn family(&self) -> EventFamily {
        self.kind.family()
    }

    fn required_channels(&self) -> &[Channel] {
        &POINTWISE_CHANNELS
    }

    fn detect(&self, samples: &[Sample]) -> Vec<Event> {
        samples
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| {
                let gforce_x = pair[0].gforce_x?;
                let (rpm, next_rpm) = (pair[0].rpm?, pair[1].rpm?);
                let in_band = gforce_x > self.lower && gforce_x < self.upper;
                (in_band && self.rpm_trend.holds(rpm, next_rpm)).then_some(Event {
                    kind: self.kind,
                    start_idx: i,
                    end_idx: i + 1,
                    mean_value: Some(gforce_x),
                })
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventThresholds {
    /// |lateral G| above this opens a corner
    pub corner_gforce: f64,
    pub corner_window: usize,
    /// longitudinal G below this opens a braking zone
    pub braking_gforce: f64,
    pub braking_window: usize,
    /// longitudinal G above this with rising RPM is strong acceleration
    pub strong_accel_gforce: f64,
    /// longitudinal G strictly between these with non-falling RPM is partial acceleration
    pub partial_accel_min_gforce: f64,
    pub partial_accel_max_gforce: f64,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            corner_gforce: 0.1,
            corner_window: 2,
            braking_gforce: -0.2,
            braking_window: 2,
            strong_accel_gforce: 0.15,
            partial_accel_min_gforce: 0.03,
            partial_accel_max_gforce: 0.15,
        }
    }
}

/// The four detectors used by the session analysis.
pub fn standard_detectors(thresholds: &EventThresholds) -> Vec<Box<dyn EventDetector>> {
    vec![
        // corners close only once a whole window falls back under the threshold
        Box::new(RunLengthDetector::new(
            Channel::LateralG,
            Excursion::AbsAbove(thresholds.corner_gforce),
            thresholds.corner_window,
            thresholds.corner_window,
            EventLabel::CornerBySign,
        )),
        // braking closes on the first sample back above the threshold
        Box::new(RunLengthDetector::new(
            Channel::LongitudinalG,
            Excursion::Below(thresholds.braking_gforce),
            thresholds.braking_window,
            1,
            EventLabel::Fixed(EventKind::Braking),
        )),
        Box::new(PointwiseDetector::new(
            EventKind::StrongAcceleration,
            thresholds.strong_accel_gforce,
            f64::INFINITY,
            RpmTrend::Rising,
        )),
        Box::new(PointwiseDetector::new(
            EventKind::PartialAcceleration,
            thresholds.partial_accel_min_gforce,
            thresholds.partial_accel_max_gforce,
            RpmTrend::NonFalling,
        )),
    ]
}

/// Events of one lap grouped by family.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LapEvents {
    pub corners: Vec<Event>,
    pub braking: Vec<Event>,
    pub strong_accel: Vec<Event>,
    pub partial_accel: Vec<Event>,
}

impl LapEvents {
    fn family_mut(&mut self, family: EventFamily) -> &mut Vec<Event> {
        match family {
            EventFamily::Corner => &mut self.corners,
            EventFamily::Braking => &mut self.braking,
            EventFamily::StrongAcceleration => &mut self.strong_accel,
            EventFamily::PartialAcceleration => &mut self.partial_accel,
        }
    }

    pub fn total(&self) -> usize {
        self.corners.len() + self.braking.len() + self.strong_accel.len() + self.partial_accel.len()
    }
}

/// Runs every detector whose channels are present in the export; detectors
/// with a missing channel are skipped and leave their family empty.
pub fn detect_lap_events(
    samples: &[Sample],
    channels: &ChannelSet,
    detectors: &[Box<dyn EventDetector>],
) -> LapEvents {
    let mut events = LapEvents::default();
    for detector in detectors {
        if let Some(missing) = detector
            .required_channels()
            .iter()
            .find(|channel| !channels.has(**channel))
        {
            debug!("Skipping {:?} detection, no {} channel", detector.family(), missing);
            continue;
        }
        events
            .family_mut(detector.family())
            .extend(detector.detect(samples));
    }
    events
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (count, sum) = values.fold((0usize, 0.), |(n, sum), v| (n + 1, sum + v));
    (count > 0).then(|| sum / count as f64)
}
