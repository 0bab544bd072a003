// Lap grouping and classification relative to the session's best lap

use std::{collections::BTreeMap, ops::Range};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::telemetry::{Sample, Session};

/// Lap diffs are quantised to this resolution before bucketing so that a
/// lap exactly 0.1 s off the best is not pushed across the boundary by
/// binary rounding.
const DIFF_RESOLUTION: f64 = 1e6;

/// Contiguous sample ranges of each timed lap inside a session buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LapGroups {
    ranges: BTreeMap<u32, Range<usize>>,
}

impl LapGroups {
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn lap_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.keys().copied()
    }

    pub fn range(&self, lap_number: u32) -> Option<Range<usize>> {
        self.ranges.get(&lap_number).cloned()
    }

    /// Borrows the samples of one lap.
    pub fn lap<'s>(&self, samples: &'s [Sample], lap_number: u32) -> Option<Lap<'s>> {
        let range = self.ranges.get(&lap_number)?;
        samples.get(range.clone()).map(|samples| Lap {
            number: lap_number,
            samples,
        })
    }

    /// Iterates laps in ascending lap order.
    pub fn laps<'a, 's: 'a>(&'a self, samples: &'s [Sample]) -> impl Iterator<Item = Lap<'s>> + 'a {
        self.ranges
            .keys()
            .filter_map(move |&lap_number| self.lap(samples, lap_number))
    }
}

/// A borrowed view of one lap's samples.
#[derive(Clone, Copy, Debug)]
pub struct Lap<'s> {
    pub number: u32,
    pub samples: &'s [Sample],
}

impl Lap<'_> {
    /// Last valid normalised time in the lap, `None` if the lap has no time at all.
    pub fn lap_time(&self) -> Option<f64> {
        self.samples.iter().rev().find_map(|s| s.time_sec)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Partitions the session into laps keyed by lap number.
///
/// Lap 0 (out-lap / warm-up) is never part of the result. When the lap
/// column is missing the grouping is empty. Samples whose lap index goes
/// backwards are stably re-sorted so every lap is one contiguous range.
pub fn group_laps(session: &mut Session) -> LapGroups {
    if !session.channels.lap_index {
        warn!("No lap index column, skipping lap grouping");
        return LapGroups::default();
    }

    let is_ordered = session
        .samples
        .windows(2)
        .all(|pair| pair[0].lap_index <= pair[1].lap_index);
    if !is_ordered {
        warn!(
            "Lap index is not monotonic in {}, regrouping samples by lap",
            session.name
        );
        session.samples.sort_by_key(|s| s.lap_index);
    }

    let mut ranges = BTreeMap::new();
    let mut start = 0;
    for end in 1..=session.samples.len() {
        let boundary = end == session.samples.len()
            || session.samples[end].lap_index != session.samples[start].lap_index;
        if boundary {
            let lap_number = session.samples[start].lap_index;
            if lap_number > 0 {
                ranges.insert(lap_number, start..end);
            }
            start = end;
        }
    }
    debug!("Grouped {} laps in {}", ranges.len(), session.name);

    LapGroups { ranges }
}

/// Lap quality relative to the session's best lap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LapCategory {
    /// Within the success window of the best lap
    Success,
    /// Slower than success but within the average window
    Average,
    /// Everything slower
    Miss,
}

impl std::fmt::Display for LapCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LapCategory::Success => write!(f, "success"),
            LapCategory::Average => write!(f, "average"),
            LapCategory::Miss => write!(f, "miss"),
        }
    }
}

/// Upper (exclusive) bounds of each category, in seconds off the best lap.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryThresholds {
    pub success_below: f64,
    pub average_below: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        Self {
            success_below: 0.1,
            average_below: 0.3,
        }
    }
}

impl CategoryThresholds {
    pub fn categorize(&self, diff_from_best: f64) -> LapCategory {
        if diff_from_best < self.success_below {
            LapCategory::Success
        } else if diff_from_best < self.average_below {
            LapCategory::Average
        } else {
            LapCategory::Miss
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestLap {
    pub lap: u32,
    pub time: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap: u32,
    pub time: f64,
    pub diff_from_best: f64,
    pub category: LapCategory,
}

/// Lap times, best lap and category of every timed lap.
///
/// Laps with no valid time are absent from every map; a session with no
/// timed lap yields an empty classification with no best lap.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LapClassification {
    pub lap_times: BTreeMap<u32, f64>,
    pub best: Option<BestLap>,
    pub categories: BTreeMap<u32, LapRecord>,
}

impl LapClassification {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn best_time(&self) -> Option<f64> {
        self.best.map(|b| b.time)
    }

    pub fn laps_in(&self, category: LapCategory) -> impl Iterator<Item = &LapRecord> {
        self.categories
            .values()
            .filter(move |record| record.category == category)
    }

    pub fn count(&self, category: LapCategory) -> usize {
        self.laps_in(category).count()
    }
}

pub fn classify_laps(
    groups: &LapGroups,
    samples: &[Sample],
    thresholds: &CategoryThresholds,
) -> LapClassification {
    let lap_times: BTreeMap<u32, f64> = groups
        .laps(samples)
        .filter_map(|lap| match lap.lap_time() {
            Some(time) => Some((lap.number, time)),
            None => {
                warn!("Lap {} has no valid time, excluded from classification", lap.number);
                None
            }
        })
        .collect();

    // ascending lap order, so strict comparison keeps the lowest lap on ties
    let mut best: Option<BestLap> = None;
    for (&lap, &time) in &lap_times {
        if best.is_none_or(|b| time < b.time) {
            best = Some(BestLap { lap, time });
        }
    }
    let Some(best) = best else {
        return LapClassification::default();
    };

    let categories = lap_times
        .iter()
        .map(|(&lap, &time)| {
            let diff_from_best = quantize(time - best.time);
            (
                lap,
                LapRecord {
                    lap,
                    time,
                    diff_from_best,
                    category: thresholds.categorize(diff_from_best),
                },
            )
        })
        .collect();

    LapClassification {
        lap_times,
        best: Some(best),
        categories,
    }
}

fn quantize(diff: f64) -> f64 {
    ((diff * DIFF_RESOLUTION).round() / DIFF_RESOLUTION).max(0.)
}

/// The success/average pair used for lap comparison.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPair {
    pub success: LapRecord,
    pub average: LapRecord,
}

/// Picks the reference success lap and the fastest average lap.
///
/// `preferred_success` wins when it is categorised success, otherwise the
/// lowest-numbered success lap is used.
pub fn select_comparison_laps(
    classification: &LapClassification,
    preferred_success: Option<u32>,
) -> Option<ComparisonPair> {
    let preferred = preferred_success
        .and_then(|lap| classification.categories.get(&lap))
        .filter(|record| record.category == LapCategory::Success);
    let success = preferred.or_else(|| classification.laps_in(LapCategory::Success).next())?;

    let average = classification
        .laps_in(LapCategory::Average)
        .min_by(|a, b| a.time.total_cmp(&b.time))?;

    Some(ComparisonPair {
        success: *success,
        average: *average,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::ChannelSet;
    use proptest::prelude::*;

    fn sample(lap_index: u32, time_sec: Option<f64>) -> Sample {
        Sample {
            lap_index,
            time_sec,
            ..Sample::default()
        }
    }

    fn session(samples: Vec<Sample>) -> Session {
        Session::new("test", samples, ChannelSet::all())
    }

    fn timed_session(lap_times: &[(u32, f64)]) -> Session {
        let mut samples = vec![sample(0, Some(99.))];
        for &(lap, time) in lap_times {
            samples.push(sample(lap, Some(time / 2.)));
            samples.push(sample(lap, Some(time)));
        }
        session(samples)
    }

    #[test]
    fn test_grouping_excludes_out_lap() {
        let mut session = session(vec![
            sample(0, Some(1.)),
            sample(0, Some(2.)),
            sample(1, Some(1.)),
            sample(1, Some(2.)),
            sample(2, Some(1.)),
        ]);
        let groups = group_laps(&mut session);
        assert_eq!(groups.lap_numbers().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(groups.range(1), Some(2..4));
        assert_eq!(groups.range(2), Some(4..5));
        assert_eq!(groups.range(0), None);
    }

    #[test]
    fn test_grouping_without_lap_column_is_empty() {
        let mut session = session(vec![sample(1, Some(1.))]);
        session.channels.lap_index = false;
        assert!(group_laps(&mut session).is_empty());
    }

    #[test]
    fn test_grouping_is_stable_for_unordered_laps() {
        let mut session = session(vec![
            sample(1, Some(1.)),
            sample(2, Some(1.)),
            sample(1, Some(2.)),
        ]);
        let groups = group_laps(&mut session);
        let lap = groups.lap(&session.samples, 1).unwrap();
        let times: Vec<_> = lap.samples.iter().map(|s| s.time_sec).collect();
        assert_eq!(times, vec![Some(1.), Some(2.)]);
    }

    #[test]
    fn test_lap_time_is_last_valid_time() {
        let samples = vec![sample(1, Some(10.)), sample(1, Some(33.5)), sample(1, None)];
        let lap = Lap {
            number: 1,
            samples: &samples,
        };
        assert_eq!(lap.lap_time(), Some(33.5));
    }

    #[test]
    fn test_classification() {
        let mut session = timed_session(&[(1, 34.0), (2, 33.51), (3, 33.6), (4, 33.81), (5, 35.2)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());

        assert_eq!(classification.best, Some(BestLap { lap: 2, time: 33.51 }));
        let category = |lap| classification.categories[&lap].category;
        assert_eq!(category(2), LapCategory::Success);
        assert_eq!(category(3), LapCategory::Success);
        assert_eq!(category(1), LapCategory::Miss);
        assert_eq!(category(4), LapCategory::Miss);
        assert_eq!(category(5), LapCategory::Miss);
        assert_eq!(classification.categories[&2].diff_from_best, 0.);
    }

    #[test]
    fn test_category_boundaries_are_half_open() {
        let mut session = timed_session(&[(1, 33.51), (2, 33.61), (3, 33.81), (4, 33.70)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());

        assert_eq!(classification.categories[&2].category, LapCategory::Average);
        assert_eq!(classification.categories[&3].category, LapCategory::Miss);
        assert_eq!(classification.categories[&4].category, LapCategory::Average);
    }

    #[test]
    fn test_best_lap_ties_go_to_lowest_lap() {
        let mut session = timed_session(&[(3, 30.0), (4, 30.0), (5, 31.0)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());
        assert_eq!(classification.best.unwrap().lap, 3);
    }

    #[test]
    fn test_untimed_laps_are_excluded() {
        let mut session = session(vec![
            sample(1, None),
            sample(1, None),
            sample(2, Some(30.)),
        ]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());
        assert!(!classification.lap_times.contains_key(&1));
        assert_eq!(classification.lap_times.len(), 1);
    }

    #[test]
    fn test_no_valid_time_gives_empty_result() {
        let mut session = session(vec![sample(1, None), sample(2, None)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());
        assert!(classification.is_empty());
        assert_eq!(classification.best, None);
        assert!(classification.lap_times.is_empty());
    }

    #[test]
    fn test_comparison_lap_selection() {
        let mut session = timed_session(&[(1, 30.0), (2, 30.05), (3, 30.25), (4, 30.15), (5, 31.)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());

        let pair = select_comparison_laps(&classification, None).unwrap();
        assert_eq!(pair.success.lap, 1);
        assert_eq!(pair.average.lap, 4);

        let pair = select_comparison_laps(&classification, Some(2)).unwrap();
        assert_eq!(pair.success.lap, 2);

        // lap 5 is a miss, so the default success lap is used
        let pair = select_comparison_laps(&classification, Some(5)).unwrap();
        assert_eq!(pair.success.lap, 1);
    }

    #[test]
    fn test_comparison_needs_an_average_lap() {
        let mut session = timed_session(&[(1, 30.0), (2, 31.0)]);
        let groups = group_laps(&mut session);
        let classification =
            classify_laps(&groups, &session.samples, &CategoryThresholds::default());
        assert_eq!(select_comparison_laps(&classification, None), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_out_lap_never_grouped(laps in proptest::collection::vec(0u32..5, 1..200)) {
            let mut sorted = laps.clone();
            sorted.sort();
            let mut session = session(sorted.iter().map(|&lap| sample(lap, Some(1.))).collect());
            let groups = group_laps(&mut session);
            prop_assert!(groups.range(0).is_none());
            let grouped: usize = groups.lap_numbers().map(|l| groups.range(l).unwrap().len()).sum();
            prop_assert_eq!(grouped, sorted.iter().filter(|&&l| l > 0).count());
        }

        #[test]
        fn prop_best_lap_is_minimum_and_success(
            times in proptest::collection::vec(25.0f64..40.0, 1..20)
        ) {
            let lap_times: Vec<(u32, f64)> =
                times.iter().enumerate().map(|(i, &t)| (i as u32 + 1, t)).collect();
            let mut session = timed_session(&lap_times);
            let groups = group_laps(&mut session);
            let classification =
                classify_laps(&groups, &session.samples, &CategoryThresholds::default());

            let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
            let best = classification.best.unwrap();
            prop_assert_eq!(best.time, min);
            let record = classification.categories[&best.lap];
            prop_assert_eq!(record.category, LapCategory::Success);
            prop_assert_eq!(record.diff_from_best, 0.);
            prop_assert!(classification.categories.values().all(|r| r.diff_from_best >= 0.));
        }
    }
}
