// Whole-session pipeline: laps, classification, sectors, events, comparison

use std::{collections::BTreeMap, ops::Range};

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    KartlapError,
    comparison::{
        ComparisonResult, DifferenceAnalysis, RpmBandComparison, analyze_differences,
        analyze_rpm_bands, compare_laps,
    },
    config::AnalysisConfig,
    engine::{GearSuggestion, SectorRpmHistogram, sector_rpm_histograms, suggest_gearing},
    events::{EventDetector, LapEvents, detect_lap_events, standard_detectors},
    laps::{LapCategory, LapClassification, LapGroups, classify_laps, group_laps, select_comparison_laps},
    telemetry::Session,
    track::{
        Crossing, PlanarFrame, SectorBest, assign_sectors, crossings_for_lap, lap_trajectory,
        projection::resolve_frame, sector_summary, sector_times,
    },
};

/// Everything computed for one lap.
#[derive(Clone, Debug, Serialize)]
pub struct LapReport {
    pub lap: u32,
    /// Position of the lap inside the session sample buffer
    pub samples: Range<usize>,
    pub lap_time: Option<f64>,
    pub category: Option<LapCategory>,
    pub diff_from_best: Option<f64>,
    /// One entry per configured gate, in gate order
    pub crossings: Vec<Option<Crossing>>,
    pub sectors_assigned: bool,
    pub sector_times: BTreeMap<u8, f64>,
    pub events: LapEvents,
}

#[derive(Clone, Debug, Serialize)]
pub struct LapComparison {
    pub result: ComparisonResult,
    pub differences: DifferenceAnalysis,
    pub rpm_bands: Vec<RpmBandComparison>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub session: String,
    pub sample_count: usize,
    pub classification: LapClassification,
    /// Frame the gates were evaluated in, `None` without position data
    pub frame: Option<PlanarFrame>,
    pub laps: Vec<LapReport>,
    pub sector_summary: Vec<SectorBest>,
    pub rpm_histograms: Vec<SectorRpmHistogram>,
    /// Present when the config describes the gearing and a sector has RPM data
    pub gearing: Option<GearSuggestion>,
    pub comparison: Option<LapComparison>,
}

impl SessionReport {
    pub fn lap(&self, lap: u32) -> Option<&LapReport> {
        self.laps.iter().find(|report| report.lap == lap)
    }
}

pub struct SessionAnalyzer {
    config: AnalysisConfig,
    detectors: Vec<Box<dyn EventDetector>>,
}

impl SessionAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        let detectors = standard_detectors(&config.events);
        Self { config, detectors }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Runs the full pipeline. Sector labels are written onto the session's
    /// samples; nothing else in the session changes apart from the lap
    /// regrouping done by `group_laps`.
    pub fn analyze(&self, session: &mut Session, preferred_success: Option<u32>) -> SessionReport {
        let groups = group_laps(session);
        let classification = classify_laps(&groups, &session.samples, &self.config.categories);
        info!(
            "{}: {} laps, {} timed",
            session.name,
            groups.len(),
            classification.lap_times.len()
        );

        let frame = self.resolve_frame(session);
        let mut laps: Vec<LapReport> = Vec::with_capacity(groups.len());
        for lap in groups.lap_numbers() {
            if let Some(range) = groups.range(lap) {
                laps.push(self.analyze_lap(session, lap, range, frame.as_ref(), &classification));
            }
        }

        let per_lap_sectors: BTreeMap<u32, BTreeMap<u8, f64>> = laps
            .iter()
            .filter(|report| report.sectors_assigned)
            .map(|report| (report.lap, report.sector_times.clone()))
            .collect();

        let sector_summary = sector_summary(&per_lap_sectors);
        let (rpm_histograms, gearing) = self.engine_usage(session, &sector_summary);

        let comparison = match select_comparison_laps(&classification, preferred_success) {
            Some(pair) => self.compare(session, &groups, pair.success.lap, pair.average.lap).ok(),
            None => {
                info!("No success/average lap pair, skipping comparison");
                None
            }
        };

        SessionReport {
            session: session.name.clone(),
            sample_count: session.len(),
            classification,
            frame,
            laps,
            sector_summary,
            rpm_histograms,
            gearing,
            comparison,
        }
    }

    /// Compares two explicitly chosen laps of an already grouped session.
    pub fn compare(
        &self,
        session: &Session,
        groups: &LapGroups,
        success_lap: u32,
        average_lap: u32,
    ) -> Result<LapComparison, KartlapError> {
        let missing = |lap: u32| KartlapError::NoComparableLaps {
            reason: format!("lap {} is not in {}", lap, session.name),
        };
        let success = groups
            .lap(&session.samples, success_lap)
            .ok_or_else(|| missing(success_lap))?;
        let average = groups
            .lap(&session.samples, average_lap)
            .ok_or_else(|| missing(average_lap))?;

        let thresholds = &self.config.comparison;
        let result = compare_laps(&success, &average, thresholds);
        info!(
            "Lap {} vs lap {}: {} significant points in {} sections",
            success_lap,
            average_lap,
            result.significant_points.len(),
            result.sections.len()
        );
        Ok(LapComparison {
            differences: analyze_differences(&result, thresholds.top_points),
            rpm_bands: analyze_rpm_bands(&success, &average),
            result,
        })
    }

    /// Groups the session and compares two laps by number.
    pub fn compare_session(
        &self,
        session: &mut Session,
        success_lap: u32,
        average_lap: u32,
    ) -> Result<LapComparison, KartlapError> {
        let groups = group_laps(session);
        self.compare(session, &groups, success_lap, average_lap)
    }

    fn engine_usage(
        &self,
        session: &Session,
        summary: &[SectorBest],
    ) -> (Vec<SectorRpmHistogram>, Option<GearSuggestion>) {
        if !session.channels.rpm || summary.is_empty() {
            return (Vec::new(), None);
        }
        let histograms = sector_rpm_histograms(&session.samples, summary, &self.config.rpm_bins);
        let gearing = match (&self.config.gearing, session.channels.speed) {
            (Some(gearing), true) => {
                suggest_gearing(&session.samples, summary, &self.config.rpm_bins, gearing)
            }
            (Some(_), false) => {
                warn!("No GPS speed column, skipping gearing suggestion");
                None
            }
            (None, _) => None,
        };
        if let Some(suggestion) = &gearing {
            info!(
                "Suggested rear sprocket {:.1} (current {})",
                suggestion.overall_rear, suggestion.current_rear
            );
        }
        (histograms, gearing)
    }

    fn resolve_frame(&self, session: &Session) -> Option<PlanarFrame> {
        if !session.channels.position {
            if !self.config.gates.is_empty() {
                warn!("No position columns, sector gates are ignored");
            }
            return None;
        }
        let positions: Vec<Option<(f64, f64)>> = session
            .samples
            .iter()
            .map(|s| s.position())
            .collect();
        let frame = resolve_frame(&positions, &self.config.projection);
        if frame.is_none() {
            warn!("No GPS fix in {}, sector gates are ignored", session.name);
        }
        frame
    }

    fn analyze_lap(
        &self,
        session: &mut Session,
        lap: u32,
        range: Range<usize>,
        frame: Option<&PlanarFrame>,
        classification: &LapClassification,
    ) -> LapReport {
        let gates = &self.config.gates;
        let crossings = match frame {
            Some(frame) if !gates.is_empty() => {
                let trajectory = lap_trajectory(&session.samples[range.clone()], frame);
                crossings_for_lap(&trajectory, gates, self.config.crossing_policy)
            }
            _ => vec![None; gates.len()],
        };

        let sectors_assigned =
            !gates.is_empty() && assign_sectors(&mut session.samples[range.clone()], &crossings);
        if !gates.is_empty() && !sectors_assigned {
            let missed = crossings.iter().filter(|c| c.is_none()).count();
            warn!(
                "Lap {}: {} of {} gates not crossed, sectors left unset",
                lap,
                missed,
                gates.len()
            );
        }

        let samples = &session.samples[range.clone()];
        let sector_times = if sectors_assigned {
            sector_times(samples)
        } else {
            BTreeMap::new()
        };
        let events = detect_lap_events(samples, &session.channels, &self.detectors);
        debug!("Lap {}: {} events, {} sectors", lap, events.total(), sector_times.len());

        let record = classification.categories.get(&lap);
        LapReport {
            lap,
            samples: range,
            lap_time: classification.lap_times.get(&lap).copied(),
            category: record.map(|r| r.category),
            diff_from_best: record.map(|r| r.diff_from_best),
            crossings,
            sectors_assigned,
            sector_times,
            events,
        }
    }
}
