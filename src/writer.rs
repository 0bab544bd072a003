use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;
use serde_jsonlines::JsonLinesWriter;

use crate::{
    KartlapError,
    analysis::SessionReport,
    laps::{LapCategory, LapClassification},
};

fn create(path: &Path) -> Result<BufWriter<File>, KartlapError> {
    let file = File::create(path).map_err(|e| KartlapError::WriterError { source: e })?;
    Ok(BufWriter::new(file))
}

/// Writes any serializable report as pretty JSON.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) -> Result<(), KartlapError> {
    let mut writer = create(path)?;
    serde_json::to_writer_pretty(&mut writer, report)
        .map_err(|e| KartlapError::ReportSerializeError { source: e })?;
    writer
        .flush()
        .map_err(|e| KartlapError::WriterError { source: e })
}

/// One JSON line per classified lap, in lap order.
pub fn write_lap_records(path: &Path, classification: &LapClassification) -> Result<(), KartlapError> {
    let mut writer = JsonLinesWriter::new(create(path)?);
    writer
        .write_all(classification.categories.values())
        .map_err(|e| KartlapError::WriterError { source: e })?;
    writer
        .flush()
        .map_err(|e| KartlapError::WriterError { source: e })
}

/// Plain-text lap summary.
pub fn render_summary(report: &SessionReport) -> String {
    let classification = &report.classification;
    let mut out = String::new();
    out.push_str(&format!("Session: {}\n", report.session));
    out.push_str(&format!("Total laps: {}\n", report.laps.len()));
    match classification.best {
        Some(best) => out.push_str(&format!("Best lap: {} ({:.3} s)\n", best.lap, best.time)),
        None => out.push_str("Best lap: none\n"),
    }
    for category in [LapCategory::Success, LapCategory::Average, LapCategory::Miss] {
        out.push_str(&format!("{}: {}\n", category, classification.count(category)));
    }

    out.push('\n');
    for record in classification.categories.values() {
        out.push_str(&format!(
            "Lap {}: {:.3} s ({}), +{:.3} s\n",
            record.lap, record.time, record.category, record.diff_from_best
        ));
    }

    if !report.sector_summary.is_empty() {
        out.push('\n');
        for sector in &report.sector_summary {
            out.push_str(&format!(
                "Sector {}: best {:.3} s (lap {}), mean {:.3} s\n",
                sector.sector, sector.best_time, sector.best_lap, sector.mean_time
            ));
        }
    }

    if let Some(gearing) = &report.gearing {
        out.push('\n');
        out.push_str(&format!(
            "Suggested rear sprocket: {:.1} (current {}/{})\n",
            gearing.overall_rear, gearing.front_sprocket, gearing.current_rear
        ));
        for sector in &gearing.sectors {
            out.push_str(&format!("  sector {}: {}\n", sector.sector, sector.suggested_rear));
        }
    }

    if let Some(comparison) = &report.comparison {
        let result = &comparison.result;
        out.push('\n');
        out.push_str(&format!(
            "Lap {} vs lap {}: {} significant points",
            result.success_lap,
            result.average_lap,
            result.significant_points.len()
        ));
        if let Some(time_difference) = result.time_difference {
            out.push_str(&format!(", {:.3} s apart", time_difference));
        }
        out.push('\n');
        for section in result.sections.iter().take(3) {
            out.push_str(&format!(
                "  samples {}-{}: impact {:.1}\n",
                section.start, section.end, section.impact_score
            ));
        }
    }
    out
}

pub fn write_summary(path: &Path, report: &SessionReport) -> Result<(), KartlapError> {
    let mut writer = create(path)?;
    writer
        .write_all(render_summary(report).as_bytes())
        .map_err(|e| KartlapError::WriterError { source: e })?;
    writer
        .flush()
        .map_err(|e| KartlapError::WriterError { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::{BestLap, LapRecord};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(lap: u32, time: f64, diff: f64, category: LapCategory) -> LapRecord {
        LapRecord {
            lap,
            time,
            diff_from_best: diff,
            category,
        }
    }

    fn report() -> SessionReport {
        let categories = BTreeMap::from([
            (1, record(1, 61.2, 0., LapCategory::Success)),
            (2, record(2, 61.4, 0.2, LapCategory::Average)),
        ]);
        SessionReport {
            session: "test".to_string(),
            sample_count: 0,
            classification: LapClassification {
                lap_times: BTreeMap::from([(1, 61.2), (2, 61.4)]),
                best: Some(BestLap { lap: 1, time: 61.2 }),
                categories,
            },
            frame: None,
            laps: Vec::new(),
            sector_summary: Vec::new(),
            rpm_histograms: Vec::new(),
            gearing: None,
            comparison: None,
        }
    }

    #[test]
    fn test_summary_lines() {
        let summary = render_summary(&report());
        assert!(summary.contains("Best lap: 1 (61.200 s)"));
        assert!(summary.contains("Lap 2: 61.400 s (average), +0.200 s"));
        assert!(summary.contains("miss: 0"));
    }

    #[test]
    fn test_summary_gearing_lines() {
        use crate::engine::{GearSuggestion, SectorGearing};

        let mut report = report();
        assert!(!render_summary(&report).contains("sprocket"));
        report.gearing = Some(GearSuggestion {
            front_sprocket: 10,
            current_rear: 80,
            overall_rear: 81.26,
            sectors: vec![SectorGearing {
                sector: 1,
                suggested_rear: 82,
                mean_time: 12.,
                samples: 40,
                scores: Vec::new(),
            }],
        });
        let summary = render_summary(&report);
        assert!(summary.contains("Suggested rear sprocket: 81.3 (current 10/80)"));
        assert!(summary.contains("  sector 1: 82"));
    }

    #[test]
    fn test_lap_records_are_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("laps.jsonl");
        write_lap_records(&path, &report().classification).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: LapRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.category, LapCategory::Average);
    }

    #[test]
    fn test_json_report() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.json");
        write_json_report(&path, &report()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["classification"]["best"]["lap"], 1);
        assert_eq!(value["classification"]["categories"]["2"]["category"], "average");
    }

    #[test]
    fn test_unwritable_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("report.json");
        assert!(matches!(
            write_json_report(&path, &report()),
            Err(KartlapError::WriterError { .. })
        ));
    }
}
