use criterion::{Criterion, black_box, criterion_group, criterion_main};
use kartlap::telemetry::{ChannelSet, Sample, Session, loader::read_session};
use kartlap::track::{PlanarFrame, PlanarPoint};
use kartlap::{AnalysisConfig, Gate, SessionAnalyzer};
use std::time::Duration;

const REF_LAT: f64 = 45.6;
const REF_LON: f64 = 9.28;
const SAMPLES_PER_LAP: usize = 600;

/// A circular 400 m track sampled at 10 Hz, laps getting slightly slower.
fn create_session(laps: u32) -> Session {
    let frame = PlanarFrame::new(REF_LAT, REF_LON);
    let radius = 400. / std::f64::consts::TAU;
    let mut samples = Vec::with_capacity(laps as usize * SAMPLES_PER_LAP);
    for lap in 1..=laps {
        let pace = 1. + lap as f64 * 0.003;
        for i in 0..SAMPLES_PER_LAP {
            let angle = i as f64 / SAMPLES_PER_LAP as f64 * std::f64::consts::TAU;
            let (lat, lon) =
                frame.to_geographic(PlanarPoint::new(radius * angle.cos(), radius * angle.sin()));
            samples.push(Sample {
                lap_index: lap,
                time_sec: Some(i as f64 * 0.1 * pace),
                lat: Some(lat),
                lon: Some(lon),
                rpm: Some(9000. + 1500. * (angle * 3.).sin()),
                speed_gps: Some(60. / pace),
                gforce_x: Some(0.4 * (angle * 4.).cos()),
                gforce_y: Some(0.8 * (angle * 2.).sin()),
                ..Sample::default()
            });
        }
    }
    Session::new("bench", samples, ChannelSet::all())
}

fn gated_config() -> AnalysisConfig {
    let radius = 400. / std::f64::consts::TAU;
    AnalysisConfig {
        gates: vec![
            Gate::new((radius - 5., 1.), (radius + 5., 1.)),
            Gate::new((-1., radius - 5.), (-1., radius + 5.)),
            Gate::new((-radius - 5., -1.), (-radius + 5., -1.)),
        ],
        ..AnalysisConfig::default()
    }
}

fn bench_session_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_analysis");
    let analyzer = SessionAnalyzer::new(gated_config());

    for laps in [10, 50] {
        let session = create_session(laps);
        group.bench_function(format!("analyze_{}_laps", laps), |b| {
            b.iter(|| {
                let mut session = session.clone();
                black_box(analyzer.analyze(&mut session, None))
            });
        });
    }

    group.finish();
}

fn bench_csv_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("loading");

    let session = create_session(10);
    let mut content = String::from("Lap;Time Lap;Lat.;Lon.;RPM;Speed GPS;Gf. X;Gf. Y\n");
    for s in &session.samples {
        content.push_str(&format!(
            "{};{:.3};{:.9};{:.9};{:.0};{:.1};{:.3};{:.3}\n",
            s.lap_index,
            s.time_sec.unwrap_or_default(),
            s.lat.unwrap_or_default(),
            s.lon.unwrap_or_default(),
            s.rpm.unwrap_or_default(),
            s.speed_gps.unwrap_or_default(),
            s.gforce_x.unwrap_or_default(),
            s.gforce_y.unwrap_or_default()
        ));
    }
    let config = AnalysisConfig::default();

    group.bench_function("read_6000_rows", |b| {
        b.iter(|| black_box(read_session(&content, "bench", &config).unwrap()));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = bench_session_analysis, bench_csv_loading
}
criterion_main!(benches);
