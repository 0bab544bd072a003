// Library interface for kartlap
// The binary and integration tests both go through these modules

pub mod analysis;
pub mod comparison;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod laps;
pub mod telemetry;
pub mod track;
pub mod writer;

// Re-export commonly used types
pub use analysis::{LapComparison, LapReport, SessionAnalyzer, SessionReport};
pub use comparison::{ComparisonResult, ComparisonThresholds};
pub use config::AnalysisConfig;
pub use engine::{GearSuggestion, Gearing, RpmBins, SectorRpmHistogram};
pub use errors::KartlapError;
pub use events::{Event, EventKind, EventThresholds};
pub use laps::{LapCategory, LapClassification, LapGroups};
pub use telemetry::{Sample, Session, load_session};
pub use track::{Crossing, CrossingPolicy, Gate, PlanarFrame};
