// Engine usage per sector: RPM distribution and gearing fit

pub mod gearing;
pub mod histogram;

pub use gearing::{GearScore, GearSuggestion, Gearing, SectorGearing, suggest_gearing};
pub use histogram::{RpmBins, SectorRpmHistogram, sector_rpm_histograms};
