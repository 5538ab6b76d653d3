//! Geometry, filtering, grouping and download orchestration

pub mod batch;
pub mod coverage;
pub mod grouping;
pub mod plot;
pub mod region;
pub mod summary;

// Re-export main types
pub use batch::{BatchDownloader, BatchReport, DownloadOutcome, ManifestEntry};
pub use coverage::{coverage_percent, CoverageFilter};
pub use grouping::{group_scenes, GroupField, GroupingPolicy, SceneGroup};
pub use plot::{PlotRenderer, TemporalPlot};
pub use region::Region;
pub use summary::RunSummary;
