//! sarfetch: Sentinel-1 SLC search and download for InSAR preparation
//!
//! This library searches the ASF catalogue for SLC products over a region,
//! filters and groups them by coverage and acquisition geometry, and fetches
//! the products together with precise orbit files and an SRTM DEM.

pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{Config, ConfigError};
pub use types::{BoundingBox, FetchError, FetchResult, FlightDirection, Platform, Polarization, SceneRecord};

pub use core::{CoverageFilter, GroupingPolicy, Region, RunSummary};
pub use io::{HttpTransport, RetryPolicy, Transport};
pub use pipeline::{run_download, run_search};
