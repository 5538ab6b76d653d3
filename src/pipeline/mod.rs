//! End-to-end search and download pipelines
//!
//! Both pipelines take the validated [`Config`](crate::config::Config) and a
//! [`Transport`](crate::io::Transport) so they can run against the real
//! services or an in-process fake.

pub mod download;
pub mod search;

pub use download::run_download;
pub use search::{run_search, SearchOutcome};

use crate::config::Config;
use crate::core::coverage::CoverageFilter;
use crate::core::region::Region;
use crate::io::http::{RetryPolicy, Transport};
use crate::io::search::{AsfSearchClient, SearchRequest};
use crate::types::{FetchResult, SceneRecord};

/// Region, search and coverage filter shared by both pipelines
pub(crate) fn find_scenes<T: Transport>(config: &Config, transport: &T) -> FetchResult<(Region, String, Vec<SceneRecord>)> {
    let region = Region::from_spec(&config.region)?;
    let region_wkt = region.search_wkt();
    log::debug!("Search region WKT: {}", region_wkt);

    let retry = RetryPolicy::new(config.processing.search_retries, config.processing.search_retry_delay);
    let client = AsfSearchClient::new(transport, retry, config.processing.search_chunk_days)
        .with_raw_log(config.output.raw_response_log.clone());

    let request = SearchRequest::from_config(config, region_wkt.clone());
    log::info!(
        "Searching {} to {}, path {}, frame {}",
        request.start,
        request.end,
        request.path.map_or("all".to_string(), |p| p.to_string()),
        request.frame.map_or("all".to_string(), |f| f.to_string())
    );
    let records = client.search(&request)?;

    let filter = CoverageFilter::new(config.general.coverage_percent);
    if filter.is_disabled() {
        log::info!("Coverage filter disabled (coverage_percent=0)");
    }
    let scenes = filter.apply(&region, records);
    Ok((region, region_wkt, scenes))
}
