//! Remote collaborators and on-disk artifacts: search API, orbits, DEM tiles, archives

pub mod archive;
pub mod dem;
pub mod http;
pub mod orbit;
pub mod search;

pub use dem::{DemFetcher, DemResolution, DemStatus, SrtmTile};
pub use http::{Download, HttpTransport, RetryPolicy, Transport};
pub use orbit::{OrbitFetchReport, OrbitFetcher, OrbitType};
pub use search::{AsfSearchClient, SearchRequest};
