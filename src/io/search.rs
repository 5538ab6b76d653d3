use crate::config::Config;
use crate::io::http::{RetryPolicy, Transport};
use crate::types::{FetchError, FetchResult, FlightDirection, Platform, Polarization, SceneRecord};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// ASF search API endpoint
pub const ASF_SEARCH_URL: &str = "https://api.daac.asf.alaska.edu/services/search/param";

/// Parameters of one catalogue search
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub region_wkt: String,
    pub platforms: Vec<Platform>,
    pub directions: Vec<FlightDirection>,
    pub polarizations: Vec<Polarization>,
    pub path: Option<u32>,
    pub frame: Option<u32>,
}

impl SearchRequest {
    pub fn from_config(config: &Config, region_wkt: impl Into<String>) -> Self {
        Self {
            start: config.general.start_date,
            end: config.general.end_date,
            region_wkt: region_wkt.into(),
            platforms: config.general.platforms.clone(),
            directions: config.general.orbit_directions.clone(),
            polarizations: config.general.polarizations.clone(),
            path: config.selection.path,
            frame: config.selection.frame,
        }
    }
}

/// Split `[start, end]` into consecutive inclusive chunks of at most `chunk_days` days
pub fn date_chunks(start: NaiveDate, end: NaiveDate, chunk_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let step = Duration::days(chunk_days.max(1) as i64);
    let mut chunks = Vec::new();
    let mut current = start;
    while current <= end {
        let chunk_end = (current + step - Duration::days(1)).min(end);
        chunks.push((current, chunk_end));
        current = chunk_end + Duration::days(1);
    }
    chunks
}

/// Client for the ASF search API
pub struct AsfSearchClient<'a, T: Transport> {
    transport: &'a T,
    base_url: String,
    retry: RetryPolicy,
    chunk_days: u32,
    raw_log: Option<PathBuf>,
}

impl<'a, T: Transport> AsfSearchClient<'a, T> {
    pub fn new(transport: &'a T, retry: RetryPolicy, chunk_days: u32) -> Self {
        Self {
            transport,
            base_url: ASF_SEARCH_URL.to_string(),
            retry,
            chunk_days,
            raw_log: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Append every raw response to `path`
    pub fn with_raw_log(mut self, path: Option<PathBuf>) -> Self {
        self.raw_log = path;
        self
    }

    /// Run every (chunk, polarization, direction, platform) query.
    ///
    /// A query that still fails after its retries aborts the whole search.
    pub fn search(&self, request: &SearchRequest) -> FetchResult<Vec<SceneRecord>> {
        let chunks = date_chunks(request.start, request.end, self.chunk_days);
        log::info!(
            "Starting ASF search over {} date range(s), {} polarization(s), {} direction(s), {} platform(s)",
            chunks.len(),
            request.polarizations.len(),
            request.directions.len(),
            request.platforms.len()
        );

        let mut records = Vec::new();
        for &(chunk_start, chunk_end) in &chunks {
            log::info!("Searching date range: {} to {}", chunk_start, chunk_end);
            for &polarization in &request.polarizations {
                for &direction in &request.directions {
                    let mut seen: HashSet<String> = HashSet::new();
                    for &platform in &request.platforms {
                        let found = self.query(request, chunk_start, chunk_end, polarization, direction, platform)?;
                        for record in found {
                            if seen.insert(record.file_id.clone()) {
                                records.push(record);
                            }
                        }
                    }
                }
            }
        }

        log::info!("ASF search returned {} product(s)", records.len());
        Ok(records)
    }

    /// One API call for a single parameter combination
    pub fn query(
        &self,
        request: &SearchRequest,
        start: NaiveDate,
        end: NaiveDate,
        polarization: Polarization,
        direction: FlightDirection,
        platform: Platform,
    ) -> FetchResult<Vec<SceneRecord>> {
        log::info!(
            "ASF Search: Polarization={}, Orbit={}, Platform={}",
            polarization,
            direction,
            platform
        );

        let url = self.query_url(request, start, end, polarization, direction, platform)?;
        let what = format!(
            "ASF search pol={}, orbit={}, platform={}, {} to {}",
            polarization, direction, platform, start, end
        );

        let transport = self.transport;
        let body = self.retry.run(&what, |_| transport.get_text(url.as_str()))?;

        if let Some(path) = &self.raw_log {
            if let Err(e) = self.append_raw(path, &body, start, end, polarization, direction, platform) {
                log::warn!("Could not write raw response log {}: {}", path.display(), e);
            }
        }

        let mut records = parse_geojson_response(&body, polarization)?;
        for record in &mut records {
            if record.platform != platform {
                log::debug!("{} reported platform {}, queried {}", record.file_id, record.platform, platform);
            }
            record.flight_direction = direction;
        }
        log::info!("Found {} products.", records.len());
        Ok(records)
    }

    fn query_url(
        &self,
        request: &SearchRequest,
        start: NaiveDate,
        end: NaiveDate,
        polarization: Polarization,
        direction: FlightDirection,
        platform: Platform,
    ) -> FetchResult<Url> {
        let mut params: Vec<(&str, String)> = vec![
            ("platform", platform.as_str().to_string()),
            ("processingLevel", "SLC".to_string()),
            ("start", format!("{}T00:00:00Z", start.format("%Y-%m-%d"))),
            ("end", format!("{}T23:59:59Z", end.format("%Y-%m-%d"))),
            ("intersectsWith", request.region_wkt.clone()),
            ("flightDirection", direction.as_str().to_string()),
            ("polarization", polarization.as_str().to_string()),
        ];
        if let Some(path) = request.path {
            params.push(("relativeOrbit", path.to_string()));
        }
        if let Some(frame) = request.frame {
            params.push(("frame", frame.to_string()));
        }
        params.push(("output", "geojson".to_string()));

        Url::parse_with_params(&self.base_url, &params)
            .map_err(|e| FetchError::Parse(format!("Invalid search URL {}: {}", self.base_url, e)))
    }

    #[allow(clippy::too_many_arguments)]
    fn append_raw(
        &self,
        path: &PathBuf,
        body: &str,
        start: NaiveDate,
        end: NaiveDate,
        polarization: Polarization,
        direction: FlightDirection,
        platform: Platform,
    ) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            file,
            "Polarization: {}, Orbit: {}, Platform: {}, Date Range: {} to {}",
            polarization, direction, platform, start, end
        )?;
        writeln!(file, "Response: {}\n", body)
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    geometry: Option<GeoJsonGeometry>,
    properties: Properties,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    #[serde(rename = "fileID")]
    file_id: String,
    #[serde(default)]
    scene_name: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    start_time: String,
    #[serde(default)]
    path_number: Option<serde_json::Value>,
    #[serde(default)]
    frame_number: Option<serde_json::Value>,
    #[serde(default)]
    flight_direction: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    bytes: Option<serde_json::Value>,
}

/// Parse an ASF GeoJSON response into scene records.
///
/// `METADATA_SLC` entries are dropped and duplicate file ids are kept once.
/// Features that cannot be interpreted are logged and skipped.
pub fn parse_geojson_response(body: &str, polarization: Polarization) -> FetchResult<Vec<SceneRecord>> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|e| FetchError::Parse(format!("Invalid GeoJSON search response: {}", e)))?;

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(collection.features.len());
    for feature in collection.features {
        let props = &feature.properties;
        if props.file_id.contains("METADATA_SLC") {
            continue;
        }
        if !seen.insert(props.file_id.clone()) {
            continue;
        }

        match feature_to_record(&feature, polarization) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping product {}: {}", props.file_id, e),
        }
    }
    Ok(records)
}

fn feature_to_record(feature: &Feature, polarization: Polarization) -> FetchResult<SceneRecord> {
    let props = &feature.properties;
    let platform = match &props.platform {
        Some(name) => name.parse().map_err(FetchError::Parse)?,
        None => platform_from_file_id(&props.file_id)?,
    };
    let flight_direction = match &props.flight_direction {
        Some(direction) => direction.parse().map_err(FetchError::Parse)?,
        None => FlightDirection::Ascending,
    };

    Ok(SceneRecord {
        file_id: props.file_id.clone(),
        scene_name: props.scene_name.clone().unwrap_or_default(),
        platform,
        start_time: parse_start_time(&props.start_time)?,
        footprint: feature.geometry.as_ref().and_then(to_multipolygon),
        path: json_u32(props.path_number.as_ref()).unwrap_or(0),
        frame: json_u32(props.frame_number.as_ref()).unwrap_or(0),
        polarization,
        flight_direction,
        url: props.url.clone().unwrap_or_default(),
        size_bytes: props.bytes.as_ref().and_then(json_u64),
        coverage_percent: 0.0,
    })
}

fn platform_from_file_id(file_id: &str) -> FetchResult<Platform> {
    file_id
        .get(0..3)
        .ok_or_else(|| FetchError::Parse(format!("No platform for {}", file_id)))?
        .parse()
        .map_err(FetchError::Parse)
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` time in UTC
fn parse_start_time(text: &str) -> FetchResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    let trimmed = text.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .map_err(|e| FetchError::Parse(format!("Invalid startTime '{}': {}", text, e)))
}

fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_u32(value: Option<&serde_json::Value>) -> Option<u32> {
    value.and_then(json_u64).and_then(|n| u32::try_from(n).ok())
}

fn ring(points: &[Vec<f64>]) -> LineString<f64> {
    points
        .iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(ring(exterior), interiors.iter().map(|r| ring(r)).collect()))
}

fn to_multipolygon(geometry: &GeoJsonGeometry) -> Option<MultiPolygon<f64>> {
    match geometry {
        GeoJsonGeometry::Polygon { coordinates } => polygon(coordinates).map(|p| MultiPolygon::new(vec![p])),
        GeoJsonGeometry::MultiPolygon { coordinates } => {
            let polygons: Vec<Polygon<f64>> = coordinates.iter().filter_map(|rings| polygon(rings)).collect();
            (!polygons.is_empty()).then(|| MultiPolygon::new(polygons))
        }
        GeoJsonGeometry::Unsupported => None,
    }
}
