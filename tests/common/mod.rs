#![allow(dead_code)]

use sarfetch::io::{Download, Transport};
use sarfetch::{FetchError, FetchResult};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub enum Reply {
    Bytes(Vec<u8>),
    Text(String),
    Status(u16),
}

struct Route {
    pattern: String,
    reply: Reply,
    failures_left: AtomicUsize,
}

/// In-process transport: the first route whose pattern occurs in the URL answers.
/// Every request is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, pattern: &str, reply: Reply) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            reply,
            failures_left: AtomicUsize::new(0),
        });
        self
    }

    /// Like `route`, but the first `failures` requests fail with a network error
    pub fn flaky_route(mut self, pattern: &str, failures: usize, reply: Reply) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            reply,
            failures_left: AtomicUsize::new(failures),
        });
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.requests().iter().filter(|url| url.contains(pattern)).count()
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> FetchResult<Download> {
        self.requests.lock().unwrap().push(url.to_string());

        let route = self
            .routes
            .iter()
            .find(|r| url.contains(&r.pattern))
            .ok_or_else(|| FetchError::Http {
                status: 404,
                url: url.to_string(),
            })?;

        let pending = route.failures_left.load(Ordering::SeqCst);
        if pending > 0 {
            route.failures_left.store(pending - 1, Ordering::SeqCst);
            return Err(FetchError::Network {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }

        match &route.reply {
            Reply::Bytes(bytes) => Ok(Download::from_bytes(bytes.clone())),
            Reply::Text(text) => Ok(Download::from_bytes(text.clone().into_bytes())),
            Reply::Status(status) => Err(FetchError::Http {
                status: *status,
                url: url.to_string(),
            }),
        }
    }
}

/// Zip archive holding `entries` as (name, content) pairs
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// One ASF GeoJSON feature; `ring` is the footprint exterior as (lon, lat)
pub fn asf_feature(scene_name: &str, start_time: &str, ring: &[(f64, f64)]) -> serde_json::Value {
    let coordinates: Vec<Vec<f64>> = ring.iter().map(|&(lon, lat)| vec![lon, lat]).collect();
    serde_json::json!({
        "type": "Feature",
        "geometry": {"type": "Polygon", "coordinates": [coordinates]},
        "properties": {
            "fileID": format!("{}-SLC", scene_name),
            "sceneName": scene_name,
            "platform": "Sentinel-1A",
            "startTime": start_time,
            "pathNumber": 28,
            "frameNumber": 117,
            "flightDirection": "DESCENDING",
            "url": format!("https://datapool.asf.alaska.edu/SLC/SA/{}.zip", scene_name)
        }
    })
}

pub fn feature_collection(features: Vec<serde_json::Value>) -> String {
    serde_json::json!({"type": "FeatureCollection", "features": features}).to_string()
}

/// Closed rectangle ring
pub fn rectangle(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> Vec<(f64, f64)> {
    vec![
        (lon_min, lat_min),
        (lon_max, lat_min),
        (lon_max, lat_max),
        (lon_min, lat_max),
        (lon_min, lat_min),
    ]
}

/// Configuration for a 50 km buffer around Tehran in January 2020, writing under `root`
pub fn tehran_config(root: &Path, min_images: usize, coverage_percent: f64) -> String {
    let out = |name: &str| root.join(name).display().to_string().replace('\\', "/");
    format!(
        r#"
[Credentials]
username = "tester"
password = "secret"

[General]
data_source = "asf"
start_date = "2020-01-01"
end_date = "2020-01-31"
min_images = {min_images}
coverage_percent = {coverage_percent}
platform = "Sentinel-1A"
orbit_direction = "DESCENDING"
polarization = "VV+VH"

[Region]
region_type = "point_buffer"
region_folder = "study_area"
point_buffer = [51.35, 35.70, 50.0]

[Processing]
batch_size = 2
num_threads = 2
batch_delay_secs = 0
search_retries = 3
search_retry_delay_secs = 0
download_retries = 2
download_retry_delay_secs = 0
group_by = ["full", "simple"]

[Output]
output_dir = "{slc}"
orbit_dir = "{orbits}"
dem_file = "{dem}"
log_file = "{log}"
report_file = "{report}"
plot_dir = "{plots}"
prefer_orbit_type = "POEORB"
download_dem = false

[Selection]
"#,
        min_images = min_images,
        coverage_percent = coverage_percent,
        slc = out("slc"),
        orbits = out("orbits"),
        dem = out("dem/dem.tif"),
        log = out("sarfetch.log"),
        report = out("search_results_asf.txt"),
        plots = out("plots"),
    )
}

pub const SCENE_JAN05: &str = "S1A_IW_SLC__1SDV_20200105T022806_20200105T022833_030648_038335_6B8C";
pub const SCENE_JAN11: &str = "S1A_IW_SLC__1SDV_20200111T022806_20200111T022833_030735_038642_1A2B";
pub const SCENE_JAN17: &str = "S1A_IW_SLC__1SDV_20200117T022805_20200117T022832_030823_038951_77C0";

/// Two scenes covering the whole buffer and one covering its eastern half
pub fn tehran_search_response() -> String {
    feature_collection(vec![
        asf_feature(SCENE_JAN05, "2020-01-05T02:28:06Z", &rectangle(50.0, 35.0, 52.5, 36.5)),
        asf_feature(SCENE_JAN11, "2020-01-11T02:28:06Z", &rectangle(51.35, 35.0, 53.0, 36.5)),
        asf_feature(SCENE_JAN17, "2020-01-17T02:28:05Z", &rectangle(50.2, 35.1, 52.4, 36.4)),
    ])
}
