use crate::io::archive;
use crate::io::http::{stream_to_file, RetryPolicy, Transport};
use crate::types::{FetchError, FetchResult, Platform, SceneRecord};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// ESA STEP orbit archive root
pub const ESA_ORBIT_BASE_URL: &str = "https://step.esa.int/auxdata/orbits/Sentinel-1";

/// Orbit file types available from ESA
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrbitType {
    /// Precise Orbit Ephemerides (best accuracy, ~20 days delay)
    POEORB,
    /// Restituted Orbit Ephemerides (lower accuracy, ~3 hours delay)
    RESORB,
}

impl OrbitType {
    pub fn other(&self) -> OrbitType {
        match self {
            OrbitType::POEORB => OrbitType::RESORB,
            OrbitType::RESORB => OrbitType::POEORB,
        }
    }

    /// Types to try, preferred first
    pub fn search_order(preferred: OrbitType) -> [OrbitType; 2] {
        [preferred, preferred.other()]
    }
}

impl std::fmt::Display for OrbitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrbitType::POEORB => write!(f, "POEORB"),
            OrbitType::RESORB => write!(f, "RESORB"),
        }
    }
}

impl std::str::FromStr for OrbitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POEORB" => Ok(OrbitType::POEORB),
            "RESORB" => Ok(OrbitType::RESORB),
            other => Err(format!("unknown orbit type '{}' (expected POEORB or RESORB)", other)),
        }
    }
}

/// Parsed orbit file name, e.g.
/// `S1A_OPER_AUX_POEORB_OPOD_20200121T120654_V20191231T225942_20200102T005942.EOF.zip`
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitFileName {
    pub name: String,
    pub mission: String,
    pub orbit_type: OrbitType,
    pub validity_start: DateTime<Utc>,
    pub validity_end: DateTime<Utc>,
}

impl OrbitFileName {
    /// Parse a `.EOF` or `.EOF.zip` file name; `None` if it is not an orbit file
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".zip").unwrap_or(name);
        let stem = stem.strip_suffix(".EOF")?;

        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 8 {
            return None;
        }

        let orbit_type = parts[3].parse().ok()?;
        let start = parts[6].strip_prefix('V')?;
        let validity_start = parse_orbit_filename_time(start)?;
        let validity_end = parse_orbit_filename_time(parts[7])?;

        Some(Self {
            name: name.to_string(),
            mission: parts[0].to_string(),
            orbit_type,
            validity_start,
            validity_end,
        })
    }

    /// True when `t` falls inside `[validity_start, validity_end)`
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.validity_start <= t && t < self.validity_end
    }

    /// Distance in seconds from `t` to the middle of the validity window (lower is better)
    pub fn midpoint_distance(&self, t: DateTime<Utc>) -> i64 {
        let mid_time = self.validity_start + (self.validity_end - self.validity_start) / 2;
        (t - mid_time).num_seconds().abs()
    }

    /// Name of the unpacked orbit file
    pub fn eof_name(&self) -> String {
        self.name.strip_suffix(".zip").unwrap_or(&self.name).to_string()
    }
}

/// Parse time from orbit filename format (YYYYMMDDTHHMMSS)
fn parse_orbit_filename_time(time_str: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(time_str, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

/// Extract `.EOF.zip` file names from an HTML directory listing
pub fn extract_orbit_links(html: &str) -> FetchResult<Vec<String>> {
    let pattern = Regex::new(r#"href="([^"/]+\.EOF\.zip)""#)
        .map_err(|e| FetchError::Processing(format!("Invalid orbit link pattern: {}", e)))?;
    let mut names: Vec<String> = Vec::new();
    for capture in pattern.captures_iter(html) {
        let name = capture[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Pick the orbit file covering `t` whose validity midpoint is closest to it
pub fn select_orbit_file<'f>(candidates: &'f [OrbitFileName], t: DateTime<Utc>) -> Option<&'f OrbitFileName> {
    candidates
        .iter()
        .filter(|c| c.covers(t))
        .min_by_key(|c| c.midpoint_distance(t))
}

/// Orbit located or downloaded for one scene
#[derive(Debug, Clone)]
pub struct OrbitMatch {
    pub file_id: String,
    pub path: PathBuf,
    pub orbit_type: OrbitType,
    pub reused: bool,
}

/// Outcome of fetching orbits for a scene list
#[derive(Debug, Default)]
pub struct OrbitFetchReport {
    pub found: Vec<OrbitMatch>,
    pub missing: Vec<String>,
}

type ListingKey = (OrbitType, Platform, i32, u32);

/// Finds and downloads orbit files from the ESA STEP archive
pub struct OrbitFetcher<'a, T: Transport> {
    transport: &'a T,
    base_url: String,
    orbit_dir: PathBuf,
    preferred: OrbitType,
    retry: RetryPolicy,
    listings: HashMap<ListingKey, Vec<OrbitFileName>>,
}

impl<'a, T: Transport> OrbitFetcher<'a, T> {
    pub fn new(transport: &'a T, orbit_dir: impl Into<PathBuf>, preferred: OrbitType, retry: RetryPolicy) -> Self {
        Self {
            transport,
            base_url: ESA_ORBIT_BASE_URL.to_string(),
            orbit_dir: orbit_dir.into(),
            preferred,
            retry,
            listings: HashMap::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Directory URL for one month of one orbit type and satellite
    pub fn month_url(&self, orbit_type: OrbitType, platform: Platform, year: i32, month: u32) -> String {
        format!(
            "{}/{}/{}/{:04}/{:02}/",
            self.base_url,
            orbit_type,
            platform.code(),
            year,
            month
        )
    }

    /// Fetch orbits for every scene; failures are logged and reported as missing
    pub fn fetch_all(&mut self, scenes: &[SceneRecord]) -> OrbitFetchReport {
        log::info!("Fetching orbit files for {} scene(s) into {}", scenes.len(), self.orbit_dir.display());
        let mut report = OrbitFetchReport::default();

        for scene in scenes {
            match self.fetch_for_scene(scene) {
                Ok(found) => {
                    log::info!(
                        "Orbit for {}: {} ({})",
                        scene.file_id,
                        found.path.display(),
                        if found.reused { "existing" } else { "downloaded" }
                    );
                    report.found.push(found);
                }
                Err(e) => {
                    log::error!("No orbit file for {}: {}", scene.file_id, e);
                    report.missing.push(scene.file_id.clone());
                }
            }
        }

        log::info!(
            "Orbit files: {} found, {} missing",
            report.found.len(),
            report.missing.len()
        );
        report
    }

    /// Locate or download the orbit file for one scene
    pub fn fetch_for_scene(&mut self, scene: &SceneRecord) -> FetchResult<OrbitMatch> {
        let t = scene.start_time;

        for orbit_type in OrbitType::search_order(self.preferred) {
            if let Some(path) = self.find_local(scene.platform, orbit_type, t)? {
                return Ok(OrbitMatch {
                    file_id: scene.file_id.clone(),
                    path,
                    orbit_type,
                    reused: true,
                });
            }

            let candidates = self.candidates(orbit_type, scene.platform, t);
            let files: Vec<OrbitFileName> = candidates.iter().map(|(_, file)| file.clone()).collect();
            if let Some(chosen) = select_orbit_file(&files, t) {
                let dir_url = candidates
                    .iter()
                    .find(|(_, file)| file.name == chosen.name)
                    .map(|(dir, _)| dir.as_str())
                    .unwrap_or_default();
                let url = format!("{}{}", dir_url, chosen.name);
                let path = self.download(&url, chosen)?;
                return Ok(OrbitMatch {
                    file_id: scene.file_id.clone(),
                    path,
                    orbit_type,
                    reused: false,
                });
            }

            log::debug!("No {} file covers {} for {}", orbit_type, t, scene.file_id);
        }

        Err(FetchError::Processing(format!(
            "no POEORB or RESORB file covers {} ({})",
            t.format("%Y-%m-%dT%H:%M:%S"),
            scene.platform.code()
        )))
    }

    /// Existing `.EOF` in the orbit directory covering `t`
    fn find_local(&self, platform: Platform, orbit_type: OrbitType, t: DateTime<Utc>) -> FetchResult<Option<PathBuf>> {
        if !self.orbit_dir.is_dir() {
            return Ok(None);
        }

        let mut local = Vec::new();
        for entry in fs::read_dir(&self.orbit_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".EOF") {
                continue;
            }
            if let Some(parsed) = OrbitFileName::parse(&name) {
                if parsed.orbit_type == orbit_type && parsed.mission == platform.code() {
                    local.push(parsed);
                }
            }
        }

        Ok(select_orbit_file(&local, t).map(|f| self.orbit_dir.join(&f.name)))
    }

    /// Listed files for the month of `t` and of the day before, paired with their directory URL
    fn candidates(&mut self, orbit_type: OrbitType, platform: Platform, t: DateTime<Utc>) -> Vec<(String, OrbitFileName)> {
        let day_before = t - Duration::days(1);
        let mut months = vec![(t.year(), t.month())];
        if (day_before.year(), day_before.month()) != months[0] {
            months.push((day_before.year(), day_before.month()));
        }

        let mut candidates: Vec<(String, OrbitFileName)> = Vec::new();
        for (year, month) in months {
            let dir_url = self.month_url(orbit_type, platform, year, month);
            for file in self.listing(orbit_type, platform, year, month) {
                if !candidates.iter().any(|(_, c)| c.name == file.name) {
                    candidates.push((dir_url.clone(), file));
                }
            }
        }
        candidates
    }

    /// Cached directory listing; a failed listing is logged and not cached
    fn listing(&mut self, orbit_type: OrbitType, platform: Platform, year: i32, month: u32) -> Vec<OrbitFileName> {
        let key = (orbit_type, platform, year, month);
        if let Some(files) = self.listings.get(&key) {
            return files.clone();
        }

        let url = self.month_url(orbit_type, platform, year, month);
        let transport = self.transport;
        let result = self
            .retry
            .run_expecting(&format!("Orbit listing {}", url), FetchError::is_not_found, |_| {
                transport.get_text(&url)
            })
            .and_then(|html| extract_orbit_links(&html));

        match result {
            Ok(names) => {
                let files: Vec<OrbitFileName> = names
                    .iter()
                    .filter_map(|name| OrbitFileName::parse(name))
                    .collect();
                log::debug!("{} orbit file(s) listed at {}", files.len(), url);
                self.listings.insert(key, files.clone());
                files
            }
            Err(e) if e.is_not_found() => {
                log::debug!("No orbit directory at {}", url);
                self.listings.insert(key, Vec::new());
                Vec::new()
            }
            Err(e) => {
                log::warn!("Could not list {}: {}", url, e);
                Vec::new()
            }
        }
    }

    /// Download `url`, unpack the `.EOF` next to it and remove the zip
    fn download(&self, url: &str, file: &OrbitFileName) -> FetchResult<PathBuf> {
        fs::create_dir_all(&self.orbit_dir)?;
        let zip_path = self.orbit_dir.join(&file.name);
        let eof_path = self.orbit_dir.join(file.eof_name());

        log::info!("Downloading orbit file {}", url);
        let transport = self.transport;
        self.retry.run(&format!("Orbit download {}", file.name), |_| {
            let download = transport.get(url)?;
            stream_to_file(download, &zip_path, &file.name)
        })?;

        if starts_with_zip_magic(&zip_path)? {
            archive::extract_single(&zip_path, ".EOF", &eof_path)?;
            fs::remove_file(&zip_path)?;
        } else {
            log::debug!("{} is not a ZIP archive, keeping it as plain EOF", file.name);
            fs::rename(&zip_path, &eof_path)?;
        }

        Ok(eof_path)
    }
}

fn starts_with_zip_magic(path: &Path) -> FetchResult<bool> {
    let mut header = [0u8; 4];
    let mut file = fs::File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(archive::is_zip_content(&header[..read]))
}
