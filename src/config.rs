//! Configuration loading and validation
//!
//! The configuration is a TOML file with the sections `[Credentials]`,
//! `[General]`, `[Region]`, `[Processing]`, `[Output]` and `[Selection]`.
//! Every field is checked once at load time; the resulting [`Config`] is
//! immutable and handed to each pipeline stage by reference.

use crate::core::grouping::GroupingPolicy;
use crate::io::dem::DemResolution;
use crate::io::orbit::OrbitType;
use crate::types::{FlightDirection, Platform, Polarization};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Template written when the configuration file does not exist yet
pub const CONFIG_TEMPLATE: &str = r#"# sarfetch configuration
# Fill in the placeholders below, then run the command again.

[Credentials]
# NASA Earthdata login (https://urs.earthdata.nasa.gov)
username = ""
password = ""

[General]
data_source = "asf"
start_date = "2016-01-01"
end_date = "2024-12-31"
# Groups with fewer images than this are dropped from the search report
min_images = 10
# Minimum share of the region covered by a scene footprint (0 disables the filter)
coverage_percent = 100
# Sentinel-1A, Sentinel-1B, Sentinel-1C or "all"
platform = "all"
# ASCENDING, DESCENDING or "both"
orbit_direction = "both"
# VV, VH, HH, HV, VV+VH, HH+HV or "all"
polarization = "all"

[Region]
# bounding_box, point_buffer, shapefile, geojson, kml or kmz
region_type = "bounding_box"
region_folder = "study_area"
# lon_min, lat_min, lon_max, lat_max
bounding_box = [51.1453, 35.5941, 51.5932, 35.8191]
# center_lon, center_lat, radius_km
# point_buffer = [51.35, 35.70, 50.0]
# File names inside region_folder
# shapefile = "study_area.shp"
# geojson = "study_area.geojson"
# kml = "study_area.kml"
# kmz = "study_area.kmz"

[Processing]
batch_size = 5
num_threads = 2
batch_delay_secs = 5
search_chunk_days = 180
search_retries = 3
search_retry_delay_secs = 5
download_retries = 5
download_retry_delay_secs = 15
request_timeout_secs = 600
# Preset names ("full", "simple") or comma-separated fields
# (polarization, orbit, platform, path, frame)
group_by = ["full", "simple"]

[Output]
output_dir = "sentinel/slc"
orbit_dir = "sentinel/orbits"
dem_file = "sentinel/dem/dem.tif"
log_file = "sentinel/sarfetch.log"
report_file = "sentinel/search_results_asf.txt"
plot_dir = "sentinel/plots"
# raw_response_log = "sentinel/raw_api_responses_asf.log"
prefer_orbit_type = "POEORB"
download_dem = true
continue_without_dem = true
# 30m (SRTMGL1) or 90m (SRTMGL3)
dem_resolution = "30m"

[Selection]
# Restrict the download to one relative orbit / frame
# selected_path = 13
# selected_frame = 117
"#;

/// Configuration errors, each naming the field and how to fix it
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file {} not found; a template was written there. Fill in your credentials and region settings, then run again.", path.display())]
    TemplateCreated { path: PathBuf },

    #[error("Config file {} already exists; pass --force to overwrite it.", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Could not read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {} is not valid TOML: {message}", path.display())]
    Syntax { path: PathBuf, message: String },

    #[error("Missing required config key: {key}. Please add '{key}' to the [{section}] section of the config file and try again.")]
    Missing {
        section: &'static str,
        key: &'static str,
    },

    #[error("Invalid {key} in [{section}]: '{value}'. {reason}. Please correct '{key}' in the [{section}] section of the config file and try again.")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &'static str, key: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            section,
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Earthdata login
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeneralSettings {
    pub data_source: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub min_images: usize,
    pub coverage_percent: f64,
    pub platforms: Vec<Platform>,
    pub orbit_directions: Vec<FlightDirection>,
    pub polarizations: Vec<Polarization>,
}

/// Vector formats accepted as region input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Shapefile,
    GeoJson,
    Kml,
    Kmz,
}

impl VectorKind {
    pub fn key(&self) -> &'static str {
        match self {
            VectorKind::Shapefile => "shapefile",
            VectorKind::GeoJson => "geojson",
            VectorKind::Kml => "kml",
            VectorKind::Kmz => "kmz",
        }
    }
}

/// How the region of interest is described
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSpec {
    BoundingBox {
        lon_min: f64,
        lat_min: f64,
        lon_max: f64,
        lat_max: f64,
    },
    PointBuffer {
        lon: f64,
        lat: f64,
        radius_km: f64,
    },
    VectorFile {
        kind: VectorKind,
        path: PathBuf,
    },
}

impl RegionSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            RegionSpec::BoundingBox { .. } => "bounding_box",
            RegionSpec::PointBuffer { .. } => "point_buffer",
            RegionSpec::VectorFile { kind, .. } => kind.key(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingSettings {
    pub batch_size: usize,
    pub num_threads: usize,
    pub batch_delay: Duration,
    pub search_chunk_days: u32,
    pub search_retries: u32,
    pub search_retry_delay: Duration,
    pub download_retries: u32,
    pub download_retry_delay: Duration,
    pub request_timeout: Duration,
    pub group_by: Vec<GroupingPolicy>,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub output_dir: PathBuf,
    pub orbit_dir: PathBuf,
    pub dem_file: PathBuf,
    pub log_file: PathBuf,
    pub report_file: PathBuf,
    pub plot_dir: PathBuf,
    pub raw_response_log: Option<PathBuf>,
    pub prefer_orbit_type: OrbitType,
    pub download_dem: bool,
    pub continue_without_dem: bool,
    pub dem_resolution: DemResolution,
}

impl OutputSettings {
    /// Directory holding the individual DEM tiles
    pub fn dem_dir(&self) -> PathBuf {
        self.dem_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Optional relative orbit / frame restriction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub path: Option<u32>,
    pub frame: Option<u32>,
}

/// Validated run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub source: PathBuf,
    pub credentials: Credentials,
    pub general: GeneralSettings,
    pub region: RegionSpec,
    pub processing: ProcessingSettings,
    pub output: OutputSettings,
    pub selection: Selection,
    /// Non-fatal findings, logged once logging is up
    pub warnings: Vec<String>,
}

impl Config {
    /// Load the configuration file, writing a template first if it is absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            write_template(path, false)?;
            return Err(ConfigError::TemplateCreated {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Parse and validate configuration text; `source` is used in messages only
    pub fn from_toml_str(content: &str, source: &Path) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| ConfigError::Syntax {
            path: source.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut warnings = Vec::new();

        let credentials_section = Section::new(&table, "Credentials")?;
        let general_section = Section::new(&table, "General")?;
        let region_section = Section::new(&table, "Region")?;
        let processing_section = Section::new(&table, "Processing")?;
        let output_section = Section::new(&table, "Output")?;
        let selection_section = Section::new(&table, "Selection")?;

        let credentials = Credentials {
            username: credentials_section.required_string("username")?,
            password: credentials_section.required_string("password")?,
        };

        let general = parse_general(&general_section)?;
        let region = parse_region(&region_section, &mut warnings)?;
        let processing = parse_processing(&processing_section)?;
        let output = parse_output(&output_section)?;

        let selection = Selection {
            path: selection_section.optional_u32("selected_path")?,
            frame: selection_section.optional_u32("selected_frame")?,
        };

        Ok(Config {
            source: source.to_path_buf(),
            credentials,
            general,
            region,
            processing,
            output,
            selection,
            warnings,
        })
    }
}

/// Write the configuration template; refuses to overwrite unless `force`
pub fn write_template(path: &Path, force: bool) -> Result<(), ConfigError> {
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, CONFIG_TEMPLATE)
    };
    write().map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_general(section: &Section<'_>) -> Result<GeneralSettings, ConfigError> {
    let data_source = section.required_string("data_source")?;
    if !data_source.eq_ignore_ascii_case("asf") {
        return Err(ConfigError::invalid(
            "General",
            "data_source",
            &data_source,
            "Only 'asf' is supported",
        ));
    }

    let start_date = section.required_date("start_date")?;
    let end_date = section.required_date("end_date")?;
    if start_date > end_date {
        return Err(ConfigError::invalid(
            "General",
            "end_date",
            end_date,
            format!("end_date must not be before start_date ({})", start_date),
        ));
    }

    let min_images = match section.optional_integer("min_images")? {
        None => 10,
        Some(n) if n > 0 => n as usize,
        Some(n) => {
            return Err(ConfigError::invalid(
                "General",
                "min_images",
                n,
                "min_images must be a positive integer",
            ))
        }
    };

    let coverage_percent = section.optional_float("coverage_percent")?.unwrap_or(100.0);
    if !(0.0..=100.0).contains(&coverage_percent) {
        return Err(ConfigError::invalid(
            "General",
            "coverage_percent",
            coverage_percent,
            "coverage_percent must be between 0 and 100",
        ));
    }

    let platforms = section.choice_list("platform", &["all", "both"], &Platform::ALL)?;
    let orbit_directions = section.choice_list("orbit_direction", &["both", "all"], &FlightDirection::ALL)?;
    let polarizations = section.choice_list("polarization", &["all"], &Polarization::ALL)?;

    Ok(GeneralSettings {
        data_source: data_source.to_lowercase(),
        start_date,
        end_date,
        min_images,
        coverage_percent,
        platforms,
        orbit_directions,
        polarizations,
    })
}

fn parse_region(section: &Section<'_>, warnings: &mut Vec<String>) -> Result<RegionSpec, ConfigError> {
    const REGION_FIELDS: [&str; 6] = ["bounding_box", "point_buffer", "shapefile", "geojson", "kml", "kmz"];

    let region_type = section.required_string("region_type")?.to_lowercase();
    let region_folder = PathBuf::from(section.required_string("region_folder")?);

    let spec = match region_type.as_str() {
        "bounding_box" => {
            let values = section.float_list("bounding_box", 4, "lon_min, lat_min, lon_max, lat_max")?;
            RegionSpec::BoundingBox {
                lon_min: values[0],
                lat_min: values[1],
                lon_max: values[2],
                lat_max: values[3],
            }
        }
        "point_buffer" => {
            let values = section.float_list("point_buffer", 3, "center_lon, center_lat, radius_km")?;
            RegionSpec::PointBuffer {
                lon: values[0],
                lat: values[1],
                radius_km: values[2],
            }
        }
        "shapefile" | "geojson" | "kml" | "kmz" => {
            let kind = match region_type.as_str() {
                "shapefile" => VectorKind::Shapefile,
                "geojson" => VectorKind::GeoJson,
                "kml" => VectorKind::Kml,
                _ => VectorKind::Kmz,
            };
            let file_name = section.required_string(kind.key())?;
            RegionSpec::VectorFile {
                kind,
                path: region_folder.join(file_name),
            }
        }
        other => {
            return Err(ConfigError::invalid(
                "Region",
                "region_type",
                other,
                "Supported types are bounding_box, point_buffer, shapefile, geojson, kml and kmz",
            ))
        }
    };

    for field in REGION_FIELDS {
        if field != spec.type_name() && section.has_value(field) {
            warnings.push(format!(
                "Ignoring unused field '{}' for region_type={}",
                field, region_type
            ));
        }
    }

    Ok(spec)
}

fn parse_processing(section: &Section<'_>) -> Result<ProcessingSettings, ConfigError> {
    let batch_size = section.positive("batch_size", 5)?;
    let num_threads = section.positive("num_threads", 2)?;
    let search_chunk_days = section.positive("search_chunk_days", 180)? as u32;
    let search_retries = section.positive("search_retries", 3)? as u32;
    let download_retries = section.positive("download_retries", 5)? as u32;
    let request_timeout = Duration::from_secs(section.positive("request_timeout_secs", 600)? as u64);

    let group_by = match section.string_list("group_by")? {
        None => vec![GroupingPolicy::full(), GroupingPolicy::simple()],
        Some(specs) => specs
            .iter()
            .map(|spec| {
                GroupingPolicy::parse(spec)
                    .map_err(|reason| ConfigError::invalid("Processing", "group_by", spec, reason))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(ProcessingSettings {
        batch_size,
        num_threads,
        batch_delay: section.seconds("batch_delay_secs", 5)?,
        search_chunk_days,
        search_retries,
        search_retry_delay: section.seconds("search_retry_delay_secs", 5)?,
        download_retries,
        download_retry_delay: section.seconds("download_retry_delay_secs", 15)?,
        request_timeout,
        group_by,
    })
}

fn parse_output(section: &Section<'_>) -> Result<OutputSettings, ConfigError> {
    let path_or = |key: &'static str, default: &str| -> Result<PathBuf, ConfigError> {
        Ok(PathBuf::from(
            section.optional_string(key)?.unwrap_or_else(|| default.to_string()),
        ))
    };

    let prefer_orbit_type = match section.optional_string("prefer_orbit_type")? {
        None => OrbitType::POEORB,
        Some(value) => value
            .parse()
            .map_err(|reason: String| ConfigError::invalid("Output", "prefer_orbit_type", &value, reason))?,
    };

    let dem_resolution = match section.optional_string("dem_resolution")? {
        None => DemResolution::Arc1,
        Some(value) => value
            .parse()
            .map_err(|reason: String| ConfigError::invalid("Output", "dem_resolution", &value, reason))?,
    };

    Ok(OutputSettings {
        output_dir: path_or("output_dir", "sentinel/slc")?,
        orbit_dir: path_or("orbit_dir", "sentinel/orbits")?,
        dem_file: path_or("dem_file", "sentinel/dem/dem.tif")?,
        log_file: path_or("log_file", "sentinel/sarfetch.log")?,
        report_file: path_or("report_file", "sentinel/search_results_asf.txt")?,
        plot_dir: path_or("plot_dir", "sentinel/plots")?,
        raw_response_log: section.optional_string("raw_response_log")?.map(PathBuf::from),
        prefer_orbit_type,
        download_dem: section.optional_bool("download_dem")?.unwrap_or(true),
        continue_without_dem: section.optional_bool("continue_without_dem")?.unwrap_or(true),
        dem_resolution,
    })
}

/// Typed accessors over one TOML section
struct Section<'a> {
    name: &'static str,
    table: Option<&'a toml::Table>,
}

impl<'a> Section<'a> {
    fn new(root: &'a toml::Table, name: &'static str) -> Result<Self, ConfigError> {
        match root.get(name) {
            None => Ok(Section { name, table: None }),
            Some(toml::Value::Table(table)) => Ok(Section { name, table: Some(table) }),
            Some(other) => Err(ConfigError::invalid(name, name, other, "expected a [section] table")),
        }
    }

    fn get(&self, key: &str) -> Option<&'a toml::Value> {
        self.table.and_then(|t| t.get(key))
    }

    /// True when the key exists with a non-blank value
    fn has_value(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(toml::Value::String(s)) => !s.trim().is_empty(),
            Some(toml::Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        }
    }

    fn optional_string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(other) => Err(ConfigError::invalid(self.name, key, other, "expected a string")),
        }
    }

    fn required_string(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional_string(key)?.ok_or(ConfigError::Missing {
            section: self.name,
            key,
        })
    }

    fn required_date(&self, key: &'static str) -> Result<NaiveDate, ConfigError> {
        match self.get(key) {
            Some(toml::Value::Datetime(dt)) => {
                let text = dt.to_string();
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map_err(|_| ConfigError::invalid(self.name, key, text, "Use YYYY-MM-DD format"))
            }
            _ => {
                let text = self.required_string(key)?;
                NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map_err(|_| ConfigError::invalid(self.name, key, text, "Use YYYY-MM-DD format"))
            }
        }
    }

    fn optional_integer(&self, key: &'static str) -> Result<Option<i64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(n)) => Ok(Some(*n)),
            Some(toml::Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(toml::Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::invalid(self.name, key, s, "expected an integer")),
            Some(other) => Err(ConfigError::invalid(self.name, key, other, "expected an integer")),
        }
    }

    fn optional_u32(&self, key: &'static str) -> Result<Option<u32>, ConfigError> {
        match self.optional_integer(key)? {
            None => Ok(None),
            Some(n) => u32::try_from(n)
                .map(Some)
                .map_err(|_| ConfigError::invalid(self.name, key, n, "expected a non-negative integer")),
        }
    }

    fn positive(&self, key: &'static str, default: usize) -> Result<usize, ConfigError> {
        match self.optional_integer(key)? {
            None => Ok(default),
            Some(n) if n >= 1 => Ok(n as usize),
            Some(n) => Err(ConfigError::invalid(self.name, key, n, format!("{} must be at least 1", key))),
        }
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match self.optional_integer(key)? {
            None => Ok(Duration::from_secs(default)),
            Some(n) if n >= 0 => Ok(Duration::from_secs(n as u64)),
            Some(n) => Err(ConfigError::invalid(self.name, key, n, "expected a non-negative number of seconds")),
        }
    }

    fn optional_float(&self, key: &'static str) -> Result<Option<f64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(toml::Value::Float(f)) => Ok(Some(*f)),
            Some(toml::Value::Integer(n)) => Ok(Some(*n as f64)),
            Some(toml::Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(toml::Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::invalid(self.name, key, s, "expected a number")),
            Some(other) => Err(ConfigError::invalid(self.name, key, other, "expected a number")),
        }
    }

    fn optional_bool(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(toml::Value::Boolean(b)) => Ok(Some(*b)),
            Some(toml::Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "" => Ok(None),
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(ConfigError::invalid(self.name, key, s, "expected true or false")),
            },
            Some(other) => Err(ConfigError::invalid(self.name, key, other, "expected true or false")),
        }
    }

    /// Numbers given either as a TOML array or a comma-separated string
    fn float_list(&self, key: &'static str, expected: usize, format_hint: &str) -> Result<Vec<f64>, ConfigError> {
        let bad = |value: &dyn std::fmt::Display| {
            ConfigError::invalid(
                self.name,
                key,
                value,
                format!("{} must have exactly {} values ({})", key, expected, format_hint),
            )
        };

        let values: Vec<f64> = match self.get(key) {
            None => {
                return Err(ConfigError::Missing {
                    section: self.name,
                    key,
                })
            }
            Some(toml::Value::String(s)) if s.trim().is_empty() => {
                return Err(ConfigError::Missing {
                    section: self.name,
                    key,
                })
            }
            Some(toml::Value::String(s)) => s
                .split(',')
                .map(|part| part.trim().parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| bad(s))?,
            Some(value @ toml::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    toml::Value::Float(f) => Some(*f),
                    toml::Value::Integer(n) => Some(*n as f64),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| bad(value))?,
            Some(other) => return Err(bad(other)),
        };

        if values.len() != expected || values.iter().any(|v| !v.is_finite()) {
            return Err(bad(&format!("{:?}", values)));
        }
        Ok(values)
    }

    fn string_list(&self, key: &'static str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(vec![s.trim().to_string()])),
            Some(value @ toml::Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|s| s.trim().to_string()))
                .collect::<Option<Vec<_>>>()
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(self.name, key, value, "expected a list of strings")),
            Some(other) => Err(ConfigError::invalid(self.name, key, other, "expected a list of strings")),
        }
    }

    /// A single choice, a list of choices, or one of the `all_words`
    fn choice_list<T>(&self, key: &'static str, all_words: &[&str], all: &[T]) -> Result<Vec<T>, ConfigError>
    where
        T: std::str::FromStr<Err = String> + Copy + PartialEq,
    {
        let entries = match self.get(key) {
            Some(toml::Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect::<Vec<_>>(),
            Some(toml::Value::Array(_)) => self.string_list(key)?.unwrap_or_default(),
            None => Vec::new(),
            Some(other) => return Err(ConfigError::invalid(self.name, key, other, "expected a string")),
        };

        let entries: Vec<String> = entries.into_iter().filter(|e| !e.is_empty()).collect();
        if entries.is_empty() || entries.iter().any(|e| all_words.iter().any(|w| e.eq_ignore_ascii_case(w))) {
            return Ok(all.to_vec());
        }

        let mut parsed = Vec::new();
        for entry in &entries {
            let value = entry
                .parse::<T>()
                .map_err(|reason| ConfigError::invalid(self.name, key, entry, reason))?;
            if !parsed.contains(&value) {
                parsed.push(value);
            }
        }
        Ok(parsed)
    }
}
