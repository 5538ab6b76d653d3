use crate::config::ConfigError;
use chrono::{DateTime, NaiveDate, Utc};
use geo::MultiPolygon;
use std::str::FromStr;

/// Geospatial bounding box in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// True when the two boxes share a region of positive area
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.max_lon > other.min_lon
            && self.min_lon < other.max_lon
            && self.max_lat > other.min_lat
            && self.min_lat < other.max_lat
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Polarization modes for Sentinel-1, including the dual-pol combinations
/// reported by the ASF catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
    VvVh,
    HhHv,
}

impl Polarization {
    pub const ALL: [Polarization; 6] = [
        Polarization::VV,
        Polarization::VH,
        Polarization::HH,
        Polarization::HV,
        Polarization::VvVh,
        Polarization::HhHv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Polarization::VV => "VV",
            Polarization::VH => "VH",
            Polarization::HV => "HV",
            Polarization::HH => "HH",
            Polarization::VvVh => "VV+VH",
            Polarization::HhHv => "HH+HV",
        }
    }
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarization {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace(' ', "").as_str() {
            "VV" => Ok(Polarization::VV),
            "VH" => Ok(Polarization::VH),
            "HV" => Ok(Polarization::HV),
            "HH" => Ok(Polarization::HH),
            "VV+VH" | "DV" => Ok(Polarization::VvVh),
            "HH+HV" | "DH" => Ok(Polarization::HhHv),
            other => Err(format!("unknown polarization '{}'", other)),
        }
    }
}

/// Sentinel-1 satellite units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Sentinel1A,
    Sentinel1B,
    Sentinel1C,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Sentinel1A, Platform::Sentinel1B, Platform::Sentinel1C];

    /// Name used by the ASF search API
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Sentinel1A => "Sentinel-1A",
            Platform::Sentinel1B => "Sentinel-1B",
            Platform::Sentinel1C => "Sentinel-1C",
        }
    }

    /// Mission code used in product and orbit file names
    pub fn code(&self) -> &'static str {
        match self {
            Platform::Sentinel1A => "S1A",
            Platform::Sentinel1B => "S1B",
            Platform::Sentinel1C => "S1C",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "SENTINEL1A" | "S1A" => Ok(Platform::Sentinel1A),
            "SENTINEL1B" | "S1B" => Ok(Platform::Sentinel1B),
            "SENTINEL1C" | "S1C" => Ok(Platform::Sentinel1C),
            _ => Err(format!("unknown platform '{}'", s.trim())),
        }
    }
}

/// Satellite flight direction over the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlightDirection {
    Ascending,
    Descending,
}

impl FlightDirection {
    pub const ALL: [FlightDirection; 2] = [FlightDirection::Ascending, FlightDirection::Descending];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightDirection::Ascending => "ASCENDING",
            FlightDirection::Descending => "DESCENDING",
        }
    }
}

impl std::fmt::Display for FlightDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASCENDING" | "ASC" | "A" => Ok(FlightDirection::Ascending),
            "DESCENDING" | "DESC" | "D" => Ok(FlightDirection::Descending),
            other => Err(format!("unknown orbit direction '{}'", other)),
        }
    }
}

/// One candidate SLC product returned by the search API
#[derive(Debug, Clone)]
pub struct SceneRecord {
    pub file_id: String,
    pub scene_name: String,
    pub platform: Platform,
    pub start_time: DateTime<Utc>,
    pub footprint: Option<MultiPolygon<f64>>,
    /// Relative orbit number
    pub path: u32,
    pub frame: u32,
    /// Polarization of the query that produced this record
    pub polarization: Polarization,
    pub flight_direction: FlightDirection,
    pub url: String,
    pub size_bytes: Option<u64>,
    pub coverage_percent: f64,
}

impl SceneRecord {
    pub fn acquisition_date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// Local archive file name, taken from the download URL when possible
    pub fn archive_name(&self) -> String {
        self.url
            .rsplit('/')
            .next()
            .filter(|name| name.ends_with(".zip"))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.zip", self.file_id))
    }

    /// Directory name of the unpacked product
    pub fn safe_name(&self) -> String {
        let base = if self.scene_name.is_empty() {
            self.file_id.trim_end_matches("-SLC")
        } else {
            self.scene_name.as_str()
        };
        format!("{}.SAFE", base)
    }
}

/// Error types for search and download operations
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("DEM error: {0}")]
    Dem(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl FetchError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Io(_) => true,
            FetchError::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            _ => false,
        }
    }

    /// HTTP 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Http { status: 404, .. })
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
