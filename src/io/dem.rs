use crate::io::archive::{is_gzip_content, is_zip_content, read_entry_from_bytes};
use crate::io::http::{RetryPolicy, Transport};
use crate::types::{BoundingBox, FetchError, FetchResult};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// NASA LP DAAC SRTM archive (Earthdata login required)
pub const USGS_SRTM_BASE_URL: &str = "https://e4ftl01.cr.usgs.gov/MEASURES";

/// AWS terrain tiles mirror of SRTM 1 arc-second data
pub const SKADI_BASE_URL: &str = "https://s3.amazonaws.com/elevation-tiles-prod/skadi";

/// Value written where no tile provides data
pub const DEM_NODATA: f64 = -32768.0;

/// SRTM product resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemResolution {
    /// 1 arc-second, about 30 m (SRTMGL1)
    Arc1,
    /// 3 arc-second, about 90 m (SRTMGL3)
    Arc3,
}

impl DemResolution {
    pub fn product(&self) -> &'static str {
        match self {
            DemResolution::Arc1 => "SRTMGL1",
            DemResolution::Arc3 => "SRTMGL3",
        }
    }

    /// Samples per tile edge
    pub fn samples(&self) -> usize {
        match self {
            DemResolution::Arc1 => 3601,
            DemResolution::Arc3 => 1201,
        }
    }
}

impl std::fmt::Display for DemResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemResolution::Arc1 => write!(f, "30m"),
            DemResolution::Arc3 => write!(f, "90m"),
        }
    }
}

impl std::str::FromStr for DemResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "30m" | "30" | "srtmgl1" => Ok(DemResolution::Arc1),
            "90m" | "90" | "srtmgl3" => Ok(DemResolution::Arc3),
            other => Err(format!("unsupported DEM resolution '{}' (expected 30m or 90m)", other)),
        }
    }
}

/// One 1x1 degree SRTM tile, identified by its south-west corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SrtmTile {
    pub lat: i32,
    pub lon: i32,
}

impl SrtmTile {
    /// SRTM naming convention, e.g. `N35E051`
    pub fn name(&self) -> String {
        let lat_prefix = if self.lat >= 0 { "N" } else { "S" };
        let lon_prefix = if self.lon >= 0 { "E" } else { "W" };
        format!("{}{:02}{}{:03}", lat_prefix, self.lat.abs(), lon_prefix, self.lon.abs())
    }

    /// Parse a tile name such as `N35E051` or `S01W072.hgt`
    pub fn from_name(name: &str) -> FetchResult<Self> {
        let invalid = || FetchError::Dem(format!("Invalid SRTM tile name: {}", name));
        if name.len() < 7 || !name.is_char_boundary(7) {
            return Err(invalid());
        }

        let lat_dir = &name[0..1];
        let lon_dir = &name[3..4];
        let lat: i32 = name[1..3].parse().map_err(|_| invalid())?;
        let lon: i32 = name[4..7].parse().map_err(|_| invalid())?;

        let lat = match lat_dir {
            "N" | "n" => lat,
            "S" | "s" => -lat,
            _ => return Err(invalid()),
        };
        let lon = match lon_dir {
            "E" | "e" => lon,
            "W" | "w" => -lon,
            _ => return Err(invalid()),
        };
        Ok(Self { lat, lon })
    }

    pub fn hgt_name(&self) -> String {
        format!("{}.hgt", self.name())
    }

    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            min_lon: self.lon as f64,
            max_lon: (self.lon + 1) as f64,
            min_lat: self.lat as f64,
            max_lat: (self.lat + 1) as f64,
        }
    }
}

impl std::fmt::Display for SrtmTile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Tiles covering `bbox`: lat in [floor(min_lat), ceil(max_lat)), lon likewise
pub fn tiles_for_bbox(bbox: &BoundingBox) -> Vec<SrtmTile> {
    let min_lat = bbox.min_lat.floor() as i32;
    let max_lat = bbox.max_lat.ceil() as i32;
    let min_lon = bbox.min_lon.floor() as i32;
    let max_lon = bbox.max_lon.ceil() as i32;

    let mut tiles = Vec::new();
    for lat in min_lat..max_lat {
        for lon in min_lon..max_lon {
            tiles.push(SrtmTile { lat, lon });
        }
    }

    log::debug!(
        "Tile ranges: lat {} to {}, lon {} to {} ({} tiles)",
        min_lat,
        max_lat,
        min_lon,
        max_lon,
        tiles.len()
    );
    tiles
}

/// Write a downloaded tile payload (zip, gzip or raw `.hgt`) to `output_path`
pub fn decode_tile_payload(bytes: &[u8], resolution: DemResolution, output_path: &Path) -> FetchResult<()> {
    let hgt = if is_zip_content(bytes) {
        read_entry_from_bytes(bytes, ".hgt")?
    } else if is_gzip_content(bytes) {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| FetchError::Dem(format!("Failed to decompress gzip data: {}", e)))?;
        decompressed
    } else {
        bytes.to_vec()
    };

    let expected = resolution.samples() * resolution.samples() * 2;
    if hgt.len() != expected {
        return Err(FetchError::Dem(format!(
            "Unexpected HGT size {} bytes (expected {} for {})",
            hgt.len(),
            expected,
            resolution.product()
        )));
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, hgt)?;
    Ok(())
}

/// Final state of the DEM stage
#[derive(Debug, Clone, PartialEq)]
pub enum DemStatus {
    Merged { path: PathBuf, tiles: usize },
    AlreadyPresent(PathBuf),
    Disabled,
    Failed(String),
}

impl std::fmt::Display for DemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemStatus::Merged { path, tiles } => write!(f, "merged {} tile(s) into {}", tiles, path.display()),
            DemStatus::AlreadyPresent(path) => write!(f, "skipped, {} already exists", path.display()),
            DemStatus::Disabled => write!(f, "disabled in configuration"),
            DemStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Downloads SRTM tiles and merges them into one GeoTIFF
pub struct DemFetcher<'a, T: Transport> {
    transport: &'a T,
    tile_dir: PathBuf,
    resolution: DemResolution,
    retry: RetryPolicy,
    usgs_base_url: String,
    skadi_base_url: Option<String>,
}

impl<'a, T: Transport> DemFetcher<'a, T> {
    pub fn new(transport: &'a T, tile_dir: impl Into<PathBuf>, resolution: DemResolution, retry: RetryPolicy) -> Self {
        Self {
            transport,
            tile_dir: tile_dir.into(),
            resolution,
            retry,
            usgs_base_url: USGS_SRTM_BASE_URL.to_string(),
            skadi_base_url: Some(SKADI_BASE_URL.to_string()),
        }
    }

    /// Override the archive roots; `None` disables the AWS mirror
    pub fn with_sources(mut self, usgs_base_url: impl Into<String>, skadi_base_url: Option<String>) -> Self {
        self.usgs_base_url = usgs_base_url.into().trim_end_matches('/').to_string();
        self.skadi_base_url = skadi_base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    /// Download URLs for `tile`, in order of preference
    pub fn tile_sources(&self, tile: &SrtmTile) -> Vec<String> {
        let product = self.resolution.product();
        let mut sources = vec![format!(
            "{}/{}.003/2000.02.11/{}.{}.hgt.zip",
            self.usgs_base_url,
            product,
            tile.name(),
            product
        )];

        // The AWS mirror only carries 1 arc-second tiles, grouped by latitude band
        if let (Some(base), DemResolution::Arc1) = (&self.skadi_base_url, self.resolution) {
            let name = tile.name();
            sources.push(format!("{}/{}/{}.hgt.gz", base, &name[0..3], name));
        }
        sources
    }

    /// Download one tile unless its `.hgt` is already present
    pub fn fetch_tile(&self, tile: &SrtmTile) -> FetchResult<PathBuf> {
        let output_path = self.tile_dir.join(tile.hgt_name());
        if output_path.exists() {
            log::info!("Using existing SRTM tile {}", output_path.display());
            return Ok(output_path);
        }

        let sources = self.tile_sources(tile);
        let mut last_error = None;
        for (i, url) in sources.iter().enumerate() {
            log::info!("Attempting download from source {} of {}: {}", i + 1, sources.len(), url);
            let transport = self.transport;
            let result = self
                .retry
                .run(&format!("SRTM tile {}", tile), |_| transport.get(url)?.into_bytes())
                .and_then(|bytes| decode_tile_payload(&bytes, self.resolution, &output_path));

            match result {
                Ok(()) => {
                    log::info!("Downloaded SRTM tile {} from source {}", tile, i + 1);
                    return Ok(output_path);
                }
                Err(e) => {
                    log::warn!("Source {} failed for {}: {}", i + 1, tile, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Dem(format!("No download source for tile {}", tile))))
    }

    /// Download every tile covering `bbox`; tiles that cannot be fetched are skipped
    pub fn fetch_tiles(&self, bbox: &BoundingBox) -> FetchResult<Vec<PathBuf>> {
        let tiles = tiles_for_bbox(bbox);
        log::info!(
            "Fetching {} SRTM {} tile(s) for {}",
            tiles.len(),
            self.resolution,
            bbox
        );

        let mut paths = Vec::new();
        for tile in &tiles {
            match self.fetch_tile(tile) {
                Ok(path) => paths.push(path),
                Err(e) => log::warn!("Skipping tile {}: {}", tile, e),
            }
        }

        if paths.is_empty() {
            return Err(FetchError::Dem(format!(
                "None of the {} SRTM tile(s) for {} could be downloaded",
                tiles.len(),
                bbox
            )));
        }
        Ok(paths)
    }

    /// Fetch all tiles for `bbox` and merge them into `dem_file`
    pub fn fetch_and_merge(&self, bbox: &BoundingBox, dem_file: &Path) -> FetchResult<DemStatus> {
        if dem_file.exists() {
            log::info!("DEM file {} already exists, skipping download", dem_file.display());
            return Ok(DemStatus::AlreadyPresent(dem_file.to_path_buf()));
        }

        let tiles = self.fetch_tiles(bbox)?;
        merge_tiles(&tiles, dem_file)?;
        log::info!("Merged {} tile(s) into {}", tiles.len(), dem_file.display());
        Ok(DemStatus::Merged {
            path: dem_file.to_path_buf(),
            tiles: tiles.len(),
        })
    }
}

/// Placement of one input raster inside the mosaic, in output pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

/// Output grid of a north-up mosaic
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicLayout {
    pub geo_transform: [f64; 6],
    pub width: usize,
    pub height: usize,
    pub placements: Vec<TilePlacement>,
}

impl MosaicLayout {
    /// Plan a mosaic from each input's geotransform and raster size
    pub fn plan(inputs: &[([f64; 6], (usize, usize))]) -> FetchResult<Self> {
        let (first_transform, _) = inputs
            .first()
            .ok_or_else(|| FetchError::Dem("No tiles to merge".to_string()))?;
        let pixel_width = first_transform[1];
        let pixel_height = first_transform[5];

        if pixel_width <= 0.0 || pixel_height >= 0.0 {
            return Err(FetchError::Dem(format!(
                "Unsupported geotransform pixel size ({}, {})",
                pixel_width, pixel_height
            )));
        }

        for (transform, _) in inputs {
            let same_pixel = (transform[1] - pixel_width).abs() < pixel_width * 1e-6
                && (transform[5] - pixel_height).abs() < pixel_height.abs() * 1e-6;
            if !same_pixel || transform[2] != 0.0 || transform[4] != 0.0 {
                return Err(FetchError::Dem(
                    "Tiles differ in resolution or are rotated; cannot merge".to_string(),
                ));
            }
        }

        let origin_x = inputs.iter().map(|(t, _)| t[0]).fold(f64::INFINITY, f64::min);
        let origin_y = inputs.iter().map(|(t, _)| t[3]).fold(f64::NEG_INFINITY, f64::max);

        let mut placements = Vec::with_capacity(inputs.len());
        let mut width = 0;
        let mut height = 0;
        for (transform, (w, h)) in inputs {
            let x_offset = ((transform[0] - origin_x) / pixel_width).round() as usize;
            let y_offset = ((transform[3] - origin_y) / pixel_height).round() as usize;
            width = width.max(x_offset + w);
            height = height.max(y_offset + h);
            placements.push(TilePlacement {
                x_offset,
                y_offset,
                width: *w,
                height: *h,
            });
        }

        Ok(Self {
            geo_transform: [origin_x, pixel_width, 0.0, origin_y, 0.0, pixel_height],
            width,
            height,
            placements,
        })
    }
}

#[cfg(feature = "gdal")]
const NODATA_BLOCK_ROWS: usize = 256;

/// Merge `.hgt` tiles into one Int16 GeoTIFF in EPSG:4326
#[cfg(feature = "gdal")]
pub fn merge_tiles(tiles: &[PathBuf], output: &Path) -> FetchResult<()> {
    use gdal::raster::Buffer;
    use gdal::spatial_ref::SpatialRef;
    use gdal::{Dataset, DriverManager};

    let datasets = tiles
        .iter()
        .map(|path| Dataset::open(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut inputs = Vec::with_capacity(datasets.len());
    for dataset in &datasets {
        inputs.push((dataset.geo_transform()?, dataset.raster_size()));
    }
    let layout = MosaicLayout::plan(&inputs)?;
    log::debug!("Mosaic {}x{} pixels, geotransform {:?}", layout.width, layout.height, layout.geo_transform);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut mosaic =
        driver.create_with_band_type::<i16, _>(output, layout.width as isize, layout.height as isize, 1)?;
    mosaic.set_geo_transform(&layout.geo_transform)?;
    mosaic.set_spatial_ref(&SpatialRef::from_epsg(4326)?)?;

    let mut band = mosaic.rasterband(1)?;
    band.set_no_data_value(Some(DEM_NODATA))?;

    // Initialise the whole mosaic to nodata, a block of rows at a time
    let nodata = DEM_NODATA as i16;
    let mut row = 0;
    while row < layout.height {
        let rows = NODATA_BLOCK_ROWS.min(layout.height - row);
        let block = Buffer::new((layout.width, rows), vec![nodata; layout.width * rows]);
        band.write((0, row as isize), (layout.width, rows), &block)?;
        row += rows;
    }

    for (dataset, placement) in datasets.iter().zip(&layout.placements) {
        let size = (placement.width, placement.height);
        let data = dataset.rasterband(1)?.read_as::<i16>((0, 0), size, size, None)?;
        band.write(
            (placement.x_offset as isize, placement.y_offset as isize),
            size,
            &data,
        )?;
    }

    Ok(())
}

#[cfg(not(feature = "gdal"))]
pub fn merge_tiles(tiles: &[PathBuf], output: &Path) -> FetchResult<()> {
    Err(FetchError::Dem(format!(
        "Cannot merge {} tile(s) into {}: built without the gdal feature",
        tiles.len(),
        output.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_naming() {
        assert_eq!(SrtmTile { lat: 35, lon: 51 }.name(), "N35E051");
        assert_eq!(SrtmTile { lat: -1, lon: -72 }.name(), "S01W072");
        assert_eq!(SrtmTile::from_name("S01W072.hgt").unwrap(), SrtmTile { lat: -1, lon: -72 });
        assert!(SrtmTile::from_name("X35E051").is_err());
    }

    #[test]
    fn test_tiles_for_bbox() {
        let bbox = BoundingBox {
            min_lon: 50.8,
            max_lon: 51.9,
            min_lat: 35.2,
            max_lat: 36.1,
        };
        let names: Vec<String> = tiles_for_bbox(&bbox).iter().map(SrtmTile::name).collect();
        assert_eq!(names, vec!["N35E050", "N35E051", "N36E050", "N36E051"]);
    }

    #[test]
    fn test_integer_bbox_does_not_add_tiles() {
        let bbox = BoundingBox {
            min_lon: 51.0,
            max_lon: 52.0,
            min_lat: 35.0,
            max_lat: 36.0,
        };
        assert_eq!(tiles_for_bbox(&bbox), vec![SrtmTile { lat: 35, lon: 51 }]);
    }

    #[test]
    fn test_mosaic_layout_two_tiles() {
        let px = 1.0 / 3600.0;
        let west = [51.0 - px / 2.0, px, 0.0, 36.0 + px / 2.0, 0.0, -px];
        let east = [52.0 - px / 2.0, px, 0.0, 36.0 + px / 2.0, 0.0, -px];
        let layout = MosaicLayout::plan(&[(west, (3601, 3601)), (east, (3601, 3601))]).unwrap();

        assert_eq!(layout.placements[0].x_offset, 0);
        assert_eq!(layout.placements[1].x_offset, 3600);
        assert_eq!(layout.width, 7201);
        assert_eq!(layout.height, 3601);
    }

    #[test]
    fn test_payload_size_checked() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("N35E051.hgt");
        let html = b"<html>Earthdata Login</html>";
        assert!(decode_tile_payload(html, DemResolution::Arc3, &out).is_err());
        assert!(!out.exists());

        let raw = vec![0u8; 1201 * 1201 * 2];
        decode_tile_payload(&raw, DemResolution::Arc3, &out).unwrap();
        assert!(out.exists());
    }

    #[cfg(feature = "gdal")]
    #[test]
    fn test_merge_diagonal_tiles_fills_nodata() {
        use gdal::Dataset;

        let dir = tempfile::tempdir().unwrap();
        let samples = DemResolution::Arc3.samples();
        // Big-endian elevation of 100 m everywhere
        let hgt: Vec<u8> = std::iter::repeat([0u8, 100u8]).take(samples * samples).flatten().collect();
        let south_west = dir.path().join("N35E051.hgt");
        let north_east = dir.path().join("N36E052.hgt");
        fs::write(&south_west, &hgt).unwrap();
        fs::write(&north_east, &hgt).unwrap();

        let output = dir.path().join("dem").join("dem.tif");
        merge_tiles(&[south_west, north_east], &output).unwrap();

        let dataset = Dataset::open(&output).unwrap();
        let (width, height) = dataset.raster_size();
        assert_eq!((width, height), (2 * samples - 1, 2 * samples - 1));

        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(DEM_NODATA));
        let data = band.read_as::<i16>((0, 0), (width, height), (width, height), None).unwrap().data;
        let at = |x: usize, y: usize| data[y * width + x];

        // North-west and south-east corners have no tile
        assert_eq!(at(0, 0), DEM_NODATA as i16);
        assert_eq!(at(width - 1, height - 1), DEM_NODATA as i16);
        assert_eq!(at(width - 1, 0), 100);
        assert_eq!(at(0, height - 1), 100);
    }

    #[test]
    fn test_tile_sources() {
        struct NoNetwork;
        impl Transport for NoNetwork {
            fn get(&self, url: &str) -> FetchResult<crate::io::http::Download> {
                Err(FetchError::Http {
                    status: 404,
                    url: url.to_string(),
                })
            }
        }

        let fetcher = DemFetcher::new(&NoNetwork, "dem", DemResolution::Arc1, RetryPolicy::default());
        let sources = fetcher.tile_sources(&SrtmTile { lat: 35, lon: 51 });
        assert_eq!(
            sources[0],
            "https://e4ftl01.cr.usgs.gov/MEASURES/SRTMGL1.003/2000.02.11/N35E051.SRTMGL1.hgt.zip"
        );
        assert_eq!(
            sources[1],
            "https://s3.amazonaws.com/elevation-tiles-prod/skadi/N35/N35E051.hgt.gz"
        );

        let coarse = DemFetcher::new(&NoNetwork, "dem", DemResolution::Arc3, RetryPolicy::default());
        assert_eq!(coarse.tile_sources(&SrtmTile { lat: 35, lon: 51 }).len(), 1);
    }
}
