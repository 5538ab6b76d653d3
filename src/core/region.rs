//! Region of interest geometry
//!
//! A [`Region`] is one dissolved (multi)polygon in lon/lat degrees built from
//! a bounding box, a point buffer, or a vector file.

use crate::config::{RegionSpec, VectorKind};
use crate::types::{BoundingBox, FetchError, FetchResult};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, BoundingRect, ConvexHull, Coord, CoordsIter, LineString, MultiPolygon, Polygon};
use std::path::Path;

/// Kilometres per degree of latitude
pub const KM_PER_DEGREE: f64 = 111.32;

/// Vertices used to approximate a point buffer
pub const BUFFER_VERTICES: usize = 64;

/// Largest vertex count sent to the search API before falling back to the convex hull
pub const MAX_SEARCH_VERTICES: usize = 300;

#[derive(Debug, Clone)]
pub struct Region {
    geometry: MultiPolygon<f64>,
    bbox: BoundingBox,
}

impl Region {
    /// Build the region described by the configuration
    pub fn from_spec(spec: &RegionSpec) -> FetchResult<Self> {
        let region = match spec {
            RegionSpec::BoundingBox {
                lon_min,
                lat_min,
                lon_max,
                lat_max,
            } => Self::from_bounding_box(*lon_min, *lat_min, *lon_max, *lat_max)?,
            RegionSpec::PointBuffer { lon, lat, radius_km } => Self::from_point_buffer(*lon, *lat, *radius_km)?,
            RegionSpec::VectorFile { kind, path } => Self::from_vector_file(*kind, path)?,
        };

        log::info!(
            "Region ({}): bounds {}, area {:.6} deg², {} vertices",
            spec.type_name(),
            region.bbox,
            region.area(),
            region.geometry.coords_count()
        );
        Ok(region)
    }

    pub fn from_bounding_box(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> FetchResult<Self> {
        if !(lon_min < lon_max && lat_min < lat_max) {
            return Err(FetchError::Geometry(format!(
                "Invalid bounding_box [{}, {}, {}, {}]: lon_min must be < lon_max and lat_min < lat_max. \
                 Please correct 'bounding_box' in the [Region] section (format: lon_min, lat_min, lon_max, lat_max).",
                lon_min, lat_min, lon_max, lat_max
            )));
        }
        if lon_min < -180.0 || lon_max > 180.0 || lat_min < -90.0 || lat_max > 90.0 {
            return Err(FetchError::Geometry(format!(
                "bounding_box [{}, {}, {}, {}] is outside lon [-180, 180] / lat [-90, 90]",
                lon_min, lat_min, lon_max, lat_max
            )));
        }

        let exterior = LineString::from(vec![
            (lon_min, lat_min),
            (lon_max, lat_min),
            (lon_max, lat_max),
            (lon_min, lat_max),
            (lon_min, lat_min),
        ]);
        Self::from_geometry(MultiPolygon::new(vec![Polygon::new(exterior, vec![])]))
    }

    /// Circle of `radius_km` around (`lon`, `lat`), with the radius converted
    /// to degrees at that latitude
    pub fn from_point_buffer(lon: f64, lat: f64, radius_km: f64) -> FetchResult<Self> {
        if !(radius_km > 0.0) {
            return Err(FetchError::Geometry(format!(
                "Invalid point_buffer radius {} km; it must be positive. Please correct 'point_buffer' in the [Region] section \
                 (format: center_lon, center_lat, radius_km).",
                radius_km
            )));
        }
        if !(-180.0..=180.0).contains(&lon) || lat.abs() >= 90.0 {
            return Err(FetchError::Geometry(format!(
                "Invalid point_buffer center ({}, {}); expected lon in [-180, 180] and lat in (-90, 90)",
                lon, lat
            )));
        }

        let lat_radius = radius_km / KM_PER_DEGREE;
        let lon_radius = radius_km / (KM_PER_DEGREE * lat.to_radians().cos());

        let mut coords: Vec<Coord<f64>> = (0..BUFFER_VERTICES)
            .map(|i| {
                let angle = 2.0 * std::f64::consts::PI * i as f64 / BUFFER_VERTICES as f64;
                Coord {
                    x: lon + lon_radius * angle.cos(),
                    y: lat + lat_radius * angle.sin(),
                }
            })
            .collect();
        coords.push(coords[0]);

        Self::from_geometry(MultiPolygon::new(vec![Polygon::new(LineString::new(coords), vec![])]))
    }

    /// Dissolve every polygon of every layer of a vector file into one region
    #[cfg(feature = "gdal")]
    pub fn from_vector_file(kind: VectorKind, path: &Path) -> FetchResult<Self> {
        use gdal::vector::LayerAccess;
        use gdal::Dataset;

        if !path.exists() {
            return Err(FetchError::Geometry(format!(
                "{} file {} not found. Please check 'region_folder' and '{}' in the [Region] section.",
                kind.key(),
                path.display(),
                kind.key()
            )));
        }

        let open_path = match kind {
            VectorKind::Kmz => kmz_inner_path(path)?,
            _ => path.display().to_string(),
        };

        let dataset = Dataset::open(&open_path)?;
        let mut polygons: Vec<Polygon<f64>> = Vec::new();
        let mut skipped = 0usize;

        for mut layer in dataset.layers() {
            for feature in layer.features() {
                let Some(geometry) = feature.geometry() else {
                    continue;
                };
                match geometry.to_geo()? {
                    geo::Geometry::Polygon(p) => polygons.push(p),
                    geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                    geo::Geometry::GeometryCollection(collection) => {
                        for item in collection {
                            match item {
                                geo::Geometry::Polygon(p) => polygons.push(p),
                                geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                                _ => skipped += 1,
                            }
                        }
                    }
                    _ => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            log::warn!("Ignored {} non-polygon feature(s) in {}", skipped, path.display());
        }
        if polygons.is_empty() {
            return Err(FetchError::Geometry(format!(
                "{} contains no polygon features",
                path.display()
            )));
        }

        log::info!("Dissolving {} polygon(s) from {}", polygons.len(), path.display());
        Self::from_geometry(dissolve(polygons))
    }

    #[cfg(not(feature = "gdal"))]
    pub fn from_vector_file(kind: VectorKind, path: &Path) -> FetchResult<Self> {
        Err(FetchError::Geometry(format!(
            "Cannot read {} region {}: built without the gdal feature",
            kind.key(),
            path.display()
        )))
    }

    /// Wrap an arbitrary geometry; rings are oriented counter-clockwise
    pub fn from_geometry(geometry: MultiPolygon<f64>) -> FetchResult<Self> {
        let geometry = geometry.orient(Direction::Default);
        let rect = geometry
            .bounding_rect()
            .ok_or_else(|| FetchError::Geometry("Region geometry is empty".to_string()))?;

        if geometry.unsigned_area() <= 0.0 {
            return Err(FetchError::Geometry("Region geometry has zero area".to_string()));
        }

        Ok(Self {
            bbox: BoundingBox {
                min_lon: rect.min().x,
                max_lon: rect.max().x,
                min_lat: rect.min().y,
                max_lat: rect.max().y,
            },
            geometry,
        })
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// Planar area in square degrees
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }

    /// Full WKT of the region
    pub fn to_wkt(&self) -> String {
        if self.geometry.0.len() == 1 {
            format!("POLYGON({})", polygon_body(&self.geometry.0[0]))
        } else {
            let bodies: Vec<String> = self.geometry.0.iter().map(polygon_body).collect();
            format!("MULTIPOLYGON(({}))", bodies.join("),("))
        }
    }

    /// WKT sent as `intersectsWith`: a single simple polygon, or the convex
    /// hull when the region is a multipolygon or too detailed
    pub fn search_wkt(&self) -> String {
        let single_simple = self.geometry.0.len() == 1
            && self.geometry.0[0].interiors().is_empty()
            && self.geometry.coords_count() <= MAX_SEARCH_VERTICES;
        if single_simple {
            return self.to_wkt();
        }

        let hull = self.geometry.convex_hull();
        log::info!(
            "Region has {} vertices in {} polygon(s); searching with its convex hull ({} vertices)",
            self.geometry.coords_count(),
            self.geometry.0.len(),
            hull.exterior().0.len()
        );
        format!("POLYGON({})", polygon_body(&hull))
    }
}

/// Union of all polygons
pub fn dissolve(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, polygon| {
            acc.union(&MultiPolygon::new(vec![polygon]))
        })
}

fn ring_wkt(ring: &LineString<f64>) -> String {
    let points: Vec<String> = ring.0.iter().map(|c| format!("{} {}", c.x, c.y)).collect();
    format!("({})", points.join(", "))
}

fn polygon_body(polygon: &Polygon<f64>) -> String {
    let mut rings = vec![ring_wkt(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_wkt));
    rings.join(", ")
}

/// GDAL path of the first `.kml` inside a KMZ archive
#[cfg(feature = "gdal")]
fn kmz_inner_path(path: &Path) -> FetchResult<String> {
    let file = std::fs::File::open(path)?;
    let archive = zip::ZipArchive::new(std::io::BufReader::new(file))?;
    let entry = archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(".kml"))
        .map(str::to_string)
        .ok_or_else(|| FetchError::Geometry(format!("No .kml document inside {}", path.display())))?;
    Ok(format!("/vsizip/{}/{}", path.display(), entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box_region() {
        let region = Region::from_bounding_box(51.1453, 35.5941, 51.5932, 35.8191).unwrap();
        let bbox = region.bounding_box();
        assert_relative_eq!(bbox.min_lon, 51.1453);
        assert_relative_eq!(bbox.max_lat, 35.8191);
        assert_relative_eq!(region.area(), (51.5932 - 51.1453) * (35.8191 - 35.5941), epsilon = 1e-12);
    }

    #[test]
    fn test_inverted_bounding_box_rejected() {
        assert!(matches!(
            Region::from_bounding_box(51.6, 35.5, 51.1, 35.9),
            Err(FetchError::Geometry(_))
        ));
    }

    #[test]
    fn test_point_buffer_scaled_by_latitude() {
        let region = Region::from_point_buffer(51.35, 35.70, 50.0).unwrap();
        let bbox = region.bounding_box();
        let lat_radius = 50.0 / KM_PER_DEGREE;
        let lon_radius = 50.0 / (KM_PER_DEGREE * 35.70_f64.to_radians().cos());

        assert_relative_eq!(bbox.height() / 2.0, lat_radius, epsilon = 1e-9);
        assert_relative_eq!(bbox.width() / 2.0, lon_radius, epsilon = 1e-9);
        assert_eq!(region.geometry().0[0].exterior().0.len(), BUFFER_VERTICES + 1);
    }

    #[test]
    fn test_wkt_output() {
        let region = Region::from_bounding_box(1.0, 2.0, 3.0, 4.0).unwrap();
        assert_eq!(region.search_wkt(), "POLYGON((1 2, 3 2, 3 4, 1 4, 1 2))");
    }

    #[test]
    fn test_multipolygon_searches_with_hull() {
        let a = Region::from_bounding_box(0.0, 0.0, 1.0, 1.0).unwrap();
        let b = Region::from_bounding_box(2.0, 0.0, 3.0, 1.0).unwrap();
        let merged = dissolve(vec![a.geometry().0[0].clone(), b.geometry().0[0].clone()]);
        let region = Region::from_geometry(merged).unwrap();

        assert_eq!(region.geometry().0.len(), 2);
        assert!(region.to_wkt().starts_with("MULTIPOLYGON"));
        assert!(region.search_wkt().starts_with("POLYGON(("));
        assert_relative_eq!(region.area(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_overlapping_polygons_dissolve() {
        let a = Region::from_bounding_box(0.0, 0.0, 2.0, 2.0).unwrap();
        let b = Region::from_bounding_box(1.0, 1.0, 3.0, 3.0).unwrap();
        let merged = dissolve(vec![a.geometry().0[0].clone(), b.geometry().0[0].clone()]);
        assert_relative_eq!(merged.unsigned_area(), 7.0, epsilon = 1e-9);
    }
}
