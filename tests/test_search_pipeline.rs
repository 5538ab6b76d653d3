mod common;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use common::{MockTransport, Reply};
use geo::{MultiPolygon, Polygon};
use sarfetch::core::coverage::coverage_percent;
use sarfetch::core::grouping::{group_scenes, GroupingPolicy};
use sarfetch::{run_search, Config, FlightDirection, Platform, Polarization, Region, SceneRecord};
use std::path::Path;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn rectangle(lon_min: f64, lat_min: f64, lon_max: f64, lat_max: f64) -> MultiPolygon<f64> {
    let ring = common::rectangle(lon_min, lat_min, lon_max, lat_max);
    MultiPolygon::new(vec![Polygon::new(ring.into(), vec![])])
}

#[test]
fn test_search_keeps_only_covering_footprints() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 2, 80.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = MockTransport::new().route("services/search", Reply::Text(common::tehran_search_response()));
    let outcome = run_search(&config, &transport).expect("search succeeds");

    let ids: Vec<&str> = outcome.scenes.iter().map(|s| s.file_id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&format!("{}-SLC", common::SCENE_JAN05).as_str()));
    assert!(ids.contains(&format!("{}-SLC", common::SCENE_JAN17).as_str()));
    for scene in &outcome.scenes {
        assert!(scene.coverage_percent >= 80.0);
        assert!(scene.coverage_percent <= 100.0);
    }

    // One chunk, one polarization, one direction, one platform
    assert_eq!(transport.count_matching("services/search"), 1);
    let url = &transport.requests()[0];
    assert!(url.contains("processingLevel=SLC"));
    assert!(url.contains("output=geojson"));
    assert!(url.contains("intersectsWith=POLYGON"));

    let report = std::fs::read_to_string(&outcome.report_path).expect("report written");
    assert!(report.contains("Groups >= 2 images only, Coverage >= 80%"));
    assert!(report.contains("Number of Images: 2"));
    assert!(!report.contains(common::SCENE_JAN11));

    assert_eq!(outcome.kept_groups(), 2);
    for plot in &outcome.plots {
        let bytes = std::fs::read(plot).expect("plot written");
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}

#[test]
fn test_search_with_coverage_disabled_keeps_everything() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 5, 0.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = MockTransport::new().route("services/search", Reply::Text(common::tehran_search_response()));
    let outcome = run_search(&config, &transport).expect("search succeeds");

    assert_eq!(outcome.scenes.len(), 3);
    // Only three images, so no group reaches min_images=5
    assert_eq!(outcome.kept_groups(), 0);
    let report = std::fs::read_to_string(&outcome.report_path).unwrap();
    assert!(report.contains("no group has at least 5 images"));
}

#[test]
fn test_search_retries_then_fails() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 1, 80.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = MockTransport::new().flaky_route(
        "services/search",
        10,
        Reply::Text(common::tehran_search_response()),
    );
    assert!(run_search(&config, &transport).is_err());
    assert_eq!(transport.count_matching("services/search"), 3);
}

#[test]
fn test_search_recovers_from_transient_failures() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 1, 80.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = MockTransport::new().flaky_route(
        "services/search",
        2,
        Reply::Text(common::tehran_search_response()),
    );
    let outcome = run_search(&config, &transport).expect("third attempt succeeds");
    assert_eq!(outcome.scenes.len(), 2);
    assert_eq!(transport.count_matching("services/search"), 3);
}

#[test]
fn test_bounding_box_region() {
    let region = Region::from_bounding_box(51.1453, 35.5941, 51.5932, 35.8191).expect("valid bbox");
    assert!(region.area() > 0.0);

    let bbox = region.bounding_box();
    assert_relative_eq!(bbox.min_lon, 51.1453, epsilon = 1e-12);
    assert_relative_eq!(bbox.min_lat, 35.5941, epsilon = 1e-12);
    assert_relative_eq!(bbox.max_lon, 51.5932, epsilon = 1e-12);
    assert_relative_eq!(bbox.max_lat, 35.8191, epsilon = 1e-12);

    assert!(Region::from_bounding_box(51.5, 35.5, 51.0, 35.8).is_err());
}

#[test]
fn test_coverage_shrinks_with_footprint() {
    let region = Region::from_point_buffer(51.35, 35.70, 50.0).expect("valid buffer");
    let bbox = region.bounding_box();

    let mut previous = f64::INFINITY;
    for step in 0..=10 {
        let shrink = bbox.width() * step as f64 / 10.0;
        let footprint = rectangle(bbox.min_lon - 0.5 + shrink, bbox.min_lat - 0.5, bbox.max_lon + 0.5, bbox.max_lat + 0.5);
        let coverage = coverage_percent(region.geometry(), &footprint);
        assert!((0.0..=100.0).contains(&coverage), "coverage {} out of range", coverage);
        assert!(coverage <= previous + 1e-9, "coverage grew from {} to {}", previous, coverage);
        previous = coverage;
    }
    assert_relative_eq!(
        coverage_percent(region.geometry(), &rectangle(40.0, 30.0, 60.0, 40.0)),
        100.0,
        epsilon = 1e-6
    );
    assert_eq!(coverage_percent(region.geometry(), &rectangle(10.0, 10.0, 11.0, 11.0)), 0.0);
}

fn scene(index: u32) -> SceneRecord {
    let platform = if index % 2 == 0 { Platform::Sentinel1A } else { Platform::Sentinel1B };
    let direction = if index % 3 == 0 { FlightDirection::Ascending } else { FlightDirection::Descending };
    SceneRecord {
        file_id: format!("scene-{}", index),
        scene_name: String::new(),
        platform,
        start_time: Utc.with_ymd_and_hms(2020, 1, 1 + index % 28, 2, 28, 6).unwrap(),
        footprint: None,
        path: 28 + index % 4,
        frame: 117 + index % 2,
        polarization: if index % 5 == 0 { Polarization::VV } else { Polarization::VvVh },
        flight_direction: direction,
        url: String::new(),
        size_bytes: None,
        coverage_percent: 100.0,
    }
}

#[test]
fn test_grouping_is_a_partition() {
    let scenes: Vec<SceneRecord> = (0..40).map(scene).collect();

    for policy in [
        GroupingPolicy::full(),
        GroupingPolicy::simple(),
        GroupingPolicy::parse("platform,path").unwrap(),
    ] {
        let groups = group_scenes(&scenes, &policy);
        let total: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, scenes.len(), "policy {}", policy.name());

        let mut ids: Vec<&str> = groups
            .iter()
            .flat_map(|g| g.scenes.iter().map(|s| s.file_id.as_str()))
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), scenes.len());

        for group in &groups {
            for s in &group.scenes {
                assert_eq!(policy.key_of(s), group.key);
            }
        }
    }
}
