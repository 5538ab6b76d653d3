mod common;

use chrono::{TimeZone, Utc};
use common::{MockTransport, Reply};
use sarfetch::core::batch::{BatchDownloader, DownloadOutcome, ManifestEntry, SkipReason};
use sarfetch::io::dem::{tiles_for_bbox, DemResolution, DemStatus, SrtmTile};
use sarfetch::io::orbit::{OrbitFetcher, OrbitType};
use sarfetch::{run_download, BoundingBox, Config, FetchError, FlightDirection, Platform, Polarization, RetryPolicy, SceneRecord};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const RESORB_JAN05: &str = "S1A_OPER_AUX_RESORB_OPOD_20200105T041822_V20200105T002012_20200105T033742.EOF.zip";
const RESORB_JAN17: &str = "S1A_OPER_AUX_RESORB_OPOD_20200117T041257_V20200117T001946_20200117T033716.EOF.zip";

fn listing_html(names: &[&str]) -> String {
    let mut html = String::from("<html><body><pre>\n<a href=\"../\">../</a>\n");
    for name in names {
        html.push_str(&format!("<a href=\"{}\">{}</a>  05-Jan-2020 04:30  1.2M\n", name, name));
    }
    html.push_str("</pre></body></html>");
    html
}

fn orbit_zip(name: &str) -> Vec<u8> {
    let eof = name.trim_end_matches(".zip");
    common::zip_bytes(&[(eof, b"<?xml version=\"1.0\"?><Earth_Explorer_File/>")])
}

fn scene_zip(scene_name: &str) -> Vec<u8> {
    let manifest = format!("{}.SAFE/manifest.safe", scene_name);
    let annotation = format!("{}.SAFE/annotation/s1a-iw1-slc-vv.xml", scene_name);
    common::zip_bytes(&[(manifest.as_str(), b"<manifest/>"), (annotation.as_str(), b"<product/>")])
}

/// Precise orbits are not published yet; restituted ones are listed for January 2020
fn orbit_routes(transport: MockTransport) -> MockTransport {
    transport
        .route(RESORB_JAN05, Reply::Bytes(orbit_zip(RESORB_JAN05)))
        .route(RESORB_JAN17, Reply::Bytes(orbit_zip(RESORB_JAN17)))
        .route("/POEORB/", Reply::Status(404))
        .route("/RESORB/S1A/2020/01/", Reply::Text(listing_html(&[RESORB_JAN05, RESORB_JAN17])))
}

fn scene(id: &str, day: u32) -> SceneRecord {
    SceneRecord {
        file_id: format!("{}-SLC", id),
        scene_name: id.to_string(),
        platform: Platform::Sentinel1A,
        start_time: Utc.with_ymd_and_hms(2020, 1, day, 2, 28, 6).unwrap(),
        footprint: None,
        path: 28,
        frame: 117,
        polarization: Polarization::VvVh,
        flight_direction: FlightDirection::Descending,
        url: format!("https://datapool.asf.alaska.edu/SLC/SA/{}.zip", id),
        size_bytes: None,
        coverage_percent: 100.0,
    }
}

/// Search, orbit and scene routes; DEM tile hosts are unrouted and answer 404
fn download_transport() -> MockTransport {
    orbit_routes(MockTransport::new())
        .route("services/search", Reply::Text(common::tehran_search_response()))
        .route(common::SCENE_JAN05, Reply::Bytes(scene_zip(common::SCENE_JAN05)))
        .route(common::SCENE_JAN17, Reply::Bytes(scene_zip(common::SCENE_JAN17)))
}

#[test]
fn test_retry_policy_counts_attempts() {
    let policy = RetryPolicy::new(3, Duration::ZERO);
    let mut calls = 0;
    let result = policy.run("flaky operation", |_| {
        calls += 1;
        if calls < 3 {
            Err(FetchError::Network {
                url: "https://example.invalid".to_string(),
                message: "timed out".to_string(),
            })
        } else {
            Ok(calls)
        }
    });
    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls, 3);

    let mut permanent_calls = 0;
    let result: Result<(), _> = policy.run("missing resource", |_| {
        permanent_calls += 1;
        Err(FetchError::Http {
            status: 404,
            url: "https://example.invalid".to_string(),
        })
    });
    assert!(result.is_err());
    assert_eq!(permanent_calls, 1);
}

#[test]
fn test_complete_target_makes_no_request() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let target = temp_dir.path().join("product.zip");
    std::fs::write(&target, vec![7u8; 128]).unwrap();

    let entry = ManifestEntry {
        name: "product".to_string(),
        url: "https://datapool.asf.alaska.edu/SLC/SA/product.zip".to_string(),
        target,
        expected_size: Some(128),
        extracted_marker: Some(temp_dir.path().join("product.SAFE")),
    };

    let transport = MockTransport::new();
    let downloader = BatchDownloader::new(&transport, 5, 2, Duration::ZERO, RetryPolicy::new(2, Duration::ZERO));
    assert_eq!(
        downloader.download_one(&entry),
        DownloadOutcome::Skipped(SkipReason::AlreadyDownloaded)
    );
    assert!(transport.requests().is_empty());
}

#[test]
fn test_truncated_target_is_downloaded_again() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let target = temp_dir.path().join("product.zip");
    std::fs::write(&target, vec![7u8; 16]).unwrap();

    let payload = vec![1u8; 64];
    let entry = ManifestEntry {
        name: "product".to_string(),
        url: "https://datapool.asf.alaska.edu/SLC/SA/product.zip".to_string(),
        target: target.clone(),
        expected_size: Some(64),
        extracted_marker: None,
    };

    let transport = MockTransport::new().flaky_route("product.zip", 1, Reply::Bytes(payload.clone()));
    let downloader = BatchDownloader::new(&transport, 5, 2, Duration::ZERO, RetryPolicy::new(3, Duration::ZERO));
    assert_eq!(downloader.download_one(&entry), DownloadOutcome::Downloaded { bytes: 64 });
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(std::fs::read(&target).unwrap(), payload);
}

#[test]
fn test_orbit_falls_back_to_restituted() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let orbit_dir = temp_dir.path().join("orbits");

    let transport = orbit_routes(MockTransport::new());
    let mut fetcher = OrbitFetcher::new(&transport, &orbit_dir, OrbitType::POEORB, RetryPolicy::new(2, Duration::ZERO));

    let found = fetcher
        .fetch_for_scene(&scene(common::SCENE_JAN05, 5))
        .expect("restituted orbit found");
    assert_eq!(found.orbit_type, OrbitType::RESORB);
    assert!(!found.reused);
    assert_eq!(
        found.path.file_name().unwrap().to_string_lossy(),
        RESORB_JAN05.trim_end_matches(".zip")
    );
    assert!(found.path.exists());
    assert!(!orbit_dir.join(RESORB_JAN05).exists(), "zip removed after extraction");

    // The second scene uses the cached listings
    let listings_before = transport.count_matching("/RESORB/S1A/2020/01/") - transport.count_matching(".EOF.zip");
    fetcher.fetch_for_scene(&scene(common::SCENE_JAN17, 17)).expect("second orbit");
    let listings_after = transport.count_matching("/RESORB/S1A/2020/01/") - transport.count_matching(".EOF.zip");
    assert_eq!(listings_before, listings_after);
    assert_eq!(transport.count_matching("/POEORB/"), 1);

    // A fresh fetcher reuses the extracted file without any request
    let quiet = MockTransport::new();
    let mut fetcher = OrbitFetcher::new(&quiet, &orbit_dir, OrbitType::POEORB, RetryPolicy::new(2, Duration::ZERO));
    let reused = fetcher.fetch_for_scene(&scene(common::SCENE_JAN05, 5)).expect("local orbit");
    assert!(reused.reused);
    assert_eq!(reused.path, found.path);
    // The preferred type is listed first, then the local RESORB file is picked up
    assert!(quiet.requests().iter().all(|url| url.contains("/POEORB/")));
}

#[test]
fn test_orbit_missing_is_reported() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let transport = MockTransport::new().route("step.esa.int", Reply::Text(listing_html(&[])));
    let mut fetcher = OrbitFetcher::new(
        &transport,
        temp_dir.path().join("orbits"),
        OrbitType::POEORB,
        RetryPolicy::new(1, Duration::ZERO),
    );

    let report = fetcher.fetch_all(&[scene(common::SCENE_JAN05, 5)]);
    assert!(report.found.is_empty());
    assert_eq!(report.missing, vec![format!("{}-SLC", common::SCENE_JAN05)]);
}

#[test]
fn test_dem_tiles_for_region() {
    let bbox = BoundingBox {
        min_lon: 50.797,
        max_lon: 51.903,
        min_lat: 35.25,
        max_lat: 36.15,
    };
    let names: Vec<String> = tiles_for_bbox(&bbox).iter().map(SrtmTile::name).collect();
    assert_eq!(names, vec!["N35E050", "N35E051", "N36E050", "N36E051"]);

    let south_west = SrtmTile { lat: -1, lon: -72 };
    assert_eq!(south_west.name(), "S01W072");
    assert_eq!(SrtmTile::from_name("S01W072.hgt").unwrap(), south_west);
    assert_eq!(DemResolution::Arc1.samples(), 3601);
    assert_eq!(DemResolution::Arc3.samples(), 1201);
}

#[test]
fn test_download_pipeline_end_to_end() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 2, 80.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = download_transport();
    let summary = run_download(&config, &transport).expect("download succeeds");
    assert_eq!(summary.scenes_found, 2);
    assert_eq!(summary.scenes_downloaded, 2);
    assert_eq!(summary.scenes_failed, 0);
    assert_eq!(summary.orbits_found, 2);
    assert_eq!(summary.orbits_missing, 0);
    assert!(summary.is_clean(), "unexpected warnings: {:?}", summary.warnings);
    // The partially covering scene is never requested
    assert_eq!(transport.count_matching(common::SCENE_JAN11), 0);

    let slc_dir = temp_dir.path().join("slc");
    for id in [common::SCENE_JAN05, common::SCENE_JAN17] {
        assert!(slc_dir.join(format!("{}.SAFE", id)).join("manifest.safe").exists());
        assert!(!slc_dir.join(format!("{}.zip", id)).exists(), "archive removed after extraction");
    }

    let listing = std::fs::read_to_string(slc_dir.join("search_results.txt")).unwrap();
    let lines: Vec<&str> = listing.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(
        lines,
        vec![
            format!("{}.SAFE - 2020-01-05", common::SCENE_JAN05),
            format!("{}.SAFE - 2020-01-17", common::SCENE_JAN17),
        ]
    );

    // A second run finds everything in place
    let transport = download_transport();
    let summary = run_download(&config, &transport).expect("second run succeeds");
    assert_eq!(summary.scenes_skipped, 2);
    assert_eq!(summary.scenes_downloaded, 0);
    assert_eq!(transport.count_matching("datapool.asf.alaska.edu"), 0);
    assert_eq!(transport.count_matching(".EOF.zip"), 0);
}

fn config_with_dem(root: &Path, continue_without_dem: bool) -> Config {
    let text = common::tehran_config(root, 2, 80.0).replace(
        "download_dem = false",
        &format!("download_dem = true\ncontinue_without_dem = {}", continue_without_dem),
    );
    Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config")
}

#[test]
fn test_missing_dem_tiles_are_tolerated() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = config_with_dem(temp_dir.path(), true);

    let transport = download_transport();
    let summary = run_download(&config, &transport).expect("download continues without DEM");
    assert!(matches!(summary.dem, DemStatus::Failed(_)), "dem status {:?}", summary.dem);
    assert!(summary.warnings.iter().any(|w| w.contains("DEM")), "warnings: {:?}", summary.warnings);
    assert!(!summary.is_clean());
    assert_eq!(summary.scenes_downloaded, 2);
    assert!(transport.count_matching("usgs.gov") > 0);
    assert!(!temp_dir.path().join("dem").join("dem.tif").exists());
}

#[test]
fn test_missing_dem_tiles_abort_before_scene_downloads() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = config_with_dem(temp_dir.path(), false);

    let transport = download_transport();
    assert!(matches!(run_download(&config, &transport), Err(FetchError::Dem(_))));
    assert_eq!(transport.count_matching("datapool.asf.alaska.edu"), 0);
}

#[test]
fn test_config_warnings_reach_the_summary() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 2, 80.0).replace(
        "point_buffer = [51.35, 35.70, 50.0]",
        "point_buffer = [51.35, 35.70, 50.0]\nbounding_box = [51.1, 35.5, 51.6, 35.9]",
    );
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");
    assert_eq!(config.warnings.len(), 1);

    let summary = run_download(&config, &download_transport()).expect("download succeeds");
    assert_eq!(summary.warnings.len(), 1, "warnings: {:?}", summary.warnings);
    assert!(summary.warnings[0].contains("bounding_box"));
}

#[test]
fn test_download_pipeline_without_results_fails() {
    init_logging();
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let text = common::tehran_config(temp_dir.path(), 2, 80.0);
    let config = Config::from_toml_str(&text, Path::new("test.toml")).expect("valid config");

    let transport = MockTransport::new().route(
        "services/search",
        Reply::Text(common::feature_collection(Vec::new())),
    );
    assert!(run_download(&config, &transport).is_err());
    assert!(!temp_dir.path().join("slc").join("search_results.txt").exists());
}
