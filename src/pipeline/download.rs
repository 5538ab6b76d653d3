use super::find_scenes;
use crate::config::Config;
use crate::core::batch::{BatchDownloader, ManifestEntry};
use crate::core::summary::RunSummary;
use crate::io::archive::{extract_and_remove, ExtractOutcome};
use crate::io::dem::{DemFetcher, DemStatus};
use crate::io::http::{RetryPolicy, Transport};
use crate::io::orbit::OrbitFetcher;
use crate::types::{FetchError, FetchResult, SceneRecord};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// File listing the selected scenes, written into the output directory
pub const SEARCH_RESULTS_FILE: &str = "search_results.txt";

/// Search, then fetch orbits, the DEM and every selected scene
pub fn run_download<T: Transport>(config: &Config, transport: &T) -> FetchResult<RunSummary> {
    let (region, _wkt, scenes) = find_scenes(config, transport)?;
    let scenes = select_unique_sorted(scenes);

    if scenes.is_empty() {
        return Err(FetchError::Processing(
            "No SLC images found for the configured region, dates and filters".to_string(),
        ));
    }

    let mut warnings = config.warnings.clone();
    if scenes.len() < config.general.min_images {
        let message = format!(
            "Only {} images found, less than min_images={}. Proceeding anyway.",
            scenes.len(),
            config.general.min_images
        );
        log::warn!("{}", message);
        warnings.push(message);
    }

    let listing = write_search_results(&config.output.output_dir, &scenes)?;
    log::info!("Search results written to: {}", listing.display());
    log::info!("List of selected SLC images:");
    for scene in &scenes {
        log::info!("- {} (Sensing: {})", scene.file_id, scene.start_time.format("%Y-%m-%dT%H:%M:%S"));
    }

    let download_retry = RetryPolicy::new(config.processing.download_retries, config.processing.download_retry_delay);

    let mut orbits = OrbitFetcher::new(
        transport,
        &config.output.orbit_dir,
        config.output.prefer_orbit_type,
        download_retry.clone(),
    );
    let orbit_report = orbits.fetch_all(&scenes);
    for file_id in &orbit_report.missing {
        warnings.push(format!("Orbit not found for {}", file_id));
    }

    let dem = if !config.output.download_dem {
        log::info!("DEM download disabled (download_dem = false)");
        DemStatus::Disabled
    } else {
        let fetcher = DemFetcher::new(
            transport,
            config.output.dem_dir(),
            config.output.dem_resolution,
            download_retry.clone(),
        );
        match fetcher.fetch_and_merge(&region.bounding_box(), &config.output.dem_file) {
            Ok(status) => status,
            Err(e) if config.output.continue_without_dem => {
                log::warn!("DEM preparation failed, continuing without DEM: {}", e);
                warnings.push(format!("DEM not available: {}", e));
                DemStatus::Failed(e.to_string())
            }
            Err(e) => {
                log::error!("DEM preparation failed and continue_without_dem is false");
                return Err(e);
            }
        }
    };

    let manifest: Vec<ManifestEntry> = scenes
        .iter()
        .map(|scene| ManifestEntry::from_scene(scene, &config.output.output_dir))
        .collect();
    let downloader = BatchDownloader::new(
        transport,
        config.processing.batch_size,
        config.processing.num_threads,
        config.processing.batch_delay,
        download_retry,
    );
    let batch = downloader.run(&manifest)?;
    for (entry, reason) in batch.failures() {
        warnings.push(format!("Download failed for {}: {}", entry.name, reason));
    }

    for outcome in extract_and_remove(&batch.archives_to_extract()) {
        match outcome {
            ExtractOutcome::Failed { archive, error } => {
                warnings.push(format!("Could not unzip {}: {}", archive.display(), error));
            }
            ExtractOutcome::Missing { archive } => {
                warnings.push(format!("Archive {} disappeared before unzipping", archive.display()));
            }
            ExtractOutcome::Extracted { .. } => {}
        }
    }

    let mut summary = RunSummary::new(scenes.len(), &batch, &orbit_report, dem);
    for warning in warnings {
        summary.warn(warning);
    }
    summary.log();
    Ok(summary)
}

/// One record per file id, ordered by sensing time
pub fn select_unique_sorted(scenes: Vec<SceneRecord>) -> Vec<SceneRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<SceneRecord> = scenes
        .into_iter()
        .filter(|scene| seen.insert(scene.file_id.clone()))
        .collect();
    unique.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.file_id.cmp(&b.file_id)));
    unique
}

/// Write `<output_dir>/search_results.txt`, one `<scene>.SAFE - YYYY-MM-DD` line per scene
pub fn write_search_results(output_dir: &Path, scenes: &[SceneRecord]) -> FetchResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(SEARCH_RESULTS_FILE);

    let mut text = String::new();
    text.push_str("# Format: Each line contains \"filename - date (YYYY-MM-DD)\". Example:\n");
    text.push_str("# S1A_IW_SLC__1SDV_20230101T033123_20230101T033150_046789_059A3F_1234.SAFE - 2023-01-01\n");
    for scene in scenes {
        let _ = writeln!(text, "{} - {}", scene.safe_name(), scene.acquisition_date().format("%Y-%m-%d"));
    }

    std::fs::write(&path, text)?;
    Ok(path)
}
