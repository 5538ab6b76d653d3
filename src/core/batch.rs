use crate::io::http::{stream_to_file, RetryPolicy, Transport};
use crate::types::{FetchError, FetchResult, SceneRecord};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One scene archive to download
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub name: String,
    pub url: String,
    pub target: PathBuf,
    /// Size reported by the catalogue, if any
    pub expected_size: Option<u64>,
    /// Present once the archive has been unpacked
    pub extracted_marker: Option<PathBuf>,
}

impl ManifestEntry {
    /// Scene archive under `output_dir`, marked complete by its `.SAFE` directory
    pub fn from_scene(scene: &SceneRecord, output_dir: &Path) -> Self {
        Self {
            name: scene.file_id.clone(),
            url: scene.url.clone(),
            target: output_dir.join(scene.archive_name()),
            expected_size: scene.size_bytes,
            extracted_marker: Some(output_dir.join(scene.safe_name())),
        }
    }

    /// Why the entry needs no download, if it doesn't
    pub fn completion(&self) -> Option<SkipReason> {
        if let Some(marker) = &self.extracted_marker {
            if marker.exists() {
                return Some(SkipReason::AlreadyExtracted);
            }
        }

        let len = std::fs::metadata(&self.target).ok().filter(|m| m.is_file())?.len();
        let complete = match self.expected_size {
            Some(expected) => len == expected,
            None => len > 0,
        };
        complete.then_some(SkipReason::AlreadyDownloaded)
    }

    pub fn is_complete(&self) -> bool {
        self.completion().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyDownloaded,
    AlreadyExtracted,
}

/// Result of one manifest entry
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Downloaded { bytes: u64 },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ItemResult {
    pub entry: ManifestEntry,
    pub outcome: DownloadOutcome,
}

/// Per-item results of a batch run, in manifest order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<ItemResult>,
}

impl BatchReport {
    fn count(&self, predicate: impl Fn(&DownloadOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Downloaded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DownloadOutcome::Failed(_)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ManifestEntry, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            DownloadOutcome::Failed(reason) => Some((&r.entry, reason.as_str())),
            _ => None,
        })
    }

    /// Zip archives on disk that still need unpacking
    pub fn archives_to_extract(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter(|r| match r.outcome {
                DownloadOutcome::Downloaded { .. } => true,
                DownloadOutcome::Skipped(SkipReason::AlreadyDownloaded) => true,
                _ => false,
            })
            .map(|r| &r.entry.target)
            .filter(|target| target.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip")))
            .cloned()
            .collect()
    }
}

/// Downloads a manifest in fixed-size batches on a bounded worker pool
pub struct BatchDownloader<'a, T: Transport> {
    transport: &'a T,
    batch_size: usize,
    num_threads: usize,
    batch_delay: Duration,
    retry: RetryPolicy,
}

impl<'a, T: Transport> BatchDownloader<'a, T> {
    pub fn new(transport: &'a T, batch_size: usize, num_threads: usize, batch_delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
            num_threads: num_threads.max(1),
            batch_delay,
            retry,
        }
    }

    /// Download every entry; per-item failures are recorded, not raised
    pub fn run(&self, manifest: &[ManifestEntry]) -> FetchResult<BatchReport> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("download-{}", i))
            .build()
            .map_err(|e| FetchError::Processing(format!("Failed to create download pool: {}", e)))?;

        let batches: Vec<&[ManifestEntry]> = manifest.chunks(self.batch_size).collect();
        log::info!(
            "Downloading {} item(s) in {} batch(es) of up to {} with {} worker(s)",
            manifest.len(),
            batches.len(),
            self.batch_size,
            self.num_threads
        );

        let mut report = BatchReport::default();
        for (i, batch) in batches.iter().enumerate() {
            log::info!("Processing batch {}/{} ({} item(s))", i + 1, batches.len(), batch.len());

            let results: Vec<ItemResult> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|entry| ItemResult {
                        entry: entry.clone(),
                        outcome: self.download_one(entry),
                    })
                    .collect()
            });

            let network_used = results
                .iter()
                .any(|r| !matches!(r.outcome, DownloadOutcome::Skipped(_)));
            report.results.extend(results);

            if i + 1 < batches.len() && network_used && !self.batch_delay.is_zero() {
                log::info!("Waiting {}s before next batch", self.batch_delay.as_secs());
                std::thread::sleep(self.batch_delay);
            }
        }

        log::info!(
            "Batch download finished: {} downloaded, {} skipped, {} failed",
            report.downloaded(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Fetch one entry, skipping it without any request when already complete
    pub fn download_one(&self, entry: &ManifestEntry) -> DownloadOutcome {
        if let Some(reason) = entry.completion() {
            log::info!("Skipping {} ({:?})", entry.name, reason);
            return DownloadOutcome::Skipped(reason);
        }

        if entry.url.is_empty() {
            log::error!("No download URL for {}", entry.name);
            return DownloadOutcome::Failed("no download URL".to_string());
        }

        log::info!("Downloading {} from {}", entry.name, entry.url);
        let transport = self.transport;
        let result = self.retry.run(&format!("Download {}", entry.name), |_| {
            let download = transport.get(&entry.url)?;
            let bytes = stream_to_file(download, &entry.target, &entry.name)?;
            match entry.expected_size {
                Some(expected) if expected != bytes => {
                    let _ = std::fs::remove_file(&entry.target);
                    Err(FetchError::Network {
                        url: entry.url.clone(),
                        message: format!("size mismatch: got {} bytes, catalogue lists {}", bytes, expected),
                    })
                }
                _ => Ok(bytes),
            }
        });

        match result {
            Ok(bytes) => {
                log::info!("Downloaded {} ({} bytes)", entry.name, bytes);
                DownloadOutcome::Downloaded { bytes }
            }
            Err(e) => {
                log::error!("Failed to download {}: {}", entry.name, e);
                DownloadOutcome::Failed(e.to_string())
            }
        }
    }
}
