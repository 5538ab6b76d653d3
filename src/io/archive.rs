use crate::types::{FetchError, FetchResult};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Check if content is a ZIP file by examining magic bytes
pub fn is_zip_content(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == [0x50, 0x4B, 0x03, 0x04]
}

/// Check if content is gzip format by examining magic bytes
pub fn is_gzip_content(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1F && bytes[1] == 0x8B
}

/// Extract every entry of `zip_path` under `dest_dir`.
///
/// Entries whose names would escape `dest_dir` are skipped. Returns the
/// distinct top-level paths that were created.
pub fn extract_all(zip_path: &Path, dest_dir: &Path) -> FetchResult<Vec<PathBuf>> {
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(dest_dir)?;

    let mut roots: Vec<PathBuf> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                log::warn!("Skipping unsafe entry '{}' in {}", entry.name(), zip_path.display());
                continue;
            }
        };

        let out_path = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        if let Some(first) = relative.components().next() {
            let root = dest_dir.join(first.as_os_str());
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }

    Ok(roots)
}

/// Copy the first entry whose name ends with `suffix` to `output_path`
pub fn extract_single(zip_path: &Path, suffix: &str, output_path: &Path) -> FetchResult<PathBuf> {
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_file() && entry.name().ends_with(suffix) {
            log::debug!("Extracting {} from {}", entry.name(), zip_path.display());
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(output_path)?;
            std::io::copy(&mut entry, &mut out)?;
            return Ok(output_path.to_path_buf());
        }
    }

    Err(FetchError::Processing(format!(
        "No {} file found in ZIP archive {}",
        suffix,
        zip_path.display()
    )))
}

/// Read the first entry ending with `suffix` from an in-memory archive
pub fn read_entry_from_bytes(zip_bytes: &[u8], suffix: &str) -> FetchResult<Vec<u8>> {
    let mut archive = ZipArchive::new(std::io::Cursor::new(zip_bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_file() && entry.name().to_lowercase().ends_with(suffix) {
            let mut buffer = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buffer)?;
            return Ok(buffer);
        }
    }
    Err(FetchError::Processing(format!("No {} file found in ZIP archive", suffix)))
}

/// Result of unpacking one archive
#[derive(Debug)]
pub enum ExtractOutcome {
    Extracted { archive: PathBuf, roots: Vec<PathBuf> },
    Missing { archive: PathBuf },
    Failed { archive: PathBuf, error: String },
}

/// Unpack each archive next to itself and delete it on success.
///
/// Failures are logged per archive; the remaining archives are still processed.
pub fn extract_and_remove(archives: &[PathBuf]) -> Vec<ExtractOutcome> {
    log::info!("Unzipping {} downloaded archive(s)...", archives.len());
    let mut outcomes = Vec::with_capacity(archives.len());

    for archive in archives {
        if !archive.exists() {
            outcomes.push(ExtractOutcome::Missing {
                archive: archive.clone(),
            });
            continue;
        }

        let dest = archive
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        match extract_all(archive, &dest) {
            Ok(roots) => {
                log::info!("Unzipped: {}", archive.display());
                if let Err(e) = fs::remove_file(archive) {
                    log::warn!("Could not remove {}: {}", archive.display(), e);
                }
                outcomes.push(ExtractOutcome::Extracted {
                    archive: archive.clone(),
                    roots,
                });
            }
            Err(e) => {
                log::error!("Error unzipping {}: {}", archive.display(), e);
                outcomes.push(ExtractOutcome::Failed {
                    archive: archive.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("scene.zip");
        build_zip(
            &archive,
            &[
                ("S1A_TEST.SAFE/manifest.safe", b"<xml/>"),
                ("S1A_TEST.SAFE/measurement/iw1.tiff", b"data"),
            ],
        );

        let outcomes = extract_and_remove(&[archive.clone()]);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            ExtractOutcome::Extracted { roots, .. } => {
                assert_eq!(roots, &vec![dir.path().join("S1A_TEST.SAFE")]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!archive.exists());
        assert!(dir.path().join("S1A_TEST.SAFE/measurement/iw1.tiff").exists());
    }

    #[test]
    fn test_unsafe_entries_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        build_zip(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

        let out = dir.path().join("out");
        let roots = extract_all(&archive, &out).unwrap();
        assert_eq!(roots, vec![out.join("ok.txt")]);
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_magic_bytes() {
        assert!(is_zip_content(&[0x50, 0x4B, 0x03, 0x04, 0x00]));
        assert!(is_gzip_content(&[0x1F, 0x8B, 0x08]));
        assert!(!is_zip_content(b"<html>"));
    }
}
