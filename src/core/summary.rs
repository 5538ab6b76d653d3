use crate::core::batch::BatchReport;
use crate::io::dem::DemStatus;
use crate::io::orbit::OrbitFetchReport;
use std::fmt;

/// End-of-run counts for the download pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub scenes_found: usize,
    pub scenes_downloaded: usize,
    pub scenes_skipped: usize,
    pub scenes_failed: usize,
    pub orbits_found: usize,
    pub orbits_missing: usize,
    pub dem: DemStatus,
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new(scenes_found: usize, batch: &BatchReport, orbits: &OrbitFetchReport, dem: DemStatus) -> Self {
        Self {
            scenes_found,
            scenes_downloaded: batch.downloaded(),
            scenes_skipped: batch.skipped(),
            scenes_failed: batch.failed(),
            orbits_found: orbits.found.len(),
            orbits_missing: orbits.missing.len(),
            dem,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// True when nothing failed outright
    pub fn is_clean(&self) -> bool {
        self.scenes_failed == 0 && self.orbits_missing == 0 && !matches!(self.dem, DemStatus::Failed(_))
    }

    /// Log each line of the summary at info level
    pub fn log(&self) {
        for line in self.to_string().lines() {
            log::info!("{}", line);
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download summary")?;
        writeln!(
            f,
            "  Scenes: {} found, {} downloaded, {} skipped, {} failed",
            self.scenes_found, self.scenes_downloaded, self.scenes_skipped, self.scenes_failed
        )?;
        writeln!(
            f,
            "  Orbit files: {} found, {} missing",
            self.orbits_found, self.orbits_missing
        )?;
        write!(f, "  DEM: {}", self.dem)?;
        if !self.warnings.is_empty() {
            write!(f, "\n  Warnings:")?;
            for warning in &self.warnings {
                write!(f, "\n    - {}", warning)?;
            }
        }
        Ok(())
    }
}
