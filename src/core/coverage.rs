use crate::core::region::Region;
use crate::types::SceneRecord;
use geo::{Area, BooleanOps, MultiPolygon};

/// Share of `region` covered by `footprint`, in percent, clamped to [0, 100]
pub fn coverage_percent(region: &MultiPolygon<f64>, footprint: &MultiPolygon<f64>) -> f64 {
    let region_area = region.unsigned_area();
    if region_area <= 0.0 {
        return 0.0;
    }
    let intersection = region.intersection(footprint);
    (intersection.unsigned_area() / region_area * 100.0).clamp(0.0, 100.0)
}

/// Drops scenes whose footprint covers less than the threshold of the region
#[derive(Debug, Clone, Copy)]
pub struct CoverageFilter {
    threshold: f64,
}

impl CoverageFilter {
    pub fn new(threshold_percent: f64) -> Self {
        Self {
            threshold: threshold_percent.clamp(0.0, 100.0),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A zero threshold keeps every scene
    pub fn is_disabled(&self) -> bool {
        self.threshold <= 0.0
    }

    /// Compute coverage for one scene; a missing footprint counts as full coverage
    pub fn coverage_of(&self, region: &Region, scene: &SceneRecord) -> f64 {
        match &scene.footprint {
            Some(footprint) => coverage_percent(region.geometry(), footprint),
            None => {
                log::debug!("No footprint for {}, assuming full coverage", scene.file_id);
                100.0
            }
        }
    }

    /// Annotate every scene with its coverage and keep those at or above the threshold
    pub fn apply(&self, region: &Region, scenes: Vec<SceneRecord>) -> Vec<SceneRecord> {
        let total = scenes.len();
        let kept: Vec<SceneRecord> = scenes
            .into_iter()
            .filter_map(|mut scene| {
                scene.coverage_percent = self.coverage_of(region, &scene);
                if self.is_disabled() || scene.coverage_percent >= self.threshold {
                    Some(scene)
                } else {
                    log::debug!(
                        "Skipping product {} due to coverage {:.2}% < {}%",
                        scene.file_id,
                        scene.coverage_percent,
                        self.threshold
                    );
                    None
                }
            })
            .collect();

        log::info!(
            "Coverage filter (>= {}%): kept {} of {} product(s)",
            self.threshold,
            kept.len(),
            total
        );
        kept
    }
}
