use crate::types::{FetchResult, SceneRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Scene attribute a group key can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupField {
    Polarization,
    Orbit,
    Platform,
    Path,
    Frame,
}

impl GroupField {
    pub const ALL: [GroupField; 5] = [
        GroupField::Polarization,
        GroupField::Orbit,
        GroupField::Platform,
        GroupField::Path,
        GroupField::Frame,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            GroupField::Polarization => "Polarization",
            GroupField::Orbit => "Orbit",
            GroupField::Platform => "Platform",
            GroupField::Path => "Path",
            GroupField::Frame => "Frame",
        }
    }

    /// Short tag used in plot file names
    pub fn tag(&self) -> &'static str {
        match self {
            GroupField::Polarization => "POL",
            GroupField::Orbit => "ORB",
            GroupField::Platform => "PL",
            GroupField::Path => "PATH",
            GroupField::Frame => "FR",
        }
    }

    pub fn value_of(&self, scene: &SceneRecord) -> String {
        match self {
            GroupField::Polarization => scene.polarization.to_string(),
            GroupField::Orbit => scene.flight_direction.to_string(),
            GroupField::Platform => scene.platform.to_string(),
            GroupField::Path => scene.path.to_string(),
            GroupField::Frame => scene.frame.to_string(),
        }
    }
}

impl std::str::FromStr for GroupField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "polarization" | "pol" => Ok(GroupField::Polarization),
            "orbit" | "orbit_direction" | "direction" => Ok(GroupField::Orbit),
            "platform" => Ok(GroupField::Platform),
            "path" | "relative_orbit" => Ok(GroupField::Path),
            "frame" => Ok(GroupField::Frame),
            other => Err(format!(
                "unknown group field '{}' (expected polarization, orbit, platform, path or frame)",
                other
            )),
        }
    }
}

/// Ordered list of fields that make up a group key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingPolicy {
    name: String,
    fields: Vec<GroupField>,
}

impl GroupingPolicy {
    pub fn new(name: impl Into<String>, fields: Vec<GroupField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Polarization, orbit, platform, path, frame
    pub fn full() -> Self {
        Self::new("full", GroupField::ALL.to_vec())
    }

    /// Polarization, orbit, path
    pub fn simple() -> Self {
        Self::new(
            "simple",
            vec![GroupField::Polarization, GroupField::Orbit, GroupField::Path],
        )
    }

    /// A preset name or a comma-separated field list
    pub fn parse(spec: &str) -> Result<Self, String> {
        match spec.trim().to_lowercase().as_str() {
            "full" | "detailed" => return Ok(Self::full()),
            "simple" => return Ok(Self::simple()),
            "" => return Err("empty grouping".to_string()),
            _ => {}
        }

        let mut fields = Vec::new();
        for part in spec.split(',') {
            let field: GroupField = part.parse()?;
            if fields.contains(&field) {
                return Err(format!("field '{}' listed twice", part.trim()));
            }
            fields.push(field);
        }
        let name = fields
            .iter()
            .map(|f| f.label().to_lowercase())
            .collect::<Vec<_>>()
            .join("+");
        Ok(Self::new(name, fields))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[GroupField] {
        &self.fields
    }

    /// Fields not part of the key, shown per image in the report
    pub fn other_fields(&self) -> Vec<GroupField> {
        GroupField::ALL
            .iter()
            .copied()
            .filter(|f| !self.fields.contains(f))
            .collect()
    }

    pub fn key_of(&self, scene: &SceneRecord) -> GroupKey {
        GroupKey(self.fields.iter().map(|f| (*f, f.value_of(scene))).collect())
    }
}

/// Composite group key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<(GroupField, String)>);

impl GroupKey {
    /// e.g. `Polarization: VV, Orbit: ASCENDING, Path: 28`
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(|(field, value)| format!("{}: {}", field.label(), value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// e.g. `POL_VV_ORB_ASCENDING_PATH_28`
    pub fn file_stem(&self) -> String {
        self.0
            .iter()
            .map(|(field, value)| format!("{}_{}", field.tag(), value))
            .collect::<Vec<_>>()
            .join("_")
            .replace(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '-'), "_")
    }
}

/// Scenes that share one key
#[derive(Debug, Clone)]
pub struct SceneGroup {
    pub key: GroupKey,
    pub scenes: Vec<SceneRecord>,
}

impl SceneGroup {
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Sorted distinct acquisition dates
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.scenes.iter().map(SceneRecord::acquisition_date).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

/// Partition `scenes` by `policy`; groups come back ordered by key
pub fn group_scenes(scenes: &[SceneRecord], policy: &GroupingPolicy) -> Vec<SceneGroup> {
    let mut buckets: BTreeMap<GroupKey, Vec<SceneRecord>> = BTreeMap::new();
    for scene in scenes {
        buckets.entry(policy.key_of(scene)).or_default().push(scene.clone());
    }
    buckets
        .into_iter()
        .map(|(key, scenes)| SceneGroup { key, scenes })
        .collect()
}

/// Keep groups with at least `min_images` scenes
pub fn retain_min_size(groups: Vec<SceneGroup>, min_images: usize) -> Vec<SceneGroup> {
    groups.into_iter().filter(|g| g.len() >= min_images).collect()
}

/// Groups of one policy that passed the size filter
#[derive(Debug, Clone)]
pub struct GroupSection {
    pub policy: GroupingPolicy,
    pub groups: Vec<SceneGroup>,
    /// Groups before the size filter
    pub total_groups: usize,
}

/// Header information for the text report
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub generated: String,
    pub region_wkt: String,
    pub data_source: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub min_images: usize,
    pub coverage_percent: f64,
}

/// Render the grouped search report
pub fn render_report(header: &ReportHeader, sections: &[GroupSection]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Sentinel-1 SLC Search Results ASF (Groups >= {} images only, Coverage >= {}%)",
        header.min_images, header.coverage_percent
    );
    let _ = writeln!(out, "Date: {}", header.generated);
    let _ = writeln!(out, "Region: {}", header.region_wkt);
    let _ = writeln!(out, "Data Source: {}", header.data_source);
    let _ = writeln!(out, "Date Range: {} to {}", header.start_date, header.end_date);
    out.push('\n');

    for section in sections {
        let fields: Vec<&str> = section.policy.fields().iter().map(GroupField::label).collect();
        let _ = writeln!(
            out,
            "Groups by {} ({}): {} of {} group(s) kept",
            section.policy.name(),
            fields.join(", "),
            section.groups.len(),
            section.total_groups
        );

        if section.groups.is_empty() {
            let _ = writeln!(out, "  (no group has at least {} images)", header.min_images);
        }

        let others = section.policy.other_fields();
        for group in &section.groups {
            let dates: Vec<String> = group.dates().iter().map(|d| d.to_string()).collect();
            let _ = writeln!(out, "{}", group.key.label());
            let _ = writeln!(out, "Number of Images: {}", group.len());
            let _ = writeln!(out, "Dates: {}", dates.join(", "));
            let _ = writeln!(out, "Images:");
            for scene in &group.scenes {
                let extra = if others.is_empty() {
                    String::new()
                } else {
                    let parts: Vec<String> = others
                        .iter()
                        .map(|f| format!("{}: {}", f.label(), f.value_of(scene)))
                        .collect();
                    format!(" [{}]", parts.join(", "))
                };
                let _ = writeln!(
                    out,
                    "  - {} ({}){} Coverage: {:.2}%",
                    scene.file_id,
                    scene.acquisition_date(),
                    extra,
                    scene.coverage_percent
                );
            }
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

pub fn write_report(path: &Path, header: &ReportHeader, sections: &[GroupSection]) -> FetchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_report(header, sections))?;
    log::info!("Search report written to {}", path.display());
    Ok(())
}
