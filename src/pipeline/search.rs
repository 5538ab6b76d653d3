use super::find_scenes;
use crate::config::Config;
use crate::core::grouping::{group_scenes, retain_min_size, write_report, GroupSection, ReportHeader};
use crate::core::plot::{PlotRenderer, TemporalPlot};
use crate::io::http::Transport;
use crate::types::{FetchResult, SceneRecord};
use std::path::PathBuf;

/// Products, groups and files produced by a search run
#[derive(Debug)]
pub struct SearchOutcome {
    pub region_wkt: String,
    pub scenes: Vec<SceneRecord>,
    pub sections: Vec<GroupSection>,
    pub report_path: PathBuf,
    pub plots: Vec<PathBuf>,
}

impl SearchOutcome {
    /// Groups kept across all policies
    pub fn kept_groups(&self) -> usize {
        self.sections.iter().map(|s| s.groups.len()).sum()
    }
}

/// Search, filter by coverage, group, write the report and the plots
pub fn run_search<T: Transport>(config: &Config, transport: &T) -> FetchResult<SearchOutcome> {
    let (_region, region_wkt, scenes) = find_scenes(config, transport)?;
    let min_images = config.general.min_images;

    let sections: Vec<GroupSection> = config
        .processing
        .group_by
        .iter()
        .map(|policy| {
            let groups = group_scenes(&scenes, policy);
            let total_groups = groups.len();
            let kept = retain_min_size(groups, min_images);
            log::info!(
                "Grouping '{}': {} of {} group(s) have at least {} images",
                policy.name(),
                kept.len(),
                total_groups,
                min_images
            );
            GroupSection {
                policy: policy.clone(),
                groups: kept,
                total_groups,
            }
        })
        .collect();

    let header = ReportHeader {
        generated: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        region_wkt: region_wkt.clone(),
        data_source: config.general.data_source.clone(),
        start_date: config.general.start_date,
        end_date: config.general.end_date,
        min_images,
        coverage_percent: config.general.coverage_percent,
    };
    write_report(&config.output.report_file, &header, &sections)?;

    let kept_any = sections.iter().any(|s| !s.groups.is_empty());
    if !kept_any {
        log::warn!(
            "No group has at least {} images; consider lowering min_images or coverage_percent",
            min_images
        );
    }

    let renderer = PlotRenderer::new(&config.output.plot_dir);
    let mut plots = Vec::new();
    for section in &sections {
        for group in &section.groups {
            match renderer.save(&group.key.file_stem(), &TemporalPlot::for_group(group)) {
                Ok(path) => plots.push(path),
                Err(e) => log::error!("Error plotting temporal data for {}: {}", group.key.label(), e),
            }
        }
    }

    if !scenes.is_empty() {
        let dates: Vec<_> = scenes.iter().map(SceneRecord::acquisition_date).collect();
        let overall = TemporalPlot::new("Temporal Distribution of All Images", &dates);
        match renderer.save("all", &overall) {
            Ok(path) => plots.push(path),
            Err(e) => log::error!("Error plotting overall temporal distribution: {}", e),
        }
    }

    log::info!(
        "Search completed: {} product(s), {} group(s) kept, {} plot(s). Results saved in {}",
        scenes.len(),
        sections.iter().map(|s| s.groups.len()).sum::<usize>(),
        plots.len(),
        config.output.report_file.display()
    );

    Ok(SearchOutcome {
        region_wkt,
        scenes,
        sections,
        report_path: config.output.report_file.clone(),
        plots,
    })
}
