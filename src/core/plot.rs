//! Temporal distribution plots
//!
//! Each plot is drawn as SVG and rasterised to PNG with resvg.

use crate::core::grouping::SceneGroup;
use crate::types::{FetchError, FetchResult};
use chrono::{Duration, NaiveDate};
use resvg::tiny_skia;
use resvg::usvg::{fontdb, Options, Tree};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Gaps longer than this many days are marked
pub const GAP_THRESHOLD_DAYS: i64 = 12;

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 300.0;
const MARGIN_LEFT: f64 = 50.0;
const MARGIN_RIGHT: f64 = 50.0;
const AXIS_Y: f64 = 170.0;
const TICK_COUNT: i64 = 6;

/// Interval between two consecutive acquisitions longer than the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

impl Gap {
    /// Position of the gap marker, in days after `start`
    pub fn midpoint_offset(&self) -> f64 {
        self.days as f64 / 2.0
    }
}

/// Gaps over [`GAP_THRESHOLD_DAYS`] between consecutive distinct dates
pub fn find_gaps(dates: &[NaiveDate]) -> Vec<Gap> {
    let mut sorted = dates.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
        .windows(2)
        .filter_map(|pair| {
            let days = (pair[1] - pair[0]).num_days();
            (days > GAP_THRESHOLD_DAYS).then_some(Gap {
                start: pair[0],
                end: pair[1],
                days,
            })
        })
        .collect()
}

/// Timeline of acquisition dates for one group
#[derive(Debug, Clone)]
pub struct TemporalPlot {
    pub title: String,
    pub dates: Vec<NaiveDate>,
}

impl TemporalPlot {
    pub fn new(title: impl Into<String>, dates: &[NaiveDate]) -> Self {
        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();
        Self {
            title: title.into(),
            dates,
        }
    }

    pub fn for_group(group: &SceneGroup) -> Self {
        Self::new(
            format!("Temporal Distribution of Images for {}", group.key.label()),
            &group.dates(),
        )
    }

    pub fn gaps(&self) -> Vec<Gap> {
        find_gaps(&self.dates)
    }

    /// Date range on the x axis; a single date is padded by a day on each side
    fn x_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = *self.dates.first()?;
        let last = *self.dates.last()?;
        if first == last {
            Some((first - Duration::days(1), last + Duration::days(1)))
        } else {
            Some((first, last))
        }
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = WIDTH,
            h = HEIGHT
        );
        let _ = write!(svg, r#"<rect width="{}" height="{}" fill="white"/>"#, WIDTH, HEIGHT);
        let _ = write!(
            svg,
            r#"<text x="{}" y="30" font-family="sans-serif" font-size="16" text-anchor="middle">{}</text>"#,
            WIDTH / 2.0,
            escape_xml(&self.title)
        );

        let Some((x_min, x_max)) = self.x_range() else {
            svg.push_str("</svg>");
            return svg;
        };
        let span = (x_max - x_min).num_days().max(1) as f64;
        let plot_width = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let x_of = |days_from_min: f64| MARGIN_LEFT + days_from_min / span * plot_width;
        let x_of_date = |date: NaiveDate| x_of((date - x_min).num_days() as f64);

        // Vertical grid lines and date ticks
        for i in 0..=TICK_COUNT {
            let date = x_min + Duration::days(((span as i64) * i) / TICK_COUNT);
            let x = x_of_date(date);
            let _ = write!(
                svg,
                r##"<line x1="{x:.1}" y1="60" x2="{x:.1}" y2="{bottom}" stroke="#dddddd" stroke-width="1"/>"##,
                x = x,
                bottom = AXIS_Y + 40.0
            );
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{}" font-family="sans-serif" font-size="11" text-anchor="middle">{}</text>"#,
                x,
                AXIS_Y + 60.0,
                date.format("%Y-%m-%d")
            );
        }
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="12" text-anchor="middle">Date</text>"#,
            WIDTH / 2.0,
            AXIS_Y + 90.0
        );

        if self.dates.len() > 1 {
            let _ = write!(
                svg,
                r#"<line x1="{:.1}" y1="{y}" x2="{:.1}" y2="{y}" stroke="black" stroke-width="1.5"/>"#,
                x_of_date(self.dates[0]),
                x_of_date(self.dates[self.dates.len() - 1]),
                y = AXIS_Y
            );
        }

        for date in &self.dates {
            let _ = write!(
                svg,
                r#"<circle cx="{:.1}" cy="{}" r="5" fill="green"/>"#,
                x_of_date(*date),
                AXIS_Y
            );
        }

        let gaps = self.gaps();
        for gap in &gaps {
            let x = x_of((gap.start - x_min).num_days() as f64 + gap.midpoint_offset());
            let _ = write!(svg, r#"<circle cx="{:.1}" cy="{}" r="5" fill="red"/>"#, x, AXIS_Y);
        }

        // Legend
        let legend_x = WIDTH - 230.0;
        let mut entries = vec![("green", "Image Dates".to_string())];
        if !gaps.is_empty() {
            entries.push(("red", format!("Temporal Gaps (>{} days)", GAP_THRESHOLD_DAYS)));
        }
        for (i, (color, label)) in entries.iter().enumerate() {
            let y = 60.0 + i as f64 * 20.0;
            let _ = write!(svg, r#"<circle cx="{}" cy="{}" r="5" fill="{}"/>"#, legend_x, y, color);
            let _ = write!(
                svg,
                r#"<text x="{}" y="{}" font-family="sans-serif" font-size="12">{}</text>"#,
                legend_x + 12.0,
                y + 4.0,
                escape_xml(label)
            );
        }

        svg.push_str("</svg>");
        svg
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// File name of the plot for a group key stem
pub fn plot_file_name(stem: &str) -> String {
    format!("temporal_plot_{}.png", stem)
}

/// Rasterises plots into a directory
pub struct PlotRenderer {
    output_dir: PathBuf,
    fontdb: Arc<fontdb::Database>,
}

impl PlotRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        log::debug!("Loaded {} font faces for plot rendering", db.len());
        if db.is_empty() {
            log::warn!("No system fonts found; plot labels will not be drawn");
        }
        Self {
            output_dir: output_dir.into(),
            fontdb: Arc::new(db),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render a plot to PNG bytes
    pub fn render_png(&self, plot: &TemporalPlot) -> FetchResult<Vec<u8>> {
        let mut options = Options::default();
        options.fontdb = Arc::clone(&self.fontdb);

        let tree = Tree::from_str(&plot.to_svg(), &options)
            .map_err(|e| FetchError::Processing(format!("Failed to parse plot SVG: {}", e)))?;
        let size = tree.size().to_int_size();

        let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| FetchError::Processing("Failed to create pixmap".to_string()))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        pixmap
            .encode_png()
            .map_err(|e| FetchError::Processing(format!("Failed to encode PNG: {}", e)))
    }

    /// Write `temporal_plot_<stem>.png` and return its path
    pub fn save(&self, stem: &str, plot: &TemporalPlot) -> FetchResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(plot_file_name(stem));
        std::fs::write(&path, self.render_png(plot)?)?;
        log::info!("Temporal plot saved: {}", path.display());
        Ok(path)
    }
}
