//! Renderer collaborator and chart data.
//!
//! A [`Chart`] carries everything a plotting tool needs: title, axis labels,
//! scale, output file name and one or more overlaid series. The renderers in
//! this module persist that data as CSV or JSON under an output directory;
//! drawing is left to whatever tool reads those files.
//!
//! Rendering only ever borrows the chart, so a failed render leaves the
//! sweep series it was built from untouched.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chsh::TSIRELSON_BOUND;
use crate::error::{ChshError, Result};
use crate::sweep::SweepSeries;

/// Line colours used when a series does not name one.
pub const DEFAULT_COLORS: [&str; 15] = [
    "red",
    "gold",
    "limegreen",
    "dodgerblue",
    "purple",
    "darkorange",
    "teal",
    "mediumblue",
    "crimson",
    "forestgreen",
    "slategray",
    "magenta",
    "olive",
    "steelblue",
    "indianred",
];

/// Line styles used when a series does not name one.
pub const DEFAULT_LINE_STYLES: [&str; 10] = [
    "solid",
    "dashed",
    "dashdot",
    "dotted",
    "densely_dotted",
    "loosely_dashed",
    "medium_dash",
    "spaced_dashdot",
    "tight_dash",
    "dash_dot_dash",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    #[default]
    Linear,
    Log,
}

/// On-disk format of rendered chart data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartFormat {
    #[default]
    Csv,
    Json,
}

impl ChartFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for ChartFormat {
    type Err = ChshError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ChshError::InvalidConfig(format!(
                "unknown chart format '{other}' (expected csv or json)"
            ))),
        }
    }
}

/// One overlaid line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub color: Option<String>,
    pub line_style: Option<String>,
}

impl ChartSeries {
    pub fn new(label: impl Into<String>, x: Vec<f64>, y: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            x,
            y,
            color: None,
            line_style: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_line_style(mut self, style: impl Into<String>) -> Self {
        self.line_style = Some(style.into());
        self
    }
}

/// Chart metadata plus its series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub scale: Scale,
    /// Output file stem; the renderer adds the extension.
    pub file_name: String,
    pub series: Vec<ChartSeries>,
}

impl Chart {
    pub fn new(title: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: "x".into(),
            y_label: "y".into(),
            scale: Scale::Linear,
            file_name: file_name.into(),
            series: Vec::new(),
        }
    }

    pub fn with_axes(mut self, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        self.x_label = x_label.into();
        self.y_label = y_label.into();
        self
    }

    pub fn with_scale(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_series(mut self, series: ChartSeries) -> Self {
        self.series.push(series);
        self
    }

    /// Measured S against sample size, overlaid with the constant 2√2 line.
    pub fn convergence(series: &SweepSeries, label: impl Into<String>) -> Self {
        let x: Vec<f64> = series.entries().iter().map(|e| e.sample_size as f64).collect();
        let y: Vec<f64> = series.entries().iter().map(|e| e.s).collect();
        let bound = vec![TSIRELSON_BOUND; x.len()];

        Self::new("S convergence", "convergence")
            .with_axes("Sample size", "S")
            .with_scale(Scale::Log)
            .with_series(
                ChartSeries::new(label, x.clone(), y)
                    .with_color("red")
                    .with_line_style("dashed"),
            )
            .with_series(
                ChartSeries::new("2√2", x, bound)
                    .with_color("black")
                    .with_line_style("solid"),
            )
    }

    /// Check series lengths and the output name.
    pub fn validate(&self) -> Result<()> {
        if self.file_name.is_empty()
            || self.file_name.contains(['/', '\\'])
            || self.file_name == ".."
        {
            return Err(ChshError::InvalidConfig(format!(
                "invalid chart file name '{}'",
                self.file_name
            )));
        }
        for s in &self.series {
            if s.x.len() != s.y.len() {
                return Err(ChshError::InvalidConfig(format!(
                    "series '{}' has {} x values and {} y values",
                    s.label,
                    s.x.len(),
                    s.y.len()
                )));
            }
        }
        Ok(())
    }

    /// Colour and line style per series, falling back to the default palettes.
    pub fn resolved_styles(&self) -> Vec<(String, String)> {
        self.series
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let color = s
                    .color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_COLORS[i % DEFAULT_COLORS.len()].to_string());
                let style = s.line_style.clone().unwrap_or_else(|| {
                    DEFAULT_LINE_STYLES[i % DEFAULT_LINE_STYLES.len()].to_string()
                });
                (color, style)
            })
            .collect()
    }

    /// Copy with every colour and line style filled in.
    fn resolved(&self) -> Chart {
        let mut chart = self.clone();
        for (s, (color, style)) in chart.series.iter_mut().zip(self.resolved_styles()) {
            s.color = Some(color);
            s.line_style = Some(style);
        }
        chart
    }
}

/// Persists a chart somewhere and returns where.
pub trait Renderer {
    fn name(&self) -> &str;
    fn render(&self, chart: &Chart) -> Result<PathBuf>;
}

fn prepare(out_dir: &Path, chart: &Chart, ext: &str) -> Result<PathBuf> {
    chart.validate()?;
    fs::create_dir_all(out_dir)?;
    Ok(out_dir.join(format!("{}.{ext}", chart.file_name)))
}

/// Long-format CSV: one row per point, prefixed by `#` metadata lines.
pub struct CsvRenderer {
    out_dir: PathBuf,
}

impl CsvRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Renderer for CsvRenderer {
    fn name(&self) -> &str {
        "csv"
    }

    fn render(&self, chart: &Chart) -> Result<PathBuf> {
        let path = prepare(&self.out_dir, chart, "csv")?;
        let mut w = BufWriter::new(File::create(&path)?);

        writeln!(w, "# title: {}", chart.title)?;
        writeln!(w, "# x_label: {}", chart.x_label)?;
        writeln!(w, "# y_label: {}", chart.y_label)?;
        writeln!(w, "# scale: {}", if chart.scale == Scale::Log { "log" } else { "linear" })?;
        writeln!(w, "series,color,line_style,x,y")?;
        for (s, (color, style)) in chart.series.iter().zip(chart.resolved_styles()) {
            let label = csv_field(&s.label);
            for (x, y) in s.x.iter().zip(&s.y) {
                writeln!(w, "{label},{color},{style},{x},{y}")?;
            }
        }
        w.flush()?;
        log::info!("wrote chart data to {}", path.display());
        Ok(path)
    }
}

/// The resolved chart as pretty-printed JSON.
pub struct JsonRenderer {
    out_dir: PathBuf,
}

impl JsonRenderer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Renderer for JsonRenderer {
    fn name(&self) -> &str {
        "json"
    }

    fn render(&self, chart: &Chart) -> Result<PathBuf> {
        let path = prepare(&self.out_dir, chart, "json")?;
        let json = serde_json::to_string_pretty(&chart.resolved())?;
        fs::write(&path, json)?;
        log::info!("wrote chart data to {}", path.display());
        Ok(path)
    }
}

/// Renderer for `format` writing into `out_dir`.
pub fn renderer_for(format: ChartFormat, out_dir: impl Into<PathBuf>) -> Box<dyn Renderer> {
    match format {
        ChartFormat::Csv => Box::new(CsvRenderer::new(out_dir)),
        ChartFormat::Json => Box::new(JsonRenderer::new(out_dir)),
    }
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
