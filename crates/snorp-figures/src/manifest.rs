use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

pub const DEFAULT_SIZE: (u32, u32) = (900, 600);

/// A TOML file listing figures as `[[figure]]` tables.
#[derive(Debug, Clone, Deserialize)]
pub struct FigureManifest {
    #[serde(rename = "figure", default)]
    pub figures: Vec<FigureSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FigureSpec {
    Spectrum(SpectrumFigure),
    Timeline(TimelineFigure),
}

/// Log-log plot of one or more PSD tables.
#[derive(Debug, Clone, Deserialize)]
pub struct SpectrumFigure {
    pub name: String,
    /// `.png` or `.svg`.
    pub output: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_size")]
    pub size: (u32, u32),
    #[serde(default)]
    pub x_range: Option<(f64, f64)>,
    #[serde(default)]
    pub y_range: Option<(f64, f64)>,
    pub series: Vec<SeriesSpec>,
    /// Dashed `c / f` guide.
    #[serde(default)]
    pub reference: Option<ReferenceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub show_theory: bool,
    #[serde(default = "default_scale")]
    pub theory_scale: f64,
    /// Plot every n-th row only.
    #[serde(default = "default_stride")]
    pub stride: usize,
    /// Draw markers instead of a line.
    #[serde(default)]
    pub markers: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReferenceLine {
    pub coefficient: f64,
}

/// Step plot of a short pulse train given by explicit durations.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineFigure {
    pub name: String,
    pub output: PathBuf,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_size")]
    pub size: (u32, u32),
    pub pulses: Vec<f64>,
    /// `gaps[k]` precedes `pulses[k]`.
    pub gaps: Vec<f64>,
    #[serde(default = "default_scale")]
    pub magnitude: f64,
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Length of the dotted continuation after the last pulse.
    #[serde(default)]
    pub tail: f64,
    /// Label every gap and pulse with its symbol.
    #[serde(default = "default_true")]
    pub annotate: bool,
}

fn default_size() -> (u32, u32) {
    DEFAULT_SIZE
}

fn default_scale() -> f64 {
    1.0
}

fn default_stride() -> usize {
    1
}

fn default_dt() -> f64 {
    0.01
}

fn default_true() -> bool {
    true
}

fn check_range(name: &str, range: Option<(f64, f64)>) -> Result<()> {
    if let Some((lo, hi)) = range {
        ensure!(
            lo > 0.0 && hi > lo && hi.is_finite(),
            "{name} must satisfy 0 < min < max on log axes, got ({lo}, {hi})"
        );
    }
    Ok(())
}

impl FigureSpec {
    pub fn name(&self) -> &str {
        match self {
            FigureSpec::Spectrum(fig) => &fig.name,
            FigureSpec::Timeline(fig) => &fig.name,
        }
    }

    pub fn output(&self) -> &Path {
        match self {
            FigureSpec::Spectrum(fig) => &fig.output,
            FigureSpec::Timeline(fig) => &fig.output,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match self {
            FigureSpec::Spectrum(fig) => fig.size,
            FigureSpec::Timeline(fig) => fig.size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (w, h) = self.size();
        ensure!(w > 0 && h > 0, "figure {}: size must be positive", self.name());
        match self {
            FigureSpec::Spectrum(fig) => {
                ensure!(!fig.series.is_empty(), "figure {}: no series", fig.name);
                check_range("x_range", fig.x_range)?;
                check_range("y_range", fig.y_range)?;
                for series in &fig.series {
                    ensure!(
                        series.stride > 0,
                        "figure {}: stride of {} must be > 0",
                        fig.name,
                        series.path.display()
                    );
                    ensure!(
                        series.theory_scale > 0.0,
                        "figure {}: theory_scale must be > 0",
                        fig.name
                    );
                }
                if let Some(reference) = fig.reference {
                    ensure!(
                        reference.coefficient > 0.0,
                        "figure {}: reference coefficient must be > 0",
                        fig.name
                    );
                }
            }
            FigureSpec::Timeline(fig) => {
                ensure!(
                    fig.pulses.len() == fig.gaps.len() && !fig.pulses.is_empty(),
                    "figure {}: need as many gaps as pulses, got {} and {}",
                    fig.name,
                    fig.gaps.len(),
                    fig.pulses.len()
                );
                ensure!(fig.dt > 0.0, "figure {}: dt must be > 0", fig.name);
                ensure!(fig.tail >= 0.0, "figure {}: tail must be >= 0", fig.name);
            }
        }
        Ok(())
    }

    // Relative paths in a manifest are relative to the manifest itself.
    fn resolve_paths(&mut self, base: &Path) {
        match self {
            FigureSpec::Spectrum(fig) => {
                fig.output = base.join(&fig.output);
                for series in &mut fig.series {
                    series.path = base.join(&series.path);
                }
            }
            FigureSpec::Timeline(fig) => fig.output = base.join(&fig.output),
        }
    }
}

impl FigureManifest {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let manifest: FigureManifest = toml::from_str(raw).context("invalid figure manifest")?;
        for figure in &manifest.figures {
            figure.validate()?;
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let mut manifest = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for figure in &mut manifest.figures {
            figure.resolve_paths(base);
        }
        Ok(manifest)
    }

    /// Figures whose names are in `names`; all of them when `names` is empty.
    pub fn select<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a FigureSpec> + 'a {
        self.figures
            .iter()
            .filter(move |fig| names.is_empty() || names.iter().any(|n| n == fig.name()))
    }
}
