//! Figure rendering for SNORP runs.
//!
//! Figures are described in a TOML manifest and drawn with `plotters`:
//! log-log spectra read from PSD tables, and pulse-train timelines.

pub mod manifest;
pub mod render;

pub use manifest::{FigureManifest, FigureSpec, SeriesSpec, SpectrumFigure, TimelineFigure};
pub use render::{load_series, log_bounds, render_figure, ImageFormat, LoadedSeries};
