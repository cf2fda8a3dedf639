use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use tracing::{info, warn};

use snorp::output::read_psd_csv;
use snorp::Sequence;

use crate::manifest::{FigureSpec, SeriesSpec, SpectrumFigure, TimelineFigure};

const PALETTE: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Svg,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => Ok(ImageFormat::Png),
            Some("svg") => Ok(ImageFormat::Svg),
            _ => bail!(
                "unsupported figure format for {}; use .png or .svg",
                path.display()
            ),
        }
    }
}

/// One PSD table converted back from log10, ready to plot.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedSeries {
    pub label: String,
    pub psd: Vec<(f64, f64)>,
    /// Scaled theoretical curve, when requested and present in the table.
    pub theory: Option<Vec<(f64, f64)>>,
}

pub fn load_series(spec: &SeriesSpec) -> Result<LoadedSeries> {
    let rows = read_psd_csv(&spec.path)
        .with_context(|| format!("failed to read PSD table {}", spec.path.display()))?;

    let mut psd = Vec::new();
    let mut theory = Vec::new();
    for row in rows.iter().step_by(spec.stride) {
        let f = 10f64.powf(row.log10_freq);
        let s = 10f64.powf(row.log10_psd);
        if f.is_finite() && s.is_finite() && s > 0.0 {
            psd.push((f, s));
        }
    }
    if spec.show_theory {
        for row in &rows {
            let f = 10f64.powf(row.log10_freq);
            let t = spec.theory_scale * 10f64.powf(row.log10_theory);
            if f.is_finite() && t.is_finite() && t > 0.0 {
                theory.push((f, t));
            }
        }
        if theory.is_empty() {
            warn!(path = %spec.path.display(), "table has no theoretical column values");
        }
    }

    let label = spec.label.clone().unwrap_or_else(|| {
        spec.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok(LoadedSeries {
        label,
        psd,
        theory: (!theory.is_empty()).then_some(theory),
    })
}

/// Decade-aligned bounds enclosing the positive values of `values`.
pub fn log_bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(hi > 0.0) {
        return None;
    }
    let lo = 10f64.powf(lo.log10().floor());
    let mut hi = 10f64.powf(hi.log10().ceil());
    if hi <= lo {
        hi = lo * 10.0;
    }
    Some((lo, hi))
}

pub fn render_figure(spec: &FigureSpec) -> Result<()> {
    let path = spec.output();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let format = ImageFormat::from_path(path)?;
    let size = spec.size();

    let drawn = match (spec, format) {
        (FigureSpec::Spectrum(fig), ImageFormat::Png) => {
            draw_spectrum(BitMapBackend::new(path, size).into_drawing_area(), fig)
        }
        (FigureSpec::Spectrum(fig), ImageFormat::Svg) => {
            draw_spectrum(SVGBackend::new(path, size).into_drawing_area(), fig)
        }
        (FigureSpec::Timeline(fig), ImageFormat::Png) => {
            draw_timeline(BitMapBackend::new(path, size).into_drawing_area(), fig)
        }
        (FigureSpec::Timeline(fig), ImageFormat::Svg) => {
            draw_timeline(SVGBackend::new(path, size).into_drawing_area(), fig)
        }
    };
    drawn.with_context(|| format!("failed to render figure {}", spec.name()))?;

    info!(figure = spec.name(), path = %path.display(), "rendered figure");
    Ok(())
}

fn draw_spectrum<DB>(root: DrawingArea<DB, Shift>, fig: &SpectrumFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let series = fig
        .series
        .iter()
        .map(load_series)
        .collect::<Result<Vec<_>>>()?;

    let all_points = || {
        series.iter().flat_map(|s| {
            s.psd
                .iter()
                .chain(s.theory.iter().flatten())
                .copied()
        })
    };
    let x_range = match fig.x_range.or_else(|| log_bounds(all_points().map(|p| p.0))) {
        Some(range) => range,
        None => bail!("figure {} has no positive data", fig.name),
    };
    let y_range = match fig.y_range.or_else(|| log_bounds(all_points().map(|p| p.1))) {
        Some(range) => range,
        None => bail!("figure {} has no positive data", fig.name),
    };

    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70);
    if let Some(title) = &fig.title {
        builder.caption(title, ("sans-serif", 28).into_font());
    }
    let mut chart = builder.build_cartesian_2d(
        (x_range.0..x_range.1).log_scale(),
        (y_range.0..y_range.1).log_scale(),
    )?;

    chart
        .configure_mesh()
        .x_desc("f")
        .y_desc("S(f)")
        .x_label_formatter(&|x| format!("{x:.0e}"))
        .y_label_formatter(&|y| format!("{y:.0e}"))
        .light_line_style(WHITE.mix(0.0))
        .draw()?;

    for (i, loaded) in series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let in_range = |&(x, y): &(f64, f64)| {
            x >= x_range.0 && x <= x_range.1 && y >= y_range.0 && y <= y_range.1
        };
        let spec = &fig.series[i];

        if spec.markers {
            chart
                .draw_series(
                    loaded
                        .psd
                        .iter()
                        .filter(|p| in_range(*p))
                        .map(|&p| Circle::new(p, 3, color.filled())),
                )?
                .label(loaded.label.as_str())
                .legend(move |(x, y)| Circle::new((x + 10, y), 3, color.filled()));
        } else {
            chart
                .draw_series(LineSeries::new(
                    loaded.psd.iter().copied(),
                    color.stroke_width(3),
                ))?
                .label(loaded.label.as_str())
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(3))
                });
        }

        if let Some(theory) = &loaded.theory {
            chart.draw_series(DashedLineSeries::new(
                theory.iter().copied(),
                6,
                4,
                BLACK.stroke_width(1),
            ))?;
        }
    }

    if let Some(reference) = fig.reference {
        let (lo, hi) = (x_range.0.log10(), x_range.1.log10());
        let guide = (0..=64).map(|k| {
            let f = 10f64.powf(lo + (hi - lo) * k as f64 / 64.0);
            (f, reference.coefficient / f)
        });
        chart.draw_series(DashedLineSeries::new(guide, 8, 6, BLACK.stroke_width(1)))?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .border_style(BLACK)
        .background_style(WHITE.mix(0.7))
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_timeline<DB>(root: DrawingArea<DB, Shift>, fig: &TimelineFigure) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let sequence = Sequence::from_durations(&fig.pulses, &fig.gaps, fig.magnitude)?;
    let end = sequence.total_duration();
    let signal = sequence.sampled_signal(0.0, end, fig.dt);

    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50);
    if let Some(title) = &fig.title {
        builder.caption(title, ("sans-serif", 28).into_font());
    }
    let mut chart = builder.build_cartesian_2d(
        0.0..end + fig.tail.max(0.1 * end),
        -0.1 * fig.magnitude..1.3 * fig.magnitude,
    )?;

    chart
        .configure_mesh()
        .x_desc("t")
        .y_desc("I(t)")
        .light_line_style(WHITE.mix(0.0))
        .draw()?;

    chart.draw_series(LineSeries::new(signal, RED.stroke_width(2)))?;
    if fig.tail > 0.0 {
        chart.draw_series(DashedLineSeries::new(
            [(end, 0.0), (end + fig.tail, 0.0)],
            4,
            4,
            RED.stroke_width(2),
        ))?;
    }

    if fig.annotate {
        let label_y = 0.5 * fig.magnitude;
        let font = ("sans-serif", 18).into_font();
        let mut labels = Vec::with_capacity(2 * sequence.len());
        let mut clock = 0.0;
        for (k, (pulse, gap)) in sequence.pulses().iter().zip(sequence.gaps()).enumerate() {
            labels.push((format!("τ{k}"), clock + 0.5 * gap));
            labels.push((format!("θ{}", k + 1), pulse.start + 0.5 * pulse.duration));
            clock = pulse.end();
        }
        chart.draw_series(
            labels
                .into_iter()
                .map(|(text, x)| Text::new(text, (x, label_y), font.clone())),
        )?;
    }

    root.present()?;
    Ok(())
}
