use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use snorp::logging::init_logging;
use snorp_figures::{render_figure, FigureManifest};

#[derive(Debug, Parser)]
#[command(name = "snorp-figures")]
#[command(about = "Render SNORP spectra and pulse timelines from a figure manifest")]
struct Cli {
    /// TOML manifest with one [[figure]] table per figure
    #[arg(long, default_value = "configs/figures.toml")]
    manifest: PathBuf,

    /// Render only the named figures (repeatable)
    #[arg(long = "only")]
    only: Vec<String>,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let manifest = FigureManifest::load(&cli.manifest)
        .with_context(|| format!("failed to load {}", cli.manifest.display()))?;

    let mut rendered = 0;
    for figure in manifest.select(&cli.only) {
        render_figure(figure)?;
        println!("{}: {}", figure.name(), figure.output().display());
        rendered += 1;
    }
    if rendered == 0 {
        bail!("no figure in {} matched the selection", cli.manifest.display());
    }
    info!(rendered, "figures written");
    Ok(())
}
