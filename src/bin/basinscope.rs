//! basinscope CLI: run every epoch of a basin analysis from a scene catalog

use anyhow::{Context, Result};
use basinscope::config::BasinConfig;
use basinscope::core::pipeline::{AnalysisPlan, Pipeline};
use basinscope::io::catalog::DirectoryCatalog;
use basinscope::io::dem::DemReader;
use basinscope::io::export::{ExportQueue, ExportStatus, GeoTiffSink};
use basinscope::io::region::read_region;
use basinscope::render::{elevation_legend, render_layers, LogLayerSink};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "basinscope")]
#[command(author, version, about = "Multi-epoch river basin compositing", long_about = None)]
struct Cli {
    /// Scene catalog root: <root>/<collection>/<scene>/<BAND>.tif
    catalog: PathBuf,
    /// Region of interest (GeoJSON)
    roi: PathBuf,
    /// JSON configuration overriding the default epochs
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Output directory for reports and exports
    #[arg(short, long, default_value = "basinscope_out")]
    out: PathBuf,
    /// Skip GeoTIFF exports
    #[arg(long)]
    no_export: bool,
    /// Download SRTM elevation for the topography layer
    #[arg(long)]
    dem: bool,
    /// Elevation grid resolution in meters
    #[arg(long, default_value = "30")]
    dem_resolution: f64,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => BasinConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BasinConfig::default(),
    };
    let region = read_region(&cli.roi).with_context(|| format!("reading region {}", cli.roi.display()))?;
    let plan = AnalysisPlan::new(region, config)?;
    let catalog = DirectoryCatalog::new(&cli.catalog)?;

    let run = Pipeline::new(&catalog).execute(&plan);
    for line in run.console_report() {
        println!("{}", line);
    }

    let dem = if cli.dem {
        let loaded = DemReader::default_cache_dir()
            .and_then(|dir| DemReader::elevation_for_region(&plan.region, &dir, cli.dem_resolution));
        match loaded {
            Ok(dem) => {
                println!("Topography Status: SRTM 30m loaded successfully.");
                Some(dem)
            }
            Err(e) => {
                log::warn!("Elevation unavailable: {}", e);
                println!("Topography Status: unavailable ({})", e);
                None
            }
        }
    } else {
        None
    };

    std::fs::create_dir_all(&cli.out).with_context(|| format!("creating {}", cli.out.display()))?;

    let layers = run.layers(&plan.region, dem.as_ref())?;
    let mut sink = LogLayerSink::default();
    render_layers(&mut sink, &layers)?;
    let display = json!({
        "layers": sink.layers,
        "legends": [run.legend(), elevation_legend()],
    });
    std::fs::write(cli.out.join("layers.json"), serde_json::to_string_pretty(&display)?)?;

    let chart = run.chart();
    std::fs::write(cli.out.join("chart.json"), chart.to_json()?)?;
    std::fs::write(cli.out.join("chart.csv"), chart.to_csv())?;
    std::fs::write(
        cli.out.join("reports.json"),
        serde_json::to_string_pretty(&run.reports())?,
    )?;
    log::info!("Chart and reports written to {}", cli.out.display());

    if cli.no_export {
        return Ok(());
    }

    let mut queue = ExportQueue::new(Arc::new(GeoTiffSink::new(&cli.out)))?;
    for request in run.export_requests(&plan)? {
        queue.submit(request)?;
    }
    let mut failed = 0;
    for (name, status) in queue.wait_all() {
        match status {
            ExportStatus::Completed(files) => println!("Export {}: {} file(s)", name, files.len()),
            ExportStatus::Failed(reason) => {
                failed += 1;
                println!("Export {} failed: {}", name, reason);
            }
            other => println!("Export {}: {:?}", name, other),
        }
    }
    if failed > 0 {
        anyhow::bail!("{} export(s) failed", failed);
    }
    Ok(())
}
