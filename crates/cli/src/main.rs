//! lcmap CLI - supervised land-cover mapping from Landsat 9

mod config;
mod workflow;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use lcmap_cloud::blocking::StacClientBlocking;
use lcmap_cloud::{LandsatQuery, StacCatalog, StacClientOptions, TargetGrid};
use lcmap_core::io::geojson::read_aoi;
use lcmap_core::io::read_geotiff;
use lcmap_core::{AcquisitionDate, Raster};

use config::{SourceConfig, WorkflowConfig};
use workflow::{spinner, RunSummary};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "lcmap")]
#[command(author, version, about = "Supervised land-cover classification of Landsat 9 imagery", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full workflow: composite, train, assess, classify, export
    Run {
        /// Workflow configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Override the composite year
        #[arg(long)]
        year: Option<i32>,
        /// Override the export destination (directory or gs://bucket/folder)
        #[arg(short, long)]
        output: Option<String>,
        /// Read scenes from a local USGS directory instead of the catalog
        #[arg(long)]
        scenes: Option<PathBuf>,
        /// Override the number of trees
        #[arg(long)]
        trees: Option<usize>,
        /// Override the split seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List Landsat 9 scenes over an AOI
    Search {
        /// AOI (GeoJSON, WGS84)
        #[arg(short, long)]
        aoi: PathBuf,
        /// Calendar year
        #[arg(short, long)]
        year: i32,
        /// STAC catalog: pc, es, or an API URL
        #[arg(long, default_value = "pc")]
        catalog: String,
        /// Maximum scene cloud cover (%)
        #[arg(long)]
        max_cloud_cover: Option<f64>,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")
}

fn apply_overrides(
    config: &mut WorkflowConfig,
    year: Option<i32>,
    output: Option<String>,
    scenes: Option<PathBuf>,
    trees: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(year) = year {
        config.year = Some(year);
        config.start = None;
        config.end = None;
    }
    if let Some(output) = output {
        config.export.destination = output;
    }
    if let Some(dir) = scenes {
        config.source = SourceConfig::Local { dir };
    }
    if let Some(trees) = trees {
        config.forest.number_of_trees = trees;
    }
    if let Some(seed) = seed {
        config.training.seed = seed;
    }
    config.validate()
}

fn print_summary(config: &WorkflowConfig, s: &RunSummary) {
    let name = |label: i64| config.class_name(label);

    println!("Scenes composited: {}", s.scenes);
    println!("Samples: {}", s.samples);
    for (set, samples) in [("Training", &s.training), ("Validation", &s.validation)] {
        let counts: Vec<String> = samples
            .class_counts()
            .iter()
            .map(|(label, n)| format!("{}: {}", name(*label), n))
            .collect();
        println!("{} samples: {} ({})", set, samples.len(), counts.join(", "));
    }

    let r = &s.report;
    println!("\nValidation confusion matrix:\n{}", r.matrix);
    println!("Validation overall accuracy: {:.4}", r.accuracy);
    println!("Validation kappa: {:.4}", r.kappa);
    println!(
        "{:<14} {:>10} {:>10} {:>10}",
        "class", "consumer's", "producer's", "F1"
    );
    for c in &r.classes {
        println!(
            "{:<14} {:>10.4} {:>10.4} {:>10.4}",
            name(c.label),
            c.consumers_accuracy,
            c.producers_accuracy,
            c.f1
        );
    }
    if let Some(oob) = s.out_of_bag_error {
        println!("Out-of-bag error: {:.4}", oob);
    }
    let mut importance = s.variable_importance.clone();
    importance.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("Band importance:");
    for (band, v) in &importance {
        println!("  {:<8} {:.3}", band, v);
    }

    println!(
        "\nExported {} {} polygon(s):",
        s.polygons,
        name(config.export.class)
    );
    for path in &s.exported {
        println!("  {}", path);
    }
    println!("  Processing time: {:.2?}", s.elapsed);
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            config,
            year,
            output,
            scenes,
            trees,
            seed,
        } => {
            let mut cfg = WorkflowConfig::load(&config)?;
            apply_overrides(&mut cfg, year, output, scenes, trees, seed)?;
            let summary = workflow::run(&cfg)?;
            print_summary(&cfg, &summary);
        }

        // ── Search ───────────────────────────────────────────────────
        Commands::Search {
            aoi,
            year,
            catalog,
            max_cloud_cover,
        } => {
            let aoi = read_aoi(&aoi).context("Failed to read AOI")?;
            let grid = TargetGrid::covering(&aoi, None)?;
            let client = StacClientBlocking::new(
                StacCatalog::from_str_or_url(&catalog),
                StacClientOptions::default(),
            )?;
            let mut query = LandsatQuery::year(year);
            query.max_cloud_cover = max_cloud_cover;

            let pb = spinner("Searching...");
            let items = client.search_scenes(&grid, &query)?;
            pb.finish_and_clear();

            println!("{} Landsat 9 scene(s) in {}:", items.len(), year);
            for item in &items {
                let date = item
                    .acquisition_date()
                    .map(|d: AcquisitionDate| d.to_string())
                    .unwrap_or_else(|_| "-".into());
                let cloud = item
                    .cloud_cover()
                    .map(|c| format!("{c:5.1}%"))
                    .unwrap_or_else(|| "    -".into());
                println!("  {}  {}  cloud {}", date, cloud, item.id);
            }
        }

        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let raster: Raster<f64> = read_geotiff(&input).context("Failed to read raster")?;
            pb.finish_and_clear();
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "lcmap", "run", "-c", "wf.json", "--year", "2023", "-o", "gs://b/f", "--trees", "50",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                config,
                year,
                output,
                trees,
                ..
            } => {
                assert_eq!(config, PathBuf::from("wf.json"));
                assert_eq!(year, Some(2023));
                assert_eq!(output.as_deref(), Some("gs://b/f"));
                assert_eq!(trees, Some(50));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut cfg: WorkflowConfig = serde_json::from_str(
            r#"{"start": "2022-03-01", "end": "2022-06-01", "aoi": "a.geojson",
                "training": {"positive": "p.geojson", "negative": "n.geojson"},
                "export": {"destination": "out"}}"#,
        )
        .unwrap();
        apply_overrides(
            &mut cfg,
            Some(2023),
            None,
            Some("scenes".into()),
            Some(25),
            Some(9),
        )
        .unwrap();
        assert_eq!(cfg.start, None);
        assert_eq!(
            cfg.date_range().unwrap(),
            lcmap_algorithms::composite::calendar_year(2023)
        );
        assert_eq!(cfg.source, SourceConfig::Local { dir: "scenes".into() });
        assert_eq!(cfg.forest.number_of_trees, 25);
        assert_eq!(cfg.training.seed, 9);
    }
}
