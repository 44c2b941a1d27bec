//! The seven workflow steps as one sequential local run.

use anyhow::{bail, Context, Result};
use geo::{Geometry, MultiPolygon};
use indicatif::{ProgressBar, ProgressStyle};
use lcmap_algorithms::accuracy::{classify_samples, AccuracyReport, ConfusionMatrix};
use lcmap_algorithms::classification::{classify, RandomForest, RandomForestParams};
use lcmap_algorithms::composite::build_composite;
use lcmap_algorithms::preprocess::MaskParams;
use lcmap_algorithms::sampling::{add_random_column, sample_regions, split, SampleSet};
use lcmap_algorithms::vectorize::{filter_label, raster_to_polygons, VectorizeParams};
use lcmap_cloud::blocking::{export_shapefile, StacClientBlocking};
use lcmap_cloud::{
    local, BearerAuth, CloudAuth, ExportDestination, HttpClient, LandsatQuery, NoAuth,
    StacClientOptions, TargetGrid,
};
use lcmap_core::io::geojson::{read_aoi, read_geojson};
use lcmap_core::io::{write_geotiff, GeoTiffOptions};
use lcmap_core::projection::Transformer;
use lcmap_core::{AttributeValue, Collection, FeatureCollection, Raster, Scene, CRS};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{SourceConfig, WorkflowConfig};

/// What a run produced, for the console report.
#[derive(Debug)]
pub struct RunSummary {
    pub scenes: usize,
    pub samples: usize,
    pub training: SampleSet,
    pub validation: SampleSet,
    pub report: AccuracyReport,
    pub variable_importance: Vec<(String, f64)>,
    pub out_of_bag_error: Option<f64>,
    pub polygons: usize,
    pub exported: Vec<String>,
    pub elapsed: Duration,
}

pub(crate) fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run the whole workflow described by `config`.
pub fn run(config: &WorkflowConfig) -> Result<RunSummary> {
    let start = Instant::now();
    let range = config.date_range()?;
    let destination = config.destination()?;

    // AOIs, grid
    let aoi = read_aoi(&config.aoi)
        .with_context(|| format!("Failed to read AOI {}", config.aoi.display()))?;
    let classify_aoi = match &config.classify_aoi {
        Some(path) => read_aoi(path)
            .with_context(|| format!("Failed to read classification AOI {}", path.display()))?,
        None => aoi.clone(),
    };
    let extent = MultiPolygon(aoi.0.iter().chain(&classify_aoi.0).cloned().collect());
    let grid = TargetGrid::covering(&extent, config.crs()).context("Failed to build grid")?;
    info!(
        crs = %grid.crs,
        rows = grid.rows,
        cols = grid.cols,
        "working grid"
    );

    let to_grid = Transformer::new(&CRS::wgs84(), &grid.crs)?;
    let aoi = to_grid.transform_geometry(&aoi);
    let classify_aoi = to_grid.transform_geometry(&classify_aoi);

    // 1–2. Mask + composite
    let collection = load_collection(config, &grid, range.start, range.end)?;
    let scenes = collection.len();
    let pb = spinner("Masking and compositing...");
    let mask = MaskParams {
        mask_saturated: config.mask_saturated,
        ..Default::default()
    };
    let composite = build_composite(collection, range, &aoi, &mask)
        .context("Failed to build composite")?
        .select(config.bands.as_slice())
        .context("Composite lacks a configured band")?;
    pb.finish_and_clear();
    write_composite(config, &composite)?;

    // 3. Sampling + split
    let points = load_training_points(config, &to_grid)?;
    let t = &config.training;
    let samples = sample_regions(&composite, &points, &t.label_property, t.scale)
        .context("Failed to sample composite")?;
    if samples.is_empty() {
        bail!("No training point fell on a valid composite pixel");
    }
    let total = samples.len();
    let (training, validation) = split(add_random_column(samples, t.seed), t.split)?;
    info!(
        training = training.len(),
        validation = validation.len(),
        dropped = point_count(&points).saturating_sub(total),
        "samples"
    );

    // 4. Train
    let pb = spinner("Training Random Forest...");
    let params = RandomForestParams::from(&config.forest);
    let forest = RandomForest::train(&training, &config.bands, params)
        .context("Failed to train Random Forest")?;
    pb.finish_and_clear();

    // 6. Accuracy on the held-out samples
    if validation.is_empty() {
        bail!("Validation set is empty; lower training.split or add points");
    }
    let predicted = classify_samples(&forest, &validation)?;
    let report = ConfusionMatrix::from_pairs(&validation.labels(), &predicted)?.report();
    write_report(config, &report)?;

    // 5. Classify
    let pb = spinner("Classifying...");
    let classified = classify(&composite, &forest, Some(&classify_aoi))
        .context("Failed to classify composite")?;
    pb.finish_and_clear();
    if let Some(path) = &config.outputs.classification {
        write_raster(&classified, path)?;
    }

    // 7. Vectorize, filter, export
    let pb = spinner("Vectorizing...");
    let polygons = raster_to_polygons(
        &classified,
        VectorizeParams {
            eight_connected: config.export.eight_connected,
        },
    )?;
    let selected = filter_label(polygons, config.export.class);
    pb.finish_and_clear();
    debug!(features = selected.len(), class = config.export.class, "selected polygons");

    let exported = export(config, &destination, &selected, &grid.crs)?;

    Ok(RunSummary {
        scenes,
        samples: total,
        variable_importance: forest.variable_importance(),
        out_of_bag_error: forest.out_of_bag_error(),
        training,
        validation,
        report,
        polygons: selected.len(),
        exported,
        elapsed: start.elapsed(),
    })
}

fn load_collection(
    config: &WorkflowConfig,
    grid: &TargetGrid,
    start: lcmap_core::AcquisitionDate,
    end: lcmap_core::AcquisitionDate,
) -> Result<Collection> {
    match &config.source {
        SourceConfig::Local { dir } => {
            let pb = spinner("Reading local scenes...");
            let collection = local::load_directory(dir, grid, &config.bands)
                .with_context(|| format!("Failed to load scenes from {}", dir.display()))?;
            pb.finish_and_clear();
            Ok(collection)
        }
        SourceConfig::Stac {
            max_cloud_cover,
            max_items,
            concurrency,
            ..
        } => {
            let catalog = config.source.catalog().unwrap_or_default();
            let options = StacClientOptions {
                max_items: *max_items,
                ..Default::default()
            };
            let client = StacClientBlocking::new(catalog, options)?;
            let query = LandsatQuery {
                start,
                end,
                max_cloud_cover: *max_cloud_cover,
            };

            let pb = spinner("Searching Landsat 9 scenes...");
            let items = client
                .search_scenes(grid, &query)
                .context("STAC search failed")?;
            pb.finish_and_clear();
            if items.is_empty() {
                bail!("No Landsat 9 scene between {start} and {end} over the AOI");
            }

            let pb = spinner(&format!("Downloading {} scenes...", items.len()));
            let collection = client
                .fetch_collection(&items, grid, &config.bands, *concurrency)
                .context("Failed to download scenes")?;
            pb.finish_and_clear();
            Ok(collection)
        }
    }
}

/// Both point sets, labeled and projected onto the grid CRS.
fn load_training_points(config: &WorkflowConfig, to_grid: &Transformer) -> Result<FeatureCollection> {
    let t = &config.training;
    let read = |path: &Path, label: i64| -> Result<FeatureCollection> {
        let fc = read_geojson(path)
            .with_context(|| format!("Failed to read training points {}", path.display()))?;
        Ok(fc.with_property(&t.label_property, AttributeValue::Int(label)))
    };
    let merged = read(&t.positive, t.positive_label)?.merge(read(&t.negative, t.negative_label)?);

    Ok(merged
        .into_iter()
        .map(|mut f| {
            f.geometry = f.geometry.map(|g| to_grid.transform_geometry(&g));
            f
        })
        .collect())
}

/// Number of sampling locations: one per point, one per MultiPoint member
fn point_count(points: &FeatureCollection) -> usize {
    points
        .iter()
        .map(|f| match &f.geometry {
            Some(Geometry::Point(_)) => 1,
            Some(Geometry::MultiPoint(mp)) => mp.0.len(),
            _ => 0,
        })
        .sum()
}

fn export(
    config: &WorkflowConfig,
    destination: &ExportDestination,
    features: &FeatureCollection,
    grid_crs: &CRS,
) -> Result<Vec<String>> {
    if features.is_empty() {
        bail!(
            "No polygon of class {} to export",
            config.export.class
        );
    }
    let to_wgs84 = Transformer::new(grid_crs, &CRS::wgs84())?;
    let features: FeatureCollection = features
        .iter()
        .cloned()
        .map(|mut f| {
            f.geometry = f.geometry.map(|g| to_wgs84.transform_geometry(&g));
            f
        })
        .collect();

    let auth: Box<dyn CloudAuth> = if destination.is_remote() {
        Box::new(BearerAuth::from_env()?)
    } else {
        Box::new(NoAuth)
    };
    let http = HttpClient::new(Duration::from_secs(60), 3)?;

    let pb = spinner(&format!("Exporting to {destination}..."));
    let written = export_shapefile(
        destination,
        &config.export.description,
        &features,
        &CRS::wgs84(),
        &http,
        auth.as_ref(),
    )
    .context("Export failed")?;
    pb.finish_and_clear();
    Ok(written)
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_geotiff(raster, path, Some(GeoTiffOptions { nan_nodata: true }))
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_composite(config: &WorkflowConfig, composite: &Scene) -> Result<()> {
    let Some(dir) = &config.outputs.composite_dir else {
        return Ok(());
    };
    for band in composite.bands() {
        write_raster(&band.data, &dir.join(format!("{}.tif", band.name)))?;
    }
    info!(dir = %dir.display(), bands = composite.bands().len(), "composite written");
    Ok(())
}

fn write_report(config: &WorkflowConfig, report: &AccuracyReport) -> Result<()> {
    let Some(path) = &config.outputs.report else {
        return Ok(());
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report).context("Failed to write report")?;
    Ok(())
}
