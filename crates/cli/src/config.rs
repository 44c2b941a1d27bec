//! Workflow configuration (`workflow.json`).
//!
//! Every field except the input files has a default, so a minimal file
//! names the AOI, the two training point sets, the year and the export
//! destination.

use anyhow::{bail, Context, Result};
use lcmap_algorithms::classification::RandomForestParams;
use lcmap_algorithms::composite::{calendar_year, DateRange};
use lcmap_algorithms::sampling::DEFAULT_SPLIT;
use lcmap_cloud::{ExportDestination, StacCatalog};
use lcmap_core::scene::{OPTICAL_BANDS, THERMAL_BANDS};
use lcmap_core::{AcquisitionDate, CRS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Calendar year to composite; ignored when `start`/`end` are set
    #[serde(default)]
    pub year: Option<i32>,
    /// First day (inclusive)
    #[serde(default)]
    pub start: Option<AcquisitionDate>,
    /// Last day (exclusive)
    #[serde(default)]
    pub end: Option<AcquisitionDate>,

    /// AOI for compositing (GeoJSON polygons, WGS84)
    pub aoi: PathBuf,
    /// AOI the classification is clipped to; defaults to `aoi`
    #[serde(default)]
    pub classify_aoi: Option<PathBuf>,

    pub training: TrainingConfig,

    #[serde(default)]
    pub source: SourceConfig,

    /// Bands used as classifier features
    #[serde(default = "default_bands")]
    pub bands: Vec<String>,
    /// EPSG code of the working grid; default is the UTM zone of the AOI
    #[serde(default)]
    pub epsg: Option<u32>,
    /// Mask pixels with saturated bands
    #[serde(default = "yes")]
    pub mask_saturated: bool,

    #[serde(default)]
    pub forest: ForestConfig,

    pub export: ExportConfig,

    #[serde(default)]
    pub outputs: OutputConfig,

    /// Human-readable class names for the report
    #[serde(default = "default_class_names")]
    pub class_names: BTreeMap<i64, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    /// Points of the positive class
    pub positive: PathBuf,
    /// Points of the negative class
    pub negative: PathBuf,
    /// Attribute holding the class label
    #[serde(default = "default_label_property")]
    pub label_property: String,
    #[serde(default)]
    pub positive_label: i64,
    #[serde(default = "one")]
    pub negative_label: i64,
    /// Sampling footprint in metres
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Samples with random value below this train, the rest validate
    #[serde(default = "default_split")]
    pub split: f64,
    /// Seed of the random column
    #[serde(default)]
    pub seed: u64,
}

/// Where scenes come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// STAC catalog (`pc`, `es` or an API URL)
    Stac {
        #[serde(default = "default_catalog")]
        catalog: String,
        #[serde(default)]
        max_cloud_cover: Option<f64>,
        #[serde(default = "default_max_items")]
        max_items: usize,
        /// Scenes downloaded at once
        #[serde(default = "default_concurrency")]
        concurrency: usize,
    },
    /// Directory of USGS Level-2 GeoTIFFs
    Local { dir: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Stac {
            catalog: default_catalog(),
            max_cloud_cover: None,
            max_items: default_max_items(),
            concurrency: default_concurrency(),
        }
    }
}

impl SourceConfig {
    pub fn catalog(&self) -> Option<StacCatalog> {
        match self {
            SourceConfig::Stac { catalog, .. } => Some(StacCatalog::from_str_or_url(catalog)),
            SourceConfig::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestConfig {
    #[serde(default = "default_trees")]
    pub number_of_trees: usize,
    #[serde(default)]
    pub variables_per_split: Option<usize>,
    #[serde(default = "one_usize")]
    pub min_leaf_population: usize,
    #[serde(default = "default_bag_fraction")]
    pub bag_fraction: f64,
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default)]
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        let p = RandomForestParams::default();
        Self {
            number_of_trees: p.number_of_trees,
            variables_per_split: p.variables_per_split,
            min_leaf_population: p.min_leaf_population,
            bag_fraction: p.bag_fraction,
            max_nodes: p.max_nodes,
            seed: p.seed,
        }
    }
}

impl From<&ForestConfig> for RandomForestParams {
    fn from(c: &ForestConfig) -> Self {
        RandomForestParams {
            number_of_trees: c.number_of_trees,
            variables_per_split: c.variables_per_split,
            min_leaf_population: c.min_leaf_population,
            bag_fraction: c.bag_fraction,
            max_nodes: c.max_nodes,
            seed: c.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    /// Local directory or `gs://bucket/folder`
    pub destination: String,
    /// File name stem of the shapefile
    #[serde(default = "default_description")]
    pub description: String,
    /// Class whose polygons are exported
    #[serde(default)]
    pub class: i64,
    #[serde(default = "yes")]
    pub eight_connected: bool,
}

/// Optional local side outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory for one GeoTIFF per composite band
    #[serde(default)]
    pub composite_dir: Option<PathBuf>,
    /// GeoTIFF of the classification
    #[serde(default)]
    pub classification: Option<PathBuf>,
    /// JSON accuracy report
    #[serde(default)]
    pub report: Option<PathBuf>,
}

fn default_bands() -> Vec<String> {
    OPTICAL_BANDS
        .iter()
        .chain(THERMAL_BANDS.iter())
        .map(|b| b.to_string())
        .collect()
}
fn default_class_names() -> BTreeMap<i64, String> {
    BTreeMap::from([(0, "rice".to_string()), (1, "other".to_string())])
}
fn default_label_property() -> String {
    "class".into()
}
fn default_catalog() -> String {
    "pc".into()
}
fn default_description() -> String {
    "rice_polygons".into()
}
fn default_scale() -> f64 {
    30.0
}
fn default_split() -> f64 {
    DEFAULT_SPLIT
}
fn default_trees() -> usize {
    100
}
fn default_bag_fraction() -> f64 {
    0.5
}
fn default_max_items() -> usize {
    200
}
fn default_concurrency() -> usize {
    4
}
fn one() -> i64 {
    1
}
fn one_usize() -> usize {
    1
}
fn yes() -> bool {
    true
}

impl WorkflowConfig {
    /// Read and validate a JSON config. Relative paths are resolved
    /// against the directory of the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: WorkflowConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let fix = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        fix(&mut self.aoi);
        if let Some(p) = self.classify_aoi.as_mut() {
            fix(p);
        }
        fix(&mut self.training.positive);
        fix(&mut self.training.negative);
        if let SourceConfig::Local { dir } = &mut self.source {
            fix(dir);
        }
        for p in [
            &mut self.outputs.composite_dir,
            &mut self.outputs.classification,
            &mut self.outputs.report,
        ]
        .into_iter()
        .flatten()
        {
            fix(p);
        }
        if !self.export.destination.contains("://") {
            let dest = PathBuf::from(&self.export.destination);
            if dest.is_relative() {
                self.export.destination = base.join(dest).display().to_string();
            }
        }
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.date_range()?;
        self.destination()?;
        if self.bands.is_empty() {
            bail!("'bands' must name at least one band");
        }
        let t = &self.training;
        if !(t.split > 0.0 && t.split < 1.0) {
            bail!("training.split must be in (0, 1), got {}", t.split);
        }
        if t.positive_label == t.negative_label {
            bail!("positive and negative labels must differ");
        }
        if self.export.description.is_empty()
            || self.export.description.contains(['/', '\\'])
        {
            bail!("export.description must be a plain file name");
        }
        Ok(())
    }

    /// Compositing interval: explicit `start`/`end`, else the calendar year.
    pub fn date_range(&self) -> Result<DateRange> {
        match (self.start, self.end, self.year) {
            (Some(start), Some(end), _) => Ok(DateRange::new(start, end)?),
            (Some(start), None, _) => Ok(DateRange::new(
                start,
                AcquisitionDate::start_of_year(start.year() + 1),
            )?),
            (None, Some(_), _) => bail!("'end' given without 'start'"),
            (None, None, Some(year)) => Ok(calendar_year(year)),
            (None, None, None) => bail!("set 'year' or 'start'/'end'"),
        }
    }

    pub fn destination(&self) -> Result<ExportDestination> {
        Ok(self.export.destination.parse()?)
    }

    /// Working grid CRS override.
    pub fn crs(&self) -> Option<CRS> {
        self.epsg.map(CRS::from_epsg)
    }

    /// Name of `label` for console output.
    pub fn class_name(&self, label: i64) -> String {
        self.class_names
            .get(&label)
            .cloned()
            .unwrap_or_else(|| format!("class {label}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "year": 2022,
        "aoi": "aoi.geojson",
        "training": {"positive": "rice.geojson", "negative": "other.geojson"},
        "export": {"destination": "gs://paddy-maps/2022"}
    }"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let c: WorkflowConfig = serde_json::from_str(MINIMAL).unwrap();
        c.validate().unwrap();
        assert_eq!(c.bands.len(), 8);
        assert_eq!(c.bands[7], "ST_B10");
        assert_eq!(c.training.label_property, "class");
        assert_eq!((c.training.positive_label, c.training.negative_label), (0, 1));
        assert_eq!(c.training.split, 0.7);
        assert_eq!(c.training.scale, 30.0);
        assert_eq!(c.forest.number_of_trees, 100);
        assert_eq!(RandomForestParams::from(&c.forest), RandomForestParams::default());
        assert_eq!(c.export.class, 0);
        assert_eq!(c.export.description, "rice_polygons");
        assert_eq!(c.source.catalog(), Some(StacCatalog::PlanetaryComputer));
        assert_eq!(c.class_name(0), "rice");
        assert_eq!(c.class_name(7), "class 7");
        assert_eq!(c.date_range().unwrap(), calendar_year(2022));
        assert!(c.destination().unwrap().is_remote());
    }

    #[test]
    fn full_config() {
        let text = r#"{
            "start": "2022-03-01", "end": "2022-09-01",
            "aoi": "aoi.geojson", "classify_aoi": "district.geojson",
            "training": {"positive": "p.geojson", "negative": "n.geojson",
                         "label_property": "lc", "scale": 60, "split": 0.8, "seed": 42},
            "source": {"type": "local", "dir": "scenes"},
            "bands": ["SR_B4", "SR_B5"],
            "epsg": 32648,
            "forest": {"number_of_trees": 10, "bag_fraction": 1.0},
            "export": {"destination": "out", "description": "paddy", "eight_connected": false},
            "outputs": {"classification": "classes.tif"},
            "class_names": {"0": "paddy", "1": "not paddy"}
        }"#;
        let c: WorkflowConfig = serde_json::from_str(text).unwrap();
        c.validate().unwrap();
        assert_eq!(c.source, SourceConfig::Local { dir: "scenes".into() });
        assert_eq!(c.crs().and_then(|crs| crs.epsg()), Some(32648));
        assert_eq!(c.forest.number_of_trees, 10);
        assert_eq!(c.forest.min_leaf_population, 1);
        assert_eq!(c.class_name(1), "not paddy");
        let range = c.date_range().unwrap();
        assert!(range.contains(AcquisitionDate::new(2022, 8, 31).unwrap()));
        assert!(!range.contains(AcquisitionDate::new(2022, 9, 1).unwrap()));
    }

    #[test]
    fn invalid_configs() {
        let mut c: WorkflowConfig = serde_json::from_str(MINIMAL).unwrap();
        c.year = None;
        assert!(c.validate().is_err());

        let mut c: WorkflowConfig = serde_json::from_str(MINIMAL).unwrap();
        c.training.split = 1.0;
        assert!(c.validate().is_err());

        let mut c: WorkflowConfig = serde_json::from_str(MINIMAL).unwrap();
        c.export.destination = "s3://bucket".into();
        assert!(c.validate().is_err());

        assert!(serde_json::from_str::<WorkflowConfig>(
            &MINIMAL.replace("\"year\"", "\"yaer\"")
        )
        .is_err());
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        std::fs::write(&path, MINIMAL.replace("gs://paddy-maps/2022", "exports")).unwrap();
        let c = WorkflowConfig::load(&path).unwrap();
        assert_eq!(c.aoi, dir.path().join("aoi.geojson"));
        assert_eq!(c.training.negative, dir.path().join("other.geojson"));
        assert_eq!(
            c.export.destination,
            dir.path().join("exports").display().to_string()
        );
    }
}
