//! ESRI shapefile writer for polygon features.
//!
//! Produces the four sidecar files of a polygon shapefile:
//! `.shp` (geometry), `.shx` (record index), `.dbf` (dBase III attribute
//! table) and `.prj` (ESRI WKT). Outer rings are written clockwise and
//! holes counter-clockwise, as the format requires.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, FeatureCollection};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use chrono::{Datelike, NaiveDate, Utc};
use geo::orient::{Direction, Orient};
use geo::{BoundingRect, Geometry, MultiPolygon};
use std::path::{Path, PathBuf};

const FILE_CODE: i32 = 9994;
const VERSION: i32 = 1000;
const SHAPE_POLYGON: i32 = 5;
const HEADER_BYTES: usize = 100;

/// dBase field names are limited to 10 characters
const DBF_NAME_LEN: usize = 10;

/// In-memory contents of a shapefile, one buffer per sidecar file.
#[derive(Debug, Clone)]
pub struct ShapefileParts {
    pub shp: Vec<u8>,
    pub shx: Vec<u8>,
    pub dbf: Vec<u8>,
    pub prj: Option<String>,
}

impl ShapefileParts {
    /// `(extension, bytes)` pairs, ready to be written or uploaded
    pub fn files(&self) -> Vec<(&'static str, &[u8])> {
        let mut files = vec![
            ("shp", self.shp.as_slice()),
            ("shx", self.shx.as_slice()),
            ("dbf", self.dbf.as_slice()),
        ];
        if let Some(prj) = &self.prj {
            files.push(("prj", prj.as_bytes()));
        }
        files
    }
}

/// Write polygon features as `<dir>/<name>.{shp,shx,dbf,prj}`.
///
/// Returns the paths written.
pub fn write_shapefile(
    dir: &Path,
    name: &str,
    features: &FeatureCollection,
    crs: &CRS,
) -> Result<Vec<PathBuf>> {
    let parts = encode_shapefile(features, crs)?;
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for (ext, bytes) in parts.files() {
        let path = dir.join(format!("{name}.{ext}"));
        std::fs::write(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}

/// Encode polygon features into shapefile buffers.
///
/// Every feature must carry a Polygon or MultiPolygon geometry. The
/// attribute table has one column per property name seen on any feature.
pub fn encode_shapefile(features: &FeatureCollection, crs: &CRS) -> Result<ShapefileParts> {
    let polygons = features
        .iter()
        .enumerate()
        .map(|(i, f)| match &f.geometry {
            Some(Geometry::Polygon(p)) => Ok(MultiPolygon(vec![p.orient(Direction::Reversed)])),
            Some(Geometry::MultiPolygon(mp)) => Ok(mp.orient(Direction::Reversed)),
            _ => Err(Error::InvalidParameter {
                name: "geometry",
                value: format!("feature #{i}"),
                reason: "shapefile export needs polygon geometries".into(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    let records: Vec<Vec<u8>> = polygons
        .iter()
        .map(polygon_record)
        .collect::<std::io::Result<_>>()?;

    let bbox = polygons
        .iter()
        .filter_map(|mp| mp.bounding_rect())
        .fold(None, |acc: Option<[f64; 4]>, r| {
            let b = [r.min().x, r.min().y, r.max().x, r.max().y];
            Some(match acc {
                None => b,
                Some(a) => [a[0].min(b[0]), a[1].min(b[1]), a[2].max(b[2]), a[3].max(b[3])],
            })
        })
        .unwrap_or([0.0; 4]);

    let shp_len = HEADER_BYTES + records.iter().map(|r| 8 + r.len()).sum::<usize>();
    let shx_len = HEADER_BYTES + 8 * records.len();

    let mut shp = Vec::with_capacity(shp_len);
    let mut shx = Vec::with_capacity(shx_len);
    write_header(&mut shp, shp_len, bbox)?;
    write_header(&mut shx, shx_len, bbox)?;

    let mut offset = HEADER_BYTES;
    for (i, content) in records.iter().enumerate() {
        shx.write_i32::<BigEndian>(words(offset))?;
        shx.write_i32::<BigEndian>(words(content.len()))?;

        shp.write_i32::<BigEndian>(i as i32 + 1)?;
        shp.write_i32::<BigEndian>(words(content.len()))?;
        shp.extend_from_slice(content);
        offset += 8 + content.len();
    }

    Ok(ShapefileParts {
        shp,
        shx,
        dbf: encode_dbf(features)?,
        prj: crs.esri_wkt(),
    })
}

/// Lengths and offsets in the main file are counted in 16-bit words
fn words(bytes: usize) -> i32 {
    (bytes / 2) as i32
}

fn write_header(out: &mut Vec<u8>, file_bytes: usize, bbox: [f64; 4]) -> std::io::Result<()> {
    out.write_i32::<BigEndian>(FILE_CODE)?;
    for _ in 0..5 {
        out.write_i32::<BigEndian>(0)?;
    }
    out.write_i32::<BigEndian>(words(file_bytes))?;
    out.write_i32::<LittleEndian>(VERSION)?;
    out.write_i32::<LittleEndian>(SHAPE_POLYGON)?;
    for v in bbox {
        out.write_f64::<LittleEndian>(v)?;
    }
    // Z and M ranges are unused for 2D polygons
    for _ in 0..4 {
        out.write_f64::<LittleEndian>(0.0)?;
    }
    Ok(())
}

/// Record content of one polygon shape (without the 8-byte record header)
fn polygon_record(mp: &MultiPolygon<f64>) -> std::io::Result<Vec<u8>> {
    let rings: Vec<_> = mp
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .collect();
    let num_points: usize = rings.iter().map(|r| r.0.len()).sum();

    let mut out = Vec::with_capacity(44 + 4 * rings.len() + 16 * num_points);
    out.write_i32::<LittleEndian>(SHAPE_POLYGON)?;

    let bbox = mp
        .bounding_rect()
        .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y])
        .unwrap_or([0.0; 4]);
    for v in bbox {
        out.write_f64::<LittleEndian>(v)?;
    }

    out.write_i32::<LittleEndian>(rings.len() as i32)?;
    out.write_i32::<LittleEndian>(num_points as i32)?;

    let mut start = 0i32;
    for ring in &rings {
        out.write_i32::<LittleEndian>(start)?;
        start += ring.0.len() as i32;
    }
    for ring in &rings {
        for c in &ring.0 {
            out.write_f64::<LittleEndian>(c.x)?;
            out.write_f64::<LittleEndian>(c.y)?;
        }
    }
    Ok(out)
}

/// One dBase column
#[derive(Debug, Clone)]
struct DbfField {
    name: String,
    kind: u8,
    length: u8,
    decimals: u8,
}

impl DbfField {
    fn format(&self, value: Option<&AttributeValue>) -> Vec<u8> {
        let len = self.length as usize;
        let text = match (self.kind, value) {
            (_, None) | (_, Some(AttributeValue::Null)) => String::new(),
            (b'N', Some(v)) if self.decimals == 0 => {
                v.as_i64().map(|i| i.to_string()).unwrap_or_default()
            }
            (b'N', Some(v)) => v
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| format!("{:.*}", self.decimals as usize, f))
                .unwrap_or_default(),
            (b'L', Some(AttributeValue::Bool(b))) => String::from(if *b { "T" } else { "F" }),
            (_, Some(AttributeValue::String(s))) => s.clone(),
            (_, Some(v)) => v.as_f64().map(|f| f.to_string()).unwrap_or_default(),
        };

        let mut bytes: Vec<u8> = text.into_bytes();
        bytes.truncate(len);
        let pad = len - bytes.len();
        if self.kind == b'N' {
            // numbers are right-aligned
            let mut out = vec![b' '; pad];
            out.extend(bytes);
            out
        } else {
            bytes.extend(std::iter::repeat(b' ').take(pad));
            bytes
        }
    }
}

/// Derive the column layout from the property values present
fn dbf_fields(features: &FeatureCollection) -> Vec<DbfField> {
    let mut names: Vec<&String> = features.iter().flat_map(|f| f.properties.keys()).collect();
    names.sort();
    names.dedup();

    let mut fields: Vec<DbfField> = Vec::new();
    for name in names {
        let values: Vec<&AttributeValue> = features
            .iter()
            .filter_map(|f| f.properties.get(name))
            .filter(|v| !matches!(v, AttributeValue::Null))
            .collect();

        let (kind, length, decimals) = if values.iter().all(|v| matches!(v, AttributeValue::Int(_))) {
            (b'N', 18, 0)
        } else if values
            .iter()
            .all(|v| matches!(v, AttributeValue::Int(_) | AttributeValue::Float(_)))
        {
            (b'N', 24, 10)
        } else if values.iter().all(|v| matches!(v, AttributeValue::Bool(_))) {
            (b'L', 1, 0)
        } else {
            (b'C', 254, 0)
        };

        let mut short: String = name.chars().filter(|c| c.is_ascii()).take(DBF_NAME_LEN).collect();
        // keep truncated names unique
        let mut n = 1;
        while fields.iter().any(|f| f.name == short) {
            let suffix = n.to_string();
            short = name.chars().take(DBF_NAME_LEN - suffix.len()).collect::<String>() + &suffix;
            n += 1;
        }

        fields.push(DbfField {
            name: short,
            kind,
            length,
            decimals,
        });
    }
    fields
}

fn encode_dbf(features: &FeatureCollection) -> Result<Vec<u8>> {
    let mut keys: Vec<&String> = features.iter().flat_map(|f| f.properties.keys()).collect();
    keys.sort();
    keys.dedup();
    let fields = dbf_fields(features);

    let header_len = 32 + 32 * fields.len() + 1;
    let record_len = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();

    let mut out = Vec::with_capacity(header_len + record_len * features.len() + 1);
    out.write_u8(0x03)?;
    out.extend_from_slice(&dbf_date(Utc::now().date_naive()));
    out.write_u32::<LittleEndian>(features.len() as u32)?;
    out.write_u16::<LittleEndian>(header_len as u16)?;
    out.write_u16::<LittleEndian>(record_len as u16)?;
    out.extend_from_slice(&[0u8; 20]);

    for field in &fields {
        let mut name = [0u8; 11];
        for (dst, src) in name.iter_mut().zip(field.name.bytes()) {
            *dst = src;
        }
        out.extend_from_slice(&name);
        out.write_u8(field.kind)?;
        out.extend_from_slice(&[0u8; 4]);
        out.write_u8(field.length)?;
        out.write_u8(field.decimals)?;
        out.extend_from_slice(&[0u8; 14]);
    }
    out.write_u8(0x0D)?;

    for feature in features.iter() {
        out.write_u8(b' ')?;
        for (key, field) in keys.iter().zip(&fields) {
            out.extend(field.format(feature.properties.get(key.as_str())));
        }
    }
    out.write_u8(0x1A)?;

    Ok(out)
}

/// Last-update stamp of a dBase header: years since 1900, month, day
fn dbf_date(date: NaiveDate) -> [u8; 3] {
    [
        (date.year() - 1900).clamp(0, 255) as u8,
        date.month() as u8,
        date.day() as u8,
    ]
}
