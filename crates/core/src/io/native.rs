//! GeoTIFF reading/writing with the pure-Rust `tiff` crate.
//!
//! Reads single-band GeoTIFFs (Landsat Collection 2 ships one file per
//! band) including the pixel grid, the EPSG code from the GeoKey directory
//! and the GDAL no-data tag. Writes 32-bit float GeoTIFFs.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// The decoder maps these codes to named variants; `Tag::Unknown(code)` never matches on read
const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Write a GDAL_NODATA tag of `nan`
    pub nan_nodata: bool,
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
///
/// Same as `read_geotiff` but operates on a byte slice, e.g. an asset
/// downloaded over HTTP.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::default_nodata()))
        .collect()
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    // Full Landsat scenes exceed the default decoding buffer limit
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I8(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_epsg(&mut decoder).map(CRS::from_epsg));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

/// GeoTransform from ModelPixelScaleTag + ModelTiepointTag
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// EPSG code from the GeoKey directory (projected first, then geographic)
fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    let keys = decoder.get_tag_u16_vec(GEO_KEY_DIRECTORY).ok()?;
    let entries = parse_geokeys(&keys);

    [PROJECTED_CS_TYPE_KEY, GEOGRAPHIC_TYPE_KEY]
        .iter()
        .find_map(|id| entries.iter().find(|(k, _)| k == id).map(|(_, v)| *v as u32))
        .filter(|&code| code != 0 && code != 32767)
}

/// Inline-valued `(key, value)` entries of a GeoKeyDirectoryTag
fn parse_geokeys(keys: &[u16]) -> Vec<(u16, u16)> {
    if keys.len() < 4 {
        return Vec::new();
    }
    let count = keys[3] as usize;
    keys[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn read_nodata<T, R>(decoder: &mut Decoder<R>) -> Option<T>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file (32-bit float)
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{what}: {e}"));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;

    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| {
            if raster.is_nodata(v) {
                f32::NAN
            } else {
                num_traits::cast(v).unwrap_or(f32::NAN)
            }
        })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("Cannot create TIFF image", e))?;

    let gt = raster.transform();

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &scale[..])
        .map_err(|e| tiff_err("Cannot write scale tag", e))?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tiepoint[..])
        .map_err(|e| tiff_err("Cannot write tiepoint tag", e))?;

    let geokeys = geokeys_for(raster.crs());
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, geokeys.as_slice())
        .map_err(|e| tiff_err("Cannot write geokey tag", e))?;

    if options.nan_nodata {
        image
            .encoder()
            .write_tag(GDAL_NODATA, "nan")
            .map_err(|e| tiff_err("Cannot write nodata tag", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_err("Cannot write image data", e))?;

    Ok(())
}

/// Minimal GeoKey directory: model type, raster-is-area and the EPSG code
/// when it is geographic WGS84 or a WGS84 / UTM zone.
fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    let mut entries: Vec<[u16; 4]> = Vec::new();
    match crs.and_then(|c| c.epsg().map(|code| (c, code))) {
        Some((c, code)) if c.is_wgs84() => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 2]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
            entries.push([GEOGRAPHIC_TYPE_KEY, 0, 1, code as u16]);
        }
        Some((c, code)) if c.utm_zone().is_some() => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 1]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
            entries.push([PROJECTED_CS_TYPE_KEY, 0, 1, code as u16]);
        }
        _ => {
            entries.push([GT_MODEL_TYPE_KEY, 0, 1, 1]);
            entries.push([GT_RASTER_TYPE_KEY, 0, 1, 1]);
        }
    }

    let mut keys = vec![1, 1, 0, entries.len() as u16];
    keys.extend(entries.into_iter().flatten());
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raster() -> Raster<f64> {
        let mut r = Raster::new(6, 5);
        r.set_transform(GeoTransform::new(580_000.0, 2_330_000.0, 30.0, -30.0));
        r.set_crs(Some(CRS::utm(48, true)));
        for row in 0..6 {
            for col in 0..5 {
                r.set(row, col, (row * 5 + col) as f64 * 0.01).unwrap();
            }
        }
        r.set(2, 2, f64::NAN).unwrap();
        r
    }

    #[test]
    fn buffer_roundtrip_keeps_grid_and_crs() {
        let r = sample_raster();
        let buf = write_geotiff_to_buffer(&r, Some(GeoTiffOptions { nan_nodata: true })).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), (6, 5));
        assert!(back.transform().same_grid(r.transform()));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32648));
        assert!(back.get(2, 2).unwrap().is_nan());
        assert!((back.get(5, 4).unwrap() - 0.29).abs() < 1e-6);
    }

    #[test]
    fn file_roundtrip() {
        let r = sample_raster();
        let tmp = tempfile::NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&r, tmp.path(), None).unwrap();
        let back: Raster<f32> = read_geotiff(tmp.path()).unwrap();
        assert_eq!(back.shape(), r.shape());
        assert!(back.transform().same_grid(r.transform()));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32648));
    }

    #[test]
    fn integer_band_keeps_georeference() {
        let mut r: Raster<u16> = Raster::filled(40, 40, 7_500);
        r.set_transform(GeoTransform::new(585_015.0, 2_322_015.0, 30.0, -30.0));
        r.set_crs(Some(CRS::utm(48, true)));
        r.set(3, 4, 21_824).unwrap();

        let tmp = tempfile::NamedTempFile::with_suffix(".TIF").unwrap();
        write_geotiff(&r, tmp.path(), None).unwrap();
        let back: Raster<u16> = read_geotiff(tmp.path()).unwrap();

        assert_eq!(back.shape(), (40, 40));
        let gt = back.transform();
        assert_eq!((gt.origin_x, gt.origin_y), (585_015.0, 2_322_015.0));
        assert_eq!((gt.pixel_width, gt.pixel_height), (30.0, -30.0));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32648));
        assert_eq!(back.get(3, 4).unwrap(), 21_824);
        assert_eq!(back.get(0, 0).unwrap(), 7_500);
    }

    #[test]
    fn missing_georeference_leaves_defaults() {
        let r: Raster<f64> = Raster::filled(2, 2, 1.0);
        let buf = write_geotiff_to_buffer(&r, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&buf).unwrap();
        assert!(back.crs().is_none());
    }

    #[test]
    fn geokeys_layout() {
        let keys = geokeys_for(Some(&CRS::utm(48, true)));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(parse_geokeys(&keys), vec![(1024, 1), (1025, 1), (3072, 32648)]);

        let keys = geokeys_for(Some(&CRS::wgs84()));
        assert!(parse_geokeys(&keys).contains(&(2048, 4326)));
    }
}
