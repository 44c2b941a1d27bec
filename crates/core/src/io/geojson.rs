//! GeoJSON input for AOIs and labeled training points.
//!
//! Covers the subset the workflow needs: `FeatureCollection`, `Feature` or
//! bare geometry documents with Point / MultiPoint / Polygon / MultiPolygon
//! geometries. Coordinates are WGS84 longitude/latitude (RFC 7946).

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geo_types::{Coord, Geometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Read a GeoJSON file into a feature collection
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_geojson(&text)
}

/// Parse a GeoJSON document into a feature collection
pub fn parse_geojson(text: &str) -> Result<FeatureCollection> {
    let doc: Value =
        serde_json::from_str(text).map_err(|e| Error::geojson(format!("invalid JSON: {e}")))?;

    match type_of(&doc)? {
        "FeatureCollection" => doc
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::geojson("FeatureCollection without 'features' array"))?
            .iter()
            .map(parse_feature)
            .collect(),
        "Feature" => Ok(FeatureCollection {
            features: vec![parse_feature(&doc)?],
        }),
        _ => Ok(FeatureCollection {
            features: vec![Feature {
                geometry: Some(parse_geometry(&doc)?),
                properties: BTreeMap::new(),
                id: None,
            }],
        }),
    }
}

/// Read an area of interest: the union (as parts) of every polygon in the file
pub fn read_aoi<P: AsRef<Path>>(path: P) -> Result<MultiPolygon<f64>> {
    let fc = read_geojson(path)?;
    aoi_from_features(&fc)
}

/// Collect every polygon of a feature collection into one multipolygon
pub fn aoi_from_features(fc: &FeatureCollection) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    for geom in fc.iter().filter_map(|f| f.geometry.as_ref()) {
        match geom {
            Geometry::Polygon(p) => polygons.push(p.clone()),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
            _ => {}
        }
    }
    if polygons.is_empty() {
        return Err(Error::Empty("AOI contains no polygon".into()));
    }
    Ok(MultiPolygon(polygons))
}

fn type_of(v: &Value) -> Result<&str> {
    v.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::geojson("object without 'type'"))
}

fn parse_feature(v: &Value) -> Result<Feature> {
    if type_of(v)? != "Feature" {
        return Err(Error::geojson("expected a Feature"));
    }

    let geometry = match v.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };

    let properties = match v.get("properties") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), attribute(v)))
            .collect(),
        _ => BTreeMap::new(),
    };

    let id = v.get("id").and_then(|id| match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });

    Ok(Feature {
        geometry,
        properties,
        id,
    })
}

fn attribute(v: &Value) -> AttributeValue {
    match v {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn parse_geometry(v: &Value) -> Result<Geometry<f64>> {
    let coords = v
        .get("coordinates")
        .ok_or_else(|| Error::geojson("geometry without 'coordinates'"))?;

    match type_of(v)? {
        "Point" => Ok(Point::from(position(coords)?).into()),
        "MultiPoint" => Ok(MultiPoint(
            array(coords)?
                .iter()
                .map(|p| position(p).map(Point::from))
                .collect::<Result<Vec<_>>>()?,
        )
        .into()),
        "Polygon" => Ok(polygon(coords)?.into()),
        "MultiPolygon" => Ok(MultiPolygon(
            array(coords)?
                .iter()
                .map(polygon)
                .collect::<Result<Vec<_>>>()?,
        )
        .into()),
        other => Err(Error::geojson(format!("unsupported geometry type '{other}'"))),
    }
}

fn array(v: &Value) -> Result<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| Error::geojson("expected a coordinate array"))
}

fn position(v: &Value) -> Result<Coord<f64>> {
    let p = array(v)?;
    match (p.first().and_then(Value::as_f64), p.get(1).and_then(Value::as_f64)) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(Error::geojson("position needs two numbers")),
    }
}

fn ring(v: &Value) -> Result<LineString<f64>> {
    let coords = array(v)?
        .iter()
        .map(position)
        .collect::<Result<Vec<_>>>()?;
    if coords.len() < 4 {
        return Err(Error::geojson("linear ring needs at least 4 positions"));
    }
    Ok(LineString(coords))
}

fn polygon(v: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(v)?.iter().map(ring);
    let exterior = rings
        .next()
        .ok_or_else(|| Error::geojson("polygon without rings"))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "id": 7, "geometry": {"type": "Point", "coordinates": [105.80, 21.00]},
         "properties": {"class": 0, "name": "paddy"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [105.81, 21.01]},
         "properties": {"class": 1.0}},
        {"type": "Feature", "geometry": null, "properties": null}
      ]
    }"#;

    #[test]
    fn parse_point_collection() {
        let fc = parse_geojson(POINTS).unwrap();
        assert_eq!(fc.len(), 3);
        assert_eq!(fc.features[0].id.as_deref(), Some("7"));
        assert_eq!(fc.features[0].label("class"), Some(0));
        assert_eq!(fc.features[1].label("class"), Some(1));
        assert!(fc.features[2].geometry.is_none());
        match fc.features[0].geometry.as_ref().unwrap() {
            Geometry::Point(p) => assert_eq!((p.x(), p.y()), (105.80, 21.00)),
            g => panic!("unexpected geometry {g:?}"),
        }
    }

    #[test]
    fn parse_bare_polygon_as_aoi() {
        let text = r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;
        let fc = parse_geojson(text).unwrap();
        let aoi = aoi_from_features(&fc).unwrap();
        assert_eq!(aoi.0.len(), 1);
        assert_eq!(aoi.0[0].exterior().0.len(), 5);
    }

    #[test]
    fn aoi_requires_a_polygon() {
        let fc = parse_geojson(POINTS).unwrap();
        assert!(aoi_from_features(&fc).is_err());
    }

    #[test]
    fn rejects_unsupported_and_malformed() {
        assert!(parse_geojson(r#"{"type": "LineString", "coordinates": [[0,0],[1,1]]}"#).is_err());
        assert!(parse_geojson(r#"{"type": "Point", "coordinates": [1]}"#).is_err());
        assert!(parse_geojson("not json").is_err());
    }
}
