//! Vector features: geometry plus attribute table row.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value (booleans as 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }

    /// Integer view of the value; floats must be whole numbers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            other => other
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64),
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes, ordered by name
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Integer class label stored under `key`
    pub fn label(&self, key: &str) -> Option<i64> {
        self.get_property(key).and_then(AttributeValue::as_i64)
    }
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Append all features of `other` after the features of `self`
    pub fn merge(mut self, other: FeatureCollection) -> Self {
        self.features.extend(other.features);
        self
    }

    /// Keep features for which `keep` returns true
    pub fn filter(self, keep: impl Fn(&Feature) -> bool) -> Self {
        Self {
            features: self.features.into_iter().filter(|f| keep(f)).collect(),
        }
    }

    /// Keep features whose integer attribute `key` equals `value`
    pub fn filter_eq(self, key: &str, value: i64) -> Self {
        self.filter(|f| f.label(key) == Some(value))
    }

    /// Set `key = value` on every feature (e.g. tagging a point set with its class)
    pub fn with_property(mut self, key: &str, value: AttributeValue) -> Self {
        for f in &mut self.features {
            f.set_property(key, value.clone());
        }
        self
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    fn pt(label: i64) -> Feature {
        Feature::new(point!(x: 0.0, y: 0.0)).with_property("class", AttributeValue::Int(label))
    }

    #[test]
    fn labels_accept_whole_floats_only() {
        assert_eq!(AttributeValue::Float(1.0).as_i64(), Some(1));
        assert_eq!(AttributeValue::Float(1.5).as_i64(), None);
        assert_eq!(AttributeValue::String("2".into()).as_i64(), Some(2));
        assert_eq!(AttributeValue::Null.as_i64(), None);
    }

    #[test]
    fn merge_then_filter() {
        let a: FeatureCollection = vec![pt(0), pt(0)].into_iter().collect();
        let b: FeatureCollection = vec![pt(1)].into_iter().collect();
        let all = a.merge(b);
        assert_eq!(all.len(), 3);
        assert_eq!(all.clone().filter_eq("class", 1).len(), 1);
        assert_eq!(all.filter_eq("class", 0).len(), 2);
    }

    #[test]
    fn tag_collection() {
        let fc: FeatureCollection = vec![Feature::new(point!(x: 1.0, y: 2.0))].into_iter().collect();
        let fc = fc.with_property("class", AttributeValue::Int(0));
        assert_eq!(fc.features[0].label("class"), Some(0));
    }
}
