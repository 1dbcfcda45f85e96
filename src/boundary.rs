//! Boundary features: a flat property bag plus an opaque geometry.

use serde_json::{Map, Value};

use crate::error::CatalogError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundaryFeature {
    pub properties: Map<String, Value>,
    pub geometry: Option<Value>,
}

impl BoundaryFeature {
    pub fn new(properties: Map<String, Value>) -> Self {
        Self {
            properties,
            geometry: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Read a GeoJSON `Feature`. Missing or null properties become empty.
    pub fn from_geojson(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.get("type").and_then(Value::as_str) != Some("Feature") {
            return None;
        }
        let properties = match obj.get("properties") {
            Some(Value::Object(p)) => p.clone(),
            _ => Map::new(),
        };
        let geometry = obj.get("geometry").filter(|g| !g.is_null()).cloned();
        Some(Self {
            properties,
            geometry,
        })
    }
}

/// Read the features of a GeoJSON `FeatureCollection` (or a single `Feature`).
pub fn features_from_geojson(value: &Value) -> Result<Vec<BoundaryFeature>, CatalogError> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    CatalogError::InvalidGeoJson("FeatureCollection without features".to_string())
                })?;
            features
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    BoundaryFeature::from_geojson(f).ok_or_else(|| {
                        CatalogError::InvalidGeoJson(format!("entry {} is not a Feature", i))
                    })
                })
                .collect()
        }
        Some("Feature") => BoundaryFeature::from_geojson(value)
            .map(|f| vec![f])
            .ok_or_else(|| CatalogError::InvalidGeoJson("malformed Feature".to_string())),
        Some(other) => Err(CatalogError::InvalidGeoJson(format!(
            "unsupported type '{}'",
            other
        ))),
        None => Err(CatalogError::InvalidGeoJson("missing type".to_string())),
    }
}
