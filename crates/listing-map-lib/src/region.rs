//! Administrative boundaries
//!
//! Regions form a two-level hierarchy. Fine regions carry the name of their coarse
//! parent; names are compared upper-cased and trimmed everywhere.

use crate::geojson::{self, value_to_string};
use crate::{MapError, MapFeature, Result};
use geo::{BoundingRect, Geometry, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Canonical form used to compare region names
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionLevel {
    Coarse,
    Fine,
}

impl RegionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coarse => "coarse",
            Self::Fine => "fine",
        }
    }
}

/// An administrative boundary
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub level: RegionLevel,
    /// Coarse parent name, for fine regions
    pub parent_name: Option<String>,
    pub geometry: MultiPolygon<f64>,
    /// `None` for empty geometry
    pub bounds: Option<Rect<f64>>,
}

impl Region {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        level: RegionLevel,
        parent_name: Option<String>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        let bounds = geometry.bounding_rect();
        Self {
            id: id.into(),
            name: name.into(),
            level,
            parent_name,
            geometry,
            bounds,
        }
    }

    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn parent_key(&self) -> Option<String> {
        self.parent_name.as_deref().map(normalize_name)
    }

    /// Properties: `id`, `name`, `name_key` and, for fine regions, `parent_key`
    pub fn to_map_feature(&self) -> MapFeature {
        let mut properties = Map::new();
        properties.insert("id".into(), self.id.clone().into());
        properties.insert("name".into(), self.name.clone().into());
        properties.insert("name_key".into(), self.name_key().into());
        if let Some(parent) = self.parent_key() {
            properties.insert("parent_key".into(), parent.into());
        }
        MapFeature {
            id: Some(self.id.clone()),
            geometry: Geometry::MultiPolygon(self.geometry.clone()),
            properties,
        }
    }
}

/// Decode a boundary FeatureCollection.
///
/// Each feature needs an `id` (property or feature-level) and a `name` property; fine
/// regions read their parent from `parent`. Features that fail to decode are skipped.
pub fn decode_regions(bytes: &[u8], level: RegionLevel) -> Result<Vec<Region>> {
    let collection: Value = serde_json::from_slice(bytes)?;
    let raw_features = geojson::features(&collection)?;

    let mut regions = Vec::with_capacity(raw_features.len());
    for (index, raw) in raw_features.iter().enumerate() {
        match decode_region(raw, level) {
            Ok(region) => regions.push(region),
            Err(err) => tracing::warn!("Skipping boundary {index}: {err}"),
        }
    }
    Ok(regions)
}

fn decode_region(raw: &Value, level: RegionLevel) -> Result<Region> {
    let properties = raw
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| MapError::Decode("boundary without properties".to_string()))?;
    let id = properties
        .get("id")
        .and_then(value_to_string)
        .or_else(|| raw.get("id").and_then(value_to_string))
        .ok_or_else(|| MapError::Decode("boundary without id".to_string()))?;
    let name = properties
        .get("name")
        .and_then(value_to_string)
        .ok_or_else(|| MapError::Decode(format!("boundary {id} without name")))?;
    let parent_name = properties.get("parent").and_then(value_to_string);
    let geometry = raw
        .get("geometry")
        .ok_or_else(|| MapError::Decode(format!("boundary {id} without geometry")))
        .and_then(geojson::parse_areal)?;

    Ok(Region::new(id, name, level, parent_name, geometry))
}
