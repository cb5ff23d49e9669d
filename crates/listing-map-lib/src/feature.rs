//! Typed listing features
//!
//! Backend responses are GeoJSON FeatureCollections whose `properties.type` is either
//! `"individual"` or `"cluster"`. They are decoded exactly once, here, into [`Feature`];
//! nothing downstream inspects discriminator strings.

use crate::geojson::{self, value_to_string};
use crate::{MapError, Result};
use geo::{Geometry, Point};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Leading cluster-id token of building-level (expandable) clusters
pub const BUILDING_TOKEN: &str = "b";
/// Leading cluster-id token of district-level clusters
pub const DISTRICT_TOKEN: &str = "d";

/// Identifier of a cluster, unique per data source and zoom session
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

/// Granularity encoded in a cluster id's leading token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterKind {
    /// Members share a building; can be expanded into individual markers
    Building,
    /// Members span a district; only a summary is available
    District,
}

impl ClusterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the granularity from the token before the first `_`.
    ///
    /// Unknown tokens are treated as district-level so they are never expanded.
    pub fn kind(&self) -> ClusterKind {
        match self.0.split_once('_') {
            Some((BUILDING_TOKEN, _)) => ClusterKind::Building,
            _ => ClusterKind::District,
        }
    }

    #[inline]
    pub fn is_expandable(&self) -> bool {
        self.kind() == ClusterKind::Building
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClusterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Listing category; selects both the point query and the statistics partition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Sale,
    Rental,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Rental => "rental",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::Sale, Self::Rental]
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|ds| ds.as_str().eq_ignore_ascii_case(tag.trim()))
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price range of a cluster's members
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

/// A single listing
#[derive(Clone, Debug, PartialEq)]
pub struct Listing {
    pub id: String,
    pub location: Point<f64>,
    /// Every backend property except the `type` discriminator
    pub properties: Map<String, Value>,
}

/// An aggregate of nearby listings
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    pub cluster_id: ClusterId,
    pub location: Option<Point<f64>>,
    pub point_count: u32,
    pub cluster_type: String,
    pub data_source: DataSource,
    pub price: Option<PriceSummary>,
    /// Member listing ids, deduplicated, in first-seen order
    pub member_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    Individual(Listing),
    Cluster(Cluster),
}

/// Cluster properties as they arrive on the wire
#[derive(Deserialize)]
struct WireCluster {
    cluster_id: Value,
    #[serde(default)]
    point_count: u32,
    #[serde(default)]
    cluster_type: String,
    #[serde(default)]
    data_source: Option<DataSource>,
    #[serde(default)]
    price: Option<PriceSummary>,
    #[serde(default)]
    member_ids: Vec<Value>,
}

impl Feature {
    pub fn location(&self) -> Option<Point<f64>> {
        match self {
            Feature::Individual(listing) => Some(listing.location),
            Feature::Cluster(cluster) => cluster.location,
        }
    }

    pub fn as_cluster(&self) -> Option<&Cluster> {
        match self {
            Feature::Cluster(cluster) => Some(cluster),
            Feature::Individual(_) => None,
        }
    }

    pub fn as_listing(&self) -> Option<&Listing> {
        match self {
            Feature::Individual(listing) => Some(listing),
            Feature::Cluster(_) => None,
        }
    }

    /// Decode one GeoJSON feature
    fn decode(raw: &Value) -> Result<Self> {
        let mut properties = match raw.get("properties") {
            Some(Value::Object(map)) => map.clone(),
            _ => return Err(MapError::Decode("feature without properties".to_string())),
        };
        let location = raw.get("geometry").and_then(geojson::parse_point);
        let kind = properties
            .remove("type")
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();

        match kind.as_str() {
            "individual" => {
                let location = location
                    .ok_or_else(|| MapError::Decode("individual listing without a point".to_string()))?;
                let id = properties
                    .get("id")
                    .and_then(value_to_string)
                    .or_else(|| raw.get("id").and_then(value_to_string))
                    .ok_or_else(|| MapError::Decode("individual listing without an id".to_string()))?;
                Ok(Feature::Individual(Listing {
                    id,
                    location,
                    properties,
                }))
            }
            "cluster" => {
                let wire: WireCluster = serde_json::from_value(Value::Object(properties))?;
                let cluster_id = value_to_string(&wire.cluster_id)
                    .ok_or_else(|| MapError::Decode("cluster without cluster_id".to_string()))?;
                let mut seen = HashSet::new();
                let member_ids = wire
                    .member_ids
                    .iter()
                    .filter_map(value_to_string)
                    .filter(|id| seen.insert(id.clone()))
                    .collect();
                Ok(Feature::Cluster(Cluster {
                    cluster_id: ClusterId(cluster_id),
                    location,
                    point_count: wire.point_count,
                    cluster_type: wire.cluster_type,
                    data_source: wire.data_source.unwrap_or_default(),
                    price: wire.price,
                    member_ids,
                }))
            }
            other => Err(MapError::Decode(format!("unknown feature type {other:?}"))),
        }
    }

    /// Scene-graph representation. Clusters without coordinates cannot be drawn.
    pub fn to_map_feature(&self) -> Option<MapFeature> {
        match self {
            Feature::Individual(listing) => Some(listing.to_map_feature()),
            Feature::Cluster(cluster) => {
                let location = cluster.location?;
                let mut properties = Map::new();
                properties.insert("type".into(), "cluster".into());
                properties.insert("cluster_id".into(), cluster.cluster_id.as_str().into());
                properties.insert("point_count".into(), cluster.point_count.into());
                properties.insert("cluster_type".into(), cluster.cluster_type.clone().into());
                properties.insert("data_source".into(), cluster.data_source.as_str().into());
                properties.insert("expandable".into(), cluster.cluster_id.is_expandable().into());
                if let Some(avg) = cluster.price.as_ref().and_then(|p| p.avg) {
                    properties.insert("price_avg".into(), avg.into());
                }
                Some(MapFeature {
                    id: Some(cluster.cluster_id.to_string()),
                    geometry: Geometry::Point(location),
                    properties,
                })
            }
        }
    }
}

impl Listing {
    pub fn to_map_feature(&self) -> MapFeature {
        let mut properties = self.properties.clone();
        properties.insert("type".into(), "individual".into());
        properties.insert("id".into(), self.id.clone().into());
        MapFeature {
            id: Some(self.id.clone()),
            geometry: Geometry::Point(self.location),
            properties,
        }
    }
}

/// Decode a FeatureCollection, skipping (and logging) malformed members
pub fn decode_collection(bytes: &[u8]) -> Result<Vec<Feature>> {
    #[cfg(feature = "profiling")]
    profiling::scope!("feature::decode_collection");

    let collection: Value = serde_json::from_slice(bytes)?;
    let raw_features = geojson::features(&collection)?;

    let mut features = Vec::with_capacity(raw_features.len());
    for (index, raw) in raw_features.iter().enumerate() {
        match Feature::decode(raw) {
            Ok(feature) => features.push(feature),
            Err(err) => tracing::warn!("Skipping feature {index}: {err}"),
        }
    }
    Ok(features)
}

/// A geometry-plus-attributes record as handed to the rendering engine
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapFeature {
    pub id: Option<String>,
    pub geometry: Geometry<f64>,
    pub properties: Map<String, Value>,
}

impl MapFeature {
    /// String form of a property, if present
    pub fn property_str(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(value_to_string)
    }
}
