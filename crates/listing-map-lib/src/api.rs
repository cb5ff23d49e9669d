//! Backend query types and the fetch seam
//!
//! The backend performs the actual spatial clustering and statistical aggregation; this
//! module only describes what is asked of it.

use crate::{ClusterId, DataSource, Feature, Region, RegionLevel, RegionStatistics, Result, normalize_name};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// Query parameters in request order
pub type QueryParams = Vec<(&'static str, String)>;

/// West/south/east/north bounding rectangle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// `west,south,east,north`
    pub fn to_param(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
    }
}

impl From<Rect<f64>> for BBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Optional inclusive numeric range
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeFilter {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Attribute filters shared by point and member queries
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilters {
    pub year: Option<i32>,
    pub price: RangeFilter,
    pub area: RangeFilter,
}

impl ListingFilters {
    fn push_params(&self, params: &mut QueryParams) {
        if let Some(year) = self.year {
            params.push(("year", year.to_string()));
        }
        let ranges = [
            ("price_min", self.price.min),
            ("price_max", self.price.max),
            ("area_min", self.area.min),
            ("area_max", self.area.max),
        ];
        params.extend(
            ranges
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v.to_string()))),
        );
    }
}

/// Points and clusters inside a viewport
#[derive(Clone, Debug, PartialEq)]
pub struct PointQuery {
    pub bbox: BBox,
    pub zoom: f64,
    pub data_source: DataSource,
    /// Restrict to one region (by name)
    pub region: Option<String>,
    pub filters: ListingFilters,
}

impl PointQuery {
    pub fn params(&self) -> QueryParams {
        let mut params = vec![
            ("bbox", self.bbox.to_param()),
            ("zoom", self.zoom.to_string()),
            ("data_source", self.data_source.as_str().to_string()),
        ];
        if let Some(region) = &self.region {
            params.push(("region", region.clone()));
        }
        self.filters.push_params(&mut params);
        params
    }
}

/// Members of one cluster
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterMembersQuery {
    pub cluster_id: ClusterId,
    pub data_source: DataSource,
    pub zoom: f64,
    pub filters: ListingFilters,
}

impl ClusterMembersQuery {
    /// Path segments below the base URL
    pub fn path(&self) -> [&str; 3] {
        ["clusters", self.cluster_id.as_str(), "members"]
    }

    pub fn params(&self) -> QueryParams {
        let mut params = vec![
            ("data_source", self.data_source.as_str().to_string()),
            ("zoom", self.zoom.to_string()),
        ];
        self.filters.push_params(&mut params);
        params
    }
}

/// Aggregate statistics for one region, addressed by level and upper-cased name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatisticsQuery {
    pub level: RegionLevel,
    pub name: String,
}

impl StatisticsQuery {
    pub fn new(level: RegionLevel, name: &str) -> Self {
        Self {
            level,
            name: normalize_name(name),
        }
    }

    pub fn path(&self) -> [&str; 3] {
        ["statistics", self.level.as_str(), self.name.as_str()]
    }
}

/// The listings backend
#[allow(async_fn_in_trait)]
pub trait ListingsApi {
    async fn points(&self, query: &PointQuery) -> Result<Vec<Feature>>;

    async fn cluster_members(&self, query: &ClusterMembersQuery) -> Result<Vec<Feature>>;

    async fn region_statistics(&self, query: &StatisticsQuery) -> Result<RegionStatistics>;

    /// Fine-grained boundaries belonging to one coarse region
    async fn fine_regions(&self, parent_name: &str) -> Result<Vec<Region>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_param() {
        let bbox = BBox::new(14.4, 46.0, 14.6, 46.1);
        assert_eq!(bbox.to_param(), "14.4,46,14.6,46.1");
        assert_eq!(BBox::from(bbox.to_rect()), bbox);
    }

    #[test]
    fn test_point_query_params() {
        let query = PointQuery {
            bbox: BBox::new(14.0, 46.0, 15.0, 47.0),
            zoom: 15.0,
            data_source: DataSource::Rental,
            region: Some("LJUBLJANA".to_string()),
            filters: ListingFilters {
                year: Some(2024),
                price: RangeFilter {
                    min: Some(500.0),
                    max: None,
                },
                area: RangeFilter::default(),
            },
        };
        assert_eq!(
            query.params(),
            vec![
                ("bbox", "14,46,15,47".to_string()),
                ("zoom", "15".to_string()),
                ("data_source", "rental".to_string()),
                ("region", "LJUBLJANA".to_string()),
                ("year", "2024".to_string()),
                ("price_min", "500".to_string()),
            ]
        );
    }

    #[test]
    fn test_members_query() {
        let query = ClusterMembersQuery {
            cluster_id: ClusterId::from("b_9"),
            data_source: DataSource::Sale,
            zoom: 16.5,
            filters: ListingFilters::default(),
        };
        assert_eq!(query.path(), ["clusters", "b_9", "members"]);
        assert_eq!(
            query.params(),
            vec![("data_source", "sale".to_string()), ("zoom", "16.5".to_string())]
        );
    }

    #[test]
    fn test_statistics_query_normalizes_name() {
        let query = StatisticsQuery::new(RegionLevel::Coarse, " Ljubljana ");
        assert_eq!(query.path(), ["statistics", "coarse", "LJUBLJANA"]);
    }
}
