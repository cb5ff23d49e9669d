//! `ListingsApi` over HTTP/JSON

use crate::api::QueryParams;
use crate::{
    ApiConfig, ClusterMembersQuery, Feature, ListingsApi, MapError, PointQuery, Region, RegionLevel,
    RegionStatistics, Result, StatisticsQuery, decode_collection, decode_regions, normalize_name,
};
use reqwest::Url;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HttpListingsApi {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpListingsApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| MapError::InvalidConfig(format!("api.base_url {:?}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(MapError::InvalidConfig(format!(
                "api.base_url {:?} cannot carry a path",
                config.base_url
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| MapError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Base URL plus percent-encoded path segments and query parameters
    fn endpoint(&self, segments: &[&str], params: &QueryParams) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        url
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>> {
        tracing::trace!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, is_timeout = e.is_timeout(), "Request failed");
            MapError::Http(format!("Request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Http(format!("HTTP {} from {url}", status.as_u16())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MapError::Http(format!("Failed to read response from {url}: {e}")))?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Response received");
        Ok(bytes.to_vec())
    }
}

impl ListingsApi for HttpListingsApi {
    async fn points(&self, query: &PointQuery) -> Result<Vec<Feature>> {
        let bytes = self.get(self.endpoint(&["points"], &query.params())).await?;
        decode_collection(&bytes)
    }

    async fn cluster_members(&self, query: &ClusterMembersQuery) -> Result<Vec<Feature>> {
        let bytes = self.get(self.endpoint(&query.path(), &query.params())).await?;
        decode_collection(&bytes)
    }

    async fn region_statistics(&self, query: &StatisticsQuery) -> Result<RegionStatistics> {
        let bytes = self.get(self.endpoint(&query.path(), &Vec::new())).await?;
        RegionStatistics::from_json(&bytes)
    }

    async fn fine_regions(&self, parent_name: &str) -> Result<Vec<Region>> {
        let parent = normalize_name(parent_name);
        let bytes = self
            .get(self.endpoint(&["regions", "fine", parent.as_str()], &Vec::new()))
            .await?;
        decode_regions(&bytes, RegionLevel::Fine)
    }
}
