//! Listing Map Library - Scene-Graph State for Clustered Listings
//!
//! This library keeps a map rendering engine's mutable scene graph consistent with the
//! state of a large, dynamically-loaded set of real-estate listings. It does not draw
//! anything itself: every visual change is expressed as calls on a [`MapEngine`], issued
//! exclusively through the [`LayerRegistry`].
//!
//! # Architecture
//!
//! - **[`LayerRegistry`]**: Owns named sources and ordered layers, makes every mutation idempotent
//! - **[`ClusterExpansionEngine`]**: Collapsed/expanded state machine with a ring layout per cluster
//! - **[`RegionSelectionController`]**: Two-level region selection, hover, camera fitting and masking
//! - **[`ChoroplethClassifier`]**: Joins boundaries to statistics by name and buckets them into colors
//! - **[`MapSession`]**: Host-facing orchestration over a [`ListingsApi`] backend
//!
//! # Concurrency
//!
//! Everything runs on the host's single UI thread. Session events hand out tickets for
//! the fetches they need and never wait on them; results are applied as they arrive, and
//! stale ones are recognised by request tokens or selection generations and dropped
//! rather than cancelled.

mod api;
mod choropleth;
mod color;
mod config;
mod engine;
mod expansion;
mod feature;
mod geojson;
#[cfg(feature = "http")]
mod http;
pub mod layout;
mod region;
mod registry;
mod selection;
mod session;
mod statistics;
mod viewport;

// Public API exports
pub use api::{BBox, ClusterMembersQuery, ListingFilters, ListingsApi, PointQuery, RangeFilter, StatisticsQuery};
pub use choropleth::{ChoroplethClassifier, ColorLookup, JoinMatch, Thresholds, edit_distance, join_name};
pub use color::Rgba;
pub use config::{ApiConfig, ChoroplethConfig, Config, ExpansionConfig, RegionConfig, ViewportConfig};
pub use engine::{EngineCall, FitOptions, HeadlessEngine, Interaction, MapEngine};
pub use expansion::{
    Activation, ClusterExpansionEngine, ExpansionContext, ExpansionLayers, ExpansionManager,
    ExpansionOutcome, ExpansionRecord, ExpansionState, ExpansionTicket, ExpandedMember,
    MemberSelected, MemberSender,
};
pub use feature::{Cluster, ClusterId, ClusterKind, DataSource, Feature, Listing, MapFeature, PriceSummary, decode_collection};
#[cfg(feature = "http")]
pub use http::HttpListingsApi;
pub use region::{Region, RegionLevel, decode_regions, normalize_name};
pub use registry::{Filter, Layer, LayerGroup, LayerKind, LayerRegistry, PaintValue, Placement};
pub use selection::{
    COARSE_FILL, COARSE_HOVER, COARSE_LABELS, COARSE_MASK, COARSE_OUTLINE, COARSE_SELECTED, COARSE_SOURCE,
    FINE_FILL, FINE_HOVER, FINE_OUTLINE, FINE_SELECTED, FINE_SOURCE, RegionSelectionController,
    SelectionOutcome, SelectionState,
};
pub use session::{
    ClickOutcome, Fetches, LISTING_CLUSTER_COUNTS, LISTING_CLUSTERS, LISTING_POINTS, LISTINGS_SOURCE,
    MapSession, PointsTicket, StatisticsTicket,
};
pub use statistics::{Metrics, RegionStatistics};
pub use viewport::{RequestToken, Viewport, ViewportLoader};

pub use instant::{Duration, Instant};

/// Error types for the listing map core
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Empty result for {0}")]
    EmptyResult(String),

    #[error("Unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    #[error("Source {source_id} is still referenced by layer {layer_id}")]
    SourceInUse { source_id: String, layer_id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
