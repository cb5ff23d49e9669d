//! MapSession - host-facing orchestration
//!
//! The session owns the registry and every component that drives it, plus the active
//! data source, filters and statistics. Hosts forward camera changes, clicks and hovers.
//!
//! Every event is split in two. The `begin_*` half (and [`MapSession::settle_viewport`])
//! updates the scene graph at once and returns tickets for the fetches it needs; the
//! `apply_*` half takes a fetch result whenever it arrives. Responses overtaken by a newer
//! points fetch or a newer selection are dropped. The `async` methods run both halves
//! through the injected [`ListingsApi`] for hosts that are happy to wait.
//!
//! Invalidation events (a settled viewport, a data source or filter change, a new
//! region selection) collapse any expansion before fresh data is rendered.

use crate::engine::{Interaction, MapEngine};
use crate::selection::{COARSE_FILL, FINE_FILL};
use crate::{
    Activation, ChoroplethClassifier, ClusterExpansionEngine, ClusterId, ColorLookup, Config,
    DataSource, ExpansionContext, ExpansionOutcome, ExpansionTicket, Feature, Filter, Layer, LayerGroup, LayerKind,
    LayerRegistry, Listing, ListingFilters, ListingsApi, MapError, MapFeature, MemberSelected,
    MemberSender, PaintValue, Placement, PointQuery, Region, RegionLevel, RegionSelectionController,
    RegionStatistics, RequestToken, Result, SelectionOutcome, SelectionState, StatisticsQuery,
    Viewport, ViewportLoader,
};
use instant::Instant;
use lru::LruCache;
use std::num::NonZeroUsize;

pub const LISTINGS_SOURCE: &str = "listings";
pub const LISTING_POINTS: &str = "listing-points";
pub const LISTING_CLUSTERS: &str = "listing-clusters";
pub const LISTING_CLUSTER_COUNTS: &str = "listing-cluster-counts";

const STATISTICS_CACHE_SIZE: usize = 32;

/// What a click resolved to
#[derive(Clone, Debug, PartialEq)]
pub enum ClickOutcome {
    /// An expanded member was clicked; the notification has been sent
    Member(MemberSelected),
    Expansion(ExpansionOutcome),
    Region(SelectionOutcome),
    /// An individual listing marker was clicked
    Listing(Listing),
    Ignored,
}

/// A points fetch; its result goes to [`MapSession::apply_points`]
#[derive(Clone, Debug, PartialEq)]
pub struct PointsTicket {
    pub query: PointQuery,
    pub token: RequestToken,
}

/// A statistics fetch; its result goes to [`MapSession::apply_statistics`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatisticsTicket {
    pub query: StatisticsQuery,
    /// Selection generation the fetch was issued for
    generation: u64,
}

/// Fetches an event left outstanding. They are independent and may complete in any order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Fetches {
    /// Coarse parent whose fine regions go to [`MapSession::apply_fine_regions`]
    pub fine_regions: Option<String>,
    pub points: Option<PointsTicket>,
    pub statistics: Option<StatisticsTicket>,
}

impl Fetches {
    pub fn is_empty(&self) -> bool {
        self.fine_regions.is_none() && self.points.is_none() && self.statistics.is_none()
    }
}

pub struct MapSession<E: MapEngine, A: ListingsApi> {
    registry: LayerRegistry<E>,
    api: A,
    config: Config,
    expansion: ClusterExpansionEngine,
    selection: RegionSelectionController,
    classifier: ChoroplethClassifier,
    loader: ViewportLoader,
    data_source: DataSource,
    filters: ListingFilters,
    zoom: f64,
    /// Features of the last applied points response
    features: Vec<Feature>,
    statistics_cache: LruCache<StatisticsQuery, RegionStatistics>,
    statistics: Option<(StatisticsQuery, RegionStatistics)>,
    /// Bumped on every selection change; in-flight statistics carry the value they started with
    selection_generation: u64,
    color_lookup: Option<ColorLookup>,
}

impl<E: MapEngine, A: ListingsApi> MapSession<E, A> {
    pub fn new(engine: E, api: A, config: Config, notify: Option<MemberSender>) -> Self {
        let capacity = NonZeroUsize::new(STATISTICS_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry: LayerRegistry::new(engine),
            api,
            expansion: ClusterExpansionEngine::new(config.expansion.clone(), notify),
            selection: RegionSelectionController::new(config.regions.clone()),
            classifier: ChoroplethClassifier::new(&config.choropleth),
            loader: ViewportLoader::new(&config.viewport),
            config,
            data_source: DataSource::default(),
            filters: ListingFilters::default(),
            zoom: 0.0,
            features: Vec::new(),
            statistics_cache: LruCache::new(capacity),
            statistics: None,
            selection_generation: 0,
            color_lookup: None,
        }
    }

    pub fn registry(&self) -> &LayerRegistry<E> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LayerRegistry<E> {
        &mut self.registry
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn expansion(&self) -> &ClusterExpansionEngine {
        &self.expansion
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.selection()
    }

    pub fn regions(&self) -> &RegionSelectionController {
        &self.selection
    }

    pub fn data_source(&self) -> DataSource {
        self.data_source
    }

    pub fn filters(&self) -> &ListingFilters {
        &self.filters
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn statistics(&self) -> Option<&RegionStatistics> {
        self.statistics.as_ref().map(|(_, stats)| stats)
    }

    pub fn color_lookup(&self) -> Option<&ColorLookup> {
        self.color_lookup.as_ref()
    }

    /// Draw the coarse boundaries; call once before any selection
    pub fn install_regions(&mut self, coarse: Vec<Region>) {
        self.selection.install_coarse(&mut self.registry, coarse);
    }

    /// Install the complete set of fine boundaries, for every coarse parent
    pub fn install_fine_regions(&mut self, fine: Vec<Region>) {
        self.selection.install_fine(&mut self.registry, fine);
        self.recolor();
    }

    pub fn viewport_changed(&mut self, viewport: Viewport, now: Instant) {
        self.loader.viewport_changed(viewport, now);
    }

    /// Settle the viewport if it has been still long enough. A settled viewport collapses
    /// any expansion and leaves a points fetch for the caller.
    pub fn settle_viewport(&mut self, now: Instant) -> Option<PointsTicket> {
        let (viewport, token) = self.loader.poll(now)?;
        self.zoom = viewport.zoom;
        self.selection.zoom_changed(&mut self.registry, viewport.zoom);
        self.expansion.collapse_all(&mut self.registry);
        Some(self.points_ticket(viewport, token))
    }

    /// Fetch points once the viewport has settled. Returns whether new points were rendered.
    pub async fn poll_viewport(&mut self, now: Instant) -> bool {
        match self.settle_viewport(now) {
            Some(ticket) => self.fetch_points(ticket).await,
            None => false,
        }
    }

    /// Points fetch for the last settled viewport, e.g. after a filter change
    pub fn begin_refresh(&mut self) -> Option<PointsTicket> {
        let (viewport, token) = self.loader.refresh()?;
        Some(self.points_ticket(viewport, token))
    }

    /// Refetch points for the last settled viewport
    pub async fn refresh_points(&mut self) -> bool {
        match self.begin_refresh() {
            Some(ticket) => self.fetch_points(ticket).await,
            None => false,
        }
    }

    fn points_ticket(&self, viewport: Viewport, token: RequestToken) -> PointsTicket {
        PointsTicket {
            query: PointQuery {
                bbox: viewport.bbox,
                zoom: viewport.zoom,
                data_source: self.data_source,
                region: self.region_scope(),
                filters: self.filters.clone(),
            },
            token,
        }
    }

    async fn fetch_points(&mut self, ticket: PointsTicket) -> bool {
        let result = self.api.points(&ticket.query).await;
        self.apply_points(ticket.token, result)
    }

    /// Render a points response unless a newer points fetch has been issued since.
    /// Returns whether it was rendered.
    pub fn apply_points(&mut self, token: RequestToken, result: Result<Vec<Feature>>) -> bool {
        if !self.loader.accept(token) {
            return false;
        }
        match result {
            Ok(features) => {
                self.render_points(features);
                true
            }
            Err(err) => {
                tracing::warn!("Failed to load points: {err}");
                false
            }
        }
    }

    /// Name of the coarse region points are scoped to
    fn region_scope(&self) -> Option<String> {
        let selected = self.selection.selection().selected_coarse.as_deref();
        selected
            .and_then(|id| self.selection.coarse_regions().iter().find(|r| r.id == id))
            .map(Region::name_key)
            .or_else(|| self.selection.scope().map(str::to_string))
    }

    fn render_points(&mut self, features: Vec<Feature>) {
        #[cfg(feature = "profiling")]
        profiling::scope!("MapSession::render_points");

        let map_features: Vec<MapFeature> = features.iter().filter_map(Feature::to_map_feature).collect();
        tracing::debug!("Rendering {} of {} features", map_features.len(), features.len());
        self.registry.upsert_source(LISTINGS_SOURCE, map_features);

        let color = PaintValue::color(self.config.expansion.member_color);
        let layers = [
            Layer::new(LISTING_POINTS, LISTINGS_SOURCE, LayerKind::Circle, LayerGroup::Points)
                .with_paint("circle-color", color.clone())
                .with_paint("circle-radius", PaintValue::number(5.0))
                .with_filter(Filter::eq("type", "individual")),
            Layer::new(LISTING_CLUSTERS, LISTINGS_SOURCE, LayerKind::Circle, LayerGroup::Clusters)
                .with_paint("circle-color", color)
                .with_paint("circle-radius", PaintValue::number(14.0))
                .with_filter(Filter::eq("type", "cluster")),
            Layer::new(LISTING_CLUSTER_COUNTS, LISTINGS_SOURCE, LayerKind::Symbol, LayerGroup::Clusters)
                .with_filter(Filter::eq("type", "cluster")),
        ];
        for layer in layers {
            self.registry.add_layer(layer, Placement::Top);
        }
        self.registry.bind(LISTING_POINTS, Interaction::Click);
        self.registry.bind(LISTING_CLUSTERS, Interaction::Click);
        self.features = features;
    }

    fn expansion_context(&self) -> ExpansionContext {
        ExpansionContext {
            data_source: self.data_source,
            zoom: self.zoom,
            filters: self.filters.clone(),
        }
    }

    /// First half of a cluster activation, for a cluster of the last points response
    pub fn begin_cluster(&mut self, cluster_id: &ClusterId) -> Result<Activation> {
        let location = self
            .features
            .iter()
            .filter_map(Feature::as_cluster)
            .find(|cluster| &cluster.cluster_id == cluster_id)
            .ok_or_else(|| MapError::UnknownCluster(cluster_id.to_string()))?
            .location;
        let context = self.expansion_context();
        Ok(self.expansion.begin(&mut self.registry, cluster_id, location, &context))
    }

    pub fn complete_cluster(&mut self, ticket: ExpansionTicket, members: Result<Vec<Feature>>) -> ExpansionOutcome {
        self.expansion.complete(&mut self.registry, ticket, members)
    }

    /// Toggle the expansion of a cluster from the last points response
    pub async fn activate_cluster(&mut self, cluster_id: &ClusterId) -> Result<ExpansionOutcome> {
        Ok(match self.begin_cluster(cluster_id)? {
            Activation::Collapsed(cluster_id) => ExpansionOutcome::Collapsed { cluster_id },
            Activation::NotExpandable(cluster_id) => ExpansionOutcome::NotExpandable { cluster_id },
            Activation::Pending(ticket) => {
                let members = self.api.cluster_members(&ticket.query).await;
                self.complete_cluster(ticket, members)
            }
        })
    }

    /// Select a coarse region and list the fetches it needs
    pub fn begin_select_coarse(&mut self, id: &str) -> Result<(SelectionOutcome, Fetches)> {
        let outcome = self.selection.select_coarse(&mut self.registry, id)?;
        let fetches = self.selection_changed(&outcome);
        Ok((outcome, fetches))
    }

    pub async fn select_coarse(&mut self, id: &str) -> Result<SelectionOutcome> {
        let (outcome, fetches) = self.begin_select_coarse(id)?;
        self.fetch(fetches).await;
        Ok(outcome)
    }

    pub fn begin_select_fine(&mut self, id: &str) -> Result<(SelectionOutcome, Fetches)> {
        let outcome = self.selection.select_fine(&mut self.registry, id)?;
        let fetches = self.selection_changed(&outcome);
        Ok((outcome, fetches))
    }

    pub async fn select_fine(&mut self, id: &str) -> Result<SelectionOutcome> {
        let (outcome, fetches) = self.begin_select_fine(id)?;
        self.fetch(fetches).await;
        Ok(outcome)
    }

    pub fn begin_reset_selection(&mut self) -> Fetches {
        self.selection.reset(&mut self.registry);
        self.selection_changed(&SelectionOutcome::default())
    }

    pub async fn reset_selection(&mut self) {
        let fetches = self.begin_reset_selection();
        self.fetch(fetches).await;
    }

    /// Invalidate everything derived from the previous selection
    fn selection_changed(&mut self, outcome: &SelectionOutcome) -> Fetches {
        self.selection_generation += 1;
        self.statistics = None;
        self.recolor();
        self.expansion.collapse_all(&mut self.registry);
        Fetches {
            fine_regions: outcome.fine_parent.clone(),
            points: self.begin_refresh(),
            statistics: outcome.statistics.clone().and_then(|query| self.begin_statistics(query)),
        }
    }

    /// Show cached statistics right away, or hand out a ticket to fetch them
    fn begin_statistics(&mut self, query: StatisticsQuery) -> Option<StatisticsTicket> {
        if let Some(stats) = self.statistics_cache.get(&query).cloned() {
            tracing::debug!("Reusing cached statistics for {}", query.name);
            self.statistics = Some((query, stats));
            self.recolor();
            return None;
        }
        Some(StatisticsTicket {
            query,
            generation: self.selection_generation,
        })
    }

    /// Cache a statistics response and show it unless the selection changed since the
    /// ticket was issued. Returns whether it was shown.
    pub fn apply_statistics(&mut self, ticket: StatisticsTicket, result: Result<RegionStatistics>) -> bool {
        let stats = match result {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!("Failed to load statistics for {}: {err}", ticket.query.name);
                return false;
            }
        };
        self.statistics_cache.put(ticket.query.clone(), stats.clone());
        if ticket.generation != self.selection_generation {
            tracing::debug!("Dropping statistics for {}: selection changed", ticket.query.name);
            return false;
        }
        self.statistics = Some((ticket.query, stats));
        self.recolor();
        true
    }

    /// Merge the fine regions of `parent_name`; recolors in case statistics arrived first
    pub fn apply_fine_regions(&mut self, parent_name: &str, result: Result<Vec<Region>>) -> bool {
        match result {
            Ok(regions) => {
                self.selection.merge_fine_regions(&mut self.registry, parent_name, regions);
                self.recolor();
                true
            }
            Err(err) => {
                tracing::warn!("Failed to load fine regions of {parent_name}: {err}");
                false
            }
        }
    }

    /// Run outstanding fetches one after another through the session's backend
    pub async fn fetch(&mut self, fetches: Fetches) {
        if let Some(parent) = fetches.fine_regions {
            let result = self.api.fine_regions(&parent).await;
            self.apply_fine_regions(&parent, result);
        }
        if let Some(ticket) = fetches.points {
            self.fetch_points(ticket).await;
        }
        if let Some(ticket) = fetches.statistics {
            let result = self.api.region_statistics(&ticket.query).await;
            self.apply_statistics(ticket, result);
        }
    }

    /// Repaint region fills from the current statistics and category
    fn recolor(&mut self) {
        let fallback = PaintValue::color(self.config.regions.fill_color);
        let Some((query, stats)) = &self.statistics else {
            self.color_lookup = None;
            self.registry.set_paint(COARSE_FILL, "fill-color", fallback.clone());
            self.registry.set_paint(FINE_FILL, "fill-color", fallback);
            return;
        };

        let choropleth = &self.config.choropleth;
        let table = stats.table(self.data_source, &choropleth.window, &choropleth.metric);
        let (target, other, regions): (_, _, Vec<&Region>) = match self.selection.scoped_fine_regions() {
            Some(fine) => (FINE_FILL, COARSE_FILL, fine),
            None if query.level == RegionLevel::Fine => {
                (FINE_FILL, COARSE_FILL, self.selection.fine_regions().iter().collect())
            }
            None => (COARSE_FILL, FINE_FILL, self.selection.coarse_regions().iter().collect()),
        };
        let lookup = self.classifier.classify(
            regions.iter().map(|r| (r.id.as_str(), r.name.as_str())),
            &table,
            self.data_source,
        );
        if table.is_empty() {
            tracing::debug!("No {} statistics for {}", self.data_source, query.name);
        }
        self.registry.set_paint(target, "fill-color", lookup.to_paint("id"));
        self.registry.set_paint(other, "fill-color", fallback);
        self.color_lookup = Some(lookup);
    }

    /// Switch the listing category: invalidate and recolor, leaving a points fetch
    pub fn begin_data_source(&mut self, data_source: DataSource) -> Fetches {
        if self.data_source == data_source {
            return Fetches::default();
        }
        tracing::info!("Switching data source to {data_source}");
        self.data_source = data_source;
        self.expansion.collapse_all(&mut self.registry);
        self.recolor();
        Fetches {
            points: self.begin_refresh(),
            ..Fetches::default()
        }
    }

    pub async fn set_data_source(&mut self, data_source: DataSource) {
        let fetches = self.begin_data_source(data_source);
        self.fetch(fetches).await;
    }

    pub fn begin_filters(&mut self, filters: ListingFilters) -> Fetches {
        if self.filters == filters {
            return Fetches::default();
        }
        self.filters = filters;
        self.expansion.collapse_all(&mut self.registry);
        Fetches {
            points: self.begin_refresh(),
            ..Fetches::default()
        }
    }

    pub async fn set_filters(&mut self, filters: ListingFilters) {
        let fetches = self.begin_filters(filters);
        self.fetch(fetches).await;
    }

    /// Route a click on `layer`'s feature `index` to the component owning the layer
    pub async fn handle_click(&mut self, layer: &str, index: usize) -> Result<ClickOutcome> {
        if !self.registry.is_bound(layer, Interaction::Click) {
            return Ok(ClickOutcome::Ignored);
        }
        if self.expansion.owns_layer(layer) {
            return Ok(self
                .expansion
                .handle_click(layer, index)
                .map_or(ClickOutcome::Ignored, ClickOutcome::Member));
        }
        if let Some(level) = RegionSelectionController::level_of_layer(layer) {
            let Some(id) = RegionSelectionController::region_id_at(&self.registry, layer, index) else {
                return Ok(ClickOutcome::Ignored);
            };
            let outcome = match level {
                RegionLevel::Coarse => self.select_coarse(&id).await?,
                RegionLevel::Fine => self.select_fine(&id).await?,
            };
            return Ok(ClickOutcome::Region(outcome));
        }

        let Some(feature) = self.registry.feature_at(layer, index) else {
            return Ok(ClickOutcome::Ignored);
        };
        match layer {
            LISTING_CLUSTERS => {
                let Some(cluster_id) = feature.property_str("cluster_id").map(ClusterId::from) else {
                    return Ok(ClickOutcome::Ignored);
                };
                Ok(ClickOutcome::Expansion(self.activate_cluster(&cluster_id).await?))
            }
            LISTING_POINTS => {
                let id = feature.property_str("id");
                Ok(self
                    .features
                    .iter()
                    .filter_map(Feature::as_listing)
                    .find(|listing| Some(&listing.id) == id.as_ref())
                    .cloned()
                    .map_or(ClickOutcome::Ignored, ClickOutcome::Listing))
            }
            _ => Ok(ClickOutcome::Ignored),
        }
    }

    /// Route pointer movement; `None` means the pointer left `layer`.
    /// Returns whether a hover highlight is shown.
    pub fn handle_hover(&mut self, layer: &str, index: Option<usize>) -> bool {
        let interaction = if index.is_some() { Interaction::Hover } else { Interaction::Leave };
        if !self.registry.is_bound(layer, interaction) {
            return false;
        }
        let Some(level) = RegionSelectionController::level_of_layer(layer) else {
            return false;
        };
        match index {
            Some(index) => {
                let id = RegionSelectionController::region_id_at(&self.registry, layer, index);
                self.selection.hover(&mut self.registry, level, id.as_deref())
            }
            None => {
                self.selection.pointer_leave(&mut self.registry, level);
                false
            }
        }
    }
}
