//! Cluster expansion
//!
//! A building-level cluster can be expanded into its individual members, drawn on one
//! or two rings around the cluster center with a spoke back to the center each. At most
//! one cluster is expanded at any time.
//!
//! Activation is split into [`ClusterExpansionEngine::begin`], which decides what to do
//! and hands out a ticket for the member fetch, and [`ClusterExpansionEngine::complete`],
//! which renders the fetched members. Each ticket carries a token; completing anything
//! but the latest ticket is a no-op, so overlapping activations cannot register
//! conflicting layers.

use crate::engine::{Interaction, MapEngine};
use crate::layout::{self, RingPosition};
use crate::{
    ClusterId, ClusterMembersQuery, DataSource, ExpansionConfig, Feature, Filter, Layer, LayerGroup,
    LayerKind, LayerRegistry, Listing, ListingFilters, ListingsApi, MapError, MapFeature, PaintValue,
    Placement, Result,
};
use geo::{Geometry, LineString, Point};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

const KIND_PROPERTY: &str = "expansion_kind";
const MEMBER_KIND: &str = "member";
const SPOKE_KIND: &str = "spoke";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionState {
    Collapsed,
    /// Members requested, response outstanding
    Expanding,
    Expanded,
}

/// Scene-graph ids of one expansion
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExpansionLayers {
    pub source: String,
    pub spokes: String,
    pub points: String,
}

impl ExpansionLayers {
    pub fn for_cluster(cluster_id: &ClusterId) -> Self {
        let source = format!("cluster-expansion-{cluster_id}");
        Self {
            spokes: format!("{source}-spokes"),
            points: format!("{source}-points"),
            source,
        }
    }

    /// Layer ids in removal order
    pub fn layer_ids(&self) -> [&str; 2] {
        [self.points.as_str(), self.spokes.as_str()]
    }

    pub fn contains(&self, layer: &str) -> bool {
        self.points == layer || self.spokes == layer
    }
}

/// A fetched member and where it was drawn
#[derive(Clone, Debug, PartialEq)]
pub struct ExpandedMember {
    pub listing: Listing,
    pub placement: RingPosition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpansionRecord {
    pub cluster_id: ClusterId,
    pub layers: ExpansionLayers,
    pub center: Point<f64>,
    pub members: Vec<ExpandedMember>,
}

/// Owned index of live expansions; `register` and `unregister` are its only mutations
#[derive(Debug, Default)]
pub struct ExpansionManager {
    records: HashMap<ClusterId, ExpansionRecord>,
}

impl ExpansionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning every record it displaced.
    ///
    /// Only one expansion may exist, so all other records are handed back for teardown.
    pub fn register(&mut self, record: ExpansionRecord) -> Vec<ExpansionRecord> {
        let displaced = self.drain();
        self.records.insert(record.cluster_id.clone(), record);
        displaced
    }

    pub fn unregister(&mut self, cluster_id: &ClusterId) -> Option<ExpansionRecord> {
        self.records.remove(cluster_id)
    }

    pub fn get(&self, cluster_id: &ClusterId) -> Option<&ExpansionRecord> {
        self.records.get(cluster_id)
    }

    pub fn contains(&self, cluster_id: &ClusterId) -> bool {
        self.records.contains_key(cluster_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn drain(&mut self) -> Vec<ExpansionRecord> {
        self.records.drain().map(|(_, record)| record).collect()
    }

    /// The live expansion, if any
    pub fn active(&self) -> Option<&ExpansionRecord> {
        self.records.values().next()
    }

    /// Record owning a layer id
    pub fn by_layer(&self, layer: &str) -> Option<&ExpansionRecord> {
        self.records.values().find(|record| record.layers.contains(layer))
    }
}

/// Emitted when an expanded member is clicked
#[derive(Clone, Debug, PartialEq)]
pub struct MemberSelected {
    pub cluster_id: ClusterId,
    /// The listing's own coordinates, not its position on the ring
    pub coordinates: Point<f64>,
    pub properties: Map<String, Value>,
}

pub type MemberSender = UnboundedSender<MemberSelected>;

/// What the member query is scoped by
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpansionContext {
    pub data_source: DataSource,
    pub zoom: f64,
    pub filters: ListingFilters,
}

/// An outstanding member fetch
#[derive(Clone, Debug, PartialEq)]
pub struct ExpansionTicket {
    pub query: ClusterMembersQuery,
    pub cluster_location: Option<Point<f64>>,
    token: u64,
}

impl ExpansionTicket {
    pub fn cluster_id(&self) -> &ClusterId {
        &self.query.cluster_id
    }
}

/// Result of [`ClusterExpansionEngine::begin`]
#[derive(Clone, Debug, PartialEq)]
pub enum Activation {
    /// The cluster was expanded and has been collapsed again
    Collapsed(ClusterId),
    /// District-level cluster; only summary information is available
    NotExpandable(ClusterId),
    /// Fetch the ticket's query and hand the result to `complete`
    Pending(ExpansionTicket),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpansionOutcome {
    Expanded { cluster_id: ClusterId, members: usize },
    Collapsed { cluster_id: ClusterId },
    NotExpandable { cluster_id: ClusterId },
    /// Fetch failed or returned nothing; the cluster stays collapsed
    Failed { cluster_id: ClusterId },
    /// A newer activation or an invalidation replaced this one
    Superseded { cluster_id: ClusterId },
}

pub struct ClusterExpansionEngine {
    config: ExpansionConfig,
    manager: ExpansionManager,
    notify: Option<MemberSender>,
    pending: Option<(ClusterId, u64)>,
    next_token: u64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ClusterExpansionEngine {
    pub fn new(config: ExpansionConfig, notify: Option<MemberSender>) -> Self {
        Self {
            config,
            manager: ExpansionManager::new(),
            notify,
            pending: None,
            next_token: 0,
        }
    }

    pub fn manager(&self) -> &ExpansionManager {
        &self.manager
    }

    pub fn state(&self, cluster_id: &ClusterId) -> ExpansionState {
        if self.manager.contains(cluster_id) {
            ExpansionState::Expanded
        } else if self.pending.as_ref().is_some_and(|(id, _)| id == cluster_id) {
            ExpansionState::Expanding
        } else {
            ExpansionState::Collapsed
        }
    }

    pub fn owns_layer(&self, layer: &str) -> bool {
        self.manager.by_layer(layer).is_some()
    }

    /// First half of an activation: toggle, refuse, or start a member fetch.
    ///
    /// Starting a fetch collapses every other expansion and supersedes any fetch still
    /// in flight.
    pub fn begin<E: MapEngine>(
        &mut self,
        registry: &mut LayerRegistry<E>,
        cluster_id: &ClusterId,
        cluster_location: Option<Point<f64>>,
        context: &ExpansionContext,
    ) -> Activation {
        if self.manager.contains(cluster_id) {
            self.collapse(registry, cluster_id);
            return Activation::Collapsed(cluster_id.clone());
        }
        if !cluster_id.is_expandable() {
            tracing::debug!("Cluster {cluster_id} is not expandable");
            return Activation::NotExpandable(cluster_id.clone());
        }

        self.collapse_all(registry);
        self.next_token += 1;
        self.pending = Some((cluster_id.clone(), self.next_token));
        tracing::debug!("Expanding cluster {cluster_id} at zoom {}", context.zoom);

        Activation::Pending(ExpansionTicket {
            query: ClusterMembersQuery {
                cluster_id: cluster_id.clone(),
                data_source: context.data_source,
                zoom: context.zoom,
                filters: context.filters.clone(),
            },
            cluster_location,
            token: self.next_token,
        })
    }

    /// Second half of an activation: render the fetched members
    pub fn complete<E: MapEngine>(
        &mut self,
        registry: &mut LayerRegistry<E>,
        ticket: ExpansionTicket,
        members: Result<Vec<Feature>>,
    ) -> ExpansionOutcome {
        let cluster_id = ticket.query.cluster_id.clone();
        if self.pending.as_ref().map(|(_, token)| *token) != Some(ticket.token) {
            tracing::debug!("Discarding superseded expansion of {cluster_id}");
            return ExpansionOutcome::Superseded { cluster_id };
        }
        self.pending = None;

        let members = match members.and_then(|features| individual_members(&cluster_id, features)) {
            Ok(members) => members,
            Err(err) => {
                tracing::warn!("Failed to fetch members of {cluster_id}: {err}");
                return ExpansionOutcome::Failed { cluster_id };
            }
        };

        let locations: Vec<Point<f64>> = members.iter().map(|m| m.location).collect();
        let Some(center) = layout::resolve_center(ticket.cluster_location, &locations) else {
            tracing::warn!("Cannot place members of {cluster_id}: no usable coordinates");
            return ExpansionOutcome::Failed { cluster_id };
        };

        let positions = layout::arrange(center, members.len(), ticket.query.zoom, &self.config);
        let members: Vec<ExpandedMember> = members
            .into_iter()
            .zip(positions)
            .map(|(listing, placement)| ExpandedMember { listing, placement })
            .collect();

        let record = ExpansionRecord {
            layers: ExpansionLayers::for_cluster(&cluster_id),
            cluster_id: cluster_id.clone(),
            center,
            members,
        };
        self.render(registry, &record);
        let count = record.members.len();
        for displaced in self.manager.register(record) {
            tracing::warn!("Tearing down displaced expansion {}", displaced.cluster_id);
            registry.teardown(&displaced.layers.layer_ids(), &displaced.layers.source);
        }
        tracing::info!("Expanded cluster {cluster_id} into {count} members");
        ExpansionOutcome::Expanded {
            cluster_id,
            members: count,
        }
    }

    /// `begin` and `complete` around one member fetch
    pub async fn activate<E: MapEngine, A: ListingsApi>(
        &mut self,
        registry: &mut LayerRegistry<E>,
        api: &A,
        cluster_id: &ClusterId,
        cluster_location: Option<Point<f64>>,
        context: &ExpansionContext,
    ) -> ExpansionOutcome {
        match self.begin(registry, cluster_id, cluster_location, context) {
            Activation::Collapsed(cluster_id) => ExpansionOutcome::Collapsed { cluster_id },
            Activation::NotExpandable(cluster_id) => ExpansionOutcome::NotExpandable { cluster_id },
            Activation::Pending(ticket) => {
                let members = api.cluster_members(&ticket.query).await;
                self.complete(registry, ticket, members)
            }
        }
    }

    /// Members first so a points-layer feature index is a member index
    fn render<E: MapEngine>(&self, registry: &mut LayerRegistry<E>, record: &ExpansionRecord) {
        let mut features: Vec<MapFeature> = record
            .members
            .iter()
            .map(|member| {
                let mut feature = member.listing.to_map_feature();
                feature.geometry = Geometry::Point(member.placement.position);
                feature.properties.insert(KIND_PROPERTY.into(), MEMBER_KIND.into());
                feature.properties.insert("ring".into(), serde_json::json!(member.placement.ring));
                feature
            })
            .collect();
        features.extend(record.members.iter().map(|member| {
            let mut properties = Map::new();
            properties.insert(KIND_PROPERTY.into(), SPOKE_KIND.into());
            MapFeature {
                id: None,
                geometry: Geometry::LineString(LineString::from(vec![
                    record.center.0,
                    member.placement.position.0,
                ])),
                properties,
            }
        }));

        let layers = &record.layers;
        registry.upsert_source(&layers.source, features);
        registry.add_layer(
            Layer::new(&layers.spokes, &layers.source, LayerKind::Line, LayerGroup::Expansion)
                .with_paint("line-color", PaintValue::color(self.config.spoke_color))
                .with_paint("line-width", PaintValue::number(1.0))
                .with_filter(Filter::eq(KIND_PROPERTY, SPOKE_KIND)),
            Placement::Top,
        );
        registry.add_layer(
            Layer::new(&layers.points, &layers.source, LayerKind::Circle, LayerGroup::Expansion)
                .with_paint("circle-color", PaintValue::color(self.config.member_color))
                .with_paint("circle-radius", PaintValue::number(6.0))
                .with_filter(Filter::eq(KIND_PROPERTY, MEMBER_KIND)),
            Placement::Above(layers.spokes.clone()),
        );
        registry.bind(&layers.points, Interaction::Click);
    }

    /// Tear down one expansion. Returns `false` if it was not expanded.
    pub fn collapse<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, cluster_id: &ClusterId) -> bool {
        let Some(record) = self.manager.unregister(cluster_id) else {
            return false;
        };
        registry.teardown(&record.layers.layer_ids(), &record.layers.source);
        tracing::debug!("Collapsed cluster {cluster_id}");
        true
    }

    /// Invalidation: tear down every expansion and forget any fetch in flight
    pub fn collapse_all<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>) -> usize {
        if let Some((cluster_id, _)) = self.pending.take() {
            tracing::debug!("Abandoning pending expansion of {cluster_id}");
        }
        let records = self.manager.drain();
        for record in &records {
            registry.teardown(&record.layers.layer_ids(), &record.layers.source);
        }
        records.len()
    }

    /// Route a click on an expansion layer. Returns the notification that was sent.
    pub fn handle_click(&self, layer: &str, feature_index: usize) -> Option<MemberSelected> {
        let record = self.manager.by_layer(layer)?;
        if layer != record.layers.points {
            return None;
        }
        let member = record.members.get(feature_index)?;
        let event = MemberSelected {
            cluster_id: record.cluster_id.clone(),
            coordinates: member.listing.location,
            properties: member.listing.properties.clone(),
        };
        if let Some(notify) = &self.notify
            && notify.send(event.clone()).is_err()
        {
            tracing::debug!("Member selection receiver is gone");
        }
        Some(event)
    }
}

/// Individual listings of a member response; a response without any is an error
fn individual_members(cluster_id: &ClusterId, features: Vec<Feature>) -> Result<Vec<Listing>> {
    let members: Vec<Listing> = features
        .into_iter()
        .filter_map(|feature| match feature {
            Feature::Individual(listing) => Some(listing),
            Feature::Cluster(_) => None,
        })
        .collect();
    if members.is_empty() {
        return Err(MapError::EmptyResult(format!("members of cluster {cluster_id}")));
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, HeadlessEngine};
    use crate::{Cluster, PointQuery, Region, RegionStatistics, StatisticsQuery};
    use tokio::sync::mpsc;

    fn listing(id: usize, x: f64, y: f64) -> Feature {
        let mut properties = Map::new();
        properties.insert("price".into(), (1000 * id).into());
        Feature::Individual(Listing {
            id: id.to_string(),
            location: Point::new(x, y),
            properties,
        })
    }

    fn members(n: usize) -> Vec<Feature> {
        (0..n).map(|i| listing(i, 14.5 + i as f64 * 1e-5, 46.05)).collect()
    }

    fn context() -> ExpansionContext {
        ExpansionContext {
            data_source: DataSource::Rental,
            zoom: 16.0,
            filters: ListingFilters::default(),
        }
    }

    fn setup() -> (ClusterExpansionEngine, LayerRegistry<HeadlessEngine>) {
        (
            ClusterExpansionEngine::new(ExpansionConfig::default(), None),
            LayerRegistry::new(HeadlessEngine::new()),
        )
    }

    fn expand(
        engine: &mut ClusterExpansionEngine,
        registry: &mut LayerRegistry<HeadlessEngine>,
        id: &str,
        n: usize,
    ) -> ExpansionOutcome {
        let Activation::Pending(ticket) = engine.begin(registry, &ClusterId::from(id), None, &context()) else {
            panic!("expected a pending activation");
        };
        engine.complete(registry, ticket, Ok(members(n)))
    }

    struct FakeApi {
        members: Vec<Feature>,
    }

    impl ListingsApi for FakeApi {
        async fn points(&self, _query: &PointQuery) -> Result<Vec<Feature>> {
            Ok(Vec::new())
        }

        async fn cluster_members(&self, query: &ClusterMembersQuery) -> Result<Vec<Feature>> {
            assert_eq!(query.data_source, DataSource::Rental);
            Ok(self.members.clone())
        }

        async fn region_statistics(&self, _query: &StatisticsQuery) -> Result<RegionStatistics> {
            Ok(RegionStatistics::default())
        }

        async fn fine_regions(&self, _parent_name: &str) -> Result<Vec<Region>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_layer_ids() {
        let layers = ExpansionLayers::for_cluster(&ClusterId::from("b_7"));
        assert_eq!(layers.source, "cluster-expansion-b_7");
        assert_eq!(layers.layer_ids(), ["cluster-expansion-b_7-points", "cluster-expansion-b_7-spokes"]);
    }

    #[test]
    fn test_expand_renders_layer_pair() {
        let (mut engine, mut registry) = setup();
        let outcome = expand(&mut engine, &mut registry, "b_1", 4);
        assert_eq!(
            outcome,
            ExpansionOutcome::Expanded {
                cluster_id: ClusterId::from("b_1"),
                members: 4
            }
        );
        assert_eq!(engine.state(&ClusterId::from("b_1")), ExpansionState::Expanded);
        assert_eq!(
            registry.layer_ids(),
            vec!["cluster-expansion-b_1-spokes", "cluster-expansion-b_1-points"]
        );
        // 4 members plus 4 spokes
        assert_eq!(registry.source_features("cluster-expansion-b_1").unwrap().len(), 8);
        assert!(registry.is_bound("cluster-expansion-b_1-points", Interaction::Click));
        assert!(!registry.is_bound("cluster-expansion-b_1-points", Interaction::Hover));
    }

    #[test]
    fn test_center_falls_back_to_member_mean() {
        let (mut engine, mut registry) = setup();
        expand(&mut engine, &mut registry, "b_1", 3);
        let record = engine.manager().get(&ClusterId::from("b_1")).unwrap();
        assert!((record.center.x() - 14.50001).abs() < 1e-9);
        assert!((record.center.y() - 46.05).abs() < 1e-9);
    }

    #[test]
    fn test_single_expansion_invariant() {
        let (mut engine, mut registry) = setup();
        expand(&mut engine, &mut registry, "b_a", 3);
        expand(&mut engine, &mut registry, "b_b", 5);

        assert_eq!(engine.manager().len(), 1);
        assert_eq!(engine.state(&ClusterId::from("b_a")), ExpansionState::Collapsed);
        assert_eq!(engine.state(&ClusterId::from("b_b")), ExpansionState::Expanded);
        assert!(!registry.has_source("cluster-expansion-b_a"));
        assert!(registry.orphan_sources().is_empty());
    }

    #[test]
    fn test_activate_twice_toggles() {
        let (mut engine, mut registry) = setup();
        expand(&mut engine, &mut registry, "b_1", 3);
        let activation = engine.begin(&mut registry, &ClusterId::from("b_1"), None, &context());
        assert_eq!(activation, Activation::Collapsed(ClusterId::from("b_1")));
        assert!(engine.manager().is_empty());
        assert!(registry.layer_ids().is_empty());
        assert!(!registry.has_source("cluster-expansion-b_1"));
        assert_eq!(
            registry.engine().count(|c| matches!(c, EngineCall::Unbind { .. })),
            1
        );
    }

    #[test]
    fn test_district_cluster_is_not_expandable() {
        let (mut engine, mut registry) = setup();
        let activation = engine.begin(&mut registry, &ClusterId::from("d_3"), None, &context());
        assert_eq!(activation, Activation::NotExpandable(ClusterId::from("d_3")));
        assert!(registry.engine().calls().is_empty());
    }

    #[test]
    fn test_failure_and_empty_result_leave_collapsed() {
        let (mut engine, mut registry) = setup();
        let id = ClusterId::from("b_1");

        let Activation::Pending(ticket) = engine.begin(&mut registry, &id, None, &context()) else {
            panic!("expected a pending activation");
        };
        assert_eq!(engine.state(&id), ExpansionState::Expanding);
        let outcome = engine.complete(&mut registry, ticket, Err(MapError::Http("503".to_string())));
        assert_eq!(outcome, ExpansionOutcome::Failed { cluster_id: id.clone() });
        assert_eq!(engine.state(&id), ExpansionState::Collapsed);

        assert_eq!(
            expand(&mut engine, &mut registry, "b_1", 0),
            ExpansionOutcome::Failed { cluster_id: id.clone() }
        );
        assert!(registry.engine().calls().is_empty());
    }

    #[test]
    fn test_member_response_without_listings_is_empty_result() {
        let id = ClusterId::from("b_1");
        assert!(matches!(
            individual_members(&id, Vec::new()),
            Err(MapError::EmptyResult(_))
        ));

        let Feature::Individual(listing) = listing(1, 14.5, 46.0) else {
            unreachable!()
        };
        let cluster = Feature::Cluster(Cluster {
            cluster_id: ClusterId::from("b_2"),
            location: Some(Point::new(14.5, 46.0)),
            point_count: 2,
            cluster_type: "building".to_string(),
            data_source: DataSource::Sale,
            price: None,
            member_ids: Vec::new(),
        });
        let members = individual_members(&id, vec![cluster.clone(), Feature::Individual(listing)]).unwrap();
        assert_eq!(members.len(), 1);
        assert!(matches!(
            individual_members(&id, vec![cluster]),
            Err(MapError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let (mut engine, mut registry) = setup();
        let Activation::Pending(first) = engine.begin(&mut registry, &ClusterId::from("b_1"), None, &context()) else {
            panic!("expected a pending activation");
        };
        let Activation::Pending(second) = engine.begin(&mut registry, &ClusterId::from("b_2"), None, &context()) else {
            panic!("expected a pending activation");
        };

        assert_eq!(
            engine.complete(&mut registry, first, Ok(members(3))),
            ExpansionOutcome::Superseded {
                cluster_id: ClusterId::from("b_1")
            }
        );
        assert!(registry.layer_ids().is_empty());

        engine.complete(&mut registry, second, Ok(members(3)));
        assert_eq!(engine.state(&ClusterId::from("b_2")), ExpansionState::Expanded);
        assert_eq!(engine.manager().len(), 1);
    }

    #[test]
    fn test_collapse_all_abandons_pending() {
        let (mut engine, mut registry) = setup();
        let Activation::Pending(ticket) = engine.begin(&mut registry, &ClusterId::from("b_1"), None, &context()) else {
            panic!("expected a pending activation");
        };
        engine.collapse_all(&mut registry);
        assert!(matches!(
            engine.complete(&mut registry, ticket, Ok(members(2))),
            ExpansionOutcome::Superseded { .. }
        ));
    }

    #[test]
    fn test_member_click_notifies_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ClusterExpansionEngine::new(ExpansionConfig::default(), Some(tx));
        let mut registry = LayerRegistry::new(HeadlessEngine::new());
        expand(&mut engine, &mut registry, "b_1", 3);

        let event = engine.handle_click("cluster-expansion-b_1-points", 2).unwrap();
        assert_eq!(event.cluster_id.as_str(), "b_1");
        assert_eq!(event.coordinates, Point::new(14.5 + 2.0 * 1e-5, 46.05));
        assert_eq!(rx.try_recv().unwrap(), event);

        assert!(engine.handle_click("cluster-expansion-b_1-spokes", 0).is_none());
        assert!(engine.handle_click("cluster-expansion-b_1-points", 3).is_none());
        assert!(engine.handle_click("listing-points", 0).is_none());
    }

    #[tokio::test]
    async fn test_activate_through_api() {
        let (mut engine, mut registry) = setup();
        let api = FakeApi { members: members(23) };
        let id = ClusterId::from("b_9");
        let outcome = engine
            .activate(&mut registry, &api, &id, Some(Point::new(14.5, 46.0)), &context())
            .await;
        assert_eq!(
            outcome,
            ExpansionOutcome::Expanded {
                cluster_id: id.clone(),
                members: 23
            }
        );
        let record = engine.manager().active().unwrap();
        assert_eq!(record.center, Point::new(14.5, 46.0));
        assert_eq!(record.members.len(), 23);

        let outcome = engine.activate(&mut registry, &api, &id, None, &context()).await;
        assert_eq!(outcome, ExpansionOutcome::Collapsed { cluster_id: id });
    }
}
