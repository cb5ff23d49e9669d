//! LayerRegistry - the only path into the rendering engine's scene graph
//!
//! Sources are named, wholesale-replaceable feature collections; layers are styled,
//! ordered renderings of one source. The registry keeps its own bookkeeping of both so
//! that every mutation issued by other components is safe to repeat:
//!
//! - adding an existing source or layer is a no-op
//! - mutating a missing layer is a no-op
//! - a source cannot be removed while a layer still references it
//!
//! Layers are kept in a fixed z-order by [`LayerGroup`]; within a group they stack in
//! insertion order unless placed relative to an anchor layer.

use crate::engine::{FitOptions, Interaction, MapEngine};
use crate::{MapError, MapFeature, Result, Rgba};
use geo::Rect;
use serde::Serialize;
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// Fixed z-order bands, bottom to top
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerGroup {
    BaseMap,
    AdminContext,
    FineBoundaries,
    Points,
    Clusters,
    Expansion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
    Symbol,
}

/// Value of a single paint property
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaintValue {
    Color { color: Rgba },
    Number { value: f64 },
    /// Per-feature color looked up by a property value, with a default for the rest
    ColorLookup {
        property: String,
        colors: BTreeMap<String, Rgba>,
        fallback: Rgba,
    },
    ColorWhenEquals {
        property: String,
        value: String,
        then: Rgba,
        otherwise: Rgba,
    },
}

impl PaintValue {
    pub fn color(color: Rgba) -> Self {
        PaintValue::Color { color }
    }

    pub fn number(value: f64) -> Self {
        PaintValue::Number { value }
    }

    /// Resolve the color this value paints a feature with
    pub fn resolve_color(&self, properties: &Map<String, Value>) -> Option<Rgba> {
        match self {
            PaintValue::Color { color } => Some(*color),
            PaintValue::Number { .. } => None,
            PaintValue::ColorLookup {
                property,
                colors,
                fallback,
            } => Some(
                property_string(properties, property)
                    .and_then(|key| colors.get(&key).copied())
                    .unwrap_or(*fallback),
            ),
            PaintValue::ColorWhenEquals {
                property,
                value,
                then,
                otherwise,
            } => Some(if property_string(properties, property).as_deref() == Some(value) {
                *then
            } else {
                *otherwise
            }),
        }
    }
}

/// Feature filter of a layer
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    #[default]
    Always,
    Never,
    Eq { property: String, value: String },
    In { property: String, values: Vec<String> },
}

impl Filter {
    pub fn eq(property: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq {
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        match self {
            Filter::Always => true,
            Filter::Never => false,
            Filter::Eq { property, value } => {
                property_string(properties, property).as_deref() == Some(value.as_str())
            }
            Filter::In { property, values } => property_string(properties, property)
                .is_some_and(|v| values.iter().any(|candidate| *candidate == v)),
        }
    }
}

fn property_string(properties: &Map<String, Value>, key: &str) -> Option<String> {
    match properties.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A styled rendering of one source
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layer {
    pub id: String,
    pub source: String,
    pub kind: LayerKind,
    pub group: LayerGroup,
    pub paint: BTreeMap<String, PaintValue>,
    pub filter: Filter,
    pub visible: bool,
    pub min_zoom: Option<f64>,
}

impl Layer {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        kind: LayerKind,
        group: LayerGroup,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            kind,
            group,
            paint: BTreeMap::new(),
            filter: Filter::Always,
            visible: true,
            min_zoom: None,
        }
    }

    pub fn with_paint(mut self, property: &str, value: PaintValue) -> Self {
        self.paint.insert(property.to_string(), value);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_min_zoom(mut self, zoom: f64) -> Self {
        self.min_zoom = Some(zoom);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Where a new layer goes in the stack
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Topmost position within the layer's own group
    Top,
    /// Directly above the named layer
    Above(String),
    /// Directly below the named layer
    Below(String),
}

struct SourceEntry {
    features: Vec<MapFeature>,
}

/// Bookkeeping front for a [`MapEngine`]
pub struct LayerRegistry<E: MapEngine> {
    engine: E,
    sources: HashMap<String, SourceEntry>,
    /// Bottom to top
    stack: Vec<Layer>,
    handlers: HashMap<String, SmallVec<[Interaction; 3]>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<E: MapEngine> LayerRegistry<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            sources: HashMap::new(),
            stack: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access for hosts that need to inspect or drain it
    #[inline]
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.stack.iter().find(|layer| layer.id == id)
    }

    /// Layer ids bottom to top
    pub fn layer_ids(&self) -> Vec<&str> {
        self.stack.iter().map(|layer| layer.id.as_str()).collect()
    }

    pub fn source_features(&self, id: &str) -> Option<&[MapFeature]> {
        self.sources.get(id).map(|entry| entry.features.as_slice())
    }

    /// Sources no layer references. Non-empty only transiently while a pair is being built.
    pub fn orphan_sources(&self) -> Vec<&str> {
        let mut orphans: Vec<&str> = self
            .sources
            .keys()
            .filter(|id| !self.stack.iter().any(|layer| &layer.source == *id))
            .map(String::as_str)
            .collect();
        orphans.sort_unstable();
        orphans
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.stack.iter().position(|layer| layer.id == id)
    }

    /// Create a source. Returns `false` (and changes nothing) if it already exists.
    pub fn add_source(&mut self, id: &str, features: Vec<MapFeature>) -> bool {
        if self.sources.contains_key(id) {
            tracing::trace!("Source {id} already exists");
            return false;
        }
        self.engine.add_source(id, &features);
        self.sources.insert(id.to_string(), SourceEntry { features });
        true
    }

    /// Replace a source's features wholesale. No-op if the source is missing.
    pub fn set_source_data(&mut self, id: &str, features: Vec<MapFeature>) -> bool {
        let Some(entry) = self.sources.get_mut(id) else {
            tracing::trace!("set_source_data on missing source {id}");
            return false;
        };
        self.engine.set_source_data(id, &features);
        entry.features = features;
        true
    }

    /// Create or replace a source
    pub fn upsert_source(&mut self, id: &str, features: Vec<MapFeature>) {
        if !self.set_source_data(id, features.clone()) {
            self.add_source(id, features);
        }
    }

    /// Insert a layer. Returns `false` if it already exists or its source is missing.
    pub fn add_layer(&mut self, layer: Layer, placement: Placement) -> bool {
        if self.has_layer(&layer.id) {
            tracing::trace!("Layer {} already exists", layer.id);
            return false;
        }
        if !self.sources.contains_key(&layer.source) {
            tracing::warn!("Layer {} references missing source {}", layer.id, layer.source);
            return false;
        }

        let top_of_group = |stack: &[Layer]| {
            stack
                .iter()
                .position(|existing| existing.group > layer.group)
                .unwrap_or(stack.len())
        };
        let index = match &placement {
            Placement::Top => top_of_group(&self.stack),
            Placement::Above(anchor) => match self.position(anchor) {
                Some(i) => i + 1,
                None => {
                    tracing::trace!("Anchor {anchor} missing, placing {} on top of its group", layer.id);
                    top_of_group(&self.stack)
                }
            },
            Placement::Below(anchor) => match self.position(anchor) {
                Some(i) => i,
                None => {
                    tracing::trace!("Anchor {anchor} missing, placing {} on top of its group", layer.id);
                    top_of_group(&self.stack)
                }
            },
        };

        let before = self.stack.get(index).map(|next| next.id.clone());
        self.engine.add_layer(&layer, before.as_deref());
        tracing::debug!("Added layer {} below {:?}", layer.id, before);
        self.stack.insert(index, layer);
        true
    }

    /// Remove layers (and their interaction bindings). Missing ids are skipped.
    pub fn remove_layers<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let mut removed = 0;
        for id in ids {
            let id = id.as_ref();
            let Some(index) = self.position(id) else {
                continue;
            };
            self.unbind_all(id);
            self.engine.remove_layer(id);
            self.stack.remove(index);
            removed += 1;
        }
        removed
    }

    /// Remove a source. Fails while any layer still references it.
    pub fn remove_source(&mut self, id: &str) -> Result<bool> {
        if let Some(layer) = self.stack.iter().find(|layer| layer.source == id) {
            return Err(MapError::SourceInUse {
                source_id: id.to_string(),
                layer_id: layer.id.clone(),
            });
        }
        if self.sources.remove(id).is_none() {
            return Ok(false);
        }
        self.engine.remove_source(id);
        Ok(true)
    }

    /// Remove layers, then their source, in the only legal order
    pub fn teardown<S: AsRef<str>>(&mut self, layers: &[S], source: &str) {
        self.remove_layers(layers);
        if let Err(err) = self.remove_source(source) {
            tracing::warn!("Teardown left source in place: {err}");
        }
    }

    pub fn set_paint(&mut self, layer: &str, property: &str, value: PaintValue) -> bool {
        let Some(index) = self.position(layer) else {
            tracing::trace!("set_paint on missing layer {layer}");
            return false;
        };
        self.engine.set_paint(layer, property, &value);
        self.stack[index].paint.insert(property.to_string(), value);
        true
    }

    pub fn set_visibility(&mut self, layer: &str, visible: bool) -> bool {
        let Some(index) = self.position(layer) else {
            tracing::trace!("set_visibility on missing layer {layer}");
            return false;
        };
        if self.stack[index].visible != visible {
            self.engine.set_visibility(layer, visible);
            self.stack[index].visible = visible;
        }
        true
    }

    pub fn set_filter(&mut self, layer: &str, filter: Filter) -> bool {
        let Some(index) = self.position(layer) else {
            tracing::trace!("set_filter on missing layer {layer}");
            return false;
        };
        self.engine.set_filter(layer, &filter);
        self.stack[index].filter = filter;
        true
    }

    /// Register an interaction handler on a layer; idempotent
    pub fn bind(&mut self, layer: &str, interaction: Interaction) -> bool {
        if !self.has_layer(layer) {
            tracing::trace!("bind on missing layer {layer}");
            return false;
        }
        let bound = self.handlers.entry(layer.to_string()).or_default();
        if bound.contains(&interaction) {
            return false;
        }
        bound.push(interaction);
        self.engine.bind(layer, interaction);
        true
    }

    /// Deregister every handler on a layer, returning how many were removed
    pub fn unbind_all(&mut self, layer: &str) -> usize {
        let Some(bound) = self.handlers.remove(layer) else {
            return 0;
        };
        for interaction in &bound {
            self.engine.unbind(layer, *interaction);
        }
        bound.len()
    }

    pub fn is_bound(&self, layer: &str, interaction: Interaction) -> bool {
        self.handlers
            .get(layer)
            .is_some_and(|bound| bound.contains(&interaction))
    }

    /// Feature `index` of the source rendered by `layer`, if the layer would draw it
    pub fn feature_at(&self, layer: &str, index: usize) -> Option<&MapFeature> {
        let layer = self.layer(layer)?;
        let feature = self.sources.get(&layer.source)?.features.get(index)?;
        layer.filter.matches(&feature.properties).then_some(feature)
    }

    pub fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions) {
        self.engine.fit_bounds(bounds, options);
    }

    pub fn set_max_bounds(&mut self, bounds: Option<Rect<f64>>) {
        self.engine.set_max_bounds(bounds);
    }
}
