//! Two-level region selection
//!
//! Coarse regions are always drawn. Fine regions belong to a coarse parent and are drawn
//! either scoped to an allow-listed, selected parent or, with nothing selected, from a
//! zoom threshold upwards. They are kept in one source holding every loaded parent;
//! scoping is a filter on `parent_key`. Selecting at one level clears the other; hover is suppressed
//! on the selected region.
//!
//! Selecting an allow-listed coarse region fits and clamps the camera to it and darkens
//! every other coarse region with a mask layer. The mask and clamp survive a subsequent
//! fine selection and are only dropped by a reset or a different coarse selection.

use crate::engine::{FitOptions, Interaction, MapEngine};
use crate::{
    Filter, Layer, LayerGroup, LayerKind, LayerRegistry, MapError, PaintValue, Placement, Region,
    RegionConfig, RegionLevel, Result, Rgba, StatisticsQuery, normalize_name,
};
use geo::Rect;
use serde::Serialize;
use std::collections::HashSet;

pub const COARSE_SOURCE: &str = "regions-coarse";
pub const COARSE_FILL: &str = "regions-coarse-fill";
pub const COARSE_OUTLINE: &str = "regions-coarse-outline";
pub const COARSE_LABELS: &str = "regions-coarse-labels";
pub const COARSE_SELECTED: &str = "regions-coarse-selected";
pub const COARSE_HOVER: &str = "regions-coarse-hover";
pub const COARSE_MASK: &str = "regions-coarse-mask";

pub const FINE_SOURCE: &str = "regions-fine";
pub const FINE_FILL: &str = "regions-fine-fill";
pub const FINE_OUTLINE: &str = "regions-fine-outline";
pub const FINE_SELECTED: &str = "regions-fine-selected";
pub const FINE_HOVER: &str = "regions-fine-hover";

const FINE_LAYERS: [&str; 4] = [FINE_FILL, FINE_OUTLINE, FINE_SELECTED, FINE_HOVER];

/// Region ids currently selected or hovered
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SelectionState {
    pub selected_coarse: Option<String>,
    pub selected_fine: Option<String>,
    pub hovered_coarse: Option<String>,
    pub hovered_fine: Option<String>,
}

/// Follow-up work a selection asks of its caller
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectionOutcome {
    /// Statistics to fetch for the selected region
    pub statistics: Option<StatisticsQuery>,
    /// Whether the camera was fitted
    pub fitted: bool,
    /// Coarse parent whose fine regions are not loaded yet and must be fetched
    pub fine_parent: Option<String>,
}

pub struct RegionSelectionController {
    config: RegionConfig,
    allow_list: HashSet<String>,
    coarse: Vec<Region>,
    fine: Vec<Region>,
    /// Parent keys whose fine regions are loaded
    loaded_parents: HashSet<String>,
    /// Allow-listed coarse region whose mask, clamp and fine filter are active
    scope: Option<String>,
    state: SelectionState,
    zoom: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RegionSelectionController {
    pub fn new(config: RegionConfig) -> Self {
        let allow_list = config.fine_allow_list.iter().map(|name| normalize_name(name)).collect();
        Self {
            config,
            allow_list,
            coarse: Vec::new(),
            fine: Vec::new(),
            loaded_parents: HashSet::new(),
            scope: None,
            state: SelectionState::default(),
            zoom: 0.0,
        }
    }

    pub fn selection(&self) -> &SelectionState {
        &self.state
    }

    pub fn allows_fine(&self, coarse_name: &str) -> bool {
        self.allow_list.contains(&normalize_name(coarse_name))
    }

    pub fn coarse_regions(&self) -> &[Region] {
        &self.coarse
    }

    pub fn fine_regions(&self) -> &[Region] {
        &self.fine
    }

    /// Parent key of the active allow-listed scope
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether the fine regions of `parent_name` are loaded
    pub fn has_fine_regions_of(&self, parent_name: &str) -> bool {
        self.loaded_parents.contains(&normalize_name(parent_name))
    }

    /// Fine regions of the active scope, if they are loaded
    pub fn scoped_fine_regions(&self) -> Option<Vec<&Region>> {
        let scope = self.scope.as_deref()?;
        self.loaded_parents.contains(scope).then(|| {
            self.fine
                .iter()
                .filter(|region| region.parent_key().as_deref() == Some(scope))
                .collect()
        })
    }

    /// Level of the region layer that receives pointer input, if `layer` is one
    pub fn level_of_layer(layer: &str) -> Option<RegionLevel> {
        match layer {
            COARSE_FILL => Some(RegionLevel::Coarse),
            FINE_FILL => Some(RegionLevel::Fine),
            _ => None,
        }
    }

    /// Region id of a clicked or hovered feature on a region fill layer
    pub fn region_id_at<E: MapEngine>(registry: &LayerRegistry<E>, layer: &str, index: usize) -> Option<String> {
        Self::level_of_layer(layer)?;
        registry.feature_at(layer, index)?.property_str("id")
    }

    /// Create (or refresh) the coarse source and its layers
    pub fn install_coarse<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, regions: Vec<Region>) {
        let features = regions.iter().map(Region::to_map_feature).collect();
        registry.upsert_source(COARSE_SOURCE, features);
        self.coarse = regions;

        let c = &self.config;
        let layers = [
            Layer::new(COARSE_FILL, COARSE_SOURCE, LayerKind::Fill, LayerGroup::AdminContext)
                .with_paint("fill-color", PaintValue::color(c.fill_color)),
            Layer::new(COARSE_OUTLINE, COARSE_SOURCE, LayerKind::Line, LayerGroup::AdminContext)
                .with_paint("line-color", PaintValue::color(c.outline_color))
                .with_paint("line-width", PaintValue::number(c.outline_width)),
            Layer::new(COARSE_LABELS, COARSE_SOURCE, LayerKind::Symbol, LayerGroup::AdminContext)
                .with_paint("text-color", PaintValue::color(c.outline_color))
                .with_min_zoom(c.label_min_zoom),
            highlight_layer(COARSE_SELECTED, COARSE_SOURCE, LayerGroup::AdminContext, c.selection_color, c.selection_width),
            highlight_layer(COARSE_HOVER, COARSE_SOURCE, LayerGroup::AdminContext, c.hover_color, c.hover_width),
        ];
        for layer in layers {
            registry.add_layer(layer, Placement::Top);
        }
        for interaction in [Interaction::Click, Interaction::Hover, Interaction::Leave] {
            registry.bind(COARSE_FILL, interaction);
        }
        tracing::debug!("Installed {} coarse regions", self.coarse.len());
    }

    /// Install the complete fine set, replacing whatever was loaded
    pub fn install_fine<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, regions: Vec<Region>) {
        self.loaded_parents = regions.iter().filter_map(Region::parent_key).collect();
        self.fine = regions;
        self.upload_fine(registry);
        tracing::debug!(
            "Installed {} fine regions of {} parents",
            self.fine.len(),
            self.loaded_parents.len()
        );
    }

    /// Load the fine regions of one coarse parent next to those already loaded
    pub fn merge_fine_regions<E: MapEngine>(
        &mut self,
        registry: &mut LayerRegistry<E>,
        parent_name: &str,
        regions: Vec<Region>,
    ) {
        let parent = normalize_name(parent_name);
        self.fine.retain(|region| region.parent_key().as_deref() != Some(parent.as_str()));
        self.fine.extend(regions);
        self.loaded_parents.insert(parent);
        self.upload_fine(registry);
        tracing::debug!("Loaded fine regions of {parent_name}, {} in total", self.fine.len());
    }

    /// Push the fine set to its source and create the fine layers on first use
    fn upload_fine<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>) {
        let features = self.fine.iter().map(Region::to_map_feature).collect();
        registry.upsert_source(FINE_SOURCE, features);
        if let Some(selected) = &self.state.selected_fine
            && !self.fine.iter().any(|region| &region.id == selected)
        {
            self.state.selected_fine = None;
        }

        let c = &self.config;
        let layers = [
            Layer::new(FINE_FILL, FINE_SOURCE, LayerKind::Fill, LayerGroup::FineBoundaries)
                .with_paint("fill-color", PaintValue::color(c.fill_color)),
            Layer::new(FINE_OUTLINE, FINE_SOURCE, LayerKind::Line, LayerGroup::FineBoundaries)
                .with_paint("line-color", PaintValue::color(c.outline_color))
                .with_paint("line-width", PaintValue::number(c.outline_width * 0.5)),
            highlight_layer(FINE_SELECTED, FINE_SOURCE, LayerGroup::FineBoundaries, c.selection_color, c.selection_width),
            highlight_layer(FINE_HOVER, FINE_SOURCE, LayerGroup::FineBoundaries, c.hover_color, c.hover_width),
        ];
        for layer in layers {
            registry.add_layer(layer, Placement::Top);
        }
        for interaction in [Interaction::Click, Interaction::Hover, Interaction::Leave] {
            registry.bind(FINE_FILL, interaction);
        }
        self.apply_highlights(registry);
        self.apply_fine_visibility(registry);
    }

    pub fn select_coarse<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, id: &str) -> Result<SelectionOutcome> {
        let region = self
            .coarse
            .iter()
            .find(|region| region.id == id)
            .ok_or_else(|| MapError::UnknownRegion(id.to_string()))?;
        let name_key = region.name_key();
        let bounds = region.bounds;
        let statistics = Some(StatisticsQuery::new(RegionLevel::Coarse, &region.name));

        self.state = SelectionState {
            selected_coarse: Some(id.to_string()),
            ..SelectionState::default()
        };
        self.apply_highlights(registry);

        let mut outcome = SelectionOutcome {
            statistics,
            ..SelectionOutcome::default()
        };
        if self.allow_list.contains(&name_key) {
            if let Some(bounds) = bounds {
                self.fit(registry, bounds);
                registry.set_max_bounds(Some(bounds));
                outcome.fitted = true;
            }
            self.apply_mask(registry, id);
            if !self.loaded_parents.contains(&name_key) {
                outcome.fine_parent = Some(name_key.clone());
            }
            self.scope = Some(name_key);
        } else {
            self.clear_scope(registry);
        }
        self.apply_fine_visibility(registry);
        tracing::info!("Selected coarse region {id}");
        Ok(outcome)
    }

    pub fn select_fine<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, id: &str) -> Result<SelectionOutcome> {
        let region = self
            .fine
            .iter()
            .find(|region| region.id == id)
            .ok_or_else(|| MapError::UnknownRegion(id.to_string()))?;
        let bounds = region.bounds;
        let statistics = Some(StatisticsQuery::new(RegionLevel::Fine, &region.name));

        self.state = SelectionState {
            selected_fine: Some(id.to_string()),
            ..SelectionState::default()
        };
        self.apply_highlights(registry);

        let mut outcome = SelectionOutcome {
            statistics,
            ..SelectionOutcome::default()
        };
        if let Some(bounds) = bounds {
            self.fit(registry, bounds);
            outcome.fitted = true;
        }
        tracing::info!("Selected fine region {id}");
        Ok(outcome)
    }

    /// Drop selection, hover, mask and clamp; fine regions revert to zoom visibility
    pub fn reset<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>) {
        self.state = SelectionState::default();
        self.apply_highlights(registry);
        self.clear_scope(registry);
        self.apply_fine_visibility(registry);
        tracing::debug!("Region selection reset");
    }

    /// Update the hover highlight; `None` clears it. Returns whether anything is highlighted.
    pub fn hover<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, level: RegionLevel, id: Option<&str>) -> bool {
        let (selected, hovered) = match level {
            RegionLevel::Coarse => (&self.state.selected_coarse, &mut self.state.hovered_coarse),
            RegionLevel::Fine => (&self.state.selected_fine, &mut self.state.hovered_fine),
        };
        // Selection dominates hover
        *hovered = id.filter(|id| selected.as_deref() != Some(*id)).map(str::to_string);
        let highlighted = hovered.is_some();
        self.apply_highlights(registry);
        highlighted
    }

    pub fn pointer_leave<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, level: RegionLevel) {
        self.hover(registry, level, None);
    }

    pub fn zoom_changed<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>, zoom: f64) {
        self.zoom = zoom;
        self.apply_fine_visibility(registry);
    }

    fn fit<E: MapEngine>(&self, registry: &mut LayerRegistry<E>, bounds: Rect<f64>) {
        registry.fit_bounds(
            bounds,
            FitOptions {
                padding: self.config.fit_padding,
                duration_ms: self.config.fit_duration_ms,
            },
        );
    }

    fn apply_mask<E: MapEngine>(&self, registry: &mut LayerRegistry<E>, id: &str) {
        let paint = PaintValue::ColorWhenEquals {
            property: "id".to_string(),
            value: id.to_string(),
            then: Rgba::TRANSPARENT,
            otherwise: self.config.mask_color,
        };
        if !registry.set_paint(COARSE_MASK, "fill-color", paint.clone()) {
            registry.add_layer(
                Layer::new(COARSE_MASK, COARSE_SOURCE, LayerKind::Fill, LayerGroup::AdminContext)
                    .with_paint("fill-color", paint),
                Placement::Above(COARSE_OUTLINE.to_string()),
            );
        }
    }

    fn clear_scope<E: MapEngine>(&mut self, registry: &mut LayerRegistry<E>) {
        registry.remove_layers(&[COARSE_MASK]);
        if self.scope.take().is_some() {
            registry.set_max_bounds(None);
        }
    }

    fn apply_highlights<E: MapEngine>(&self, registry: &mut LayerRegistry<E>) {
        let s = &self.state;
        for (layer, id) in [
            (COARSE_SELECTED, &s.selected_coarse),
            (COARSE_HOVER, &s.hovered_coarse),
            (FINE_SELECTED, &s.selected_fine),
            (FINE_HOVER, &s.hovered_fine),
        ] {
            let filter = id.as_ref().map_or(Filter::Never, |id| Filter::eq("id", id));
            set_filter_if_changed(registry, layer, filter);
        }
    }

    fn apply_fine_visibility<E: MapEngine>(&self, registry: &mut LayerRegistry<E>) {
        let (visible, filter) = match (&self.scope, &self.state.selected_coarse) {
            (Some(parent), _) => (true, Filter::eq("parent_key", parent)),
            (None, Some(_)) => (false, Filter::Always),
            (None, None) => (self.zoom >= self.config.fine_zoom_threshold, Filter::Always),
        };
        for layer in FINE_LAYERS {
            registry.set_visibility(layer, visible);
        }
        set_filter_if_changed(registry, FINE_FILL, filter.clone());
        set_filter_if_changed(registry, FINE_OUTLINE, filter);
    }
}

fn highlight_layer(id: &str, source: &str, group: LayerGroup, color: Rgba, width: f64) -> Layer {
    Layer::new(id, source, LayerKind::Line, group)
        .with_paint("line-color", PaintValue::color(color))
        .with_paint("line-width", PaintValue::number(width))
        .with_filter(Filter::Never)
}

fn set_filter_if_changed<E: MapEngine>(registry: &mut LayerRegistry<E>, layer: &str, filter: Filter) {
    if registry.layer(layer).is_some_and(|existing| existing.filter != filter) {
        registry.set_filter(layer, filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, HeadlessEngine};
    use geo::{LineString, MultiPolygon, Polygon};

    fn square(id: &str, name: &str, level: RegionLevel, parent: Option<&str>, x: f64, y: f64) -> Region {
        let ring = LineString::from(vec![(x, y), (x + 1.0, y), (x + 1.0, y + 1.0), (x, y + 1.0), (x, y)]);
        Region::new(
            id,
            name,
            level,
            parent.map(str::to_string),
            MultiPolygon::new(vec![Polygon::new(ring, Vec::new())]),
        )
    }

    fn coarse() -> Vec<Region> {
        vec![
            square("1", "Ljubljana", RegionLevel::Coarse, None, 14.0, 46.0),
            square("2", "Kranj", RegionLevel::Coarse, None, 14.0, 47.0),
            square("3", "Maribor", RegionLevel::Coarse, None, 15.0, 46.0),
        ]
    }

    fn fine() -> Vec<Region> {
        vec![
            square("61", "Center", RegionLevel::Fine, Some("Ljubljana"), 14.2, 46.2),
            square("62", "Bezigrad", RegionLevel::Fine, Some("Ljubljana"), 14.4, 46.4),
        ]
    }

    fn maribor_fine() -> Vec<Region> {
        vec![square("71", "Tabor", RegionLevel::Fine, Some("Maribor"), 15.2, 46.2)]
    }

    fn setup() -> (RegionSelectionController, LayerRegistry<HeadlessEngine>) {
        let mut controller = RegionSelectionController::new(RegionConfig::default());
        let mut registry = LayerRegistry::new(HeadlessEngine::new());
        controller.install_coarse(&mut registry, coarse());
        registry.engine_mut().take_calls();
        (controller, registry)
    }

    fn fits(registry: &LayerRegistry<HeadlessEngine>) -> usize {
        registry.engine().count(|c| matches!(c, EngineCall::FitBounds { .. }))
    }

    #[test]
    fn test_install_coarse_layers() {
        let (_, registry) = setup();
        assert_eq!(
            registry.layer_ids(),
            vec![COARSE_FILL, COARSE_OUTLINE, COARSE_LABELS, COARSE_SELECTED, COARSE_HOVER]
        );
        assert!(registry.is_bound(COARSE_FILL, Interaction::Leave));
        assert_eq!(registry.layer(COARSE_LABELS).unwrap().min_zoom, Some(8.0));
    }

    #[test]
    fn test_select_allow_listed_coarse() {
        let (mut controller, mut registry) = setup();
        let outcome = controller.select_coarse(&mut registry, "1").unwrap();

        assert!(outcome.fitted);
        assert_eq!(outcome.fine_parent.as_deref(), Some("LJUBLJANA"));
        assert_eq!(outcome.statistics, Some(StatisticsQuery::new(RegionLevel::Coarse, "LJUBLJANA")));
        assert_eq!(fits(&registry), 1);
        assert!(registry.engine().calls().iter().any(|c| matches!(c, EngineCall::SetMaxBounds { bounds: Some(_) })));

        // Mask sits directly above the outline
        let ids = registry.layer_ids();
        let outline = ids.iter().position(|id| *id == COARSE_OUTLINE).unwrap();
        assert_eq!(ids[outline + 1], COARSE_MASK);
        let mask = registry.layer(COARSE_MASK).unwrap();
        let feature = registry.source_features(COARSE_SOURCE).unwrap()[0].clone();
        assert_eq!(
            mask.paint["fill-color"].resolve_color(&feature.properties),
            Some(Rgba::TRANSPARENT)
        );
    }

    #[test]
    fn test_fine_regions_are_scoped_to_parent() {
        let (mut controller, mut registry) = setup();
        controller.select_coarse(&mut registry, "1").unwrap();
        assert!(controller.scoped_fine_regions().is_none());
        controller.merge_fine_regions(&mut registry, "Ljubljana", fine());
        assert!(controller.has_fine_regions_of("ljubljana"));

        let fill = registry.layer(FINE_FILL).unwrap();
        assert!(fill.visible);
        assert_eq!(fill.filter, Filter::eq("parent_key", "LJUBLJANA"));
        assert_eq!(controller.scoped_fine_regions().map(|regions| regions.len()), Some(2));

        // Fine layers stack above every coarse layer
        let ids = registry.layer_ids();
        let last_coarse = ids.iter().rposition(|id| id.starts_with("regions-coarse")).unwrap();
        let first_fine = ids.iter().position(|id| id.starts_with("regions-fine")).unwrap();
        assert!(first_fine > last_coarse);
    }

    #[test]
    fn test_select_coarse_outside_allow_list() {
        let (mut controller, mut registry) = setup();
        controller.select_coarse(&mut registry, "1").unwrap();
        controller.merge_fine_regions(&mut registry, "Ljubljana", fine());
        registry.engine_mut().take_calls();

        let outcome = controller.select_coarse(&mut registry, "2").unwrap();
        assert!(!outcome.fitted);
        assert!(outcome.fine_parent.is_none());
        assert!(outcome.statistics.is_some());
        assert_eq!(fits(&registry), 0);
        assert!(!registry.has_layer(COARSE_MASK));
        assert!(!registry.layer(FINE_FILL).unwrap().visible);
        assert!(registry.engine().calls().contains(&EngineCall::SetMaxBounds { bounds: None }));
    }

    #[test]
    fn test_fine_selection_clears_coarse_and_keeps_mask() {
        let (mut controller, mut registry) = setup();
        controller.select_coarse(&mut registry, "1").unwrap();
        controller.merge_fine_regions(&mut registry, "Ljubljana", fine());

        let outcome = controller.select_fine(&mut registry, "62").unwrap();
        assert!(outcome.fitted);
        assert_eq!(outcome.statistics, Some(StatisticsQuery::new(RegionLevel::Fine, "Bezigrad")));
        assert_eq!(controller.selection().selected_coarse, None);
        assert_eq!(controller.selection().selected_fine.as_deref(), Some("62"));
        assert!(registry.has_layer(COARSE_MASK));
        assert_eq!(registry.layer(COARSE_SELECTED).unwrap().filter, Filter::Never);
        assert_eq!(registry.layer(FINE_SELECTED).unwrap().filter, Filter::eq("id", "62"));
        assert_eq!(fits(&registry), 2);

        // Coarse selection clears the fine one again
        controller.select_coarse(&mut registry, "1").unwrap();
        assert_eq!(controller.selection().selected_fine, None);
    }

    #[test]
    fn test_unknown_region() {
        let (mut controller, mut registry) = setup();
        assert!(matches!(
            controller.select_coarse(&mut registry, "99"),
            Err(MapError::UnknownRegion(_))
        ));
        assert!(controller.select_fine(&mut registry, "61").is_err());
    }

    #[test]
    fn test_hover_is_suppressed_on_selection() {
        let (mut controller, mut registry) = setup();
        assert!(controller.hover(&mut registry, RegionLevel::Coarse, Some("3")));
        assert_eq!(registry.layer(COARSE_HOVER).unwrap().filter, Filter::eq("id", "3"));

        controller.select_coarse(&mut registry, "3").unwrap();
        assert_eq!(controller.selection().hovered_coarse, None, "click clears hover");
        assert!(!controller.hover(&mut registry, RegionLevel::Coarse, Some("3")));
        assert_eq!(registry.layer(COARSE_HOVER).unwrap().filter, Filter::Never);

        controller.hover(&mut registry, RegionLevel::Coarse, Some("2"));
        controller.pointer_leave(&mut registry, RegionLevel::Coarse);
        assert_eq!(controller.selection().hovered_coarse, None);
        assert_eq!(registry.layer(COARSE_HOVER).unwrap().filter, Filter::Never);
    }

    #[test]
    fn test_reset_restores_zoom_visibility() {
        let (mut controller, mut registry) = setup();
        controller.select_coarse(&mut registry, "1").unwrap();
        controller.merge_fine_regions(&mut registry, "Ljubljana", fine());
        controller.reset(&mut registry);

        assert_eq!(controller.selection(), &SelectionState::default());
        assert!(!registry.has_layer(COARSE_MASK));
        assert!(controller.scope().is_none());
        let fill = registry.layer(FINE_FILL).unwrap();
        assert!(!fill.visible, "zoom 0 is below the threshold");
        assert_eq!(fill.filter, Filter::Always);

        controller.zoom_changed(&mut registry, 12.5);
        assert!(registry.layer(FINE_FILL).unwrap().visible);
        controller.zoom_changed(&mut registry, 11.0);
        assert!(!registry.layer(FINE_OUTLINE).unwrap().visible);
    }

    #[test]
    fn test_installed_fine_regions_follow_zoom_without_selection() {
        let (mut controller, mut registry) = setup();
        controller.zoom_changed(&mut registry, 14.0);
        let mut all = fine();
        all.extend(maribor_fine());
        controller.install_fine(&mut registry, all);

        let fill = registry.layer(FINE_FILL).unwrap();
        assert!(fill.visible);
        assert_eq!(fill.filter, Filter::Always);
        assert_eq!(registry.source_features(FINE_SOURCE).unwrap().len(), 3);
        assert!(registry.is_bound(FINE_FILL, Interaction::Hover));

        // Both parents are loaded, so selecting either needs no fetch
        let outcome = controller.select_coarse(&mut registry, "3").unwrap();
        assert!(outcome.fine_parent.is_none());
        assert_eq!(registry.layer(FINE_FILL).unwrap().filter, Filter::eq("parent_key", "MARIBOR"));
        let scoped: Vec<_> = controller.scoped_fine_regions().unwrap().iter().map(|r| r.id.clone()).collect();
        assert_eq!(scoped, vec!["71"]);
    }

    #[test]
    fn test_merged_parents_survive_reset() {
        let (mut controller, mut registry) = setup();
        controller.select_coarse(&mut registry, "1").unwrap();
        controller.merge_fine_regions(&mut registry, "Ljubljana", fine());
        let outcome = controller.select_coarse(&mut registry, "3").unwrap();
        assert_eq!(outcome.fine_parent.as_deref(), Some("MARIBOR"));
        controller.merge_fine_regions(&mut registry, "Maribor", maribor_fine());

        controller.reset(&mut registry);
        controller.zoom_changed(&mut registry, 13.0);
        assert_eq!(registry.source_features(FINE_SOURCE).unwrap().len(), 3);
        assert_eq!(registry.layer(FINE_FILL).unwrap().filter, Filter::Always);
        assert!(registry.layer(FINE_FILL).unwrap().visible);

        // Reloading a parent replaces only its own regions
        controller.merge_fine_regions(&mut registry, "MARIBOR", maribor_fine());
        assert_eq!(controller.fine_regions().len(), 3);
    }

    #[test]
    fn test_region_id_at() {
        let (_, registry) = setup();
        assert_eq!(
            RegionSelectionController::region_id_at(&registry, COARSE_FILL, 1).as_deref(),
            Some("2")
        );
        assert!(RegionSelectionController::region_id_at(&registry, COARSE_OUTLINE, 1).is_none());
    }
}
