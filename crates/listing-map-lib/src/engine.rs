//! Rendering-engine seam
//!
//! [`MapEngine`] is the set of primitive scene-graph and camera operations the core needs
//! from whatever actually draws the map. Only [`LayerRegistry`](crate::LayerRegistry)
//! calls it. [`HeadlessEngine`] records every call and stands in for a real renderer in
//! tests and command-line tooling.

use crate::{Filter, Layer, MapFeature, PaintValue};
use geo::Rect;
use serde::Serialize;

/// Pointer interactions a layer can be bound to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Hover,
    Leave,
}

/// Camera transition parameters for [`MapEngine::fit_bounds`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FitOptions {
    /// Padding in screen pixels
    pub padding: f32,
    pub duration_ms: u32,
}

/// Primitive operations of the external map renderer
pub trait MapEngine {
    fn add_source(&mut self, id: &str, features: &[MapFeature]);
    fn set_source_data(&mut self, id: &str, features: &[MapFeature]);
    fn remove_source(&mut self, id: &str);
    /// Insert below `before`, or on top of everything when `None`
    fn add_layer(&mut self, layer: &Layer, before: Option<&str>);
    fn remove_layer(&mut self, id: &str);
    fn set_paint(&mut self, layer: &str, property: &str, value: &PaintValue);
    fn set_visibility(&mut self, layer: &str, visible: bool);
    fn set_filter(&mut self, layer: &str, filter: &Filter);
    fn bind(&mut self, layer: &str, interaction: Interaction);
    fn unbind(&mut self, layer: &str, interaction: Interaction);
    fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions);
    /// Clamp the pannable area; `None` lifts the clamp
    fn set_max_bounds(&mut self, bounds: Option<Rect<f64>>);
}

/// One recorded engine call
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineCall {
    AddSource { id: String, features: usize },
    SetSourceData { id: String, features: usize },
    RemoveSource { id: String },
    AddLayer { id: String, before: Option<String> },
    RemoveLayer { id: String },
    SetPaint { layer: String, property: String, value: PaintValue },
    SetVisibility { layer: String, visible: bool },
    SetFilter { layer: String, filter: Filter },
    Bind { layer: String, interaction: Interaction },
    Unbind { layer: String, interaction: Interaction },
    FitBounds { bounds: Rect<f64>, options: FitOptions },
    SetMaxBounds { bounds: Option<Rect<f64>> },
}

/// Engine that draws nothing and remembers what it was asked to do
#[derive(Debug, Default)]
pub struct HeadlessEngine {
    calls: Vec<EngineCall>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Drain the log, e.g. between test phases
    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn record(&mut self, call: EngineCall) {
        tracing::trace!(?call, "engine call");
        self.calls.push(call);
    }
}

impl MapEngine for HeadlessEngine {
    fn add_source(&mut self, id: &str, features: &[MapFeature]) {
        self.record(EngineCall::AddSource {
            id: id.to_string(),
            features: features.len(),
        });
    }

    fn set_source_data(&mut self, id: &str, features: &[MapFeature]) {
        self.record(EngineCall::SetSourceData {
            id: id.to_string(),
            features: features.len(),
        });
    }

    fn remove_source(&mut self, id: &str) {
        self.record(EngineCall::RemoveSource { id: id.to_string() });
    }

    fn add_layer(&mut self, layer: &Layer, before: Option<&str>) {
        self.record(EngineCall::AddLayer {
            id: layer.id.clone(),
            before: before.map(str::to_owned),
        });
    }

    fn remove_layer(&mut self, id: &str) {
        self.record(EngineCall::RemoveLayer { id: id.to_string() });
    }

    fn set_paint(&mut self, layer: &str, property: &str, value: &PaintValue) {
        self.record(EngineCall::SetPaint {
            layer: layer.to_string(),
            property: property.to_string(),
            value: value.clone(),
        });
    }

    fn set_visibility(&mut self, layer: &str, visible: bool) {
        self.record(EngineCall::SetVisibility {
            layer: layer.to_string(),
            visible,
        });
    }

    fn set_filter(&mut self, layer: &str, filter: &Filter) {
        self.record(EngineCall::SetFilter {
            layer: layer.to_string(),
            filter: filter.clone(),
        });
    }

    fn bind(&mut self, layer: &str, interaction: Interaction) {
        self.record(EngineCall::Bind {
            layer: layer.to_string(),
            interaction,
        });
    }

    fn unbind(&mut self, layer: &str, interaction: Interaction) {
        self.record(EngineCall::Unbind {
            layer: layer.to_string(),
            interaction,
        });
    }

    fn fit_bounds(&mut self, bounds: Rect<f64>, options: FitOptions) {
        self.record(EngineCall::FitBounds { bounds, options });
    }

    fn set_max_bounds(&mut self, bounds: Option<Rect<f64>>) {
        self.record(EngineCall::SetMaxBounds { bounds });
    }
}
