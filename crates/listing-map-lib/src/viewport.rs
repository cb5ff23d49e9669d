//! Debounced viewport loading
//!
//! Pans and zooms arrive in bursts. A fetch is issued only once the viewport has been
//! still for the debounce interval, and every fetch carries a [`RequestToken`] so a slow
//! response cannot overwrite a newer one. Time is passed in explicitly.

use crate::{BBox, ViewportConfig};
use instant::{Duration, Instant};
use serde::Serialize;

/// Camera state relevant to point queries
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Viewport {
    pub bbox: BBox,
    pub zoom: f64,
}

/// Monotonically increasing id of an issued fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct ViewportLoader {
    debounce: Duration,
    pending: Option<(Viewport, Instant)>,
    last: Option<Viewport>,
    issued: u64,
    applied: Option<RequestToken>,
}

impl ViewportLoader {
    pub fn new(config: &ViewportConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            pending: None,
            last: None,
            issued: 0,
            applied: None,
        }
    }

    /// Record a viewport change; restarts the settle timer
    pub fn viewport_changed(&mut self, viewport: Viewport, now: Instant) {
        self.pending = Some((viewport, now));
    }

    /// Whether a change is waiting to settle
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Issue a fetch once the latest change has settled
    pub fn poll(&mut self, now: Instant) -> Option<(Viewport, RequestToken)> {
        let (viewport, changed_at) = self.pending?;
        if now.saturating_duration_since(changed_at) < self.debounce {
            return None;
        }
        self.pending = None;
        self.last = Some(viewport);
        Some((viewport, self.issue()))
    }

    /// Issue a fetch for the last settled viewport immediately, e.g. after a filter change
    pub fn refresh(&mut self) -> Option<(Viewport, RequestToken)> {
        let viewport = self.last?;
        Some((viewport, self.issue()))
    }

    fn issue(&mut self) -> RequestToken {
        self.issued += 1;
        RequestToken(self.issued)
    }

    /// Whether no newer fetch has been issued since `token`
    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.issued
    }

    /// Accept a response if it belongs to the newest fetch
    pub fn accept(&mut self, token: RequestToken) -> bool {
        if !self.is_current(token) {
            tracing::debug!("Dropping stale points response {} (newest {})", token.0, self.issued);
            return false;
        }
        self.applied = Some(token);
        true
    }

    pub fn last_viewport(&self) -> Option<Viewport> {
        self.last
    }

    pub fn last_applied(&self) -> Option<RequestToken> {
        self.applied
    }
}
