//! Rendering seam. The choreography never looks elements up by itself; it is
//! handed [`ElementHandle`]s and [`SurfaceHandle`]s and drives them through the
//! traits below. The headless implementations record every call against the
//! shared [`Clock`] so a run can be inspected after the fact.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Clock, SceneId};

/// Visual properties animated by a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub opacity: f32,
    pub offset_y: f32,
}

impl VisualState {
    /// Pre-reveal state: transparent and slightly lowered.
    pub const CONCEALED: Self = Self {
        opacity: 0.0,
        offset_y: 20.0,
    };
    pub const SHOWN: Self = Self {
        opacity: 1.0,
        offset_y: 0.0,
    };
    pub const FADED: Self = Self {
        opacity: 0.0,
        offset_y: 0.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    #[default]
    EaseOut,
    EaseInOut,
    EaseOutCubic,
}

impl Easing {
    /// Maps linear progress `t` in `[0, 1]` onto the curve.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            Self::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
        }
    }
}

/// Marker attributes tracked on elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// The screen currently on display.
    Active,
    /// Screen removed from display.
    Hidden,
    /// Element has been revealed by the choreography.
    Revealed,
}

/// A visual element the choreography can reveal, type into or scroll to.
pub trait Element: Send + Sync + fmt::Debug {
    fn label(&self) -> &str;

    /// `false` when the handle no longer refers to a usable element.
    fn is_attached(&self) -> bool {
        true
    }

    /// Applies a visual state immediately, without animation.
    fn set_visual(&self, state: VisualState);

    /// Forces pending style changes to take effect before an animation starts.
    fn flush_layout(&self);

    fn animate(&self, to: VisualState, duration: Duration, easing: Easing);

    fn set_marker(&self, marker: Marker, on: bool);

    fn has_marker(&self, marker: Marker) -> bool;

    fn clear_text(&self);

    fn append_text(&self, text: &str);

    fn text(&self) -> String;

    /// Top edge relative to the content origin of the element's scroll parent
    /// (or of the document when it has none).
    fn offset_top(&self) -> f64;

    /// Nested scroll container holding the element, if any.
    fn scroll_parent(&self) -> Option<SurfaceHandle>;
}

pub type ElementHandle = Arc<dyn Element>;

/// A scrollable region: the document itself or a nested container.
pub trait ScrollSurface: Send + Sync + fmt::Debug {
    fn label(&self) -> &str;

    /// Position of the surface within the document content; zero for the
    /// document.
    fn offset_top(&self) -> f64;

    fn scroll_top(&self) -> f64;

    fn set_scroll_top(&self, top: f64);

    fn max_scroll(&self) -> f64;

    fn supports_smooth_scroll(&self) -> bool;

    /// Native smooth scroll; only called when
    /// [`ScrollSurface::supports_smooth_scroll`] is `true`.
    fn smooth_scroll_to(&self, top: f64);
}

pub type SurfaceHandle = Arc<dyn ScrollSurface>;

/// Explicit registry of the handles a scene transition touches.
#[derive(Debug, Clone, Default)]
pub struct Stage {
    screens: BTreeMap<SceneId, ElementHandle>,
    containers: BTreeMap<SceneId, SurfaceHandle>,
    outer: Option<SurfaceHandle>,
    document: Option<SurfaceHandle>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_screen(mut self, scene: impl Into<SceneId>, screen: ElementHandle) -> Self {
        self.screens.insert(scene.into(), screen);
        self
    }

    pub fn with_container(mut self, scene: impl Into<SceneId>, container: SurfaceHandle) -> Self {
        self.containers.insert(scene.into(), container);
        self
    }

    pub fn with_outer(mut self, outer: SurfaceHandle) -> Self {
        self.outer = Some(outer);
        self
    }

    pub fn with_document(mut self, document: SurfaceHandle) -> Self {
        self.document = Some(document);
        self
    }

    pub fn screen(&self, scene: &SceneId) -> Option<&ElementHandle> {
        self.screens.get(scene)
    }

    pub fn container(&self, scene: &SceneId) -> Option<&SurfaceHandle> {
        self.containers.get(scene)
    }

    pub fn document(&self) -> Option<&SurfaceHandle> {
        self.document.as_ref()
    }

    /// Document, outer container and every scene container.
    pub fn scroll_surfaces(&self) -> impl Iterator<Item = &SurfaceHandle> {
        self.document
            .iter()
            .chain(self.outer.iter())
            .chain(self.containers.values())
    }

    /// Flips the active/hidden markers from one screen to the other.
    pub fn activate(&self, from: Option<&SceneId>, to: &SceneId) {
        if let Some(screen) = from.and_then(|scene| self.screen(scene)) {
            screen.set_marker(Marker::Active, false);
            screen.set_marker(Marker::Hidden, true);
        }

        match self.screen(to) {
            Some(screen) => {
                screen.set_marker(Marker::Hidden, false);
                screen.set_marker(Marker::Active, true);
            }
            None => tracing::warn!(scene = %to, "no screen registered for scene"),
        }
    }
}

/// One recorded call against a [`HeadlessElement`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEvent {
    pub at: Duration,
    pub kind: RenderEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEventKind {
    Visual(VisualState),
    Flush,
    Animate {
        to: VisualState,
        duration: Duration,
        easing: Easing,
    },
    Marker {
        marker: Marker,
        on: bool,
    },
    Text(String),
}

#[derive(Debug)]
struct ElementState {
    visual: VisualState,
    markers: BTreeSet<Marker>,
    text: String,
    events: Vec<RenderEvent>,
}

/// In-memory element used by the command line runner and by tests.
#[derive(Debug)]
pub struct HeadlessElement {
    label: String,
    clock: Arc<dyn Clock>,
    offset_top: f64,
    parent: Option<SurfaceHandle>,
    attached: bool,
    state: Mutex<ElementState>,
}

impl HeadlessElement {
    pub fn new(label: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            label: label.into(),
            clock,
            offset_top: 0.0,
            parent: None,
            attached: true,
            state: Mutex::new(ElementState {
                visual: VisualState::SHOWN,
                markers: BTreeSet::new(),
                text: String::new(),
                events: Vec::new(),
            }),
        }
    }

    pub fn at_offset(mut self, offset_top: f64) -> Self {
        self.offset_top = offset_top;
        self
    }

    pub fn inside(mut self, parent: SurfaceHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Simulates a handle whose element has been removed from the page.
    pub fn detached(mut self) -> Self {
        self.attached = false;
        self
    }

    pub fn handle(self) -> ElementHandle {
        Arc::new(self)
    }

    pub fn visual(&self) -> VisualState {
        self.lock().visual
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.lock().events.clone()
    }

    /// Clock times at which an animation towards [`VisualState::SHOWN`] began.
    pub fn reveal_times(&self) -> Vec<Duration> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event.kind {
                RenderEventKind::Animate { to, .. } if to == VisualState::SHOWN => Some(event.at),
                _ => None,
            })
            .collect()
    }

    fn record(&self, state: &mut ElementState, kind: RenderEventKind) {
        state.events.push(RenderEvent {
            at: self.clock.now(),
            kind,
        });
    }

    fn lock(&self) -> MutexGuard<'_, ElementState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Element for HeadlessElement {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn set_visual(&self, visual: VisualState) {
        let mut state = self.lock();
        state.visual = visual;
        self.record(&mut state, RenderEventKind::Visual(visual));
    }

    fn flush_layout(&self) {
        let mut state = self.lock();
        self.record(&mut state, RenderEventKind::Flush);
    }

    fn animate(&self, to: VisualState, duration: Duration, easing: Easing) {
        // The headless surface has no frames to draw; the end state applies at once.
        let mut state = self.lock();
        state.visual = to;
        self.record(&mut state, RenderEventKind::Animate { to, duration, easing });
    }

    fn set_marker(&self, marker: Marker, on: bool) {
        let mut state = self.lock();
        if on {
            state.markers.insert(marker);
        } else {
            state.markers.remove(&marker);
        }
        self.record(&mut state, RenderEventKind::Marker { marker, on });
    }

    fn has_marker(&self, marker: Marker) -> bool {
        self.lock().markers.contains(&marker)
    }

    fn clear_text(&self) {
        let mut state = self.lock();
        state.text.clear();
        self.record(&mut state, RenderEventKind::Text(String::new()));
    }

    fn append_text(&self, text: &str) {
        let mut state = self.lock();
        state.text.push_str(text);
        let snapshot = state.text.clone();
        self.record(&mut state, RenderEventKind::Text(snapshot));
    }

    fn text(&self) -> String {
        self.lock().text.clone()
    }

    fn offset_top(&self) -> f64 {
        self.offset_top
    }

    fn scroll_parent(&self) -> Option<SurfaceHandle> {
        self.parent.clone()
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    scroll_top: f64,
    positions: Vec<(Duration, f64)>,
    smooth_requests: Vec<f64>,
}

/// In-memory scroll surface. Records every position it is moved to.
#[derive(Debug)]
pub struct HeadlessSurface {
    label: String,
    clock: Arc<dyn Clock>,
    offset_top: f64,
    max_scroll: f64,
    smooth: bool,
    state: Mutex<SurfaceState>,
}

impl HeadlessSurface {
    pub fn new(label: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            label: label.into(),
            clock,
            offset_top: 0.0,
            max_scroll: 10_000.0,
            smooth: false,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    pub fn at_offset(mut self, offset_top: f64) -> Self {
        self.offset_top = offset_top;
        self
    }

    pub fn with_max_scroll(mut self, max_scroll: f64) -> Self {
        self.max_scroll = max_scroll.max(0.0);
        self
    }

    /// Advertises native smooth scrolling.
    pub fn with_native_smooth(mut self) -> Self {
        self.smooth = true;
        self
    }

    pub fn handle(self) -> SurfaceHandle {
        Arc::new(self)
    }

    pub fn positions(&self) -> Vec<(Duration, f64)> {
        self.lock().positions.clone()
    }

    pub fn smooth_requests(&self) -> Vec<f64> {
        self.lock().smooth_requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScrollSurface for HeadlessSurface {
    fn label(&self) -> &str {
        &self.label
    }

    fn offset_top(&self) -> f64 {
        self.offset_top
    }

    fn scroll_top(&self) -> f64 {
        self.lock().scroll_top
    }

    fn set_scroll_top(&self, top: f64) {
        let top = top.clamp(0.0, self.max_scroll);
        let at = self.clock.now();
        let mut state = self.lock();
        state.scroll_top = top;
        state.positions.push((at, top));
    }

    fn max_scroll(&self) -> f64 {
        self.max_scroll
    }

    fn supports_smooth_scroll(&self) -> bool {
        self.smooth
    }

    fn smooth_scroll_to(&self, top: f64) {
        let top = top.clamp(0.0, self.max_scroll);
        let mut state = self.lock();
        state.smooth_requests.push(top);
        state.scroll_top = top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokioClock;

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [Easing::Linear, Easing::EaseOut, Easing::EaseInOut, Easing::EaseOutCubic] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6);
        }
        assert!(Easing::EaseOutCubic.apply(0.5) > 0.8);
    }

    #[tokio::test]
    async fn stage_activation_swaps_markers() {
        let clock = TokioClock::new().shared();
        let boot = Arc::new(HeadlessElement::new("boot", clock.clone()));
        let auth = Arc::new(HeadlessElement::new("auth", clock));
        let stage = Stage::new()
            .with_screen("boot", boot.clone())
            .with_screen("auth", auth.clone());

        stage.activate(None, &"boot".into());
        stage.activate(Some(&"boot".into()), &"auth".into());

        assert!(boot.has_marker(Marker::Hidden));
        assert!(!boot.has_marker(Marker::Active));
        assert!(auth.has_marker(Marker::Active));
        assert!(!auth.has_marker(Marker::Hidden));
    }

    #[tokio::test]
    async fn headless_surface_clamps_positions() {
        let clock = TokioClock::new().shared();
        let surface = HeadlessSurface::new("doc", clock).with_max_scroll(500.0);

        surface.set_scroll_top(900.0);
        assert_eq!(surface.scroll_top(), 500.0);
        surface.set_scroll_top(-4.0);
        assert_eq!(surface.scroll_top(), 0.0);
    }
}
