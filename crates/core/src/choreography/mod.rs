//! Timing and animation primitives plus the scene-transition protocol.
//!
//! Every wait funnels through [`Choreographer::delay`], which sleeps on the
//! injected [`Clock`]. Loops built from delays check the pause flag between
//! iterations, so pausing holds back the next step without cancelling the
//! current one.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::task::JoinHandle;

use crate::render::{
    Easing, Element, ElementHandle, Marker, ScrollSurface, Stage, SurfaceHandle, VisualState,
};
use crate::timeline::{Score, StepAction};
use crate::{AudioSystem, ChoreographyConfig, Clock, PlayOptions, SceneId};

/// Sound played for every visible character typed by [`Choreographer::type_text`].
pub const TYPE_CUE: &str = "type";

/// Options of [`Choreographer::reveal_sequence`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealOptions {
    /// Interval between reveal starts when staggering.
    pub delay: Duration,
    pub duration: Duration,
    pub stagger: bool,
    pub easing: Easing,
}

impl Default for RevealOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
            duration: Duration::from_millis(500),
            stagger: true,
            easing: Easing::EaseOut,
        }
    }
}

impl RevealOptions {
    pub fn staggered(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn together() -> Self {
        Self {
            stagger: false,
            ..Self::default()
        }
    }
}

/// Options of [`Choreographer::smooth_scroll_to`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollOptions {
    /// Space left above the target; the configured offset when unset.
    pub offset: Option<f64>,
    /// Length of the manual animation; the configured length when unset.
    pub duration: Option<Duration>,
    /// Scene the scroll belongs to. The configured document-scroll scene
    /// always scrolls the document.
    pub scene: Option<SceneId>,
    pub force_document: bool,
}

impl ScrollOptions {
    pub fn in_scene(scene: impl Into<SceneId>) -> Self {
        Self {
            scene: Some(scene.into()),
            ..Self::default()
        }
    }
}

/// Hook invoked for every non-whitespace character typed.
pub type TypeCueHook = Arc<dyn Fn(char) + Send + Sync>;

/// Visual handoff between two scenes, as driven by the scene state machine.
pub trait ScreenTransition: Send + Sync {
    fn transition_screens<'a>(&'a self, from: &'a SceneId, to: &'a SceneId) -> BoxFuture<'a, ()>;
}

/// Executes reveals, typing, scrolling and scene handoffs against a [`Stage`].
pub struct Choreographer {
    config: ChoreographyConfig,
    clock: Arc<dyn Clock>,
    stage: Stage,
    audio: Option<Arc<AudioSystem>>,
    type_cue: Option<TypeCueHook>,
    paused: AtomicBool,
    hidden: AtomicBool,
    routines: Mutex<HashMap<SceneId, Score>>,
}

impl fmt::Debug for Choreographer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Choreographer")
            .field("config", &self.config)
            .field("stage", &self.stage)
            .field("audio", &self.audio.is_some())
            .field("paused", &self.is_paused())
            .field("routines", &self.lock_routines().len())
            .finish()
    }
}

impl Choreographer {
    pub fn new(config: ChoreographyConfig, clock: Arc<dyn Clock>, stage: Stage) -> Self {
        Self {
            config,
            clock,
            stage,
            audio: None,
            type_cue: None,
            paused: AtomicBool::new(false),
            hidden: AtomicBool::new(false),
            routines: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_audio(mut self, audio: Arc<AudioSystem>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Replaces the default typing cue (the `type` sound) with a custom hook.
    pub fn with_type_cue(mut self, hook: impl Fn(char) + Send + Sync + 'static) -> Self {
        self.type_cue = Some(Arc::new(hook));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn config(&self) -> &ChoreographyConfig {
        &self.config
    }

    /// Registers the reveal routine played after a transition into `scene`.
    pub fn register_routine(&self, scene: impl Into<SceneId>, score: Score) {
        self.lock_routines().insert(scene.into(), score);
    }

    pub fn routine(&self, scene: &SceneId) -> Option<Score> {
        self.lock_routines().get(scene).cloned()
    }

    fn lock_routines(&self) -> MutexGuard<'_, HashMap<SceneId, Score>> {
        self.routines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The suspension point of the whole choreography.
    pub async fn delay(&self, duration: Duration) {
        if !duration.is_zero() {
            self.clock.sleep(duration).await;
        }
    }

    pub fn pause_animations(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            tracing::debug!("animations paused");
        }
    }

    pub fn resume_animations(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            tracing::debug!("animations resumed");
        }
    }

    /// Page visibility. A hidden page holds the choreography like a pause,
    /// without touching a pause the user asked for.
    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::Release);
        tracing::debug!(hidden, "visibility changed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire) || self.hidden.load(Ordering::Acquire)
    }

    /// Blocks, in short polling delays, until neither pause nor visibility
    /// holds the choreography.
    pub async fn wait_while_paused(&self) {
        let poll = self.config.pause_poll();
        while self.is_paused() {
            self.delay(poll).await;
        }
    }

    /// Runs `action` once after `after`. One-shot actions are not held back
    /// by [`Choreographer::pause_animations`].
    pub fn schedule_once(&self, after: Duration, action: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        let clock = self.clock.clone();
        tokio::spawn(async move {
            clock.sleep(after).await;
            action();
        })
    }

    /// Animates an element from the concealed state into view. Missing or
    /// detached elements are skipped.
    pub fn reveal_element(&self, element: Option<&ElementHandle>, duration: Duration, easing: Easing) -> bool {
        let Some(element) = usable(element) else {
            tracing::warn!("reveal skipped, element missing");
            return false;
        };

        element.set_visual(VisualState::CONCEALED);
        element.flush_layout();
        element.animate(VisualState::SHOWN, duration, easing);
        element.set_marker(Marker::Revealed, true);
        true
    }

    /// Issues one reveal per element, `options.delay` apart when staggered or
    /// all at once otherwise. Returns after the last reveal has been issued;
    /// the animations themselves may still be running.
    pub async fn reveal_sequence(&self, elements: &[Option<ElementHandle>], options: RevealOptions) -> usize {
        let targets: Vec<&ElementHandle> = elements.iter().flatten().collect();
        let issued = targets.len();

        for (index, element) in targets.into_iter().enumerate() {
            if options.stagger && index > 0 {
                self.delay(options.delay).await;
                self.wait_while_paused().await;
            }
            self.reveal_element(Some(element), options.duration, options.easing);
        }
        issued
    }

    /// Types `text` into `element` one character every `speed`.
    pub async fn type_text(&self, element: Option<&ElementHandle>, text: &str, speed: Duration) -> bool {
        let Some(element) = usable(element) else {
            tracing::warn!("typing skipped, element missing");
            return false;
        };

        element.clear_text();
        let mut buffer = [0_u8; 4];
        for unit in text.chars() {
            self.wait_while_paused().await;
            element.append_text(unit.encode_utf8(&mut buffer));
            if !unit.is_whitespace() {
                self.emit_type_cue(unit).await;
            }
            self.delay(speed).await;
        }
        true
    }

    async fn emit_type_cue(&self, unit: char) {
        match (&self.type_cue, &self.audio) {
            (Some(hook), _) => hook(unit),
            (None, Some(audio)) => {
                audio.play(TYPE_CUE, PlayOptions::default()).await;
            }
            (None, None) => {}
        }
    }

    /// Scrolls the target's scroll context so the target sits `offset` below
    /// its top edge. Native smooth scrolling is used when available.
    pub async fn smooth_scroll_to(&self, target: Option<&ElementHandle>, options: &ScrollOptions) -> bool {
        let Some(element) = usable(target) else {
            tracing::warn!("scroll skipped, target missing");
            return false;
        };

        let force_document = options.force_document
            || (options.scene.is_some() && options.scene == self.config.document_scroll_scene);
        let parent = element.scroll_parent();
        let nested = parent.as_ref().filter(|_| !force_document);

        let surface: SurfaceHandle = match nested {
            Some(container) => container.clone(),
            None => match self.stage.document() {
                Some(document) => document.clone(),
                None => {
                    tracing::warn!(element = element.label(), "scroll skipped, no document surface");
                    return false;
                }
            },
        };

        let mut top = element.offset_top();
        if nested.is_none() {
            if let Some(parent) = &parent {
                top += parent.offset_top() - parent.scroll_top();
            }
        }
        let offset = options.offset.unwrap_or(self.config.scroll_offset);
        let destination = (top - offset).max(0.0).min(surface.max_scroll().max(0.0));

        tracing::debug!(
            element = element.label(),
            surface = surface.label(),
            destination,
            "scrolling"
        );

        if surface.supports_smooth_scroll() {
            surface.smooth_scroll_to(destination);
        } else {
            let duration = options.duration.unwrap_or_else(|| self.config.scroll());
            self.animate_scroll(surface.as_ref(), destination, duration).await;
        }
        true
    }

    async fn animate_scroll(&self, surface: &dyn ScrollSurface, destination: f64, duration: Duration) {
        let start = surface.scroll_top();
        let distance = destination - start;
        if distance.abs() < 0.5 || duration.is_zero() {
            surface.set_scroll_top(destination);
            return;
        }

        let frame = self.config.frame();
        let mut elapsed = Duration::ZERO;
        loop {
            let progress = (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0);
            if progress >= 1.0 {
                surface.set_scroll_top(destination);
                break;
            }
            let eased = f64::from(Easing::EaseOutCubic.apply(progress));
            surface.set_scroll_top(start + distance * eased);

            self.wait_while_paused().await;
            self.delay(frame).await;
            elapsed += frame;
        }
    }

    /// Hands the display from one scene to another: fade out, swap the
    /// active screen, reset scrolling and reveal markers, fade in, then play
    /// the target scene's routine.
    pub async fn transition_screens(&self, from: Option<&SceneId>, to: &SceneId) {
        let fade = self.config.fade();
        tracing::info!(from = from.map(SceneId::as_str), to = %to, "transitioning screens");

        if let Some(screen) = from.and_then(|scene| self.stage.screen(scene)) {
            screen.animate(VisualState::FADED, fade, Easing::EaseInOut);
            self.delay(fade).await;
        }

        self.stage.activate(from, to);
        self.reset_scroll();
        self.reset_reveals(to);

        if let Some(screen) = self.stage.screen(to) {
            screen.set_visual(VisualState::FADED);
            screen.flush_layout();
            screen.animate(VisualState::SHOWN, fade, Easing::EaseInOut);
            self.delay(fade).await;
        }

        self.delay(self.config.settle()).await;
        self.play_routine(to).await;
    }

    fn reset_scroll(&self) {
        for surface in self.stage.scroll_surfaces() {
            surface.set_scroll_top(0.0);
        }
    }

    fn reset_reveals(&self, scene: &SceneId) {
        let Some(score) = self.routine(scene) else {
            return;
        };
        for element in score.elements() {
            element.set_marker(Marker::Revealed, false);
            element.set_visual(VisualState::CONCEALED);
        }
    }

    /// Plays the routine registered for `scene`, if any.
    pub async fn play_routine(&self, scene: &SceneId) -> bool {
        match self.routine(scene) {
            Some(score) => {
                self.perform(&score).await;
                true
            }
            None => {
                tracing::debug!(scene = %scene, "no reveal routine registered");
                false
            }
        }
    }

    /// Executes the steps of `score` strictly in order. Returns the number of
    /// steps whose action completed.
    pub async fn perform(&self, score: &Score) -> usize {
        let mut completed = 0;
        for (index, step) in score.steps().iter().enumerate() {
            self.wait_while_paused().await;
            self.delay(step.delay).await;
            self.wait_while_paused().await;

            if let Some(cue) = &step.cue {
                self.cue(&cue.sound, cue.options).await;
            }

            let done = match &step.action {
                StepAction::Wait => true,
                StepAction::Reveal {
                    element,
                    duration,
                    easing,
                } => self.reveal_element(element.as_ref(), *duration, *easing),
                StepAction::RevealGroup { elements, options } => {
                    self.reveal_sequence(elements, *options).await > 0
                }
                StepAction::TypeText {
                    element,
                    text,
                    speed,
                } => self.type_text(element.as_ref(), text, *speed).await,
                StepAction::ScrollTo { target, options } => {
                    self.smooth_scroll_to(target.as_ref(), options).await
                }
                StepAction::Invoke(callback) => {
                    callback();
                    true
                }
            };

            if done {
                completed += 1;
            } else {
                tracing::debug!(score = score.name(), step = index, "step skipped");
            }
        }
        completed
    }

    /// Plays a cue through the audio subsystem, if one is attached.
    pub async fn cue(&self, sound: &str, options: PlayOptions) {
        if let Some(audio) = &self.audio {
            audio.play(sound, options).await;
        }
    }
}

impl ScreenTransition for Choreographer {
    fn transition_screens<'a>(&'a self, from: &'a SceneId, to: &'a SceneId) -> BoxFuture<'a, ()> {
        Choreographer::transition_screens(self, Some(from), to).boxed()
    }
}

fn usable(element: Option<&ElementHandle>) -> Option<&ElementHandle> {
    element.filter(|element| element.is_attached())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::render::{HeadlessElement, HeadlessSurface, RenderEventKind};
    use crate::timeline::SequenceStep;
    use crate::TokioClock;

    fn choreographer(clock: &Arc<dyn Clock>, stage: Stage) -> Choreographer {
        Choreographer::new(ChoreographyConfig::default(), clock.clone(), stage)
    }

    fn element(label: &str, clock: &Arc<dyn Clock>) -> Arc<HeadlessElement> {
        Arc::new(HeadlessElement::new(label, clock.clone()))
    }

    fn some(element: &Arc<HeadlessElement>) -> Option<ElementHandle> {
        Some(element.clone())
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_reveals_start_at_multiples_of_delay() {
        let clock = TokioClock::new().shared();
        let chor = choreographer(&clock, Stage::new());
        let items: Vec<_> = (0..3).map(|i| element(&format!("e{i}"), &clock)).collect();
        let handles = vec![some(&items[0]), None, some(&items[1]), some(&items[2])];

        let options = RevealOptions {
            duration: ms(2_000),
            ..RevealOptions::staggered(ms(100))
        };
        let issued = chor.reveal_sequence(&handles, options).await;

        assert_eq!(issued, 3);
        let starts: Vec<_> = items.iter().map(|e| e.reveal_times()[0]).collect();
        assert_eq!(starts, vec![ms(0), ms(100), ms(200)]);
        assert_eq!(clock.now(), ms(200));
    }

    #[tokio::test(start_paused = true)]
    async fn unstaggered_reveals_start_together() {
        let clock = TokioClock::new().shared();
        let chor = choreographer(&clock, Stage::new());
        let a = element("a", &clock);
        let b = element("b", &clock);

        chor.reveal_sequence(&[some(&a), some(&b)], RevealOptions::together())
            .await;

        assert_eq!(a.reveal_times(), vec![ms(0)]);
        assert_eq!(b.reveal_times(), vec![ms(0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_conceals_flushes_then_animates() {
        let clock = TokioClock::new().shared();
        let chor = choreographer(&clock, Stage::new());
        let title = element("title", &clock);
        let handle: ElementHandle = title.clone();

        assert!(chor.reveal_element(Some(&handle), ms(400), Easing::EaseOut));

        let kinds: Vec<_> = title.events().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds[0], RenderEventKind::Visual(VisualState::CONCEALED));
        assert_eq!(kinds[1], RenderEventKind::Flush);
        assert!(matches!(kinds[2], RenderEventKind::Animate { to, .. } if to == VisualState::SHOWN));
        assert!(title.has_marker(Marker::Revealed));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_targets_are_skipped() {
        let clock = TokioClock::new().shared();
        let chor = choreographer(&clock, Stage::new());
        let gone: ElementHandle = Arc::new(HeadlessElement::new("gone", clock.clone()).detached());

        assert!(!chor.reveal_element(None, ms(100), Easing::Linear));
        assert!(!chor.reveal_element(Some(&gone), ms(100), Easing::Linear));
        assert!(!chor.type_text(Some(&gone), "hello", ms(10)).await);
        assert!(!chor.smooth_scroll_to(None, &ScrollOptions::default()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_cues_only_visible_characters() {
        let clock = TokioClock::new().shared();
        let typed = Arc::new(AtomicUsize::new(0));
        let counter = typed.clone();
        let chor = choreographer(&clock, Stage::new()).with_type_cue(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let line = element("line", &clock);
        let handle: ElementHandle = line.clone();

        assert!(chor.type_text(Some(&handle), "GO NOW", ms(20)).await);

        assert_eq!(line.text(), "GO NOW");
        assert_eq!(typed.load(Ordering::Relaxed), 5);
        assert_eq!(clock.now(), ms(120));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_holds_typing_until_visible() {
        let clock = TokioClock::new().shared();
        let chor = Arc::new(choreographer(&clock, Stage::new()));
        let line = element("line", &clock);
        let handle: ElementHandle = line.clone();

        chor.set_hidden(true);
        chor.pause_animations();
        let task = tokio::spawn({
            let chor = chor.clone();
            async move { chor.type_text(Some(&handle), "OK", ms(10)).await }
        });

        tokio::time::sleep(ms(500)).await;
        assert_eq!(line.text(), "");
        chor.set_hidden(false);
        tokio::time::sleep(ms(500)).await;
        assert_eq!(line.text(), "", "user pause still holds");
        chor.resume_animations();

        assert!(task.await.unwrap());
        assert_eq!(line.text(), "OK");
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_actions_ignore_pause() {
        let clock = TokioClock::new().shared();
        let chor = choreographer(&clock, Stage::new());
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        chor.pause_animations();
        chor.schedule_once(ms(100), move || flag.store(true, Ordering::Release))
            .await
            .unwrap();

        assert!(fired.load(Ordering::Acquire));
        assert!(chor.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_scroll_eases_into_destination() {
        let clock = TokioClock::new().shared();
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()));
        let stage = Stage::new().with_document(document.clone());
        let chor = choreographer(&clock, stage);
        let target: ElementHandle = Arc::new(HeadlessElement::new("target", clock.clone()).at_offset(1_080.0));

        assert!(chor.smooth_scroll_to(Some(&target), &ScrollOptions::default()).await);

        let positions = document.positions();
        assert_eq!(positions.first().unwrap(), &(ms(0), 0.0));
        assert_eq!(positions.last().unwrap().1, 1_000.0);
        assert!(positions.last().unwrap().0 >= ms(800));
        assert!(positions.windows(2).all(|w| w[0].1 <= w[1].1));
        let midway = positions.iter().find(|(at, _)| *at >= ms(400)).unwrap().1;
        assert!(midway > 800.0, "ease-out front-loads the motion, got {midway}");
    }

    #[tokio::test(start_paused = true)]
    async fn native_smooth_scroll_is_preferred() {
        let clock = TokioClock::new().shared();
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()).with_native_smooth());
        let chor = choreographer(&clock, Stage::new().with_document(document.clone()));
        let target: ElementHandle = Arc::new(HeadlessElement::new("target", clock.clone()).at_offset(300.0));

        let options = ScrollOptions {
            offset: Some(0.0),
            ..ScrollOptions::default()
        };
        chor.smooth_scroll_to(Some(&target), &options).await;

        assert_eq!(document.smooth_requests(), vec![300.0]);
        assert!(document.positions().is_empty());
        assert_eq!(clock.now(), ms(0));
    }

    #[tokio::test(start_paused = true)]
    async fn nested_targets_scroll_their_container_except_in_document_scene() {
        let clock = TokioClock::new().shared();
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()).with_native_smooth());
        let panel = Arc::new(HeadlessSurface::new("panel", clock.clone()).at_offset(200.0).with_native_smooth());
        let stage = Stage::new()
            .with_document(document.clone())
            .with_container("mission", panel.clone());
        let chor = choreographer(&clock, stage);
        let target: ElementHandle = Arc::new(
            HeadlessElement::new("objective", clock.clone())
                .at_offset(500.0)
                .inside(panel.clone()),
        );

        chor.smooth_scroll_to(Some(&target), &ScrollOptions::in_scene("briefing")).await;
        assert_eq!(document.smooth_requests(), vec![620.0]);
        assert!(panel.smooth_requests().is_empty());

        chor.smooth_scroll_to(Some(&target), &ScrollOptions::in_scene("mission")).await;
        assert_eq!(panel.smooth_requests(), vec![420.0]);
        assert_eq!(panel.scroll_top(), 420.0);
    }

    #[tokio::test(start_paused = true)]
    async fn document_scroll_uses_visible_position_of_scrolled_container() {
        let clock = TokioClock::new().shared();
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()).with_native_smooth());
        let panel = Arc::new(HeadlessSurface::new("panel", clock.clone()).at_offset(200.0).with_native_smooth());
        panel.set_scroll_top(420.0);
        let chor = choreographer(&clock, Stage::new().with_document(document.clone()));
        let target: ElementHandle = Arc::new(
            HeadlessElement::new("objective", clock.clone())
                .at_offset(500.0)
                .inside(panel.clone()),
        );

        let options = ScrollOptions {
            force_document: true,
            ..ScrollOptions::default()
        };
        chor.smooth_scroll_to(Some(&target), &options).await;

        // 500 inside the panel, panel at 200 scrolled by 420, minus the 80 offset
        assert_eq!(document.smooth_requests(), vec![200.0]);
        assert!(panel.smooth_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_the_next_staggered_reveal() {
        let clock = TokioClock::new().shared();
        let chor = Arc::new(choreographer(&clock, Stage::new()));
        let items: Vec<_> = (0..3).map(|i| element(&format!("row{i}"), &clock)).collect();
        let handles: Vec<_> = items.iter().map(some).collect();

        let task = tokio::spawn({
            let chor = chor.clone();
            async move { chor.reveal_sequence(&handles, RevealOptions::staggered(ms(100))).await }
        });

        tokio::time::sleep(ms(50)).await;
        chor.pause_animations();
        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(items[0].reveal_times(), vec![ms(0)]);
        assert!(items[1].reveal_times().is_empty());
        assert!(items[2].reveal_times().is_empty());

        chor.resume_animations();
        assert_eq!(task.await.unwrap(), 3);
        let second = items[1].reveal_times()[0];
        assert!(second >= ms(1_050), "second reveal at {second:?}");
        assert_eq!(items[2].reveal_times()[0] - second, ms(100));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_manual_scroll_between_frames() {
        let clock = TokioClock::new().shared();
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()));
        let chor = Arc::new(choreographer(&clock, Stage::new().with_document(document.clone())));
        let target: ElementHandle = Arc::new(HeadlessElement::new("target", clock.clone()).at_offset(1_080.0));

        let task = tokio::spawn({
            let chor = chor.clone();
            async move { chor.smooth_scroll_to(Some(&target), &ScrollOptions::default()).await }
        });

        tokio::time::sleep(ms(200)).await;
        chor.pause_animations();
        tokio::time::sleep(ms(100)).await;
        let frozen = document.positions();
        tokio::time::sleep(ms(2_000)).await;
        assert_eq!(document.positions(), frozen);
        assert!(frozen.last().unwrap().1 < 1_000.0);

        chor.resume_animations();
        assert!(task.await.unwrap());
        let last = *document.positions().last().unwrap();
        assert_eq!(last.1, 1_000.0);
        assert!(last.0 >= ms(2_300));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_fades_resets_and_dispatches_routine() {
        let clock = TokioClock::new().shared();
        let boot = element("boot-screen", &clock);
        let auth = element("auth-screen", &clock);
        let prompt = element("prompt", &clock);
        let document = Arc::new(HeadlessSurface::new("document", clock.clone()));
        let outer = Arc::new(HeadlessSurface::new("outer", clock.clone()));
        document.set_scroll_top(340.0);
        outer.set_scroll_top(90.0);
        let stage = Stage::new()
            .with_screen("boot", boot.clone())
            .with_screen("auth", auth.clone())
            .with_document(document.clone())
            .with_outer(outer.clone());
        let chor = choreographer(&clock, stage);
        chor.register_routine(
            "auth",
            Score::new("auth").then(SequenceStep::reveal(some(&prompt), ms(300))),
        );
        prompt.set_marker(Marker::Revealed, true);

        ScreenTransition::transition_screens(&chor, &"boot".into(), &"auth".into()).await;

        assert!(auth.has_marker(Marker::Active));
        assert!(boot.has_marker(Marker::Hidden));
        assert_eq!(document.scroll_top(), 0.0);
        assert_eq!(outer.scroll_top(), 0.0);
        assert!(prompt
            .events()
            .iter()
            .any(|e| e.kind == RenderEventKind::Marker { marker: Marker::Revealed, on: false }));
        assert_eq!(prompt.reveal_times(), vec![ms(1_500)]);
        assert!(prompt.has_marker(Marker::Revealed));
    }

    #[tokio::test(start_paused = true)]
    async fn perform_runs_steps_in_order_with_cues() {
        let clock = TokioClock::new().shared();
        let device = crate::audio::HeadlessDevice::running();
        let audio = AudioSystem::new(crate::AudioConfig::default(), crate::SoundCatalog::mission(), clock.clone())
            .with_platform(Arc::new(crate::audio::HeadlessPlatform::new(device.clone())))
            .shared();
        audio.init();
        let chor = choreographer(&clock, Stage::new()).with_audio(audio);
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = order.clone();
        let title = element("title", &clock);

        let score = Score::new("demo")
            .then(SequenceStep::reveal(some(&title), ms(200)).with_cue("beep"))
            .then(SequenceStep::invoke(move || log.lock().unwrap().push("invoked")).after(ms(250)))
            .then(SequenceStep::reveal(None, ms(200)));

        let completed = chor.perform(&score).await;

        assert_eq!(completed, 2);
        assert_eq!(*order.lock().unwrap(), vec!["invoked"]);
        assert_eq!(title.reveal_times(), vec![ms(0)]);
        assert_eq!(device.tones()[0].frequency, 800.0);
        assert_eq!(clock.now(), ms(250));
    }
}
