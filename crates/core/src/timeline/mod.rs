use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};

use crate::{Easing, ElementHandle, PlayOptions, RevealOptions, ScrollOptions};

/// Source of time for every wait in the choreography.
///
/// Implementations must be cheap to share; the choreographer, the audio
/// subsystem and the headless render surfaces all hold the same clock.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since the clock was created.
    fn now(&self) -> Duration;

    /// Suspends the caller for `duration` of clock time.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Clock backed by the tokio timer. Under a paused tokio runtime (tests) the
/// clock advances only when every task is idle, which makes timing exact.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    speed: f64,
}

impl TokioClock {
    /// Accepted speed factors.
    pub const SPEED_RANGE: std::ops::RangeInclusive<f64> = 0.01..=1_000.0;

    pub fn new() -> Self {
        Self::with_speed(1.0)
    }

    /// Runs clock time `speed` times faster than wall time. The factor is
    /// clamped to [`TokioClock::SPEED_RANGE`]; a NaN factor means real time.
    pub fn with_speed(speed: f64) -> Self {
        let speed = if speed.is_nan() {
            1.0
        } else {
            speed.clamp(*Self::SPEED_RANGE.start(), *Self::SPEED_RANGE.end())
        };
        Self {
            origin: tokio::time::Instant::now(),
            speed,
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn shared(self) -> Arc<dyn Clock> {
        Arc::new(self)
    }

    fn is_real_time(&self) -> bool {
        (self.speed - 1.0).abs() < f64::EPSILON
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        let elapsed = self.origin.elapsed();
        if self.is_real_time() {
            elapsed
        } else {
            elapsed.mul_f64(self.speed)
        }
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let wall = if self.is_real_time() {
            duration
        } else {
            duration.div_f64(self.speed)
        };
        tokio::time::sleep(wall).boxed()
    }
}

/// Plain callback executed by [`StepAction::Invoke`].
pub type StepCallback = Arc<dyn Fn() + Send + Sync>;

/// Audio cue attached to a sequence step.
#[derive(Debug, Clone)]
pub struct StepCue {
    pub sound: String,
    pub options: PlayOptions,
}

/// What a step does once its delay has elapsed.
#[derive(Clone)]
pub enum StepAction {
    /// Nothing besides the optional cue.
    Wait,
    Reveal {
        element: Option<ElementHandle>,
        duration: Duration,
        easing: Easing,
    },
    RevealGroup {
        elements: Vec<Option<ElementHandle>>,
        options: RevealOptions,
    },
    TypeText {
        element: Option<ElementHandle>,
        text: String,
        speed: Duration,
    },
    ScrollTo {
        target: Option<ElementHandle>,
        options: ScrollOptions,
    },
    Invoke(StepCallback),
}

impl fmt::Debug for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wait => f.write_str("Wait"),
            Self::Reveal { element, duration, .. } => f
                .debug_struct("Reveal")
                .field("element", &element.as_ref().map(|e| e.label().to_string()))
                .field("duration", duration)
                .finish(),
            Self::RevealGroup { elements, options } => f
                .debug_struct("RevealGroup")
                .field("elements", &elements.len())
                .field("options", options)
                .finish(),
            Self::TypeText { text, speed, .. } => f
                .debug_struct("TypeText")
                .field("text", text)
                .field("speed", speed)
                .finish(),
            Self::ScrollTo { options, .. } => {
                f.debug_struct("ScrollTo").field("options", options).finish()
            }
            Self::Invoke(_) => f.write_str("Invoke"),
        }
    }
}

/// A unit of choreography: wait `delay`, play the cue, perform the action.
#[derive(Debug, Clone)]
pub struct SequenceStep {
    pub delay: Duration,
    pub action: StepAction,
    pub cue: Option<StepCue>,
}

impl SequenceStep {
    pub fn new(action: StepAction) -> Self {
        Self {
            delay: Duration::ZERO,
            action,
            cue: None,
        }
    }

    pub fn wait(delay: Duration) -> Self {
        Self::new(StepAction::Wait).after(delay)
    }

    pub fn reveal(element: Option<ElementHandle>, duration: Duration) -> Self {
        Self::new(StepAction::Reveal {
            element,
            duration,
            easing: Easing::EaseOut,
        })
    }

    pub fn reveal_group(elements: Vec<Option<ElementHandle>>, options: RevealOptions) -> Self {
        Self::new(StepAction::RevealGroup { elements, options })
    }

    pub fn type_text(element: Option<ElementHandle>, text: impl Into<String>, speed: Duration) -> Self {
        Self::new(StepAction::TypeText {
            element,
            text: text.into(),
            speed,
        })
    }

    pub fn scroll_to(target: Option<ElementHandle>, options: ScrollOptions) -> Self {
        Self::new(StepAction::ScrollTo { target, options })
    }

    pub fn invoke(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self::new(StepAction::Invoke(Arc::new(callback)))
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_cue(self, sound: impl Into<String>) -> Self {
        self.with_cue_options(sound, PlayOptions::default())
    }

    pub fn with_cue_options(mut self, sound: impl Into<String>, options: PlayOptions) -> Self {
        self.cue = Some(StepCue {
            sound: sound.into(),
            options,
        });
        self
    }

    /// Element handles this step touches, in declaration order.
    pub fn elements(&self) -> Vec<&ElementHandle> {
        match &self.action {
            StepAction::Reveal { element, .. } | StepAction::TypeText { element, .. } => {
                element.iter().collect()
            }
            StepAction::RevealGroup { elements, .. } => elements.iter().flatten().collect(),
            StepAction::ScrollTo { target, .. } => target.iter().collect(),
            StepAction::Wait | StepAction::Invoke(_) => Vec::new(),
        }
    }
}

/// Ordered list of steps making up one scene's reveal routine.
#[derive(Debug, Clone, Default)]
pub struct Score {
    name: String,
    steps: Vec<SequenceStep>,
}

impl Score {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn then(mut self, step: SequenceStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn push(&mut self, step: SequenceStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of the step delays, i.e. the earliest time the last step can start.
    pub fn scheduled_length(&self) -> Duration {
        self.steps.iter().map(|step| step.delay).sum()
    }

    /// Every element handle the score reveals, types into or scrolls to.
    pub fn elements(&self) -> Vec<&ElementHandle> {
        self.steps.iter().flat_map(SequenceStep::elements).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::HeadlessElement;

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_millis(250)).await;

        assert_eq!(clock.now(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_clock_scales_waits() {
        let clock = TokioClock::with_speed(4.0);
        let started = tokio::time::Instant::now();
        clock.sleep(Duration::from_secs(1)).await;

        assert_eq!(started.elapsed(), Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_secs(1));
    }

    #[test]
    fn speed_factor_is_bounded() {
        assert_eq!(TokioClock::with_speed(1e300).speed(), 1_000.0);
        assert_eq!(TokioClock::with_speed(f64::INFINITY).speed(), 1_000.0);
        assert_eq!(TokioClock::with_speed(0.0).speed(), 0.01);
        assert_eq!(TokioClock::with_speed(f64::NAN).speed(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn score_collects_elements_and_delays() {
        let clock = TokioClock::new().shared();
        let title = HeadlessElement::new("title", clock.clone()).handle();
        let body = HeadlessElement::new("body", clock).handle();

        let score = Score::new("boot")
            .then(SequenceStep::reveal(Some(title.clone()), Duration::from_millis(300)))
            .then(
                SequenceStep::type_text(Some(body.clone()), "ONLINE", Duration::from_millis(30))
                    .after(Duration::from_millis(500))
                    .with_cue("beep"),
            )
            .then(SequenceStep::wait(Duration::from_millis(200)));

        let labels: Vec<_> = score.elements().iter().map(|e| e.label().to_string()).collect();
        assert_eq!(labels, vec!["title", "body"]);
        assert_eq!(score.scheduled_length(), Duration::from_millis(700));
        assert_eq!(score.steps()[1].cue.as_ref().unwrap().sound, "beep");
    }
}
