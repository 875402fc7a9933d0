//! Headless walkthrough of the mission terminal.
//!
//! Every scene gets a heading and a few typed lines on an in-memory stage;
//! the state machine then walks the mission graph with the choreographer
//! and audio subsystem attached, exactly as a display front end would.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use mission_terminal_core::audio::{
    HeadlessDevice, HeadlessPlatform, HeadlessSampleBank, ThemeSource,
};
use mission_terminal_core::render::{HeadlessElement, HeadlessSurface};
use mission_terminal_core::scene;
use mission_terminal_core::{
    AppConfig, AudioDiagnostics, AudioSystem, Choreographer, Clock, Element, ElementHandle,
    Gesture, MachineEvent, PreloadReport, RevealOptions, SceneId, SceneStateMachine, Score,
    ScreenTransition, ScrollOptions, SequenceStep, Stage, StateChange, TokioClock,
};
use serde::Serialize;

const TYPING_SPEED: Duration = Duration::from_millis(30);
const LINE_PAUSE: Duration = Duration::from_millis(250);
const HEADING_HEIGHT: f64 = 120.0;
const LINE_HEIGHT: f64 = 48.0;

/// Heading and typed lines of each scene.
const SCRIPT: &[(&str, &str, &[&str])] = &[
    (scene::WAKE, "AWAITING OPERATOR", &["PRESS ANY KEY TO CONTINUE"]),
    (
        scene::BOOT,
        "MISSION TERMINAL v2.4",
        &["LOADING KERNEL MODULES", "OPENING SECURE CHANNEL", "SYSTEM READY"],
    ),
    (
        scene::AUTH,
        "AUTHENTICATION REQUIRED",
        &["SCANNING CREDENTIALS", "IDENTITY CONFIRMED"],
    ),
    (
        scene::MISSION,
        "MISSION DOSSIER",
        &["OBJECTIVE: RECOVER THE ARCHIVE", "RISK LEVEL: SEVERE", "ACCEPT OR DECLINE"],
    ),
    (
        scene::BRIEFING,
        "BRIEFING",
        &["INSERTION AT 0400", "EXTRACTION AT 0630", "NO BACKUP AVAILABLE"],
    ),
    (
        scene::COUNTDOWN,
        "LAUNCH SEQUENCE",
        &["T-MINUS 3", "T-MINUS 2", "T-MINUS 1"],
    ),
    (scene::DECLINED, "MISSION DECLINED", &["THIS TERMINAL WILL NOW RESET"]),
    (scene::CREDITS, "MISSION COMPLETE", &["THANK YOU, OPERATOR"]),
];

/// One typed line as it ended up on the stage.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub scene: String,
    pub element: String,
    pub text: String,
}

/// Summary printed once the walkthrough finishes.
#[derive(Debug, Clone, Serialize)]
pub struct WalkthroughReport {
    pub visited: Vec<String>,
    pub preload: PreloadReport,
    pub diagnostics: AudioDiagnostics,
    pub tones_played: usize,
    pub samples_played: usize,
    pub theme_drop_ms: Option<u64>,
    pub elapsed_ms: u64,
    pub transcript: Vec<TranscriptLine>,
}

struct SceneContent {
    scene: SceneId,
    lines: Vec<Arc<HeadlessElement>>,
}

/// Fully wired headless terminal.
pub struct Terminal {
    clock: Arc<dyn Clock>,
    audio: Arc<AudioSystem>,
    choreographer: Arc<Choreographer>,
    machine: SceneStateMachine,
    device: HeadlessDevice,
    samples: HeadlessSampleBank,
    contents: Vec<SceneContent>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl Terminal {
    pub fn build(config: &AppConfig, speed: f64) -> Self {
        let clock = TokioClock::with_speed(speed).shared();
        let device = HeadlessDevice::suspended();
        let samples = HeadlessSampleBank::new();
        let audio = AudioSystem::new(config.audio.clone(), config.catalog.clone(), clock.clone())
            .with_platform(Arc::new(HeadlessPlatform::new(device.clone())))
            .with_samples(Arc::new(samples.clone()))
            .shared();

        let document = HeadlessSurface::new("document", clock.clone()).handle();
        let outer = HeadlessSurface::new("outer", clock.clone()).handle();
        let mut stage = Stage::new().with_document(document).with_outer(outer);
        let mut routines = Vec::new();
        let mut contents = Vec::new();

        for (index, scene_name) in config.scenes.graph.scenes().into_iter().enumerate() {
            let scene_id = scene_name.clone();
            let container = HeadlessSurface::new(format!("{scene_id}-container"), clock.clone())
                .at_offset(index as f64 * 900.0)
                .handle();
            let screen = HeadlessElement::new(format!("{scene_id}-screen"), clock.clone()).handle();
            stage = stage
                .with_screen(scene_id.clone(), screen)
                .with_container(scene_id.clone(), container.clone());

            let (heading_text, lines_text) = script_for(&scene_id);
            let heading = Arc::new(
                HeadlessElement::new(format!("{scene_id}-heading"), clock.clone())
                    .inside(container.clone()),
            );
            heading.append_text(heading_text);
            let lines: Vec<Arc<HeadlessElement>> = lines_text
                .iter()
                .enumerate()
                .map(|(row, _)| {
                    Arc::new(
                        HeadlessElement::new(format!("{scene_id}-line-{row}"), clock.clone())
                            .at_offset(HEADING_HEIGHT + LINE_HEIGHT * row as f64)
                            .inside(container.clone()),
                    )
                })
                .collect();

            let score = routine(&scene_id, &heading, &lines, lines_text, config.choreography.reveal());
            routines.push((scene_id.clone(), score));
            contents.push(SceneContent {
                scene: scene_id,
                lines,
            });
        }

        let choreographer = Choreographer::new(config.choreography.clone(), clock.clone(), stage)
            .with_audio(audio.clone())
            .shared();
        for (scene_id, score) in routines {
            choreographer.register_routine(scene_id, score);
        }

        let visited = Arc::new(Mutex::new(vec![config.scenes.initial.to_string()]));
        let mut machine = SceneStateMachine::from_config(&config.scenes).with_audio(audio.clone());
        let log = visited.clone();
        machine.on(
            MachineEvent::StateChange,
            Arc::new(move |change: &StateChange| -> mission_terminal_core::Result<()> {
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(change.to.to_string());
                Ok(())
            }),
        );

        Self {
            clock,
            audio,
            choreographer,
            machine,
            device,
            samples,
            contents,
            visited,
        }
    }

    /// Runs the whole experience: audio start-up, the initial scene, then
    /// every scene of the chosen path.
    pub async fn run(mut self, declined: bool, gesture: Gesture) -> WalkthroughReport {
        let started = self.clock.now();
        self.audio.init();
        let preload = self.audio.preload().await;
        if self.audio.diagnostics().needs_gesture() {
            let outcome = self.audio.handle_gesture(gesture).await;
            tracing::info!(?outcome, gesture = gesture.event_name(), "operator gesture");
        }
        self.audio.start_ambient_system();

        let initial = self.machine.current().clone();
        self.choreographer.transition_screens(None, &initial).await;

        let path: &[&str] = if declined {
            &[scene::BOOT, scene::AUTH, scene::MISSION, scene::DECLINED, scene::WAKE]
        } else {
            &[scene::BOOT, scene::AUTH, scene::MISSION, scene::BRIEFING, scene::COUNTDOWN]
        };

        let mut theme_drop_ms = None;
        for target in path {
            let choreographer: &dyn ScreenTransition = self.choreographer.as_ref();
            if !self.machine.transition(*target, Some(choreographer)).await {
                tracing::warn!(scene = *target, "walkthrough stopped at an invalid edge");
                break;
            }
            if *target == scene::COUNTDOWN {
                theme_drop_ms = Some(self.countdown().await);
                for closing in [scene::CREDITS, scene::WAKE] {
                    self.machine.transition(closing, Some(choreographer)).await;
                }
            }
        }

        self.audio.stop_theme();
        self.audio.stop_ambient_system();

        WalkthroughReport {
            visited: self
                .visited
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            preload,
            diagnostics: self.audio.diagnostics(),
            tones_played: self.device.tones().len(),
            samples_played: self.samples.plays().len(),
            theme_drop_ms,
            elapsed_ms: (self.clock.now() - started).as_millis() as u64,
            transcript: self.transcript(),
        }
    }

    /// Plays the theme; the credits follow the drop.
    async fn countdown(&self) -> u64 {
        let dropped_at = AtomicU64::new(0);
        let clock = self.clock.clone();
        let source = self
            .audio
            .play_theme_with_sync(|| {
                dropped_at.store(clock.now().as_millis() as u64, Ordering::Release);
                tracing::info!("theme drop");
            })
            .await;
        if source == ThemeSource::Silent {
            tracing::warn!("theme was silent");
        }
        dropped_at.load(Ordering::Acquire)
    }

    fn transcript(&self) -> Vec<TranscriptLine> {
        self.contents
            .iter()
            .flat_map(|content| {
                content.lines.iter().filter(|line| !line.text().is_empty()).map(|line| {
                    TranscriptLine {
                        scene: content.scene.to_string(),
                        element: line.label().to_string(),
                        text: line.text(),
                    }
                })
            })
            .collect()
    }
}

fn script_for(scene_id: &SceneId) -> (&'static str, &'static [&'static str]) {
    SCRIPT
        .iter()
        .find(|(name, _, _)| scene_id == name)
        .map(|(_, heading, lines)| (*heading, *lines))
        .unwrap_or(("", &[]))
}

/// Heading reveal, staggered line reveal, typing, and a final scroll to the
/// last line.
fn routine(
    scene_id: &SceneId,
    heading: &Arc<HeadlessElement>,
    lines: &[Arc<HeadlessElement>],
    text: &[&str],
    reveal: Duration,
) -> Score {
    let handles: Vec<Option<ElementHandle>> = lines.iter().map(handle).collect();
    let mut score = Score::new(scene_id.as_str())
        .then(SequenceStep::reveal(handle(heading), reveal).with_cue("click"))
        .then(
            SequenceStep::reveal_group(handles.clone(), RevealOptions::staggered(Duration::from_millis(120)))
                .after(Duration::from_millis(300)),
        );

    for (line, content) in handles.iter().zip(text) {
        score.push(SequenceStep::type_text(line.clone(), *content, TYPING_SPEED).after(LINE_PAUSE));
    }

    if let Some(last) = handles.last() {
        score.push(SequenceStep::scroll_to(last.clone(), ScrollOptions::in_scene(scene_id.clone())));
    }
    score
}

fn handle(element: &Arc<HeadlessElement>) -> Option<ElementHandle> {
    Some(element.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn accepted_walkthrough_loops_back_through_credits() {
        let terminal = Terminal::build(&AppConfig::default(), 1.0);
        let report = terminal.run(false, Gesture::KeyDown).await;

        assert_eq!(
            report.visited,
            vec!["wake", "boot", "auth", "mission", "briefing", "countdown", "credits", "wake"]
        );
        assert!(report.diagnostics.unlocked);
        assert!(!report.diagnostics.ambient_running);
        let catalog = AppConfig::default().catalog;
        let sampled = catalog.iter().filter(|sound| !sound.prefer_synthesized).count();
        assert_eq!(sampled, 15);
        assert_eq!(report.preload.sample_backed, sampled);
        assert!(report.samples_played > 0);
        assert!(report.transcript.iter().any(|line| line.text == "SYSTEM READY"));
        assert!(report.theme_drop_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn declined_walkthrough_returns_to_wake() {
        let terminal = Terminal::build(&AppConfig::default(), 1.0);
        let report = terminal.run(true, Gesture::Click).await;

        assert_eq!(report.visited.last().map(String::as_str), Some("wake"));
        assert!(report
            .transcript
            .iter()
            .any(|line| line.scene == "declined" && line.text == "THIS TERMINAL WILL NOW RESET"));
    }
}
