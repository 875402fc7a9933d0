//! Scene state machine: the current scene, the visit history and the
//! listeners told about every change.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use crate::choreography::ScreenTransition;
use crate::render::Stage;
use crate::scene::{SceneCues, SceneId, TransitionGraph};
use crate::{AudioSystem, PlayOptions, Result, ScenesConfig, TerminalError};

/// Payload delivered to state listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub from: SceneId,
    pub to: SceneId,
}

/// Events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineEvent {
    StateChange,
}

impl MachineEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::StateChange => "stateChange",
        }
    }
}

impl FromStr for MachineEvent {
    type Err = TerminalError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "stateChange" | "state_change" => Ok(Self::StateChange),
            other => Err(TerminalError::msg(format!("unknown machine event '{other}'"))),
        }
    }
}

pub type Listener = Arc<dyn Fn(&StateChange) -> Result<()> + Send + Sync>;

/// Owns the current scene and validates every change against the graph.
pub struct SceneStateMachine {
    current: SceneId,
    history: Vec<SceneId>,
    graph: TransitionGraph,
    cues: SceneCues,
    listeners: Vec<(MachineEvent, Listener)>,
    audio: Option<Arc<AudioSystem>>,
    stage: Option<Stage>,
}

impl fmt::Debug for SceneStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneStateMachine")
            .field("current", &self.current)
            .field("history", &self.history)
            .field("listeners", &self.listeners.len())
            .field("audio", &self.audio.is_some())
            .finish()
    }
}

impl SceneStateMachine {
    pub fn new(initial: impl Into<SceneId>, graph: TransitionGraph) -> Self {
        let initial = initial.into();
        if !graph.contains(&initial) {
            tracing::warn!(scene = %initial, "initial scene is not part of the transition graph");
        }
        Self {
            history: vec![initial.clone()],
            current: initial,
            graph,
            cues: SceneCues::default(),
            listeners: Vec::new(),
            audio: None,
            stage: None,
        }
    }

    pub fn from_config(config: &ScenesConfig) -> Self {
        Self::new(config.initial.clone(), config.graph.clone()).with_cues(config.cues.clone())
    }

    pub fn with_cues(mut self, cues: SceneCues) -> Self {
        self.cues = cues;
        self
    }

    pub fn with_audio(mut self, audio: Arc<AudioSystem>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Stage toggled directly when a transition runs without a choreographer.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn current(&self) -> &SceneId {
        &self.current
    }

    /// Scenes visited so far, starting with the initial one.
    pub fn history(&self) -> Vec<SceneId> {
        self.history.clone()
    }

    pub fn graph(&self) -> &TransitionGraph {
        &self.graph
    }

    pub fn can_transition(&self, target: &SceneId) -> bool {
        self.graph.allows(&self.current, target)
    }

    pub fn on(&mut self, event: MachineEvent, listener: Listener) {
        self.listeners.push((event, listener));
    }

    /// Removes the registration of exactly this listener handle.
    pub fn off(&mut self, event: MachineEvent, listener: &Listener) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|(kind, registered)| !(*kind == event && same_listener(registered, listener)));
        self.listeners.len() != before
    }

    /// Moves to `target` if the graph allows it. Listeners run in
    /// registration order before any cue is played; a failing listener is
    /// logged and does not affect the others.
    pub async fn transition(
        &mut self,
        target: impl Into<SceneId>,
        choreographer: Option<&dyn ScreenTransition>,
    ) -> bool {
        let target = target.into();
        if !self.can_transition(&target) {
            tracing::warn!(from = %self.current, to = %target, "invalid scene transition");
            return false;
        }

        let from = std::mem::replace(&mut self.current, target.clone());
        self.history.push(target.clone());
        tracing::info!(from = %from, to = %target, "scene transition");

        let change = StateChange {
            from: from.clone(),
            to: target.clone(),
        };
        self.notify(MachineEvent::StateChange, &change);

        let transition_cue = self.cues.transition_cue(&from, &target).to_string();
        self.cue(&transition_cue).await;

        match choreographer {
            Some(choreographer) => choreographer.transition_screens(&from, &target).await,
            None => match &self.stage {
                Some(stage) => stage.activate(Some(&from), &target),
                None => tracing::debug!(to = %target, "no stage attached, visibility unchanged"),
            },
        }

        if let Some(contextual) = self.cues.contextual_cue(&target).map(str::to_string) {
            self.cue(&contextual).await;
        }
        true
    }

    fn notify(&self, event: MachineEvent, change: &StateChange) {
        for (index, (kind, listener)) in self.listeners.iter().enumerate() {
            if *kind != event {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(change))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(event = event.name(), listener = index, %err, "state listener failed");
                }
                Err(payload) => {
                    tracing::error!(
                        event = event.name(),
                        listener = index,
                        panic = panic_message(payload.as_ref()),
                        "state listener panicked"
                    );
                }
            }
        }
    }

    async fn cue(&self, sound: &str) {
        if let Some(audio) = &self.audio {
            audio.play(sound, PlayOptions::default()).await;
        }
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
