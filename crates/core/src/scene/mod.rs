use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Result, TerminalError};

pub const WAKE: &str = "wake";
pub const BOOT: &str = "boot";
pub const AUTH: &str = "auth";
pub const MISSION: &str = "mission";
pub const BRIEFING: &str = "briefing";
pub const COUNTDOWN: &str = "countdown";
pub const DECLINED: &str = "declined";
pub const CREDITS: &str = "credits";

/// Opaque identifier naming a presentation state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SceneId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SceneId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for SceneId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SceneId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Directed adjacency structure listing which scene changes are permitted.
///
/// The graph is allowed to contain cycles; the terminal scenes of the
/// mission loop back to `wake`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionGraph {
    edges: BTreeMap<SceneId, BTreeSet<SceneId>>,
}

impl TransitionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The graph driving the mission terminal experience.
    pub fn mission() -> Self {
        Self::new()
            .with_edges(WAKE, &[BOOT])
            .with_edges(BOOT, &[AUTH])
            .with_edges(AUTH, &[MISSION])
            .with_edges(MISSION, &[BRIEFING, DECLINED])
            .with_edges(BRIEFING, &[COUNTDOWN, DECLINED])
            .with_edges(COUNTDOWN, &[CREDITS])
            .with_edges(DECLINED, &[WAKE])
            .with_edges(CREDITS, &[WAKE])
    }

    /// Builder variant of [`TransitionGraph::add_edge`] for several targets.
    pub fn with_edges(mut self, from: &str, targets: &[&str]) -> Self {
        for target in targets {
            self.add_edge(SceneId::from(from), SceneId::from(*target));
        }
        if targets.is_empty() {
            self.edges.entry(SceneId::from(from)).or_default();
        }
        self
    }

    pub fn add_edge(&mut self, from: SceneId, to: SceneId) {
        self.edges.entry(from).or_default().insert(to);
    }

    /// Returns `true` when `to` is reachable from `from` in a single step.
    pub fn allows(&self, from: &SceneId, to: &SceneId) -> bool {
        self.edges
            .get(from)
            .map(|targets| targets.contains(to))
            .unwrap_or(false)
    }

    /// Scenes reachable from `from` by a single transition.
    pub fn reachable(&self, from: &SceneId) -> impl Iterator<Item = &SceneId> {
        self.edges.get(from).into_iter().flatten()
    }

    /// Every scene mentioned by the graph, either as a source or a target.
    pub fn scenes(&self) -> BTreeSet<&SceneId> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| std::iter::once(from).chain(targets.iter()))
            .collect()
    }

    /// Looks up a scene by name, failing for scenes the graph never mentions.
    pub fn resolve(&self, scene: &str) -> Result<SceneId> {
        let id = SceneId::from(scene);
        if self.contains(&id) {
            Ok(id)
        } else {
            Err(TerminalError::UnknownScene(scene.to_string()))
        }
    }

    pub fn contains(&self, scene: &SceneId) -> bool {
        self.edges.contains_key(scene) || self.edges.values().any(|targets| targets.contains(scene))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&SceneId, &SceneId)> {
        self.edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from, to)))
    }
}

/// Sound cue emitted for a specific `(from, to)` scene change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCue {
    pub from: SceneId,
    pub to: SceneId,
    pub cue: String,
}

/// Audio cues keyed by scene changes and by the scene being entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneCues {
    pub transitions: Vec<TransitionCue>,
    pub default_transition: String,
    pub contextual: BTreeMap<SceneId, String>,
}

impl Default for SceneCues {
    fn default() -> Self {
        let pair = |from: &str, to: &str, cue: &str| TransitionCue {
            from: from.into(),
            to: to.into(),
            cue: cue.to_string(),
        };

        let contextual = [
            (BOOT, "boot"),
            (AUTH, "terminal"),
            (MISSION, "alert"),
            (BRIEFING, "data"),
            (COUNTDOWN, "countdown"),
            (DECLINED, "error"),
            (CREDITS, "success"),
        ]
        .into_iter()
        .map(|(scene, cue)| (SceneId::from(scene), cue.to_string()))
        .collect();

        Self {
            transitions: vec![
                pair(WAKE, BOOT, "power_on"),
                pair(AUTH, MISSION, "access_granted"),
                pair(MISSION, DECLINED, "access_denied"),
                pair(BRIEFING, DECLINED, "access_denied"),
                pair(BRIEFING, COUNTDOWN, "alert"),
                pair(COUNTDOWN, CREDITS, "success"),
            ],
            default_transition: "transition".to_string(),
            contextual,
        }
    }
}

impl SceneCues {
    /// Cue for the given scene change, falling back to the default cue for
    /// pairs without a dedicated entry.
    pub fn transition_cue(&self, from: &SceneId, to: &SceneId) -> &str {
        self.transitions
            .iter()
            .find(|entry| &entry.from == from && &entry.to == to)
            .map(|entry| entry.cue.as_str())
            .unwrap_or(&self.default_transition)
    }

    /// Cue played once a scene has been entered, if the scene has one.
    pub fn contextual_cue(&self, scene: &SceneId) -> Option<&str> {
        self.contextual.get(scene).map(String::as_str)
    }
}
