use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::MIN_THEME_DROP;
use crate::scene::{self, SceneCues, SceneId, TransitionGraph};
use crate::{Result, SoundCatalog};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub choreography: ChoreographyConfig,
    pub scenes: ScenesConfig,
    pub catalog: SoundCatalog,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            choreography: ChoreographyConfig::default(),
            scenes: ScenesConfig::default(),
            catalog: SoundCatalog::mission(),
        }
    }
}

impl AppConfig {
    /// Reads a JSON configuration file. Sections missing from the file keep
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub master_volume: f32,
    pub effect_timeout_ms: u64,
    pub theme_timeout_ms: u64,
    /// Offset of the theme's drop, where the synced callback fires.
    pub theme_drop_ms: u64,
    pub loop_theme: bool,
    /// Number of inaudible buffers played while unlocking the context.
    pub unlock_buffers: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            master_volume: 1.0,
            effect_timeout_ms: 3_000,
            theme_timeout_ms: 10_000,
            theme_drop_ms: 8_000,
            loop_theme: false,
            unlock_buffers: 2,
        }
    }
}

impl AudioConfig {
    pub fn effect_timeout(&self) -> Duration {
        Duration::from_millis(self.effect_timeout_ms)
    }

    pub fn theme_timeout(&self) -> Duration {
        Duration::from_millis(self.theme_timeout_ms)
    }

    /// Drop offset of the theme, never shorter than [`MIN_THEME_DROP`].
    pub fn theme_drop(&self) -> Duration {
        Duration::from_millis(self.theme_drop_ms).max(MIN_THEME_DROP)
    }
}

/// Timing constants of the choreography engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChoreographyConfig {
    pub fade_ms: u64,
    pub settle_ms: u64,
    pub scroll_ms: u64,
    pub scroll_offset: f64,
    pub pause_poll_ms: u64,
    pub frame_ms: u64,
    pub reveal_ms: u64,
    /// Scene whose scrolls always target the document rather than the
    /// nested scene container.
    pub document_scroll_scene: Option<SceneId>,
}

impl Default for ChoreographyConfig {
    fn default() -> Self {
        Self {
            fade_ms: 600,
            settle_ms: 300,
            scroll_ms: 800,
            scroll_offset: 80.0,
            pause_poll_ms: 50,
            frame_ms: 16,
            reveal_ms: 500,
            document_scroll_scene: Some(SceneId::from(scene::BRIEFING)),
        }
    }
}

impl ChoreographyConfig {
    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn scroll(&self) -> Duration {
        Duration::from_millis(self.scroll_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn frame(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }

    pub fn reveal(&self) -> Duration {
        Duration::from_millis(self.reveal_ms)
    }
}

/// Scene graph and the cues attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenesConfig {
    pub initial: SceneId,
    pub graph: TransitionGraph,
    pub cues: SceneCues,
}

impl Default for ScenesConfig {
    fn default() -> Self {
        Self {
            initial: SceneId::from(scene::WAKE),
            graph: TransitionGraph::mission(),
            cues: SceneCues::default(),
        }
    }
}
