//! Core library for the Mission Terminal presentation.
//!
//! The crate drives a scripted, audio-visual terminal experience: a scene
//! state machine validates and executes transitions, a choreographer turns
//! each scene into timed reveals, typing and scrolling, and the audio
//! subsystem plays sampled or synthesized cues in step with both. Rendering
//! and audio output sit behind small traits with headless implementations,
//! so the whole presentation can run (and be tested) without a display.

pub mod analysis;
pub mod assets;
pub mod audio;
pub mod choreography;
pub mod config;
pub mod error;
pub mod render;
pub mod scene;
pub mod state;
pub mod timeline;

pub use analysis::{ToneAnalysis, ToneAnalyzer};
pub use assets::{AssetClass, SoundCatalog, SoundDefinition};
pub use audio::{
    AudioDiagnostics, AudioSystem, FallbackReason, Gesture, LoadedSound, PlayOptions, Playback,
    PlaybackSource, PreloadReport, ThemeSource, UnlockOutcome,
};
pub use choreography::{Choreographer, RevealOptions, ScreenTransition, ScrollOptions};
pub use config::{AppConfig, AudioConfig, ChoreographyConfig, ScenesConfig};
pub use error::{Result, TerminalError};
pub use render::{Easing, Element, ElementHandle, Marker, ScrollSurface, Stage, SurfaceHandle};
pub use scene::{SceneCues, SceneId, TransitionGraph};
pub use state::{Listener, MachineEvent, SceneStateMachine, StateChange};
pub use timeline::{Clock, Score, SequenceStep, StepAction, TokioClock};
