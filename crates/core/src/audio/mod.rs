//! Audio cue subsystem.
//!
//! [`AudioSystem`] owns the synthesis context and the per-sound load state.
//! Every entry point degrades instead of failing: a sound whose sample is
//! missing, slow or rejected is synthesized, and a platform without any
//! audio context turns synthesis into a silent no-op.

pub mod device;
pub mod synth;
pub mod tone;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

pub use device::{
    AudioPlatform, ContextState, DeviceEvent, DroneVoice, HeadlessDevice, HeadlessPlatform,
    HeadlessSampleBank, SampleBank, SampleBehavior, SampleRequest, SampleVoice, ToneDevice,
};
pub use tone::{
    AmbientLayer, EnvelopePreset, GainSegment, ThemeNote, ThemeRendition, ThemeVoice, Tone,
    ToneTable, Waveform, AMBIENT_LAYERS, DEFAULT_TONE, MIN_THEME_DROP, SILENCE_FLOOR,
};

use crate::assets::{AssetClass, SoundCatalog, SoundDefinition};
use crate::{AudioConfig, Clock, TerminalError};

/// Catalog name of the long sampled theme.
pub const THEME: &str = "theme";

const UNLOCK_BUFFER_LENGTH: Duration = Duration::from_millis(1);
const AMBIENT_FADE: Duration = Duration::from_millis(250);
const AMBIENT_STOP_LEVEL: f32 = 0.0001;

/// Why a sound plays synthesized instead of from its sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackReason {
    None,
    Timeout,
    Error,
    Configured,
}

/// Load state of one cataloged sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadedSound {
    pub sample_ready: bool,
    pub fallback: FallbackReason,
}

impl LoadedSound {
    fn ready() -> Self {
        Self {
            sample_ready: true,
            fallback: FallbackReason::None,
        }
    }

    fn fallback(reason: FallbackReason) -> Self {
        Self {
            sample_ready: false,
            fallback: reason,
        }
    }

    pub fn is_sample_backed(&self) -> bool {
        self.sample_ready && self.fallback == FallbackReason::None
    }
}

/// Per-call playback options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayOptions {
    /// Overrides the cataloged volume; still scaled by the master volume.
    pub volume: Option<f32>,
    pub looping: bool,
}

impl PlayOptions {
    pub fn at_volume(volume: f32) -> Self {
        Self {
            volume: Some(volume),
            looping: false,
        }
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackSource {
    Sample(SampleVoice),
    Synthesized(Tone),
}

/// Handle describing a started cue.
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    pub sound: String,
    pub source: PlaybackSource,
}

impl Playback {
    pub fn is_synthesized(&self) -> bool {
        matches!(self.source, PlaybackSource::Synthesized(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnlockOutcome {
    Unlocked,
    AlreadyUnlocked,
    /// Another caller is already unlocking; this call did nothing.
    InProgress,
    NoContext,
    Failed,
}

/// First-interaction gestures that may unlock the audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    PointerDown,
    MouseDown,
    TouchStart,
    TouchEnd,
    KeyDown,
    Click,
}

impl Gesture {
    /// Every gesture a front end should listen for before the first unlock.
    pub const ALL: [Gesture; 6] = [
        Self::PointerDown,
        Self::MouseDown,
        Self::TouchStart,
        Self::TouchEnd,
        Self::KeyDown,
        Self::Click,
    ];

    pub fn event_name(self) -> &'static str {
        match self {
            Self::PointerDown => "pointerdown",
            Self::MouseDown => "mousedown",
            Self::TouchStart => "touchstart",
            Self::TouchEnd => "touchend",
            Self::KeyDown => "keydown",
            Self::Click => "click",
        }
    }
}

impl FromStr for Gesture {
    type Err = TerminalError;

    /// Parses a DOM-style event name such as `keydown`.
    fn from_str(value: &str) -> crate::Result<Self> {
        Self::ALL
            .into_iter()
            .find(|gesture| gesture.event_name() == value)
            .ok_or_else(|| TerminalError::msg(format!("unknown gesture '{value}'")))
    }
}

/// Outcome of [`AudioSystem::preload`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreloadReport {
    pub sample_backed: usize,
    pub synthetic: usize,
    pub timed_out: Vec<String>,
    pub failed: Vec<String>,
}

/// Snapshot for callers that branch their UX on audio availability.
#[derive(Debug, Clone, Serialize)]
pub struct AudioDiagnostics {
    pub loaded: bool,
    pub unlocked: bool,
    pub context_state: ContextState,
    pub sample_backed_count: usize,
    pub synthetic_count: usize,
    pub muted: bool,
    pub master_volume: f32,
    pub ambient_running: bool,
}

impl AudioDiagnostics {
    /// The context exists but still waits for a gesture.
    pub fn needs_gesture(&self) -> bool {
        self.context_state == ContextState::Suspended && !self.unlocked
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThemeSource {
    Sample(SampleVoice),
    Synthesized { notes: usize },
    Silent,
}

#[derive(Debug)]
struct AmbientVoice {
    layer: AmbientLayer,
    voice: Box<dyn DroneVoice>,
}

#[derive(Debug, Clone, Copy)]
struct Mix {
    master: f32,
    muted: bool,
}

impl Mix {
    fn level(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.master
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sampled and synthesized cue playback bound to one audio context.
#[derive(Debug)]
pub struct AudioSystem {
    config: AudioConfig,
    catalog: SoundCatalog,
    tones: ToneTable,
    clock: Arc<dyn Clock>,
    platform: Option<Arc<dyn AudioPlatform>>,
    samples: Option<Arc<dyn SampleBank>>,
    context: Mutex<Option<Arc<dyn ToneDevice>>>,
    unlocked: AtomicBool,
    unlocking: AtomicBool,
    loaded: AtomicBool,
    sounds: Mutex<HashMap<String, LoadedSound>>,
    mix: Mutex<Mix>,
    ambient: Mutex<Vec<AmbientVoice>>,
    theme_loop: Mutex<Option<JoinHandle<()>>>,
}

impl AudioSystem {
    pub fn new(config: AudioConfig, catalog: SoundCatalog, clock: Arc<dyn Clock>) -> Self {
        let mix = Mix {
            master: config.master_volume.clamp(0.0, 1.0),
            muted: false,
        };
        Self {
            config,
            catalog,
            tones: ToneTable::default(),
            clock,
            platform: None,
            samples: None,
            context: Mutex::new(None),
            unlocked: AtomicBool::new(false),
            unlocking: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            sounds: Mutex::new(HashMap::new()),
            mix: Mutex::new(mix),
            ambient: Mutex::new(Vec::new()),
            theme_loop: Mutex::new(None),
        }
    }

    pub fn with_platform(mut self, platform: Arc<dyn AudioPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_samples(mut self, samples: Arc<dyn SampleBank>) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_tones(mut self, tones: ToneTable) -> Self {
        self.tones = tones;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn catalog(&self) -> &SoundCatalog {
        &self.catalog
    }

    /// Creates the audio context. Always reports success: without a usable
    /// platform the subsystem keeps running in degraded mode.
    pub fn init(&self) -> bool {
        if lock(&self.context).is_none() {
            self.create_context();
        }
        true
    }

    /// Drops the current context and builds a new one, forgetting any unlock.
    pub fn reinit(&self) -> bool {
        self.stop_ambient_system();
        self.stop_theme();
        *lock(&self.context) = None;
        self.unlocked.store(false, Ordering::Release);
        self.unlocking.store(false, Ordering::Release);
        self.create_context();
        true
    }

    fn create_context(&self) {
        let device = match &self.platform {
            None => {
                tracing::warn!("no audio platform available, synthesized cues are disabled");
                None
            }
            Some(platform) => match platform.create_context() {
                Ok(device) => {
                    tracing::info!(state = ?device.state(), "audio context created");
                    Some(device)
                }
                Err(err) => {
                    tracing::warn!(%err, "audio context unavailable, running in degraded mode");
                    None
                }
            },
        };
        *lock(&self.context) = device;
    }

    fn device(&self) -> Option<Arc<dyn ToneDevice>> {
        lock(&self.context).clone()
    }

    pub fn context_state(&self) -> ContextState {
        self.device()
            .map(|device| device.state())
            .unwrap_or(ContextState::Absent)
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::Acquire)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn sound_status(&self, name: &str) -> Option<LoadedSound> {
        lock(&self.sounds).get(name).copied()
    }

    /// Loads every cataloged sample concurrently. Each load is bounded by the
    /// timeout of its asset class; the call itself always completes.
    pub async fn preload(&self) -> PreloadReport {
        let outcomes = join_all(self.catalog.iter().map(|sound| self.preload_one(sound))).await;

        let mut report = PreloadReport::default();
        {
            let mut sounds = lock(&self.sounds);
            for (name, status) in outcomes {
                match status.fallback {
                    FallbackReason::None => report.sample_backed += 1,
                    FallbackReason::Timeout => report.timed_out.push(name.clone()),
                    FallbackReason::Error => report.failed.push(name.clone()),
                    FallbackReason::Configured => {}
                }
                if !status.is_sample_backed() {
                    report.synthetic += 1;
                }
                sounds.insert(name, status);
            }
        }
        self.loaded.store(true, Ordering::Release);

        tracing::info!(
            sample_backed = report.sample_backed,
            synthetic = report.synthetic,
            timed_out = report.timed_out.len(),
            failed = report.failed.len(),
            "sound preload finished"
        );
        report
    }

    async fn preload_one(&self, sound: &SoundDefinition) -> (String, LoadedSound) {
        let name = sound.name.clone();
        let reference = match (&sound.sample, sound.prefer_synthesized) {
            (Some(reference), false) => reference,
            _ => return (name, LoadedSound::fallback(FallbackReason::Configured)),
        };
        let Some(samples) = &self.samples else {
            tracing::debug!(sound = %name, "no sample bank, using synthesis");
            return (name, LoadedSound::fallback(FallbackReason::Error));
        };

        let limit = match sound.class {
            AssetClass::Effect => self.config.effect_timeout(),
            AssetClass::Theme => self.config.theme_timeout(),
        };

        let status = tokio::select! {
            result = samples.load(reference) => match result {
                Ok(()) => LoadedSound::ready(),
                Err(err) => {
                    tracing::debug!(sound = %name, %err, "sample failed to load");
                    LoadedSound::fallback(FallbackReason::Error)
                }
            },
            _ = self.clock.sleep(limit) => {
                tracing::debug!(sound = %name, timeout_ms = limit.as_millis() as u64, "sample load timed out");
                LoadedSound::fallback(FallbackReason::Timeout)
            }
        };
        (name, status)
    }

    /// Plays a cataloged cue, preferring its sample and falling back to
    /// synthesis whenever the sample is unavailable or refused.
    pub async fn play(&self, name: &str, options: PlayOptions) -> Option<Playback> {
        if self.is_muted() {
            tracing::trace!(sound = name, "muted, cue skipped");
            return None;
        }

        if !self.is_loaded() {
            return self.play_generated_sound(name, options);
        }

        let Some(definition) = self.catalog.get(name) else {
            tracing::warn!(sound = name, "unknown sound requested");
            return None;
        };

        if self.context_state() == ContextState::Suspended && !self.is_unlocked() {
            self.unlock().await;
        }

        let status = self
            .sound_status(name)
            .unwrap_or(LoadedSound::fallback(FallbackReason::Error));
        let (reference, samples) = match (&definition.sample, &self.samples) {
            (Some(reference), Some(samples))
                if !definition.prefer_synthesized && status.sample_ready =>
            {
                (reference, samples)
            }
            _ => return self.play_generated_sound(name, options),
        };

        let request = SampleRequest {
            volume: options.volume.unwrap_or(definition.volume).clamp(0.0, 1.0) * self.volume(),
            looping: options.looping,
        };
        match samples.play(reference, request).await {
            Ok(voice) => {
                tracing::debug!(sound = name, volume = request.volume, "sample cue started");
                Some(Playback {
                    sound: name.to_string(),
                    source: PlaybackSource::Sample(voice),
                })
            }
            Err(err) => {
                tracing::debug!(sound = name, %err, "sample playback refused, synthesizing");
                self.play_generated_sound(name, options)
            }
        }
    }

    /// Synthesizes the cue from its tone parameters. Returns `None` when there
    /// is no audio context to play through.
    pub fn play_generated_sound(&self, name: &str, options: PlayOptions) -> Option<Playback> {
        if self.is_muted() {
            return None;
        }
        let Some(device) = self.device() else {
            tracing::trace!(sound = name, "no audio context, synthesized cue skipped");
            return None;
        };

        let base = self.tones.resolve(name);
        let volume = options.volume.unwrap_or(base.volume).clamp(0.0, 1.0) * self.volume();
        let tone = base.with_volume(volume);

        match device.play_tone(&tone, Duration::ZERO) {
            Ok(()) => {
                tracing::debug!(
                    sound = name,
                    waveform = ?tone.waveform,
                    frequency = tone.frequency,
                    "synthesized cue started"
                );
                Some(Playback {
                    sound: name.to_string(),
                    source: PlaybackSource::Synthesized(tone),
                })
            }
            Err(err) => {
                tracing::warn!(sound = name, %err, "synthesized cue failed");
                None
            }
        }
    }

    /// Resumes the context after a user gesture and primes it with inaudible
    /// buffers. Concurrent callers do not race: the first one claims the
    /// one-shot guard before doing any asynchronous work.
    pub async fn unlock(&self) -> UnlockOutcome {
        if self.is_unlocked() {
            return UnlockOutcome::AlreadyUnlocked;
        }
        let Some(device) = self.device() else {
            return UnlockOutcome::NoContext;
        };
        if self.unlocking.swap(true, Ordering::AcqRel) {
            return UnlockOutcome::InProgress;
        }

        match self.prime(device.as_ref()).await {
            Ok(()) => {
                self.unlocked.store(true, Ordering::Release);
                tracing::info!("audio context unlocked");
                UnlockOutcome::Unlocked
            }
            Err(err) => {
                self.unlocking.store(false, Ordering::Release);
                tracing::warn!(%err, "audio unlock failed");
                UnlockOutcome::Failed
            }
        }
    }

    async fn prime(&self, device: &dyn ToneDevice) -> crate::Result<()> {
        if device.state() == ContextState::Suspended {
            device.resume().await?;
        }
        for _ in 0..self.config.unlock_buffers.max(1) {
            device.play_silence(UNLOCK_BUFFER_LENGTH)?;
        }
        Ok(())
    }

    /// Entry point for first-interaction gesture listeners.
    pub async fn handle_gesture(&self, gesture: Gesture) -> UnlockOutcome {
        tracing::debug!(gesture = gesture.event_name(), "gesture received");
        self.unlock().await
    }

    /// Plays the theme and invokes `on_drop` at the drop offset. Without a
    /// usable sample a melody and bass rendition with the same timing is
    /// scheduled instead. The callback fires even when nothing is audible.
    pub async fn play_theme_with_sync<F: FnOnce()>(&self, on_drop: F) -> ThemeSource {
        let drop_at = self.config.theme_drop();
        let source = self.start_theme().await;
        tracing::info!(?source, drop_ms = drop_at.as_millis() as u64, "theme started");

        self.clock.sleep(drop_at).await;
        on_drop();
        source
    }

    async fn start_theme(&self) -> ThemeSource {
        if self.is_muted() {
            return ThemeSource::Silent;
        }
        if self.context_state() == ContextState::Suspended && !self.is_unlocked() {
            self.unlock().await;
        }
        if let Some(voice) = self.play_theme_sample().await {
            return ThemeSource::Sample(voice);
        }
        let Some(device) = self.device() else {
            return ThemeSource::Silent;
        };

        let rendition = ThemeRendition::mission(self.config.theme_drop());
        let level = self.volume();
        schedule_rendition(device.as_ref(), &rendition, level);
        let notes = rendition.notes.len();

        if self.config.loop_theme {
            let clock = self.clock.clone();
            let handle = tokio::spawn(async move {
                loop {
                    clock.sleep(rendition.length).await;
                    schedule_rendition(device.as_ref(), &rendition, level);
                }
            });
            if let Some(previous) = lock(&self.theme_loop).replace(handle) {
                previous.abort();
            }
        }

        ThemeSource::Synthesized { notes }
    }

    async fn play_theme_sample(&self) -> Option<SampleVoice> {
        let definition = self.catalog.get(THEME)?;
        let ready = self.sound_status(THEME).map(|s| s.sample_ready).unwrap_or(false);
        if definition.prefer_synthesized || !ready {
            return None;
        }
        let reference = definition.sample.as_deref()?;
        let samples = self.samples.as_ref()?;
        let request = SampleRequest {
            volume: definition.volume.clamp(0.0, 1.0) * self.volume(),
            looping: self.config.loop_theme,
        };
        match samples.play(reference, request).await {
            Ok(voice) => Some(voice),
            Err(err) => {
                tracing::debug!(%err, "theme sample refused, synthesizing");
                None
            }
        }
    }

    /// Stops re-scheduling a looping synthesized theme.
    pub fn stop_theme(&self) {
        if let Some(handle) = lock(&self.theme_loop).take() {
            handle.abort();
        }
    }

    /// Starts the continuous ambience layers. Returns `false` without an
    /// audio context.
    pub fn start_ambient_system(&self) -> bool {
        let Some(device) = self.device() else {
            tracing::debug!("no audio context, ambience skipped");
            return false;
        };
        let level = lock(&self.mix).level();
        let mut ambient = lock(&self.ambient);
        if !ambient.is_empty() {
            return true;
        }

        for layer in AMBIENT_LAYERS {
            match device.start_drone(layer.waveform, layer.frequency, layer.gain * level) {
                Ok(voice) => ambient.push(AmbientVoice { layer, voice }),
                Err(err) => tracing::warn!(frequency = layer.frequency, %err, "ambient layer failed"),
            }
        }
        tracing::info!(layers = ambient.len(), "ambience started");
        !ambient.is_empty()
    }

    /// Fades every ambience layer out before halting it.
    pub fn stop_ambient_system(&self) {
        let voices: Vec<AmbientVoice> = lock(&self.ambient).drain(..).collect();
        if voices.is_empty() {
            return;
        }
        for mut ambient in voices {
            ambient.voice.ramp_gain(AMBIENT_STOP_LEVEL, AMBIENT_FADE);
            ambient.voice.stop(AMBIENT_FADE);
        }
        tracing::info!("ambience stopped");
    }

    pub fn is_ambient_running(&self) -> bool {
        !lock(&self.ambient).is_empty()
    }

    /// Sets the master volume, clamped to `[0, 1]`, and rescales running
    /// ambience layers.
    pub fn set_volume(&self, level: f32) {
        if !level.is_finite() {
            tracing::warn!(level, "ignoring non-finite volume");
            return;
        }
        {
            let mut mix = lock(&self.mix);
            mix.master = level.clamp(0.0, 1.0);
        }
        self.rescale_ambient();
    }

    pub fn volume(&self) -> f32 {
        lock(&self.mix).master
    }

    pub fn set_muted(&self, muted: bool) {
        lock(&self.mix).muted = muted;
        self.rescale_ambient();
        tracing::info!(muted, "audio mute changed");
    }

    pub fn is_muted(&self) -> bool {
        lock(&self.mix).muted
    }

    fn rescale_ambient(&self) {
        let level = lock(&self.mix).level();
        for ambient in lock(&self.ambient).iter_mut() {
            ambient.voice.set_gain(ambient.layer.gain * level);
        }
    }

    pub fn diagnostics(&self) -> AudioDiagnostics {
        let (sample_backed_count, synthetic_count) = {
            let sounds = lock(&self.sounds);
            let backed = sounds.values().filter(|s| s.is_sample_backed()).count();
            (backed, sounds.len() - backed)
        };
        let mix = *lock(&self.mix);

        AudioDiagnostics {
            loaded: self.is_loaded(),
            unlocked: self.is_unlocked(),
            context_state: self.context_state(),
            sample_backed_count,
            synthetic_count,
            muted: mix.muted,
            master_volume: mix.master,
            ambient_running: self.is_ambient_running(),
        }
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop_theme();
    }
}

fn schedule_rendition(device: &dyn ToneDevice, rendition: &ThemeRendition, level: f32) {
    for note in &rendition.notes {
        let tone = note.tone.with_volume(note.tone.volume * level);
        if let Err(err) = device.play_tone(&tone, note.start) {
            tracing::warn!(%err, "theme note dropped");
        }
    }
}
