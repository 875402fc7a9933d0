//! Platform audio seams and their headless stand-ins.
//!
//! The audio subsystem talks to two facilities: a [`ToneDevice`] (the
//! gesture-gated synthesis context) and a [`SampleBank`] (decoded sample
//! playback). Both are object safe so a browser, a native backend or the
//! recording implementations below can be plugged in.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;

use super::tone::{Tone, Waveform};
use crate::{Result, TerminalError};

/// State of the audio context as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    /// No context could be created; only silent no-ops remain.
    Absent,
    Suspended,
    Running,
}

/// Synthesis context of the platform.
pub trait ToneDevice: Send + Sync + fmt::Debug {
    fn state(&self) -> ContextState;

    /// Resumes a suspended context. Platforms only honour this after a user
    /// gesture.
    fn resume(&self) -> BoxFuture<'_, Result<()>>;

    /// Plays an inaudible buffer; some platforms only consider the context
    /// unlocked once something has actually played through it.
    fn play_silence(&self, length: Duration) -> Result<()>;

    /// Schedules `tone` to begin `start` after the device's current time.
    fn play_tone(&self, tone: &Tone, start: Duration) -> Result<()>;

    /// Starts a continuous oscillator at the given gain.
    fn start_drone(&self, waveform: Waveform, frequency: f32, gain: f32) -> Result<Box<dyn DroneVoice>>;
}

/// Handle to a continuous oscillator.
pub trait DroneVoice: Send + fmt::Debug {
    fn set_gain(&mut self, gain: f32);

    fn ramp_gain(&mut self, target: f32, over: Duration);

    /// Halts the oscillator `after` from now.
    fn stop(&mut self, after: Duration);
}

/// Factory for the synthesis context.
pub trait AudioPlatform: Send + Sync + fmt::Debug {
    fn create_context(&self) -> Result<Arc<dyn ToneDevice>>;
}

/// Parameters of a single sample playback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleRequest {
    pub volume: f32,
    pub looping: bool,
}

/// Identifier of a started sample playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SampleVoice(pub u64);

/// Loader and player of sampled sounds.
pub trait SampleBank: Send + Sync + fmt::Debug {
    fn load<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Starts a fresh copy of a loaded sample. Rejections (autoplay policy)
    /// surface as errors.
    fn play<'a>(&'a self, reference: &'a str, request: SampleRequest) -> BoxFuture<'a, Result<SampleVoice>>;
}

/// Call recorded by [`HeadlessDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Resume,
    Silence(Duration),
    Tone { tone: Tone, start: Duration },
    DroneStart { id: usize, waveform: Waveform, frequency: f32, gain: f32 },
    DroneGain { id: usize, gain: f32 },
    DroneRamp { id: usize, target: f32, over: Duration },
    DroneStop { id: usize, after: Duration },
}

type EventLog = Arc<Mutex<Vec<DeviceEvent>>>;

fn lock_log(log: &EventLog) -> MutexGuard<'_, Vec<DeviceEvent>> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tone device that records every call instead of producing sound.
#[derive(Debug, Clone)]
pub struct HeadlessDevice {
    state: Arc<Mutex<ContextState>>,
    resume_latency: Duration,
    fail_resume: bool,
    events: EventLog,
    drones: Arc<AtomicUsize>,
}

impl HeadlessDevice {
    /// A context that starts suspended, like a browser before any gesture.
    pub fn suspended() -> Self {
        Self::with_state(ContextState::Suspended)
    }

    pub fn running() -> Self {
        Self::with_state(ContextState::Running)
    }

    fn with_state(state: ContextState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            resume_latency: Duration::ZERO,
            fail_resume: false,
            events: Arc::default(),
            drones: Arc::default(),
        }
    }

    pub fn with_resume_latency(mut self, latency: Duration) -> Self {
        self.resume_latency = latency;
        self
    }

    /// Every resume attempt is refused, as when no gesture has happened.
    pub fn refusing_resume(mut self) -> Self {
        self.fail_resume = true;
        self
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        lock_log(&self.events).clone()
    }

    pub fn tones(&self) -> Vec<Tone> {
        lock_log(&self.events)
            .iter()
            .filter_map(|event| match event {
                DeviceEvent::Tone { tone, .. } => Some(*tone),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&DeviceEvent) -> bool) -> usize {
        lock_log(&self.events).iter().filter(|event| matches(*event)).count()
    }

    fn set_state(&self, state: ContextState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn push(&self, event: DeviceEvent) {
        lock_log(&self.events).push(event);
    }
}

impl ToneDevice for HeadlessDevice {
    fn state(&self) -> ContextState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resume(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.push(DeviceEvent::Resume);
            if !self.resume_latency.is_zero() {
                tokio::time::sleep(self.resume_latency).await;
            }
            if self.fail_resume {
                return Err(TerminalError::audio("resume refused without user gesture"));
            }
            self.set_state(ContextState::Running);
            Ok(())
        }
        .boxed()
    }

    fn play_silence(&self, length: Duration) -> Result<()> {
        self.push(DeviceEvent::Silence(length));
        Ok(())
    }

    fn play_tone(&self, tone: &Tone, start: Duration) -> Result<()> {
        self.push(DeviceEvent::Tone { tone: *tone, start });
        Ok(())
    }

    fn start_drone(&self, waveform: Waveform, frequency: f32, gain: f32) -> Result<Box<dyn DroneVoice>> {
        let id = self.drones.fetch_add(1, Ordering::Relaxed);
        self.push(DeviceEvent::DroneStart {
            id,
            waveform,
            frequency,
            gain,
        });
        Ok(Box::new(HeadlessDrone {
            id,
            events: self.events.clone(),
        }))
    }
}

#[derive(Debug)]
struct HeadlessDrone {
    id: usize,
    events: EventLog,
}

impl DroneVoice for HeadlessDrone {
    fn set_gain(&mut self, gain: f32) {
        lock_log(&self.events).push(DeviceEvent::DroneGain { id: self.id, gain });
    }

    fn ramp_gain(&mut self, target: f32, over: Duration) {
        lock_log(&self.events).push(DeviceEvent::DroneRamp {
            id: self.id,
            target,
            over,
        });
    }

    fn stop(&mut self, after: Duration) {
        lock_log(&self.events).push(DeviceEvent::DroneStop { id: self.id, after });
    }
}

/// Platform handing out a shared [`HeadlessDevice`], or none at all.
#[derive(Debug, Clone)]
pub struct HeadlessPlatform {
    device: Option<HeadlessDevice>,
    created: Arc<AtomicUsize>,
}

impl HeadlessPlatform {
    pub fn new(device: HeadlessDevice) -> Self {
        Self {
            device: Some(device),
            created: Arc::default(),
        }
    }

    /// A platform without any synthesis capability.
    pub fn unsupported() -> Self {
        Self {
            device: None,
            created: Arc::default(),
        }
    }

    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl AudioPlatform for HeadlessPlatform {
    fn create_context(&self) -> Result<Arc<dyn ToneDevice>> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| TerminalError::audio("audio context unsupported on this platform"))?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(device))
    }
}

/// Scripted behaviour of a sample in [`HeadlessSampleBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleBehavior {
    Ready,
    /// Loads successfully after the given delay.
    Slow(Duration),
    /// Never finishes loading.
    Hang,
    /// Loading fails.
    Broken,
    /// Loads, but every playback is rejected.
    Rejected,
}

#[derive(Debug, Default)]
struct BankState {
    behaviors: HashMap<String, SampleBehavior>,
    plays: Vec<(String, SampleRequest)>,
    next_voice: u64,
}

/// Sample bank with per-reference scripted outcomes. References without a
/// script load and play normally.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSampleBank {
    state: Arc<Mutex<BankState>>,
}

impl HeadlessSampleBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(self, reference: &str, behavior: SampleBehavior) -> Self {
        self.lock().behaviors.insert(reference.to_string(), behavior);
        self
    }

    pub fn plays(&self) -> Vec<(String, SampleRequest)> {
        self.lock().plays.clone()
    }

    fn behavior(&self, reference: &str) -> SampleBehavior {
        self.lock()
            .behaviors
            .get(reference)
            .copied()
            .unwrap_or(SampleBehavior::Ready)
    }

    fn lock(&self) -> MutexGuard<'_, BankState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SampleBank for HeadlessSampleBank {
    fn load<'a>(&'a self, reference: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            match self.behavior(reference) {
                SampleBehavior::Ready | SampleBehavior::Rejected => Ok(()),
                SampleBehavior::Slow(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                SampleBehavior::Hang => std::future::pending().await,
                SampleBehavior::Broken => Err(TerminalError::audio(format!(
                    "failed to decode `{reference}`"
                ))),
            }
        }
        .boxed()
    }

    fn play<'a>(&'a self, reference: &'a str, request: SampleRequest) -> BoxFuture<'a, Result<SampleVoice>> {
        async move {
            if self.behavior(reference) == SampleBehavior::Rejected {
                return Err(TerminalError::audio(format!(
                    "playback of `{reference}` rejected by autoplay policy"
                )));
            }
            let mut state = self.lock();
            state.plays.push((reference.to_string(), request));
            state.next_voice += 1;
            Ok(SampleVoice(state.next_voice))
        }
        .boxed()
    }
}
