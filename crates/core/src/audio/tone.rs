//! Synthesis parameters: waveforms, envelope presets, the per-sound tone
//! table, the theme rendition and the ambient layers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Level exponential releases decay towards. Exponential ramps cannot reach
/// zero, so tones end just above silence.
pub const SILENCE_FLOOR: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Waveform value at `phase` in `[0, 1)`, in `[-1, 1]`.
    pub fn sample(self, phase: f32) -> f32 {
        let phase = phase - phase.floor();
        match self {
            Self::Sine => (phase * std::f32::consts::TAU).sin(),
            Self::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Self::Sawtooth => 2.0 * phase - 1.0,
            Self::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
        }
    }
}

/// Named amplitude curves applied over a tone's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopePreset {
    #[default]
    Smooth,
    Sharp,
    Quick,
    Sustain,
    Pulse,
    Harsh,
    Long,
    Power,
}

impl EnvelopePreset {
    pub const ALL: [EnvelopePreset; 8] = [
        Self::Smooth,
        Self::Sharp,
        Self::Quick,
        Self::Sustain,
        Self::Pulse,
        Self::Harsh,
        Self::Long,
        Self::Power,
    ];

    /// Attack time in seconds, the sustain plateau as a fraction of the tone
    /// duration, and the peak relative to the tone volume.
    pub fn shape(self) -> EnvelopeShape {
        let (attack, plateau, peak) = match self {
            Self::Smooth => (0.05, 0.0, 1.0),
            Self::Sharp => (0.005, 0.0, 1.0),
            Self::Quick => (0.002, 0.0, 0.8),
            Self::Sustain => (0.02, 0.7, 1.0),
            Self::Pulse => (0.01, 0.3, 0.9),
            Self::Harsh => (0.001, 0.5, 1.0),
            Self::Long => (0.2, 0.5, 1.0),
            Self::Power => (0.01, 0.6, 1.0),
        };
        EnvelopeShape {
            attack,
            plateau,
            peak,
        }
    }
}

/// Piecewise amplitude curve: linear attack, optional plateau, exponential
/// release towards [`SILENCE_FLOOR`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f32,
    pub plateau: f32,
    pub peak: f32,
}

/// Automation instruction as understood by an oscillator gain node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainSegment {
    SetAt { level: f32, at: f32 },
    LinearTo { level: f32, at: f32 },
    ExponentialTo { level: f32, at: f32 },
}

impl EnvelopeShape {
    fn points(&self, duration: f32, volume: f32) -> (f32, f32, f32) {
        let duration = duration.max(0.001);
        let attack = self.attack.min(duration * 0.5);
        let release_start = (attack + self.plateau * duration).min(duration);
        let peak = (volume * self.peak).max(SILENCE_FLOOR);
        (attack, release_start, peak)
    }

    /// Amplitude at `t` seconds into a tone of `duration` seconds.
    pub fn gain_at(&self, t: f32, duration: f32, volume: f32) -> f32 {
        let (attack, release_start, peak) = self.points(duration, volume);
        if t <= 0.0 || t >= duration {
            return 0.0;
        }
        if t < attack {
            return peak * t / attack;
        }
        if t < release_start {
            return peak;
        }
        let span = (duration - release_start).max(f32::EPSILON);
        let progress = (t - release_start) / span;
        peak * (SILENCE_FLOOR / peak).powf(progress)
    }

    /// The same curve expressed as gain automation segments.
    pub fn segments(&self, duration: f32, volume: f32) -> Vec<GainSegment> {
        let (attack, release_start, peak) = self.points(duration, volume);
        let mut segments = vec![
            GainSegment::SetAt { level: 0.0, at: 0.0 },
            GainSegment::LinearTo { level: peak, at: attack },
        ];
        if release_start > attack {
            segments.push(GainSegment::SetAt {
                level: peak,
                at: release_start,
            });
        }
        segments.push(GainSegment::ExponentialTo {
            level: SILENCE_FLOOR,
            at: duration.max(attack),
        });
        segments
    }
}

/// Fully resolved tone handed to a tone device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub waveform: Waveform,
    pub frequency: f32,
    /// Seconds.
    pub duration: f32,
    pub volume: f32,
    pub envelope: EnvelopePreset,
}

impl Tone {
    pub const fn new(
        waveform: Waveform,
        frequency: f32,
        duration: f32,
        volume: f32,
        envelope: EnvelopePreset,
    ) -> Self {
        Self {
            waveform,
            frequency,
            duration,
            volume,
            envelope,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.max(0.0);
        self
    }

    pub fn length(&self) -> Duration {
        Duration::from_secs_f32(self.duration.max(0.0))
    }

    pub fn gain_at(&self, t: f32) -> f32 {
        self.envelope.shape().gain_at(t, self.duration, self.volume)
    }

    pub fn segments(&self) -> Vec<GainSegment> {
        self.envelope.shape().segments(self.duration, self.volume)
    }
}

/// Tone used for sounds without their own synthesis parameters.
pub const DEFAULT_TONE: Tone = Tone::new(Waveform::Sine, 440.0, 0.15, 0.2, EnvelopePreset::Smooth);

/// Synthesis parameters per sound name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToneTable {
    tones: BTreeMap<String, Tone>,
}

impl Default for ToneTable {
    fn default() -> Self {
        use EnvelopePreset::*;
        use Waveform::*;

        let entries = [
            ("power_on", Tone::new(Sawtooth, 110.0, 1.2, 0.3, Long)),
            ("boot", Tone::new(Sawtooth, 220.0, 0.8, 0.3, Long)),
            ("terminal", Tone::new(Square, 660.0, 0.12, 0.2, Sharp)),
            ("type", Tone::new(Square, 1200.0, 0.03, 0.15, Quick)),
            ("beep", Tone::new(Square, 800.0, 0.1, 0.3, Sharp)),
            ("click", Tone::new(Square, 1500.0, 0.02, 0.2, Quick)),
            ("hover", Tone::new(Sine, 2000.0, 0.04, 0.08, Quick)),
            ("access_granted", Tone::new(Sine, 880.0, 0.5, 0.4, Sustain)),
            ("access_denied", Tone::new(Sawtooth, 150.0, 0.6, 0.4, Harsh)),
            ("alert", Tone::new(Square, 440.0, 0.4, 0.35, Pulse)),
            ("data", Tone::new(Triangle, 1046.5, 0.2, 0.25, Sharp)),
            ("scan", Tone::new(Sine, 523.25, 0.8, 0.25, Smooth)),
            ("transition", Tone::new(Sine, 330.0, 0.35, 0.3, Smooth)),
            ("countdown", Tone::new(Square, 587.33, 0.25, 0.35, Pulse)),
            ("tick", Tone::new(Square, 1000.0, 0.05, 0.2, Quick)),
            ("error", Tone::new(Sawtooth, 110.0, 0.5, 0.4, Harsh)),
            ("success", Tone::new(Triangle, 1318.5, 0.7, 0.4, Power)),
            ("theme", Tone::new(Sawtooth, 220.0, 2.0, 0.3, Power)),
        ];

        Self {
            tones: entries
                .into_iter()
                .map(|(name, tone)| (name.to_string(), tone))
                .collect(),
        }
    }
}

impl ToneTable {
    pub fn get(&self, name: &str) -> Option<&Tone> {
        self.tones.get(name)
    }

    /// Tone for `name`, or [`DEFAULT_TONE`] when the table has no entry.
    pub fn resolve(&self, name: &str) -> Tone {
        self.tones.get(name).copied().unwrap_or(DEFAULT_TONE)
    }

    pub fn insert(&mut self, name: impl Into<String>, tone: Tone) {
        self.tones.insert(name.into(), tone);
    }
}

/// Line of the synthesized theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeVoice {
    Melody,
    Bass,
}

/// One note of the synthesized theme, scheduled relative to the theme start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeNote {
    pub voice: ThemeVoice,
    pub start: Duration,
    pub tone: Tone,
}

/// Multi-note stand-in for the sampled theme, timed so that its drop lands on
/// the same offset as the sample's.
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeRendition {
    pub notes: Vec<ThemeNote>,
    pub drop: Duration,
    pub length: Duration,
}

/// Shortest drop offset a theme can have; shorter requests are raised to it.
pub const MIN_THEME_DROP: Duration = Duration::from_millis(100);

const A_MINOR_RISE: [f32; 8] = [220.0, 261.63, 329.63, 392.0, 440.0, 392.0, 329.63, 261.63];
const DROP_HOOK: [f32; 8] = [440.0, 523.25, 659.26, 587.33, 523.25, 493.88, 440.0, 329.63];
const BASS_LINE: [f32; 4] = [55.0, 43.65, 65.41, 49.0];

impl ThemeRendition {
    /// Builds the rendition for a theme whose drop sits at `drop`. The build-up
    /// fills the time before the drop; the hook runs for the same length after.
    pub fn mission(drop: Duration) -> Self {
        let drop = drop.max(MIN_THEME_DROP);
        let drop_secs = drop.as_secs_f32();
        let beat = drop_secs / 16.0;
        let mut notes = Vec::new();

        for step in 0..32 {
            let before_drop = step < 16;
            let line: &[f32] = if before_drop { &A_MINOR_RISE } else { &DROP_HOOK };
            let (volume, envelope) = if before_drop {
                (0.12 + 0.01 * (step / 2) as f32, EnvelopePreset::Smooth)
            } else {
                (0.28, EnvelopePreset::Power)
            };
            notes.push(ThemeNote {
                voice: ThemeVoice::Melody,
                start: Duration::from_secs_f32(beat * step as f32),
                tone: Tone::new(
                    Waveform::Sawtooth,
                    line[step % line.len()],
                    beat * 0.9,
                    volume,
                    envelope,
                ),
            });
        }

        for bar in 0..8 {
            let volume = if bar < 4 { 0.15 } else { 0.3 };
            notes.push(ThemeNote {
                voice: ThemeVoice::Bass,
                start: Duration::from_secs_f32(beat * 4.0 * bar as f32),
                tone: Tone::new(
                    Waveform::Triangle,
                    BASS_LINE[bar % BASS_LINE.len()],
                    beat * 3.8,
                    volume,
                    EnvelopePreset::Sustain,
                ),
            });
        }

        notes.sort_by(|a, b| a.start.cmp(&b.start));

        Self {
            notes,
            drop,
            length: drop * 2,
        }
    }
}

/// Continuous oscillator layer of the ambience.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLayer {
    pub waveform: Waveform,
    pub frequency: f32,
    pub gain: f32,
}

/// Low hum plus a faint high layer.
pub const AMBIENT_LAYERS: [AmbientLayer; 2] = [
    AmbientLayer {
        waveform: Waveform::Sine,
        frequency: 55.0,
        gain: 0.03,
    },
    AmbientLayer {
        waveform: Waveform::Sine,
        frequency: 7_040.0,
        gain: 0.004,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_starts_silent_and_releases_to_floor() {
        for preset in EnvelopePreset::ALL {
            let shape = preset.shape();
            assert_eq!(shape.gain_at(0.0, 1.0, 0.5), 0.0, "{preset:?}");
            let tail = shape.gain_at(0.999, 1.0, 0.5);
            assert!(tail < 0.01, "{preset:?} tail was {tail}");
        }
    }

    #[test]
    fn presets_are_distinct_curves() {
        let mut curves: Vec<Vec<f32>> = Vec::new();
        for preset in EnvelopePreset::ALL {
            let shape = preset.shape();
            let curve: Vec<f32> = (1..20)
                .map(|i| shape.gain_at(i as f32 * 0.05, 1.0, 1.0))
                .collect();
            assert!(!curves.contains(&curve), "{preset:?} duplicates another preset");
            curves.push(curve);
        }
    }

    #[test]
    fn sustain_holds_peak_before_release() {
        let shape = EnvelopePreset::Sustain.shape();

        assert!((shape.gain_at(0.5, 1.0, 0.4) - 0.4).abs() < 1e-6);
        assert!(shape.gain_at(0.9, 1.0, 0.4) < 0.4);
    }

    #[test]
    fn segments_end_with_exponential_release() {
        let segments = Tone::new(Waveform::Square, 800.0, 0.1, 0.3, EnvelopePreset::Sharp).segments();

        assert_eq!(segments.first(), Some(&GainSegment::SetAt { level: 0.0, at: 0.0 }));
        assert!(matches!(
            segments.last(),
            Some(GainSegment::ExponentialTo { level, .. }) if *level == SILENCE_FLOOR
        ));
    }

    #[test]
    fn waveforms_stay_in_range() {
        for waveform in [Waveform::Sine, Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            for i in 0..100 {
                let value = waveform.sample(i as f32 / 100.0);
                assert!((-1.0..=1.0).contains(&value), "{waveform:?} at {i}");
            }
        }
    }

    #[test]
    fn unknown_sounds_resolve_to_default_tone() {
        let table = ToneTable::default();

        assert_eq!(table.resolve("klaxon"), DEFAULT_TONE);
        assert_eq!(table.resolve("beep").frequency, 800.0);
        assert_eq!(table.resolve("beep").waveform, Waveform::Square);
    }

    #[test]
    fn theme_rendition_has_melody_and_bass_around_the_drop() {
        let rendition = ThemeRendition::mission(Duration::from_secs(8));

        assert_eq!(rendition.drop, Duration::from_secs(8));
        assert_eq!(rendition.length, Duration::from_secs(16));
        assert!(rendition.notes.iter().any(|n| n.voice == ThemeVoice::Bass));
        let at_drop = rendition
            .notes
            .iter()
            .find(|n| n.voice == ThemeVoice::Melody && n.start >= rendition.drop)
            .unwrap();
        assert_eq!(at_drop.tone.envelope, EnvelopePreset::Power);
        assert!(rendition.notes.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn short_drops_keep_their_offset() {
        let rendition = ThemeRendition::mission(Duration::from_millis(500));

        assert_eq!(rendition.drop, Duration::from_millis(500));
        assert_eq!(rendition.length, Duration::from_secs(1));
        let hook = rendition
            .notes
            .iter()
            .find(|n| n.tone.envelope == EnvelopePreset::Power)
            .unwrap();
        assert_eq!(hook.start, rendition.drop);

        assert_eq!(ThemeRendition::mission(Duration::ZERO).drop, MIN_THEME_DROP);
    }
}
