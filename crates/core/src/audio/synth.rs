//! Offline rendering of synthesized tones to PCM, using the same waveform and
//! envelope math the live device is given.

use super::tone::{ThemeRendition, Tone};
use crate::{Result, TerminalError};

/// Phase-accumulator oscillator.
#[derive(Debug, Clone, Copy, Default)]
struct Phase {
    value: f32,
}

impl Phase {
    fn advance(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        let current = self.value;
        self.value += frequency / sample_rate;
        self.value -= self.value.floor();
        current
    }
}

fn check_rate(sample_rate: u32) -> Result<f32> {
    if sample_rate == 0 {
        return Err(TerminalError::InvalidInput("sample rate must be positive"));
    }
    Ok(sample_rate as f32)
}

/// Renders a single tone into mono samples.
pub fn render_tone(tone: &Tone, sample_rate: u32) -> Result<Vec<f32>> {
    let rate = check_rate(sample_rate)?;
    let frames = (tone.duration.max(0.0) * rate).round() as usize;
    let mut phase = Phase::default();

    Ok((0..frames)
        .map(|frame| {
            let t = frame as f32 / rate;
            let value = tone.waveform.sample(phase.advance(tone.frequency, rate));
            value * tone.gain_at(t)
        })
        .collect())
}

/// Mixes every note of a theme rendition into one buffer.
pub fn render_theme(rendition: &ThemeRendition, sample_rate: u32) -> Result<Vec<f32>> {
    let rate = check_rate(sample_rate)?;
    let frames = (rendition.length.as_secs_f32() * rate).ceil() as usize;
    let mut mix = vec![0.0_f32; frames];

    for note in &rendition.notes {
        let offset = (note.start.as_secs_f32() * rate).round() as usize;
        let rendered = render_tone(&note.tone, sample_rate)?;
        for (slot, sample) in mix.iter_mut().skip(offset).zip(rendered) {
            *slot += sample;
        }
    }

    for sample in &mut mix {
        *sample = sample.clamp(-1.0, 1.0);
    }
    Ok(mix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tone::{EnvelopePreset, Waveform};
    use std::time::Duration;

    #[test]
    fn renders_expected_length() {
        let tone = Tone::new(Waveform::Sine, 440.0, 0.25, 0.5, EnvelopePreset::Smooth);
        let samples = render_tone(&tone, 8_000).unwrap();

        assert_eq!(samples.len(), 2_000);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let tone = Tone::new(Waveform::Sine, 440.0, 0.25, 0.5, EnvelopePreset::Smooth);
        assert!(render_tone(&tone, 0).is_err());
    }

    #[test]
    fn theme_mix_covers_rendition_length() {
        let rendition = ThemeRendition::mission(Duration::from_secs(2));
        let mix = render_theme(&rendition, 4_000).unwrap();

        assert_eq!(mix.len(), 16_000);
        assert!(mix.iter().any(|s| s.abs() > 0.05));
    }
}
