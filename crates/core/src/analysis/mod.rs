use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::audio::synth;
use crate::audio::{ThemeRendition, Tone};
use crate::{Result, TerminalError};

/// Measurements of one rendered cue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToneAnalysis {
    pub sample_rate: u32,
    pub duration_seconds: f32,
    pub rms: f32,
    pub peak: f32,
    pub spectral_centroid_hz: f32,
    /// Frequency of the strongest non-DC bin.
    pub dominant_hz: f32,
}

/// Offline analyzer for synthesized cues, used to check that the fallback
/// tones sound like what the catalog promises.
pub struct ToneAnalyzer {
    sample_rate: u32,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl ToneAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders `tone` at the analyzer's rate and measures it.
    pub fn analyze_tone(&mut self, tone: &Tone) -> Result<ToneAnalysis> {
        let samples = synth::render_tone(tone, self.sample_rate)?;
        self.analyze(&samples)
    }

    pub fn analyze_theme(&mut self, rendition: &ThemeRendition) -> Result<ToneAnalysis> {
        let samples = synth::render_theme(rendition, self.sample_rate)?;
        self.analyze(&samples)
    }

    pub fn analyze(&mut self, samples: &[f32]) -> Result<ToneAnalysis> {
        if samples.len() < 2 {
            return Err(TerminalError::InvalidInput(
                "analysis requires at least two samples",
            ));
        }
        if self.sample_rate == 0 {
            return Err(TerminalError::InvalidInput("sample rate must be positive"));
        }

        let (spectral_centroid_hz, dominant_hz) = self.spectrum_features(samples)?;
        Ok(ToneAnalysis {
            sample_rate: self.sample_rate,
            duration_seconds: samples.len() as f32 / self.sample_rate as f32,
            rms: compute_rms(samples),
            peak: samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs())),
            spectral_centroid_hz,
            dominant_hz,
        })
    }

    fn spectrum_features(&mut self, samples: &[f32]) -> Result<(f32, f32)> {
        let len = samples.len();
        let bin_hz = self.sample_rate as f32 / len as f32;
        let fft = self.prepare_fft(len);

        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let mut magnitude_sum = 0.0;
        let mut weighted_sum = 0.0;
        let mut strongest = (0_usize, 0.0_f32);

        for (i, bin) in fft.spectrum.iter().enumerate() {
            let magnitude = bin.norm();
            magnitude_sum += magnitude;
            weighted_sum += magnitude * (i as f32 * bin_hz);
            if i > 0 && magnitude > strongest.1 {
                strongest = (i, magnitude);
            }
        }

        if magnitude_sum <= f32::EPSILON {
            Ok((0.0, 0.0))
        } else {
            Ok((weighted_sum / magnitude_sum, strongest.0 as f32 * bin_hz))
        }
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(true, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            FftResources {
                size,
                scratch: plan.make_scratch_vec(),
                spectrum: plan.make_output_vec(),
                input: plan.make_input_vec(),
                plan,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for ToneAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToneAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

fn compute_rms(samples: &[f32]) -> f32 {
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
