use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{spectrum::LOG_EPSILON, PoiError, Result};

/// Full-scale value of a signed 16-bit sample.
const I16_FULL_SCALE: f32 = 32_768.0;

/// Turns blocks of interleaved stereo PCM into a log-magnitude spectrum.
///
/// All buffers are allocated once in [`SpectrumAnalyzer::new`]; processing a
/// block does not allocate.
pub struct SpectrumAnalyzer {
    size: usize,
    window: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    samples: Vec<f32>,
    bins: Vec<f32>,
}

impl SpectrumAnalyzer {
    /// Plans a forward transform of `size` samples.
    ///
    /// Fails when `size` is not a power of two of at least 4; the audio task
    /// treats that as fatal.
    pub fn new(size: usize) -> Result<Self> {
        if size < 4 || !size.is_power_of_two() {
            return Err(PoiError::Analysis(format!(
                "transform length must be a power of two >= 4, got {size}"
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        Ok(Self {
            size,
            window: (0..size).map(|i| hann_value(i, size)).collect(),
            plan,
            input,
            spectrum,
            scratch,
            samples: vec![0.0; size],
            bins: vec![0.0; size / 2],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of interleaved stereo values one block must contain.
    pub fn block_len(&self) -> usize {
        self.size * 2
    }

    /// Downmixes, applies `gain` and the window, transforms, and converts to
    /// dB. Results are available from [`bins`](Self::bins) and
    /// [`samples`](Self::samples) until the next call.
    pub fn process_block(&mut self, interleaved: &[i16], gain: f32) -> Result<()> {
        if interleaved.len() != self.block_len() {
            return Err(PoiError::Analysis(format!(
                "expected {} interleaved samples, got {}",
                self.block_len(),
                interleaved.len()
            )));
        }

        for (i, frame) in interleaved.chunks_exact(2).enumerate() {
            let mono = (f32::from(frame[0]) + f32::from(frame[1])) / (2.0 * I16_FULL_SCALE);
            self.samples[i] = mono * gain * self.window[i];
        }
        self.input.copy_from_slice(&self.samples);

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|err| PoiError::Analysis(err.to_string()))?;

        let half = (self.size / 2) as f32;
        for (bin, value) in self.bins.iter_mut().zip(&self.spectrum) {
            *bin = 20.0 * (value.norm() / half + LOG_EPSILON).log10();
        }
        Ok(())
    }

    /// Log-magnitude bins of the last processed block.
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Windowed mono samples of the last processed block.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
