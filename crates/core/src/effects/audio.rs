//! Effects that react to the shared spectrum.
//!
//! Each one takes the spectrum lock through [`SpectrumReader::read`] and does
//! all of its work inside the closure. When the lock cannot be taken in time
//! neither the frame nor the effect's own state changes.

use super::{
    color::{advance_hue, hsv_to_rgb, led_position, normalize_db, wrap_hue, MIN_BRIGHTNESS},
    Effect,
};
use crate::{frame::PixelFrame, spectrum::SpectrumReader, MotionSample};

/// dB level mapped to the bottom of the spectrum display.
const SPECTRUM_FLOOR_DB: f32 = -70.0;
/// dB level below which the peak is considered silent.
const PEAK_FLOOR_DB: f32 = -65.0;

/// Bins stretched across the strip, blue when quiet, red when loud.
#[derive(Debug, Default)]
pub struct AudioSpectrum;

impl AudioSpectrum {
    /// Bin level at a fractional bin position, linearly interpolated.
    fn level_at(bins: &[f32], position: f32) -> f32 {
        let Some(last) = bins.len().checked_sub(1) else {
            return SPECTRUM_FLOOR_DB;
        };
        let low = (position.floor() as usize).min(last);
        let high = (position.ceil() as usize).min(last);
        let t = position - position.floor();
        bins[low] * (1.0 - t) + bins[high] * t
    }
}

impl Effect for AudioSpectrum {
    fn name(&self) -> &'static str {
        "Audio Spectrum"
    }

    fn render(&mut self, _: &MotionSample, spectrum: &SpectrumReader, frame: &mut PixelFrame) {
        spectrum.read(|snap| {
            let count = frame.led_count();
            let span = snap.bins.len().saturating_sub(1) as f32;
            for led in 0..count {
                let level = Self::level_at(&snap.bins, led_position(led, count) * span);
                let norm = normalize_db(level, SPECTRUM_FLOOR_DB);
                let brightness = (norm * 1.2 + MIN_BRIGHTNESS).max(MIN_BRIGHTNESS * 2.0).min(1.0);
                let hue = 170u8.wrapping_sub((norm * 220.0) as u8);
                frame.set(led, hsv_to_rgb(hue).scale(brightness));
            }
        });
    }
}

/// Travelling sine wave whose speed, height and colour follow loudness.
#[derive(Debug, Default)]
pub struct AudioWave {
    phase: f32,
    hue_offset: f32,
}

impl Effect for AudioWave {
    fn name(&self) -> &'static str {
        "Audio Wave"
    }

    fn render(&mut self, motion: &MotionSample, spectrum: &SpectrumReader, frame: &mut PixelFrame) {
        spectrum.read(|snap| {
            let loudness = (snap.average_amplitude * 15.0).min(1.0);
            let brightness = (loudness * 1.5 + MIN_BRIGHTNESS).max(MIN_BRIGHTNESS * 2.0);
            advance_hue(&mut self.hue_offset, 1.0 + loudness * 4.0 + motion.gyro_z.abs() / 200.0);
            self.phase += 0.2 + loudness * 2.0;

            let amplitude = 0.4 + loudness * 0.6;
            let frequency = 1.0 + loudness * 0.7;
            let count = frame.led_count();
            for led in 0..count {
                let x = led_position(led, count) * std::f32::consts::PI * frequency;
                let wave = ((x + self.phase).sin() * amplitude + 1.0) / 2.0;
                let hue = wrap_hue(self.hue_offset + wave * 120.0 + led as f32 / count as f32 * 50.0);
                let level = (brightness * (0.5 + wave * 0.5)).clamp(MIN_BRIGHTNESS, 1.0);
                frame.set(led, hsv_to_rgb(hue).scale(level));
            }
        });
    }
}

/// Colour of the loudest bin glides toward that bin's position over a
/// slowly cycling background.
#[derive(Debug, Default)]
pub struct AudioPeak {
    hue_offset: f32,
    peak_position: f32,
}

impl Effect for AudioPeak {
    fn name(&self) -> &'static str {
        "Audio Peak"
    }

    fn render(&mut self, _: &MotionSample, spectrum: &SpectrumReader, frame: &mut PixelFrame) {
        spectrum.read(|snap| {
            let Some((peak_bin, peak_db)) = snap.peak_bin() else {
                return;
            };
            let loudness = (snap.average_amplitude * 10.0).min(1.0);
            let peak_level = normalize_db(peak_db, PEAK_FLOOR_DB);
            let bin_span = snap.bins.len().saturating_sub(1).max(1) as f32;
            let bin_share = peak_bin as f32 / bin_span;

            let peak_color = hsv_to_rgb(wrap_hue(bin_share * 190.0 + self.hue_offset));
            advance_hue(&mut self.hue_offset, 0.2 + loudness * 0.8);

            let count = frame.led_count();
            let target = bin_share * count.saturating_sub(1) as f32;
            self.peak_position = self.peak_position * 0.7 + target * 0.3;

            let background_level = MIN_BRIGHTNESS + loudness * 0.4;
            let spread = count as f32 / 2.0;
            for led in 0..count {
                let background = hsv_to_rgb(wrap_hue(self.hue_offset + led as f32 * 7.0));
                let distance = (led as f32 - self.peak_position).abs();
                let intensity = peak_level * (-distance / spread).exp();
                let mix = (intensity * (0.9 + loudness * 0.3)).min(1.0);
                let level = (background_level + intensity).min(1.0);
                frame.set(led, background.blend(peak_color, mix).scale(level));
            }
        });
    }
}

/// Classic level meter: a smoothed loudness bar over a dim pulsing backdrop.
#[derive(Debug, Default)]
pub struct AudioVuMeter {
    hue_offset: f32,
    level: f32,
}

impl AudioVuMeter {
    /// Number of lit LEDs for a smoothed level.
    pub fn active_leds(level: f32, led_count: usize) -> usize {
        ((level * led_count as f32) as usize).min(led_count)
    }
}

impl Effect for AudioVuMeter {
    fn name(&self) -> &'static str {
        "Audio VU Meter"
    }

    fn render(&mut self, _: &MotionSample, spectrum: &SpectrumReader, frame: &mut PixelFrame) {
        spectrum.read(|snap| {
            let loudness = (snap.average_amplitude * 20.0).min(1.0);
            self.level = self.level * 0.8 + loudness * 0.2;
            advance_hue(&mut self.hue_offset, 0.05 + self.level * 0.5);

            let count = frame.led_count();
            let active = Self::active_leds(self.level, count);
            let lit_level = (self.level * 1.2 + 0.1).min(1.0);
            let idle_level = (MIN_BRIGHTNESS * 1.5 * (0.8 + 0.2 * (self.hue_offset / 20.0).sin()))
                .max(MIN_BRIGHTNESS);

            for led in 0..count {
                let color = if led < active {
                    hsv_to_rgb(wrap_hue(self.hue_offset + led_position(led, count) * 170.0))
                        .scale(lit_level)
                } else {
                    hsv_to_rgb(wrap_hue(self.hue_offset + led as f32 * 5.0)).scale(idle_level)
                };
                frame.set(led, color);
            }
        });
    }
}
