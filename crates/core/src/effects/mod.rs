//! Frame generators selectable at runtime.
//!
//! An effect fills a [`PixelFrame`] from the current motion sample and,
//! optionally, the latest spectrum. Effects keep whatever state they need
//! between frames (hue accumulators, smoothing filters) in their own struct.

pub mod audio;
pub mod color;
pub mod motion;

use std::fmt;

use crate::{frame::PixelFrame, spectrum::SpectrumReader, MotionSample};

pub trait Effect: Send {
    fn name(&self) -> &'static str;

    /// Writes this cycle's colours into `frame`.
    ///
    /// Audio-reactive effects must use [`SpectrumReader::read`] and leave
    /// `frame` untouched when it times out.
    fn render(&mut self, motion: &MotionSample, spectrum: &SpectrumReader, frame: &mut PixelFrame);
}

/// Ordered, index-addressed set of effects.
#[derive(Default)]
pub struct EffectRegistry {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard effect list, motion effects first.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(motion::GravityRainbow)
            .register(motion::SpinFire)
            .register(motion::CentrifugalRainbow::default())
            .register(motion::FlowTrail)
            .register(motion::GravityCompass)
            .register(motion::VelocityPrism::default())
            .register(motion::WarpSpeed)
            .register(motion::FireIceSplit)
            .register(motion::ShiftingHorizon::default())
            .register(motion::GravityBall)
            .register(audio::AudioSpectrum)
            .register(audio::AudioWave::default())
            .register(audio::AudioPeak::default())
            .register(audio::AudioVuMeter::default());
        registry
    }

    pub fn register(&mut self, effect: impl Effect + 'static) -> &mut Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Position an arbitrary selection maps to. Selections wrap around.
    pub fn resolve(&self, index: usize) -> Option<usize> {
        (!self.effects.is_empty()).then(|| index % self.effects.len())
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.resolve(index).map(|i| self.effects[i].name())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.effects.iter().map(|e| e.name()).collect()
    }

    /// Renders the effect selected by `index` into `frame`. Returns the name
    /// of the effect that ran, or `None` for an empty registry.
    pub fn render(
        &mut self,
        index: usize,
        motion: &MotionSample,
        spectrum: &SpectrumReader,
        frame: &mut PixelFrame,
    ) -> Option<&'static str> {
        let slot = self.resolve(index)?;
        let effect = &mut self.effects[slot];
        effect.render(motion, spectrum, frame);
        Some(effect.name())
    }
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("effects", &self.names())
            .finish()
    }
}
