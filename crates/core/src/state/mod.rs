use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

use crate::{session::SessionTable, spectrum::SpectrumBuffer, AppConfig, MicSensitivity};

/// State shared by the session manager, the frame pipeline and the audio
/// task. Scalar settings are plain atomics so the UI can change them at any
/// time without coordinating with the pipelines.
#[derive(Debug)]
pub struct AppState {
    pub sessions: SessionTable,
    pub spectrum: SpectrumBuffer,
    effect_index: AtomicUsize,
    sensitivity: AtomicU8,
    streaming: AtomicBool,
    shutdown: AtomicBool,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            sessions: SessionTable::new(),
            spectrum: SpectrumBuffer::new(config.audio.fft_size),
            effect_index: AtomicUsize::new(0),
            sensitivity: AtomicU8::new(config.audio.sensitivity.as_index()),
            streaming: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn effect_index(&self) -> usize {
        self.effect_index.load(Ordering::Relaxed)
    }

    /// Picks the effect rendered from the next frame on. Out-of-range values
    /// are wrapped by the registry.
    pub fn select_effect(&self, index: usize) {
        self.effect_index.store(index, Ordering::Relaxed);
    }

    pub fn sensitivity(&self) -> MicSensitivity {
        MicSensitivity::from_index(self.sensitivity.load(Ordering::Relaxed))
    }

    pub fn set_sensitivity(&self, sensitivity: MicSensitivity) {
        self.sensitivity.store(sensitivity.as_index(), Ordering::Relaxed);
    }

    /// Whether the frame pipeline delivers packets at all. Latched on when
    /// both peripherals first become ready.
    pub fn streaming_enabled(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn set_streaming_enabled(&self, enabled: bool) {
        self.streaming.store(enabled, Ordering::Release);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_configured_sensitivity() {
        let mut config = AppConfig::default();
        config.audio.sensitivity = MicSensitivity::High;
        let state = AppState::new(&config);

        assert_eq!(state.sensitivity(), MicSensitivity::High);
        assert_eq!(state.effect_index(), 0);
        assert!(!state.streaming_enabled());
        assert!(!state.is_shutting_down());
        assert_eq!(state.sessions.occupied(), 0);
        assert_eq!(state.spectrum.snapshot().bins.len(), 8);
    }

    #[test]
    fn settings_change_at_runtime() {
        let state = AppState::new(&AppConfig::default());
        state.select_effect(7);
        state.set_sensitivity(MicSensitivity::Low);
        state.set_streaming_enabled(true);
        state.request_shutdown();

        assert_eq!(state.effect_index(), 7);
        assert_eq!(state.sensitivity(), MicSensitivity::Low);
        assert!(state.streaming_enabled());
        assert!(state.is_shutting_down());
    }
}
