use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use crate::{AppState, AudioConfig, PoiError, Result, SpectrumAnalyzer};

/// Blocking source of interleaved stereo 16-bit PCM.
pub trait AudioSource: Send {
    /// Brings up the codec or capture device. Called once before reading.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fills `buf` with interleaved samples and returns how many were
    /// written. Anything short of `buf.len()` is treated as a failed read.
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize>;
}

/// Outcome of one pass through the audio loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCycle {
    /// A new snapshot replaced the previous one.
    Published,
    /// The read failed; the previous snapshot stays current.
    Skipped,
}

/// Continuous capture → window → transform → publish loop.
pub struct AudioPipeline<S> {
    source: S,
    analyzer: SpectrumAnalyzer,
    block: Vec<i16>,
    state: Arc<AppState>,
}

impl<S: AudioSource> AudioPipeline<S> {
    /// Plans the transform. An unusable transform length is fatal.
    pub fn new(config: &AudioConfig, source: S, state: Arc<AppState>) -> Result<Self> {
        let analyzer = SpectrumAnalyzer::new(config.fft_size)?;
        let block = vec![0; analyzer.block_len()];
        Ok(Self {
            source,
            analyzer,
            block,
            state,
        })
    }

    /// Reads one block and, if it is complete, publishes its spectrum.
    pub fn run_once(&mut self) -> AudioCycle {
        let expected = self.block.len();
        match self.source.read_block(&mut self.block) {
            Ok(read) if read == expected => {}
            Ok(read) => {
                tracing::warn!(read, expected, "short audio read, keeping previous spectrum");
                return AudioCycle::Skipped;
            }
            Err(err) => {
                tracing::warn!(%err, "audio read failed, keeping previous spectrum");
                return AudioCycle::Skipped;
            }
        }

        let gain = self.state.sensitivity().gain();
        if let Err(err) = self.analyzer.process_block(&self.block, gain) {
            tracing::warn!(%err, "spectral analysis failed, keeping previous spectrum");
            return AudioCycle::Skipped;
        }

        self.state
            .spectrum
            .publish(self.analyzer.bins(), self.analyzer.samples());
        AudioCycle::Published
    }

    /// Starts the source and loops until shutdown is requested.
    ///
    /// Returns an error only when the source cannot be started; the task
    /// ends in that case since no spectrum could ever be produced.
    pub fn run(mut self) -> Result<()> {
        if let Err(err) = self.source.start() {
            tracing::error!(%err, "audio input initialisation failed, audio task exiting");
            return Err(err);
        }
        tracing::info!(size = self.analyzer.size(), "audio analysis running");

        while !self.state.is_shutting_down() {
            self.run_once();
        }

        tracing::info!("audio analysis stopped");
        Ok(())
    }
}

impl<S: AudioSource + 'static> AudioPipeline<S> {
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("audio".to_string())
            .spawn(move || self.run())
            .map_err(|err| PoiError::Thread {
                name: "audio",
                reason: err.to_string(),
            })
    }
}
