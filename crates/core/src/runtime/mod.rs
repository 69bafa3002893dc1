//! Composition root: builds the shared state and runs the three workers.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::{
    audio::{AudioPipeline, AudioSource},
    effects::EffectRegistry,
    manager::SessionManager,
    motion::MotionSource,
    pipeline::{FramePipeline, PipelineHandle},
    status::StatusReport,
    transport::{Transport, TransportEvent},
    AppConfig, AppState, PoiError, Result,
};

type Worker = (&'static str, JoinHandle<Result<()>>);

/// Upper bound on how long `shutdown` waits for the workers to exit.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
const JOIN_POLL: Duration = Duration::from_millis(5);

pub struct Runtime {
    state: Arc<AppState>,
    manager: Arc<SessionManager>,
    pipeline: PipelineHandle,
    effect_names: Vec<&'static str>,
    workers: Mutex<Vec<Worker>>,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Validates `config`, then starts the audio, frame and session workers.
    ///
    /// `events` must be the receiving end of the channel `transport` reports
    /// on.
    pub fn start<M, A>(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        events: Receiver<TransportEvent>,
        motion: M,
        audio: A,
        registry: EffectRegistry,
    ) -> Result<Self>
    where
        M: MotionSource + 'static,
        A: AudioSource + 'static,
    {
        config.validate()?;
        if registry.is_empty() {
            return Err(PoiError::config("at least one effect must be registered"));
        }

        let state = Arc::new(AppState::new(config));
        let effect_names = registry.names();
        let manager = Arc::new(SessionManager::new(config, transport.clone(), state.clone())?);
        let audio = AudioPipeline::new(&config.audio, audio, state.clone())?;
        let frames = FramePipeline::new(config, transport, state.clone(), registry, motion);
        let pipeline = frames.handle();

        let mut workers: Vec<Worker> = Vec::with_capacity(3);
        let spawned = audio
            .spawn()
            .map(|h| workers.push(("audio", h)))
            .and_then(|()| frames.spawn().map(|h| workers.push(("frame-pipeline", h))))
            .and_then(|()| {
                manager
                    .clone()
                    .spawn(events)
                    .map(|h| workers.push(("session-manager", h)))
            });
        if let Err(err) = spawned {
            // Workers that did start exit on their own once they see this.
            state.request_shutdown();
            pipeline.stop();
            return Err(err);
        }

        tracing::info!(
            target_name = %config.device.target_name,
            led_count = config.device.led_count,
            "runtime started"
        );
        Ok(Self {
            state,
            manager,
            pipeline,
            effect_names,
            workers: Mutex::new(workers),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn effect_names(&self) -> &[&'static str] {
        &self.effect_names
    }

    pub fn status(&self) -> StatusReport {
        StatusReport::capture(&self.state, &self.effect_names, self.pipeline.stats())
    }

    /// Stops scanning and streaming, then joins every worker.
    ///
    /// Idempotent. A worker still blocked after `JOIN_TIMEOUT` (an audio
    /// read that never returns) is left detached and reported as an error.
    /// Returns the first error a worker ended with.
    pub fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("shutting down");

        self.manager.stop();
        self.state.set_streaming_enabled(false);
        self.pipeline.stop();
        self.state.request_shutdown();

        let workers = std::mem::take(&mut *self.workers.lock());
        let deadline = Instant::now() + JOIN_TIMEOUT;
        let mut first_error = None;
        for (name, handle) in workers {
            if let Err(err) = join_before(name, handle, deadline) {
                tracing::warn!(worker = name, %err, "worker ended with an error");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn join_before(name: &'static str, handle: JoinHandle<Result<()>>, deadline: Instant) -> Result<()> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(worker = name, "worker did not stop in time, detaching it");
            return Err(PoiError::Thread {
                name,
                reason: "still running at the shutdown deadline".to_string(),
            });
        }
        thread::sleep(JOIN_POLL);
    }
    handle.join().unwrap_or_else(|_| {
        Err(PoiError::Thread {
            name,
            reason: "panicked".to_string(),
        })
    })
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::debug!(%err, "shutdown during drop reported an error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sim::{ScriptedAudio, SimPeripheral, SimulatedRadio, SyntheticAudio, SyntheticMotion},
        transport::PeerAddress,
    };

    const A: PeerAddress = PeerAddress([0xa0, 0, 0, 0, 0, 1]);
    const B: PeerAddress = PeerAddress([0xb0, 0, 0, 0, 0, 2]);

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            if Instant::now() > deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn start_with<S: AudioSource + 'static>(audio: S) -> (Runtime, Arc<SimulatedRadio>) {
        let config = AppConfig::default();
        let (radio, events) = SimulatedRadio::with_channel(&config);
        radio.add_peripheral(SimPeripheral::poi(A));
        radio.add_peripheral(SimPeripheral::poi(B));
        let runtime = Runtime::start(
            &config,
            radio.clone(),
            events,
            SyntheticMotion::new(config.stream.period(), 1.5),
            audio,
            EffectRegistry::with_defaults(),
        )
        .unwrap();
        (runtime, radio)
    }

    #[test]
    fn streams_to_both_peripherals_and_shuts_down_cleanly() {
        let (runtime, radio) = start_with(SyntheticAudio::new(2000, 250.0, 0.6));
        runtime.state().select_effect(10);

        assert!(wait_for(|| radio.data_packets(A) >= 3 && radio.data_packets(B) >= 3));
        assert!(wait_for(|| runtime.state().spectrum.snapshot().average_amplitude > 0.0));

        let status = runtime.status();
        assert!(status.fully_connected);
        assert!(status.streaming);
        assert_eq!(status.effect, Some("Audio Spectrum"));
        assert!(status.stats.packets_sent >= 6);
        assert_eq!(radio.handshakes(A), 1);
        assert_eq!(radio.data_before_handshake(A), 0);
        assert_eq!(radio.data_before_handshake(B), 0);

        runtime.shutdown().unwrap();
        runtime.shutdown().unwrap();
        assert!(!runtime.state().streaming_enabled());
        assert!(!radio.is_scanning());

        let sent = radio.received(A);
        thread::sleep(Duration::from_millis(120));
        assert_eq!(radio.received(A), sent);
    }

    #[test]
    fn recovers_from_a_dropped_peripheral() {
        let (runtime, radio) = start_with(SyntheticAudio::new(2000, 250.0, 0.6));
        assert!(wait_for(|| radio.data_packets(A) >= 2));

        radio.drop_link(A);
        assert!(wait_for(|| radio.handshakes(A) == 2));
        assert!(wait_for(|| radio.data_packets(A) >= 4));
        assert_eq!(radio.data_before_handshake(A), 0);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn audio_failure_does_not_stop_streaming() {
        let (runtime, radio) = start_with(ScriptedAudio::new(Vec::new()).failing_start());
        assert!(wait_for(|| radio.data_packets(B) >= 2));
        assert!(matches!(runtime.shutdown(), Err(PoiError::Audio(_))));
    }

    /// A capture device that never delivers a block.
    struct SilentMic;

    impl AudioSource for SilentMic {
        fn read_block(&mut self, _: &mut [i16]) -> Result<usize> {
            thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[test]
    fn shutdown_is_bounded_when_the_audio_read_blocks() {
        let (runtime, radio) = start_with(SilentMic);
        assert!(wait_for(|| radio.data_packets(A) >= 2));

        let started = Instant::now();
        let result = runtime.shutdown();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(result, Err(PoiError::Thread { name: "audio", .. })));

        // The other workers did stop.
        assert!(!runtime.state().streaming_enabled());
        let sent = radio.received(A);
        thread::sleep(Duration::from_millis(120));
        assert_eq!(radio.received(A), sent);
        assert!(runtime.shutdown().is_ok());
    }

    #[test]
    fn rejects_an_empty_registry() {
        let config = AppConfig::default();
        let (radio, events) = SimulatedRadio::with_channel(&config);
        let result = Runtime::start(
            &config,
            radio,
            events,
            SyntheticMotion::new(config.stream.period(), 1.0),
            SyntheticAudio::new(2000, 100.0, 0.1),
            EffectRegistry::new(),
        );
        assert!(matches!(result, Err(PoiError::Config(_))));
    }
}
