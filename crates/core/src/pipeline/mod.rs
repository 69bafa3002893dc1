//! Fixed-cadence frame generation and delivery.
//!
//! Once per period the pipeline samples motion, runs the selected effect,
//! scales the result into the packet buffer and hands one packet to every
//! ready session. A slow or saturated session only ever costs that session
//! its frame.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::RwLock;
use serde::Serialize;

use crate::{
    effects::EffectRegistry,
    frame::PixelFrame,
    motion::MotionSource,
    protocol::{FramePacket, HANDSHAKE},
    session::DeliveryTarget,
    spectrum::SpectrumReader,
    transport::Transport,
    AppConfig, AppState, MotionSample, PoiError, Result,
};

/// Running totals since the pipeline was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub cycles: u64,
    pub frames_rendered: u64,
    pub handshakes_sent: u64,
    pub packets_sent: u64,
    /// Packets not queued because the transport buffers were full.
    pub frames_dropped: u64,
    pub write_errors: u64,
    pub sensor_errors: u64,
}

/// What a single cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub rendered: bool,
    pub handshakes: usize,
    pub packets: usize,
    pub dropped: usize,
    pub errors: usize,
}

/// Cloneable control surface of a pipeline running on its own thread.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    stopped: Arc<AtomicBool>,
    stats: Arc<RwLock<PipelineStats>>,
}

impl PipelineHandle {
    /// Stops the pipeline. No transport write starts after this returns.
    /// Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        *self.stats.read()
    }
}

pub struct FramePipeline<M> {
    transport: Arc<dyn Transport>,
    state: Arc<AppState>,
    registry: EffectRegistry,
    motion: M,
    last_motion: MotionSample,
    frame: PixelFrame,
    packet: FramePacket,
    reader: SpectrumReader,
    brightness: f32,
    period: Duration,
    handle: PipelineHandle,
}

impl<M: MotionSource> FramePipeline<M> {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn Transport>,
        state: Arc<AppState>,
        registry: EffectRegistry,
        motion: M,
    ) -> Self {
        let led_count = config.device.led_count;
        let reader = state.spectrum.reader(config.stream.spectrum_lock_timeout());
        Self {
            transport,
            state,
            registry,
            motion,
            last_motion: MotionSample::default(),
            frame: PixelFrame::new(led_count),
            packet: FramePacket::new(led_count),
            reader,
            brightness: config.stream.brightness.clamp(0.0, 1.0),
            period: config.stream.period(),
            handle: PipelineHandle {
                stopped: Arc::new(AtomicBool::new(false)),
                stats: Arc::new(RwLock::new(PipelineStats::default())),
            },
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    pub fn stats(&self) -> PipelineStats {
        self.handle.stats()
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Unscaled output of the last effect run.
    pub fn frame(&self) -> &PixelFrame {
        &self.frame
    }

    /// Runs one render-and-deliver pass. Does nothing while streaming is
    /// disabled or after [`stop`](Self::stop).
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.handle.is_stopped() || !self.state.streaming_enabled() {
            return report;
        }

        let motion = match self.motion.read() {
            Ok(sample) => {
                self.last_motion = sample;
                sample
            }
            Err(err) => {
                tracing::debug!(%err, "motion read failed, reusing last sample");
                self.handle.stats.write().sensor_errors += 1;
                self.last_motion
            }
        };

        let index = self.state.effect_index();
        report.rendered = self
            .registry
            .render(index, &motion, &self.reader, &mut self.frame)
            .is_some();
        self.packet.load(&self.frame, self.brightness);

        // Copied out so no lock is held across transport calls.
        let targets = self.state.sessions.delivery_targets();
        for target in targets.into_iter().flatten() {
            if self.handle.is_stopped() {
                break;
            }
            if target.stream_started {
                self.send_frame(target, &mut report);
            } else {
                self.send_handshake(target, &mut report);
            }
        }

        self.record(&report);
        report
    }

    fn send_handshake(&self, target: DeliveryTarget, report: &mut CycleReport) {
        match self.transport.write(target.conn, target.rx, &HANDSHAKE) {
            Ok(()) => {
                if self.state.sessions.mark_stream_started(target.slot, target.id) {
                    tracing::info!(slot = target.slot, conn = target.conn.0, "stream started");
                    report.handshakes += 1;
                }
            }
            Err(err) => {
                tracing::debug!(slot = target.slot, %err, "handshake not sent, retrying next cycle");
                report.errors += 1;
            }
        }
    }

    fn send_frame(&self, target: DeliveryTarget, report: &mut CycleReport) {
        match self
            .transport
            .write_without_response(target.conn, target.rx, self.packet.as_bytes())
        {
            Ok(()) => report.packets += 1,
            Err(err) if err.is_transient() => {
                tracing::trace!(slot = target.slot, %err, "frame dropped");
                report.dropped += 1;
            }
            Err(err) => {
                tracing::debug!(slot = target.slot, %err, "frame write failed");
                report.errors += 1;
            }
        }
    }

    fn record(&self, report: &CycleReport) {
        let mut stats = self.handle.stats.write();
        stats.cycles += 1;
        stats.frames_rendered += u64::from(report.rendered);
        stats.handshakes_sent += report.handshakes as u64;
        stats.packets_sent += report.packets as u64;
        stats.frames_dropped += report.dropped as u64;
        stats.write_errors += report.errors as u64;
    }

    /// Cycles at the configured period until stopped or shut down.
    pub fn run(mut self) -> Result<()> {
        tracing::info!(
            period_ms = self.period.as_millis() as u64,
            brightness = self.brightness,
            effects = self.registry.len(),
            "frame pipeline running"
        );

        while !self.handle.is_stopped() && !self.state.is_shutting_down() {
            let started = Instant::now();
            self.run_cycle();
            let elapsed = started.elapsed();
            if elapsed < self.period {
                thread::sleep(self.period - elapsed);
            }
        }

        self.handle.stop();
        tracing::info!("frame pipeline stopped");
        Ok(())
    }
}

impl<M: MotionSource + 'static> FramePipeline<M> {
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || self.run())
            .map_err(|err| PoiError::Thread {
                name: "frame-pipeline",
                reason: err.to_string(),
            })
    }
}
