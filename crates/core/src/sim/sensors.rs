use std::{collections::VecDeque, f32::consts::TAU, thread, time::Duration};

use crate::{audio::AudioSource, motion::MotionSource, MotionSample, PoiError, Result};

/// Audio source that replays a fixed list of read results.
///
/// Each entry answers one `read_block` call; once the script runs out every
/// read fails.
#[derive(Debug, Default)]
pub struct ScriptedAudio {
    script: VecDeque<Result<Vec<i16>>>,
    fail_start: bool,
}

impl ScriptedAudio {
    pub fn new(script: Vec<Result<Vec<i16>>>) -> Self {
        Self {
            script: script.into(),
            fail_start: false,
        }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl AudioSource for ScriptedAudio {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(PoiError::Audio("codec did not respond".into()));
        }
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize> {
        let samples = self
            .script
            .pop_front()
            .ok_or_else(|| PoiError::Audio("audio script exhausted".into()))??;
        let n = samples.len().min(buf.len());
        buf[..n].copy_from_slice(&samples[..n]);
        Ok(n)
    }
}

/// Stereo sine generator paced like a real capture device.
#[derive(Debug, Clone)]
pub struct SyntheticAudio {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    paced: bool,
}

impl SyntheticAudio {
    /// `amplitude` is a fraction of full scale.
    pub fn new(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frequency,
            amplitude: amplitude.clamp(0.0, 1.0),
            phase: 0.0,
            paced: true,
        }
    }

    /// Returns blocks immediately instead of waiting for them to "arrive".
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

impl AudioSource for SyntheticAudio {
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize> {
        let step = TAU * self.frequency / self.sample_rate as f32;
        for frame in buf.chunks_exact_mut(2) {
            let value = (self.phase.sin() * self.amplitude * f32::from(i16::MAX)) as i16;
            frame[0] = value;
            frame[1] = value;
            self.phase = (self.phase + step) % TAU;
        }

        if self.paced {
            let frames = (buf.len() / 2) as u64;
            thread::sleep(Duration::from_micros(frames * 1_000_000 / u64::from(self.sample_rate)));
        }
        Ok(buf.len() - buf.len() % 2)
    }
}

/// Motion of a poi swung in a steady circle. Acceleration is in g, angular
/// rate in degrees per second.
#[derive(Debug, Clone)]
pub struct SyntheticMotion {
    angle: f32,
    step: f32,
    rate_dps: f32,
}

impl SyntheticMotion {
    /// `period` is the interval between reads.
    pub fn new(period: Duration, revolutions_per_second: f32) -> Self {
        let rate = TAU * revolutions_per_second;
        Self {
            angle: 0.0,
            step: rate * period.as_secs_f32(),
            rate_dps: rate.to_degrees(),
        }
    }
}

impl MotionSource for SyntheticMotion {
    fn read(&mut self) -> Result<MotionSample> {
        self.angle = (self.angle + self.step) % TAU;
        Ok(MotionSample {
            accel_x: self.angle.cos(),
            accel_y: self.angle.sin(),
            accel_z: 0.1 * (self.angle * 0.5).sin(),
            gyro_x: 0.0,
            gyro_y: 0.0,
            gyro_z: self.rate_dps,
        })
    }
}

/// Motion source that replays fixed results, then repeats its last sample.
#[derive(Debug, Default)]
pub struct ScriptedMotion {
    script: VecDeque<Result<MotionSample>>,
    last: MotionSample,
}

impl ScriptedMotion {
    pub fn new(script: Vec<Result<MotionSample>>) -> Self {
        Self {
            script: script.into(),
            last: MotionSample::default(),
        }
    }

    /// Reports the same sample forever.
    pub fn constant(sample: MotionSample) -> Self {
        Self {
            script: VecDeque::new(),
            last: sample,
        }
    }
}

impl MotionSource for ScriptedMotion {
    fn read(&mut self) -> Result<MotionSample> {
        match self.script.pop_front() {
            Some(Ok(sample)) => {
                self.last = sample;
                Ok(sample)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last),
        }
    }
}
