use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;

/// Added to every normalised magnitude before taking the logarithm.
pub const LOG_EPSILON: f32 = 1e-9;

/// Level reported for a bin with no energy at all.
pub fn silence_db() -> f32 {
    20.0 * LOG_EPSILON.log10()
}

/// Most recent result of the audio analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    /// Log-magnitude bins, one per frequency below Nyquist.
    pub bins: Vec<f32>,
    /// Windowed time-domain samples the bins were computed from.
    pub samples: Vec<f32>,
    /// Mean absolute value of `samples`.
    pub average_amplitude: f32,
}

impl SpectrumSnapshot {
    /// A silent snapshot for a transform of `fft_size` samples.
    pub fn silent(fft_size: usize) -> Self {
        Self {
            bins: vec![silence_db(); fft_size / 2],
            samples: vec![0.0; fft_size],
            average_amplitude: 0.0,
        }
    }

    pub fn peak_bin(&self) -> Option<(usize, f32)> {
        self.bins
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, db)| match best {
                Some((_, best_db)) if best_db >= db => best,
                _ => Some((i, db)),
            })
    }

    fn overwrite(&mut self, bins: &[f32], samples: &[f32]) {
        self.bins.clear();
        self.bins.extend_from_slice(bins);
        self.samples.clear();
        self.samples.extend_from_slice(samples);
        self.average_amplitude = if samples.is_empty() {
            0.0
        } else {
            samples.iter().map(|s| s.abs()).sum::<f32>() / samples.len() as f32
        };
    }
}

/// Shared, lock-guarded spectrum written by the audio task and read by
/// effects on the frame task.
#[derive(Debug, Clone)]
pub struct SpectrumBuffer {
    shared: Arc<Mutex<SpectrumSnapshot>>,
}

impl SpectrumBuffer {
    pub fn new(fft_size: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SpectrumSnapshot::silent(fft_size))),
        }
    }

    /// Replaces the whole snapshot. The lock is held only for the copy.
    pub fn publish(&self, bins: &[f32], samples: &[f32]) {
        self.shared.lock().overwrite(bins, samples);
    }

    /// Runs `read` against the snapshot if the lock can be taken within
    /// `timeout`. Returns `None` when the writer holds it for too long.
    pub fn try_read<R>(&self, timeout: Duration, read: impl FnOnce(&SpectrumSnapshot) -> R) -> Option<R> {
        let guard = self.shared.try_lock_for(timeout)?;
        Some(read(&guard))
    }

    /// Blocking copy of the current snapshot. Not for use on the frame path.
    pub fn snapshot(&self) -> SpectrumSnapshot {
        self.shared.lock().clone()
    }

    pub fn reader(&self, timeout: Duration) -> SpectrumReader {
        SpectrumReader {
            buffer: self.clone(),
            timeout,
        }
    }
}

/// Read-only view handed to effects, bound to the pipeline's lock timeout.
#[derive(Debug, Clone)]
pub struct SpectrumReader {
    buffer: SpectrumBuffer,
    timeout: Duration,
}

impl SpectrumReader {
    pub fn read<R>(&self, read: impl FnOnce(&SpectrumSnapshot) -> R) -> Option<R> {
        self.buffer.try_read(self.timeout, read)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_silent() {
        let buffer = SpectrumBuffer::new(16);
        let snap = buffer.snapshot();
        assert_eq!(snap.bins.len(), 8);
        assert_eq!(snap.samples.len(), 16);
        assert!(snap.bins.iter().all(|db| (*db - silence_db()).abs() < 1e-3));
        assert!(silence_db() < -170.0);
    }

    #[test]
    fn publish_replaces_everything() {
        let buffer = SpectrumBuffer::new(4);
        buffer.publish(&[-10.0, -20.0], &[0.5, -0.5, 0.25, -0.25]);
        let snap = buffer.snapshot();
        assert_eq!(snap.bins, vec![-10.0, -20.0]);
        assert_eq!(snap.samples, vec![0.5, -0.5, 0.25, -0.25]);
        assert!((snap.average_amplitude - 0.375).abs() < 1e-6);
        assert_eq!(snap.peak_bin(), Some((0, -10.0)));
    }

    #[test]
    fn try_read_gives_up_while_writer_holds_lock() {
        let buffer = SpectrumBuffer::new(4);
        let guard = buffer.shared.lock();

        let reader = buffer.reader(Duration::from_millis(5));
        let other = reader.clone();
        let result = std::thread::spawn(move || other.read(|snap| snap.bins.len()))
            .join()
            .unwrap();
        assert_eq!(result, None);

        drop(guard);
        assert_eq!(reader.read(|snap| snap.bins.len()), Some(2));
    }
}
