//! Audio frame with format metadata.

use std::time::Duration;

/// A buffer of normalized audio samples moving through the pipeline.
///
/// Samples are `f32` in `[-1.0, 1.0]`, interleaved when `channels > 1`
/// (`L R L R ...`). A frame is created at capture or at remote receive and is
/// consumed by the next stage; it is never retained beyond one hop.
///
/// # Example
///
/// ```
/// use companion_runtime::AudioFrame;
/// use std::time::Duration;
///
/// let frame = AudioFrame::new(vec![0.0; 3200], 16000, 2);
/// assert_eq!(frame.frame_count(), 1600);
/// assert_eq!(frame.duration(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved samples.
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 16000, 24000).
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
}

impl AudioFrame {
    /// Creates a frame from interleaved samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Creates a mono frame.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Creates a stereo frame from `(left, right)` pairs.
    pub fn stereo(pairs: &[(f32, f32)], sample_rate: u32) -> Self {
        let samples = pairs.iter().flat_map(|&(l, r)| [l, r]).collect();
        Self::new(samples, sample_rate, 2)
    }

    /// Returns the number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Returns the playback duration of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Returns `true` if this frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the samples of one channel, de-interleaved.
    pub fn channel(&self, index: u16) -> Vec<f32> {
        if index >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }
}
