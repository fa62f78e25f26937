//! Mock audio device for testing without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::AudioDevice;
use crate::{AudioFrame, DeviceError};

/// A scripted in-memory audio device.
///
/// Input frames are queued up front (or while running) and handed out by
/// [`poll_input_frame()`](AudioDevice::poll_input_frame) in order; played
/// frames are recorded for inspection.
///
/// # Example
///
/// ```
/// use companion_runtime::{AudioDevice, MockDevice};
///
/// let device = MockDevice::new();
///
/// // Queue 100ms of a 440Hz tone as ten 10ms stereo frames
/// device.queue_sine(440.0, 10, 160);
///
/// assert_eq!(device.input_remaining(), 10);
/// assert_eq!(device.poll_input_frame().unwrap().frame_count(), 160);
/// ```
pub struct MockDevice {
    sample_rate: u32,
    input: Mutex<VecDeque<AudioFrame>>,
    output: Mutex<Vec<AudioFrame>>,
    recording: AtomicBool,
    playing: AtomicBool,
    fail_start: AtomicBool,
    fail_push: AtomicBool,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
}

impl MockDevice {
    /// Creates a device running at 16 kHz with no queued input.
    pub fn new() -> Self {
        Self::with_sample_rate(16000)
    }

    /// Creates a device running at the given sample rate.
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            input: Mutex::new(VecDeque::new()),
            output: Mutex::new(Vec::new()),
            recording: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_push: AtomicBool::new(false),
            start_count: AtomicUsize::new(0),
            stop_count: AtomicUsize::new(0),
        }
    }

    /// Returns the device sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queues one input frame.
    pub fn queue_input(&self, frame: AudioFrame) {
        self.input.lock().push_back(frame);
    }

    /// Queues `count` stereo frames of `frame_len` samples per channel,
    /// each frame filled with its own index scaled into `[0, 1)`.
    ///
    /// The marker value makes capture order observable downstream.
    pub fn queue_numbered(&self, count: usize, frame_len: usize) {
        let mut input = self.input.lock();
        for i in 0..count {
            let value = i as f32 / count.max(1) as f32;
            input.push_back(AudioFrame::new(
                vec![value; frame_len * 2],
                self.sample_rate,
                2,
            ));
        }
    }

    /// Queues `count` stereo frames of a continuous sine tone.
    pub fn queue_sine(&self, frequency: f32, count: usize, frame_len: usize) {
        let rate = self.sample_rate as f32;
        let mut input = self.input.lock();
        for f in 0..count {
            let pairs: Vec<(f32, f32)> = (0..frame_len)
                .map(|i| {
                    let t = (f * frame_len + i) as f32 / rate;
                    let value = 0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin();
                    (value, value)
                })
                .collect();
            input.push_back(AudioFrame::stereo(&pairs, self.sample_rate));
        }
    }

    /// Returns the number of queued input frames not yet polled.
    pub fn input_remaining(&self) -> usize {
        self.input.lock().len()
    }

    /// Returns a copy of every frame pushed for playback.
    pub fn output_frames(&self) -> Vec<AudioFrame> {
        self.output.lock().clone()
    }

    /// Returns the number of frames pushed for playback.
    pub fn output_len(&self) -> usize {
        self.output.lock().len()
    }

    /// Makes the next `start_recording`/`start_playing` calls fail.
    pub fn fail_on_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Makes every later `push_output_frame` call fail.
    pub fn fail_on_push(&self) {
        self.fail_push.store(true, Ordering::SeqCst);
    }

    /// Returns `true` while recording is on.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Returns `true` while playback is on.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Number of successful `start_recording` calls.
    pub fn start_count(&self) -> usize {
        self.start_count.load(Ordering::SeqCst)
    }

    /// Number of `stop_recording` calls that turned recording off.
    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for MockDevice {
    fn poll_input_frame(&self) -> Option<AudioFrame> {
        if !self.is_recording() {
            return None;
        }
        self.input.lock().pop_front()
    }

    fn push_output_frame(&self, frame: AudioFrame) -> Result<(), DeviceError> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(DeviceError::new("push_output_frame", "mock push failure"));
        }
        if !self.is_playing() {
            return Err(DeviceError::new("push_output_frame", "playback is off"));
        }
        self.output.lock().push(frame);
        Ok(())
    }

    fn start_recording(&self) -> Result<(), DeviceError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DeviceError::new("start_recording", "mock device unavailable"));
        }
        self.recording.store(true, Ordering::SeqCst);
        self.start_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_recording(&self) {
        if self.recording.swap(false, Ordering::SeqCst) {
            self.stop_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn start_playing(&self) -> Result<(), DeviceError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(DeviceError::new("start_playing", "mock device unavailable"));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_polls_in_order_while_recording() {
        let device = MockDevice::new();
        device.queue_numbered(3, 4);

        assert!(device.poll_input_frame().is_none());

        device.start_recording().unwrap();
        let first = device.poll_input_frame().unwrap();
        let second = device.poll_input_frame().unwrap();
        assert!(first.samples[0] < second.samples[0]);
        assert_eq!(device.input_remaining(), 1);
    }

    #[test]
    fn test_mock_device_sine() {
        let device = MockDevice::new();
        device.queue_sine(440.0, 10, 160);
        device.start_recording().unwrap();

        let frame = device.poll_input_frame().unwrap();
        assert_eq!(frame.channels, 2);
        assert_eq!(frame.frame_count(), 160);
        assert!(frame.samples.iter().any(|&s| s > 0.0));
        assert!(frame.samples.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_mock_device_records_output() {
        let device = MockDevice::new();
        device.start_playing().unwrap();
        device
            .push_output_frame(AudioFrame::new(vec![0.0; 4], 16000, 2))
            .unwrap();
        assert_eq!(device.output_len(), 1);

        device.stop_playing();
        assert!(device.push_output_frame(AudioFrame::mono(vec![], 16000)).is_err());
    }

    #[test]
    fn test_mock_device_start_failure() {
        let device = MockDevice::new();
        device.fail_on_start();
        let err = device.start_recording().unwrap_err();
        assert_eq!(err.operation, "start_recording");
        assert!(!device.is_recording());
    }

    #[test]
    fn test_mock_device_stop_counts_transitions() {
        let device = MockDevice::new();
        device.start_recording().unwrap();
        device.stop_recording();
        device.stop_recording();
        assert_eq!(device.start_count(), 1);
        assert_eq!(device.stop_count(), 1);
    }
}
