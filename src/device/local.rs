//! Workstation audio device built on CPAL.
//!
//! CPAL streams cannot move between threads on every platform, so both
//! streams live on a dedicated owner thread. Audio crosses to the pipeline
//! through lock-free ring buffers; recording and playback switches are sent to
//! the owner thread as control messages.

use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig as CpalStreamConfig};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::AudioDevice;
use crate::format::downmix;
use crate::{AudioFrame, DeviceError};

/// Configuration for [`LocalAudioDevice`].
#[derive(Debug, Clone)]
pub struct LocalDeviceConfig {
    /// Capture and playback sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per channel in each polled input frame.
    pub frame_len: usize,
    /// Ring buffer capacity per direction, in seconds of audio.
    pub buffer_secs: u32,
}

impl Default for LocalDeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            // 20ms at 16kHz
            frame_len: 320,
            buffer_secs: 10,
        }
    }
}

enum Control {
    Record(bool, Sender<Result<(), DeviceError>>),
    Play(bool, Sender<Result<(), DeviceError>>),
    Shutdown,
}

/// An [`AudioDevice`] backed by the default input and output devices.
///
/// # Example
///
/// ```no_run
/// use companion_runtime::{LocalAudioDevice, LocalDeviceConfig};
///
/// let device = LocalAudioDevice::open(LocalDeviceConfig::default())?;
/// # Ok::<(), companion_runtime::DeviceError>(())
/// ```
pub struct LocalAudioDevice {
    config: LocalDeviceConfig,
    input_channels: u16,
    output_channels: u16,
    input: Mutex<HeapCons<f32>>,
    output: Mutex<HeapProd<f32>>,
    control: Sender<Control>,
    owner: Mutex<Option<JoinHandle<()>>>,
}

impl LocalAudioDevice {
    /// Opens the default input and output devices at the configured rate.
    ///
    /// Both streams start paused.
    ///
    /// # Errors
    ///
    /// Returns an error if either device is missing or cannot run at the
    /// configured rate with `f32` samples.
    pub fn open(config: LocalDeviceConfig) -> Result<Self, DeviceError> {
        let capacity = (config.sample_rate * config.buffer_secs) as usize * 2;
        let (input_prod, input_cons) = HeapRb::<f32>::new(capacity).split();
        let (output_prod, output_cons) = HeapRb::<f32>::new(capacity).split();

        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let sample_rate = config.sample_rate;

        let owner = std::thread::Builder::new()
            .name("companion-audio-device".to_string())
            .spawn(move || {
                match build_streams(sample_rate, input_prod, output_cons) {
                    Ok((input, output, channels)) => {
                        let _ = ready_tx.send(Ok(channels));
                        run_owner(&input, &output, &control_rx);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| DeviceError::new("open", e.to_string()))?;

        let (input_channels, output_channels) = ready_rx
            .recv()
            .map_err(|_| DeviceError::new("open", "device thread exited"))??;

        tracing::info!(
            sample_rate,
            input_channels,
            output_channels,
            "Local audio device opened"
        );

        Ok(Self {
            config,
            input_channels,
            output_channels,
            input: Mutex::new(input_cons),
            output: Mutex::new(output_prod),
            control: control_tx,
            owner: Mutex::new(Some(owner)),
        })
    }

    /// Returns the device configuration.
    pub fn config(&self) -> &LocalDeviceConfig {
        &self.config
    }

    fn request(
        &self,
        operation: &'static str,
        make: impl FnOnce(Sender<Result<(), DeviceError>>) -> Control,
    ) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control
            .send(make(reply_tx))
            .map_err(|_| DeviceError::new(operation, "device thread exited"))?;
        reply_rx
            .recv()
            .map_err(|_| DeviceError::new(operation, "device thread exited"))?
    }
}

impl AudioDevice for LocalAudioDevice {
    fn poll_input_frame(&self) -> Option<AudioFrame> {
        let needed = self.config.frame_len * self.input_channels as usize;
        let mut input = self.input.lock();
        if input.occupied_len() < needed {
            return None;
        }

        let mut samples = vec![0.0; needed];
        let read = input.pop_slice(&mut samples);
        samples.truncate(read);
        Some(AudioFrame::new(
            samples,
            self.config.sample_rate,
            self.input_channels,
        ))
    }

    fn push_output_frame(&self, frame: AudioFrame) -> Result<(), DeviceError> {
        let samples = match (frame.channels, self.output_channels) {
            (a, b) if a == b => frame.samples,
            (2, 1) => {
                downmix(&frame)
                    .map_err(|e| DeviceError::new("push_output_frame", e.to_string()))?
                    .samples
            }
            (a, b) => {
                return Err(DeviceError::new(
                    "push_output_frame",
                    format!("cannot play {a}-channel audio on a {b}-channel device"),
                ));
            }
        };

        let written = self.output.lock().push_slice(&samples);
        if written < samples.len() {
            tracing::warn!(
                dropped = samples.len() - written,
                "Output buffer full, dropping samples"
            );
        }
        Ok(())
    }

    fn start_recording(&self) -> Result<(), DeviceError> {
        self.request("start_recording", |reply| Control::Record(true, reply))
    }

    fn stop_recording(&self) {
        if let Err(e) = self.request("stop_recording", |reply| Control::Record(false, reply)) {
            tracing::warn!(error = %e, "Failed to stop recording");
        }
    }

    fn start_playing(&self) -> Result<(), DeviceError> {
        self.request("start_playing", |reply| Control::Play(true, reply))
    }

    fn stop_playing(&self) {
        if let Err(e) = self.request("stop_playing", |reply| Control::Play(false, reply)) {
            tracing::warn!(error = %e, "Failed to stop playback");
        }
    }
}

impl Drop for LocalAudioDevice {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(owner) = self.owner.lock().take() {
            let _ = owner.join();
        }
    }
}

fn run_owner(input: &Stream, output: &Stream, control: &Receiver<Control>) {
    while let Ok(message) = control.recv() {
        match message {
            Control::Record(on, reply) => {
                let _ = reply.send(switch(input, on, "recording"));
            }
            Control::Play(on, reply) => {
                let _ = reply.send(switch(output, on, "playing"));
            }
            Control::Shutdown => break,
        }
    }
    tracing::debug!("Local audio device thread exiting");
}

fn switch(stream: &Stream, on: bool, what: &'static str) -> Result<(), DeviceError> {
    let result = if on { stream.play() } else { stream.pause() };
    result.map_err(|e| DeviceError::new(what, e.to_string()))
}

fn build_streams(
    sample_rate: u32,
    mut input_prod: HeapProd<f32>,
    mut output_cons: HeapCons<f32>,
) -> Result<(Stream, Stream, (u16, u16)), DeviceError> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or_else(|| DeviceError::new("open", "no default input device"))?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| DeviceError::new("open", "no default output device"))?;

    let input_config = pick_config(&input_device, sample_rate, true)?;
    let output_config = pick_config(&output_device, sample_rate, false)?;
    let channels = (input_config.channels, output_config.channels);

    let input = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Non-blocking push - drops samples if the pipeline falls behind
                let _ = input_prod.push_slice(data);
            },
            |err| {
                tracing::error!("Audio input stream error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError::new("open", e.to_string()))?;

    let output = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let read = output_cons.pop_slice(data);
                data[read..].fill(0.0);
            },
            |err| {
                tracing::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError::new("open", e.to_string()))?;

    // Some backends start streams on build
    let _ = input.pause();
    let _ = output.pause();

    Ok((input, output, channels))
}

fn pick_config(
    device: &Device,
    sample_rate: u32,
    input: bool,
) -> Result<CpalStreamConfig, DeviceError> {
    let ranges: Vec<_> = if input {
        device
            .supported_input_configs()
            .map_err(|e| DeviceError::new("open", e.to_string()))?
            .collect()
    } else {
        device
            .supported_output_configs()
            .map_err(|e| DeviceError::new("open", e.to_string()))?
            .collect()
    };

    ranges
        .into_iter()
        .filter(|range| range.sample_format() == SampleFormat::F32)
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
        })
        .min_by_key(|range| range.channels().abs_diff(2))
        .map(|range| range.with_sample_rate(SampleRate(sample_rate)).config())
        .ok_or_else(|| {
            DeviceError::new(
                "open",
                format!("device does not support f32 audio at {sample_rate}Hz"),
            )
        })
}
