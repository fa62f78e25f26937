//! Audio device abstraction.
//!
//! The pipeline only needs non-blocking frame polling, frame submission, and
//! recording/playback switches. The robot's media driver, a workstation
//! sound card (feature `local-device`), or [`MockDevice`] can stand behind it.

#[cfg(feature = "local-device")]
mod local;
mod mock;

#[cfg(feature = "local-device")]
pub use local::{LocalAudioDevice, LocalDeviceConfig};
pub use mock::MockDevice;

use crate::{AudioFrame, DeviceError};

/// Audio surface of the physical device.
///
/// Implementations must be safe to call from several threads: capture and
/// playback run as separate tasks and the motion scheduler may drive the
/// same device from its own thread. Methods must not block for long; a
/// device with blocking primitives should buffer internally.
pub trait AudioDevice: Send + Sync {
    /// Returns the next captured frame, or `None` if none is ready yet.
    fn poll_input_frame(&self) -> Option<AudioFrame>;

    /// Submits a frame for playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the device can no longer play audio.
    fn push_output_frame(&self, frame: AudioFrame) -> Result<(), DeviceError>;

    /// Starts capturing audio.
    ///
    /// # Errors
    ///
    /// Returns an error if capture cannot start.
    fn start_recording(&self) -> Result<(), DeviceError>;

    /// Stops capturing audio. Calling it while stopped does nothing.
    fn stop_recording(&self);

    /// Starts audio output.
    ///
    /// # Errors
    ///
    /// Returns an error if output cannot start.
    fn start_playing(&self) -> Result<(), DeviceError>;

    /// Stops audio output. Calling it while stopped does nothing.
    fn stop_playing(&self);
}
