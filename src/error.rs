//! Error types for companion-runtime.
//!
//! Errors are split by where they are contained:
//! - **Session errors** ([`ConversationError`]): abort one conversation session,
//!   never the process
//! - **Per-frame errors** ([`FormatError`]): returned by the format bridge; the
//!   pipeline stages report and skip the offending frame
//! - **Per-command errors** ([`ActionError`]): logged by the motion scheduler,
//!   which moves on to the next command

use std::fmt;

/// Malformed audio buffers and undeclared sample rates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The buffer does not have the channel layout the conversion requires.
    #[error("expected {expected}-channel audio, got {actual} channels")]
    Shape {
        /// Channel count the conversion accepts.
        expected: u16,
        /// Channel count that was supplied.
        actual: u16,
    },

    /// The byte buffer cannot be split into whole 16-bit frames.
    #[error("PCM buffer of {len} bytes is not a multiple of {frame_bytes} bytes")]
    Format {
        /// Length of the supplied buffer in bytes.
        len: usize,
        /// Bytes per interleaved frame (2 × channels).
        frame_bytes: usize,
    },

    /// The interleaved buffer ends with a partial frame.
    #[error("{len} interleaved samples do not divide into {channels}-channel frames")]
    Unaligned {
        /// Number of samples in the buffer.
        len: usize,
        /// Channel count of the frame.
        channels: u16,
    },

    /// The sample rate is not one the bridge declares support for.
    #[error("unsupported sample rate: {rate}Hz")]
    UnsupportedRate {
        /// The rejected rate.
        rate: u32,
    },
}

/// Invalid configuration, detected when the configuration is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is missing or empty.
    #[error("{name} is not set (export it or pass it explicitly)")]
    Missing {
        /// Name of the setting.
        name: &'static str,
    },

    /// A setting has a value outside its valid range.
    #[error("invalid {name}: {reason}")]
    Invalid {
        /// Name of the setting.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error for the given setting.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a remote conversational service implementation.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The connection could not be established.
    #[error("connect failed: {reason}")]
    ConnectFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The session was closed by the remote end.
    #[error("session closed")]
    Closed,

    /// Sending or receiving failed on an open session.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a connect error with the given reason.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }
}

/// Errors raised by an [`AudioDevice`](crate::AudioDevice) implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation} failed: {reason}")]
pub struct DeviceError {
    /// The device operation that failed (`start_recording`, ...).
    pub operation: &'static str,
    /// Description of the failure.
    pub reason: String,
}

impl DeviceError {
    /// Creates a device error for the given operation.
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Identity of a pipeline stage, carried by stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    /// Device → input relay queue.
    Capture,
    /// Input relay queue → remote session.
    Uplink,
    /// Remote session → output relay queue.
    Downlink,
    /// Output relay queue → device.
    Playback,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Capture => "capture",
            Self::Uplink => "uplink",
            Self::Downlink => "downlink",
            Self::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// Errors that end (or prevent) a conversation session.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// The device could not start recording or playing.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The remote session could not be opened.
    #[error("remote connect failed: {0}")]
    Connect(#[source] RemoteError),

    /// A pipeline stage failed while running; the whole session was cancelled.
    #[error("{stage} stage failed: {reason}")]
    StageFailure {
        /// Stage that failed first.
        stage: StageId,
        /// Description of the failure.
        reason: String,
    },

    /// A graceful stop did not finish in time and the session was aborted.
    #[error("conversation did not stop within {timeout_ms}ms, cancelled")]
    GracefulStopTimeout {
        /// The graceful-stop bound in milliseconds.
        timeout_ms: u64,
    },

    /// The conversation task ended abnormally (panicked).
    #[error("conversation task failed: {0}")]
    TaskFailed(String),

    /// No tokio runtime was available to host the session.
    #[error("no tokio runtime available (construct inside a runtime context)")]
    NoRuntime,
}

impl ConversationError {
    /// Creates a stage failure for the given stage.
    pub fn stage_failure(stage: StageId, reason: impl Into<String>) -> Self {
        Self::StageFailure {
            stage,
            reason: reason.into(),
        }
    }
}

/// Failure of a single motion action.
///
/// Action failures are contained: the scheduler logs them and continues with
/// the next command.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The device rejected or failed the motion.
    #[error("motion failed: {0}")]
    Motion(String),

    /// The action stopped early because interruption was requested.
    #[error("interrupted")]
    Interrupted,

    /// Custom error for user-supplied actions.
    #[error("{0}")]
    Custom(String),
}

impl ActionError {
    /// Creates a custom action error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a motion failure with the given message.
    pub fn motion(msg: impl Into<String>) -> Self {
        Self::Motion(msg.into())
    }
}

/// Errors reported by the motion scheduler itself.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn motion worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker did not exit within the stop bound; it finishes its
    /// current command in the background.
    #[error("motion worker did not stop within {timeout_ms}ms")]
    StopTimeout {
        /// The stop bound in milliseconds.
        timeout_ms: u64,
    },

    /// A previously stopped worker is still running its last command.
    #[error("previous motion worker has not exited yet")]
    StillStopping,
}
