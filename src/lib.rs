//! # companion-runtime
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time voice conversation and motion scheduling for a desk companion robot.
//!
//! `companion-runtime` streams microphone audio to a live speech model and
//! plays its spoken replies back on the robot, while a separate scheduler
//! runs prioritized motion commands (gestures, emotions, idle behaviors)
//! without ever blocking the audio path.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use companion_runtime::{ConversationConfig, ConversationManager, event_callback};
//!
//! let manager = ConversationManager::with_event_callback(
//!     Arc::new(robot_audio),                       // impl AudioDevice
//!     Arc::new(gemini),                            // impl RemoteService
//!     ConversationConfig::from_env()?,             // GEMINI_API_KEY
//!     event_callback(|e| tracing::info!(?e, "conversation event")),
//! )?;
//!
//! manager.start_conversation();
//! // ... talk ...
//! let stats = manager.stop_conversation().await?;
//! ```
//!
//! ## Architecture
//!
//! A session runs four concurrent stages joined by relay queues:
//!
//! - **Capture**: polls the device, encodes 16 kHz PCM into a bounded queue
//! - **Uplink**: forwards encoded frames to the remote session
//! - **Downlink**: receives response turns, handles interruption
//! - **Playback**: decodes and resamples replies, pushes them to the device
//!
//! The first stage to fail cancels the others; every exit path turns the
//! device off and releases the remote session. Motion commands run on a
//! dedicated thread owned by [`MotionScheduler`].

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod config;
mod conversation;
mod device;
mod error;
mod event;
pub mod format;
mod frame;
mod motion;
pub mod pipeline;
mod remote;
mod session;

pub use config::{
    ConversationConfig, ResponseModality, SchedulerConfig, SessionConfig, API_KEY_ENV,
    DEFAULT_GREETING, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, MODEL_ENV,
};
pub use conversation::ConversationManager;
#[cfg(feature = "local-device")]
pub use device::{LocalAudioDevice, LocalDeviceConfig};
pub use device::{AudioDevice, MockDevice};
pub use error::{
    ActionError, ConfigError, ConversationError, DeviceError, FormatError, MotionError,
    RemoteError, StageId,
};
pub use event::{event_callback, ConversationEvent, EventCallback};
pub use frame::AudioFrame;
pub use motion::{IdleAction, MotionAction, MotionCommand, MotionContext, MotionScheduler, Priority};
pub use pipeline::{AudioPipeline, PipelineState, RelayQueue};
pub use remote::{MockRemoteService, RemoteService, RemoteSession, ResponseEvent};
pub use session::SessionStats;
