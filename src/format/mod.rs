//! Audio format bridge between the device and the remote service.
//!
//! This module provides stateless conversions:
//! - Channel conversion (stereo ↔ mono)
//! - Sample format conversion (f32 ↔ 16-bit PCM bytes)
//! - Sample rate conversion (band-limited resampling)
//! - Composite outbound/inbound transforms used by the pipeline stages

mod bridge;
mod convert;
mod resample;

pub use bridge::{
    prepare_inbound, prepare_outbound, EncodedAudio, OUTBOUND_MIME_TYPE, REMOTE_INPUT_RATE,
    REMOTE_OUTPUT_RATE, SUPPORTED_RATES,
};
pub use convert::{downmix, f32_to_i16, i16_to_f32, narrow, upmix, widen};
pub use resample::{resample, resampled_len};
