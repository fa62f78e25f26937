//! Sample format and channel conversion.

use crate::{AudioFrame, FormatError};

/// Bytes per 16-bit PCM sample.
const BYTES_PER_SAMPLE: usize = 2;

/// Converts one normalized sample to i16.
///
/// The input is clamped to `[-1.0, 1.0]` before scaling, so the result is
/// always in `[-32767, 32767]`.
///
/// Uses × 32767 (not 32768) for symmetric scaling. This means -1.0 maps
/// to -32767 rather than -32768, losing 1 LSB at the negative extreme.
/// Scaled values are rounded to the nearest step.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Converts one i16 sample to a normalized f32.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Converts a stereo frame to mono by averaging each left/right pair.
///
/// # Errors
///
/// - [`FormatError::Shape`] unless the frame has exactly 2 channels
/// - [`FormatError::Unaligned`] if the last left/right pair is incomplete
pub fn downmix(frame: &AudioFrame) -> Result<AudioFrame, FormatError> {
    if frame.channels != 2 {
        return Err(FormatError::Shape {
            expected: 2,
            actual: frame.channels,
        });
    }
    if frame.samples.len() % 2 != 0 {
        return Err(FormatError::Unaligned {
            len: frame.samples.len(),
            channels: 2,
        });
    }

    let mono = frame
        .samples
        .chunks_exact(2)
        .map(|pair| (pair[0] + pair[1]) * 0.5)
        .collect();

    Ok(AudioFrame::mono(mono, frame.sample_rate))
}

/// Converts a mono frame to stereo by duplicating each sample into both channels.
///
/// # Errors
///
/// Returns [`FormatError::Shape`] unless the frame has exactly 1 channel.
pub fn upmix(frame: &AudioFrame) -> Result<AudioFrame, FormatError> {
    if frame.channels != 1 {
        return Err(FormatError::Shape {
            expected: 1,
            actual: frame.channels,
        });
    }

    let stereo = frame.samples.iter().flat_map(|&s| [s, s]).collect();
    Ok(AudioFrame::new(stereo, frame.sample_rate, 2))
}

/// Narrows normalized samples to 16-bit little-endian PCM bytes.
///
/// Output length is always `2 × samples.len()`.
pub fn narrow(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Widens 16-bit little-endian PCM bytes into an interleaved frame.
///
/// # Errors
///
/// Returns [`FormatError::Format`] if the byte length is not a multiple of
/// `2 × channels`, and [`FormatError::Shape`] if `channels` is zero.
pub fn widen(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<AudioFrame, FormatError> {
    if channels == 0 {
        return Err(FormatError::Shape {
            expected: 1,
            actual: 0,
        });
    }

    let frame_bytes = BYTES_PER_SAMPLE * channels as usize;
    if bytes.len() % frame_bytes != 0 {
        return Err(FormatError::Format {
            len: bytes.len(),
            frame_bytes,
        });
    }

    let samples = bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect();

    Ok(AudioFrame::new(samples, sample_rate, channels))
}
