//! Composite transforms between the device and the remote service.
//!
//! The device speaks normalized `f32` frames (stereo on the robot); the remote
//! service takes 16 kHz mono 16-bit PCM and answers with 24 kHz mono 16-bit
//! PCM.

use super::convert::{downmix, narrow, upmix, widen};
use super::resample::resample;
use crate::{AudioFrame, FormatError};

/// Sample rate the remote service expects for input audio.
pub const REMOTE_INPUT_RATE: u32 = 16000;

/// Sample rate of audio returned by the remote service.
pub const REMOTE_OUTPUT_RATE: u32 = 24000;

/// MIME tag attached to outbound audio.
pub const OUTBOUND_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Rates the inbound transform accepts, as source or device rate.
pub const SUPPORTED_RATES: [u32; 3] = [16000, 24000, 48000];

/// Encoded audio ready to send to the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    /// 16-bit little-endian PCM bytes.
    pub data: Vec<u8>,
    /// MIME tag describing `data`.
    pub mime_type: &'static str,
}

impl EncodedAudio {
    /// Returns the number of 16-bit samples in this payload.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Prepares a stereo device frame for the remote service.
///
/// Down-mixes to mono, then narrows to 16-bit PCM.
///
/// # Errors
///
/// Returns [`FormatError::Shape`] if the frame is not stereo.
pub fn prepare_outbound(frame: &AudioFrame) -> Result<EncodedAudio, FormatError> {
    let mono = downmix(frame)?;
    Ok(EncodedAudio {
        data: narrow(&mono.samples),
        mime_type: OUTBOUND_MIME_TYPE,
    })
}

/// Prepares a remote mono PCM payload for device playback.
///
/// Widens to `f32`, resamples when `source_rate` differs from `device_rate`,
/// then up-mixes to stereo.
///
/// # Errors
///
/// - [`FormatError::UnsupportedRate`] if either rate is not in [`SUPPORTED_RATES`]
/// - [`FormatError::Format`] if the payload has an odd byte length
pub fn prepare_inbound(
    pcm: &[u8],
    source_rate: u32,
    device_rate: u32,
) -> Result<AudioFrame, FormatError> {
    check_rate(source_rate)?;
    check_rate(device_rate)?;

    let mut mono = widen(pcm, source_rate, 1)?;
    if source_rate != device_rate {
        mono = AudioFrame::mono(
            resample(&mono.samples, source_rate, device_rate)?,
            device_rate,
        );
    }

    upmix(&mono)
}

fn check_rate(rate: u32) -> Result<(), FormatError> {
    if SUPPORTED_RATES.contains(&rate) {
        Ok(())
    } else {
        Err(FormatError::UnsupportedRate { rate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::narrow;

    #[test]
    fn test_prepare_outbound() {
        let frame = AudioFrame::new(vec![0.1; 3200], 16000, 2);
        let encoded = prepare_outbound(&frame).unwrap();

        assert_eq!(encoded.mime_type, "audio/pcm;rate=16000");
        assert_eq!(encoded.data.len(), 3200); // 1600 mono samples × 2 bytes
        assert_eq!(encoded.sample_count(), 1600);
    }

    #[test]
    fn test_prepare_outbound_rejects_mono() {
        let frame = AudioFrame::mono(vec![0.1; 160], 16000);
        assert!(matches!(
            prepare_outbound(&frame),
            Err(FormatError::Shape { expected: 2, .. })
        ));
    }

    #[test]
    fn test_prepare_inbound_resamples_and_upmixes() {
        let pcm = narrow(&vec![0.25; 2400]); // 100ms at 24kHz
        let frame = prepare_inbound(&pcm, 24000, 16000).unwrap();

        assert_eq!(frame.channels, 2);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.frame_count(), 1600);
    }

    #[test]
    fn test_prepare_inbound_same_rate() {
        let pcm = narrow(&[0.5, -0.5, 0.0]);
        let frame = prepare_inbound(&pcm, 16000, 16000).unwrap();

        assert_eq!(frame.frame_count(), 3);
        assert_eq!(frame.channel(0), frame.channel(1));
    }

    #[test]
    fn test_prepare_inbound_rejects_undeclared_rate() {
        let pcm = narrow(&[0.0; 10]);
        assert_eq!(
            prepare_inbound(&pcm, 22050, 16000),
            Err(FormatError::UnsupportedRate { rate: 22050 })
        );
        assert_eq!(
            prepare_inbound(&pcm, 24000, 44100),
            Err(FormatError::UnsupportedRate { rate: 44100 })
        );
    }

    #[test]
    fn test_prepare_inbound_rejects_odd_bytes() {
        assert!(matches!(
            prepare_inbound(&[1, 2, 3], 24000, 16000),
            Err(FormatError::Format { .. })
        ));
    }
}
