//! Capture stage - polls the device and feeds the input relay queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use super::{RelayQueue, StageContext};
use crate::format::{prepare_outbound, upmix, EncodedAudio, REMOTE_INPUT_RATE};
use crate::{AudioDevice, AudioFrame, ConversationError, FormatError, StageId};

/// Reads device frames, encodes them for the remote service, and queues them.
///
/// Suspends while the input queue is full; frames are never dropped for lack
/// of space. Malformed frames are counted, reported, and skipped.
pub(crate) async fn run_capture(
    device: Arc<dyn AudioDevice>,
    input: Arc<RelayQueue<EncodedAudio>>,
    ctx: Arc<StageContext>,
    poll_interval: Duration,
) -> Result<(), ConversationError> {
    tracing::debug!("Capture stage started");

    loop {
        let Some(frame) = device.poll_input_frame() else {
            tokio::time::sleep(poll_interval).await;
            continue;
        };
        ctx.state.frames_captured.fetch_add(1, Ordering::Relaxed);

        match encode(&frame) {
            Ok(encoded) => input.push(encoded).await,
            Err(e) => {
                ctx.state.capture_errors.fetch_add(1, Ordering::Relaxed);
                ctx.frame_dropped(StageId::Capture, &e);
            }
        }
    }
}

/// Normalizes a device frame to stereo and applies the outbound transform.
fn encode(frame: &AudioFrame) -> Result<EncodedAudio, FormatError> {
    if frame.sample_rate != REMOTE_INPUT_RATE {
        return Err(FormatError::UnsupportedRate {
            rate: frame.sample_rate,
        });
    }
    if frame.channels == 1 {
        prepare_outbound(&upmix(frame)?)
    } else {
        prepare_outbound(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_stereo() {
        let frame = AudioFrame::new(vec![0.25; 320], 16000, 2);
        let encoded = encode(&frame).unwrap();
        assert_eq!(encoded.sample_count(), 160);
    }

    #[test]
    fn test_encode_upmixes_mono() {
        let frame = AudioFrame::mono(vec![0.25; 160], 16000);
        let encoded = encode(&frame).unwrap();
        assert_eq!(encoded.sample_count(), 160);
    }

    #[test]
    fn test_encode_rejects_other_rates() {
        let frame = AudioFrame::new(vec![0.0; 960], 48000, 2);
        assert_eq!(
            encode(&frame),
            Err(FormatError::UnsupportedRate { rate: 48000 })
        );
    }

    #[test]
    fn test_encode_rejects_surround() {
        let frame = AudioFrame::new(vec![0.0; 600], 16000, 6);
        assert!(matches!(encode(&frame), Err(FormatError::Shape { .. })));
    }
}
