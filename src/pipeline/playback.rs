//! Playback stage - decodes queued responses and plays them on the device.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{RelayQueue, StageContext};
use crate::format::prepare_inbound;
use crate::{AudioDevice, ConversationError, StageId};

pub(crate) async fn run_playback(
    device: Arc<dyn AudioDevice>,
    output: Arc<RelayQueue<Vec<u8>>>,
    ctx: Arc<StageContext>,
    source_rate: u32,
    device_rate: u32,
) -> Result<(), ConversationError> {
    tracing::debug!(source_rate, device_rate, "Playback stage started");

    loop {
        let pcm = output.pop().await;

        let frame = match prepare_inbound(&pcm, source_rate, device_rate) {
            Ok(frame) => frame,
            Err(e) => {
                ctx.state.playback_errors.fetch_add(1, Ordering::Relaxed);
                ctx.frame_dropped(StageId::Playback, &e);
                continue;
            }
        };

        device
            .push_output_frame(frame)
            .map_err(|e| ConversationError::stage_failure(StageId::Playback, e.to_string()))?;
        ctx.state.frames_played.fetch_add(1, Ordering::Relaxed);
    }
}
