//! Uplink stage - forwards queued input audio to the remote session.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::{RelayQueue, StageContext};
use crate::format::EncodedAudio;
use crate::{ConversationError, RemoteSession, StageId};

/// Frames between progress log lines.
const PROGRESS_INTERVAL: u64 = 500;

pub(crate) async fn run_uplink(
    session: Arc<dyn RemoteSession>,
    input: Arc<RelayQueue<EncodedAudio>>,
    ctx: Arc<StageContext>,
) -> Result<(), ConversationError> {
    tracing::debug!("Uplink stage started");

    loop {
        let encoded = input.pop().await;
        session
            .send_realtime_input(encoded)
            .await
            .map_err(|e| ConversationError::stage_failure(StageId::Uplink, e.to_string()))?;

        let sent = ctx.state.frames_sent.fetch_add(1, Ordering::Relaxed) + 1;
        if sent % PROGRESS_INTERVAL == 0 {
            tracing::info!(frames_sent = sent, "Uplink progress");
        }
    }
}
