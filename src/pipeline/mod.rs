//! Duplex audio pipeline.
//!
//! Four stages share one remote session and talk through two relay queues:
//!
//! ```text
//! Device → Capture → [input queue, bounded] → Uplink → Remote session
//! Remote session → Downlink → [output queue, unbounded] → Playback → Device
//! ```
//!
//! - **Input queue**: small and bounded; a full queue suspends capture, which
//!   bounds end-to-end latency without dropping audio
//! - **Output queue**: unbounded; emptied when the remote service signals an
//!   interruption so no stale audio is played
//! - **Supervisor**: runs the stages as one task group and cancels them all
//!   on stop, duration timeout, or the first stage failure

mod capture;
mod downlink;
mod playback;
mod relay;
mod supervisor;
mod uplink;

pub use relay::RelayQueue;
pub use supervisor::{AudioPipeline, PipelineState};

use std::sync::Arc;

use crate::session::SessionState;
use crate::{ConversationEvent, EventCallback, FormatError, StageId};

/// State shared by the stages of one session.
pub(crate) struct StageContext {
    pub state: Arc<SessionState>,
    events: Option<EventCallback>,
}

impl StageContext {
    pub fn new(state: Arc<SessionState>, events: Option<EventCallback>) -> Self {
        Self { state, events }
    }

    /// Sends an event to the callback if configured.
    pub fn emit(&self, event: ConversationEvent) {
        if let Some(ref callback) = self.events {
            callback(event);
        }
    }

    /// Reports a malformed frame that the stage skipped.
    pub fn frame_dropped(&self, stage: StageId, error: &FormatError) {
        tracing::warn!(%stage, error = %error, "Skipping malformed frame");
        self.emit(ConversationEvent::FrameDropped {
            stage,
            error: error.to_string(),
        });
    }
}
