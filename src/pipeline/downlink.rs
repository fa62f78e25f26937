//! Downlink stage - receives remote responses into the output relay queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::StreamExt;

use super::{RelayQueue, StageContext};
use crate::{
    ConversationError, ConversationEvent, RemoteError, RemoteSession, ResponseEvent, StageId,
};

/// Iterates the session's response turns until it fails or is cancelled.
///
/// An interruption empties the output queue so nothing stale is played
/// after it. A turn that ends without a single event means the session is
/// gone and is reported as [`RemoteError::Closed`].
pub(crate) async fn run_downlink(
    session: Arc<dyn RemoteSession>,
    output: Arc<RelayQueue<Vec<u8>>>,
    ctx: Arc<StageContext>,
) -> Result<(), ConversationError> {
    tracing::debug!("Downlink stage started");

    loop {
        let mut turn = session.receive();
        let mut events = 0usize;

        while let Some(item) = turn.next().await {
            let event = item
                .map_err(|e| ConversationError::stage_failure(StageId::Downlink, e.to_string()))?;
            handle_event(event, &output, &ctx);
            events += 1;
        }

        if events == 0 {
            return Err(ConversationError::stage_failure(
                StageId::Downlink,
                RemoteError::Closed.to_string(),
            ));
        }
    }
}

fn handle_event(event: ResponseEvent, output: &RelayQueue<Vec<u8>>, ctx: &StageContext) {
    if let Some(audio) = event.audio {
        if output.try_push(audio).is_ok() {
            ctx.state.frames_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    if event.interrupted {
        let discarded = output.clear();
        ctx.state.interruptions.fetch_add(1, Ordering::Relaxed);
        tracing::info!(discarded, "Response interrupted, output queue cleared");
        ctx.emit(ConversationEvent::Interrupted { discarded });
    }

    if event.turn_complete {
        ctx.state.turns_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Response turn complete");
        ctx.emit(ConversationEvent::TurnComplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EncodedAudio;
    use crate::session::SessionState;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};

    /// A session whose turns are always empty.
    struct SilentSession;

    #[async_trait]
    impl RemoteSession for SilentSession {
        async fn send_realtime_input(&self, _input: EncodedAudio) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn send_text(&self, _text: &str, _end_of_turn: bool) -> Result<(), RemoteError> {
            Ok(())
        }

        fn receive(&self) -> BoxStream<'_, Result<ResponseEvent, RemoteError>> {
            stream::empty().boxed()
        }
    }

    fn context() -> StageContext {
        StageContext::new(Arc::new(SessionState::new()), None)
    }

    #[test]
    fn test_audio_is_queued_and_counted() {
        let ctx = context();
        let output = RelayQueue::unbounded();

        handle_event(ResponseEvent::with_audio(vec![1, 2]), &output, &ctx);
        handle_event(ResponseEvent::with_audio(vec![3, 4]), &output, &ctx);

        assert_eq!(output.len(), 2);
        assert_eq!(ctx.state.snapshot().frames_received, 2);
    }

    #[test]
    fn test_interruption_clears_queue_once() {
        let ctx = context();
        let output = RelayQueue::unbounded();
        for i in 0..3u8 {
            handle_event(ResponseEvent::with_audio(vec![i, 0]), &output, &ctx);
        }

        handle_event(ResponseEvent::interruption(), &output, &ctx);

        assert!(output.is_empty());
        assert_eq!(ctx.state.snapshot().interruptions, 1);
    }

    #[test]
    fn test_interruption_with_audio_discards_it() {
        let ctx = context();
        let output = RelayQueue::unbounded();
        let event = ResponseEvent {
            audio: Some(vec![0, 0]),
            interrupted: true,
            turn_complete: false,
        };

        handle_event(event, &output, &ctx);

        assert!(output.is_empty());
        assert_eq!(ctx.state.snapshot().interruptions, 1);
    }

    #[test]
    fn test_turn_complete_leaves_queue() {
        let ctx = context();
        let output = RelayQueue::unbounded();
        handle_event(ResponseEvent::with_audio(vec![0, 0]), &output, &ctx);
        handle_event(ResponseEvent::end_of_turn(), &output, &ctx);

        assert_eq!(output.len(), 1);
        assert_eq!(ctx.state.snapshot().turns_completed, 1);
    }

    #[tokio::test]
    async fn test_empty_turn_ends_downlink() {
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            run_downlink(
                Arc::new(SilentSession),
                Arc::new(RelayQueue::unbounded()),
                Arc::new(context()),
            ),
        )
        .await
        .unwrap();

        assert!(matches!(
            result,
            Err(ConversationError::StageFailure {
                stage: StageId::Downlink,
                ..
            })
        ));
    }
}
