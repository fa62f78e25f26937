//! Runtime events for monitoring a conversation.
//!
//! Events are notifications, not control flow. Per-frame problems are
//! reported here and the session keeps running; session-ending problems are
//! reported here and also returned as a [`ConversationError`](crate::ConversationError).

use std::sync::Arc;

use crate::{SessionStats, StageId};

/// Runtime events emitted during a conversation session.
///
/// # Example
///
/// ```
/// use companion_runtime::ConversationEvent;
///
/// fn handle_event(event: ConversationEvent) {
///     match event {
///         ConversationEvent::Connected { model } => eprintln!("connected to {model}"),
///         ConversationEvent::TurnComplete => eprintln!("turn complete"),
///         ConversationEvent::Interrupted { discarded } => {
///             eprintln!("interrupted, discarded {discarded} queued frames");
///         }
///         ConversationEvent::FrameDropped { stage, error } => {
///             eprintln!("{stage} skipped a frame: {error}");
///         }
///         ConversationEvent::StageFailed { stage, error } => {
///             eprintln!("{stage} failed: {error}");
///         }
///         ConversationEvent::SessionEnded { stats } => {
///             eprintln!("session ended after {:?}", stats.duration);
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// The remote session opened.
    Connected {
        /// Model the session is bound to.
        model: String,
    },

    /// The remote service finished a turn.
    TurnComplete,

    /// The remote service signalled an interruption; queued output was dropped.
    Interrupted {
        /// Frames removed from the output queue.
        discarded: usize,
    },

    /// A malformed frame was skipped.
    ///
    /// The session keeps running.
    FrameDropped {
        /// Stage that skipped the frame.
        stage: StageId,
        /// Description of the problem.
        error: String,
    },

    /// A stage failed and the session is being cancelled.
    StageFailed {
        /// Stage that failed.
        stage: StageId,
        /// Description of the failure.
        error: String,
    },

    /// The session stopped and released its resources.
    SessionEnded {
        /// Final statistics.
        stats: SessionStats,
    },
}

/// Callback type for receiving runtime events.
///
/// Callbacks run on the pipeline's tasks and should return quickly.
pub type EventCallback = Arc<dyn Fn(ConversationEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use companion_runtime::event_callback;
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(ConversationEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
