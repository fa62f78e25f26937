//! Remote conversational service abstraction.
//!
//! A [`RemoteService`] opens duplex [`RemoteSession`]s. The session is
//! released when the last handle to it is dropped, so every exit path of the
//! pipeline releases it exactly once.

mod mock;

pub use mock::MockRemoteService;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::format::EncodedAudio;
use crate::{RemoteError, SessionConfig};

/// One event from the remote service's response sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseEvent {
    /// Response audio: 16-bit little-endian mono PCM at the remote output rate.
    pub audio: Option<Vec<u8>>,
    /// The service stopped its current answer because the user spoke.
    pub interrupted: bool,
    /// The service finished its turn.
    pub turn_complete: bool,
}

impl ResponseEvent {
    /// An event carrying response audio.
    pub fn with_audio(pcm: Vec<u8>) -> Self {
        Self {
            audio: Some(pcm),
            ..Self::default()
        }
    }

    /// An interruption signal.
    pub fn interruption() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }

    /// An end-of-turn signal.
    pub fn end_of_turn() -> Self {
        Self {
            turn_complete: true,
            ..Self::default()
        }
    }
}

/// A service that can open conversation sessions.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Opens a session bound to `model`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ConnectFailed`] if the session cannot be opened.
    async fn connect(
        &self,
        model: &str,
        config: &SessionConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// An open duplex session.
///
/// Sending and receiving happen concurrently from different tasks, so all
/// methods take `&self`. Dropping the session releases it.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Sends one chunk of realtime input audio.
    ///
    /// # Errors
    ///
    /// Returns an error if the session can no longer send.
    async fn send_realtime_input(&self, input: EncodedAudio) -> Result<(), RemoteError>;

    /// Sends a text message, optionally ending the user's turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the session can no longer send.
    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<(), RemoteError>;

    /// Returns the response events of the next turn.
    ///
    /// The stream ends after the turn's `turn_complete` event; call
    /// `receive()` again for the following turn. An error item means the
    /// session is unusable.
    fn receive(&self) -> BoxStream<'_, Result<ResponseEvent, RemoteError>>;
}
