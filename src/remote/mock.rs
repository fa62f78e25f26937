//! Scripted remote service for testing without a network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{RemoteService, RemoteSession, ResponseEvent};
use crate::format::EncodedAudio;
use crate::{RemoteError, SessionConfig};

type Scripted = Result<ResponseEvent, RemoteError>;

struct MockShared {
    events_tx: Mutex<Option<mpsc::UnboundedSender<Scripted>>>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Scripted>>,
    inputs: Mutex<Vec<EncodedAudio>>,
    texts: Mutex<Vec<(String, bool)>>,
    connect_error: Mutex<Option<String>>,
    last_connect: Mutex<Option<(String, SessionConfig)>>,
    hang_on_connect: AtomicBool,
    fail_sends: AtomicBool,
    send_delay: Mutex<Duration>,
    connects: AtomicUsize,
    releases: AtomicUsize,
}

/// A remote service whose responses are scripted by the test.
///
/// Events pushed with [`push_event()`](Self::push_event) are delivered to
/// whichever session is receiving, in order; each `receive()` stream ends
/// after a `turn_complete` event. Everything sent to the service is recorded.
///
/// # Example
///
/// ```
/// use companion_runtime::{MockRemoteService, ResponseEvent};
///
/// let remote = MockRemoteService::new();
/// remote.push_event(ResponseEvent::with_audio(vec![0; 4800]));
/// remote.push_event(ResponseEvent::end_of_turn());
/// assert_eq!(remote.connect_count(), 0);
/// ```
pub struct MockRemoteService {
    shared: Arc<MockShared>,
}

impl MockRemoteService {
    /// Creates a service with an empty script.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(MockShared {
                events_tx: Mutex::new(Some(tx)),
                events_rx: tokio::sync::Mutex::new(rx),
                inputs: Mutex::new(Vec::new()),
                texts: Mutex::new(Vec::new()),
                connect_error: Mutex::new(None),
                last_connect: Mutex::new(None),
                hang_on_connect: AtomicBool::new(false),
                fail_sends: AtomicBool::new(false),
                send_delay: Mutex::new(Duration::ZERO),
                connects: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
            }),
        }
    }

    /// Appends a response event to the script.
    pub fn push_event(&self, event: ResponseEvent) {
        self.push(Ok(event));
    }

    /// Appends a receive error to the script.
    pub fn push_error(&self, error: RemoteError) {
        self.push(Err(error));
    }

    fn push(&self, item: Scripted) {
        if let Some(tx) = self.shared.events_tx.lock().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// Ends the script; receivers get [`RemoteError::Closed`] once it drains.
    pub fn close(&self) {
        self.shared.events_tx.lock().take();
    }

    /// Makes every later `connect` fail with the given reason.
    pub fn fail_connect(&self, reason: impl Into<String>) {
        *self.shared.connect_error.lock() = Some(reason.into());
    }

    /// Makes every later `connect` wait forever.
    pub fn hang_on_connect(&self) {
        self.shared.hang_on_connect.store(true, Ordering::SeqCst);
    }

    /// Makes every later send fail with a transport error.
    pub fn fail_sends(&self) {
        self.shared.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Delays every realtime input send, simulating a slow link.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.shared.send_delay.lock() = delay;
    }

    /// Returns every realtime input sent so far.
    pub fn sent_inputs(&self) -> Vec<EncodedAudio> {
        self.shared.inputs.lock().clone()
    }

    /// Returns every text message sent so far, with its end-of-turn flag.
    pub fn sent_texts(&self) -> Vec<(String, bool)> {
        self.shared.texts.lock().clone()
    }

    /// Returns the model and session configuration of the last connect.
    pub fn last_connect(&self) -> Option<(String, SessionConfig)> {
        self.shared.last_connect.lock().clone()
    }

    /// Number of sessions opened.
    pub fn connect_count(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Number of sessions released.
    pub fn release_count(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }
}

impl Default for MockRemoteService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteService for MockRemoteService {
    async fn connect(
        &self,
        model: &str,
        config: &SessionConfig,
    ) -> Result<Box<dyn RemoteSession>, RemoteError> {
        *self.shared.last_connect.lock() = Some((model.to_string(), config.clone()));

        if self.shared.hang_on_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = self.shared.connect_error.lock().clone() {
            return Err(RemoteError::connect_failed(reason));
        }

        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockSession {
    shared: Arc<MockShared>,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn send_realtime_input(&self, input: EncodedAudio) -> Result<(), RemoteError> {
        let delay = *self.shared.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("mock send failure"));
        }
        self.shared.inputs.lock().push(input);
        Ok(())
    }

    async fn send_text(&self, text: &str, end_of_turn: bool) -> Result<(), RemoteError> {
        if self.shared.fail_sends.load(Ordering::SeqCst) {
            return Err(RemoteError::transport("mock send failure"));
        }
        self.shared
            .texts
            .lock()
            .push((text.to_string(), end_of_turn));
        Ok(())
    }

    fn receive(&self) -> BoxStream<'_, Result<ResponseEvent, RemoteError>> {
        let shared = Arc::clone(&self.shared);
        stream::unfold(false, move |done| {
            let shared = Arc::clone(&shared);
            async move {
                if done {
                    return None;
                }
                match shared.events_rx.lock().await.recv().await {
                    Some(Ok(event)) => {
                        let end = event.turn_complete;
                        Some((Ok(event), end))
                    }
                    Some(Err(e)) => Some((Err(e), true)),
                    None => Some((Err(RemoteError::Closed), true)),
                }
            }
        })
        .boxed()
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
    }
}
