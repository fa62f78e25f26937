//! Conversation lifecycle controller.
//!
//! [`ConversationManager`] is the entry point the rest of an application
//! uses: `start_conversation()` launches a session in the background and
//! returns at once; `stop_conversation()` asks it to stop and escalates to
//! cancellation if it does not stop in time.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    AudioDevice, AudioPipeline, ConversationConfig, ConversationError, EventCallback,
    PipelineState, RemoteService, SessionStats,
};

type SessionTask = JoinHandle<Result<Option<SessionStats>, ConversationError>>;

struct ActiveConversation {
    stop: CancellationToken,
    // Taken by `stop_conversation`; `None` while a stop is in progress
    task: Option<SessionTask>,
}

/// Starts and stops conversation sessions.
///
/// Both operations take `&self` and may be called from any thread; the
/// session itself runs on the tokio runtime captured at construction.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use companion_runtime::{ConversationConfig, ConversationManager, MockDevice, MockRemoteService};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConversationManager::new(
///     Arc::new(MockDevice::new()),
///     Arc::new(MockRemoteService::new()),
///     ConversationConfig::from_env()?,
/// )?;
///
/// manager.start_conversation();
/// tokio::time::sleep(std::time::Duration::from_secs(10)).await;
/// let stats = manager.stop_conversation().await?;
/// println!("{stats:?}");
/// # Ok(())
/// # }
/// ```
pub struct ConversationManager {
    pipeline: Arc<AudioPipeline>,
    runtime: Handle,
    active: Mutex<Option<ActiveConversation>>,
}

impl ConversationManager {
    /// Creates a manager bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`ConversationError::NoRuntime`] if called outside a tokio runtime
    /// - [`ConversationError::Config`] if the configuration is invalid
    pub fn new(
        device: Arc<dyn AudioDevice>,
        remote: Arc<dyn RemoteService>,
        config: ConversationConfig,
    ) -> Result<Self, ConversationError> {
        let runtime = Handle::try_current().map_err(|_| ConversationError::NoRuntime)?;
        Self::with_runtime(runtime, AudioPipeline::new(device, remote, config))
    }

    /// Creates a manager that runs `pipeline` on the given runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Config`] if the pipeline configuration is
    /// invalid.
    pub fn with_runtime(runtime: Handle, pipeline: AudioPipeline) -> Result<Self, ConversationError> {
        pipeline.config().validate()?;
        Ok(Self {
            pipeline: Arc::new(pipeline),
            runtime,
            active: Mutex::new(None),
        })
    }

    /// Creates a manager with an event callback on the pipeline.
    ///
    /// # Errors
    ///
    /// Same as [`new()`](Self::new).
    pub fn with_event_callback(
        device: Arc<dyn AudioDevice>,
        remote: Arc<dyn RemoteService>,
        config: ConversationConfig,
        callback: EventCallback,
    ) -> Result<Self, ConversationError> {
        let runtime = Handle::try_current().map_err(|_| ConversationError::NoRuntime)?;
        let pipeline = AudioPipeline::new(device, remote, config).with_event_callback(callback);
        Self::with_runtime(runtime, pipeline)
    }

    /// Launches a conversation session in the background.
    ///
    /// Returns `false` (and logs) if a session is already active or still
    /// stopping.
    pub fn start_conversation(&self) -> bool {
        let mut active = self.active.lock();
        if let Some(ref current) = *active {
            match current.task {
                None => {
                    tracing::warn!("Conversation is stopping, ignoring start");
                    return false;
                }
                Some(ref task) if !task.is_finished() => {
                    tracing::warn!("Conversation already running");
                    return false;
                }
                Some(_) => {}
            }
        }

        let stop = CancellationToken::new();
        let pipeline = Arc::clone(&self.pipeline);
        let token = stop.clone();
        let task = self.runtime.spawn(async move { pipeline.run(token).await });

        *active = Some(ActiveConversation {
            stop,
            task: Some(task),
        });
        tracing::info!("Conversation started");
        true
    }

    /// Stops the active session.
    ///
    /// Signals a graceful stop and waits up to the configured stop timeout.
    /// If the session has not ended by then, it is cancelled and this call
    /// waits for it to unwind. Returns `Ok(None)` if no session was active
    /// or another call is already stopping it.
    ///
    /// New sessions cannot be started until this call returns.
    ///
    /// # Errors
    ///
    /// - [`ConversationError::GracefulStopTimeout`] if cancellation was needed
    /// - [`ConversationError::TaskFailed`] if the session task panicked
    /// - any error the session itself ended with
    pub async fn stop_conversation(&self) -> Result<Option<SessionStats>, ConversationError> {
        let taken = self.active.lock().as_mut().and_then(|current| {
            current
                .task
                .take()
                .map(|task| (current.stop.clone(), task))
        });
        let Some((stop, mut task)) = taken else {
            tracing::warn!("No conversation running");
            return Ok(None);
        };
        let _stopping = StoppingGuard {
            active: &self.active,
        };

        tracing::info!("Stopping conversation");
        stop.cancel();

        let timeout = self.pipeline.config().stop_timeout;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => {
                tracing::info!("Conversation stopped");
                joined.map_err(|e| ConversationError::TaskFailed(e.to_string()))?
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Conversation didn't stop gracefully, cancelling"
                );
                task.abort();
                // Wait for the task to unwind; a cancelled JoinError is expected here
                let _ = task.await;
                Err(ConversationError::GracefulStopTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Returns `true` while a session task is alive, including while it is
    /// being stopped.
    pub fn is_active(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|current| {
            current
                .task
                .as_ref()
                .map_or(true, |task| !task.is_finished())
        })
    }

    /// Returns the pipeline's lifecycle phase.
    pub fn state(&self) -> PipelineState {
        self.pipeline.state()
    }

    /// Returns live statistics of the current (or last) session.
    pub fn stats(&self) -> SessionStats {
        self.pipeline.stats()
    }

    /// Returns the final statistics of the last session that ended.
    pub fn last_stats(&self) -> Option<SessionStats> {
        self.pipeline.last_stats()
    }
}

/// Clears the stopping entry once `stop_conversation` finishes or is dropped.
struct StoppingGuard<'a> {
    active: &'a Mutex<Option<ActiveConversation>>,
}

impl Drop for StoppingGuard<'_> {
    fn drop(&mut self) {
        *self.active.lock() = None;
    }
}

impl Drop for ConversationManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            // Session dropped without explicit stop - cancel in the background
            active.stop.cancel();
        }
    }
}
