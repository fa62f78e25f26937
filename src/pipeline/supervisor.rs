//! Pipeline supervisor - owns one conversation session from connect to release.

use std::future::pending;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::capture::run_capture;
use super::downlink::run_downlink;
use super::playback::run_playback;
use super::uplink::run_uplink;
use super::{RelayQueue, StageContext};
use crate::format::EncodedAudio;
use crate::session::SessionState;
use crate::{
    AudioDevice, ConversationConfig, ConversationError, ConversationEvent, EventCallback,
    RemoteService, RemoteSession, SessionStats, StageId,
};

/// Lifecycle phase of an [`AudioPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No session.
    Idle,
    /// Connecting and starting the device.
    Starting,
    /// Stages are running.
    Running,
    /// Stages are being cancelled and resources released.
    Stopping,
}

type StageResult = (StageId, Result<(), ConversationError>);

/// Runs conversation sessions between an audio device and a remote service.
///
/// Each call to [`run()`](Self::run) is one session: connect, run the four
/// stages until stopped, then stop the device and release the session. The
/// device is left with recording and playback off on every exit path,
/// including when the `run` future is dropped mid-flight.
pub struct AudioPipeline {
    device: Arc<dyn AudioDevice>,
    remote: Arc<dyn RemoteService>,
    config: ConversationConfig,
    state: Arc<SessionState>,
    phase: Arc<Mutex<PipelineState>>,
    last_stats: Mutex<Option<SessionStats>>,
    event_callback: Option<EventCallback>,
}

impl AudioPipeline {
    /// Creates a pipeline for the given device, service, and configuration.
    pub fn new(
        device: Arc<dyn AudioDevice>,
        remote: Arc<dyn RemoteService>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            device,
            remote,
            config,
            state: Arc::new(SessionState::new()),
            phase: Arc::new(Mutex::new(PipelineState::Idle)),
            last_stats: Mutex::new(None),
            event_callback: None,
        }
    }

    /// Sets the event callback.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Returns the current lifecycle phase.
    pub fn state(&self) -> PipelineState {
        *self.phase.lock()
    }

    /// Returns live statistics of the current (or last) session.
    pub fn stats(&self) -> SessionStats {
        self.state.snapshot()
    }

    /// Returns the final statistics of the last session that ended.
    pub fn last_stats(&self) -> Option<SessionStats> {
        self.last_stats.lock().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    fn emit(&self, event: ConversationEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    fn set_phase(&self, phase: PipelineState) {
        *self.phase.lock() = phase;
    }

    /// Runs one session until `stop` is cancelled, the configured duration
    /// elapses, or a stage fails.
    ///
    /// Returns `Ok(None)` without doing anything if a session is already
    /// active on this pipeline.
    ///
    /// # Errors
    ///
    /// - [`ConversationError::Connect`] if the session cannot be opened
    /// - [`ConversationError::DeviceUnavailable`] if the device cannot start
    /// - [`ConversationError::StageFailure`] if a stage failed while running
    /// - [`ConversationError::TaskFailed`] if a stage panicked
    pub async fn run(
        &self,
        stop: CancellationToken,
    ) -> Result<Option<SessionStats>, ConversationError> {
        // Declared first so it drops last: Idle is only visible once the
        // device is off and the session released.
        let Some(_phase) = PhaseGuard::begin(&self.phase) else {
            tracing::warn!("Conversation already active, ignoring start");
            return Ok(None);
        };

        self.state.reset();
        let result = self.run_session(&stop).await;

        if let Err(ref e) = result {
            self.state.stage_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Conversation session failed");
            if let ConversationError::StageFailure { stage, reason } = e {
                self.emit(ConversationEvent::StageFailed {
                    stage: *stage,
                    error: reason.clone(),
                });
            }
        }

        let stats = self.state.snapshot();
        log_stats(&stats);
        *self.last_stats.lock() = Some(stats.clone());
        self.emit(ConversationEvent::SessionEnded {
            stats: stats.clone(),
        });

        result.map(|()| Some(stats))
    }

    async fn run_session(&self, stop: &CancellationToken) -> Result<(), ConversationError> {
        tracing::info!(model = %self.config.model, "Connecting to remote service");
        let session: Arc<dyn RemoteSession> = self
            .remote
            .connect(&self.config.model, &self.config.session_config())
            .await
            .map_err(ConversationError::Connect)?
            .into();

        let _device = DeviceGuard::start(Arc::clone(&self.device))?;

        tracing::info!(model = %self.config.model, "Connected");
        self.emit(ConversationEvent::Connected {
            model: self.config.model.clone(),
        });

        if let Some(ref greeting) = self.config.greeting {
            tracing::debug!("Sending greeting request");
            session
                .send_text(greeting, true)
                .await
                .map_err(|e| ConversationError::stage_failure(StageId::Uplink, e.to_string()))?;
        }

        let input = Arc::new(RelayQueue::<EncodedAudio>::bounded(
            self.config.input_queue_capacity,
        ));
        let output = Arc::new(RelayQueue::<Vec<u8>>::unbounded());
        let ctx = Arc::new(StageContext::new(
            Arc::clone(&self.state),
            self.event_callback.clone(),
        ));

        let mut stages = self.spawn_stages(&session, &input, &output, &ctx);
        self.set_phase(PipelineState::Running);
        tracing::info!("Conversation active");

        let outcome = self.supervise(&mut stages, stop).await;

        self.set_phase(PipelineState::Stopping);
        stages.shutdown().await;
        tracing::debug!(
            pending_input = input.len(),
            pending_output = output.len(),
            "Stages stopped"
        );

        outcome
    }

    fn spawn_stages(
        &self,
        session: &Arc<dyn RemoteSession>,
        input: &Arc<RelayQueue<EncodedAudio>>,
        output: &Arc<RelayQueue<Vec<u8>>>,
        ctx: &Arc<StageContext>,
    ) -> JoinSet<StageResult> {
        let mut stages = JoinSet::new();

        stages.spawn(tag(
            StageId::Capture,
            run_capture(
                Arc::clone(&self.device),
                Arc::clone(input),
                Arc::clone(ctx),
                self.config.capture_poll_interval,
            ),
        ));
        stages.spawn(tag(
            StageId::Uplink,
            run_uplink(Arc::clone(session), Arc::clone(input), Arc::clone(ctx)),
        ));
        stages.spawn(tag(
            StageId::Downlink,
            run_downlink(Arc::clone(session), Arc::clone(output), Arc::clone(ctx)),
        ));
        stages.spawn(tag(
            StageId::Playback,
            run_playback(
                Arc::clone(&self.device),
                Arc::clone(output),
                Arc::clone(ctx),
                self.config.remote_output_rate,
                self.config.device_rate,
            ),
        ));

        stages
    }

    /// Waits for the first of: stop signal, duration timeout, stage exit.
    async fn supervise(
        &self,
        stages: &mut JoinSet<StageResult>,
        stop: &CancellationToken,
    ) -> Result<(), ConversationError> {
        let deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            () = stop.cancelled() => {
                tracing::info!("Stop requested, ending conversation");
                Ok(())
            }
            () = deadline => {
                tracing::info!("Duration elapsed, ending conversation");
                Ok(())
            }
            Some(joined) = stages.join_next() => match joined {
                Ok((_, Err(e))) => Err(e),
                Ok((stage, Ok(()))) => Err(ConversationError::stage_failure(
                    stage,
                    "stage exited unexpectedly",
                )),
                Err(e) => Err(ConversationError::TaskFailed(e.to_string())),
            },
        }
    }
}

async fn tag<F>(stage: StageId, stage_future: F) -> StageResult
where
    F: std::future::Future<Output = Result<(), ConversationError>>,
{
    (stage, stage_future.await)
}

fn log_stats(stats: &SessionStats) {
    tracing::info!(
        duration_secs = stats.duration.as_secs_f64(),
        frames_captured = stats.frames_captured,
        frames_sent = stats.frames_sent,
        frames_received = stats.frames_received,
        frames_played = stats.frames_played,
        interruptions = stats.interruptions,
        turns = stats.turns_completed,
        errors = stats.errors,
        input_rate = stats.input_rate(),
        output_rate = stats.output_rate(),
        "Conversation session statistics"
    );
}

/// Claims the pipeline for one session and returns it to Idle on drop.
struct PhaseGuard<'a> {
    phase: &'a Mutex<PipelineState>,
}

impl<'a> PhaseGuard<'a> {
    fn begin(phase: &'a Mutex<PipelineState>) -> Option<Self> {
        let mut current = phase.lock();
        if *current != PipelineState::Idle {
            return None;
        }
        *current = PipelineState::Starting;
        Some(Self { phase })
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = PipelineState::Idle;
    }
}

/// Turns device recording and playback on, and off again on drop.
struct DeviceGuard {
    device: Arc<dyn AudioDevice>,
}

impl DeviceGuard {
    fn start(device: Arc<dyn AudioDevice>) -> Result<Self, ConversationError> {
        // Guard exists before starting so a partial start is still undone
        let guard = Self { device };
        guard.device.start_recording()?;
        guard.device.start_playing()?;
        tracing::debug!("Device recording and playback started");
        Ok(guard)
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.device.stop_recording();
        self.device.stop_playing();
        tracing::debug!("Device recording and playback stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockDevice, MockRemoteService, ResponseEvent};
    use std::time::Duration;

    fn config() -> ConversationConfig {
        ConversationConfig::new("test-key").unwrap()
    }

    fn pipeline(device: &Arc<MockDevice>, remote: &Arc<MockRemoteService>) -> AudioPipeline {
        AudioPipeline::new(device.clone(), remote.clone(), config())
    }

    #[tokio::test]
    async fn test_stop_signal_ends_session_cleanly() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        device.queue_numbered(10, 160);
        let pipeline = pipeline(&device, &remote);

        let stop = CancellationToken::new();
        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.cancel();
        });

        let stats = pipeline.run(stop).await.unwrap().unwrap();

        assert_eq!(stats.frames_sent, 10);
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(!device.is_recording());
        assert!(!device.is_playing());
        assert_eq!(remote.release_count(), 1);
    }

    #[tokio::test]
    async fn test_duration_ends_session() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        let mut config = config();
        config.duration = Some(Duration::from_millis(50));
        let pipeline = AudioPipeline::new(device.clone(), remote.clone(), config);

        let result = pipeline.run(CancellationToken::new()).await;

        assert!(matches!(result, Ok(Some(_))));
        assert!(pipeline.last_stats().is_some());
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_device_off() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        remote.fail_connect("unauthorized");
        let pipeline = pipeline(&device, &remote);

        let result = pipeline.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(ConversationError::Connect(_))));
        assert_eq!(device.start_count(), 0);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_device_failure_releases_session() {
        let device = Arc::new(MockDevice::new());
        device.fail_on_start();
        let remote = Arc::new(MockRemoteService::new());
        let pipeline = pipeline(&device, &remote);

        let result = pipeline.run(CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(ConversationError::DeviceUnavailable(_))
        ));
        assert_eq!(remote.connect_count(), 1);
        assert_eq!(remote.release_count(), 1);
    }

    #[tokio::test]
    async fn test_downlink_failure_cancels_all() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        remote.push_event(ResponseEvent::with_audio(vec![0; 480]));
        remote.push_error(crate::RemoteError::transport("socket reset"));
        let pipeline = pipeline(&device, &remote);

        let result = pipeline.run(CancellationToken::new()).await;

        match result {
            Err(ConversationError::StageFailure { stage, reason }) => {
                assert_eq!(stage, StageId::Downlink);
                assert!(reason.contains("socket reset"));
            }
            other => panic!("expected downlink failure, got {other:?}"),
        }
        assert!(!device.is_recording());
        assert!(!device.is_playing());
        assert_eq!(remote.release_count(), 1);
        assert_eq!(pipeline.last_stats().unwrap().errors, 1);
    }

    #[tokio::test]
    async fn test_greeting_is_sent_first() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        let mut config = config().with_greeting();
        config.duration = Some(Duration::from_millis(20));
        let pipeline = AudioPipeline::new(device.clone(), remote.clone(), config);

        pipeline.run(CancellationToken::new()).await.unwrap();

        let texts = remote.sent_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].1, "greeting must end the turn");
    }

    #[tokio::test]
    async fn test_second_run_while_active_is_noop() {
        let device = Arc::new(MockDevice::new());
        let remote = Arc::new(MockRemoteService::new());
        let pipeline = Arc::new(pipeline(&device, &remote));

        let stop = CancellationToken::new();
        let first = {
            let pipeline = Arc::clone(&pipeline);
            let stop = stop.clone();
            tokio::spawn(async move { pipeline.run(stop).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pipeline.state(), PipelineState::Running);

        let second = pipeline.run(CancellationToken::new()).await.unwrap();
        assert!(second.is_none());

        stop.cancel();
        assert!(first.await.unwrap().unwrap().is_some());
        assert_eq!(remote.connect_count(), 1);
    }
}
