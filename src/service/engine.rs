//! Single-writer task owning the capture session.
//!
//! Control requests from the UI and detections from the capture pipeline
//! arrive on separate channels but are applied one at a time by the same
//! task, so two detections can never both pass before the auto-pause.

use super::ledger::{LedgerHandle, LedgerView};
use crate::capture::{
    CameraDevice, CameraFacing, CaptureError, CaptureSession, CaptureState, DetectionEvent,
    PauseCause, PermissionAuthority, StartStep,
};
use crate::config::ScannerConfig;
use crate::geometry::TargetFrame;
use crate::ledger::{LedgerError, LedgerOutcome, ResolvedCountry, ScanHistoryItem};
use crate::orchestrator::{DetectionStats, OrchestratorAction, ScanOrchestrator};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const COMMAND_CAPACITY: usize = 32;

/// Read-only snapshot of the capture session, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: CaptureState,
    pub facing: CameraFacing,
    pub gating_enabled: bool,
    pub target_frame: Option<TargetFrame>,
    pub torch_on: bool,
    pub zoom_factor: f64,
    /// Last zoom computed from a pinch, whether or not the device applied it.
    pub requested_zoom: Option<f64>,
    pub stats: DetectionStats,
}

enum EngineCommand {
    Start {
        target_frame: TargetFrame,
        gating_enabled: bool,
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    SetGating {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    SwitchFacing {
        reply: oneshot::Sender<Result<CameraFacing, CaptureError>>,
    },
    ToggleTorch {
        reply: oneshot::Sender<Result<bool, CaptureError>>,
    },
    BeginPinch {
        reply: oneshot::Sender<Result<(), CaptureError>>,
    },
    ApplyPinch {
        scale: f64,
        reply: oneshot::Sender<Result<f64, CaptureError>>,
    },
    EndPinch {
        reply: oneshot::Sender<()>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Answer to a permission prompt, tagged with the session epoch it was
/// raised in.
struct PermissionAnswer {
    epoch: u64,
    granted: bool,
}

struct CaptureEngine {
    session: CaptureSession,
    orchestrator: ScanOrchestrator,
    permission: Arc<dyn PermissionAuthority>,
    commands: mpsc::Receiver<EngineCommand>,
    detections: mpsc::Receiver<DetectionEvent>,
    answers_tx: mpsc::UnboundedSender<PermissionAnswer>,
    answers: mpsc::UnboundedReceiver<PermissionAnswer>,
    pending_start: Option<oneshot::Sender<Result<(), CaptureError>>>,
    prompt: Option<JoinHandle<()>>,
    actions: broadcast::Sender<OrchestratorAction>,
    view: watch::Sender<SessionView>,
}

impl CaptureEngine {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(answer) = self.answers.recv() => self.handle_permission(answer),
                Some(event) = self.detections.recv() => self.handle_detection(event),
            }
            self.publish();
        }

        self.teardown();
        tracing::debug!("Capture engine stopped");
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Start {
                target_frame,
                gating_enabled,
                reply,
            } => self.start(target_frame, gating_enabled, reply),
            EngineCommand::Stop { reply } => {
                let _ = reply.send(self.session.pause(PauseCause::Requested));
            }
            EngineCommand::Resume { reply } => {
                let _ = reply.send(self.session.resume());
            }
            EngineCommand::SetGating { enabled, reply } => {
                self.session.set_gating_enabled(enabled);
                let _ = reply.send(());
            }
            EngineCommand::SwitchFacing { reply } => {
                let _ = reply.send(self.session.switch_facing());
            }
            EngineCommand::ToggleTorch { reply } => {
                let _ = reply.send(self.session.toggle_torch());
            }
            EngineCommand::BeginPinch { reply } => {
                let _ = reply.send(self.session.begin_pinch());
            }
            EngineCommand::ApplyPinch { scale, reply } => {
                let _ = reply.send(self.session.apply_pinch(scale));
            }
            EngineCommand::EndPinch { reply } => {
                self.session.end_pinch();
                let _ = reply.send(());
            }
            EngineCommand::Teardown { reply } => {
                self.teardown();
                let _ = reply.send(());
            }
        }
    }

    fn start(
        &mut self,
        target_frame: TargetFrame,
        gating_enabled: bool,
        reply: oneshot::Sender<Result<(), CaptureError>>,
    ) {
        let status = self.permission.check_permission();
        match self.session.start(target_frame, gating_enabled, status) {
            Ok(StartStep::Running) => {
                let _ = reply.send(Ok(()));
            }
            Ok(StartStep::AwaitingPermission) => {
                // The prompt may stay open indefinitely; keep serving other
                // requests (teardown in particular) while it does.
                let permission = Arc::clone(&self.permission);
                let answers = self.answers_tx.clone();
                let epoch = self.session.epoch();
                self.prompt = Some(tokio::spawn(async move {
                    let granted = permission.request_permission().await;
                    let _ = answers.send(PermissionAnswer { epoch, granted });
                }));
                self.pending_start = Some(reply);
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
    }

    fn handle_permission(&mut self, answer: PermissionAnswer) {
        self.prompt = None;
        if answer.epoch != self.session.epoch()
            || self.session.state() != CaptureState::AwaitingPermission
        {
            tracing::debug!(epoch = answer.epoch, "Stale permission answer ignored");
            return;
        }

        let result = self.session.resolve_permission(answer.granted);
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(result);
        }
    }

    fn handle_detection(&mut self, event: DetectionEvent) {
        if let Some(action) = self.orchestrator.handle(&mut self.session, &event) {
            // No subscribers is fine; the session state still changed.
            let _ = self.actions.send(action);
        }
    }

    fn teardown(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            self.permission.cancel_request();
            prompt.abort();
        }
        self.session.teardown();
        if let Some(reply) = self.pending_start.take() {
            let _ = reply.send(Err(CaptureError::TornDown));
        }

        // Anything already queued was captured before teardown.
        while let Ok(event) = self.detections.try_recv() {
            self.orchestrator.handle(&mut self.session, &event);
        }
        while self.answers.try_recv().is_ok() {}
    }

    fn snapshot(&self) -> SessionView {
        let device = self.session.device();
        SessionView {
            state: self.session.state(),
            facing: self.session.facing(),
            gating_enabled: self.session.gating_enabled(),
            target_frame: self.session.target_frame().copied(),
            torch_on: device.torch_on(),
            zoom_factor: device.zoom_factor(),
            requested_zoom: self.session.requested_zoom(),
            stats: self.orchestrator.stats(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Feeds decoded symbols from the capture pipeline into the engine.
///
/// Detections are delivered in the order they were sent.
#[derive(Debug, Clone)]
pub struct DetectionSender {
    tx: mpsc::Sender<DetectionEvent>,
}

impl DetectionSender {
    /// Queues a detection, waiting if the queue is full.
    pub async fn send(&self, event: DetectionEvent) -> Result<(), CaptureError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| CaptureError::ServiceClosed)
    }

    /// Queues a detection without waiting. Returns false if it was dropped.
    ///
    /// Suitable for a frame-rate callback that must not block.
    pub fn try_send(&self, event: DetectionEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::trace!(error = %err, "Detection dropped");
                false
            }
        }
    }
}

/// Cloneable handle exposing the scanner to the UI layer.
#[derive(Clone)]
pub struct ScannerHandle {
    commands: mpsc::Sender<EngineCommand>,
    detections: DetectionSender,
    actions: broadcast::Sender<OrchestratorAction>,
    session: watch::Receiver<SessionView>,
    ledger: LedgerHandle,
    default_frame: TargetFrame,
    default_gating: bool,
}

impl ScannerHandle {
    /// Starts the capture engine task.
    ///
    /// The engine owns `device`; the ledger task is shared through `ledger`.
    /// The engine stops, releasing the device, once every handle is dropped.
    pub fn spawn(
        config: &ScannerConfig,
        device: Box<dyn CameraDevice>,
        permission: Arc<dyn PermissionAuthority>,
        ledger: LedgerHandle,
    ) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (detections_tx, detections) = mpsc::channel(config.detection_queue_capacity.max(1));
        let (answers_tx, answers) = mpsc::unbounded_channel();
        let (actions, _) = broadcast::channel(config.event_capacity.max(1));

        let session = CaptureSession::new(device, config.initial_facing)
            .with_gating_enabled(config.gating_enabled);
        let orchestrator = ScanOrchestrator::new();
        let initial = SessionView {
            state: session.state(),
            facing: session.facing(),
            gating_enabled: session.gating_enabled(),
            target_frame: None,
            torch_on: false,
            zoom_factor: session.device().zoom_factor(),
            requested_zoom: None,
            stats: orchestrator.stats(),
        };
        let (view_tx, view_rx) = watch::channel(initial);

        let engine = CaptureEngine {
            session,
            orchestrator,
            permission,
            commands,
            detections,
            answers_tx,
            answers,
            pending_start: None,
            prompt: None,
            actions: actions.clone(),
            view: view_tx,
        };
        let join = tokio::spawn(engine.run());

        let handle = Self {
            commands: commands_tx,
            detections: DetectionSender { tx: detections_tx },
            actions,
            session: view_rx,
            ledger,
            default_frame: config.target_frame(),
            default_gating: config.gating_enabled,
        };
        (handle, join)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T, CaptureError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CaptureError::ServiceClosed)?;
        rx.await.map_err(|_| CaptureError::ServiceClosed)
    }

    /// Starts a capture session.
    ///
    /// If the platform has to prompt for camera access this waits for the
    /// user's answer; a teardown in the meantime yields `TornDown`.
    pub async fn start_session(
        &self,
        target_frame: TargetFrame,
        gating_enabled: bool,
    ) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::Start {
            target_frame,
            gating_enabled,
            reply,
        })
        .await?
    }

    /// Starts a session with the configured target frame and gating.
    pub async fn start_default_session(&self) -> Result<(), CaptureError> {
        self.start_session(self.default_frame, self.default_gating).await
    }

    /// Pauses capture. Returns false if the session was not running.
    pub async fn stop_session(&self) -> Result<bool, CaptureError> {
        self.request(|reply| EngineCommand::Stop { reply }).await
    }

    /// Re-arms detection after an accepted scan or an explicit stop.
    pub async fn resume_after_pause(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::Resume { reply }).await?
    }

    pub async fn set_gating_enabled(&self, enabled: bool) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::SetGating { enabled, reply }).await
    }

    pub async fn switch_camera_facing(&self) -> Result<CameraFacing, CaptureError> {
        self.request(|reply| EngineCommand::SwitchFacing { reply }).await?
    }

    pub async fn toggle_torch(&self) -> Result<bool, CaptureError> {
        self.request(|reply| EngineCommand::ToggleTorch { reply }).await?
    }

    /// Fixes the zoom baseline for a new pinch gesture.
    pub async fn begin_pinch(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::BeginPinch { reply }).await?
    }

    /// Applies a pinch gesture's cumulative scale. Returns the zoom applied.
    pub async fn apply_pinch(&self, gesture_scale: f64) -> Result<f64, CaptureError> {
        self.request(|reply| EngineCommand::ApplyPinch {
            scale: gesture_scale,
            reply,
        })
        .await?
    }

    pub async fn end_pinch(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::EndPinch { reply }).await
    }

    /// Releases the camera and returns the session to `Uninitialized`.
    ///
    /// Queued detections are discarded before this returns.
    pub async fn teardown(&self) -> Result<(), CaptureError> {
        self.request(|reply| EngineCommand::Teardown { reply }).await
    }

    /// Sender for the capture pipeline.
    pub fn detection_sender(&self) -> DetectionSender {
        self.detections.clone()
    }

    /// Subscribes to orchestrator actions.
    pub fn subscribe_actions(&self) -> broadcast::Receiver<OrchestratorAction> {
        self.actions.subscribe()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.session.borrow().state
    }

    pub fn session_view(&self) -> SessionView {
        self.session.borrow().clone()
    }

    /// Subscribes to session snapshots.
    pub fn watch_session(&self) -> watch::Receiver<SessionView> {
        self.session.clone()
    }

    /// Records a resolved scan in the ledger.
    pub async fn submit_scan(
        &self,
        barcode: impl Into<String>,
        country: ResolvedCountry,
    ) -> Result<LedgerOutcome, LedgerError> {
        self.ledger.submit(barcode, country).await
    }

    pub async fn can_submit(&self) -> bool {
        self.ledger.can_submit().await
    }

    pub async fn clear_history(&self) -> Result<(), LedgerError> {
        self.ledger.clear().await
    }

    pub fn history(&self) -> Arc<Vec<ScanHistoryItem>> {
        self.ledger.history()
    }

    pub fn remaining_scans(&self) -> u32 {
        self.ledger.remaining()
    }

    pub fn ledger_view(&self) -> LedgerView {
        self.ledger.view()
    }

    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }
}

impl std::fmt::Debug for ScannerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerHandle")
            .field("state", &self.capture_state())
            .field("remaining", &self.remaining_scans())
            .finish()
    }
}
