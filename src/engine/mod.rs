//! Transformation engine: selection capture, single-slot requests,
//! sentinel-safe streaming replacement.
//!
//! Architecture: one control task owns all mutable state ([`Engine`]).
//! Each request streams on its own worker task, which sends
//! [`BackendEvent`]s tagged with the request's [`HandleId`] over an
//! unbounded channel. Events from superseded requests are rejected by
//! id on arrival.

pub mod capture;
pub mod guard;
pub mod prompt;
pub mod sanitizer;
pub mod sink;
pub mod slot;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::signal::unix::{SignalKind, signal as tokio_signal};
use tokio::sync::mpsc;

use crate::hotkey::{HotkeyError, HotkeyListener, Trigger};
use crate::presenter::Presenter;
use crate::provider::{Provider, ProviderError};
use crate::resolver::{ResolverError, ResolverSet};
use capture::SelectionCapturer;
use prompt::{Instruction, PromptRequest};
use sanitizer::{ForwardDecision, SanitizerState, StreamSanitizer};
use sink::ReplacementSink;
use slot::{HandleId, RequestHandle, RequestSlot};

/// Engine errors. The first four are the per-request taxonomy reported
/// to the user; the rest are startup failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Please select text to use this option.")]
    EmptySelection,
    #[error("The text is incompatible with the requested change.")]
    SentinelDetected,
    #[error("clipboard: {0}")]
    ClipboardAccess(ResolverError),
    #[error("An error occurred: {0}")]
    Backend(#[from] ProviderError),
    #[error("platform: {0}")]
    Platform(#[from] ResolverError),
    #[error("hotkey: {0}")]
    Hotkey(#[from] HotkeyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Title for user-facing notifications.
    pub fn title(&self) -> &'static str {
        "Error"
    }
}

/// Message from a request worker to the control task.
#[derive(Debug)]
pub struct BackendEvent {
    pub handle: HandleId,
    pub kind: BackendEventKind,
}

#[derive(Debug)]
pub enum BackendEventKind {
    Chunk(String),
    /// The backend stream ended normally.
    End,
    Failed(ProviderError),
}

/// How the active request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// Output was pasted.
    Replaced,
    /// The stream ended without any text to paste.
    Empty,
    /// The output was the error sentinel.
    Suppressed,
    /// The backend failed.
    Failed,
}

/// Engine settings handed over by the CLI.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub instruction: Instruction,
    /// Wait after each synthetic copy/paste chord.
    pub settle: Duration,
}

pub struct Engine {
    provider: Arc<dyn Provider>,
    presenter: Arc<dyn Presenter>,
    instruction: Instruction,
    capturer: SelectionCapturer,
    slot: RequestSlot,
    sanitizer: StreamSanitizer,
    sink: ReplacementSink,
    events_tx: mpsc::UnboundedSender<BackendEvent>,
}

impl Engine {
    /// Create an engine and the receiver its workers deliver to.
    ///
    /// The caller must feed every received event back through
    /// [`Engine::handle_event`].
    pub fn new(
        resolver: ResolverSet,
        provider: Arc<dyn Provider>,
        presenter: Arc<dyn Presenter>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let engine = Self {
            capturer: SelectionCapturer::new(resolver.clone(), config.settle),
            sink: ReplacementSink::new(resolver, Arc::clone(&presenter), config.settle),
            provider,
            presenter,
            instruction: config.instruction,
            slot: RequestSlot::new(),
            sanitizer: StreamSanitizer::new(),
            events_tx,
        };
        (engine, events_rx)
    }

    /// Whether no request is in flight.
    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.slot.active().is_none()
    }

    /// Handle one trigger: cancel whatever is in flight, capture the
    /// selection, and start a new request for it.
    ///
    /// Errors are reported to the presenter before being returned; the
    /// slot is left empty on every error path.
    pub async fn trigger(&mut self) -> Result<HandleId, EngineError> {
        if let Some(previous) = self.slot.cancel_active() {
            tracing::info!(handle = %previous, "superseded by new trigger");
        }
        self.sanitizer.clear();
        self.sink.reset();

        let handle = self.slot.begin(Arc::clone(&self.provider)).id();
        self.sanitizer.reset(handle);

        let selected = self.capturer.capture().await;
        self.presenter.on_selection(&selected);

        let request = match self.instruction.build(&selected) {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(handle = %handle, error = %e, "request not started");
                self.release(handle);
                self.sink.report(&e);
                return Err(e);
            }
        };

        let Some(active) = self.slot.active() else {
            return Err(EngineError::Backend(ProviderError::Stream(
                "request slot emptied during capture".into(),
            )));
        };
        spawn_worker(active, request, self.events_tx.clone());

        tracing::info!(
            handle = %handle,
            provider = %self.provider.name(),
            chars = selected.chars().count(),
            "request started"
        );
        Ok(handle)
    }

    /// Apply one worker event. Returns how the active request ended when
    /// this event completed it.
    pub async fn handle_event(&mut self, event: BackendEvent) -> Option<Finished> {
        let BackendEvent { handle, kind } = event;

        match kind {
            BackendEventKind::Chunk(chunk) => {
                match self.sanitizer.on_chunk(handle, &chunk) {
                    ForwardDecision::Drop => {
                        tracing::trace!(handle = %handle, bytes = chunk.len(), "chunk dropped");
                    }
                    ForwardDecision::Hold => {
                        tracing::trace!(handle = %handle, "output held");
                    }
                    ForwardDecision::Forward(text) => self.sink.on_forward(text).await,
                    ForwardDecision::Suppress => {
                        tracing::info!(handle = %handle, "backend reported incompatible input");
                        self.sink.on_suppressed();
                    }
                }
                None
            }
            BackendEventKind::End => {
                if !self.slot.is_active(handle) {
                    return None;
                }
                let elapsed_ms = self
                    .slot
                    .active()
                    .map_or(0, |h| h.created_at().elapsed().as_millis() as u64);
                let suppressed = self.sanitizer.state() == SanitizerState::Suppressed;
                if let Some(held) = self.sanitizer.finish(handle) {
                    self.sink.on_forward(held).await;
                }
                self.sink.on_stream_end();
                self.release(handle);

                let finished = if suppressed {
                    Finished::Suppressed
                } else if self.sink.pasted_anything() {
                    Finished::Replaced
                } else {
                    Finished::Empty
                };
                tracing::info!(handle = %handle, outcome = ?finished, elapsed_ms, "request finished");
                Some(finished)
            }
            BackendEventKind::Failed(e) => {
                if !self.slot.is_active(handle) {
                    tracing::debug!(handle = %handle, error = %e, "stale backend error ignored");
                    return None;
                }
                self.release(handle);
                let e = EngineError::Backend(e);
                tracing::warn!(handle = %handle, error = %e, "request failed");
                self.sink.report(&e);
                Some(Finished::Failed)
            }
        }
    }

    /// Cancel the in-flight request, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.slot.cancel_active() {
            tracing::info!(handle = %handle, "request cancelled");
        }
        self.sanitizer.clear();
        self.sink.reset();
    }

    fn release(&mut self, handle: HandleId) {
        self.slot.finish(handle);
        self.sanitizer.clear();
    }
}

/// Stream one request on its own task.
fn spawn_worker(
    handle: &RequestHandle,
    request: PromptRequest,
    tx: mpsc::UnboundedSender<BackendEvent>,
) {
    let id = handle.id();
    let token = handle.token().clone();
    let provider = Arc::clone(handle.provider());

    tokio::spawn(async move {
        let send = |kind| tx.send(BackendEvent { handle: id, kind }).is_ok();

        if token.is_cancelled() {
            return;
        }

        let mut stream = match provider.get_response(&request.system_instruction, &request.prompt) {
            Ok(stream) => stream,
            Err(e) => {
                send(BackendEventKind::Failed(e));
                return;
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    tracing::debug!(handle = %id, "worker stopped by cancellation");
                    return;
                }

                item = stream.next() => {
                    let delivered = match item {
                        Some(Ok(chunk)) => send(BackendEventKind::Chunk(chunk)),
                        Some(Err(e)) => {
                            send(BackendEventKind::Failed(e));
                            return;
                        }
                        None => {
                            send(BackendEventKind::End);
                            return;
                        }
                    };
                    if !delivered {
                        // Control task gone.
                        return;
                    }
                }
            }
        }
    });
}

/// Run the daemon until SIGTERM or SIGINT: every press of `shortcut`
/// transforms the current selection.
pub async fn run(
    config: EngineConfig,
    shortcut: &str,
    provider: Arc<dyn Provider>,
    presenter: Arc<dyn Presenter>,
) -> Result<(), EngineError> {
    let resolver = ResolverSet::x11()?;
    let (mut engine, mut events) = Engine::new(resolver, provider, presenter, config);
    let (listener, mut triggers) = HotkeyListener::start(shortcut)?;

    let mut sigterm = tokio_signal(SignalKind::terminate())?;
    let mut sigint = tokio_signal(SignalKind::interrupt())?;

    tracing::info!(shortcut, "rewrited running");

    let mut listener_died = false;

    loop {
        tokio::select! {
            trigger = triggers.recv() => {
                let Some(Trigger { at }) = trigger else {
                    tracing::error!("hotkey thread exited, shutting down");
                    listener_died = true;
                    break;
                };
                tracing::debug!(queued_ms = at.elapsed().as_millis() as u64, "trigger received");
                // Failures are already reported to the presenter.
                let _ = engine.trigger().await;
            }

            Some(event) = events.recv() => {
                engine.handle_event(event).await;
            }

            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    engine.cancel();
    listener.stop();
    tracing::info!("rewrited stopped");

    if listener_died {
        return Err(EngineError::Hotkey(HotkeyError::X11(
            "hotkey thread exited unexpectedly".into(),
        )));
    }
    Ok(())
}

/// Transform the current selection once, without a hotkey, and wait for
/// the request to finish.
pub async fn once(
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    presenter: Arc<dyn Presenter>,
) -> Result<Finished, EngineError> {
    let resolver = ResolverSet::x11()?;
    let (mut engine, mut events) = Engine::new(resolver, provider, presenter, config);

    engine.trigger().await?;
    drive_to_completion(&mut engine, &mut events).await
}

/// Feed worker events into `engine` until the active request finishes.
pub async fn drive_to_completion(
    engine: &mut Engine,
    events: &mut mpsc::UnboundedReceiver<BackendEvent>,
) -> Result<Finished, EngineError> {
    while let Some(event) = events.recv().await {
        if let Some(finished) = engine.handle_event(event).await {
            return Ok(finished);
        }
    }
    Err(EngineError::Backend(ProviderError::Stream(
        "event channel closed".into(),
    )))
}

/// Capture the current selection on the X11 desktop.
pub async fn capture(settle: Duration) -> Result<String, EngineError> {
    let resolver = ResolverSet::x11()?;
    Ok(SelectionCapturer::new(resolver, settle).capture().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDesktop, RecordingPresenter, ScriptedProvider};
    use prompt::Preset;
    use tokio::time::timeout;

    const INCOMPATIBLE: &str = "The text is incompatible with the requested change.";

    struct Harness {
        desktop: FakeDesktop,
        provider: Arc<ScriptedProvider>,
        presenter: Arc<RecordingPresenter>,
        engine: Engine,
        events: mpsc::UnboundedReceiver<BackendEvent>,
    }

    fn harness(instruction: Instruction) -> Harness {
        let desktop = FakeDesktop::new("user clipboard");
        let provider = Arc::new(ScriptedProvider::new());
        let presenter = Arc::new(RecordingPresenter::new());
        let config = EngineConfig {
            instruction,
            settle: Duration::ZERO,
        };
        let (engine, events) =
            Engine::new(desktop.resolver(), provider.clone(), presenter.clone(), config);
        Harness {
            desktop,
            provider,
            presenter,
            engine,
            events,
        }
    }

    impl Harness {
        async fn finish(&mut self) -> Finished {
            timeout(
                Duration::from_secs(5),
                drive_to_completion(&mut self.engine, &mut self.events),
            )
            .await
            .expect("request did not finish")
            .unwrap()
        }

        /// Wait until the workers have made `n` backend calls.
        async fn backend_called(&self, n: usize) {
            timeout(Duration::from_secs(5), async {
                while self.provider.calls().len() < n {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("worker never called the backend");
        }

        async fn next_event(&mut self) -> Option<Finished> {
            let event = timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("no backend event")
                .unwrap();
            self.engine.handle_event(event).await
        }
    }

    #[tokio::test]
    async fn selection_replaced_with_streamed_output() {
        let mut h = harness(Instruction::Preset(Preset::Proofread));
        h.desktop.select("teh cat");
        h.provider.push_chunks(&["The", " cat"]);

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Replaced);

        assert_eq!(h.desktop.keystrokes.pasted(), vec!["The", " cat"]);
        assert_eq!(h.desktop.clipboard.content(), "user clipboard");
        assert_eq!(h.provider.calls()[0].1, "Proofread this:\n\nteh cat");
        assert!(h.engine.is_idle());
    }

    #[tokio::test]
    async fn empty_selection_reports_without_backend_call() {
        let mut h = harness(Instruction::Preset(Preset::Rewrite));

        let err = h.engine.trigger().await.unwrap_err();

        assert!(matches!(err, EngineError::EmptySelection));
        assert!(h.provider.calls().is_empty());
        assert_eq!(
            h.presenter.errors(),
            vec!["Please select text to use this option."]
        );
        assert_eq!(h.desktop.clipboard.content(), "user clipboard");
        assert!(h.engine.is_idle());
    }

    #[tokio::test]
    async fn custom_instruction_without_selection_is_sent_alone() {
        let mut h = harness(Instruction::Custom("write a haiku".into()));
        h.provider.push_chunks(&["Autumn moon"]);

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Replaced);

        assert_eq!(h.provider.calls()[0].1, "write a haiku");
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["Autumn moon"]);
    }

    #[tokio::test]
    async fn split_sentinel_never_reaches_document() {
        let mut h = harness(Instruction::Preset(Preset::Table));
        h.desktop.select("not tabular");
        h.provider
            .push_chunks(&["ERROR_TEXT_", "INCOMPATIBLE", "_WITH_REQUEST", "\n"]);

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Suppressed);

        assert!(h.desktop.keystrokes.pasted().is_empty());
        assert_eq!(h.presenter.errors(), vec![INCOMPATIBLE]);
        assert_eq!(h.desktop.clipboard.content(), "user clipboard");
    }

    #[tokio::test]
    async fn sentinel_prefix_flushed_when_stream_ends() {
        let mut h = harness(Instruction::Preset(Preset::Rewrite));
        h.desktop.select("shout");
        h.provider.push_chunks(&["ERROR"]);

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Replaced);

        assert_eq!(h.desktop.keystrokes.pasted(), vec!["ERROR"]);
        assert!(h.presenter.errors().is_empty());
    }

    #[tokio::test]
    async fn new_trigger_supersedes_in_flight_request() {
        let mut h = harness(Instruction::Preset(Preset::Concise));
        h.desktop.select("some long text");
        let first_response = h.provider.push_live();
        h.provider.push_chunks(&["second"]);

        let first = h.engine.trigger().await.unwrap();
        first_response
            .unbounded_send(Ok("First answer".into()))
            .unwrap();
        assert_eq!(h.next_event().await, None);

        let second = h.engine.trigger().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(h.provider.cancel_count(), 1);

        // Deliveries tagged with the superseded handle are ignored.
        let _ = first_response.unbounded_send(Ok(" late".into()));
        let stale = BackendEvent {
            handle: first,
            kind: BackendEventKind::Chunk(" stale".into()),
        };
        assert_eq!(h.engine.handle_event(stale).await, None);
        let stale_end = BackendEvent {
            handle: first,
            kind: BackendEventKind::End,
        };
        assert_eq!(h.engine.handle_event(stale_end).await, None);
        assert!(!h.engine.is_idle());

        assert_eq!(h.finish().await, Finished::Replaced);
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["First answer", "second"]);
        assert_eq!(h.desktop.clipboard.content(), "user clipboard");
    }

    #[tokio::test]
    async fn held_sentinel_prefix_discarded_when_superseded() {
        let mut h = harness(Instruction::Preset(Preset::Professional));
        h.desktop.select("hey");
        let first_response = h.provider.push_live();
        h.provider.push_chunks(&["OK"]);

        h.engine.trigger().await.unwrap();
        first_response
            .unbounded_send(Ok("ERROR_TEXT_INCOMPATIBLE".into()))
            .unwrap();
        assert_eq!(h.next_event().await, None);

        h.engine.trigger().await.unwrap();
        drop(first_response);

        assert_eq!(h.finish().await, Finished::Replaced);
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["OK"]);
        assert!(h.presenter.errors().is_empty());
    }

    #[tokio::test]
    async fn only_last_of_rapid_triggers_produces_output() {
        let mut h = harness(Instruction::Preset(Preset::Rewrite));
        h.desktop.select("draft");
        let _first = h.provider.push_live();
        let _second = h.provider.push_live();
        h.provider.push_chunks(&["final"]);

        let first = h.engine.trigger().await.unwrap();
        h.backend_called(1).await;
        let second = h.engine.trigger().await.unwrap();
        h.backend_called(2).await;
        h.engine.trigger().await.unwrap();
        assert_eq!(h.provider.cancel_count(), 2);

        for stale in [first, second] {
            let event = BackendEvent {
                handle: stale,
                kind: BackendEventKind::Chunk("stale output".into()),
            };
            assert_eq!(h.engine.handle_event(event).await, None);
        }

        assert_eq!(h.finish().await, Finished::Replaced);
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["final"]);
    }

    #[tokio::test]
    async fn chunk_after_completion_is_dropped() {
        let mut h = harness(Instruction::Preset(Preset::Friendly));
        h.desktop.select("hi");
        h.provider.push_chunks(&["Hello there"]);

        let handle = h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Replaced);

        let late = BackendEvent {
            handle,
            kind: BackendEventKind::Chunk("again".into()),
        };
        assert_eq!(h.engine.handle_event(late).await, None);
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["Hello there"]);
    }

    #[tokio::test]
    async fn backend_start_failure_reported() {
        let mut h = harness(Instruction::Preset(Preset::Summary));
        h.desktop.select("long text");
        h.provider.push_start_error("no credentials");

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Failed);

        assert_eq!(
            h.presenter.errors(),
            vec!["An error occurred: stream: no credentials"]
        );
        assert!(h.desktop.keystrokes.pasted().is_empty());
        assert!(h.engine.is_idle());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_pasted_prefix() {
        let mut h = harness(Instruction::Preset(Preset::KeyPoints));
        h.desktop.select("notes");
        let response = h.provider.push_live();

        h.engine.trigger().await.unwrap();
        response.unbounded_send(Ok("- first".into())).unwrap();
        response
            .unbounded_send(Err(ProviderError::Stream("connection reset".into())))
            .unwrap();

        assert_eq!(h.finish().await, Finished::Failed);
        assert_eq!(h.desktop.keystrokes.pasted(), vec!["- first"]);
        assert_eq!(
            h.presenter.errors(),
            vec!["An error occurred: stream: connection reset"]
        );
    }

    #[tokio::test]
    async fn whitespace_only_response_finishes_empty() {
        let mut h = harness(Instruction::Preset(Preset::Proofread));
        h.desktop.select("ok");
        h.provider.push_chunks(&["  ", "\n"]);

        h.engine.trigger().await.unwrap();
        assert_eq!(h.finish().await, Finished::Empty);
        assert!(h.desktop.keystrokes.pasted().is_empty());
    }

    #[tokio::test]
    async fn cancel_leaves_engine_idle() {
        let mut h = harness(Instruction::Preset(Preset::Proofread));
        h.desktop.select("text");
        let _response = h.provider.push_live();

        h.engine.trigger().await.unwrap();
        h.engine.cancel();

        assert!(h.engine.is_idle());
        assert_eq!(h.provider.cancel_count(), 1);
    }
}
