//! In-memory fakes for the platform, backend and presentation traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc as fmpsc;
use futures::stream;

use crate::presenter::Presenter;
use crate::provider::{ChunkStream, Provider, ProviderError};
use crate::resolver::{Chord, ClipboardProvider, KeystrokeInjector, ResolverError, ResolverSet};

// --- clipboard ---

#[derive(Default)]
pub struct MemoryClipboard {
    content: Mutex<Vec<u8>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryClipboard {
    pub fn with_content(content: &str) -> Self {
        Self {
            content: Mutex::new(content.as_bytes().to_vec()),
            ..Self::default()
        }
    }

    pub fn content(&self) -> String {
        String::from_utf8_lossy(&self.content.lock().unwrap()).into_owned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ClipboardProvider for MemoryClipboard {
    fn write(&self, content: &[u8]) -> Result<(), ResolverError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ResolverError::Clipboard("write refused".into()));
        }
        *self.content.lock().unwrap() = content.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self) -> Result<Vec<u8>, ResolverError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ResolverError::Clipboard("read refused".into()));
        }
        Ok(self.content.lock().unwrap().clone())
    }
}

// --- keystrokes ---

/// Copy puts the configured selection on the clipboard (nothing when
/// the selection is empty); paste records what the clipboard holds.
pub struct FakeKeystrokes {
    clipboard: Arc<MemoryClipboard>,
    selection: Mutex<Vec<u8>>,
    pasted: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeKeystrokes {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn pasted(&self) -> Vec<String> {
        self.pasted.lock().unwrap().clone()
    }
}

impl KeystrokeInjector for FakeKeystrokes {
    fn send_chord(&self, chord: Chord) -> Result<(), ResolverError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResolverError::Keystroke(format!("{chord} refused")));
        }
        match chord {
            Chord::Copy => {
                let selection = self.selection.lock().unwrap().clone();
                if !selection.is_empty() {
                    self.clipboard.write(&selection)?;
                }
            }
            Chord::Paste => {
                let content = self.clipboard.content();
                self.pasted.lock().unwrap().push(content);
            }
        }
        Ok(())
    }
}

/// A clipboard plus a keyboard wired to it.
pub struct FakeDesktop {
    pub clipboard: Arc<MemoryClipboard>,
    pub keystrokes: Arc<FakeKeystrokes>,
}

impl FakeDesktop {
    pub fn new(clipboard_content: &str) -> Self {
        let clipboard = Arc::new(MemoryClipboard::with_content(clipboard_content));
        let keystrokes = Arc::new(FakeKeystrokes {
            clipboard: Arc::clone(&clipboard),
            selection: Mutex::new(Vec::new()),
            pasted: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        });
        Self {
            clipboard,
            keystrokes,
        }
    }

    pub fn select(&self, text: &str) {
        self.select_bytes(text.as_bytes());
    }

    pub fn select_bytes(&self, bytes: &[u8]) {
        *self.keystrokes.selection.lock().unwrap() = bytes.to_vec();
    }

    pub fn resolver(&self) -> ResolverSet {
        ResolverSet {
            clipboard: self.clipboard.clone(),
            keystrokes: self.keystrokes.clone(),
        }
    }
}

// --- provider ---

enum Script {
    Chunks(Vec<String>),
    Live(fmpsc::UnboundedReceiver<Result<String, ProviderError>>),
    StartError(String),
}

/// Replays queued responses in call order. An unscripted call gets an
/// empty stream.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(String, String)>>,
    cancels: AtomicUsize,
}

/// Feeds a live response chunk by chunk; dropping it ends the stream.
pub type LiveResponse = fmpsc::UnboundedSender<Result<String, ProviderError>>;

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunks(&self, chunks: &[&str]) {
        let chunks = chunks.iter().map(|c| c.to_string()).collect();
        self.scripts.lock().unwrap().push_back(Script::Chunks(chunks));
    }

    pub fn push_live(&self) -> LiveResponse {
        let (tx, rx) = fmpsc::unbounded();
        self.scripts.lock().unwrap().push_back(Script::Live(rx));
        tx
    }

    pub fn push_start_error(&self, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::StartError(message.to_owned()));
    }

    /// `(system_instruction, prompt)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn get_response(
        &self,
        system_instruction: &str,
        prompt: &str,
    ) -> Result<ChunkStream, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((system_instruction.to_owned(), prompt.to_owned()));

        match self.scripts.lock().unwrap().pop_front() {
            Some(Script::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok)))),
            Some(Script::Live(rx)) => Ok(Box::pin(rx)),
            Some(Script::StartError(message)) => Err(ProviderError::Stream(message)),
            None => Ok(Box::pin(stream::empty())),
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

// --- presenter ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterEvent {
    Selection(String),
    Replace(String),
    Error(String, String),
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresenterEvent::Error(_, message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: PresenterEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Presenter for RecordingPresenter {
    fn on_selection(&self, selected: &str) {
        self.record(PresenterEvent::Selection(selected.to_owned()));
    }

    fn on_replace(&self, text: &str) {
        self.record(PresenterEvent::Replace(text.to_owned()));
    }

    fn on_error(&self, title: &str, message: &str) {
        self.record(PresenterEvent::Error(title.to_owned(), message.to_owned()));
    }
}
