//! Request slot: at most one in-flight transformation.
//!
//! The slot is owned by the control task. Starting a new request
//! cancels the previous one before the new handle becomes active, so
//! two generations can never both be "current".

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::provider::Provider;

/// Identity of one request.
///
/// Monotonically increasing, process-unique. Every backend event is
/// tagged with it so stale deliveries are rejected with one compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One in-flight transformation.
pub struct RequestHandle {
    id: HandleId,
    provider: Arc<dyn Provider>,
    token: CancellationToken,
    created_at: Instant,
}

impl RequestHandle {
    fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            id: HandleId::new(),
            provider,
            token: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Token observed by the worker streaming this request.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Fire-and-forget: signal the worker and the backend, never wait.
    fn cancel(&self) {
        self.token.cancel();
        self.provider.cancel();
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Single-slot holder for the active [`RequestHandle`].
#[derive(Debug, Default)]
pub struct RequestSlot {
    active: Option<RequestHandle>,
}

impl RequestSlot {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Cancel the active request, if any, and return its id.
    pub fn cancel_active(&mut self) -> Option<HandleId> {
        let handle = self.active.take()?;
        handle.cancel();
        tracing::debug!(
            handle = %handle.id,
            age_ms = handle.created_at.elapsed().as_millis() as u64,
            "request cancelled"
        );
        Some(handle.id)
    }

    /// Cancel whatever is active and install a fresh handle.
    pub fn begin(&mut self, provider: Arc<dyn Provider>) -> &RequestHandle {
        self.cancel_active();
        let handle = RequestHandle::new(provider);
        tracing::debug!(handle = %handle.id, "request started");
        self.active.insert(handle)
    }

    /// Whether `id` is the active request.
    pub fn is_active(&self, id: HandleId) -> bool {
        self.active.as_ref().is_some_and(|h| h.id == id)
    }

    pub fn active(&self) -> Option<&RequestHandle> {
        self.active.as_ref()
    }

    /// Release the slot if `id` is still the active request. Stale ids
    /// are ignored so a late completion cannot clear a newer request.
    pub fn finish(&mut self, id: HandleId) -> bool {
        if !self.is_active(id) {
            return false;
        }
        self.active = None;
        true
    }
}
