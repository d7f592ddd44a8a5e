//! Progress reporting seam
//!
//! The orchestrator reports progress through [`ProgressSink`]; rendering is
//! a consumer concern. The binary installs an indicatif-backed sink, tests
//! install a recording sink, and [`NoOpProgress`] serves headless runs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle for one open progress scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u64);

/// Receives progress for category runs.
///
/// One scope is opened per non-empty category, sized either to the item
/// count or to the aggregate byte size, and closed when the category
/// completes. Not object-async: implementations render, they do not block.
pub trait ProgressSink: Send + Sync {
    /// Open a scope with the given label and maximum value
    fn open_scope(&self, label: &str, max: u64) -> ScopeId;

    /// Advance a scope by `delta` units (items or bytes, per the scope's
    /// scaling)
    fn advance(&self, scope: ScopeId, delta: u64);

    /// Close a scope; its handle must not be used afterwards
    fn close_scope(&self, scope: ScopeId);
}

/// Sink that renders nothing. Scope ids are still unique so misuse shows up
/// in tests.
#[derive(Debug, Default)]
pub struct NoOpProgress {
    next_id: AtomicU64,
}

impl NoOpProgress {
    /// Create a silent sink
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for NoOpProgress {
    fn open_scope(&self, _label: &str, _max: u64) -> ScopeId {
        ScopeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn advance(&self, _scope: ScopeId, _delta: u64) {}

    fn close_scope(&self, _scope: ScopeId) {}
}
