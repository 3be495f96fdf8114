//! Observable loading/error/result state shared with presentation code.
//!
//! Readers get snapshots or a [`watch::Receiver`]; only the aggregator in
//! this crate can move the state between phases.

use crate::work::Work;
use tokio::sync::watch;

/// Point-in-time view of a fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchSnapshot {
    loading: bool,
    error: Option<String>,
    works: Vec<Work>,
}

impl FetchSnapshot {
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Works accumulated by the latest top-level request
    pub fn works(&self) -> &[Work] {
        &self.works
    }
}

#[derive(Debug)]
pub struct FetchState {
    tx: watch::Sender<FetchSnapshot>,
}

impl Default for FetchState {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(FetchSnapshot::default());
        Self { tx }
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<FetchSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> FetchSnapshot {
        self.tx.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }

    pub fn error(&self) -> Option<String> {
        self.tx.borrow().error.clone()
    }

    /// Number of works currently accumulated
    pub fn len(&self) -> usize {
        self.tx.borrow().works.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start of a top-level request: previous error and results are discarded
    pub(crate) fn begin(&self) {
        self.tx.send_replace(FetchSnapshot {
            loading: true,
            error: None,
            works: Vec::new(),
        });
    }

    /// Append a page worth of works while a request is in progress
    pub(crate) fn extend(&self, works: &[Work]) {
        self.tx.send_modify(|s| s.works.extend_from_slice(works));
    }

    pub(crate) fn succeed(&self, works: Vec<Work>) {
        self.tx.send_modify(|s| {
            s.loading = false;
            s.error = None;
            s.works = works;
        });
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    /// Request dropped before completing
    pub(crate) fn abandon(&self) {
        self.tx.send_if_modified(|s| std::mem::replace(&mut s.loading, false));
    }
}
