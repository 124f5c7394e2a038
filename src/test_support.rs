//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Notify;

use crate::source::{Cursor, FetchRequest, Page, PageSource, SourceError};

/// Serves `total` numbered items (`{"id": n}`) in pages of `page_size`.
pub struct ScriptedSource {
    total: u32,
    page_size: u32,
    calls: AtomicUsize,
    fail: Mutex<Option<SourceError>>,
}

impl ScriptedSource {
    pub fn paged(total: u32, page_size: u32) -> Self {
        Self {
            total,
            page_size,
            calls: AtomicUsize::new(0),
            fail: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next fetch fails with `error`; later ones succeed again.
    pub fn fail_next(&self, error: SourceError) {
        *self.fail.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(
        &self,
        _request: &FetchRequest,
        cursor: &Cursor,
        _limit: Option<u32>,
    ) -> Result<Page, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail.lock().unwrap().take() {
            return Err(error);
        }
        let start = (cursor.page * self.page_size).min(self.total);
        let end = (start + self.page_size).min(self.total);
        Ok(Page {
            items: (start..end).map(|i| json!({ "id": i })).collect(),
            page_count: Some(self.total.div_ceil(self.page_size).max(1)),
            after: None,
        })
    }
}

/// Holds every fetch until `release()` is called.
pub struct GatedSource {
    calls: AtomicUsize,
    started: Notify,
    gate: Notify,
}

impl GatedSource {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            gate: Notify::new(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once `n` fetches have started.
    pub async fn wait_started(&self, n: usize) {
        while self.calls() < n {
            self.started.notified().await;
        }
    }

    /// Lets one held fetch complete.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl PageSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch_page(
        &self,
        _request: &FetchRequest,
        cursor: &Cursor,
        _limit: Option<u32>,
    ) -> Result<Page, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        self.gate.notified().await;
        Ok(Page {
            items: vec![json!({ "id": format!("remote-{}", cursor.page) })],
            page_count: Some(5),
            after: None,
        })
    }
}
