//! # Pager
//!
//! Async driver around the paging reducer. Owns one [`PageState`], runs the
//! fetch effects the reducer asks for on spawned tasks, and applies their
//! completions in order.
//!
//! ```text
//!   fetch_next() ─► update() ─► Effect::Fetch ─► tokio::spawn(fetch_page)
//!                                                        │
//!   settle() / try_settle() ◄── Action::PageLoaded ◄─────┘ (mpsc)
//! ```
//!
//! Unmounting aborts the in-flight task and bumps the generation, so a result
//! that was already sent is dropped by the reducer instead of mutating state.

use std::sync::Arc;

use log::{debug, info};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::AbortHandle;

use crate::core::binding::{ListBinding, ListView, ScrollEvent, view};
use crate::core::item::Item;
use crate::core::paging::{Action, Effect, PageState, PagingOptions, update};
use crate::source::{FetchRequest, PageSource};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

type RefreshHook = Box<dyn FnMut() + Send>;
type ScrollHook = Box<dyn FnMut(&ScrollEvent) + Send>;

pub struct Pager {
    source: Arc<dyn PageSource>,
    request: FetchRequest,
    page_size: u32,
    options: PagingOptions,
    state: PageState,
    binding: ListBinding,
    tx: UnboundedSender<Action>,
    rx: UnboundedReceiver<Action>,
    in_flight: Option<AbortHandle>,
    mounted: bool,
    /// Seeded with fixed items; never fetches.
    fixed: bool,
    on_refresh: Option<RefreshHook>,
    on_scroll: Option<ScrollHook>,
}

impl Pager {
    pub fn new(source: Arc<dyn PageSource>, request: FetchRequest) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            source,
            request,
            page_size: DEFAULT_PAGE_SIZE,
            options: PagingOptions::default(),
            state: PageState::new(),
            binding: ListBinding::default(),
            tx,
            rx,
            in_flight: None,
            mounted: true,
            fixed: false,
            on_refresh: None,
            on_scroll: None,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_options(mut self, options: PagingOptions) -> Self {
        self.options = options;
        self
    }

    /// Shows `items` as the complete list. The source is never called;
    /// local edits (insert, update, remove) still apply.
    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.state = PageState::seeded(items);
        self.fixed = true;
        self
    }

    pub fn with_scroll_threshold(mut self, threshold: usize) -> Self {
        self.binding = ListBinding::new(threshold);
        self
    }

    /// Called on every pull-to-refresh, before the reload starts.
    pub fn on_refresh(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_refresh = Some(Box::new(hook));
        self
    }

    /// Called on every scroll event, whether or not it triggers a fetch.
    pub fn on_scroll(mut self, hook: impl FnMut(&ScrollEvent) + Send + 'static) -> Self {
        self.on_scroll = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn view(&self) -> ListView<'_> {
        view(&self.state)
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    pub fn options(&self) -> &PagingOptions {
        &self.options
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn dispatch(&mut self, action: Action) {
        if !self.mounted {
            debug!("Pager unmounted, dropping {action:?}");
            return;
        }
        let effect = update(&mut self.state, action, &self.options);
        self.run(effect);
    }

    fn run(&mut self, effect: Effect) {
        let Effect::Fetch {
            generation,
            cursor,
            kind,
        } = effect
        else {
            return;
        };

        let source = self.source.clone();
        let request = self.request.clone();
        let limit = self.options.paging.then_some(self.page_size);
        let tx = self.tx.clone();

        debug!(
            "Starting {kind:?} fetch via {} (generation {generation}, page {})",
            source.name(),
            cursor.page
        );

        let handle = tokio::spawn(async move {
            let action = match source.fetch_page(&request, &cursor, limit).await {
                Ok(page) => Action::PageLoaded { generation, page },
                Err(error) => Action::PageFailed { generation, error },
            };
            if tx.send(action).is_err() {
                debug!("Pager dropped before fetch {generation} completed");
            }
        });
        self.in_flight = Some(handle.abort_handle());
    }

    fn apply(&mut self, action: Action) {
        if !self.mounted {
            return;
        }
        update(&mut self.state, action, &self.options);
        if !self.state.loading() {
            self.in_flight = None;
        }
    }

    /// Initial load: same as a reload, issued once the consumer is ready.
    pub fn mount(&mut self) {
        info!("Pager mounted ({} request)", self.request.kind());
        self.mounted = true;
        self.binding.reset();
        if self.fixed {
            return;
        }
        self.dispatch(Action::Reload);
    }

    pub fn fetch_next(&mut self) {
        self.dispatch(Action::FetchNext);
    }

    pub fn reload(&mut self) {
        if self.fixed {
            debug!("Reload ignored: pager holds fixed items");
            return;
        }
        self.binding.reset();
        self.dispatch(Action::Reload);
    }

    pub fn retry(&mut self) {
        self.dispatch(Action::Retry);
    }

    /// Pull-to-refresh: notify the observer, then reload unless already loading.
    pub fn refresh(&mut self) {
        if let Some(hook) = self.on_refresh.as_mut() {
            hook();
        }
        if self.state.loading() {
            return;
        }
        self.reload();
    }

    /// Feeds a scroll position; fetches the next page when close to the end.
    pub fn scroll(&mut self, event: ScrollEvent) {
        if let Some(hook) = self.on_scroll.as_mut() {
            hook(&event);
        }
        if self.mounted && self.binding.on_scroll(event, &self.state) {
            self.fetch_next();
        }
    }

    /// Replaces the request. An unequal request cancels whatever is in flight
    /// and reloads from scratch. Returns whether a reload happened (never for
    /// a pager built [`with_items`](Self::with_items)).
    pub fn set_request(&mut self, request: FetchRequest) -> bool {
        if request == self.request || self.fixed {
            return false;
        }
        info!("Request changed ({} → {}), reloading", self.request.kind(), request.kind());
        self.abort_in_flight();
        self.dispatch(Action::Cancel);
        self.request = request;
        self.reload();
        true
    }

    pub fn insert(&mut self, item: Item) {
        self.dispatch(Action::Insert(item));
    }

    /// Merges `patch` into the item whose key equals `key`. Unknown keys are ignored.
    pub fn update(&mut self, key: Value, patch: Map<String, Value>) {
        self.dispatch(Action::Update { key, patch });
    }

    /// Like [`update`](Self::update), with the patch computed from the current record.
    pub fn update_with<F>(&mut self, key: Value, f: F)
    where
        F: FnOnce(&Item) -> Map<String, Value>,
    {
        let key_path = &self.options.key_path;
        let Some(current) = self.state.items.iter().find(|i| key_path.matches(i, &key)) else {
            return;
        };
        let patch = f(current);
        self.update(key, patch);
    }

    pub fn remove(&mut self, key: Value) {
        self.dispatch(Action::Remove { key });
    }

    /// Waits until the in-flight fetch (if any) has been applied.
    /// Returns `false` when nothing was in flight.
    pub async fn settle(&mut self) -> bool {
        if !self.mounted || !self.state.loading() {
            return false;
        }
        while self.state.loading() {
            let Some(action) = self.rx.recv().await else {
                return false;
            };
            self.apply(action);
        }
        true
    }

    /// Applies every completion already delivered, without waiting.
    /// Returns whether anything was applied.
    pub fn try_settle(&mut self) -> bool {
        let mut applied = false;
        while let Ok(action) = self.rx.try_recv() {
            self.apply(action);
            applied = true;
        }
        applied
    }

    fn abort_in_flight(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }

    /// Cancels any in-flight fetch and freezes the state. Late completions are no-ops.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        info!("Pager unmounted");
        self.abort_in_flight();
        update(&mut self.state, Action::Cancel, &self.options);
        self.mounted = false;
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        self.abort_in_flight();
    }
}
