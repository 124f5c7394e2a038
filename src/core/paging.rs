//! # Paging State Machine
//!
//! Everything that can happen to a paged list becomes an [`Action`]. The
//! [`update`] reducer applies it to [`PageState`] and returns an [`Effect`]
//! describing the fetch to start, if any. No I/O happens here; the
//! [`Pager`](crate::pager::Pager) runs effects and feeds completions back in.
//!
//! ```text
//!            FetchNext / Reload              PageLoaded
//!   Idle ─────────────────────────► Loading ───────────► Success
//!    ▲                                │  ▲                  │
//!    │ Cancel                         │  └──── FetchNext ───┘
//!    └────────────────────────────────┤          Reload
//!                                     │ PageFailed
//!                                     ▼
//!                                   Error ──── Retry / Reload ──► Loading
//! ```
//!
//! Every issued fetch carries a generation number. Completions whose
//! generation is not the current one are dropped, which is what makes
//! cancellation and request replacement safe against late responses.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{Map, Value};

use crate::core::item::{Item, KeyPath, merge_patch};
use crate::source::{Cursor, Page, SourceError};

pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Error,
}

/// What a fetch was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Next,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Backend,
    Parse,
    Config,
}

/// A fetch failure as stored in state and shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct PageError {
    pub kind: ErrorKind,
    /// User-facing message (mapped through `on_error` or the default).
    pub message: String,
    /// Raw error text, for logs and detail views.
    pub detail: String,
    pub retryable: bool,
    /// The fetch that failed; retry repeats it.
    pub during: FetchKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageState {
    /// Pages loaded so far in this cycle.
    pub page: u32,
    /// Total pages reported by the backend. Never below 1.
    pub page_count: u32,
    pub items: Vec<Item>,
    pub phase: Phase,
    pub error: Option<PageError>,
    pub first_fetch_done: bool,
    /// Identity of the outstanding (or most recent) fetch.
    pub generation: u64,
    /// Keyset cursor handed back by the last page.
    pub after: Option<Item>,
    pub in_flight: Option<FetchKind>,
    pub last_loaded: Option<DateTime<Utc>>,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new()
    }
}

impl PageState {
    pub fn new() -> Self {
        Self {
            page: 0,
            page_count: 1,
            items: Vec::new(),
            phase: Phase::Idle,
            error: None,
            first_fetch_done: false,
            generation: 0,
            after: None,
            in_flight: None,
            last_loaded: None,
        }
    }

    /// A finished single-page state holding `items`, for lists that never fetch.
    pub fn seeded(items: Vec<Item>) -> Self {
        Self {
            page: 1,
            items,
            phase: Phase::Success,
            first_fetch_done: true,
            ..Self::new()
        }
    }

    pub fn loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn has_more(&self) -> bool {
        self.page < self.page_count
    }

    pub fn cursor(&self) -> Cursor {
        Cursor {
            page: self.page,
            after: self.after.clone(),
        }
    }
}

type TransformFn = dyn Fn(Item) -> Item + Send + Sync;
type ErrorMapFn = dyn Fn(&SourceError) -> String + Send + Sync;

/// Caller-supplied knobs the reducer consults.
#[derive(Clone)]
pub struct PagingOptions {
    /// Disabled paging means one fetch returns everything.
    pub paging: bool,
    pub key_path: KeyPath,
    pub transform: Option<Arc<TransformFn>>,
    pub on_error: Option<Arc<ErrorMapFn>>,
    pub default_error_message: String,
}

impl Default for PagingOptions {
    fn default() -> Self {
        Self {
            paging: true,
            key_path: KeyPath::default(),
            transform: None,
            on_error: None,
            default_error_message: DEFAULT_ERROR_MESSAGE.to_string(),
        }
    }
}

impl fmt::Debug for PagingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingOptions")
            .field("paging", &self.paging)
            .field("key_path", &self.key_path)
            .field("transform", &self.transform.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("default_error_message", &self.default_error_message)
            .finish()
    }
}

impl PagingOptions {
    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Item) -> Item + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub fn with_error_mapper<F>(mut self, f: F) -> Self
    where
        F: Fn(&SourceError) -> String + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn to_page_error(&self, error: &SourceError, during: FetchKind) -> PageError {
        let kind = match error {
            SourceError::Network(_) => ErrorKind::Transport,
            SourceError::Backend { .. } => ErrorKind::Backend,
            SourceError::Parse(_) => ErrorKind::Parse,
            SourceError::Config(_) | SourceError::Cancelled => ErrorKind::Config,
        };
        let message = match &self.on_error {
            Some(map) => map(error),
            None => self.default_error_message.clone(),
        };
        PageError {
            kind,
            message,
            detail: error.to_string(),
            retryable: error.is_retryable(),
            during,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    FetchNext,
    Reload,
    Retry,
    PageLoaded { generation: u64, page: Page },
    PageFailed { generation: u64, error: SourceError },
    Insert(Item),
    Update { key: Value, patch: Map<String, Value> },
    Remove { key: Value },
    Cancel,
}

/// Work the driver must perform after an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    Fetch {
        generation: u64,
        cursor: Cursor,
        kind: FetchKind,
    },
}

fn start_fetch(state: &mut PageState, kind: FetchKind) -> Effect {
    state.generation += 1;
    state.phase = Phase::Loading;
    state.error = None;
    state.in_flight = Some(kind);
    Effect::Fetch {
        generation: state.generation,
        cursor: state.cursor(),
        kind,
    }
}

fn start_reload(state: &mut PageState) -> Effect {
    state.page = 0;
    state.items.clear();
    state.after = None;
    start_fetch(state, FetchKind::Reload)
}

pub fn update(state: &mut PageState, action: Action, options: &PagingOptions) -> Effect {
    match action {
        Action::FetchNext => {
            if state.loading() {
                debug!("FetchNext dropped: fetch already in flight");
                return Effect::None;
            }
            if state.phase == Phase::Error {
                debug!("FetchNext dropped: waiting for retry");
                return Effect::None;
            }
            if !state.has_more() {
                debug!(
                    "FetchNext dropped: exhausted ({}/{})",
                    state.page, state.page_count
                );
                return Effect::None;
            }
            start_fetch(state, FetchKind::Next)
        }
        Action::Reload => {
            if state.loading() {
                debug!("Reload dropped: fetch already in flight");
                return Effect::None;
            }
            start_reload(state)
        }
        Action::Retry => {
            if state.phase != Phase::Error {
                return Effect::None;
            }
            let Some(during) = state.error.as_ref().map(|e| e.during) else {
                return Effect::None;
            };
            match during {
                FetchKind::Reload => start_reload(state),
                FetchKind::Next => start_fetch(state, FetchKind::Next),
            }
        }
        Action::PageLoaded { generation, page } => {
            if generation != state.generation || !state.loading() {
                debug!(
                    "Stale page dropped (generation {generation}, current {})",
                    state.generation
                );
                return Effect::None;
            }
            let new_items = page.items.into_iter().map(|item| match &options.transform {
                Some(transform) => transform(item),
                None => item,
            });
            state.items.extend(new_items);
            state.page += 1;
            state.page_count = if options.paging {
                page.page_count.unwrap_or(state.page_count).max(1)
            } else {
                1
            };
            // An empty page carries no cursor; keep the last one
            if page.after.is_some() {
                state.after = page.after;
            }
            state.phase = Phase::Success;
            state.error = None;
            state.first_fetch_done = true;
            state.in_flight = None;
            state.last_loaded = Some(Utc::now());
            Effect::None
        }
        Action::PageFailed { generation, error } => {
            if generation != state.generation || !state.loading() {
                debug!("Stale failure dropped (generation {generation})");
                return Effect::None;
            }
            let during = state.in_flight.take().unwrap_or(FetchKind::Next);
            if error == SourceError::Cancelled {
                state.phase = Phase::Idle;
                return Effect::None;
            }
            state.phase = Phase::Error;
            state.error = Some(options.to_page_error(&error, during));
            state.first_fetch_done = true;
            Effect::None
        }
        Action::Insert(item) => {
            state.items.push(item);
            Effect::None
        }
        Action::Update { key, patch } => {
            if let Some(item) = state
                .items
                .iter_mut()
                .find(|item| options.key_path.matches(item, &key))
            {
                merge_patch(item, patch);
            }
            Effect::None
        }
        Action::Remove { key } => {
            if let Some(index) = state
                .items
                .iter()
                .position(|item| options.key_path.matches(item, &key))
            {
                state.items.remove(index);
            }
            Effect::None
        }
        Action::Cancel => {
            state.generation += 1;
            if state.loading() {
                state.phase = Phase::Idle;
            }
            state.in_flight = None;
            Effect::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(ids: std::ops::Range<u32>, page_count: u32) -> Page {
        Page {
            items: ids.map(|i| json!({"id": i})).collect(),
            page_count: Some(page_count),
            after: None,
        }
    }

    fn loaded(state: &mut PageState, options: &PagingOptions, p: Page) {
        let effect = update(state, Action::FetchNext, options);
        let Effect::Fetch { generation, .. } = effect else {
            panic!("expected fetch, got {effect:?}");
        };
        update(state, Action::PageLoaded { generation, page: p }, options);
    }

    #[test]
    fn test_new_state_defaults() {
        let state = PageState::new();
        assert_eq!(state.page, 0);
        assert_eq!(state.page_count, 1);
        assert!(state.items.is_empty());
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.has_more());
    }

    #[test]
    fn test_seeded_state_is_complete() {
        let state = PageState::seeded(vec![json!({"id": 1})]);
        assert_eq!(state.phase, Phase::Success);
        assert!(state.first_fetch_done);
        assert!(!state.has_more());

        let mut state = state;
        let effect = update(&mut state, Action::FetchNext, &PagingOptions::default());
        assert_eq!(effect, Effect::None);
    }

    #[test]
    fn test_pages_accumulate_in_order() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..10, 3));
        loaded(&mut state, &options, page(10..20, 3));
        loaded(&mut state, &options, page(20..25, 3));

        assert_eq!(state.items.len(), 25);
        let ids: Vec<u64> = state.items.iter().map(|i| i["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, (0..25).collect::<Vec<_>>());
        assert_eq!(state.page, 3);
        assert!(!state.has_more());
        assert_eq!(update(&mut state, Action::FetchNext, &options), Effect::None);
    }

    #[test]
    fn test_fetch_while_loading_is_dropped() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        assert!(matches!(
            update(&mut state, Action::FetchNext, &options),
            Effect::Fetch { .. }
        ));
        assert_eq!(update(&mut state, Action::FetchNext, &options), Effect::None);
        assert_eq!(update(&mut state, Action::Reload, &options), Effect::None);
    }

    #[test]
    fn test_page_increments_only_on_success() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        let Effect::Fetch { generation, cursor, .. } =
            update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        assert_eq!(cursor.page, 0);
        assert_eq!(state.page, 0);
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Network("down".into()),
            },
            &options,
        );
        assert_eq!(state.page, 0);
        assert_eq!(state.phase, Phase::Error);
    }

    #[test]
    fn test_reload_resets_cursor_and_items() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..10, 3));
        state.after = Some(json!({"id": 9}));

        let effect = update(&mut state, Action::Reload, &options);
        assert!(state.items.is_empty());
        assert_eq!(state.page, 0);
        assert!(state.after.is_none());
        let Effect::Fetch { cursor, kind, .. } = effect else {
            panic!("expected fetch");
        };
        assert_eq!(cursor, Cursor::default());
        assert_eq!(kind, FetchKind::Reload);
    }

    #[test]
    fn test_empty_page_keeps_keyset_cursor() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        let mut first = page(0..10, 3);
        first.after = Some(json!({"id": 9}));
        loaded(&mut state, &options, first);

        loaded(&mut state, &options, page(0..0, 3));
        assert!(state.has_more());
        assert_eq!(state.after, Some(json!({"id": 9})));

        let Effect::Fetch { cursor, .. } = update(&mut state, Action::FetchNext, &options) else {
            panic!("expected fetch");
        };
        assert_eq!(cursor.after, Some(json!({"id": 9})));
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        let Effect::Fetch { generation, .. } = update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        update(&mut state, Action::Cancel, &options);
        let before = state.clone();
        update(
            &mut state,
            Action::PageLoaded {
                generation,
                page: page(0..10, 1),
            },
            &options,
        );
        assert_eq!(state, before);
    }

    #[test]
    fn test_cancelled_error_is_swallowed() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        let Effect::Fetch { generation, .. } = update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Cancelled,
            },
            &options,
        );
        assert_eq!(state.phase, Phase::Idle);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_error_uses_mapper_or_default() {
        let mut state = PageState::new();
        let options = PagingOptions::default();
        let Effect::Fetch { generation, .. } = update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Backend {
                    status: Some(500),
                    message: "boom".into(),
                },
            },
            &options,
        );
        let error = state.error.clone().unwrap();
        assert_eq!(error.message, DEFAULT_ERROR_MESSAGE);
        assert_eq!(error.kind, ErrorKind::Backend);
        assert!(error.detail.contains("boom"));

        let options = PagingOptions::default().with_error_mapper(|e| format!("mapped: {e}"));
        let mut state = PageState::new();
        let Effect::Fetch { generation, .. } = update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Network("timeout".into()),
            },
            &options,
        );
        let error = state.error.unwrap();
        assert_eq!(error.message, "mapped: network error: timeout");
        assert_eq!(error.kind, ErrorKind::Transport);
        assert!(error.retryable);
    }

    #[test]
    fn test_retry_keeps_items_after_next_page_failure() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..10, 3));
        let Effect::Fetch { generation, .. } = update(&mut state, Action::FetchNext, &options)
        else {
            panic!("expected fetch");
        };
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Network("reset".into()),
            },
            &options,
        );
        assert_eq!(update(&mut state, Action::FetchNext, &options), Effect::None);

        let Effect::Fetch { cursor, kind, .. } = update(&mut state, Action::Retry, &options) else {
            panic!("expected fetch");
        };
        assert_eq!(kind, FetchKind::Next);
        assert_eq!(cursor.page, 1);
        assert_eq!(state.items.len(), 10);
    }

    #[test]
    fn test_retry_after_failed_reload_reloads() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..10, 3));
        let Effect::Fetch { generation, .. } = update(&mut state, Action::Reload, &options) else {
            panic!("expected fetch");
        };
        update(
            &mut state,
            Action::PageFailed {
                generation,
                error: SourceError::Network("reset".into()),
            },
            &options,
        );
        let Effect::Fetch { kind, cursor, .. } = update(&mut state, Action::Retry, &options) else {
            panic!("expected fetch");
        };
        assert_eq!(kind, FetchKind::Reload);
        assert_eq!(cursor.page, 0);
    }

    #[test]
    fn test_retry_without_error_is_noop() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        assert_eq!(update(&mut state, Action::Retry, &options), Effect::None);
    }

    #[test]
    fn test_transform_applies_to_new_items() {
        let options = PagingOptions::default().with_transform(|mut item| {
            item["seen"] = json!(true);
            item
        });
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..2, 1));
        assert!(state.items.iter().all(|i| i["seen"] == json!(true)));
    }

    #[test]
    fn test_paging_disabled_forces_single_page() {
        let options = PagingOptions {
            paging: false,
            ..Default::default()
        };
        let mut state = PageState::new();
        loaded(&mut state, &options, page(0..30, 9));
        assert_eq!(state.page_count, 1);
        assert!(!state.has_more());
    }

    #[test]
    fn test_update_by_key() {
        let options = PagingOptions::default();
        let mut state = PageState::new();
        state.items = vec![json!({"id": 1, "name": "a", "n": 1}), json!({"id": 2, "name": "b"})];

        let before = state.items.clone();
        update(
            &mut state,
            Action::Update {
                key: json!(99),
                patch: json!({"name": "z"}).as_object().cloned().unwrap(),
            },
            &options,
        );
        assert_eq!(state.items, before);

        update(
            &mut state,
            Action::Update {
                key: json!(1),
                patch: json!({"name": "z"}).as_object().cloned().unwrap(),
            },
            &options,
        );
        assert_eq!(state.items[0], json!({"id": 1, "name": "z", "n": 1}));
        assert_eq!(state.items[1], json!({"id": 2, "name": "b"}));
    }

    #[test]
    fn test_insert_and_remove_by_key() {
        let options = PagingOptions {
            key_path: KeyPath::new("meta.uid"),
            ..Default::default()
        };
        let mut state = PageState::new();
        update(&mut state, Action::Insert(json!({"meta": {"uid": "a"}})), &options);
        update(&mut state, Action::Insert(json!({"meta": {"uid": "b"}})), &options);
        update(&mut state, Action::Remove { key: json!("zzz") }, &options);
        assert_eq!(state.items.len(), 2);
        update(&mut state, Action::Remove { key: json!("a") }, &options);
        assert_eq!(state.items, vec![json!({"meta": {"uid": "b"}})]);
    }
}
