//! # Consumer Binding
//!
//! The glue between a scrolling list and the paging state machine. Decides
//! when a scroll should pull the next page and what the footer of the list
//! should show. Holds no network state of its own.

use crate::core::item::Item;
use crate::core::paging::PageState;

pub const DEFAULT_SCROLL_THRESHOLD: usize = 3;

/// Position of the viewport within the list, in whatever unit the consumer
/// scrolls by (rows for the terminal list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollEvent {
    /// First visible unit.
    pub offset: usize,
    /// Units visible at once.
    pub viewport: usize,
    /// Total units of content.
    pub content: usize,
}

impl ScrollEvent {
    pub fn distance_from_end(&self) -> usize {
        self.content
            .saturating_sub(self.offset.saturating_add(self.viewport))
    }
}

/// Scroll-proximity tracker for one list.
#[derive(Debug, Clone)]
pub struct ListBinding {
    threshold: usize,
    last_offset: usize,
}

impl Default for ListBinding {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLL_THRESHOLD)
    }
}

impl ListBinding {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            last_offset: 0,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// True when this scroll should trigger "fetch next page".
    ///
    /// Backward scrolls never trigger. Neither does anything while a fetch is
    /// in flight, after an error, or once every page is loaded.
    pub fn on_scroll(&mut self, event: ScrollEvent, state: &PageState) -> bool {
        let backward = event.offset < self.last_offset;
        self.last_offset = event.offset;
        if backward || state.loading() || state.error.is_some() || !state.has_more() {
            return false;
        }
        event.distance_from_end() <= self.threshold
    }

    /// Forget the scroll position (after a reload the list starts over).
    pub fn reset(&mut self) {
        self.last_offset = 0;
    }
}

/// What the list renders below (or instead of) its items.
#[derive(Debug, Clone, PartialEq)]
pub enum Footer<'a> {
    Hidden,
    Loading,
    Error { message: &'a str, retryable: bool },
    NoResults,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListView<'a> {
    pub items: &'a [Item],
    pub footer: Footer<'a>,
}

pub fn view(state: &PageState) -> ListView<'_> {
    let footer = if state.loading() {
        Footer::Loading
    } else if let Some(error) = &state.error {
        Footer::Error {
            message: &error.message,
            retryable: error.retryable,
        }
    } else if state.first_fetch_done && state.items.is_empty() {
        Footer::NoResults
    } else {
        Footer::Hidden
    };
    ListView {
        items: &state.items,
        footer,
    }
}
