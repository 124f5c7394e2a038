//! # TUI Adapter
//!
//! The ratatui-specific layer. Renders the pager's list, turns key presses
//! into selection movement, and reports the resulting scroll position back to
//! the pager so the next page loads as the cursor nears the end.
//!
//! This is the only module that knows about ratatui and crossterm.
//!
//! ## Screens
//!
//! Routing goes through a [`NavigationController`]:
//! - `list` (root): the paged items.
//! - `detail`: pretty-printed JSON of the selected item (Enter).
//! - `help` (modal): key bindings (`?`).
//!
//! Esc pops a screen; popping the root quits.

mod event;
mod ui;

use log::{info, warn};
use std::io::stdout;
use std::time::Duration;

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;

use crate::core::binding::ScrollEvent;
use crate::core::navigation::{Layout, NavigationController, NavigationError, Screen};
use crate::pager::Pager;
use crate::tui::event::{TuiEvent, poll_event_immediate, poll_event_timeout};

pub const LIST_SCREEN: &str = "list";
pub const DETAIL_SCREEN: &str = "detail";
pub const HELP_SCREEN: &str = "help";
const MAIN_STACK: &str = "MAIN_STACK";

/// Selection and scroll position within the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListCursor {
    pub selected: usize,
    /// First visible row.
    pub offset: usize,
    /// Rows visible at once (updated on every draw).
    pub viewport: usize,
}

impl ListCursor {
    /// Moves the selection by `delta` rows within `len` items and keeps it visible.
    pub fn move_by(&mut self, delta: isize, len: usize) {
        if len == 0 {
            *self = Self {
                viewport: self.viewport,
                ..Self::default()
            };
            return;
        }
        let target = self.selected as isize + delta;
        self.selected = target.clamp(0, len as isize - 1) as usize;
        self.follow_selection();
    }

    pub fn follow_selection(&mut self) {
        let viewport = self.viewport.max(1);
        if self.selected < self.offset {
            self.offset = self.selected;
        } else if self.selected >= self.offset + viewport {
            self.offset = self.selected + 1 - viewport;
        }
    }

    pub fn reset(&mut self) {
        self.selected = 0;
        self.offset = 0;
    }

    pub fn scroll_event(&self, len: usize) -> ScrollEvent {
        ScrollEvent {
            offset: self.offset,
            viewport: self.viewport.max(1),
            content: len,
        }
    }
}

/// TUI-specific presentation state (not part of core paging logic)
pub struct TuiState {
    pub cursor: ListCursor,
    pub nav: NavigationController,
    pub title: String,
}

impl TuiState {
    pub fn new(title: String) -> Self {
        Self {
            cursor: ListCursor::default(),
            nav: NavigationController::new(),
            title,
        }
    }
}

struct TerminalModeGuard;

impl TerminalModeGuard {
    fn new() -> std::io::Result<Self> {
        execute!(stdout(), EnableMouseCapture)?;
        info!("Terminal modes enabled (mouse)");
        Ok(Self)
    }
}

impl Drop for TerminalModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), DisableMouseCapture);
        ratatui::restore();
    }
}

/// Applies one event. Returns `false` when the app should quit.
fn handle_event(event: TuiEvent, pager: &mut Pager, tui: &mut TuiState) -> bool {
    let len = pager.state().items.len();
    let on_list = tui.nav.current_screen() == Some(LIST_SCREEN);
    let page = tui.cursor.viewport.max(1) as isize;

    let moved = match event {
        TuiEvent::Quit => return false,
        TuiEvent::Back => {
            return match tui.nav.pop() {
                Ok(()) => true,
                Err(NavigationError::AtRoot) => false,
                Err(e) => {
                    warn!("Navigation error: {e}");
                    false
                }
            };
        }
        TuiEvent::Help => {
            if tui.nav.current_screen() != Some(HELP_SCREEN)
                && let Err(e) = tui.nav.show_modal(Layout::Screen(Screen::new(HELP_SCREEN)))
            {
                warn!("Could not open help: {e}");
            }
            false
        }
        TuiEvent::Open if on_list => {
            if let Some(item) = pager.state().items.get(tui.cursor.selected) {
                let screen = Screen::new(DETAIL_SCREEN).with_props(item.clone());
                if let Err(e) = tui.nav.push(screen) {
                    warn!("Could not open detail: {e}");
                }
            }
            false
        }
        TuiEvent::Refresh if on_list => {
            tui.cursor.reset();
            pager.refresh();
            false
        }
        TuiEvent::Retry if on_list => {
            pager.retry();
            false
        }
        TuiEvent::Up if on_list => {
            tui.cursor.move_by(-1, len);
            true
        }
        TuiEvent::Down if on_list => {
            tui.cursor.move_by(1, len);
            true
        }
        TuiEvent::PageUp if on_list => {
            tui.cursor.move_by(-page, len);
            true
        }
        TuiEvent::PageDown if on_list => {
            tui.cursor.move_by(page, len);
            true
        }
        TuiEvent::Home if on_list => {
            tui.cursor.move_by(-(len as isize), len);
            true
        }
        TuiEvent::End if on_list => {
            tui.cursor.move_by(len as isize, len);
            true
        }
        _ => false,
    };

    if moved {
        pager.scroll(tui.cursor.scroll_event(len));
    }
    true
}

pub fn run(mut pager: Pager, title: String) -> std::io::Result<()> {
    let mut tui = TuiState::new(title);
    if let Err(e) = tui.nav.init(MAIN_STACK, Layout::Screen(Screen::new(LIST_SCREEN))) {
        warn!("Navigation init failed: {e}");
    }

    let mut terminal = ratatui::init();
    let _terminal_mode_guard = TerminalModeGuard::new()?;

    pager.mount();
    let mut needs_redraw = true;

    loop {
        if pager.try_settle() {
            needs_redraw = true;
            // A short first page may not fill the screen; keep pulling until it does.
            let len = pager.state().items.len();
            if len < tui.cursor.viewport {
                pager.scroll(tui.cursor.scroll_event(len));
            }
        }

        if needs_redraw {
            terminal.draw(|f| ui::draw_ui(f, &pager, &mut tui))?;
            needs_redraw = false;
        }

        // Short poll while a fetch is in flight so results show promptly
        let timeout = if pager.state().loading() {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(250)
        };

        let first_event = poll_event_timeout(timeout);
        if first_event.is_some() {
            needs_redraw = true;
        }
        let mut should_quit = false;
        for event in first_event
            .into_iter()
            .chain(std::iter::from_fn(poll_event_immediate))
        {
            if !handle_event(event, &mut pager, &mut tui) {
                should_quit = true;
                break;
            }
        }
        if should_quit {
            break;
        }
    }

    pager.unmount();
    tui.nav.teardown();
    info!("TUI exited");
    Ok(())
}
