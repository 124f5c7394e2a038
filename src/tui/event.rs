use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind};

/// TUI-specific input events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuiEvent {
    Quit,
    Back,
    Open,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,
    Refresh,
    Retry,
    Help,
    Resize,
}

/// Poll for an event without blocking (returns immediately)
pub fn poll_event_immediate() -> Option<TuiEvent> {
    poll_event_timeout(std::time::Duration::ZERO)
}

pub fn poll_event_timeout(timeout: std::time::Duration) -> Option<TuiEvent> {
    if !event::poll(timeout).ok()? {
        return None;
    }
    match event::read().ok()? {
        Event::Key(key_event) if key_event.kind != KeyEventKind::Release => {
            log::debug!(
                "Key event: {:?} with modifiers {:?}",
                key_event.code,
                key_event.modifiers
            );
            match (key_event.modifiers, key_event.code) {
                (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(TuiEvent::Quit),
                (_, KeyCode::Char('q')) => Some(TuiEvent::Quit),
                (_, KeyCode::Esc | KeyCode::Backspace) => Some(TuiEvent::Back),
                (_, KeyCode::Enter) => Some(TuiEvent::Open),
                (_, KeyCode::Up | KeyCode::Char('k')) => Some(TuiEvent::Up),
                (_, KeyCode::Down | KeyCode::Char('j')) => Some(TuiEvent::Down),
                (_, KeyCode::PageUp) => Some(TuiEvent::PageUp),
                (_, KeyCode::PageDown | KeyCode::Char(' ')) => Some(TuiEvent::PageDown),
                (_, KeyCode::Home | KeyCode::Char('g')) => Some(TuiEvent::Home),
                (_, KeyCode::End | KeyCode::Char('G')) => Some(TuiEvent::End),
                (_, KeyCode::Char('r')) => Some(TuiEvent::Refresh),
                (_, KeyCode::Char('t')) => Some(TuiEvent::Retry),
                (_, KeyCode::Char('?')) => Some(TuiEvent::Help),
                _ => None,
            }
        }
        Event::Mouse(mouse_event) => match mouse_event.kind {
            MouseEventKind::ScrollUp => Some(TuiEvent::Up),
            MouseEventKind::ScrollDown => Some(TuiEvent::Down),
            _ => None,
        },
        Event::Resize(_, _) => Some(TuiEvent::Resize),
        _ => None,
    }
}
