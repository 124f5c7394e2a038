use crate::core::binding::Footer;
use crate::core::item::summarize;
use crate::pager::Pager;
use crate::tui::{DETAIL_SCREEN, HELP_SCREEN, TuiState};

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Paragraph, Wrap};
use serde_json::Value;
use unicode_width::UnicodeWidthChar;

const HELP_TEXT: &[(&str, &str)] = &[
    ("↑/k ↓/j", "move selection"),
    ("PgUp PgDn", "move one screen"),
    ("g / G", "first / last loaded item"),
    ("Enter", "open item"),
    ("r", "refresh from the first page"),
    ("t", "retry the failed fetch"),
    ("Esc", "back (quits from the list)"),
    ("q", "quit"),
];

pub fn draw_ui(frame: &mut Frame, pager: &Pager, tui: &mut TuiState) {
    use Constraint::{Length, Min};
    let layout = Layout::vertical([Length(1), Min(0), Length(1)]);
    let [title_area, main_area, footer_area] = layout.areas(frame.area());

    frame.render_widget(Span::raw(title_text(pager, tui)), title_area);

    // The help modal floats over whatever screen opened it
    let showing_help = tui.nav.current_screen() == Some(HELP_SCREEN);
    if base_screen(tui) == Some(DETAIL_SCREEN) {
        draw_detail(frame, main_area, tui);
    } else {
        draw_list(frame, main_area, pager, tui);
    }
    draw_footer(frame, footer_area, pager);

    if showing_help {
        draw_help(frame, main_area);
    }
}

/// The screen drawn in the main area: the one under the help modal, if open.
fn base_screen(tui: &TuiState) -> Option<&str> {
    if tui.nav.current_screen() == Some(HELP_SCREEN) {
        tui.nav.previous_screen()
    } else {
        tui.nav.current_screen()
    }
}

/// Props of the detail screen, looked up in the main stack while help covers it.
fn detail_props(tui: &TuiState) -> Option<&Value> {
    if tui.nav.current_screen() == Some(HELP_SCREEN) {
        let nav = &tui.nav;
        nav.stack_screens(nav.initial_stack()).last().map(|s| &s.props)
    } else {
        tui.nav.current_props()
    }
}

fn title_text(pager: &Pager, tui: &TuiState) -> String {
    let state = pager.state();
    let mut title = format!(
        "{} | page {}/{} | {} items",
        tui.title,
        state.page,
        state.page_count,
        state.items.len()
    );
    if let Some(loaded) = state.last_loaded {
        title.push_str(&format!(" | loaded {}", loaded.format("%H:%M:%S")));
    }
    title
}

fn draw_list(frame: &mut Frame, area: Rect, pager: &Pager, tui: &mut TuiState) {
    let block = Block::bordered().title("Items");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    tui.cursor.viewport = inner.height as usize;
    tui.cursor.follow_selection();

    let view = pager.view();
    let key_path = &pager.options().key_path;
    let width = inner.width as usize;
    let lines: Vec<Line> = view
        .items
        .iter()
        .enumerate()
        .skip(tui.cursor.offset)
        .take(tui.cursor.viewport)
        .map(|(i, item)| {
            let text = truncate(&summarize(item, key_path), width);
            if i == tui.cursor.selected {
                Line::styled(
                    text,
                    Style::default()
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                Line::raw(text)
            }
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn draw_detail(frame: &mut Frame, area: Rect, tui: &TuiState) {
    let body = detail_props(tui)
        .map(|props| serde_json::to_string_pretty(props).unwrap_or_else(|_| props.to_string()))
        .unwrap_or_default();
    let paragraph = Paragraph::new(body)
        .block(Block::bordered().title("Item (Esc to go back)"))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn draw_footer(frame: &mut Frame, area: Rect, pager: &Pager) {
    let line = match pager.view().footer {
        Footer::Hidden => return,
        Footer::Loading => Line::styled("Loading…", Style::default().fg(Color::Yellow)),
        Footer::NoResults => Line::styled("No results", Style::default().add_modifier(Modifier::DIM)),
        Footer::Error { message, retryable } => {
            let hint = if retryable { " (t to retry)" } else { "" };
            Line::styled(format!("{message}{hint}"), Style::default().fg(Color::Red))
        }
    };
    frame.render_widget(Paragraph::new(line).alignment(Alignment::Center), area);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = HELP_TEXT
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!("{keys:<12}"), Style::default().fg(Color::Cyan)),
                Span::raw(*what),
            ])
        })
        .collect();

    let width = 44.min(area.width);
    let height = (HELP_TEXT.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title("Keys")),
        popup,
    );
}

/// Cuts `text` to at most `width` terminal columns.
fn truncate(text: &str, width: usize) -> String {
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out
}
