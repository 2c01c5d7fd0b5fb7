//! Small stateless rendering primitives: badge, button, spinner.

use ratatui::{
    style::{Color, Modifier, Style},
    text::Span,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    Success,
    Warn,
    #[default]
    Muted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    #[default]
    Primary,
    Ghost,
    Outline,
}

const SPINNER_FRAMES: [&str; 4] = ["◐", "◓", "◑", "◒"];

/// Spinner glyph for the given animation frame
pub fn spinner(frame: u8) -> &'static str {
    SPINNER_FRAMES[frame as usize % SPINNER_FRAMES.len()]
}

pub fn spinner_len() -> u8 {
    SPINNER_FRAMES.len() as u8
}

pub fn badge(text: impl Into<String>, tone: Tone) -> Span<'static> {
    let style = match tone {
        Tone::Success => Style::default().fg(Color::Black).bg(Color::Green),
        Tone::Warn => Style::default().fg(Color::Black).bg(Color::Yellow),
        Tone::Muted => Style::default().fg(Color::White).bg(Color::DarkGray),
    };
    Span::styled(format!(" {} ", text.into()), style.add_modifier(Modifier::BOLD))
}

/// A clickable-looking label. While `loading` the label reads `Loading…` and is dimmed.
pub fn button(label: &str, variant: Variant, loading: bool) -> Span<'static> {
    let text = if loading { "Loading…" } else { label };

    let style = match variant {
        Variant::Primary => Style::default().fg(Color::Black).bg(Color::Cyan),
        Variant::Ghost => Style::default().fg(Color::Cyan),
        Variant::Outline => Style::default().fg(Color::White).add_modifier(Modifier::UNDERLINED),
    };
    let style = if loading {
        style.add_modifier(Modifier::DIM)
    } else {
        style
    };

    let content = match variant {
        Variant::Outline => format!("[{}]", text),
        Variant::Primary | Variant::Ghost => format!(" {} ", text),
    };
    Span::styled(content, style)
}
