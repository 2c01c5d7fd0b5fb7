use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use fitcoach_core::ChatRole;
use crate::app::{App, InputMode};
use crate::widgets::{self, Tone, Variant};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [chat_panel, sidebar] = Layout::horizontal([
        Constraint::Percentage(65),
        Constraint::Percentage(35),
    ])
    .areas(body_area);

    render_chat_panel(app, frame, chat_panel);
    render_sidebar(app, frame, sidebar);
    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }

    render_toast(app, frame, body_area);
}

fn render_header(app: &mut App, frame: &mut Frame, area: Rect) {
    let queries = app.console.queries();
    let models = queries.models.state();
    let context = queries.context.state();

    let models_badge = if models.is_loading() {
        widgets::badge(
            format!("{} Loading models", widgets::spinner(app.animation_frame)),
            Tone::Muted,
        )
    } else if models.error.is_some() && models.data.is_none() {
        widgets::badge("models unavailable", Tone::Warn)
    } else {
        let count = models.data.as_ref().map(|m| m.len()).unwrap_or(0);
        widgets::badge(format!("{} models", count), Tone::Success)
    };

    let context_badge = if context.is_fetching {
        widgets::badge("Context …", Tone::Muted)
    } else if context.error.is_some() {
        widgets::badge("Context error", Tone::Warn)
    } else {
        widgets::badge("Context ready", Tone::Muted)
    };

    let title = Span::styled(" fitcoach ", Style::default().fg(Color::Cyan).bold());
    let version = Span::styled(
        format!("v{} ", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    );
    let base = Span::styled(format!("{} ", app.api_base), Style::default().fg(Color::Gray));

    // Remember where the context badge lands so a click can refresh it
    let badge_x = area.x
        + (title.width() + version.width() + base.width() + models_badge.width() + 1) as u16;
    app.context_badge_area = Some(Rect::new(
        badge_x.min(area.x + area.width),
        area.y,
        (context_badge.width() as u16).min(area.width.saturating_sub(badge_x - area.x)),
        1,
    ));

    let line = Line::from(vec![
        title,
        version,
        base,
        models_badge,
        Span::raw(" "),
        context_badge,
    ]);

    let header = Paragraph::new(line).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = vec![Span::styled(mode_text, mode_style)];

    if app.show_model_picker {
        hints.extend(vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" select ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ]);
    } else {
        match app.input_mode {
            InputMode::Editing => hints.extend(vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" ^T ", key_style),
                Span::styled(" ask via MCP ", label_style),
                Span::styled(" ^F ", key_style),
                Span::styled(" fitness_summary ", label_style),
                Span::styled(" ^R ", key_style),
                Span::styled(" refresh ", label_style),
                Span::styled(" ^O ", key_style),
                Span::styled(" context ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" normal ", label_style),
            ]),
            InputMode::Normal => hints.extend(vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" compose ", label_style),
                Span::styled(" m ", key_style),
                Span::styled(" model ", label_style),
                Span::styled(" c ", key_style),
                Span::styled(" context ", label_style),
                Span::styled(" r ", key_style),
                Span::styled(" refresh ", label_style),
                Span::styled(" f ", key_style),
                Span::styled(" summary ", label_style),
                Span::styled(" x ", key_style),
                Span::styled(" dismiss ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]),
        }
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_chat_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let [controls_area, chat_area, input_area, buttons_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    // Model + include-context line
    let model_label = app
        .console
        .selected_model()
        .map(|name| {
            app.console
                .models()
                .iter()
                .find(|m| m.name == name)
                .map(|m| m.label().to_string())
                .unwrap_or_else(|| name.to_string())
        })
        .unwrap_or_else(|| "no model".to_string());
    let checkbox = if app.console.include_context() { "[x]" } else { "[ ]" };
    let controls = Line::from(vec![
        Span::styled(" Model: ", Style::default().fg(Color::Gray)),
        Span::styled(format!("{} ▼", model_label), Style::default().fg(Color::Green).bold()),
        Span::raw("   "),
        Span::styled(format!("{} Include context", checkbox), Style::default().fg(Color::Gray)),
        Span::raw("   "),
        widgets::button("Refresh context", Variant::Outline, app.console.queries().context.is_fetching()),
    ]);
    frame.render_widget(Paragraph::new(controls), controls_area);

    // Store areas for mouse hit-testing and scroll calculations (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_border_color = if app.input_mode == InputMode::Normal {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(chat_border_color))
        .title(" Conversation ");

    let sending = app.console.is_sending();
    let chat_text = if app.console.messages().is_empty() && !sending {
        Text::from(Span::styled(
            "Ask about your training, recovery, or anything…",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in app.console.messages() {
            let role_style = match msg.role {
                ChatRole::User => Style::default().fg(Color::Cyan),
                ChatRole::Assistant => Style::default().fg(Color::Yellow),
                ChatRole::Error => Style::default().fg(Color::Red),
            }
            .add_modifier(Modifier::BOLD);

            let header = match &msg.model {
                Some(model) => format!("{} · {}", msg.role.as_str(), model),
                None => msg.role.as_str().to_string(),
            };
            lines.push(Line::from(Span::styled(header, role_style)));

            for line in msg.text.lines() {
                match msg.role {
                    ChatRole::Assistant => lines.push(parse_markdown_line(line)),
                    ChatRole::Error => lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Red),
                    ))),
                    ChatRole::User => lines.push(Line::from(line.to_string())),
                }
            }
            lines.push(Line::default());
        }

        if sending {
            lines.push(Line::from(Span::styled(
                "assistant",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(Span::styled(
                format!("{} Thinking…", widgets::spinner(app.animation_frame)),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    // Composer - highlight when editing
    let input_border_color = if app.input_mode == InputMode::Editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(input_border_color))
        .title(" Prompt ");

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .console
        .draft()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);
    frame.render_widget(input, input_area);

    if app.input_mode == InputMode::Editing && !app.show_model_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }

    let buttons = Line::from(vec![
        Span::raw(" "),
        widgets::button("Send to Gemini", Variant::Primary, app.console.is_chat_pending()),
        Span::raw("  "),
        widgets::button("Ask via MCP", Variant::Ghost, app.console.is_ask_pending()),
    ]);
    frame.render_widget(Paragraph::new(buttons), buttons_area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect) {
    let [context_area, tools_area, models_area] = Layout::vertical([
        Constraint::Percentage(45),
        Constraint::Percentage(30),
        Constraint::Percentage(25),
    ])
    .areas(area);

    render_context_card(app, frame, context_area);
    render_tools_card(app, frame, tools_area);
    render_models_card(app, frame, models_area);
}

fn card(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", title))
}

fn render_context_card(app: &App, frame: &mut Frame, area: Rect) {
    let state = app.console.queries().context.state();
    let block = card("Context");

    if state.is_loading() {
        let loading = Paragraph::new(format!("{} loading context", widgets::spinner(app.animation_frame)))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(loading, area);
        return;
    }

    let mut lines = vec![Line::from(Span::styled(
        app.console.context_summary(),
        Style::default().fg(Color::White),
    ))];

    if let Some(context) = &state.data {
        if !context.messages.is_empty() {
            lines.push(Line::from(Span::styled(
                context.messages.join(" | "),
                Style::default().fg(Color::Gray),
            )));
        }
        let details = context.detail_lines();
        if !details.is_empty() {
            lines.push(Line::default());
            lines.extend(details.into_iter().map(Line::from));
        }
    }

    if let Some(error) = &state.error {
        lines.push(Line::from(Span::styled(
            format!("refresh failed: {}", error),
            Style::default().fg(Color::Red),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn render_tools_card(app: &App, frame: &mut Frame, area: Rect) {
    let block = card("MCP Tools");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [actions_area, list_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let actions = Line::from(vec![
        widgets::button("fitness_summary", Variant::Outline, app.console.is_summary_pending()),
        Span::raw(" "),
        widgets::button("reload context", Variant::Outline, false),
    ]);
    frame.render_widget(Paragraph::new(actions), actions_area);

    let items: Vec<ListItem> = app
        .console
        .tools()
        .into_iter()
        .map(|tool| {
            ListItem::new(vec![
                Line::from(Span::styled(tool.name, Style::default().fg(Color::Magenta).bold())),
                Line::from(Span::styled(
                    format!("  {}", tool.description),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect();
    frame.render_widget(List::new(items), list_area);
}

fn render_models_card(app: &App, frame: &mut Frame, area: Rect) {
    let block = card("Models");

    if app.console.queries().models.state().is_loading() {
        let loading = Paragraph::new(widgets::spinner(app.animation_frame))
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(loading, area);
        return;
    }

    let selected = app.console.selected_model();
    let items: Vec<ListItem> = app
        .console
        .models()
        .iter()
        .map(|model| {
            let style = if Some(model.name.as_str()) == selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model.label())).style(style)
        })
        .collect();
    frame.render_widget(List::new(items).block(block), area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let models = app.console.models();

    // Calculate popup size and position (centered)
    let popup_width = 48.min(area.width.saturating_sub(4));
    let popup_height = (models.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let selected = app.console.selected_model().map(str::to_string);
    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if Some(&model.name) == selected.as_ref() {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model.label())).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}

fn render_toast(app: &mut App, frame: &mut Frame, area: Rect) {
    let Some(message) = app.console.toast() else {
        app.toast_area = None;
        return;
    };

    let width = (message.chars().count() as u16 + 4)
        .max(24)
        .min(area.width.saturating_sub(2));
    let inner_width = width.saturating_sub(2).max(1) as usize;
    let height = ((message.chars().count().div_ceil(inner_width)) as u16 + 2)
        .min(area.height.saturating_sub(1))
        .max(3);

    let toast_area = Rect::new(
        area.x + area.width.saturating_sub(width + 1),
        area.y + area.height.saturating_sub(height),
        width,
        height,
    );

    frame.render_widget(Clear, toast_area);
    let toast = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::White).bg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White).bg(Color::Red))
                .title(" Error (x or click to dismiss) "),
        );
    frame.render_widget(toast, toast_area);
    app.toast_area = Some(toast_area);
}
