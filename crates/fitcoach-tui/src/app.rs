use fitcoach_core::{Console, Outcome, PendingRequest, QueryKey};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use crate::tui::AppEvent;
use crate::widgets;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub console: Console,
    pub api_base: String,

    // Composer
    pub cursor: usize, // cursor position in the draft, in chars

    // Chat log scrolling
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8,

    // Model picker state
    pub show_model_picker: bool,
    pub model_picker_state: ListState,

    // Areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub toast_area: Option<Rect>,
    pub context_badge_area: Option<Rect>,

    tx: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(console: Console, api_base: String, tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            console,
            api_base,

            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            show_model_picker: false,
            model_picker_state: ListState::default(),

            chat_area: None,
            toast_area: None,
            context_badge_area: None,

            tx,
        }
    }

    // Backend actions. Each hands its request to a task that reports back
    // through the event channel.

    pub fn send_chat(&mut self) {
        if let Some(request) = self.console.submit_chat() {
            self.cursor = 0;
            self.spawn(request);
            self.scroll_chat_to_bottom();
        }
    }

    pub fn ask_via_mcp(&mut self) {
        if let Some(request) = self.console.submit_mcp() {
            self.cursor = 0;
            self.spawn(request);
            self.scroll_chat_to_bottom();
        }
    }

    pub fn run_fitness_summary(&mut self) {
        if let Some(request) = self.console.run_fitness_summary() {
            self.spawn(request);
        }
    }

    pub fn refresh_context(&mut self) {
        self.console.refresh_context();
    }

    fn spawn(&self, request: PendingRequest) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = request.await;
            let _ = tx.send(AppEvent::Settled(outcome));
        });
    }

    pub fn on_settled(&mut self, outcome: Outcome) {
        self.console.apply(outcome);
        self.scroll_chat_to_bottom();
    }

    pub fn on_query(&mut self, key: QueryKey) {
        self.console.sync(key);
    }

    // Composer editing

    pub fn insert_char(&mut self, c: char) {
        let draft = self.console.draft_mut();
        let byte_pos = char_to_byte_index(draft, self.cursor);
        draft.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let draft = self.console.draft_mut();
            let byte_pos = char_to_byte_index(draft, self.cursor);
            draft.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        let cursor = self.cursor;
        let draft = self.console.draft_mut();
        if cursor < draft.chars().count() {
            let byte_pos = char_to_byte_index(draft, cursor);
            draft.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.console.draft().chars().count();
        self.cursor = (self.cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.console.draft().chars().count();
    }

    // Chat scrolling

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.chat_total_lines().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    /// Scroll chat to bottom so the newest entry (or "Thinking…") is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_total_lines();
        let visible_height = self.visible_chat_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered line count of the log at the current wrap width
    pub fn chat_total_lines(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.console.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 {
                    1
                } else {
                    char_count.div_ceil(wrap_width)
                };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.console.is_sending() {
            total_lines = total_lines.saturating_add(2); // role line + "Thinking…"
        }

        total_lines
    }

    /// Advance the spinner while anything is loading
    pub fn tick_animation(&mut self) {
        let queries = self.console.queries();
        let busy = self.console.is_sending()
            || self.console.is_summary_pending()
            || queries.models.is_fetching()
            || queries.context.is_fetching();
        if busy {
            self.animation_frame = (self.animation_frame + 1) % widgets::spinner_len();
        }
    }

    // Model picker methods

    pub fn open_model_picker(&mut self) {
        let models = self.console.models();
        if models.is_empty() {
            return;
        }
        // Select current model if in list, otherwise first
        let current_idx = models
            .iter()
            .position(|m| Some(m.name.as_str()) == self.console.selected_model())
            .unwrap_or(0);
        self.model_picker_state.select(Some(current_idx));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.console.models().len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.console.models().get(i) {
                self.console.select_model(&model.name);
            }
        }
        self.show_model_picker = false;
    }
}
