use std::sync::Arc;

use pdfchat_core::session::ask_guarded;
use pdfchat_core::{AskError, ChatSession, PendingQuery, QaEndpoint, Settlement};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub session: ChatSession,

    // Input state
    pub cursor: usize, // in chars, not bytes

    // Transcript viewport
    pub scroll: u16,
    pub max_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,
    /// Transcript length at the last draw; growth triggers auto-scroll
    seen_len: usize,

    pub animation_frame: u8,
    pub endpoint_label: String,
    /// `None` until the startup probe reports back
    pub backend_online: Option<bool>,

    endpoint: Arc<dyn QaEndpoint>,
    events: UnboundedSender<AppEvent>,
    query_task: Option<JoinHandle<()>>,
}

impl App {
    pub fn new(
        endpoint: Arc<dyn QaEndpoint>,
        endpoint_label: String,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            session: ChatSession::new(),
            cursor: 0,
            scroll: 0,
            max_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            seen_len: 0,
            animation_frame: 0,
            endpoint_label,
            backend_online: None,
            endpoint,
            events,
            query_task: None,
        }
    }

    /// Send the draft to the endpoint in the background.
    ///
    /// Blank drafts and submits while a query is in flight are ignored.
    pub fn submit(&mut self) {
        let Some(pending) = self.session.begin_submit() else {
            return;
        };
        self.cursor = 0;

        let endpoint = Arc::clone(&self.endpoint);
        let events = self.events.clone();
        self.query_task = Some(tokio::spawn(async move {
            let outcome = ask_guarded(endpoint.as_ref(), pending.query()).await;
            // The receiver is gone once the app has shut down
            let _ = events.send(AppEvent::Settled(pending, outcome));
        }));
    }

    pub fn settle(&mut self, pending: PendingQuery, outcome: Result<String, AskError>) -> Settlement {
        self.query_task = None;
        self.session.settle(pending, outcome)
    }

    /// Tear down the session and abandon any in-flight query.
    pub fn shutdown(&mut self) {
        self.should_quit = true;
        self.session.teardown();
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
    }

    #[cfg(test)]
    pub fn is_query_running(&self) -> bool {
        self.query_task.is_some()
    }

    // Draft editing. Every edit goes through `update_draft`.
    pub fn insert_char(&mut self, c: char) {
        let mut draft = self.session.draft().to_string();
        let byte_pos = char_to_byte_index(&draft, self.cursor);
        draft.insert(byte_pos, c);
        self.session.update_draft(draft);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.remove_at_cursor();
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.session.draft().chars().count() {
            self.remove_at_cursor();
        }
    }

    fn remove_at_cursor(&mut self) {
        let mut draft = self.session.draft().to_string();
        let byte_pos = char_to_byte_index(&draft, self.cursor);
        draft.remove(byte_pos);
        self.session.update_draft(draft);
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.session.draft().chars().count();
        self.cursor = (self.cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.session.draft().chars().count();
    }

    // Transcript scrolling
    pub fn scroll_up(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines).min(self.max_scroll);
    }

    pub fn page_size(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    /// Record the transcript's rendered height; jump to the newest entry
    /// whenever the transcript has grown since the last draw.
    pub fn follow_transcript(&mut self, total_lines: u16) {
        self.max_scroll = total_lines.saturating_sub(self.chat_height);

        let len = self.session.len();
        if len != self.seen_len {
            self.seen_len = len;
            self.scroll = self.max_scroll;
        } else {
            self.scroll = self.scroll.min(self.max_scroll);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_awaiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}
