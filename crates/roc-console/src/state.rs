use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::TableState;
use roc_core::{CategoryCount, ChannelState, ViewModel};
use roc_session::ChannelEvent;

/// Scrollback bound for the chat and log panes.
const PANE_SCROLLBACK: usize = 500;

/// One streaming sink region: the channel writes it exclusively, the render
/// pass only reads it.
pub struct Pane {
    pub title: &'static str,
    pub lines: Vec<String>,
    pub state: ChannelState,
    pub scroll: usize,
    follow: bool,
}

impl Pane {
    pub fn new(title: &'static str) -> Self {
        Self {
            title,
            lines: Vec::new(),
            state: ChannelState::Connecting,
            scroll: 0,
            follow: true,
        }
    }

    pub fn apply(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::State(state) => {
                self.state = state;
                if state == ChannelState::Open {
                    // Fresh connection; drop whatever the last one showed.
                    self.lines.clear();
                    self.scroll = 0;
                    self.follow = true;
                }
            }
            ChannelEvent::Line(line) | ChannelEvent::Notice(line) => self.push(line),
        }
    }

    fn push(&mut self, line: String) {
        self.lines.push(line);
        if self.lines.len() > PANE_SCROLLBACK {
            let excess = self.lines.len() - PANE_SCROLLBACK;
            self.lines.drain(..excess);
            self.scroll = self.scroll.saturating_sub(excess);
        }
        if self.follow {
            self.scroll = self.lines.len().saturating_sub(1);
        }
    }

    /// Dependent input (the chat send control) is live only while open.
    pub fn input_enabled(&self) -> bool {
        self.state == ChannelState::Open
    }

    pub fn scroll_up(&mut self) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        if self.scroll + 1 < self.lines.len() {
            self.scroll += 1;
        }
        if self.scroll + 1 >= self.lines.len() {
            self.follow = true;
        }
    }
}

/// Owned chart handle (no module-level singleton): created once with the
/// app, fed new labels/values per cycle, read by the render pass.
#[derive(Default)]
pub struct CategoryChart {
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

impl CategoryChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, counts: &[CategoryCount]) {
        self.labels = counts.iter().map(|c| c.category.clone()).collect();
        self.values = counts.iter().map(|c| c.count).collect();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Users,
    Chat,
    Log,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Users => Focus::Chat,
            Focus::Chat => Focus::Log,
            Focus::Log => Focus::Users,
        }
    }
}

/// Modal one-shot prompts for the administrative actions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Prompt {
    #[default]
    None,
    Broadcast(String),
    ConfirmRestart,
}

/// What a key press asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    SendChat(String),
    Broadcast(String),
    Restart,
}

pub struct App {
    pub view: ViewModel,
    pub chat: Pane,
    pub log: Pane,
    pub chart: CategoryChart,
    pub chat_input: String,
    pub focus: Focus,
    pub prompt: Prompt,
    pub status_note: Option<String>,
    pub table_state: TableState,
    pub show_help: bool,
    pub cycles: u64,
}

impl App {
    pub fn new() -> Self {
        Self {
            view: ViewModel::default(),
            chat: Pane::new("Chat"),
            log: Pane::new("Server Log"),
            chart: CategoryChart::new(),
            chat_input: String::new(),
            focus: Focus::default(),
            prompt: Prompt::default(),
            status_note: None,
            table_state: TableState::default(),
            show_help: false,
            cycles: 0,
        }
    }

    pub fn apply_view(&mut self, view: ViewModel) {
        self.chart.update(&view.categories);
        let len = view.rows.len();
        if let Some(selected) = self.table_state.selected() {
            if len == 0 {
                self.table_state.select(None);
            } else if selected >= len {
                self.table_state.select(Some(len - 1));
            }
        }
        self.view = view;
        self.cycles += 1;
    }

    pub fn apply_notice(&mut self, note: String) {
        self.status_note = Some(note);
    }

    /// Translate one key press into app-state changes and, possibly, one
    /// session command. Prompts capture input first, then the chat input
    /// line, then global keys.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Command> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Command::Quit);
        }

        match std::mem::take(&mut self.prompt) {
            Prompt::Broadcast(mut buffer) => {
                match key.code {
                    KeyCode::Esc => {}
                    KeyCode::Enter => {
                        let message = buffer.trim().to_string();
                        if !message.is_empty() {
                            return Some(Command::Broadcast(message));
                        }
                        // Nothing to send yet; keep editing.
                        self.prompt = Prompt::Broadcast(buffer);
                    }
                    KeyCode::Backspace => {
                        buffer.pop();
                        self.prompt = Prompt::Broadcast(buffer);
                    }
                    KeyCode::Char(c) => {
                        buffer.push(c);
                        self.prompt = Prompt::Broadcast(buffer);
                    }
                    _ => self.prompt = Prompt::Broadcast(buffer),
                }
                return None;
            }
            Prompt::ConfirmRestart => {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => {
                        return Some(Command::Restart);
                    }
                    KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {}
                    _ => self.prompt = Prompt::ConfirmRestart,
                }
                return None;
            }
            Prompt::None => {}
        }

        if self.show_help {
            self.show_help = false;
            return None;
        }

        if self.focus == Focus::Chat {
            match key.code {
                KeyCode::Enter => {
                    if self.chat.input_enabled() {
                        let text = self.chat_input.trim().to_string();
                        self.chat_input.clear();
                        if !text.is_empty() {
                            return Some(Command::SendChat(text));
                        }
                    }
                    return None;
                }
                KeyCode::Backspace => {
                    self.chat_input.pop();
                    return None;
                }
                KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.chat_input.push(c);
                    return None;
                }
                _ => {}
            }
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
            KeyCode::Tab => {
                self.focus = self.focus.next();
                None
            }
            KeyCode::Char('b') => {
                self.prompt = Prompt::Broadcast(String::new());
                None
            }
            KeyCode::Char('R') => {
                self.prompt = Prompt::ConfirmRestart;
                None
            }
            KeyCode::Char('?') => {
                self.show_help = true;
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_up();
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_down();
                None
            }
            _ => None,
        }
    }

    fn move_up(&mut self) {
        match self.focus {
            Focus::Users => {
                let selected = self.table_state.selected().unwrap_or(0);
                self.table_state.select(Some(selected.saturating_sub(1)));
            }
            Focus::Chat => self.chat.scroll_up(),
            Focus::Log => self.log.scroll_up(),
        }
    }

    fn move_down(&mut self) {
        match self.focus {
            Focus::Users => {
                let len = self.view.rows.len();
                if len == 0 {
                    return;
                }
                let selected = self.table_state.selected().unwrap_or(0);
                self.table_state.select(Some((selected + 1).min(len - 1)));
            }
            Focus::Chat => self.chat.scroll_down(),
            Focus::Log => self.log.scroll_down(),
        }
    }
}
