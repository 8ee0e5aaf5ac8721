//! Popup state machine: exactly one of Loading, Error or Summary at a time.

use crate::protocol::{AnalysisOutcome, Failure, Request, Response};
use crate::summary::{DetailLevel, SummaryResult};
use crossterm::event::KeyCode;
use lazy_static::lazy_static;
use regex::Regex;

/// Shown when the analysis failed for lack of an API key
pub const KEY_REQUIRED_MESSAGE: &str = "API key required. Enter it above to get started.";

/// Visible prefix of a stored key in the settings form
const MASK_PREFIX_CHARS: usize = 12;

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n\n+").expect("paragraph regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Loading,
    Error {
        message: String,
    },
    Summary {
        data: SummaryResult,
        level: DetailLevel,
        scroll: u16,
    },
}

/// The API key form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyEntry {
    pub input: String,
    /// Masked stored key, if any
    pub placeholder: Option<String>,
}

/// What the event loop should do after a key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Send(Request),
    /// Store the key, then analyze again
    SaveKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupState {
    view: View,
    settings: Option<KeyEntry>,
}

impl Default for PopupState {
    fn default() -> Self {
        Self {
            view: View::Loading,
            settings: None,
        }
    }
}

impl PopupState {
    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn settings(&self) -> Option<&KeyEntry> {
        self.settings.as_ref()
    }

    /// Drop the current result and show the spinner
    pub fn start_loading(&mut self) {
        self.view = View::Loading;
    }

    pub fn apply_response(&mut self, response: Response) {
        match response {
            Response::Analysis(outcome) => self.apply_outcome(outcome),
            Response::ApiKey { api_key } => {
                if let Some(entry) = self.settings.as_mut() {
                    entry.placeholder = api_key.as_deref().map(mask_key);
                }
            }
            Response::Ack { success: false } => self.view = View::Error {
                message: "Could not save the API key.".to_string(),
            },
            Response::Ack { success: true } => {}
        }
    }

    pub fn apply_outcome(&mut self, outcome: AnalysisOutcome) {
        self.view = match outcome {
            AnalysisOutcome::Success { data } => View::Summary {
                data,
                level: DetailLevel::Brief,
                scroll: 0,
            },
            AnalysisOutcome::Failure {
                error: Failure::ApiKeyMissing,
            } => {
                self.settings.get_or_insert_with(KeyEntry::default);
                View::Error {
                    message: KEY_REQUIRED_MESSAGE.to_string(),
                }
            }
            AnalysisOutcome::Failure {
                error: Failure::Message(message),
            } => View::Error { message },
        };
    }

    /// Jump straight to a level
    pub fn select_level(&mut self, target: DetailLevel) {
        if let View::Summary { level, scroll, .. } = &mut self.view {
            *level = target;
            *scroll = 0;
        }
    }

    /// Move one level deeper; no-op at the last level
    pub fn more_detail(&mut self) {
        if let Some(next) = self.level().and_then(DetailLevel::next) {
            self.select_level(next);
        }
    }

    pub fn less_detail(&mut self) {
        if let Some(prev) = self.level().and_then(DetailLevel::prev) {
            self.select_level(prev);
        }
    }

    pub fn level(&self) -> Option<DetailLevel> {
        match &self.view {
            View::Summary { level, .. } => Some(*level),
            _ => None,
        }
    }

    /// Label of the "more detail" control, hidden at the last level
    pub fn more_detail_label(&self) -> Option<&'static str> {
        match self.level()? {
            DetailLevel::Brief => Some("Short →"),
            DetailLevel::Short => Some("Medium →"),
            DetailLevel::Medium => Some("Full →"),
            DetailLevel::Detailed => None,
        }
    }

    fn scroll_by(&mut self, delta: i32) {
        if let View::Summary { scroll, .. } = &mut self.view {
            *scroll = (i32::from(*scroll) + delta).clamp(0, i32::from(u16::MAX)) as u16;
        }
    }

    /// Open or close the API key form; opening asks for the stored key
    pub fn toggle_settings(&mut self) -> Option<Action> {
        if self.settings.take().is_some() {
            return None;
        }
        self.settings = Some(KeyEntry::default());
        Some(Action::Send(Request::GetApiKey))
    }

    /// Map a key press to a state change and maybe an action
    pub fn handle_key(&mut self, code: KeyCode) -> Option<Action> {
        if let Some(entry) = self.settings.as_mut() {
            return match code {
                KeyCode::Char(c) => {
                    entry.input.push(c);
                    None
                }
                KeyCode::Backspace => {
                    entry.input.pop();
                    None
                }
                KeyCode::Enter => {
                    let key = entry.input.trim().to_string();
                    if key.is_empty() {
                        return None;
                    }
                    self.settings = None;
                    self.start_loading();
                    Some(Action::SaveKey(key))
                }
                KeyCode::Esc => {
                    self.settings = None;
                    None
                }
                _ => None,
            };
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('s') => self.toggle_settings(),
            KeyCode::Char('r') if self.view != View::Loading => {
                self.start_loading();
                Some(Action::Send(Request::AnalyzePage))
            }
            KeyCode::Char('R') if self.view != View::Loading => {
                self.start_loading();
                Some(Action::Send(Request::ReanalyzePage))
            }
            KeyCode::Enter | KeyCode::Char(' ') => {
                self.more_detail();
                None
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.more_detail();
                None
            }
            KeyCode::Left | KeyCode::Char('h') => {
                self.less_detail();
                None
            }
            KeyCode::Char(c @ '1'..='4') => {
                let index = c as usize - '1' as usize;
                if let Some(level) = DetailLevel::from_index(index) {
                    self.select_level(level);
                }
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.scroll_by(1);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.scroll_by(-1);
                None
            }
            _ => None,
        }
    }
}

/// First characters of a key followed by an ellipsis
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(MASK_PREFIX_CHARS).collect();
    format!("{prefix}…")
}

/// Split summary text into paragraphs on blank lines
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}
