use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Down,
    Up,
    Activate,
    Cancel,
    Record,
    PickFolder,
    EditFolder,
    OpenFolder,
    OpenInBrowser,
    OpenHomepage,
    Retry,
    Reset,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Picker => map_picker_key(key),
        InputMode::EditArgs | InputMode::EditFolder => map_edit_key(key),
        InputMode::Blocked => map_blocked_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down | KeyCode::Tab => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up | KeyCode::BackTab => Some(Action::Up),
        KeyCode::Enter | KeyCode::Char(' ') => Some(Action::Activate),
        KeyCode::Esc => Some(Action::Cancel),
        KeyCode::Char('r') => Some(Action::Record),
        KeyCode::Char('f') => Some(Action::PickFolder),
        KeyCode::Char('F') => Some(Action::EditFolder),
        KeyCode::Char('o') => Some(Action::OpenFolder),
        KeyCode::Char('b') => Some(Action::OpenInBrowser),
        KeyCode::Char('?') | KeyCode::F(1) => Some(Action::OpenHomepage),
        _ => None,
    }
}

fn map_picker_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::Cancel),
        KeyCode::Enter => Some(Action::Activate),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Down),
        KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Up),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_edit_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::Cancel),
        KeyCode::Enter => Some(Action::Activate),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_blocked_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Char('r') | KeyCode::Enter => Some(Action::Retry),
        KeyCode::Char('x') => Some(Action::Reset),
        _ => None,
    }
}
