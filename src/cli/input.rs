//! Keystroke input handling using crossterm
//!
//! Features:
//! - Non-blocking keystroke capture
//! - Key → trainer command mapping
//! - Ctrl+C / Esc graceful exit

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::io::Result as IoResult;
use std::time::Duration;

/// What a key press asks the trainer to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Reset,
    CycleMode,
    /// Claim the cell currently lit
    VisualMatch,
    /// Claim an explicit cell (0-based)
    SelectCell(u32),
    AudioMatch,
    Quit,
}

/// Handles user input from terminal
pub struct InputHandler {
    /// Timeout for poll operations (milliseconds)
    poll_timeout: Duration,
}

impl InputHandler {
    /// Create new input handler with default timeout (50ms for responsive input)
    pub fn new() -> Self {
        InputHandler {
            poll_timeout: Duration::from_millis(50),
        }
    }

    /// Enable raw mode for terminal input
    pub fn enable_raw_mode() -> IoResult<()> {
        crossterm::terminal::enable_raw_mode()
    }

    /// Poll for keystroke with timeout (non-blocking)
    /// Returns Some(KeyEvent) if key pressed, None if timeout
    pub fn read_key(&self) -> Result<Option<KeyEvent>, Box<dyn std::error::Error>> {
        if event::poll(self.poll_timeout)? {
            match event::read()? {
                event::Event::Key(key_event) if key_event.kind != KeyEventKind::Release => {
                    Ok(Some(key_event))
                }
                _ => Ok(None),
            }
        } else {
            Ok(None)
        }
    }

    /// Check if key event is an exit signal (Ctrl+C or Escape)
    pub fn is_exit(key: &KeyEvent) -> bool {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => true,
            KeyCode::Esc => true,
            _ => false,
        }
    }

    /// Map a key to a trainer command
    pub fn command(key: &KeyEvent) -> Option<Command> {
        if Self::is_exit(key) {
            return Some(Command::Quit);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) || key.modifiers.contains(KeyModifiers::ALT)
        {
            return None;
        }

        match key.code {
            KeyCode::Char(' ') => Some(Command::VisualMatch),
            KeyCode::Char(c) => match c.to_ascii_lowercase() {
                's' => Some(Command::Start),
                'r' => Some(Command::Reset),
                'm' => Some(Command::CycleMode),
                'v' => Some(Command::VisualMatch),
                'a' => Some(Command::AudioMatch),
                'q' => Some(Command::Quit),
                digit @ '1'..='9' => Some(Command::SelectCell(digit as u32 - '1' as u32)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}
