//! Terminal display and UI rendering
//!
//! Features:
//! - Stimulus grid with the active cell highlighted
//! - Spoken letter readout for the audio channel
//! - Feedback, score and progress lines

use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{self, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::cell::Cell;
use std::io::{stdout, Write};

use crate::session::{GameSettings, Phase, SessionState};

/// Everything one frame needs besides the session snapshot
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub state: &'a SessionState,
    pub score: u32,
    pub high_score: u32,
    pub grid_size: u32,
    pub n_back: usize,
}

/// Terminal display manager
pub struct Display {
    /// Still on the alternate screen
    active: Cell<bool>,
}

impl Display {
    /// Create display on the alternate screen with the cursor hidden
    pub fn fullscreen() -> Result<Self, Box<dyn std::error::Error>> {
        execute!(stdout(), EnterAlternateScreen, cursor::Hide)?;
        Ok(Display {
            active: Cell::new(true),
        })
    }

    /// Clear screen
    pub fn clear(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut stdout = stdout();
        execute!(
            stdout,
            terminal::Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }

    /// Draw a full frame
    pub fn render(&self, frame: &Frame<'_>) -> Result<(), Box<dyn std::error::Error>> {
        self.clear()?;
        self.show_header(frame)?;
        let grid_rows = self.show_grid(frame.grid_size, frame.state.visual_value, 2)?;
        let row = 3 + grid_rows;
        self.show_letter(frame.state.audio_letter(), row)?;
        self.show_feedback(&frame.state.feedback, row + 2)?;
        self.show_progress(frame, row + 4)?;
        self.show_help(row + 6)?;
        stdout().flush()?;
        Ok(())
    }

    fn show_header(&self, frame: &Frame<'_>) -> Result<(), Box<dyn std::error::Error>> {
        let (label, color) = match frame.state.phase {
            Phase::Idle => ("READY", Color::DarkGrey),
            Phase::Running => ("RUNNING", Color::Green),
            Phase::Finished => ("FINISHED", Color::Yellow),
        };
        execute!(
            stdout(),
            cursor::MoveTo(0, 0),
            SetForegroundColor(Color::Cyan),
            Print(format!("{}-back", frame.n_back)),
            ResetColor,
            Print(format!("  |  Mode: {}  |  ", frame.state.channel_mode)),
            SetForegroundColor(color),
            Print(label),
            ResetColor,
        )?;
        Ok(())
    }

    /// Draw the grid starting at `top`; returns the rows used
    fn show_grid(
        &self,
        grid_size: u32,
        active: Option<u32>,
        top: u16,
    ) -> Result<u16, Box<dyn std::error::Error>> {
        let grid_size = grid_size.clamp(1, GameSettings::MAX_GRID_SIZE);
        let mut stdout = stdout();
        for row in 0..grid_size {
            execute!(stdout, cursor::MoveTo(2, top + row as u16))?;
            for col in 0..grid_size {
                let cell = row * grid_size + col;
                if active == Some(cell) {
                    execute!(
                        stdout,
                        SetBackgroundColor(Color::Blue),
                        Print("    "),
                        ResetColor,
                        Print(" ")
                    )?;
                } else {
                    execute!(
                        stdout,
                        SetForegroundColor(Color::DarkGrey),
                        Print(format!("[{:>2}]", cell + 1)),
                        ResetColor,
                        Print(" ")
                    )?;
                }
            }
        }
        Ok(grid_size as u16)
    }

    fn show_letter(&self, letter: Option<&str>, row: u16) -> Result<(), Box<dyn std::error::Error>> {
        execute!(
            stdout(),
            cursor::MoveTo(0, row),
            SetForegroundColor(Color::Magenta),
            Print("Letter: "),
            ResetColor,
            Print(letter.unwrap_or("-")),
        )?;
        Ok(())
    }

    fn show_feedback(&self, feedback: &str, row: u16) -> Result<(), Box<dyn std::error::Error>> {
        let color = if feedback.contains("Incorrect") || feedback.contains("error") {
            Color::Red
        } else if feedback.contains("Correct") {
            Color::Green
        } else {
            Color::Yellow
        };
        execute!(
            stdout(),
            cursor::MoveTo(0, row),
            SetForegroundColor(color),
            Print(feedback),
            ResetColor,
        )?;
        Ok(())
    }

    fn show_progress(&self, frame: &Frame<'_>, row: u16) -> Result<(), Box<dyn std::error::Error>> {
        let state = frame.state;
        let shown = if state.is_running() {
            (state.current_event_index + 1).min(state.total_events)
        } else {
            state.current_event_index
        };
        execute!(
            stdout(),
            cursor::MoveTo(0, row),
            SetForegroundColor(Color::Blue),
            Print("─".repeat(50)),
            ResetColor,
            cursor::MoveTo(0, row + 1),
            Print(format!("Event: {}/{}", shown, state.total_events)),
            Print("  |  Score: "),
            SetForegroundColor(Color::Green),
            Print(frame.score),
            ResetColor,
            Print(format!(
                "  |  Visual: {}  Audio: {}  |  Highscore: {}",
                state.correct_visual_responses, state.correct_audio_responses, frame.high_score
            )),
        )?;
        Ok(())
    }

    /// Show help text
    fn show_help(&self, row: u16) -> Result<(), Box<dyn std::error::Error>> {
        execute!(
            stdout(),
            cursor::MoveTo(0, row),
            SetForegroundColor(Color::DarkGrey),
            Print("S start | SPACE/V visual match | 1-9 pick cell | A audio match"),
            cursor::MoveTo(0, row + 1),
            Print("M mode | R reset | ESC quit"),
            ResetColor
        )?;
        Ok(())
    }

    /// Reset terminal state and cleanup
    pub fn shutdown(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.active.replace(false) {
            return Ok(());
        }
        execute!(stdout(), LeaveAlternateScreen, cursor::Show)?;
        terminal::disable_raw_mode()?;
        Ok(())
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        // Best effort cleanup
        let _ = self.shutdown();
    }
}
