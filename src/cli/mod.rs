//! CLI Interface: User input and terminal rendering
//!
//! # Components
//! - `input.rs`: Keystroke capture and command mapping using crossterm
//! - `display.rs`: Terminal rendering of the grid, letter and scores
//! - `speaker.rs`: Terminal bell speaker for the audio channel

pub mod display;
pub mod input;
pub mod speaker;

pub use display::{Display, Frame};
pub use input::{Command, InputHandler};
pub use speaker::BellSpeaker;
