//! Terminal "speech": ring the bell, the display shows the letter

use std::io::{stdout, Write};

use tracing::trace;

use crate::session::{SpeakError, Speaker};

#[derive(Clone, Copy, Debug, Default)]
pub struct BellSpeaker {
    pub muted: bool,
}

impl Speaker for BellSpeaker {
    fn speak(&self, symbol: &str) -> Result<(), SpeakError> {
        trace!(symbol, "speak");
        if self.muted {
            return Ok(());
        }
        let mut out = stdout();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| SpeakError::Failed(e.to_string()))
    }
}
