//! The editable SOS text.

use lifeline_shared::constants::{DEFAULT_SOS_TEXT, MAX_SOS_TEXT_CHARS};

/// Last valid SOS text typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SosDraft {
    text: String,
}

impl SosDraft {
    /// Replace the draft. Edits over the character limit are rejected and the
    /// previous text is kept.
    pub fn edit(&mut self, text: &str) -> bool {
        if text.trim().chars().count() > MAX_SOS_TEXT_CHARS {
            return false;
        }
        self.text = text.to_string();
        true
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text that would be sent right now.
    pub fn effective_text(&self) -> &str {
        match self.text.trim() {
            "" => DEFAULT_SOS_TEXT,
            trimmed => trimmed,
        }
    }

    pub fn remaining_chars(&self) -> usize {
        MAX_SOS_TEXT_CHARS.saturating_sub(self.text.trim().chars().count())
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}
