use super::{JournalNote, TASK, record_type};
use crate::document::Document;
use crate::error::CoreError;

/// Technician notes field; tasks keep their comments here.
pub const COMPLETION_DETAILS: &str = "CompletionDetails";

/// A Cherwell task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    document: Document,
}

record_type!(Task, &TASK);

impl Task {
    /// Tasks cannot own journal notes, so the note is appended to
    /// `CompletionDetails` as a stamped comment instead.
    ///
    /// Fails when the note has no readable modification time.
    pub fn add_journal_note(&mut self, note: &JournalNote) -> Result<(), CoreError> {
        let message = format!(
            "\n============================\nComment added {} by {}: {}\n\n",
            note.modified_display()?,
            note.get_field("CreatedBy").unwrap_or_default(),
            note.get_field("Details").unwrap_or_default(),
        );
        let mut details = self.get_field(COMPLETION_DETAILS).unwrap_or_default();
        details.push_str(&message);
        self.set_field(COMPLETION_DETAILS, details);
        Ok(())
    }
}
