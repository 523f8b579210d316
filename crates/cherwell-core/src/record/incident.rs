use chrono::Utc;
use tracing::debug;

use super::{INCIDENT, JOURNAL_NOTE, JournalNote, OWNS, Record, TASK, Task, record_type};
use crate::datetime::format_field;
use crate::document::{Document, LAST_MODIFIED};
use crate::error::CoreError;

pub const TASKS_RELATION: &str = "Incident Has Tasks";
pub const NOTES_RELATION: &str = "Incident has Notes";

/// A Cherwell incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incident {
    document: Document,
}

record_type!(Incident, &INCIDENT);

impl Incident {
    /// Tasks embedded under `Incident Has Tasks`.
    pub fn tasks(&self) -> Result<Vec<Task>, CoreError> {
        Ok(self
            .document
            .children(TASKS_RELATION, TASK.object_name)?
            .into_iter()
            .map(Task::from_document)
            .collect())
    }

    /// Notes embedded under `Incident has Notes`.
    pub fn journal_notes(&self) -> Result<Vec<JournalNote>, CoreError> {
        Ok(self
            .document
            .children(NOTES_RELATION, JOURNAL_NOTE.object_name)?
            .into_iter()
            .map(JournalNote::from_document)
            .collect())
    }

    /// Attach a new action task owned by this incident.
    ///
    /// Returns `false` (and changes nothing) when the incident has no
    /// server identity yet.
    pub fn add_task(&mut self, description: &str, notes: &str, owned_by: &str) -> bool {
        let Some(parent_id) = self.id().filter(|_| self.exists()) else {
            return false;
        };
        let task = Task::create([
            ("ParentPublicID", parent_id.as_str()),
            ("ParentTypeName", INCIDENT.object_name),
            ("TaskType", "Action"),
            ("TaskDescription", description),
            ("Notes", notes),
            ("OwnedBy", owned_by),
        ]);
        debug!(incident = %parent_id, "adding task");
        self.add_child(TASKS_RELATION, TASK.object_name, OWNS, task.into_document())
    }

    /// Attach a journal note. Same existence rule as [`add_task`](Self::add_task).
    pub fn add_journal_note(&mut self, note: JournalNote) -> bool {
        self.add_child(
            NOTES_RELATION,
            JOURNAL_NOTE.object_name,
            OWNS,
            note.into_document(),
        )
    }

    /// Move the incident to its closed state and stamp the modification time.
    pub fn complete(&mut self, comment: &str) {
        let doc = &mut self.document;
        doc.set_field("CloseDescription", comment);
        doc.set_field("PhaseResolveStatus", "Complete");
        doc.set_field("ClosureCode", "Completed");
        doc.set_field("CMDBUpdate", "No");
        doc.set_field("SubCategory", "JIRA");
        doc.set_field("SubcategoryNonHR", "JIRA");
        doc.set_field(LAST_MODIFIED, format_field(&Utc::now()));
    }

    /// Reopening is not supported; the record is left as is.
    pub fn reopen(&mut self) {}
}
