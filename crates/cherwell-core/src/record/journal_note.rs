use super::{JOURNAL_NOTE, record_type};
use crate::document::Document;

/// A journal note, owned by an incident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalNote {
    document: Document,
}

record_type!(JournalNote, &JOURNAL_NOTE);
