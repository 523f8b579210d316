// ── Record types ──
//
// Typed views over a `Document`. Per-type constants (object name, identity
// field, id policy, important fields, create-time defaults) live in one
// static table instead of per-type mutable state.

mod incident;
mod journal_note;
mod task;

use std::fmt;

use indexmap::IndexMap;

pub use incident::{Incident, NOTES_RELATION, TASKS_RELATION};
pub use journal_note::JournalNote;
pub use task::{COMPLETION_DETAILS, Task};

use crate::document::Document;
use crate::error::CoreError;

/// Relation kind used for every relationship this crate creates.
pub const OWNS: &str = "Owns";

/// How a record decides whether its identity value names a server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPolicy {
    /// The id must contain at least one ASCII digit.
    Digits,
    /// Any non-empty id counts.
    NonEmpty,
}

impl IdPolicy {
    pub fn accepts(self, id: &str) -> bool {
        match self {
            Self::Digits => id.chars().any(|c| c.is_ascii_digit()),
            Self::NonEmpty => !id.is_empty(),
        }
    }
}

/// Static description of one record type.
#[derive(Debug, PartialEq, Eq)]
pub struct RecordKind {
    /// `BusinessObject/@Name` and the `busObNameOrId` sent to the service.
    pub object_name: &'static str,
    pub id_field: &'static str,
    pub id_policy: IdPolicy,
    /// Fields compared by `differs_from` and copied by `update_from`.
    pub important_fields: &'static [&'static str],
    /// Field values every newly created record starts with.
    pub default_values: &'static [(&'static str, &'static str)],
}

pub const INCIDENT: RecordKind = RecordKind {
    object_name: "Incident",
    id_field: "IncidentID",
    id_policy: IdPolicy::Digits,
    important_fields: &["Status", "JIRAID"],
    default_values: &[],
};

pub const TASK: RecordKind = RecordKind {
    object_name: "Task",
    id_field: "TaskID",
    id_policy: IdPolicy::NonEmpty,
    important_fields: &["Status", "ResolutionCode"],
    default_values: &[],
};

pub const JOURNAL_NOTE: RecordKind = RecordKind {
    object_name: "JournalNote",
    id_field: "RecID",
    id_policy: IdPolicy::NonEmpty,
    important_fields: &["Details"],
    default_values: &[("Details", "")],
};

/// Every known record type.
pub static RECORD_KINDS: [&RecordKind; 3] = [&INCIDENT, &TASK, &JOURNAL_NOTE];

/// Look a record type up by object name.
pub fn kind_for(object_name: &str) -> Option<&'static RecordKind> {
    RECORD_KINDS
        .iter()
        .copied()
        .find(|k| k.object_name == object_name)
}

/// A typed business object.
pub trait Record: Sized {
    const KIND: &'static RecordKind;

    fn from_document(document: Document) -> Self;
    fn document(&self) -> &Document;
    fn document_mut(&mut self) -> &mut Document;
    fn into_document(self) -> Document;

    /// Parse server XML into this record type.
    fn parse(text: &str) -> Result<Self, CoreError> {
        Self::try_from_document(Document::parse(text)?)
    }

    /// Adopt `document`, rejecting a business object of another type.
    fn try_from_document(document: Document) -> Result<Self, CoreError> {
        if document.record_type() == Some(Self::KIND.object_name) {
            return Ok(Self::from_document(document));
        }
        Err(CoreError::BadFormat(format!(
            "expected a {} business object, got {}",
            Self::KIND.object_name,
            document.record_type().unwrap_or("one without a Name")
        )))
    }

    /// A new local record: the type's defaults overlaid with `fields`.
    fn create<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: fmt::Display,
    {
        let mut values: IndexMap<String, String> = Self::KIND
            .default_values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        for (k, v) in fields {
            values.insert(k.into(), v.to_string());
        }
        Self::from_document(Document::build(Self::KIND.object_name, values))
    }

    /// Value of the identity field.
    fn id(&self) -> Option<String> {
        self.document().get_field(Self::KIND.id_field)
    }

    /// Whether the identity value names a record on the server.
    fn exists(&self) -> bool {
        self.id()
            .is_some_and(|id| Self::KIND.id_policy.accepts(&id))
    }

    /// Whether any important field differs from `other`.
    fn differs_from(&self, other: &Self) -> bool {
        !self
            .document()
            .fields_equal(other.document(), Self::KIND.important_fields)
    }

    /// Copy the important fields from `other`.
    fn update_from(&mut self, other: &Self) {
        self.document_mut()
            .copy_fields(other.document(), Self::KIND.important_fields);
    }

    /// Attach `child` under a new relationship. Records without a server
    /// identity cannot own children; returns whether anything was attached.
    fn add_child(&mut self, relation: &str, target_type: &str, kind: &str, child: Document) -> bool {
        if !self.exists() {
            return false;
        }
        self.document_mut().add_child(relation, target_type, kind, child);
        true
    }
}

/// Implements the `Record` plumbing and `Deref<Target = Document>`.
macro_rules! record_type {
    ($ty:ident, $kind:expr) => {
        impl $crate::record::Record for $ty {
            const KIND: &'static $crate::record::RecordKind = $kind;

            fn from_document(document: $crate::document::Document) -> Self {
                Self { document }
            }

            fn document(&self) -> &$crate::document::Document {
                &self.document
            }

            fn document_mut(&mut self) -> &mut $crate::document::Document {
                &mut self.document
            }

            fn into_document(self) -> $crate::document::Document {
                self.document
            }
        }

        impl std::ops::Deref for $ty {
            type Target = $crate::document::Document;

            fn deref(&self) -> &Self::Target {
                &self.document
            }
        }

        impl std::ops::DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.document
            }
        }
    };
}

pub(crate) use record_type;
