// cherwell-core: Business object model and session facade over cherwell-api.

pub mod config;
pub mod datetime;
pub mod document;
pub mod error;
pub mod record;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::SessionConfig;
pub use document::Document;
pub use error::CoreError;
pub use session::{LookupKey, Session};

// Record types at the crate root for ergonomics.
pub use record::{
    IdPolicy, Incident, JournalNote, Record, RecordKind, Task, INCIDENT, JOURNAL_NOTE, TASK,
};
