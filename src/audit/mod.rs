//! AVC denial records and sepolicy rule synthesis.
//!
//! [`record`] turns a raw `avc:` log line into an [`AuditRecord`];
//! [`policy`] merges equivalent records and renders the survivors as
//! `allow` statements.

pub mod context;
pub mod policy;
pub mod record;

pub use context::SecurityContext;
pub use policy::{merge_records, render_policy, render_record};
pub use record::AuditRecord;
