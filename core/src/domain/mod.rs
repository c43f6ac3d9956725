//! Core domain models
//!
//! These are the nouns shared by the registry, the import reconciler and the
//! document store:
//! - Identifiers for documents, authors and nodes
//! - `EntryKey`, the path-derived key under which imported files are stored
//! - `Source`, a filesystem location attached to a document
//! - `UpdateStatus`, the progress snapshot of one import pass

pub mod entry;
pub mod id;
pub mod source;

pub use entry::{EntryKey, ImportEntry, UpdateStatus};
pub use id::{AuthorId, DocumentId, IdParseError, NodeId};
pub use source::Source;
