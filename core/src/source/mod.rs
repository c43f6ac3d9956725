//! Sources: filesystem locations attached to documents.
//!
//! The [`SourceRegistry`] is bookkeeping only. It remembers which locations feed
//! which document and how many files the document held after its last import;
//! the document store stays authoritative for what was actually written.

pub mod registry;
pub mod resolve;

pub use registry::{RegistryError, SourceRegistry};
pub use resolve::{resolve_location, ResolveError};
