//! treesync core: keeps filesystem sources imported into content-addressed
//! documents.

pub mod backend;
pub mod config;
pub mod domain;
pub mod logging;
pub mod ops;
pub mod source;
pub mod store;

pub(crate) mod util;

pub use backend::{Backend, BackendError, ImportReport};
pub use config::{AppConfig, ImportConfig};
pub use domain::{AuthorId, DocumentId, EntryKey, NodeId, Source, UpdateStatus};
pub use ops::import::{
	IgnoreRules, ImportError, ImportEvent, ImportHandle, ImportOptions, ProgressReporter,
	Reconciler, SkipReason,
};
pub use source::{resolve_location, SourceRegistry};
pub use store::{
	DocumentHandle, DocumentInfo, DocumentStore, LocalStore, MemStore, NodeStatus, ShareMode,
	ShareTicket,
};
