use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::DocumentId;

/// A filesystem location attached to a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
	pub document_id: DocumentId,
	pub path: PathBuf,
}

impl Source {
	pub fn new(document_id: DocumentId, path: impl Into<PathBuf>) -> Self {
		Self {
			document_id,
			path: path.into(),
		}
	}
}
