use std::path::{Path, PathBuf};

use redb::{Database, MultimapTableDefinition, ReadableMultimapTable, TableDefinition};
use thiserror::Error;
use tracing::debug;
use treesync_utils::{error::NonUtf8PathError, path_to_str};

use crate::{
	domain::DocumentId,
	util::db::{impl_from_redb, open_database},
};

const SOURCES_TABLE: MultimapTableDefinition<u128, &str> =
	MultimapTableDefinition::new("sources");
const FILE_COUNTS_TABLE: TableDefinition<u128, u64> = TableDefinition::new("file_counts");

#[derive(Error, Debug)]
pub enum RegistryError {
	#[error(transparent)]
	NonUtf8Path(#[from] NonUtf8PathError),
	#[error("database error: {0}")]
	Database(Box<redb::Error>),
}

impl_from_redb!(RegistryError);

/// Durable mapping from a document to its set of attached locations.
///
/// Every mutation runs in its own redb write transaction. redb only allows one
/// writer at a time, so concurrent mutations on the same document serialize and
/// the last writer wins.
pub struct SourceRegistry {
	db: Database,
}

impl SourceRegistry {
	pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
		let db = open_database(path, |txn| {
			txn.open_multimap_table(SOURCES_TABLE)?;
			txn.open_table(FILE_COUNTS_TABLE)?;
			Ok(())
		})?;

		Ok(Self { db })
	}

	/// Attaches `path` to a document. Returns `false` if it was already attached.
	pub fn add(&self, document_id: DocumentId, path: impl AsRef<Path>) -> Result<bool, RegistryError> {
		let path = path_to_str(path.as_ref())?;

		let txn = self.db.begin_write()?;
		let existed = {
			let mut sources = txn.open_multimap_table(SOURCES_TABLE)?;
			sources.insert(document_id.as_u128(), path)?
		};
		txn.commit()?;

		if !existed {
			debug!(%document_id, path, "Attached source");
		}
		Ok(!existed)
	}

	/// Detaches `path` from a document. Returns `false` if it wasn't attached.
	pub fn remove(
		&self,
		document_id: DocumentId,
		path: impl AsRef<Path>,
	) -> Result<bool, RegistryError> {
		let path = path_to_str(path.as_ref())?;

		let txn = self.db.begin_write()?;
		let removed = {
			let mut sources = txn.open_multimap_table(SOURCES_TABLE)?;
			sources.remove(document_id.as_u128(), path)?
		};
		txn.commit()?;

		if removed {
			debug!(%document_id, path, "Detached source");
		}
		Ok(removed)
	}

	/// Locations attached to a document, in no particular order
	pub fn list(&self, document_id: DocumentId) -> Result<Vec<PathBuf>, RegistryError> {
		let txn = self.db.begin_read()?;
		let sources = txn.open_multimap_table(SOURCES_TABLE)?;

		let mut paths = Vec::new();
		for path in sources.get(document_id.as_u128())? {
			paths.push(PathBuf::from(path?.value()));
		}
		Ok(paths)
	}

	/// Number of files the document held after its last recorded import
	pub fn count(&self, document_id: DocumentId) -> Result<u64, RegistryError> {
		let txn = self.db.begin_read()?;
		let counts = txn.open_table(FILE_COUNTS_TABLE)?;
		Ok(counts
			.get(document_id.as_u128())?
			.map(|guard| guard.value())
			.unwrap_or_default())
	}

	pub fn set_count(&self, document_id: DocumentId, count: u64) -> Result<(), RegistryError> {
		let txn = self.db.begin_write()?;
		{
			let mut counts = txn.open_table(FILE_COUNTS_TABLE)?;
			counts.insert(document_id.as_u128(), count)?;
		}
		txn.commit()?;
		Ok(())
	}

	/// Every document with at least one attached source
	pub fn documents(&self) -> Result<Vec<DocumentId>, RegistryError> {
		let txn = self.db.begin_read()?;
		let sources = txn.open_multimap_table(SOURCES_TABLE)?;

		let mut ids = Vec::new();
		for item in sources.iter()? {
			let (id, _) = item?;
			ids.push(DocumentId::from_u128(id.value()));
		}
		Ok(ids)
	}

	/// Forgets every source and the file count of a document. Returns how many
	/// sources were removed.
	pub fn purge(&self, document_id: DocumentId) -> Result<usize, RegistryError> {
		let txn = self.db.begin_write()?;
		let removed = {
			let mut sources = txn.open_multimap_table(SOURCES_TABLE)?;
			let removed = sources.remove_all(document_id.as_u128())?.count();

			let mut counts = txn.open_table(FILE_COUNTS_TABLE)?;
			counts.remove(document_id.as_u128())?;

			removed
		};
		txn.commit()?;

		debug!(%document_id, removed, "Purged sources");
		Ok(removed)
	}
}
