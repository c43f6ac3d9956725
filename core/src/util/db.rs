use std::path::Path;

use redb::{Database, TableError, WriteTransaction};

/// Opens the redb database at `path`, creating it and its parent directory if needed.
///
/// `init` runs inside a write transaction on every open so tables can be created
/// up front; read transactions fail on tables that were never opened for writing.
pub fn open_database(
	path: impl AsRef<Path>,
	init: impl FnOnce(&WriteTransaction) -> Result<(), TableError>,
) -> Result<Database, redb::Error> {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).map_err(redb::Error::Io)?;
	}

	let db = Database::create(path)?;

	let txn = db.begin_write()?;
	init(&txn)?;
	txn.commit()?;

	Ok(db)
}

/// Implements `From` for every redb error type on an error enum with a
/// `Database(Box<redb::Error>)` variant, so `?` works across transactions.
macro_rules! impl_from_redb {
	($target:ty) => {
		$crate::util::db::impl_from_redb!(
			@impl $target,
			redb::Error,
			redb::DatabaseError,
			redb::TransactionError,
			redb::TableError,
			redb::StorageError,
			redb::CommitError
		);
	};
	(@impl $target:ty, $($err:ty),+) => {
		$(
			impl From<$err> for $target {
				fn from(e: $err) -> Self {
					Self::Database(Box::new(e.into()))
				}
			}
		)+
	};
}

pub(crate) use impl_from_redb;
