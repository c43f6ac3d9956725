//! Source tree import.
//!
//! A pass walks one source breadth first and brings the document in line with
//! it: new files are written, files already present are left alone unless a
//! recheck was asked for, in which case their content hash is compared. The
//! pass reports through a [`ProgressReporter`] as it goes.

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use bytes::Bytes;
use thiserror::Error;
use tokio::{fs, task::JoinError};
use tracing::{debug, info, instrument, warn};
use treesync_utils::error::PathIoError;

use crate::{
	config::ImportConfig,
	domain::{AuthorId, DocumentId, EntryKey, ImportEntry, UpdateStatus},
	store::{ContentHash, DocumentHandle, DocumentStore, EntryWrite, ImportMode},
};

mod handle;
mod inflight;
mod progress;
mod rules;
mod walk;

pub use handle::ImportHandle;
pub use progress::{ImportEvent, ProgressReporter, SkipReason};
pub use rules::IgnoreRules;

use inflight::{InFlight, InFlightGuard};
use walk::{SourceWalker, WalkItem};

/// A failed write is tried once more before the file is skipped
const WRITE_ATTEMPTS: usize = 2;

#[derive(Error, Debug)]
pub enum ImportError {
	#[error("source unavailable: {0}")]
	SourceUnavailable(#[source] PathIoError),
	#[error("an import of {location:?} into document {document_id} is already running")]
	AlreadyRunning {
		document_id: DocumentId,
		location: PathBuf,
	},
	#[error("document {0} was closed during the import")]
	DocumentClosed(DocumentId),
	#[error("import task failed: {0}")]
	Aborted(#[from] JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
	/// Reference files where they are instead of copying their bytes
	pub in_place: bool,
	/// Hash files whose key already exists and rewrite them if the content changed
	pub recheck: bool,
}

impl Default for ImportOptions {
	fn default() -> Self {
		Self {
			in_place: true,
			recheck: false,
		}
	}
}

impl From<&ImportConfig> for ImportOptions {
	fn from(config: &ImportConfig) -> Self {
		Self {
			in_place: config.in_place,
			recheck: config.recheck,
		}
	}
}

pub struct Reconciler {
	store: Arc<dyn DocumentStore>,
	rules: Arc<IgnoreRules>,
	in_flight: Arc<InFlight>,
}

impl Reconciler {
	pub fn new(store: Arc<dyn DocumentStore>, rules: IgnoreRules) -> Self {
		Self {
			store,
			rules: Arc::new(rules),
			in_flight: InFlight::process(),
		}
	}

	/// Whether a pass for this document and location is currently running
	pub fn is_running(&self, document_id: DocumentId, location: &Path) -> bool {
		canonical_location(location)
			.map(|location| self.in_flight.is_running(document_id, &location))
			.unwrap_or(false)
	}

	/// Runs a full pass of `location` into `doc` and returns the final counts
	pub async fn reconcile(
		&self,
		doc: &DocumentHandle,
		location: &Path,
		author: AuthorId,
		options: ImportOptions,
		reporter: &ProgressReporter,
	) -> Result<UpdateStatus, ImportError> {
		let (location, guard) = self.begin(doc.id(), location)?;
		self.run(doc, &location, author, options, reporter, guard)
			.await
	}

	/// Claims the `(document, location)` pair. Done before the pass is
	/// awaited or spawned so a competing caller is turned away immediately.
	pub(crate) fn begin(
		&self,
		document_id: DocumentId,
		location: &Path,
	) -> Result<(PathBuf, InFlightGuard), ImportError> {
		let location = canonical_location(location)?;
		let guard = self
			.in_flight
			.try_acquire(document_id, location.clone())
			.ok_or_else(|| ImportError::AlreadyRunning {
				document_id,
				location: location.clone(),
			})?;

		Ok((location, guard))
	}

	#[instrument(
		skip_all,
		fields(document_id = %doc.id(), location = %location.display()),
		err
	)]
	pub(crate) async fn run(
		&self,
		doc: &DocumentHandle,
		location: &Path,
		author: AuthorId,
		options: ImportOptions,
		reporter: &ProgressReporter,
		_guard: InFlightGuard,
	) -> Result<UpdateStatus, ImportError> {
		reporter.emit(ImportEvent::Started {
			location: location.to_path_buf(),
		});

		let res = self
			.walk_and_import(doc, location, author, options, reporter)
			.await;

		match &res {
			Ok(status) => {
				info!(%status, "Import pass completed");
				reporter.emit(ImportEvent::Completed { status: *status });
			}
			Err(e) => reporter.emit(ImportEvent::Failed {
				error: e.to_string(),
			}),
		}

		res
	}

	async fn walk_and_import(
		&self,
		doc: &DocumentHandle,
		location: &Path,
		author: AuthorId,
		options: ImportOptions,
		reporter: &ProgressReporter,
	) -> Result<UpdateStatus, ImportError> {
		let mut walker = SourceWalker::open(location, Arc::clone(&self.rules))
			.await
			.map_err(ImportError::SourceUnavailable)?;

		while let Some(item) = walker.next().await {
			match item {
				WalkItem::File(entry) => {
					reporter.on_found(&entry.path);
					self.import_file(doc, entry, author, options, reporter)
						.await?;
				}
				WalkItem::Unreadable { path, error } => {
					reporter.on_found(&path);
					warn!("Skipping unreadable entry: {error}");
					reporter.on_skipped(&path, SkipReason::Unreadable(error.to_string()));
				}
			}
		}

		Ok(reporter.snapshot())
	}

	async fn import_file(
		&self,
		doc: &DocumentHandle,
		entry: ImportEntry,
		author: AuthorId,
		options: ImportOptions,
		reporter: &ProgressReporter,
	) -> Result<(), ImportError> {
		let ImportEntry { path, size } = entry;
		let key = match EntryKey::from_path(&path) {
			Ok(key) => key,
			Err(e) => {
				warn!("Skipping file: {e}");
				reporter.on_skipped(&path, SkipReason::Unreadable(e.to_string()));
				return Ok(());
			}
		};

		let existing = match self.store.get_entry(doc, &key).await {
			Ok(existing) => existing,
			Err(e) if e.is_document_gone() => {
				return Err(ImportError::DocumentClosed(doc.id()));
			}
			Err(e) => {
				warn!(path = %path.display(), "Skipping file, lookup failed: {e}");
				reporter.on_skipped(&path, SkipReason::Unreadable(e.to_string()));
				return Ok(());
			}
		};

		if existing.is_some() && !options.recheck {
			reporter.on_skipped(&path, SkipReason::Unchanged);
			return Ok(());
		}

		let content = match fs::read(&path).await {
			Ok(content) => Bytes::from(content),
			Err(e) => {
				let e = PathIoError::new(&path, "reading", e);
				warn!("Skipping unreadable file: {e}");
				reporter.on_skipped(&path, SkipReason::Unreadable(e.to_string()));
				return Ok(());
			}
		};

		// Same length still needs a hash compare, a different one is a change
		if existing.is_some_and(|existing| {
			existing.size == size
				&& content.len() as u64 == size
				&& existing.hash == ContentHash::of(&content)
		}) {
			reporter.on_skipped(&path, SkipReason::Unchanged);
			return Ok(());
		}

		let write = EntryWrite {
			key,
			author,
			content,
			mode: ImportMode::from_in_place(options.in_place),
			origin: Some(path.clone()),
		};

		for attempt in 1..=WRITE_ATTEMPTS {
			match self.store.write_entry(doc, write.clone()).await {
				Ok(_) => {
					reporter.on_updated(&path);
					return Ok(());
				}
				Err(e) if e.is_document_gone() => {
					return Err(ImportError::DocumentClosed(doc.id()));
				}
				Err(e) if attempt < WRITE_ATTEMPTS => {
					debug!(path = %path.display(), "Write failed, retrying: {e}");
				}
				Err(e) => {
					warn!(path = %path.display(), "Giving up on file after {attempt} writes: {e}");
					reporter.on_skipped(&path, SkipReason::WriteFailed(e.to_string()));
				}
			}
		}

		Ok(())
	}
}

fn canonical_location(location: &Path) -> Result<PathBuf, ImportError> {
	std::fs::canonicalize(location).map_err(|e| {
		ImportError::SourceUnavailable(PathIoError::new(location, "resolving source", e))
	})
}
