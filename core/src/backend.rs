//! Orchestration of documents, their sources and import passes.
//!
//! The [`Backend`] owns the document store, the [`SourceRegistry`] and the
//! [`Reconciler`], and keeps them consistent with each other: sources can only
//! be attached to existing documents, and dropping a document forgets its
//! sources. Documents joined read-only never get sources or imports.

use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::Arc,
};

use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use treesync_utils::error::PathIoError;

use crate::{
	config::AppConfig,
	domain::{DocumentId, NodeId, Source, UpdateStatus},
	ops::import::{ImportError, ImportHandle, ImportOptions, Reconciler},
	source::{resolve_location, RegistryError, ResolveError, SourceRegistry},
	store::{
		ConnectionInfo, DocumentHandle, DocumentInfo, DocumentStore, Entry, LocalStore,
		NodeStatus, ShareMode, ShareTicket, StoreError,
	},
};

#[derive(Error, Debug)]
pub enum BackendError {
	#[error("document not found: {0}")]
	DocumentNotFound(DocumentId),
	#[error("document {0} is read-only on this node")]
	ReadOnly(DocumentId),
	#[error("no storage root configured to resolve {0}")]
	NoStorageRoot(String),
	#[error("invalid ignore pattern: {0}")]
	IgnoreRules(#[from] globset::Error),

	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Import(#[from] ImportError),
	#[error(transparent)]
	Resolve(#[from] ResolveError),
	#[error(transparent)]
	Io(#[from] PathIoError),
}

/// Outcome of importing every source of a document
#[derive(Debug)]
pub struct ImportReport {
	/// Counts summed over the sources that completed
	pub status: UpdateStatus,
	/// Sources whose pass failed, with the reason
	pub failures: Vec<(PathBuf, ImportError)>,
	/// Entries in the document once all passes were done
	pub total_files: u64,
}

pub struct Backend {
	store: Arc<dyn DocumentStore>,
	registry: Arc<SourceRegistry>,
	reconciler: Arc<Reconciler>,
	config: AppConfig,
}

impl Backend {
	/// Opens the on-disk store and registry in the configured data directory
	pub fn open(config: AppConfig) -> Result<Self, BackendError> {
		let store = LocalStore::open(config.documents_db(), config.node.listen_addrs.clone())?;
		let registry = SourceRegistry::open(config.sources_db())?;
		Self::new(Arc::new(store), Arc::new(registry), config)
	}

	pub fn new(
		store: Arc<dyn DocumentStore>,
		registry: Arc<SourceRegistry>,
		config: AppConfig,
	) -> Result<Self, BackendError> {
		let rules = config.import.ignore_rules()?;
		let reconciler = Arc::new(Reconciler::new(Arc::clone(&store), rules));

		Ok(Self {
			store,
			registry,
			reconciler,
			config,
		})
	}

	pub fn store(&self) -> &Arc<dyn DocumentStore> {
		&self.store
	}

	pub fn config(&self) -> &AppConfig {
		&self.config
	}

	pub fn node_id(&self) -> NodeId {
		self.store.node_id()
	}

	pub async fn status(&self) -> Result<NodeStatus, BackendError> {
		Ok(self.store.status().await?)
	}

	pub async fn connections(&self) -> Result<Vec<ConnectionInfo>, BackendError> {
		Ok(self.store.connections().await?)
	}

	pub async fn create_document(&self) -> Result<DocumentId, BackendError> {
		let id = self.store.create_document().await?;
		info!(document_id = %id, "Created document");
		Ok(id)
	}

	/// Documents on this node with the access held on each
	pub async fn list_documents(&self) -> Result<Vec<DocumentInfo>, BackendError> {
		Ok(self.store.list_documents().await?)
	}

	/// Adds the document behind a share ticket to this node
	pub async fn join_document(&self, ticket: &ShareTicket) -> Result<DocumentId, BackendError> {
		let id = self.store.join_document(ticket).await?;
		info!(document_id = %id, mode = %ticket.mode, peer = %ticket.node_id.short(), "Joined document");
		Ok(id)
	}

	/// Drops a document from the store, then forgets its sources and count
	pub async fn drop_document(&self, id: DocumentId) -> Result<(), BackendError> {
		self.store.drop_document(id).await?;
		let purged = self.registry.purge(id)?;
		info!(document_id = %id, purged, "Dropped document");
		Ok(())
	}

	pub async fn share(
		&self,
		id: DocumentId,
		mode: ShareMode,
	) -> Result<ShareTicket, BackendError> {
		let doc = self.open_doc(id).await?;
		Ok(self.store.share(&doc, mode).await?)
	}

	pub async fn entries(&self, id: DocumentId) -> Result<Vec<Entry>, BackendError> {
		let doc = self.open_doc(id).await?;
		Ok(self.store.list_entries(&doc).await?)
	}

	/// Attaches a location to a document. Nothing is imported yet.
	pub async fn add_source(
		&self,
		id: DocumentId,
		location: impl AsRef<Path>,
	) -> Result<bool, BackendError> {
		self.open_writable(id).await?;
		let location = absolute(location.as_ref())?;
		Ok(self.registry.add(id, location)?)
	}

	/// Like [`Self::add_source`], for a `file://`/document-tree URI or a path
	pub async fn add_source_uri(&self, id: DocumentId, uri: &str) -> Result<bool, BackendError> {
		let storage_root = self
			.config
			.import
			.storage_root()
			.ok_or_else(|| BackendError::NoStorageRoot(uri.to_string()))?;
		let location = resolve_location(uri, &storage_root)?;
		debug!(uri, location = %location.display(), "Resolved location");
		self.add_source(id, location).await
	}

	pub fn remove_source(
		&self,
		id: DocumentId,
		location: impl AsRef<Path>,
	) -> Result<bool, BackendError> {
		let location = absolute(location.as_ref())?;
		Ok(self.registry.remove(id, location)?)
	}

	pub fn sources(&self, id: DocumentId) -> Result<Vec<Source>, BackendError> {
		Ok(self
			.registry
			.list(id)?
			.into_iter()
			.map(|path| Source::new(id, path))
			.collect())
	}

	/// Forgets sources still registered for documents the store no longer
	/// holds, as left behind by a drop that failed halfway. Returns how many
	/// sources were removed.
	pub async fn prune_orphaned_sources(&self) -> Result<usize, BackendError> {
		let held = self
			.store
			.list_documents()
			.await?
			.into_iter()
			.map(|info| info.id)
			.collect::<HashSet<_>>();

		let mut removed = 0;
		for id in self.registry.documents()? {
			if !held.contains(&id) {
				removed += self.registry.purge(id)?;
			}
		}

		if removed > 0 {
			info!(removed, "Pruned orphaned sources");
		}
		Ok(removed)
	}

	/// File count recorded after the last full import of the document
	pub fn file_count(&self, id: DocumentId) -> Result<u64, BackendError> {
		Ok(self.registry.count(id)?)
	}

	/// Recounts the document's entries and records the result
	pub async fn refresh_count(&self, id: DocumentId) -> Result<u64, BackendError> {
		let doc = self.open_doc(id).await?;
		let count = self.store.list_entries(&doc).await?.len() as u64;
		self.registry.set_count(id, count)?;
		Ok(count)
	}

	/// Starts a pass of one location into a document on its own task
	pub async fn spawn_import(
		&self,
		id: DocumentId,
		location: impl AsRef<Path>,
		options: ImportOptions,
	) -> Result<ImportHandle, BackendError> {
		let doc = self.open_writable(id).await?;
		Ok(ImportHandle::spawn(
			Arc::clone(&self.reconciler),
			doc,
			location.as_ref(),
			self.store.default_author(),
			options,
			self.config.import.event_buffer,
		)?)
	}

	/// Imports every source of a document concurrently and records the new
	/// file count. A failing source doesn't stop the others.
	#[instrument(skip(self, options), fields(document_id = %id))]
	pub async fn sync_document(
		&self,
		id: DocumentId,
		options: ImportOptions,
	) -> Result<ImportReport, BackendError> {
		let mut failures = Vec::new();
		let mut handles = Vec::new();

		for location in self.registry.list(id)? {
			match self.spawn_import(id, &location, options).await {
				Ok(handle) => handles.push((location, handle)),
				Err(BackendError::Import(e)) => {
					warn!(location = %location.display(), "Import not started: {e}");
					failures.push((location, e));
				}
				Err(e) => return Err(e),
			}
		}

		let mut status = UpdateStatus::default();
		let results = join_all(handles.into_iter().map(|(location, handle)| async move {
			(location, handle.join().await)
		}))
		.await;

		for (location, res) in results {
			match res {
				Ok(pass) => status += pass,
				Err(ImportError::DocumentClosed(id)) => {
					return Err(BackendError::DocumentNotFound(id));
				}
				Err(e) => {
					warn!(location = %location.display(), "Import failed: {e}");
					failures.push((location, e));
				}
			}
		}

		let total_files = self.refresh_count(id).await?;
		info!(%status, total_files, failed = failures.len(), "Document synced");

		Ok(ImportReport {
			status,
			failures,
			total_files,
		})
	}

	async fn open_doc(&self, id: DocumentId) -> Result<DocumentHandle, BackendError> {
		self.store
			.open_document(id)
			.await?
			.ok_or(BackendError::DocumentNotFound(id))
	}

	async fn open_writable(&self, id: DocumentId) -> Result<DocumentHandle, BackendError> {
		let doc = self.open_doc(id).await?;
		if !doc.is_writable() {
			return Err(BackendError::ReadOnly(id));
		}
		Ok(doc)
	}
}

fn absolute(location: &Path) -> Result<PathBuf, PathIoError> {
	std::path::absolute(location).map_err(PathIoError::on(location, "resolving"))
}
