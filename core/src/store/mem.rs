//! In-memory document store.

use std::{
	collections::{BTreeMap, HashMap},
	net::SocketAddr,
	sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::{
	generate_node_key, node_id_of, ConnectionInfo, DocumentHandle, DocumentInfo, DocumentStore,
	Entry, EntryWrite, NodeStatus, ShareMode, ShareTicket, StoreError,
};
use crate::domain::{AuthorId, DocumentId, EntryKey, NodeId};

struct MemDocument {
	capability: ShareMode,
	entries: BTreeMap<EntryKey, (Entry, Bytes)>,
}

impl MemDocument {
	fn new(capability: ShareMode) -> Self {
		Self {
			capability,
			entries: BTreeMap::new(),
		}
	}
}

pub struct MemStore {
	node_id: NodeId,
	author: AuthorId,
	listen_addrs: Vec<SocketAddr>,
	docs: RwLock<HashMap<DocumentId, MemDocument>>,
	peers: RwLock<Vec<ConnectionInfo>>,
	pending_failures: AtomicUsize,
	writes: AtomicU64,
}

impl Default for MemStore {
	fn default() -> Self {
		Self::new()
	}
}

impl MemStore {
	pub fn new() -> Self {
		Self {
			node_id: node_id_of(&generate_node_key()),
			author: AuthorId::new(),
			listen_addrs: Vec::new(),
			docs: RwLock::new(HashMap::new()),
			peers: RwLock::new(Vec::new()),
			pending_failures: AtomicUsize::new(0),
			writes: AtomicU64::new(0),
		}
	}

	pub fn with_listen_addrs(mut self, addrs: Vec<SocketAddr>) -> Self {
		self.listen_addrs = addrs;
		self
	}

	/// Makes the next `count` writes fail with [`StoreError::WriteRejected`]
	pub fn fail_next_writes(&self, count: usize) {
		self.pending_failures.store(count, Ordering::SeqCst);
	}

	/// Number of writes that reached a document
	pub fn write_count(&self) -> u64 {
		self.writes.load(Ordering::SeqCst)
	}

	/// Registers a peer to be reported by [`DocumentStore::connections`]
	pub fn add_peer(&self, peer: ConnectionInfo) {
		self.peers.write().push(peer);
	}

	fn take_failure(&self) -> bool {
		self.pending_failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
	}
}

#[async_trait]
impl DocumentStore for MemStore {
	fn node_id(&self) -> NodeId {
		self.node_id
	}

	fn default_author(&self) -> AuthorId {
		self.author
	}

	async fn status(&self) -> Result<NodeStatus, StoreError> {
		Ok(NodeStatus::new(self.node_id, self.listen_addrs.clone()))
	}

	async fn create_document(&self) -> Result<DocumentId, StoreError> {
		let id = DocumentId::new();
		self.docs
			.write()
			.insert(id, MemDocument::new(ShareMode::Write));
		debug!(%id, "Created in-memory document");
		Ok(id)
	}

	async fn join_document(&self, ticket: &ShareTicket) -> Result<DocumentId, StoreError> {
		let id = ticket.document_id;
		let mut docs = self.docs.write();
		let document = docs
			.entry(id)
			.or_insert_with(|| MemDocument::new(ticket.mode));
		if ticket.mode.covers(document.capability) {
			document.capability = ticket.mode;
		}
		debug!(%id, capability = %document.capability, "Joined in-memory document");
		Ok(id)
	}

	async fn open_document(&self, id: DocumentId) -> Result<Option<DocumentHandle>, StoreError> {
		Ok(self
			.docs
			.read()
			.get(&id)
			.map(|document| DocumentHandle::new(id, document.capability)))
	}

	async fn drop_document(&self, id: DocumentId) -> Result<(), StoreError> {
		self.docs
			.write()
			.remove(&id)
			.map(|_| ())
			.ok_or(StoreError::DocumentNotFound(id))
	}

	async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
		let mut docs = self
			.docs
			.read()
			.iter()
			.map(|(id, document)| DocumentInfo {
				id: *id,
				capability: document.capability,
			})
			.collect::<Vec<_>>();
		docs.sort_by_key(|info| info.id);
		Ok(docs)
	}

	async fn write_entry(
		&self,
		doc: &DocumentHandle,
		write: EntryWrite,
	) -> Result<Entry, StoreError> {
		if self.take_failure() {
			return Err(StoreError::WriteRejected {
				key: write.key,
				reason: "injected failure".to_string(),
			});
		}

		let mut docs = self.docs.write();
		let document = docs
			.get_mut(&doc.id())
			.ok_or(StoreError::DocumentClosed(doc.id()))?;
		if document.capability != ShareMode::Write {
			return Err(StoreError::ReadOnly(doc.id()));
		}

		let (entry, content) = write.into_entry();
		document
			.entries
			.insert(entry.key.clone(), (entry.clone(), content));
		self.writes.fetch_add(1, Ordering::SeqCst);

		Ok(entry)
	}

	async fn get_entry(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Entry>, StoreError> {
		let docs = self.docs.read();
		let document = docs
			.get(&doc.id())
			.ok_or(StoreError::DocumentClosed(doc.id()))?;

		Ok(document.entries.get(key).map(|(entry, _)| entry.clone()))
	}

	async fn list_entries(&self, doc: &DocumentHandle) -> Result<Vec<Entry>, StoreError> {
		let docs = self.docs.read();
		let document = docs
			.get(&doc.id())
			.ok_or(StoreError::DocumentClosed(doc.id()))?;

		Ok(document
			.entries
			.values()
			.map(|(entry, _)| entry.clone())
			.collect())
	}

	async fn read_content(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Bytes>, StoreError> {
		let docs = self.docs.read();
		let document = docs
			.get(&doc.id())
			.ok_or(StoreError::DocumentClosed(doc.id()))?;

		Ok(document.entries.get(key).map(|(_, content)| content.clone()))
	}

	async fn share(
		&self,
		doc: &DocumentHandle,
		mode: ShareMode,
	) -> Result<ShareTicket, StoreError> {
		let capability = self
			.docs
			.read()
			.get(&doc.id())
			.map(|document| document.capability)
			.ok_or(StoreError::DocumentClosed(doc.id()))?;
		if !capability.covers(mode) {
			return Err(StoreError::ReadOnly(doc.id()));
		}

		Ok(ShareTicket::new(
			doc.id(),
			mode,
			self.node_id,
			self.listen_addrs.clone(),
		))
	}

	async fn connections(&self) -> Result<Vec<ConnectionInfo>, StoreError> {
		Ok(self.peers.read().clone())
	}
}
