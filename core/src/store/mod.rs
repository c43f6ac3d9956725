//! Document store facade
//!
//! The node that actually owns documents, entries and peers sits behind the
//! [`DocumentStore`] trait. The import pipeline and the [`Backend`](crate::Backend)
//! only ever talk to a `dyn DocumentStore`.
//!
//! Two implementations live here:
//! - [`MemStore`]: everything in memory, used by tests and throwaway sessions
//! - [`LocalStore`]: documents persisted to a redb file in the data directory

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use treesync_utils::error::PathIoError;

use crate::{
	domain::{AuthorId, DocumentId, EntryKey, NodeId},
	util::db::impl_from_redb,
};

pub mod local;
pub mod mem;
pub mod ticket;

pub use local::LocalStore;
pub use mem::MemStore;
pub use ticket::{ShareTicket, TicketError};

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("document not found: {0}")]
	DocumentNotFound(DocumentId),
	#[error("document {0} is no longer open")]
	DocumentClosed(DocumentId),
	#[error("document {0} was joined read-only")]
	ReadOnly(DocumentId),
	#[error("write rejected for {key}: {reason}")]
	WriteRejected { key: EntryKey, reason: String },
	#[error("referenced content changed on disk (path: {0:?})")]
	StaleReference(PathBuf),
	#[error("corrupted record: {0}")]
	Corrupted(String),

	#[error(transparent)]
	Io(#[from] PathIoError),
	#[error("database error: {0}")]
	Database(Box<redb::Error>),
	#[error("failed to encode record: {0}")]
	Encode(#[from] rmp_serde::encode::Error),
	#[error("failed to decode record: {0}")]
	Decode(#[from] rmp_serde::decode::Error),
	#[error("store task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

impl_from_redb!(StoreError);

impl StoreError {
	/// Whether the document the operation targeted is gone, as opposed to a
	/// failure of this particular operation
	pub fn is_document_gone(&self) -> bool {
		matches!(
			self,
			Self::DocumentClosed(_) | Self::DocumentNotFound(_)
		)
	}
}

/// Token for an open document. Every store call revalidates it, so a handle
/// outliving a dropped document yields [`StoreError::DocumentClosed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
	id: DocumentId,
	capability: ShareMode,
}

impl DocumentHandle {
	pub const fn new(id: DocumentId, capability: ShareMode) -> Self {
		Self { id, capability }
	}

	pub const fn id(&self) -> DocumentId {
		self.id
	}

	/// What this node may do with the document
	pub const fn capability(&self) -> ShareMode {
		self.capability
	}

	pub fn is_writable(&self) -> bool {
		self.capability == ShareMode::Write
	}
}

/// A document known to the node and the access it holds on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
	pub id: DocumentId,
	pub capability: ShareMode,
}

/// What the node reports about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
	pub node_id: NodeId,
	/// Addresses the node advertises to peers, also embedded in share tickets
	pub listen_addrs: Vec<SocketAddr>,
	pub version: String,
}

impl NodeStatus {
	pub(crate) fn new(node_id: NodeId, listen_addrs: Vec<SocketAddr>) -> Self {
		Self {
			node_id,
			listen_addrs,
			version: env!("CARGO_PKG_VERSION").to_string(),
		}
	}
}

/// blake3 digest of an entry's content
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
	pub fn of(content: &[u8]) -> Self {
		Self(*blake3::hash(content).as_bytes())
	}

	pub const fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub const fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}
}

impl std::fmt::Debug for ContentHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ContentHash({})", hex::encode(&self.0[..8]))
	}
}

impl std::fmt::Display for ContentHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

/// How the store should hold on to imported bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportMode {
	/// Keep a reference to the original file and read it back on demand
	#[default]
	TryReference,
	/// Store an independent copy of the bytes
	Copy,
}

impl ImportMode {
	pub const fn from_in_place(in_place: bool) -> Self {
		if in_place {
			Self::TryReference
		} else {
			Self::Copy
		}
	}
}

/// A stored key-value record of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
	pub key: EntryKey,
	pub author: AuthorId,
	pub hash: ContentHash,
	pub size: u64,
	pub timestamp: DateTime<Utc>,
	/// Set when the entry was written by reference to a file on disk
	pub origin: Option<PathBuf>,
}

/// A write request against a document
#[derive(Debug, Clone)]
pub struct EntryWrite {
	pub key: EntryKey,
	pub author: AuthorId,
	pub content: Bytes,
	pub mode: ImportMode,
	pub origin: Option<PathBuf>,
}

impl EntryWrite {
	pub(crate) fn into_entry(self) -> (Entry, Bytes) {
		let origin = match self.mode {
			ImportMode::TryReference => self.origin,
			ImportMode::Copy => None,
		};
		let entry = Entry {
			hash: ContentHash::of(&self.content),
			size: self.content.len() as u64,
			key: self.key,
			author: self.author,
			timestamp: Utc::now(),
			origin,
		};
		(entry, self.content)
	}
}

/// Access granted by a ticket, and held by a node on a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareMode {
	Read,
	Write,
}

impl ShareMode {
	/// Whether holding `self` allows granting `other`
	pub fn covers(self, other: Self) -> bool {
		self == Self::Write || other == Self::Read
	}
}

impl std::fmt::Display for ShareMode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Read => f.write_str("read"),
			Self::Write => f.write_str("write"),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnType {
	Direct,
	Relay,
	Mixed,
	None,
}

impl std::fmt::Display for ConnType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Self::Direct => "direct",
			Self::Relay => "relay",
			Self::Mixed => "mixed",
			Self::None => "none",
		};
		f.write_str(s)
	}
}

/// One peer the node currently knows a path to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
	pub node_id: NodeId,
	pub conn_type: ConnType,
	pub last_used: Option<Duration>,
	pub latency: Option<Duration>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
	/// Identity of the node serving this store
	fn node_id(&self) -> NodeId;

	/// Author used when callers don't bring their own
	fn default_author(&self) -> AuthorId;

	async fn status(&self) -> Result<NodeStatus, StoreError>;

	async fn create_document(&self) -> Result<DocumentId, StoreError>;

	/// Adds the document a ticket points at with the ticket's access. Joining
	/// a document already held keeps the wider of the two capabilities.
	async fn join_document(&self, ticket: &ShareTicket) -> Result<DocumentId, StoreError>;

	/// Opens a document for reading and writing, `None` if it doesn't exist
	async fn open_document(&self, id: DocumentId) -> Result<Option<DocumentHandle>, StoreError>;

	/// Removes a document and everything written to it
	async fn drop_document(&self, id: DocumentId) -> Result<(), StoreError>;

	/// Documents held by the node, ordered by id
	async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError>;

	/// Fails with [`StoreError::ReadOnly`] for documents joined read-only
	async fn write_entry(
		&self,
		doc: &DocumentHandle,
		write: EntryWrite,
	) -> Result<Entry, StoreError>;

	async fn get_entry(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Entry>, StoreError>;

	async fn list_entries(&self, doc: &DocumentHandle) -> Result<Vec<Entry>, StoreError>;

	/// Bytes of an entry, following the origin path for entries stored by reference
	async fn read_content(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Bytes>, StoreError>;

	/// Fails with [`StoreError::ReadOnly`] when asked to grant write access
	/// to a document held read-only
	async fn share(&self, doc: &DocumentHandle, mode: ShareMode)
		-> Result<ShareTicket, StoreError>;

	async fn connections(&self) -> Result<Vec<ConnectionInfo>, StoreError>;
}

pub(crate) fn generate_node_key() -> SigningKey {
	SigningKey::from_bytes(&rand::random())
}

pub(crate) fn node_id_of(key: &SigningKey) -> NodeId {
	NodeId::from_bytes(key.verifying_key().to_bytes())
}

/// Reads an entry stored by reference back from disk, refusing content that no
/// longer matches the recorded hash
pub(crate) async fn read_referenced(entry: &Entry) -> Result<Option<Bytes>, StoreError> {
	let Some(origin) = &entry.origin else {
		return Ok(None);
	};

	let content = tokio::fs::read(origin)
		.await
		.map_err(PathIoError::on(origin, "reading referenced entry"))?;

	if ContentHash::of(&content) != entry.hash {
		return Err(StoreError::StaleReference(origin.clone()));
	}

	Ok(Some(Bytes::from(content)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn copy_mode_drops_origin() {
		let write = EntryWrite {
			key: EntryKey::from_path("/a").unwrap(),
			author: AuthorId::new(),
			content: Bytes::from_static(b"hello"),
			mode: ImportMode::Copy,
			origin: Some(PathBuf::from("/a")),
		};

		let (entry, content) = write.into_entry();
		assert_eq!(entry.origin, None);
		assert_eq!(entry.size, 5);
		assert_eq!(entry.hash, ContentHash::of(b"hello"));
		assert_eq!(&content[..], b"hello");
	}

	#[test]
	fn read_only_cannot_grant_write() {
		assert!(ShareMode::Write.covers(ShareMode::Write));
		assert!(ShareMode::Write.covers(ShareMode::Read));
		assert!(ShareMode::Read.covers(ShareMode::Read));
		assert!(!ShareMode::Read.covers(ShareMode::Write));
	}

	#[test]
	fn in_place_maps_to_reference() {
		assert_eq!(ImportMode::from_in_place(true), ImportMode::TryReference);
		assert_eq!(ImportMode::from_in_place(false), ImportMode::Copy);
	}
}
