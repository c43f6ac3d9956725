//! Document store persisted to a local redb database.
//!
//! Layout:
//! - `meta`: node secret key and default author
//! - `documents`: document id -> (creation time in unix millis, capability)
//! - `entries`: document id bytes ++ entry key -> MessagePack encoded [`Entry`]
//! - `content`: blake3 hash -> bytes, only for entries imported as copies
//!
//! Peers are never connected from here, so [`DocumentStore::connections`] is
//! always empty.

use std::{net::SocketAddr, path::Path, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use ed25519_dalek::SigningKey;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};
use treesync_utils::{uuid_from_bytes, uuid_to_bytes};

use super::{
	generate_node_key, node_id_of, read_referenced, ConnectionInfo, DocumentHandle,
	DocumentInfo, DocumentStore, Entry, EntryWrite, NodeStatus, ShareMode, ShareTicket,
	StoreError,
};
use crate::{
	domain::{AuthorId, DocumentId, EntryKey, NodeId},
	util::db::open_database,
};

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const DOCUMENTS_TABLE: TableDefinition<u128, (i64, u8)> = TableDefinition::new("documents");
const ENTRIES_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("entries");
const CONTENT_TABLE: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("content");

const NODE_SECRET_ID: &str = "node_secret";
const DEFAULT_AUTHOR_ID: &str = "default_author";

pub struct LocalStore {
	db: Arc<Database>,
	node_key: SigningKey,
	author: AuthorId,
	listen_addrs: Vec<SocketAddr>,
}

impl LocalStore {
	/// Opens or creates the store at `path`. The node advertises
	/// `listen_addrs` in its status and in the tickets it hands out.
	pub fn open(path: impl AsRef<Path>, listen_addrs: Vec<SocketAddr>) -> Result<Self, StoreError> {
		let path = path.as_ref();
		let db = open_database(path, |txn| {
			txn.open_table(META_TABLE)?;
			txn.open_table(DOCUMENTS_TABLE)?;
			txn.open_table(ENTRIES_TABLE)?;
			txn.open_table(CONTENT_TABLE)?;
			Ok(())
		})?;

		let (node_key, author) = load_identity(&db)?;
		info!(
			node_id = %node_id_of(&node_key),
			path = %path.display(),
			"Opened local document store"
		);

		Ok(Self {
			db: Arc::new(db),
			node_key,
			author,
			listen_addrs,
		})
	}

	async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
	where
		F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
		T: Send + 'static,
	{
		let db = Arc::clone(&self.db);
		tokio::task::spawn_blocking(move || f(&db)).await?
	}
}

fn load_identity(db: &Database) -> Result<(SigningKey, AuthorId), StoreError> {
	let txn = db.begin_write()?;
	let identity = {
		let mut meta = txn.open_table(META_TABLE)?;

		let stored_secret = meta.get(NODE_SECRET_ID)?.map(|guard| guard.value().to_vec());
		let node_key = match stored_secret {
			Some(bytes) => {
				let secret: [u8; 32] = bytes
					.as_slice()
					.try_into()
					.map_err(|_| StoreError::Corrupted("node secret key".to_string()))?;
				SigningKey::from_bytes(&secret)
			}
			None => {
				let key = generate_node_key();
				meta.insert(NODE_SECRET_ID, key.to_bytes().as_slice())?;
				debug!("Generated new node key");
				key
			}
		};

		let stored_author = meta.get(DEFAULT_AUTHOR_ID)?.map(|guard| guard.value().to_vec());
		let author = match stored_author {
			Some(bytes) => uuid_from_bytes(&bytes)
				.map(AuthorId::from_uuid)
				.ok_or_else(|| StoreError::Corrupted("default author".to_string()))?,
			None => {
				let author = AuthorId::new();
				meta.insert(DEFAULT_AUTHOR_ID, author.as_uuid().as_bytes().as_slice())?;
				author
			}
		};

		(node_key, author)
	};
	txn.commit()?;

	Ok(identity)
}

fn document_prefix(id: DocumentId) -> Vec<u8> {
	uuid_to_bytes(*id.as_uuid())
}

fn entry_row(id: DocumentId, key: &EntryKey) -> Vec<u8> {
	let mut row = document_prefix(id);
	row.extend_from_slice(key.as_bytes());
	row
}

fn capability_to_byte(capability: ShareMode) -> u8 {
	match capability {
		ShareMode::Read => 0,
		ShareMode::Write => 1,
	}
}

fn capability_from_byte(id: DocumentId, byte: u8) -> Result<ShareMode, StoreError> {
	match byte {
		0 => Ok(ShareMode::Read),
		1 => Ok(ShareMode::Write),
		other => Err(StoreError::Corrupted(format!(
			"capability {other} of document {id}"
		))),
	}
}

/// Capability held on an open document, [`StoreError::DocumentClosed`] if gone
fn capability_of(
	documents: &impl ReadableTable<u128, (i64, u8)>,
	id: DocumentId,
) -> Result<ShareMode, StoreError> {
	let byte = documents
		.get(id.as_u128())?
		.map(|row| row.value().1)
		.ok_or(StoreError::DocumentClosed(id))?;
	capability_from_byte(id, byte)
}

fn read_entry(db: &Database, id: DocumentId, key: &EntryKey) -> Result<Option<Entry>, StoreError> {
	let txn = db.begin_read()?;
	capability_of(&txn.open_table(DOCUMENTS_TABLE)?, id)?;

	let entries = txn.open_table(ENTRIES_TABLE)?;
	let row = entries.get(entry_row(id, key).as_slice())?;

	row.map(|guard| rmp_serde::from_slice::<Entry>(guard.value()).map_err(StoreError::from))
		.transpose()
}

#[async_trait]
impl DocumentStore for LocalStore {
	fn node_id(&self) -> NodeId {
		node_id_of(&self.node_key)
	}

	fn default_author(&self) -> AuthorId {
		self.author
	}

	async fn status(&self) -> Result<NodeStatus, StoreError> {
		Ok(NodeStatus::new(self.node_id(), self.listen_addrs.clone()))
	}

	async fn create_document(&self) -> Result<DocumentId, StoreError> {
		let id = DocumentId::new();
		self.with_db(move |db| {
			let txn = db.begin_write()?;
			{
				let mut documents = txn.open_table(DOCUMENTS_TABLE)?;
				documents.insert(
					id.as_u128(),
					(
						Utc::now().timestamp_millis(),
						capability_to_byte(ShareMode::Write),
					),
				)?;
			}
			txn.commit()?;
			Ok(())
		})
		.await?;

		debug!(%id, "Created document");
		Ok(id)
	}

	async fn join_document(&self, ticket: &ShareTicket) -> Result<DocumentId, StoreError> {
		let id = ticket.document_id;
		let offered = ticket.mode;
		let capability = self
			.with_db(move |db| {
				let txn = db.begin_write()?;
				let capability = {
					let mut documents = txn.open_table(DOCUMENTS_TABLE)?;
					let held = documents
						.get(id.as_u128())?
						.map(|row| row.value());
					let (created_at, capability) = match held {
						Some((created_at, byte)) => {
							let held = capability_from_byte(id, byte)?;
							(created_at, if offered.covers(held) { offered } else { held })
						}
						None => (Utc::now().timestamp_millis(), offered),
					};
					documents.insert(id.as_u128(), (created_at, capability_to_byte(capability)))?;
					capability
				};
				txn.commit()?;
				Ok(capability)
			})
			.await?;

		info!(%id, %capability, "Joined document");
		Ok(id)
	}

	async fn open_document(&self, id: DocumentId) -> Result<Option<DocumentHandle>, StoreError> {
		self.with_db(move |db| {
			let txn = db.begin_read()?;
			let documents = txn.open_table(DOCUMENTS_TABLE)?;
			let Some(row) = documents.get(id.as_u128())? else {
				return Ok(None);
			};
			let capability = capability_from_byte(id, row.value().1)?;
			Ok(Some(DocumentHandle::new(id, capability)))
		})
		.await
	}

	async fn drop_document(&self, id: DocumentId) -> Result<(), StoreError> {
		let removed = self
			.with_db(move |db| {
				let txn = db.begin_write()?;
				let removed = {
					let mut documents = txn.open_table(DOCUMENTS_TABLE)?;
					if documents.remove(id.as_u128())?.is_none() {
						return Err(StoreError::DocumentNotFound(id));
					}

					let prefix = document_prefix(id);
					let mut entries = txn.open_table(ENTRIES_TABLE)?;
					let mut rows = Vec::new();
					for item in entries.range(prefix.as_slice()..)? {
						let (row, _) = item?;
						if !row.value().starts_with(&prefix) {
							break;
						}
						rows.push(row.value().to_vec());
					}

					for row in &rows {
						entries.remove(row.as_slice())?;
					}
					rows.len()
				};
				txn.commit()?;
				Ok(removed)
			})
			.await?;

		// TODO: collect blobs in `content` that no dropped entry references anymore
		info!(%id, entries = removed, "Dropped document");
		Ok(())
	}

	async fn list_documents(&self) -> Result<Vec<DocumentInfo>, StoreError> {
		self.with_db(|db| {
			let txn = db.begin_read()?;
			let documents = txn.open_table(DOCUMENTS_TABLE)?;

			let mut docs = Vec::new();
			for item in documents.iter()? {
				let (id, row) = item?;
				let id = DocumentId::from_u128(id.value());
				docs.push(DocumentInfo {
					id,
					capability: capability_from_byte(id, row.value().1)?,
				});
			}
			Ok(docs)
		})
		.await
	}

	async fn write_entry(
		&self,
		doc: &DocumentHandle,
		write: EntryWrite,
	) -> Result<Entry, StoreError> {
		let id = doc.id();
		let (entry, content) = write.into_entry();
		let encoded = rmp_serde::to_vec(&entry)?;
		let keep_copy = entry.origin.is_none();
		let row = entry_row(id, &entry.key);
		let hash = *entry.hash.as_bytes();

		self.with_db(move |db| {
			let txn = db.begin_write()?;
			{
				if capability_of(&txn.open_table(DOCUMENTS_TABLE)?, id)? != ShareMode::Write {
					return Err(StoreError::ReadOnly(id));
				}

				if keep_copy {
					let mut blobs = txn.open_table(CONTENT_TABLE)?;
					blobs.insert(&hash, &content[..])?;
				}

				let mut entries = txn.open_table(ENTRIES_TABLE)?;
				entries.insert(row.as_slice(), encoded.as_slice())?;
			}
			txn.commit()?;
			Ok(())
		})
		.await?;

		Ok(entry)
	}

	async fn get_entry(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Entry>, StoreError> {
		let id = doc.id();
		let key = key.clone();
		self.with_db(move |db| read_entry(db, id, &key)).await
	}

	async fn list_entries(&self, doc: &DocumentHandle) -> Result<Vec<Entry>, StoreError> {
		let id = doc.id();
		self.with_db(move |db| {
			let txn = db.begin_read()?;
			capability_of(&txn.open_table(DOCUMENTS_TABLE)?, id)?;

			let prefix = document_prefix(id);
			let entries = txn.open_table(ENTRIES_TABLE)?;
			let mut out: Vec<Entry> = Vec::new();
			for item in entries.range(prefix.as_slice()..)? {
				let (row, value) = item?;
				if !row.value().starts_with(&prefix) {
					break;
				}
				out.push(rmp_serde::from_slice(value.value())?);
			}
			Ok(out)
		})
		.await
	}

	async fn read_content(
		&self,
		doc: &DocumentHandle,
		key: &EntryKey,
	) -> Result<Option<Bytes>, StoreError> {
		let Some(entry) = self.get_entry(doc, key).await? else {
			return Ok(None);
		};

		if entry.origin.is_some() {
			return read_referenced(&entry).await;
		}

		let hash = *entry.hash.as_bytes();
		self.with_db(move |db| {
			let txn = db.begin_read()?;
			let blobs = txn.open_table(CONTENT_TABLE)?;
			let content = blobs
				.get(&hash)?
				.map(|guard| Bytes::copy_from_slice(guard.value()));
			Ok(content)
		})
		.await
	}

	async fn share(
		&self,
		doc: &DocumentHandle,
		mode: ShareMode,
	) -> Result<ShareTicket, StoreError> {
		let id = doc.id();
		let capability = self
			.with_db(move |db| {
				let txn = db.begin_read()?;
				capability_of(&txn.open_table(DOCUMENTS_TABLE)?, id)
			})
			.await?;
		if !capability.covers(mode) {
			return Err(StoreError::ReadOnly(id));
		}

		Ok(ShareTicket::new(
			id,
			mode,
			self.node_id(),
			self.listen_addrs.clone(),
		))
	}

	async fn connections(&self) -> Result<Vec<ConnectionInfo>, StoreError> {
		Ok(Vec::new())
	}
}
