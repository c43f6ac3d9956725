//! Backend integration tests
//!
//! Covers the document/source bookkeeping around import passes:
//! - Sources only attach to existing documents
//! - Dropping a document forgets its sources
//! - Concurrent passes on the same location are rejected
//! - Read-only documents refuse sources and imports
//! - Orphaned sources are pruned
//! - Everything survives reopening the on-disk store

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use treesync_core::{
	AppConfig, Backend, BackendError, DocumentId, DocumentInfo, DocumentStore, ImportError,
	ImportEvent, ImportOptions, MemStore, NodeId, ShareMode, ShareTicket, SourceRegistry,
	UpdateStatus,
};

fn mem_backend(data_dir: &TempDir) -> Backend {
	let config = AppConfig::default_with_dir(data_dir.path().to_path_buf());
	let registry = SourceRegistry::open(config.sources_db()).unwrap();
	Backend::new(Arc::new(MemStore::new()), Arc::new(registry), config).unwrap()
}

fn source_paths(backend: &Backend, doc: DocumentId) -> Vec<PathBuf> {
	backend
		.sources(doc)
		.unwrap()
		.into_iter()
		.map(|source| {
			assert_eq!(source.document_id, doc);
			source.path
		})
		.collect()
}

fn source_dir(root: &TempDir, name: &str, files: &[&str]) -> PathBuf {
	let dir = root.path().join(name);
	std::fs::create_dir_all(&dir).unwrap();
	for file in files {
		std::fs::write(dir.join(file), file.as_bytes()).unwrap();
	}
	dir
}

#[tokio::test]
async fn test_add_source_requires_document() {
	let data = TempDir::new().unwrap();
	let backend = mem_backend(&data);
	let missing = DocumentId::new();

	let res = backend.add_source(missing, data.path()).await;
	assert!(
		matches!(res, Err(BackendError::DocumentNotFound(id)) if id == missing),
		"{res:?}"
	);
	assert!(backend.sources(missing).unwrap().is_empty());
}

#[tokio::test]
async fn test_source_set_semantics() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;

	assert!(backend.add_source(doc, "/a").await?);
	assert!(backend.add_source(doc, "/b").await?);
	assert!(!backend.add_source(doc, "/a").await?);
	assert!(backend.remove_source(doc, "/a")?);
	assert!(!backend.remove_source(doc, "/a")?);

	assert_eq!(source_paths(&backend, doc), vec![PathBuf::from("/b")]);

	Ok(())
}

#[tokio::test]
async fn test_drop_document_forgets_sources() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;
	let kept = backend.create_document().await?;

	let dir = source_dir(&data, "music", &["a.flac", "b.flac"]);
	backend.add_source(doc, &dir).await?;
	backend.add_source(kept, &dir).await?;
	backend.sync_document(doc, ImportOptions::default()).await?;
	assert_eq!(backend.file_count(doc)?, 2);

	backend.drop_document(doc).await?;

	assert!(backend.sources(doc)?.is_empty());
	assert_eq!(backend.file_count(doc)?, 0);
	assert_eq!(source_paths(&backend, kept), vec![dir]);
	assert_eq!(
		backend.list_documents().await?,
		vec![DocumentInfo {
			id: kept,
			capability: ShareMode::Write
		}]
	);

	Ok(())
}

#[tokio::test]
async fn test_sync_imports_every_source() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;

	backend
		.add_source(doc, source_dir(&data, "photos", &["1.jpg", "2.jpg"]))
		.await?;
	backend
		.add_source(doc, source_dir(&data, "notes", &["todo.md"]))
		.await?;

	let report = backend.sync_document(doc, ImportOptions::default()).await?;
	assert_eq!(report.status, UpdateStatus::new(3, 3));
	assert!(report.failures.is_empty());
	assert_eq!(report.total_files, 3);
	assert_eq!(backend.file_count(doc)?, 3);

	let again = backend.sync_document(doc, ImportOptions::default()).await?;
	assert_eq!(again.status, UpdateStatus::new(3, 0));

	Ok(())
}

#[tokio::test]
async fn test_unavailable_source_is_kept() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;

	let present = source_dir(&data, "present", &["a"]);
	let vanishing = source_dir(&data, "vanishing", &["b"]);
	backend.add_source(doc, &present).await?;
	backend.add_source(doc, &vanishing).await?;
	std::fs::remove_dir_all(&vanishing)?;

	let report = backend.sync_document(doc, ImportOptions::default()).await?;
	assert_eq!(report.status, UpdateStatus::new(1, 1));
	assert_eq!(report.failures.len(), 1);
	assert_eq!(report.failures[0].0, vanishing);
	assert!(matches!(
		report.failures[0].1,
		ImportError::SourceUnavailable(_)
	));

	assert_eq!(backend.sources(doc)?.len(), 2);

	Ok(())
}

#[tokio::test]
async fn test_concurrent_pass_on_same_location_is_rejected(
) -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;
	let dir = source_dir(&data, "src", &["a", "b"]);
	let other = source_dir(&data, "other", &["c"]);

	let first = backend.spawn_import(doc, &dir, ImportOptions::default()).await?;
	assert_eq!(first.location(), std::fs::canonicalize(&dir)?);
	let second = backend.spawn_import(doc, &dir, ImportOptions::default()).await;
	assert!(
		matches!(
			second,
			Err(BackendError::Import(ImportError::AlreadyRunning { .. }))
		),
		"{:?}",
		second.err()
	);

	// A different location of the same document runs alongside
	let parallel = backend
		.spawn_import(doc, &other, ImportOptions::default())
		.await?;

	assert_eq!(first.join().await?, UpdateStatus::new(2, 2));
	assert_eq!(parallel.join().await?, UpdateStatus::new(1, 1));

	// Released once the pass is done
	let third = backend.spawn_import(doc, &dir, ImportOptions::default()).await?;
	assert_eq!(third.join().await?, UpdateStatus::new(2, 0));

	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handle_snapshots_and_events() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;

	let names = (0..200).map(|i| format!("file-{i}")).collect::<Vec<_>>();
	let dir = source_dir(
		&data,
		"many",
		&names.iter().map(String::as_str).collect::<Vec<_>>(),
	);

	let handle = backend.spawn_import(doc, &dir, ImportOptions::default()).await?;
	let events = handle.events();

	while !handle.is_finished() {
		let status = handle.snapshot();
		assert!(status.updated <= status.found, "{status:?}");
		tokio::task::yield_now().await;
	}

	let status = handle.join().await?;
	assert_eq!(status, UpdateStatus::new(200, 200));

	let mut last = None;
	while let Ok(event) = events.recv().await {
		last = Some(event);
	}
	assert_eq!(last, Some(ImportEvent::Completed { status }));

	Ok(())
}

#[tokio::test]
async fn test_share_ticket_parses_back() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let doc = backend.create_document().await?;

	let ticket = backend.share(doc, ShareMode::Write).await?;
	let parsed = ticket.to_string().parse::<ShareTicket>()?;

	assert_eq!(parsed, ticket);
	assert_eq!(parsed.document_id, doc);
	assert_eq!(parsed.mode, ShareMode::Write);
	assert_eq!(parsed.node_id, backend.node_id());

	Ok(())
}

#[tokio::test]
async fn test_status_addrs_end_up_in_tickets() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let mut config = AppConfig::default_with_dir(data.path().to_path_buf());
	let addrs: Vec<SocketAddr> = vec!["192.168.1.20:11204".parse()?, "[fe80::1]:11204".parse()?];
	config.node.listen_addrs = addrs.clone();

	let backend = Backend::open(config)?;
	let status = backend.status().await?;
	assert_eq!(status.node_id, backend.node_id());
	assert_eq!(status.listen_addrs, addrs);
	assert!(!status.version.is_empty());

	let doc = backend.create_document().await?;
	let ticket = backend.share(doc, ShareMode::Read).await?;
	assert_eq!(ticket.to_string().parse::<ShareTicket>()?.addrs, addrs);

	Ok(())
}

#[tokio::test]
async fn test_joined_read_only_document() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let backend = mem_backend(&data);
	let dir = source_dir(&data, "music", &["a.flac"]);
	let ticket = ShareTicket::new(
		DocumentId::new(),
		ShareMode::Read,
		NodeId::from_bytes([9; 32]),
		Vec::new(),
	);

	let doc = backend.join_document(&ticket).await?;
	assert_eq!(doc, ticket.document_id);
	assert_eq!(
		backend.list_documents().await?,
		vec![DocumentInfo {
			id: doc,
			capability: ShareMode::Read
		}]
	);

	let added = backend.add_source(doc, &dir).await;
	assert!(matches!(added, Err(BackendError::ReadOnly(id)) if id == doc), "{added:?}");
	assert!(backend.sources(doc)?.is_empty());

	let spawned = backend.spawn_import(doc, &dir, ImportOptions::default()).await;
	assert!(matches!(spawned, Err(BackendError::ReadOnly(_))), "{:?}", spawned.err());

	// Read access can be passed on, write access can't
	assert_eq!(backend.share(doc, ShareMode::Read).await?.mode, ShareMode::Read);
	assert!(backend.share(doc, ShareMode::Write).await.is_err());

	Ok(())
}

#[tokio::test]
async fn test_prune_forgets_sources_of_missing_documents() -> Result<(), Box<dyn std::error::Error>>
{
	let data = TempDir::new()?;
	let config = AppConfig::default_with_dir(data.path().to_path_buf());
	let store = Arc::new(MemStore::new());
	let registry = Arc::new(SourceRegistry::open(config.sources_db())?);
	let backend = Backend::new(store.clone(), registry.clone(), config)?;

	let kept = backend.create_document().await?;
	let gone = backend.create_document().await?;
	backend.add_source(kept, "/kept").await?;
	backend.add_source(gone, "/gone/a").await?;
	backend.add_source(gone, "/gone/b").await?;

	// Dropped behind the backend's back, so its sources stay registered
	store.drop_document(gone).await?;
	assert_eq!(backend.sources(gone)?.len(), 2);

	assert_eq!(backend.prune_orphaned_sources().await?, 2);
	assert!(backend.sources(gone)?.is_empty());
	assert_eq!(source_paths(&backend, kept), vec![PathBuf::from("/kept")]);
	assert_eq!(backend.prune_orphaned_sources().await?, 0);

	Ok(())
}

#[tokio::test]
async fn test_tree_uri_resolves_against_storage_root() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let mut config = AppConfig::default_with_dir(data.path().to_path_buf());
	config.import.storage_root = Some(PathBuf::from("/storage/emulated/0"));
	let registry = SourceRegistry::open(config.sources_db())?;
	let backend = Backend::new(Arc::new(MemStore::new()), Arc::new(registry), config)?;
	let doc = backend.create_document().await?;

	backend
		.add_source_uri(
			doc,
			"content://com.android.externalstorage.documents/tree/primary%3AMusic%2FLive",
		)
		.await?;

	assert_eq!(
		source_paths(&backend, doc),
		vec![PathBuf::from("/storage/emulated/0/Music/Live")]
	);

	Ok(())
}

#[tokio::test]
async fn test_local_backend_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
	let data = TempDir::new()?;
	let config = AppConfig::default_with_dir(data.path().join("state"));
	let dir = source_dir(&data, "docs", &["a.txt", "b.txt"]);

	let (doc, node_id) = {
		let backend = Backend::open(config.clone())?;
		let doc = backend.create_document().await?;
		backend.add_source(doc, &dir).await?;
		let report = backend.sync_document(doc, ImportOptions::default()).await?;
		assert_eq!(report.total_files, 2);
		(doc, backend.node_id())
	};

	let backend = Backend::open(config)?;
	assert_eq!(backend.node_id(), node_id);
	assert_eq!(
		backend.list_documents().await?,
		vec![DocumentInfo {
			id: doc,
			capability: ShareMode::Write
		}]
	);
	assert_eq!(source_paths(&backend, doc), vec![dir]);
	assert_eq!(backend.file_count(doc)?, 2);
	assert_eq!(backend.entries(doc).await?.len(), 2);

	let again = backend.sync_document(doc, ImportOptions::default()).await?;
	assert_eq!(again.status, UpdateStatus::new(2, 0));

	Ok(())
}
