//! Import pass integration tests
//!
//! Runs full passes against real directories and an in-memory store:
//! - Repeated passes are idempotent
//! - Recheck picks up modified files only
//! - Deleted files are neither found nor touched
//! - Unreadable roots and dropped documents fail the pass
//! - Unreadable files, unreadable directories and non UTF-8 names are skipped

use std::{path::Path, sync::Arc};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use treesync_core::{
	store::ContentHash, DocumentHandle, DocumentStore, EntryKey, IgnoreRules, ImportError,
	ImportEvent, ImportOptions, MemStore, ProgressReporter, Reconciler, SkipReason,
	UpdateStatus,
};

struct Harness {
	store: Arc<MemStore>,
	reconciler: Reconciler,
	doc: DocumentHandle,
	source: TempDir,
}

impl Harness {
	async fn new() -> Self {
		Self::with_rules(IgnoreRules::none()).await
	}

	async fn with_rules(rules: IgnoreRules) -> Self {
		let store = Arc::new(MemStore::new());
		let reconciler = Reconciler::new(store.clone(), rules);
		let id = store.create_document().await.unwrap();
		let doc = store.open_document(id).await.unwrap().unwrap();

		Self {
			store,
			reconciler,
			doc,
			source: TempDir::new().unwrap(),
		}
	}

	fn write(&self, relative: &str, content: &str) {
		let path = self.source.path().join(relative);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).unwrap();
		}
		std::fs::write(path, content).unwrap();
	}

	async fn pass(&self, options: ImportOptions) -> Result<UpdateStatus, ImportError> {
		self.pass_at(self.source.path(), options).await
	}

	/// Runs a pass and hands back every event it emitted
	async fn pass_with_events(
		&self,
		options: ImportOptions,
	) -> Result<(UpdateStatus, Vec<ImportEvent>), ImportError> {
		let (reporter, events) = ProgressReporter::new(256);
		let status = self
			.reconciler
			.reconcile(
				&self.doc,
				self.source.path(),
				self.store.default_author(),
				options,
				&reporter,
			)
			.await?;
		Ok((status, std::iter::from_fn(|| events.try_recv().ok()).collect()))
	}

	async fn pass_at(
		&self,
		location: &Path,
		options: ImportOptions,
	) -> Result<UpdateStatus, ImportError> {
		self.reconciler
			.reconcile(
				&self.doc,
				location,
				self.store.default_author(),
				options,
				&ProgressReporter::detached(),
			)
			.await
	}
}

const RECHECK: ImportOptions = ImportOptions {
	in_place: true,
	recheck: true,
};

#[tokio::test]
async fn test_second_pass_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	h.write("a.txt", "a");
	h.write("nested/b.txt", "b");
	h.write("nested/deeper/c.txt", "c");

	let first = h.pass(ImportOptions::default()).await?;
	assert_eq!(first, UpdateStatus::new(3, 3));

	let second = h.pass(ImportOptions::default()).await?;
	assert_eq!(second, UpdateStatus::new(3, 0));

	// Recheck with nothing changed writes nothing either
	let rechecked = h.pass(RECHECK).await?;
	assert_eq!(rechecked, UpdateStatus::new(3, 0));
	assert_eq!(h.store.write_count(), 3);

	Ok(())
}

#[tokio::test]
async fn test_recheck_rewrites_only_modified_files() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	h.write("a.txt", "a");
	h.write("b.txt", "b");
	h.write("c.txt", "c");
	h.pass(ImportOptions::default()).await?;

	h.write("b.txt", "b changed");

	// Without recheck the change goes unnoticed
	assert_eq!(h.pass(ImportOptions::default()).await?, UpdateStatus::new(3, 0));
	assert_eq!(h.pass(RECHECK).await?, UpdateStatus::new(3, 1));

	let key = EntryKey::from_path(std::fs::canonicalize(h.source.path())?.join("b.txt"))?;
	let entry = h.store.get_entry(&h.doc, &key).await?.unwrap();
	assert_eq!(entry.hash, ContentHash::of(b"b changed"));

	Ok(())
}

#[tokio::test]
async fn test_deleted_files_are_not_found() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	h.write("a.txt", "a");
	h.write("b.txt", "b");
	h.write("c.txt", "c");
	h.pass(ImportOptions::default()).await?;

	std::fs::remove_file(h.source.path().join("c.txt"))?;

	assert_eq!(h.pass(ImportOptions::default()).await?, UpdateStatus::new(2, 0));
	// The entry stays in the document
	assert_eq!(h.store.list_entries(&h.doc).await?.len(), 3);

	Ok(())
}

#[tokio::test]
async fn test_empty_source_imports_nothing() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	std::fs::create_dir(h.source.path().join("empty"))?;

	assert_eq!(h.pass(ImportOptions::default()).await?, UpdateStatus::default());
	assert!(h.store.list_entries(&h.doc).await?.is_empty());

	Ok(())
}

#[tokio::test]
async fn test_missing_root_is_unavailable() {
	let h = Harness::new().await;

	let res = h
		.pass_at(&h.source.path().join("gone"), ImportOptions::default())
		.await;
	assert!(matches!(res, Err(ImportError::SourceUnavailable(_))), "{res:?}");
}

#[tokio::test]
async fn test_dropped_document_fails_the_pass() {
	let h = Harness::new().await;
	h.write("a.txt", "a");

	h.store.drop_document(h.doc.id()).await.unwrap();

	let res = h.pass(ImportOptions::default()).await;
	assert!(
		matches!(res, Err(ImportError::DocumentClosed(id)) if id == h.doc.id()),
		"{res:?}"
	);
}

#[tokio::test]
async fn test_ignore_rules_prune_paths() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::with_rules(IgnoreRules::new(["**/.git", "*.tmp"])?).await;
	h.write("song.flac", "music");
	h.write(".git/HEAD", "ref");
	h.write("scratch.tmp", "x");
	h.write("album/cover.tmp", "x");

	assert_eq!(h.pass(ImportOptions::default()).await?, UpdateStatus::new(1, 1));

	Ok(())
}

#[tokio::test]
async fn test_copy_mode_keeps_content_without_origin() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	h.write("a.txt", "hello");

	h.pass(ImportOptions {
		in_place: false,
		recheck: false,
	})
	.await?;

	let entries = h.store.list_entries(&h.doc).await?;
	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].origin, None);
	assert_eq!(entries[0].author, h.store.default_author());

	let content = h.store.read_content(&h.doc, &entries[0].key).await?.unwrap();
	assert_eq!(&content[..], b"hello");

	Ok(())
}

#[tokio::test]
async fn test_in_place_records_origin() -> Result<(), Box<dyn std::error::Error>> {
	let h = Harness::new().await;
	h.write("a.txt", "hello");
	h.pass(ImportOptions::default()).await?;

	let root = std::fs::canonicalize(h.source.path())?;
	let entries = h.store.list_entries(&h.doc).await?;
	assert_eq!(entries[0].origin, Some(root.join("a.txt")));
	assert_eq!(entries[0].key.to_path(), Some(root.join("a.txt")));

	Ok(())
}

#[tokio::test]
async fn test_unresolvable_location_emits_nothing() {
	let h = Harness::new().await;
	let (reporter, events) = ProgressReporter::new(8);

	let res = h
		.reconciler
		.reconcile(
			&h.doc,
			&h.source.path().join("missing"),
			h.store.default_author(),
			ImportOptions::default(),
			&reporter,
		)
		.await;

	assert!(res.is_err());
	assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_failed_pass_ends_with_failure_event() {
	let h = Harness::new().await;
	h.write("a.txt", "a");
	h.store.drop_document(h.doc.id()).await.unwrap();

	let (reporter, events) = ProgressReporter::new(8);
	let res = h
		.reconciler
		.reconcile(
			&h.doc,
			h.source.path(),
			h.store.default_author(),
			ImportOptions::default(),
			&reporter,
		)
		.await;
	assert!(res.is_err());

	let events = std::iter::from_fn(|| events.try_recv().ok()).collect::<Vec<_>>();
	assert!(matches!(events.first(), Some(ImportEvent::Started { .. })));
	assert!(matches!(events.last(), Some(ImportEvent::Failed { .. })));
	// Found before the store rejected the lookup, never updated
	assert_eq!(reporter.snapshot(), UpdateStatus::new(1, 0));
}

fn skipped_unreadable(events: &[ImportEvent]) -> Vec<&Path> {
	events
		.iter()
		.filter_map(|event| match event {
			ImportEvent::Skipped {
				path,
				reason: SkipReason::Unreadable(_),
			} => Some(path.as_path()),
			_ => None,
		})
		.collect()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_non_utf8_name_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
	use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

	let h = Harness::new().await;
	h.write("fine.txt", "fine");
	let name = OsStr::from_bytes(b"bad-\xff-name.txt");
	std::fs::write(h.source.path().join(name), "bytes")?;

	let (status, events) = h.pass_with_events(ImportOptions::default()).await?;

	// Counted as found, never written, and the rest of the tree still imports
	assert_eq!(status, UpdateStatus::new(2, 1));
	let skipped = skipped_unreadable(&events);
	assert_eq!(skipped.len(), 1);
	assert_eq!(skipped[0].file_name(), Some(name));
	assert_eq!(h.store.list_entries(&h.doc).await?.len(), 1);

	Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_file_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
	use std::os::unix::fs::PermissionsExt;

	let h = Harness::new().await;
	h.write("open.txt", "open");
	h.write("locked.txt", "locked");
	let locked = h.source.path().join("locked.txt");
	std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000))?;
	if std::fs::read(&locked).is_ok() {
		// Permission bits don't apply to this user
		return Ok(());
	}

	let (status, events) = h.pass_with_events(ImportOptions::default()).await?;

	assert_eq!(status, UpdateStatus::new(2, 1));
	let skipped = skipped_unreadable(&events);
	assert_eq!(skipped.len(), 1);
	assert_eq!(skipped[0].file_name(), locked.file_name());
	assert!(matches!(events.last(), Some(ImportEvent::Completed { .. })));

	Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_directory_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
	use std::os::unix::fs::PermissionsExt;

	let h = Harness::new().await;
	h.write("open.txt", "open");
	h.write("locked/inner.txt", "inner");
	h.write("later/after.txt", "after");
	let locked = h.source.path().join("locked");
	std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000))?;
	let listable = std::fs::read_dir(&locked).is_ok();

	let res = h.pass_with_events(ImportOptions::default()).await;
	std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))?;
	if listable {
		return Ok(());
	}

	// The walk moves past the locked directory and finishes the rest
	let (status, events) = res?;
	assert_eq!(status, UpdateStatus::new(2, 2));
	assert!(matches!(events.last(), Some(ImportEvent::Completed { .. })));
	assert_eq!(h.store.list_entries(&h.doc).await?.len(), 2);

	Ok(())
}
