//! Breadth-first walk over a source.
//!
//! Directories go into a work queue and are read one at a time; regular files
//! come out as [`ImportEntry`] values. Symlinks are not followed, so a source
//! can't loop back into itself.

use std::{
	collections::VecDeque,
	io,
	path::{Path, PathBuf},
	sync::Arc,
};

use tokio::fs;
use tracing::{trace, warn};
use treesync_utils::error::PathIoError;

use super::rules::IgnoreRules;
use crate::domain::ImportEntry;

#[derive(Debug)]
pub(crate) enum WalkItem {
	File(ImportEntry),
	/// A file that showed up in a listing but whose metadata couldn't be read
	Unreadable { path: PathBuf, error: PathIoError },
}

pub(crate) struct SourceWalker {
	root: PathBuf,
	rules: Arc<IgnoreRules>,
	dirs_to_walk: VecDeque<PathBuf>,
	pending: VecDeque<WalkItem>,
}

impl SourceWalker {
	/// Starts a walk at `root`, failing if the root itself can't be listed
	pub async fn open(root: &Path, rules: Arc<IgnoreRules>) -> Result<Self, PathIoError> {
		let metadata = fs::metadata(root)
			.await
			.map_err(PathIoError::on(root, "reading source"))?;
		if !metadata.is_dir() {
			return Err(PathIoError::new(
				root,
				"reading source",
				io::Error::other("not a directory"),
			));
		}

		let mut walker = Self {
			root: root.to_path_buf(),
			rules,
			dirs_to_walk: VecDeque::new(),
			pending: VecDeque::new(),
		};
		walker.read_dir(root).await?;

		Ok(walker)
	}

	pub async fn next(&mut self) -> Option<WalkItem> {
		loop {
			if let Some(item) = self.pending.pop_front() {
				return Some(item);
			}

			let dir = self.dirs_to_walk.pop_front()?;
			if let Err(e) = self.read_dir(&dir).await {
				warn!("Skipping unreadable directory: {e}");
			}
		}
	}

	fn is_ignored(&self, path: &Path) -> bool {
		let relative = path.strip_prefix(&self.root).unwrap_or(path);
		self.rules.is_ignored(relative)
	}

	async fn read_dir(&mut self, dir: &Path) -> Result<(), PathIoError> {
		let mut read_dir = fs::read_dir(dir)
			.await
			.map_err(PathIoError::on(dir, "listing directory"))?;

		while let Some(entry) = read_dir
			.next_entry()
			.await
			.map_err(PathIoError::on(dir, "listing directory"))?
		{
			let path = entry.path();
			if self.is_ignored(&path) {
				trace!(path = %path.display(), "Ignored by rules");
				continue;
			}

			let file_type = match entry.file_type().await {
				Ok(file_type) => file_type,
				Err(e) => {
					self.pending.push_back(WalkItem::Unreadable {
						error: PathIoError::new(&path, "reading file type of", e),
						path,
					});
					continue;
				}
			};

			if file_type.is_dir() {
				self.dirs_to_walk.push_back(path);
			} else if file_type.is_file() {
				let item = match entry.metadata().await {
					Ok(metadata) => WalkItem::File(ImportEntry::from_metadata(path, &metadata)),
					Err(e) => WalkItem::Unreadable {
						error: PathIoError::new(&path, "reading metadata of", e),
						path,
					},
				};
				self.pending.push_back(item);
			} else {
				trace!(path = %path.display(), "Skipping non regular file");
			}
		}

		Ok(())
	}
}
