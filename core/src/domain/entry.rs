use std::{
	fmt,
	ops::AddAssign,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use treesync_utils::{error::NonUtf8PathError, path_to_str};

/// Key under which a file's bytes are stored in a document.
///
/// Derived purely from the file's absolute path: the UTF-8 path followed by a
/// single NUL byte. Importing the same path twice always addresses the same key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey(Vec<u8>);

impl EntryKey {
	pub fn from_path(path: impl AsRef<Path>) -> Result<Self, NonUtf8PathError> {
		let path = path_to_str(path.as_ref())?;
		let mut key = Vec::with_capacity(path.len() + 1);
		key.extend_from_slice(path.as_bytes());
		key.push(0);
		Ok(Self(key))
	}

	pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Recovers the path a key was derived from, if it was derived from one
	pub fn to_path(&self) -> Option<PathBuf> {
		let (last, path) = self.0.split_last()?;
		if *last != 0 {
			return None;
		}
		std::str::from_utf8(path).ok().map(PathBuf::from)
	}
}

impl fmt::Debug for EntryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "EntryKey({self})")
	}
}

impl fmt::Display for EntryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.to_path() {
			Some(path) => write!(f, "{}", path.display()),
			None => write!(f, "0x{}", hex::encode(&self.0)),
		}
	}
}

/// Regular file discovered while walking a source. Lives for one pass only.
#[derive(Debug, Clone)]
pub struct ImportEntry {
	pub path: PathBuf,
	/// Length on disk when the file was listed
	pub size: u64,
}

impl ImportEntry {
	pub fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
		Self {
			path,
			size: metadata.len(),
		}
	}
}

/// Progress of a single reconciliation pass.
///
/// Both counters only grow during a pass and `updated <= found` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
	pub found: u64,
	pub updated: u64,
}

impl UpdateStatus {
	pub const fn new(found: u64, updated: u64) -> Self {
		Self { found, updated }
	}

	/// Files seen but left untouched
	pub const fn unchanged(&self) -> u64 {
		self.found.saturating_sub(self.updated)
	}
}

impl AddAssign for UpdateStatus {
	fn add_assign(&mut self, rhs: Self) {
		self.found += rhs.found;
		self.updated += rhs.updated;
	}
}

impl fmt::Display for UpdateStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.updated, self.found)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_is_nul_terminated_path() {
		let key = EntryKey::from_path("/sdcard/Music/a.flac").unwrap();
		assert_eq!(key.as_bytes(), b"/sdcard/Music/a.flac\0");
		assert_eq!(key.to_path(), Some(PathBuf::from("/sdcard/Music/a.flac")));
	}

	#[test]
	fn key_derivation_is_deterministic() {
		let a = EntryKey::from_path(Path::new("/a/b")).unwrap();
		let b = EntryKey::from_path(PathBuf::from("/a/b")).unwrap();
		assert_eq!(a, b);
		assert_ne!(a, EntryKey::from_path("/a/c").unwrap());
	}

	#[test]
	fn foreign_keys_render_as_hex() {
		let key = EntryKey::from_bytes(vec![0xde, 0xad]);
		assert_eq!(key.to_path(), None);
		assert_eq!(key.to_string(), "0xdead");
	}

	#[test]
	fn status_accumulates() {
		let mut total = UpdateStatus::new(3, 1);
		total += UpdateStatus::new(2, 2);
		assert_eq!(total, UpdateStatus::new(5, 3));
		assert_eq!(total.unchanged(), 2);
	}
}
