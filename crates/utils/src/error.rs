use std::{
	io,
	path::{Path, PathBuf},
};

use thiserror::Error;

/// An I/O failure tied to the path it happened on
#[derive(Error, Debug)]
#[error("{action} '{}' failed: {source}", .path.display())]
pub struct PathIoError {
	pub path: PathBuf,
	/// What was being done, e.g. "listing directory"
	pub action: &'static str,
	#[source]
	pub source: io::Error,
}

impl PathIoError {
	pub fn new(path: impl AsRef<Path>, action: &'static str, source: io::Error) -> Self {
		Self {
			path: path.as_ref().to_path_buf(),
			action,
			source,
		}
	}

	/// Adapter for `map_err`
	pub fn on(path: impl AsRef<Path>, action: &'static str) -> impl FnOnce(io::Error) -> Self {
		let path = path.as_ref().to_path_buf();
		move |source| Self {
			path,
			action,
			source,
		}
	}

	pub fn kind(&self) -> io::ErrorKind {
		self.source.kind()
	}

	/// Whether the path simply isn't there
	pub fn is_not_found(&self) -> bool {
		self.kind() == io::ErrorKind::NotFound
	}
}

#[derive(Error, Debug)]
#[error("path is not valid UTF-8: {}", .0.display())]
pub struct NonUtf8PathError(pub PathBuf);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_action_and_path() {
		let err = PathIoError::new(
			"/tmp/missing",
			"reading source",
			io::Error::from(io::ErrorKind::NotFound),
		);

		let rendered = err.to_string();
		assert!(rendered.starts_with("reading source '/tmp/missing' failed: "), "{rendered}");
		assert!(err.is_not_found());
	}

	#[test]
	fn adapter_keeps_path() {
		let denied: Result<(), io::Error> = Err(io::ErrorKind::PermissionDenied.into());
		let err = denied.map_err(PathIoError::on("/a", "reading")).unwrap_err();
		assert_eq!(err.path, PathBuf::from("/a"));
		assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
	}

	#[test]
	fn non_utf8_message() {
		let err = NonUtf8PathError(PathBuf::from("/a"));
		assert_eq!(err.to_string(), "path is not valid UTF-8: /a");
	}
}
