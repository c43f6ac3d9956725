use std::{
	borrow::Cow,
	path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
	#[error("location is neither an absolute path nor a supported uri: {0}")]
	Unsupported(String),
	#[error("tree uri has no volume separator: {0}")]
	MissingVolume(String),
	#[error("location is not valid percent-encoded UTF-8: {0}")]
	BadEncoding(String),
}

/// Turns a user-granted location reference into a real directory path.
///
/// - Absolute paths pass through untouched.
/// - `file://` URIs are decoded to their path.
/// - Document-tree URIs (`content://<authority>/tree/primary:Music/Live`) map the
///   part after the volume separator onto `storage_root`.
pub fn resolve_location(location: &str, storage_root: &Path) -> Result<PathBuf, ResolveError> {
	if let Some(rest) = location.strip_prefix("file://") {
		let decoded = percent_decode(rest)
			.ok_or_else(|| ResolveError::BadEncoding(location.to_string()))?;
		return Ok(PathBuf::from(decoded));
	}

	if let Some(rest) = location.strip_prefix("content://") {
		let path = rest.split_once('/').map(|(_, path)| path).unwrap_or_default();
		let decoded = percent_decode(path)
			.ok_or_else(|| ResolveError::BadEncoding(location.to_string()))?;
		let (_, relative) = decoded
			.rsplit_once(':')
			.ok_or_else(|| ResolveError::MissingVolume(location.to_string()))?;

		return Ok(storage_root.join(relative.trim_start_matches('/')));
	}

	let path = Path::new(location);
	if path.is_absolute() {
		Ok(path.to_path_buf())
	} else {
		Err(ResolveError::Unsupported(location.to_string()))
	}
}

/// Decodes `%XX` escapes. Every `%` must start a two digit hex escape, anything
/// else is rejected rather than passed through.
fn percent_decode(input: &str) -> Option<String> {
	let well_formed = input.split('%').skip(1).all(|rest| {
		rest.len() >= 2 && rest.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit)
	});
	if !well_formed {
		return None;
	}

	urlencoding::decode(input).ok().map(Cow::into_owned)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_tree_uris_onto_storage_root() {
		let root = Path::new("/storage/emulated/0");
		assert_eq!(
			resolve_location(
				"content://com.android.externalstorage.documents/tree/primary%3AMusic%2FLive",
				root
			),
			Ok(PathBuf::from("/storage/emulated/0/Music/Live"))
		);
		assert_eq!(
			resolve_location("content://authority/tree/primary:DCIM", root),
			Ok(PathBuf::from("/storage/emulated/0/DCIM"))
		);
	}

	#[test]
	fn passes_paths_through() {
		let root = Path::new("/root");
		assert_eq!(
			resolve_location("/home/me/docs", root),
			Ok(PathBuf::from("/home/me/docs"))
		);
		assert_eq!(
			resolve_location("file:///home/me/My%20Docs", root),
			Ok(PathBuf::from("/home/me/My Docs"))
		);
	}

	#[test]
	fn rejects_what_it_cannot_resolve() {
		let root = Path::new("/root");
		assert!(matches!(
			resolve_location("relative/dir", root),
			Err(ResolveError::Unsupported(_))
		));
		assert!(matches!(
			resolve_location("content://authority/tree/nocolon", root),
			Err(ResolveError::MissingVolume(_))
		));
		assert!(matches!(
			resolve_location("file:///bad%zz", root),
			Err(ResolveError::BadEncoding(_))
		));
	}

	#[test]
	fn rejects_malformed_escapes() {
		let root = Path::new("/root");
		for location in [
			"file:///a%+1b",
			"file:///a%-fb",
			"file:///trailing%",
			"file:///short%4",
			"file:///a%%20",
			"file:///invalid%ff%fe",
			"content://authority/tree/primary%3AMusic%+1",
		] {
			assert_eq!(
				resolve_location(location, root),
				Err(ResolveError::BadEncoding(location.to_string())),
				"{location}"
			);
		}

		assert_eq!(
			resolve_location("file:///a%2Bb%2fc", root),
			Ok(PathBuf::from("/a+b/c"))
		);
	}
}
