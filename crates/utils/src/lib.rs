use std::path::Path;

use uuid::Uuid;

pub mod error;

use error::NonUtf8PathError;

pub fn uuid_to_bytes(uuid: Uuid) -> Vec<u8> {
	uuid.as_bytes().to_vec()
}

/// Reads a UUID back from its raw 16 byte form, `None` if the slice has the wrong length
pub fn uuid_from_bytes(bytes: &[u8]) -> Option<Uuid> {
	Uuid::from_slice(bytes).ok()
}

/// Borrows a path as `&str`, failing for paths that aren't valid UTF-8
pub fn path_to_str(path: &Path) -> Result<&str, NonUtf8PathError> {
	path.to_str().ok_or_else(|| NonUtf8PathError(path.to_path_buf()))
}
