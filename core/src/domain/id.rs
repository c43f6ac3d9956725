use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdParseError {
	#[error("invalid document id '{0}'")]
	Document(String),
	#[error("invalid author id '{0}'")]
	Author(String),
	#[error("invalid node id '{0}'")]
	Node(String),
}

/// Globally unique identifier of a shared document, assigned by the store on creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}

	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}

	/// Numeric form used as a table key
	pub const fn as_u128(&self) -> u128 {
		self.0.as_u128()
	}

	pub const fn from_u128(value: u128) -> Self {
		Self(Uuid::from_u128(value))
	}

	/// First characters of the id, enough to tell documents apart in listings
	pub fn short(&self) -> String {
		self.0.simple().to_string()[..10].to_string()
	}
}

impl Default for DocumentId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for DocumentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for DocumentId {
	type Err = IdParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| IdParseError::Document(s.to_string()))
	}
}

/// Identity attributed to every entry written into a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorId(Uuid);

impl AuthorId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	pub const fn from_uuid(uuid: Uuid) -> Self {
		Self(uuid)
	}

	pub const fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for AuthorId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for AuthorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for AuthorId {
	type Err = IdParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| IdParseError::Author(s.to_string()))
	}
}

/// Public key of a node, rendered as lowercase hex
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
	pub const fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub const fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	pub fn short(&self) -> String {
		hex::encode(&self.0[..6])
	}
}

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "NodeId({})", self.short())
	}
}

impl fmt::Display for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&hex::encode(self.0))
	}
}

impl FromStr for NodeId {
	type Err = IdParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut bytes = [0u8; 32];
		hex::decode_to_slice(s, &mut bytes).map_err(|_| IdParseError::Node(s.to_string()))?;
		Ok(Self(bytes))
	}
}
