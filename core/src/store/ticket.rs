use std::{fmt, net::SocketAddr, str::FromStr};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ShareMode;
use crate::domain::{DocumentId, NodeId};

const PREFIX: &str = "doc";

#[derive(Error, Debug)]
pub enum TicketError {
	#[error("ticket must start with 'doc'")]
	MissingPrefix,
	#[error("ticket is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),
	#[error("ticket payload is malformed: {0}")]
	Payload(#[from] rmp_serde::decode::Error),
}

/// Opaque token granting read or write access to a document.
///
/// Rendered as `doc` followed by the URL-safe base64 of a MessagePack payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareTicket {
	pub document_id: DocumentId,
	pub mode: ShareMode,
	pub node_id: NodeId,
	/// Where the sharing node can be reached
	#[serde(default)]
	pub addrs: Vec<SocketAddr>,
}

impl ShareTicket {
	pub fn new(
		document_id: DocumentId,
		mode: ShareMode,
		node_id: NodeId,
		addrs: Vec<SocketAddr>,
	) -> Self {
		Self {
			document_id,
			mode,
			node_id,
			addrs,
		}
	}
}

impl fmt::Display for ShareTicket {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let payload = rmp_serde::to_vec(self).map_err(|_| fmt::Error)?;
		write!(f, "{PREFIX}{}", URL_SAFE_NO_PAD.encode(payload))
	}
}

impl FromStr for ShareTicket {
	type Err = TicketError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let encoded = s.strip_prefix(PREFIX).ok_or(TicketError::MissingPrefix)?;
		let payload = URL_SAFE_NO_PAD.decode(encoded)?;
		Ok(rmp_serde::from_slice(&payload)?)
	}
}
