use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::{Arc, LazyLock},
};

use parking_lot::Mutex;

use crate::domain::DocumentId;

type PassKey = (DocumentId, PathBuf);

static PROCESS_IN_FLIGHT: LazyLock<Arc<InFlight>> = LazyLock::new(Arc::default);

/// Set of `(document, location)` pairs with a pass currently running
#[derive(Debug, Default)]
pub(crate) struct InFlight {
	running: Mutex<HashSet<PassKey>>,
}

impl InFlight {
	/// The set shared by every reconciler in this process
	pub fn process() -> Arc<Self> {
		Arc::clone(&PROCESS_IN_FLIGHT)
	}

	/// Claims the pair, or returns `None` when a pass for it is already running
	pub fn try_acquire(
		self: &Arc<Self>,
		document_id: DocumentId,
		location: PathBuf,
	) -> Option<InFlightGuard> {
		let key = (document_id, location);
		if !self.running.lock().insert(key.clone()) {
			return None;
		}

		Some(InFlightGuard {
			owner: Arc::clone(self),
			key,
		})
	}

	pub fn is_running(&self, document_id: DocumentId, location: &Path) -> bool {
		self.running
			.lock()
			.contains(&(document_id, location.to_path_buf()))
	}
}

/// Releases its pair on drop, including when the pass panics or is aborted
#[derive(Debug)]
pub(crate) struct InFlightGuard {
	owner: Arc<InFlight>,
	key: PassKey,
}

impl Drop for InFlightGuard {
	fn drop(&mut self) {
		self.owner.running.lock().remove(&self.key);
	}
}
