use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use async_channel as chan;
use tokio::task::JoinHandle;

use super::{ImportError, ImportEvent, ImportOptions, ProgressReporter, Reconciler};
use crate::{
	domain::{AuthorId, UpdateStatus},
	store::DocumentHandle,
};

/// A pass running on its own task.
///
/// Progress is available at any time through [`ImportHandle::snapshot`] or by
/// draining [`ImportHandle::events`]; the event channel closes once the pass
/// finishes.
pub struct ImportHandle {
	location: PathBuf,
	reporter: Arc<ProgressReporter>,
	events: chan::Receiver<ImportEvent>,
	task: JoinHandle<Result<UpdateStatus, ImportError>>,
}

impl ImportHandle {
	pub(crate) fn spawn(
		reconciler: Arc<Reconciler>,
		doc: DocumentHandle,
		location: &Path,
		author: AuthorId,
		options: ImportOptions,
		event_buffer: usize,
	) -> Result<Self, ImportError> {
		let (location, guard) = reconciler.begin(doc.id(), location)?;
		let (reporter, events) = ProgressReporter::new(event_buffer);
		let reporter = Arc::new(reporter);

		let task = tokio::spawn({
			let reporter = Arc::clone(&reporter);
			let location = location.clone();
			async move {
				let _close = CloseOnDrop(Arc::clone(&reporter));
				reconciler
					.run(&doc, &location, author, options, &reporter, guard)
					.await
			}
		});

		Ok(Self {
			location,
			reporter,
			events,
			task,
		})
	}

	/// Canonical location being imported
	pub fn location(&self) -> &Path {
		&self.location
	}

	pub fn snapshot(&self) -> UpdateStatus {
		self.reporter.snapshot()
	}

	pub fn events(&self) -> chan::Receiver<ImportEvent> {
		self.events.clone()
	}

	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}

	pub async fn join(self) -> Result<UpdateStatus, ImportError> {
		self.task.await?
	}
}

/// Closes the event channel when the task ends, panics included
struct CloseOnDrop(Arc<ProgressReporter>);

impl Drop for CloseOnDrop {
	fn drop(&mut self) {
		self.0.close();
	}
}
