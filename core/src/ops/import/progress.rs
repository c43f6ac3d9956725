//! Progress reporting for import passes.
//!
//! A [`ProgressReporter`] keeps two atomic counters, `found` and `updated`, and
//! mirrors every change as an [`ImportEvent`] on a bounded channel. The counters
//! are authoritative: when the channel is full, events are dropped, never the
//! counts.

use std::{
	path::{Path, PathBuf},
	sync::atomic::{AtomicU64, Ordering},
};

use async_channel as chan;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::domain::UpdateStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
	/// Already present in the document with the same content
	Unchanged,
	/// Could not be read from disk
	Unreadable(String),
	/// Write failed twice
	WriteFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportEvent {
	Started { location: PathBuf },
	Found { path: PathBuf },
	Updated { path: PathBuf },
	Skipped { path: PathBuf, reason: SkipReason },
	Completed { status: UpdateStatus },
	Failed { error: String },
}

pub struct ProgressReporter {
	found: AtomicU64,
	updated: AtomicU64,
	events: chan::Sender<ImportEvent>,
}

impl ProgressReporter {
	/// Creates a reporter whose events can be drained from the returned receiver.
	/// At most `capacity` events are buffered.
	pub fn new(capacity: usize) -> (Self, chan::Receiver<ImportEvent>) {
		let (tx, rx) = chan::bounded(capacity.max(1));
		(
			Self {
				found: AtomicU64::new(0),
				updated: AtomicU64::new(0),
				events: tx,
			},
			rx,
		)
	}

	/// A reporter nobody listens to; only the counters are kept
	pub fn detached() -> Self {
		let (reporter, _) = Self::new(1);
		reporter
	}

	pub fn on_found(&self, path: &Path) {
		self.found.fetch_add(1, Ordering::Release);
		self.emit(ImportEvent::Found {
			path: path.to_path_buf(),
		});
	}

	/// Must only be called for a path already reported through [`Self::on_found`]
	pub fn on_updated(&self, path: &Path) {
		self.updated.fetch_add(1, Ordering::Release);
		self.emit(ImportEvent::Updated {
			path: path.to_path_buf(),
		});
	}

	pub fn on_skipped(&self, path: &Path, reason: SkipReason) {
		self.emit(ImportEvent::Skipped {
			path: path.to_path_buf(),
			reason,
		});
	}

	/// Current `{found, updated}` pair.
	///
	/// `updated` is loaded before `found`. Every `updated` increment happens after
	/// the `found` increment of the same file, so the pair never shows more
	/// updates than finds.
	pub fn snapshot(&self) -> UpdateStatus {
		let updated = self.updated.load(Ordering::Acquire);
		let found = self.found.load(Ordering::Acquire);
		UpdateStatus { found, updated }
	}

	/// Zeroes both counters. Only valid between passes.
	pub fn reset(&self) {
		self.updated.store(0, Ordering::Release);
		self.found.store(0, Ordering::Release);
	}

	pub(crate) fn emit(&self, event: ImportEvent) {
		if let Err(e) = self.events.try_send(event) {
			trace!("Dropped import event: {e}");
		}
	}

	/// Closes the event channel; receivers drain what's buffered and then end
	pub fn close(&self) {
		self.events.close();
	}
}
