use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Glob patterns excluding paths from an import.
///
/// Patterns match against the path relative to the source root, so
/// `**/node_modules` prunes the directory wherever it shows up.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
	set: GlobSet,
}

impl IgnoreRules {
	pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut builder = GlobSetBuilder::new();
		for pattern in patterns {
			builder.add(Glob::new(pattern.as_ref())?);
		}

		Ok(Self {
			set: builder.build()?,
		})
	}

	pub fn none() -> Self {
		Self {
			set: GlobSet::empty(),
		}
	}

	pub fn is_ignored(&self, relative: &Path) -> bool {
		!self.set.is_empty() && self.set.is_match(relative)
	}
}

impl Default for IgnoreRules {
	fn default() -> Self {
		Self::none()
	}
}
