//! Tracing setup for the binary: stderr plus a daily rolling file under
//! `<data_dir>/logs`.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::{
	non_blocking::WorkerGuard,
	rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Installs the global subscriber. Keep the returned guard alive for as long
/// as logs should reach the file.
pub fn init(config: &AppConfig) -> Result<WorkerGuard> {
	let logs_dir = config.logs_dir();
	fs::create_dir_all(&logs_dir)
		.with_context(|| format!("Failed to create logs directory {}", logs_dir.display()))?;

	let file_appender = RollingFileAppender::new(Rotation::DAILY, logs_dir, "treesync.log");
	let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

	tracing_subscriber::registry()
		.with(filter(&config.log_level))
		.with(
			fmt::layer()
				.with_target(true)
				.with_writer(std::io::stderr),
		)
		.with(
			fmt::layer()
				.with_target(true)
				.with_thread_ids(true)
				.with_ansi(false)
				.with_writer(file_writer),
		)
		.try_init()
		.context("Failed to initialize tracing")?;

	Ok(guard)
}

fn filter(default_level: &str) -> EnvFilter {
	EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!("treesync_core={default_level},treesync={default_level},warn"))
	})
}
