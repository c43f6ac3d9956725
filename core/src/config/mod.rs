//! Application configuration management

use std::{fs, path::PathBuf};

use anyhow::{anyhow, Result};

pub mod app_config;
pub mod migration;

pub use app_config::{AppConfig, ImportConfig, NodeConfig};
pub use migration::Migrate;

/// Platform-specific data directory resolution
pub fn default_data_dir() -> Result<PathBuf> {
	#[cfg(target_os = "linux")]
	let dir = dirs::data_local_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("treesync");

	#[cfg(not(target_os = "linux"))]
	let dir = dirs::data_dir()
		.ok_or_else(|| anyhow!("Could not determine data directory"))?
		.join("treesync");

	fs::create_dir_all(&dir)?;

	Ok(dir)
}
