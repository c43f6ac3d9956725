//! Application configuration

use std::{
	fs,
	net::{Ipv4Addr, SocketAddr},
	path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::Migrate;
use crate::ops::import::IgnoreRules;

const CONFIG_FILE: &str = "treesync.json";

/// Port advertised when no listen address is configured
pub const DEFAULT_PORT: u16 = 11204;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
	/// Config schema version
	pub version: u32,

	/// Where the databases, logs and this file live
	pub data_dir: PathBuf,

	/// Default tracing directive, `RUST_LOG` wins when set
	pub log_level: String,

	#[serde(default)]
	pub import: ImportConfig,

	#[serde(default)]
	pub node: NodeConfig,
}

/// How the node presents itself to peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
	/// Addresses reported in the node status and embedded in share tickets
	pub listen_addrs: Vec<SocketAddr>,
}

impl Default for NodeConfig {
	fn default() -> Self {
		Self {
			listen_addrs: vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))],
		}
	}
}

/// Defaults for import passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
	/// Reference files in place instead of copying them into the store
	pub in_place: bool,

	/// Hash already imported files on every pass
	pub recheck: bool,

	/// Events buffered per pass before new ones are dropped
	pub event_buffer: usize,

	/// Globs, relative to a source root, of paths never imported
	pub ignore: Vec<String>,

	/// Directory that document-tree URIs are resolved against
	#[serde(default)]
	pub storage_root: Option<PathBuf>,
}

impl Default for ImportConfig {
	fn default() -> Self {
		Self {
			in_place: true,
			recheck: false,
			event_buffer: 1024,
			ignore: Vec::new(),
			storage_root: None,
		}
	}
}

impl ImportConfig {
	pub fn ignore_rules(&self) -> Result<IgnoreRules, globset::Error> {
		IgnoreRules::new(&self.ignore)
	}

	/// Configured storage root, falling back to the home directory
	pub fn storage_root(&self) -> Option<PathBuf> {
		self.storage_root.clone().or_else(dirs::home_dir)
	}
}

impl AppConfig {
	/// Load configuration from a specific data directory, creating a default
	/// one when none exists yet
	pub fn load_from(data_dir: &Path) -> Result<Self> {
		let config_path = data_dir.join(CONFIG_FILE);

		if config_path.exists() {
			info!("Loading config from {:?}", config_path);
			let json = fs::read_to_string(&config_path)?;
			let mut config: AppConfig = serde_json::from_str(&json)
				.with_context(|| format!("malformed config at {}", config_path.display()))?;

			if config.needs_migration() {
				info!(
					"Migrating config from v{} to v{}",
					config.version,
					Self::target_version()
				);
				config.migrate()?;
				config.save()?;
			}

			Ok(config)
		} else {
			warn!("No config found, creating default at {:?}", config_path);
			let config = Self::default_with_dir(data_dir.to_path_buf());
			config.save()?;
			Ok(config)
		}
	}

	/// Create default configuration with specific data directory
	pub fn default_with_dir(data_dir: PathBuf) -> Self {
		Self {
			version: Self::target_version(),
			data_dir,
			log_level: "info".to_string(),
			import: ImportConfig::default(),
			node: NodeConfig::default(),
		}
	}

	/// Save configuration to disk
	pub fn save(&self) -> Result<()> {
		fs::create_dir_all(&self.data_dir)?;

		let config_path = self.data_dir.join(CONFIG_FILE);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)?;
		info!("Saved config to {:?}", config_path);
		Ok(())
	}

	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	pub fn documents_db(&self) -> PathBuf {
		self.data_dir.join("docs.redb")
	}

	pub fn sources_db(&self) -> PathBuf {
		self.data_dir.join("sources.redb")
	}
}

impl Migrate for AppConfig {
	fn current_version(&self) -> u32 {
		self.version
	}

	fn target_version() -> u32 {
		3
	}

	fn migrate(&mut self) -> Result<()> {
		match self.version {
			0 => {
				self.version = 1;
				self.migrate()
			}
			1 => {
				// v2 introduced import defaults
				self.import = ImportConfig::default();
				self.version = 2;
				self.migrate()
			}
			2 => {
				// v3 introduced the advertised listen addresses
				self.node = NodeConfig::default();
				self.version = 3;
				Ok(())
			}
			3 => Ok(()),
			v => Err(anyhow!("Unknown config version: {}", v)),
		}
	}
}
