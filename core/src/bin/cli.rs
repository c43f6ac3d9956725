use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use treesync_core::{
	config::default_data_dir, logging, AppConfig, Backend, DocumentId, ImportEvent,
	ImportOptions, ShareMode, ShareTicket, SkipReason,
};

#[derive(Parser, Debug)]
#[command(name = "treesync", about = "Keep folders imported into shared documents", version)]
struct Cli {
	/// Data directory holding the config, databases and logs
	#[arg(long, global = true, env = "TREESYNC_DATA_DIR")]
	data_dir: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Node identity and peers
	#[command(subcommand)]
	Node(NodeCommand),
	/// Create, list, share and drop documents
	#[command(subcommand)]
	Doc(DocCommand),
	/// Attach and detach folders
	#[command(subcommand)]
	Source(SourceCommand),
	/// Import every source of a document
	Import {
		document: DocumentId,
		/// Hash files that were already imported and rewrite changed ones
		#[arg(long)]
		recheck: bool,
		/// Store copies of the files instead of referencing them in place
		#[arg(long)]
		copy: bool,
	},
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
	Info,
}

#[derive(Subcommand, Debug)]
enum DocCommand {
	Create,
	List,
	Drop {
		document: DocumentId,
	},
	Share {
		document: DocumentId,
		/// Grant write access instead of read-only
		#[arg(long)]
		write: bool,
	},
	/// Add the document behind a share ticket
	Join {
		ticket: ShareTicket,
	},
	Entries {
		document: DocumentId,
	},
}

#[derive(Subcommand, Debug)]
enum SourceCommand {
	/// Attach a path, `file://` URI or document-tree URI
	Add {
		document: DocumentId,
		location: String,
	},
	Remove {
		document: DocumentId,
		location: PathBuf,
	},
	List {
		document: DocumentId,
	},
	/// Forget sources of documents that no longer exist
	Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => default_data_dir()?,
	};
	let config = AppConfig::load_from(&data_dir)?;
	let _log_guard = logging::init(&config)?;

	let backend = Backend::open(config).context("Failed to open the local store")?;

	match cli.command {
		Command::Node(NodeCommand::Info) => node_info(&backend).await,
		Command::Doc(cmd) => doc_command(&backend, cmd).await,
		Command::Source(cmd) => source_command(&backend, cmd).await,
		Command::Import {
			document,
			recheck,
			copy,
		} => {
			let options = ImportOptions {
				in_place: !copy && backend.config().import.in_place,
				recheck: recheck || backend.config().import.recheck,
			};
			import(&backend, document, options).await
		}
	}
}

async fn node_info(backend: &Backend) -> Result<()> {
	let status = backend.status().await?;
	println!("{} {}", "Node:".bold(), status.node_id.to_string().yellow());
	println!("{} {}", "Version:".bold(), status.version);
	println!("{}", "Listen addresses:".bold());
	for addr in &status.listen_addrs {
		println!("  {addr}");
	}

	let connections = backend.connections().await?;
	if connections.is_empty() {
		println!("{}", "No peers connected".dimmed());
		return Ok(());
	}

	let mut table = Table::new();
	table.set_header(vec!["Peer", "Type", "Last used", "Latency"]);
	for conn in connections {
		table.add_row(vec![
			conn.node_id.short(),
			conn.conn_type.to_string(),
			format_duration(conn.last_used),
			format_duration(conn.latency),
		]);
	}
	println!("{table}");
	Ok(())
}

async fn doc_command(backend: &Backend, cmd: DocCommand) -> Result<()> {
	match cmd {
		DocCommand::Create => {
			let id = backend.create_document().await?;
			println!("{} {}", "Created document".green(), id);
		}
		DocCommand::List => {
			let docs = backend.list_documents().await?;
			if docs.is_empty() {
				println!("{}", "No documents".dimmed());
				return Ok(());
			}

			let mut table = Table::new();
			table.set_header(vec!["Document", "Access", "Sources", "Files"]);
			for doc in docs {
				table.add_row(vec![
					doc.id.to_string(),
					doc.capability.to_string(),
					backend.sources(doc.id)?.len().to_string(),
					backend.file_count(doc.id)?.to_string(),
				]);
			}
			println!("{table}");
		}
		DocCommand::Drop { document } => {
			backend.drop_document(document).await?;
			println!("{} {}", "Dropped document".green(), document);
		}
		DocCommand::Share { document, write } => {
			let mode = if write { ShareMode::Write } else { ShareMode::Read };
			let ticket = backend.share(document, mode).await?;
			println!("{ticket}");
		}
		DocCommand::Join { ticket } => {
			let id = backend.join_document(&ticket).await?;
			println!("{} {} ({})", "Joined document".green(), id, ticket.mode);
		}
		DocCommand::Entries { document } => {
			let mut table = Table::new();
			table.set_header(vec!["Key", "Size", "Hash", "Stored"]);
			for entry in backend.entries(document).await? {
				table.add_row(vec![
					entry.key.to_string(),
					entry.size.to_string(),
					entry.hash.to_string()[..12].to_string(),
					if entry.origin.is_some() { "in place" } else { "copy" }.to_string(),
				]);
			}
			println!("{table}");
		}
	}
	Ok(())
}

async fn source_command(backend: &Backend, cmd: SourceCommand) -> Result<()> {
	match cmd {
		SourceCommand::Add { document, location } => {
			if backend.add_source_uri(document, &location).await? {
				println!("{} {}", "Attached".green(), location);
			} else {
				println!("{} {}", "Already attached".yellow(), location);
			}
		}
		SourceCommand::Remove { document, location } => {
			if backend.remove_source(document, &location)? {
				println!("{} {}", "Detached".green(), location.display());
			} else {
				println!("{} {}", "Not attached".yellow(), location.display());
			}
		}
		SourceCommand::List { document } => {
			for source in backend.sources(document)? {
				println!("{}", source.path.display());
			}
		}
		SourceCommand::Prune => {
			let removed = backend.prune_orphaned_sources().await?;
			println!("{} {removed}", "Removed sources:".bold());
		}
	}
	Ok(())
}

async fn import(backend: &Backend, document: DocumentId, options: ImportOptions) -> Result<()> {
	let sources = backend.sources(document)?;
	if sources.is_empty() {
		println!("{}", "Document has no sources".yellow());
		return Ok(());
	}

	let style = ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")?;

	for source in sources {
		let bar = ProgressBar::new_spinner()
			.with_style(style.clone())
			.with_prefix(source.path.display().to_string());
		bar.enable_steady_tick(Duration::from_millis(120));

		let handle = match backend.spawn_import(document, &source.path, options).await {
			Ok(handle) => handle,
			Err(e) => {
				bar.finish_with_message(format!("{}", e.to_string().red()));
				continue;
			}
		};
		// Symlinked or relative spellings show as the directory actually walked
		bar.set_prefix(handle.location().display().to_string());

		let events = handle.events();
		while let Ok(event) = events.recv().await {
			match event {
				ImportEvent::Skipped {
					path,
					reason: SkipReason::Unreadable(e) | SkipReason::WriteFailed(e),
				} => bar.println(format!("{} {}: {e}", "skipped".yellow(), path.display())),
				_ => {
					let status = handle.snapshot();
					bar.set_message(format!("{} updated / {} found", status.updated, status.found));
				}
			}
		}

		match handle.join().await {
			Ok(status) => bar.finish_with_message(format!(
				"{} {} updated, {} unchanged",
				"done".green(),
				status.updated,
				status.unchanged()
			)),
			Err(e) => bar.finish_with_message(format!("{}", e.to_string().red())),
		}
	}

	let total = backend.refresh_count(document).await?;
	println!("{} {total}", "Files in document:".bold());
	Ok(())
}

fn format_duration(duration: Option<Duration>) -> String {
	duration.map_or_else(|| "-".to_string(), |d| format!("{d:.1?}"))
}
