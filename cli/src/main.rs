//! Retrace CLI
//!
//! Thin front end over `retrace-core`. Diff text goes to stdout, logs and
//! prompts to stderr.
//!
//! Commands:
//! - retrace sessions [--limit 10]
//! - retrace messages <session-id>
//! - retrace diff <message-id> [--file src/a.ts]
//! - retrace history <file> [--limit 10]
//! - retrace revert <message-id> <file> [--yes]
//! - retrace doctor

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use retrace_core::{
    git_version, revert_file, Config, EditHistory, RevertOutcome, RevertPreview,
    DATA_DIR_ENV, DEFAULT_SESSION_LIMIT,
};

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "Browse, diff and revert file edits made by a coding agent")]
#[command(version)]
struct Cli {
    /// Agent data directory (contains storage/ and snapshot/) [env: RETRACE_DATA_DIR]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the session log root
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    /// Override the snapshot repository root
    #[arg(long, global = true)]
    snapshot_root: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recent sessions
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, default_value_t = DEFAULT_SESSION_LIMIT)]
        limit: usize,
    },

    /// List the messages of a session
    Messages {
        /// Session id (ses_...)
        session_id: String,
    },

    /// Show the diff recorded by a message
    Diff {
        /// Message id
        message_id: String,

        /// Restrict the diff to this path (relative to the project root)
        #[arg(long)]
        file: Option<String>,
    },

    /// Find messages that edited a file
    History {
        /// File path relative to the project root, matched exactly
        file: String,

        /// Number of recent sessions to search
        #[arg(long, default_value_t = DEFAULT_SESSION_LIMIT)]
        limit: usize,
    },

    /// Revert a file to its state before a message's edit
    Revert {
        /// Message id
        message_id: String,

        /// File path relative to the project root
        file: String,

        /// Apply without prompting
        #[arg(long)]
        yes: bool,
    },

    /// Run diagnostics
    Doctor,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("retrace=debug,retrace_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("retrace=warn,retrace_core=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from));
    let mut config = Config::load_from(&Config::default_config_path(), data_dir)
        .context("Failed to load configuration")?;
    if let Some(root) = &cli.storage_root {
        config.storage_root = root.clone();
    }
    if let Some(root) = &cli.snapshot_root {
        config.snapshot_root = root.clone();
    }
    Ok(config)
}

fn local_time(time: &DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prompt on stderr and read one line from stdin.
fn prompt_yes(preview: &RevertPreview) -> bool {
    if io::stdout().flush().is_err() {
        return false;
    }
    eprint!(
        "Revert {} to its state before {}? [y/N] ",
        preview.file_path, preview.message_id
    );
    if io::stderr().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    debug!(
        "retrace v{} storage={} snapshots={}",
        env!("CARGO_PKG_VERSION"),
        config.storage_root.display(),
        config.snapshot_root.display()
    );
    let history = EditHistory::new(config);

    match cli.command {
        Commands::Sessions { limit } => {
            let sessions = history.list_sessions(limit);
            if cli.json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("No sessions found in {}", history.config().storage_root.display());
            }
            for session in sessions {
                println!(
                    "{}  {}  {:>4} msgs  {}",
                    session.id,
                    local_time(&session.modified),
                    session.message_count,
                    session.title
                );
            }
        }

        Commands::Messages { session_id } => {
            let messages = history.session_messages(&session_id)?;
            if cli.json {
                return print_json(&messages);
            }
            if messages.is_empty() {
                println!("No messages found");
            }
            for message in messages {
                let status = match (&message.patch_hash, message.has_snapshot) {
                    (Some(_), true) => "diff".to_string(),
                    (Some(_), false) => "snapshot missing".to_string(),
                    (None, _) if !message.tools.is_empty() => {
                        format!("tools: {}", message.tools.join(", "))
                    }
                    (None, _) => "-".to_string(),
                };
                println!("{}  {}  {}", message.id, local_time(&message.created), status);
            }
        }

        Commands::Diff { message_id, file } => {
            match history.message_diff(&message_id, file.as_deref())? {
                Some(diff) if diff.is_empty() => {
                    eprintln!("No differences");
                }
                Some(diff) => {
                    print!("{}", diff);
                }
                None => {
                    eprintln!("No diff available for {}", message_id);
                    let tools = history.tools_used(&message_id)?;
                    if !tools.is_empty() {
                        eprintln!("Tools used: {}", tools.join(", "));
                    }
                    std::process::exit(1);
                }
            }
        }

        Commands::History { file, limit } => {
            let mut found = 0usize;
            let mut entries = Vec::new();
            for entry in history.file_history_iter(&file, limit)? {
                let entry = entry?;
                found += 1;
                if cli.json {
                    entries.push(entry);
                } else {
                    println!(
                        "{}  {}  {}  {}",
                        local_time(&entry.timestamp),
                        entry.message_id,
                        entry.session_id,
                        entry.session_title
                    );
                }
            }
            if cli.json {
                return print_json(&entries);
            }
            if found == 0 {
                println!("No edits to {} in the last {} sessions", file, limit);
            }
        }

        Commands::Revert {
            message_id,
            file,
            yes,
        } => {
            let mut confirm = |preview: &RevertPreview| {
                if io::stdout().write_all(&preview.patch).is_err() {
                    return false;
                }
                yes || prompt_yes(preview)
            };
            match revert_file(&history, &message_id, &file, &mut confirm)? {
                RevertOutcome::Applied { .. } => {
                    println!("Reverted {}", file);
                }
                RevertOutcome::Cancelled => {
                    println!("Cancelled");
                }
                RevertOutcome::Rejected(reason) => {
                    eprintln!("Cannot revert {}: {}", file, reason);
                    std::process::exit(1);
                }
                RevertOutcome::Failed {
                    stderr,
                    remediation,
                } => {
                    eprintln!("Revert failed: {}", stderr);
                    eprintln!("{}", remediation);
                    std::process::exit(1);
                }
            }
        }

        Commands::Doctor => {
            let config = history.config();
            println!("Retrace Diagnostics");
            println!("===================\n");

            println!("Config file: {}", Config::default_config_path().display());
            for (label, path) in [
                ("Storage", &config.storage_root),
                ("Snapshots", &config.snapshot_root),
            ] {
                let status = if path.is_dir() { "✓ exists" } else { "✗ not found" };
                println!("{}: {}", label, path.display());
                println!("  Status: {}", status);
            }

            println!("\nGit:");
            match git_version(&config.git_binary) {
                Ok(version) => println!("  Status: ✓ {}", version),
                Err(e) => println!("  Status: ✗ {}", e),
            }

            println!("\nSessions: {}", history.storage().list_sessions_by_recency().len());
            println!("\n--- End Diagnostics ---");
        }
    }

    Ok(())
}
