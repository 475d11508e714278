use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stash_types::Selector;

#[derive(Parser)]
#[command(
    name = "stash",
    about = "Versioned secret storage over a local daemon",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory
    #[arg(long, global = true, env = "STASH_STORE")]
    pub store: Option<PathBuf>,

    /// Daemon socket path
    #[arg(long, global = true, env = "STASH_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Verbose logging on stderr
    #[arg(long, global = true, env = "STASH_DEBUG")]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List stored names
    Ls(LsArgs),
    /// Print a secret to stdout
    Get(GetArgs),
    /// Prompt for a secret and store it
    Set(SetArgs),
    /// Store standard input
    Read(ReadArgs),
    /// Store standard input, then echo the stored payload
    Tee(TeeArgs),
    /// Remove a name (its history is kept)
    Rm(RmArgs),
    /// Show revision history, newest first
    Log(LogArgs),
    /// Point a name back at an earlier revision
    Revert(RevertArgs),
    /// Run the daemon in the foreground
    Daemon(DaemonArgs),
}

#[derive(Args)]
pub struct LsArgs {
    /// Long listing: digest, size, timestamp
    #[arg(short, long)]
    pub long: bool,
    /// Include empty (tombstone) entries
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Args)]
pub struct GetArgs {
    pub name: String,
    /// Revision number or digest hex prefix
    pub selector: Option<String>,
    /// Do not append a trailing newline
    #[arg(short = 'n', long)]
    pub no_newline: bool,
}

#[derive(Args)]
pub struct SetArgs {
    pub name: String,
}

#[derive(Args)]
pub struct ReadArgs {
    pub name: String,
}

#[derive(Args)]
pub struct TeeArgs {
    pub name: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub name: String,
}

#[derive(Args)]
pub struct LogArgs {
    pub name: String,
    /// Limit the number of entries (0 means all)
    #[arg(short = 'n', long, default_value = "0")]
    pub limit: u64,
}

#[derive(Args)]
pub struct RevertArgs {
    pub name: String,
    pub revision: u64,
}

#[derive(Args)]
pub struct DaemonArgs {
    /// Reject empty payloads instead of recording tombstones
    #[arg(long)]
    pub deny_empty: bool,
}

/// An all-digits selector is a revision number; anything else is taken
/// as a digest hex prefix. Digits that overflow a u64 fall through to
/// the digest path, where they simply will not match.
pub fn parse_selector(raw: &str) -> Selector {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(revision) = raw.parse::<u64>() {
            return Selector::Revision(revision);
        }
    }
    Selector::Digest(raw.to_string())
}
