use std::path::PathBuf;

use chrono::Local;
use colored::Colorize;
use stash_client::{Client, Dialer};
use stash_daemon::{Daemon, DaemonConfig};
use stash_types::{Metadata, Selector};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cli::{
    Cli, Command, DaemonArgs, GetArgs, LogArgs, LsArgs, ReadArgs, RevertArgs, RmArgs, SetArgs,
    TeeArgs,
};
use crate::paths;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store_dir = cli.store.unwrap_or_else(paths::default_store_dir);
    let socket_path = cli.socket.unwrap_or_else(paths::default_socket_path);
    debug!(
        store = %store_dir.display(),
        socket = %socket_path.display(),
        "resolved paths"
    );

    match cli.command {
        Command::Daemon(args) => cmd_daemon(store_dir, socket_path, args).await,
        command => {
            let mut client = Dialer::new(&store_dir, &socket_path).connect().await?;
            match command {
                Command::Ls(args) => cmd_ls(&mut client, args).await,
                Command::Get(args) => cmd_get(&mut client, args).await,
                Command::Set(args) => cmd_set(&mut client, args).await,
                Command::Read(args) => cmd_read(&mut client, args).await,
                Command::Tee(args) => cmd_tee(&mut client, args).await,
                Command::Rm(args) => cmd_rm(&mut client, args).await,
                Command::Log(args) => cmd_log(&mut client, args).await,
                Command::Revert(args) => cmd_revert(&mut client, args).await,
                Command::Daemon(_) => unreachable!("dispatched before connecting"),
            }
        }
    }
}

async fn cmd_daemon(
    store_dir: PathBuf,
    socket_path: PathBuf,
    args: DaemonArgs,
) -> anyhow::Result<()> {
    let mut config = DaemonConfig::new(store_dir, socket_path);
    config.deny_empty = args.deny_empty;
    let daemon = Daemon::new(config)?;
    daemon.spawn_signal_watcher();
    daemon.run().await?;
    Ok(())
}

async fn cmd_ls(client: &mut Client, args: LsArgs) -> anyhow::Result<()> {
    for meta in client.list(args.all).await? {
        if args.long {
            let when = meta.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
            println!(
                "{}  {:>10}  {}  {}",
                meta.digest.short_hex().yellow(),
                format!("{}B", meta.length),
                when.to_string().dimmed(),
                meta.name.bold()
            );
        } else {
            println!("{}", meta.name);
        }
    }
    Ok(())
}

async fn cmd_get(client: &mut Client, args: GetArgs) -> anyhow::Result<()> {
    let selector = args.selector.as_deref().map(crate::cli::parse_selector);
    let mut stdout = tokio::io::stdout();
    client.get(&args.name, selector, &mut stdout).await?;
    if !args.no_newline {
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}

async fn cmd_set(client: &mut Client, args: SetArgs) -> anyhow::Result<()> {
    let prompt = format!("Secret for {}: ", args.name);
    let secret = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await??;
    let meta = client.set_bytes(&args.name, secret.as_bytes()).await?;
    print_receipt(&meta);
    Ok(())
}

async fn cmd_read(client: &mut Client, args: ReadArgs) -> anyhow::Result<()> {
    let mut stdin = tokio::io::stdin();
    let meta = client.set(&args.name, &mut stdin).await?;
    print_receipt(&meta);
    Ok(())
}

/// Store stdin, then stream the committed revision back to stdout. The
/// echo comes from the store, so what is printed is exactly what a later
/// `get` will return. No receipt line: stdout carries the payload.
async fn cmd_tee(client: &mut Client, args: TeeArgs) -> anyhow::Result<()> {
    let mut stdin = tokio::io::stdin();
    let meta = client.set(&args.name, &mut stdin).await?;
    let mut stdout = tokio::io::stdout();
    client
        .get(&args.name, Some(Selector::Revision(meta.revision)), &mut stdout)
        .await?;
    stdout.flush().await?;
    Ok(())
}

async fn cmd_rm(client: &mut Client, args: RmArgs) -> anyhow::Result<()> {
    client.del(&args.name).await?;
    println!("{} removed {}", "✓".green().bold(), args.name.bold());
    Ok(())
}

async fn cmd_log(client: &mut Client, args: LogArgs) -> anyhow::Result<()> {
    for meta in client.log(&args.name, args.limit).await? {
        let when = meta
            .created_at
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S");
        let size = if meta.is_tombstone() {
            "(empty)".dimmed().to_string()
        } else {
            format!("{}B", meta.length)
        };
        println!(
            "{}  {}  {}  {}",
            format!("r{}", meta.revision).yellow().bold(),
            meta.digest.short_hex().dimmed(),
            when,
            size
        );
    }
    Ok(())
}

async fn cmd_revert(client: &mut Client, args: RevertArgs) -> anyhow::Result<()> {
    let meta = client.revert(&args.name, args.revision).await?;
    println!(
        "{} {} now at r{} {}",
        "✓".green().bold(),
        meta.name.bold(),
        meta.revision,
        meta.digest.short_hex().yellow()
    );
    Ok(())
}

fn print_receipt(meta: &Metadata) {
    println!(
        "{} stored {} r{} {} ({}B)",
        "✓".green().bold(),
        meta.name.bold(),
        meta.revision,
        meta.digest.short_hex().yellow(),
        meta.length
    );
}
