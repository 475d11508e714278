use clap::Parser;

mod cli;
mod commands;
mod paths;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    init_tracing(cli.debug);
    if let Err(err) = commands::run_command(cli).await {
        eprintln!("stash: {err:#}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; stdout carries payloads and the daemon readiness
/// line.
fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
