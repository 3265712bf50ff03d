use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

use solargraph_lsp::config::Overrides;
use solargraph_lsp::{Backend, Config};

#[derive(Parser)]
#[command(
    name = "solargraph-lsp",
    version,
    about = "Ruby completion for any LSP editor, backed by a Solargraph server."
)]
struct Cli {
    /// Host of an already running Solargraph server
    #[arg(long)]
    host: Option<String>,

    /// Port of an already running Solargraph server (nothing is spawned)
    #[arg(long)]
    port: Option<u16>,

    /// Extra config file, applied after the user config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Talk LSP over stdio (the only mode; accepted for editor compatibility)
    #[arg(long)]
    stdio: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the LSP stream, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("solargraph_lsp=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    if !cli.stdio {
        tracing::debug!("no transport flag given, using stdio");
    }

    let mut config = Config::load_user();
    if let Some(path) = &cli.config
        && let Err(e) = config.merge_file(path)
    {
        tracing::error!("{}", e);
        return ExitCode::FAILURE;
    }
    config.set_overrides(Overrides {
        host: cli.host,
        port: cli.port,
    });

    tracing::info!("solargraph-lsp {} starting", env!("CARGO_PKG_VERSION"));

    let (service, socket) = LspService::new(|client| Backend::new(client, config));
    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;

    ExitCode::SUCCESS
}
