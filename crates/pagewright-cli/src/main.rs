use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pagewright::{submit, Config};

#[derive(Parser)]
#[command(author, version, about = "Turn a prompt and PDFs into an HTML page", long_about = None)]
struct Cli {
    /// The request to fulfil
    prompt: Option<String>,

    /// Read the prompt from a file instead of the command line
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// PDF documents to attach; may be given multiple times
    #[arg(short, long = "document")]
    documents: Vec<PathBuf>,

    /// Where to write the resulting HTML (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(prompt), _) => prompt.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read prompt file {}", path.display()))?,
        (None, None) => anyhow::bail!("a prompt is required, either inline or via --prompt-file"),
    };

    let config = Config::from_env().context("failed to resolve configuration")?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            ctrl_c_cancel.cancel();
        }
    });

    let html = submit(&prompt, &cli.documents, &config, &cancel).await?;

    match &cli.output {
        Some(path) => std::fs::write(path, &html)
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => println!("{html}"),
    }

    Ok(())
}
