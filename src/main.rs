//! quire - library, cover and reading-state tooling for an EPUB reader

mod error;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use quire_config::Config;
use quire_library::{Context, PruneEvent};
use quire_storage::backend::LocalBackend;
use quire_storage::{BackendHandle, PathLocks};
use quire_sync::StateSnapshot;
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::{ErrorKind, Result};

#[derive(Parser)]
#[command(name = "quire")]
#[command(version, about = "Library, cover and reading-state tooling for an EPUB reader", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "QUIRE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the cover of an EPUB without touching the library
    Cover {
        #[arg(value_name = "EPUB")]
        epub: PathBuf,
        /// Write the cover image into this directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Add EPUB files to the library
    Ingest {
        #[arg(value_name = "EPUB", required = true)]
        epubs: Vec<PathBuf>,
    },
    /// Merge a client's reading state into the stored one and print the result
    Reconcile {
        #[arg(value_name = "LOCAL.json")]
        local: PathBuf,
    },
    /// Delete a book with its covers, progress and bookmarks
    Forget {
        #[arg(value_name = "BOOK_ID")]
        book_id: String,
    },
    /// Delete covers whose book is no longer stored
    Prune,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_filter(filter))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let ctx = context(&config);
    match cli.command {
        Command::Cover { epub, output } => cover(&ctx, &epub, output.as_deref()).await,
        Command::Ingest { epubs } => ingest(&open(&config)?, &ctx, &epubs).await,
        Command::Reconcile { local } => reconcile(&open(&config)?, &ctx, &local).await,
        Command::Forget { book_id } => forget(&open(&config)?, &ctx, &book_id).await,
        Command::Prune => prune(&open(&config)?).await,
    }
}

fn context(config: &Config) -> Context {
    Context {
        state_file: config.state_file.clone(),
        cover_timeout: config.cover_timeout(),
        retry: config.retry_policy(),
        bookmark_policy: config.bookmark_policy,
    }
}

fn open(config: &Config) -> Result<BackendHandle> {
    let root = std::path::absolute(&config.library)
        .or_raise(|| ErrorKind::File(config.library.display().to_string()))?;
    let backend = LocalBackend::new("library", &root).or_raise(|| ErrorKind::Storage)?;
    tracing::debug!(root = %root.display(), "library opened");
    Ok(Arc::new(backend))
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.or_raise(|| ErrorKind::File(path.display().to_string()))
}

fn emit(value: &serde_json::Value) {
    println!("{value:#}");
}

async fn cover(ctx: &Context, epub: &Path, output: Option<&Path>) -> Result<()> {
    let data = read(epub).await?;
    let extracted = quire_library::run_with_timeout(ctx.cover_timeout, move || quire_cover::try_extract_cover(data))
        .await
        .ok_or_raise(|| ErrorKind::Input("cover extraction timed out".into()))?;
    let cover = match extracted {
        Ok(Some(cover)) => cover,
        Ok(None) => {
            tracing::info!(epub = %epub.display(), "no cover found");
            emit(&serde_json::Value::Null);
            return Ok(());
        },
        Err(e) => return Err(e).or_raise(|| ErrorKind::Input(format!("{} is not a readable EPUB", epub.display()))),
    };

    let written = match output {
        Some(dir) => {
            let stem = epub.file_stem().map_or("cover".into(), |stem| stem.to_string_lossy());
            let target = dir.join(format!("{stem}.{}", cover.asset.extension));
            tokio::fs::create_dir_all(dir)
                .await
                .or_raise(|| ErrorKind::File(dir.display().to_string()))?;
            tokio::fs::write(&target, &cover.asset.bytes)
                .await
                .or_raise(|| ErrorKind::File(target.display().to_string()))?;
            Some(target)
        },
        None => None,
    };
    emit(&json!({
        "path": cover.path,
        "source": cover.source.to_string(),
        "mimeType": cover.asset.mime_type,
        "size": cover.asset.bytes.len(),
        "written": written,
    }));
    Ok(())
}

async fn ingest(backend: &BackendHandle, ctx: &Context, epubs: &[PathBuf]) -> Result<()> {
    let mut uploads = Vec::with_capacity(epubs.len());
    for epub in epubs {
        uploads.push(read(epub).await?);
    }

    let mut failed = 0;
    let mut results = quire_library::ingest_all(backend, ctx, uploads);
    while let Some((index, result)) = results.next().await {
        let source = epubs[index].display().to_string();
        match result {
            Ok(book) => {
                tracing::info!(%source, id = %book.id, "ingested");
                emit(&json!({ "source": source, "book": book }));
            },
            Err(e) => {
                failed += 1;
                tracing::error!(%source, error = ?e, "ingest failed");
            },
        }
    }
    if failed > 0 {
        exn::bail!(ErrorKind::Partial);
    }
    Ok(())
}

async fn reconcile(backend: &BackendHandle, ctx: &Context, local: &Path) -> Result<()> {
    let incoming = StateSnapshot::from_json(&read(local).await?)
        .or_raise(|| ErrorKind::Input(format!("{} is not a reading state document", local.display())))?;
    let merged = quire_library::synchronize(backend, &PathLocks::new(), ctx, incoming)
        .await
        .or_raise(|| ErrorKind::Library)?;
    let document = merged.to_json().or_raise(|| ErrorKind::Library)?;
    println!("{}", String::from_utf8_lossy(&document));
    Ok(())
}

async fn forget(backend: &BackendHandle, ctx: &Context, book_id: &str) -> Result<()> {
    let forgotten = quire_library::forget(backend, &PathLocks::new(), ctx, book_id)
        .await
        .or_raise(|| ErrorKind::Library)?;
    emit(&json!({
        "book": forgotten.book,
        "covers": forgotten.covers,
        "records": forgotten.records,
    }));
    Ok(())
}

async fn prune(backend: &BackendHandle) -> Result<()> {
    let mut failed = 0;
    let mut events = std::pin::pin!(quire_library::prune_covers(backend));
    while let Some(event) = events.next().await {
        match event {
            Ok(PruneEvent::Removed(path)) => tracing::info!(path = %path.display(), "removed"),
            Ok(PruneEvent::Kept(path)) => tracing::debug!(path = %path.display(), "kept"),
            Ok(PruneEvent::Complete(removed)) => emit(&json!({ "removed": removed })),
            Ok(PruneEvent::Started) => {},
            Err(e) => {
                failed += 1;
                tracing::error!(error = ?e, "prune failed");
            },
        }
    }
    if failed > 0 {
        exn::bail!(ErrorKind::Partial);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["quire", "cover", "a.epub"])]
    #[case(&["quire", "cover", "a.epub", "--output", "covers"])]
    #[case(&["quire", "ingest", "a.epub", "b.epub"])]
    #[case(&["quire", "--config", "quire.toml", "reconcile", "local.json"])]
    #[case(&["quire", "forget", "abc123"])]
    #[case(&["quire", "prune"])]
    fn test_parse(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[rstest]
    #[case(&["quire"])]
    #[case(&["quire", "ingest"])]
    #[case(&["quire", "forget"])]
    fn test_parse_invalid(#[case] args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_context_from_config() {
        let config = Config {
            cover_timeout_secs: 3,
            ..Config::default()
        };
        let ctx = context(&config);
        assert_eq!(ctx.cover_timeout, std::time::Duration::from_secs(3));
        assert_eq!(ctx.retry, config.retry_policy());
        assert_eq!(ctx.state_file, config.state_file);
    }

    #[tokio::test]
    async fn test_cover_rejects_non_epub() {
        let dir = tempfile::tempdir().unwrap();
        let epub = dir.path().join("book.epub");
        std::fs::write(&epub, b"not an epub").unwrap();
        let result = cover(&Context::default(), &epub, Some(dir.path())).await;
        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
