use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use embedding_provider::config::{build_embedder, EmbedderSettings};
use rag_service::{IngestStage, ProgressEvent, ProgressFn, RagService, ServiceConfig};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!(
        "Usage:\n\
         rag-cli ingest <FILE> [--store DIR] [--chunk-size N] [--chunk-overlap N] [--window N]\n\
         rag-cli context --query Q [--k N] [--store DIR] [--json]\n\
         rag-cli docs [--store DIR]\n\
         rag-cli stats [--store DIR]\n\
         \n\
         Environment: RAG_STORE_DIR, RAG_CHUNK_SIZE, RAG_CHUNK_OVERLAP, RAG_WINDOW_SIZE,\n\
           RAG_EMBED_BATCH, RAG_SEGMENTER, RAG_EMBEDDER (hashing|onnx|openai),\n\
           OPENAI_API_KEY, OPENAI_BASE_URL, RUST_LOG (a .env file in the working directory is read first)\n"
    );
}

/// Flags shared by every subcommand plus the positional arguments left over.
struct Args {
    positional: Vec<String>,
    store: Option<PathBuf>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    window: Option<usize>,
    query: Option<String>,
    k: usize,
    json: bool,
}

fn parse_args(tail: &[String]) -> Result<Args> {
    let mut args = Args {
        positional: Vec::new(),
        store: None,
        chunk_size: None,
        chunk_overlap: None,
        window: None,
        query: None,
        k: 5,
        json: false,
    };
    let mut it = tail.iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().cloned().ok_or_else(|| anyhow!("{flag} requires a value"));
        match arg.as_str() {
            "--store" => args.store = Some(PathBuf::from(value("--store")?)),
            "--chunk-size" => args.chunk_size = Some(parse_number("--chunk-size", &value("--chunk-size")?)?),
            "--chunk-overlap" => args.chunk_overlap = Some(parse_number("--chunk-overlap", &value("--chunk-overlap")?)?),
            "--window" => args.window = Some(parse_number("--window", &value("--window")?)?),
            "--query" => args.query = Some(value("--query")?),
            "--k" => args.k = parse_number("--k", &value("--k")?)?,
            "--json" => args.json = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => args.positional.push(arg.clone()),
        }
    }
    Ok(args)
}

fn parse_number(flag: &str, raw: &str) -> Result<usize> {
    raw.parse().with_context(|| format!("{flag} expects a non-negative integer, got `{raw}`"))
}

fn build_service(args: &Args) -> Result<RagService> {
    let mut cfg = ServiceConfig::from_env()?;
    if let Some(dir) = &args.store {
        cfg.store_dir = dir.clone();
    }
    if let Some(n) = args.chunk_size {
        cfg.chunk.chunk_size = n;
    }
    if let Some(n) = args.chunk_overlap {
        cfg.chunk.chunk_overlap = n;
    }
    if let Some(n) = args.window {
        cfg.chunk.window_size = n;
    }
    let embedder = build_embedder(&EmbedderSettings::from_env()?)?;
    Ok(RagService::new(cfg, embedder)?)
}

fn do_ingest(args: &Args) -> Result<()> {
    let file = args.positional.first().ok_or_else(|| anyhow!("ingest requires a file path"))?;
    let svc = Arc::new(build_service(args)?);
    let params = svc.config().chunk;
    let progress: ProgressFn = Box::new(|event: ProgressEvent| match event {
        ProgressEvent::Stage { stage: IngestStage::Split, chunks } => eprintln!("split into {chunks} chunks"),
        ProgressEvent::EmbedBatch { done, total, .. } => eprintln!("embedded {done}/{total}"),
        ProgressEvent::Failed { kind, message } => eprintln!("failed ({kind:?}): {message}"),
        _ => {}
    });
    let written = svc
        .ingest_in_background(file, params, Some(progress))
        .join()
        .map_err(|_| anyhow!("ingestion thread panicked"))??;
    println!("ingested {file}: {written} chunks");
    Ok(())
}

fn do_context(args: &Args) -> Result<()> {
    let query = args.query.as_deref().ok_or_else(|| anyhow!("context requires --query"))?;
    let svc = build_service(args)?;
    let ctx = svc.answer_context(query, args.k)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
        return Ok(());
    }
    if ctx.is_empty() {
        println!("no matching context");
    }
    for (i, text) in ctx.contexts.iter().enumerate() {
        println!("--- context {} ---\n{}", i + 1, text);
    }
    Ok(())
}

fn do_docs(args: &Args) -> Result<()> {
    let svc = build_service(args)?;
    for doc in svc.list_documents()? {
        println!(
            "{}\t{} chunks\t{}\t{}",
            doc.ingested_at,
            doc.chunk_count,
            doc.content_sha256.as_deref().unwrap_or("-"),
            doc.source_uri
        );
    }
    Ok(())
}

fn do_stats(args: &Args) -> Result<()> {
    let svc = build_service(args)?;
    let stats = svc.stats()?;
    println!("store: {}", svc.config().store_dir.display());
    println!("documents: {}", stats.documents);
    println!("chunks: {}", stats.chunks);
    match stats.dimension {
        Some(d) => println!("dimension: {d}"),
        None => println!("dimension: -"),
    }
    Ok(())
}

/// Load the nearest `.env` found in `dir` or its ancestors. Variables already
/// present in the process environment keep their values.
fn load_env_file(dir: &Path) -> Option<PathBuf> {
    let path = dir.ancestors().map(|d| d.join(".env")).find(|p| p.is_file())?;
    dotenvy::from_path(&path).ok()?;
    Some(path)
}

fn main() -> Result<()> {
    let env_file = env::current_dir().ok().and_then(|dir| load_env_file(&dir));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = &env_file {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let argv: Vec<String> = env::args().skip(1).collect();
    let Some((cmd, tail)) = argv.split_first() else {
        print_usage();
        std::process::exit(2);
    };
    let args = parse_args(tail)?;
    match cmd.as_str() {
        "ingest" => do_ingest(&args),
        "context" => do_context(&args),
        "docs" => do_docs(&args),
        "stats" => do_stats(&args),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown command `{other}`")
        }
    }
}
