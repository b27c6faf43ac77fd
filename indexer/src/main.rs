use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scour_core::{
    Document, DocumentStore, IndexHandle, IndexStorage, QueryEngine, RebuildCoordinator, SledStore,
};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct InputDoc {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(alias = "body", alias = "text")]
    content: String,
    #[serde(default, alias = "html_content")]
    html: Option<String>,
}

#[derive(Parser)]
#[command(name = "scour-indexer")]
#[command(about = "Load documents into the store and build the search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSON/JSONL document dumps into the document store
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Document store directory
        #[arg(long)]
        store: String,
    },
    /// Build the search index from the document store
    Build {
        /// Document store directory
        #[arg(long)]
        store: String,
        /// Index output directory
        #[arg(long)]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, store } => ingest(&input, &store),
        Commands::Build { store, index } => build(&store, &index),
    }
}

#[derive(Default)]
struct Tally {
    ingested: usize,
    failed: usize,
}

fn ingest(input: &str, store_dir: &str) -> Result<()> {
    let store = SledStore::open(store_dir)
        .with_context(|| format!("opening document store at {store_dir}"))?;

    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files.sort();

    let mut tally = Tally::default();
    for file in files {
        let result = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest_jsonl(&file, &store, &mut tally)
        } else {
            ingest_json(&file, &store, &mut tally)
        };
        // One unreadable file must not sink the rest of the dump.
        if let Err(e) = result {
            tracing::warn!(file = %file.display(), error = %e, "skipping unreadable file");
            tally.failed += 1;
        }
    }
    store.flush()?;

    tracing::info!(ingested = tally.ingested, failed = tally.failed, "ingest complete");
    Ok(())
}

fn ingest_jsonl(file: &Path, store: &SledStore, tally: &mut Tally) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InputDoc>(&line) {
            Ok(doc) => store_doc(store, doc, tally)?,
            Err(e) => {
                tracing::warn!(file = %file.display(), line = line_no + 1, error = %e, "skipping bad record");
                tally.failed += 1;
            }
        }
    }
    Ok(())
}

fn ingest_json(file: &Path, store: &SledStore, tally: &mut Tally) -> Result<()> {
    let f = File::open(file)?;
    let json: serde_json::Value = serde_json::from_reader(BufReader::new(f))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                match serde_json::from_value::<InputDoc>(v) {
                    Ok(doc) => store_doc(store, doc, tally)?,
                    Err(e) => {
                        tracing::warn!(file = %file.display(), error = %e, "skipping bad record");
                        tally.failed += 1;
                    }
                }
            }
        }
        other => {
            let doc: InputDoc = serde_json::from_value(other)?;
            store_doc(store, doc, tally)?;
        }
    }
    Ok(())
}

fn store_doc(store: &SledStore, doc: InputDoc, tally: &mut Tally) -> Result<()> {
    let stored = store.upsert(Document::new(&doc.url, &doc.title, &doc.content, doc.html))?;
    tracing::debug!(id = %stored.id, url = %stored.url, "ingested");
    tally.ingested += 1;
    Ok(())
}

fn build(store_dir: &str, index_dir: &str) -> Result<()> {
    let store: Arc<dyn DocumentStore> = Arc::new(
        SledStore::open(store_dir)
            .with_context(|| format!("opening document store at {store_dir}"))?,
    );
    let handle = Arc::new(IndexHandle::new());
    let coordinator = RebuildCoordinator::new(
        Arc::clone(&store),
        IndexStorage::new(index_dir),
        Arc::clone(&handle),
    );

    let (build_id, summary) = coordinator.rebuild()?;
    tracing::info!(
        %build_id,
        documents = summary.documents_indexed,
        skipped = summary.documents_skipped,
        terms = summary.terms_indexed,
        "index built"
    );

    let engine = QueryEngine::new(handle, store);
    if let Ok(stats) = engine.stats() {
        for top in stats.top_terms {
            tracing::info!(term = %top.term, document_frequency = top.document_frequency, "top term");
        }
    }
    Ok(())
}
