//! CLI entry point for Folio: build, list, query and inspect vector stores.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use folio_core::{
    app_data_dir, build_store, ensure_tokenizer_file, list_documents, load_config,
    resolve_document_filter, search_text, set_store_path, BuildOptions, BuildOutcome,
    ChunkParams, Config, GutenbergSource, HfTokenizer, LocalDirSource, OllamaClient, QueryEngine,
    QueryHit, SplitMode, TextSource, VectorStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio: on-disk vector stores for chunked text corpora")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show where Folio stores its config, tokenizer and default store.
    DataDir,
    /// Print the effective config, or persist a default store path.
    Config {
        /// Store file used when commands are not given `--store`.
        #[arg(long, value_name = "PATH")]
        set_store: Option<PathBuf>,
    },
    /// Build a store from a Gutenberg ebook (default) or a local directory.
    Build {
        /// Output store file (default: configured store path).
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
        /// Rebuild even if the store exists.
        #[arg(long)]
        rebuild: bool,
        /// Gutenberg ebook id.
        #[arg(long, conflicts_with = "dir")]
        gutenberg_id: Option<u32>,
        /// Read `.txt` / `.md` files under this directory instead of Gutenberg.
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
        /// Keep the ebook as one document with this title instead of splitting works.
        #[arg(long, value_name = "TITLE", conflicts_with = "dir")]
        whole_title: Option<String>,
        #[arg(long)]
        max_tokens: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
        /// Ollama embedding model.
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        ollama_url: Option<String>,
        /// Provenance / license note stored in metadata.
        #[arg(long)]
        note: Option<String>,
        /// Don't draw progress bars while chunking and embedding.
        #[arg(long)]
        no_progress: bool,
    },
    /// List the documents in a store with their row ranges.
    List {
        #[arg(long, value_name = "PATH")]
        store: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Top-K cosine search by text (embedded with Ollama) or by raw vector.
    Query {
        #[arg(long, value_name = "PATH")]
        store: Option<PathBuf>,
        #[arg(long, required_unless_present = "vector", conflicts_with = "vector")]
        text: Option<String>,
        /// Comma-separated floats, one per dimension.
        #[arg(long, allow_hyphen_values = true)]
        vector: Option<String>,
        /// Only search the first document whose title contains this (case-insensitive).
        #[arg(long)]
        work: Option<String>,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        block_rows: Option<usize>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        ollama_url: Option<String>,
    },
    /// Show store metadata, shape and size.
    Info {
        #[arg(long, value_name = "PATH")]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config();

    match cli.command {
        Commands::DataDir => match app_data_dir() {
            Some(p) => println!("{}", p.display()),
            None => bail!("could not determine app data directory"),
        },
        Commands::Config { set_store } => {
            if let Some(path) = set_store {
                set_store_path(&path)?;
                println!("Default store set to {}", path.display());
            } else {
                print!("{}", toml_string(&config)?);
            }
        }
        Commands::Build {
            out,
            rebuild,
            gutenberg_id,
            dir,
            whole_title,
            max_tokens,
            overlap,
            model,
            ollama_url,
            note,
            no_progress,
        } => {
            let output = store_path(out, &config)?;
            let params = ChunkParams::new(
                max_tokens.unwrap_or(config.max_tokens),
                overlap.unwrap_or(config.overlap),
            )?;
            let embedder = ollama_client(&config, model, ollama_url)?;
            let mut options = BuildOptions {
                output,
                force_rebuild: rebuild,
                params,
                batch_size: config.batch_size,
                note: note.unwrap_or_default(),
                show_progress: !no_progress,
            };
            let outcome = match dir {
                Some(dir) => run_build(&LocalDirSource::new(dir), &config, &embedder, &options).await?,
                None => {
                    let id = gutenberg_id.unwrap_or(config.gutenberg_id);
                    if options.note.is_empty() {
                        options.note = format!(
                            "Project Gutenberg ebook #{id}; see https://www.gutenberg.org/policy/license.html"
                        );
                    }
                    let split = whole_title.map_or(SplitMode::Works, SplitMode::Whole);
                    run_build(&GutenbergSource::new(id, split)?, &config, &embedder, &options).await?
                }
            };
            match outcome {
                BuildOutcome::Skipped(path) => {
                    println!("Store already exists at {}; pass --rebuild to regenerate.", path.display())
                }
                BuildOutcome::Built { path, rows, documents } => {
                    println!("Built {} ({} rows, {} documents)", path.display(), rows, documents)
                }
            }
        }
        Commands::List { store, json } => {
            let store = open_store(store, &config)?;
            let entries = list_documents(&store);
            if json {
                println!("{}", serde_json::to_string_pretty(entries)?);
            } else {
                println!("{:>4} | {:>7} | {:>7} | Title", "ID", "Start", "End");
                println!("{}", "-".repeat(80));
                for e in entries {
                    println!("{:>4} | {:>7} | {:>7} | {}", e.document_id, e.start_row, e.end_row, e.title);
                }
            }
        }
        Commands::Query {
            store,
            text,
            vector,
            work,
            k,
            json,
            block_rows,
            model,
            ollama_url,
        } => {
            let store = open_store(store, &config)?;
            let engine = QueryEngine::new(&store).with_block_rows(block_rows.unwrap_or(config.block_rows));
            let hits = match (text, vector) {
                (Some(text), _) => {
                    let model = model.or_else(|| Some(store.metadata().embedding_model.clone()));
                    let embedder = ollama_client(&config, model, ollama_url)?;
                    search_text(&engine, &embedder, &text, k, work.as_deref()).await?
                }
                (None, Some(raw)) => {
                    let q = parse_vector(&raw)?;
                    let filter = work
                        .as_deref()
                        .map(|w| resolve_document_filter(store.range_index(), w))
                        .transpose()?;
                    engine.query(&q, k, filter)?
                }
                (None, None) => bail!("pass --text or --vector"),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                print_hits(&hits);
            }
        }
        Commands::Info { store } => {
            let store = open_store(store, &config)?;
            let meta = store.metadata();
            println!("Store      {}", store.path().display());
            println!("  rows       {}", store.row_count());
            println!("  dimension  {}", store.dimension());
            println!("  documents  {}", store.range_index().len());
            println!("  file size  {} bytes", store.file_size());
            println!("  model      {}", meta.embedding_model);
            println!("  tokenizer  {}", meta.tokenizer);
            println!("  chunking   max_tokens={} overlap={}", meta.max_tokens, meta.overlap);
            println!("  created    {}", meta.created_at.to_rfc3339());
            println!("  source     {}", meta.source);
            if !meta.note.is_empty() {
                println!("  note       {}", meta.note);
            }
        }
    }
    Ok(())
}

async fn run_build<S: TextSource>(
    source: &S,
    config: &Config,
    embedder: &OllamaClient,
    options: &BuildOptions,
) -> anyhow::Result<BuildOutcome> {
    // Checked here too so an existing store never triggers the tokenizer download.
    if options.output.exists() && !options.force_rebuild {
        tracing::info!("Store {} exists; skipping build", options.output.display());
        return Ok(BuildOutcome::Skipped(options.output.clone()));
    }
    let path = config
        .resolved_tokenizer_path()
        .context("could not determine tokenizer path")?;
    let path = ensure_tokenizer_file(&config.tokenizer_url, &path).await?;
    tracing::info!("Using tokenizer {}", path.display());
    let tokenizer = HfTokenizer::from_file(&path)?.with_name(tokenizer_label(config, &path));
    Ok(build_store(source, &tokenizer, embedder, options).await?)
}

fn tokenizer_label(config: &Config, path: &Path) -> String {
    match &config.tokenizer_path {
        Some(p) if !p.is_empty() => path.display().to_string(),
        _ => config.tokenizer_url.clone(),
    }
}

fn ollama_client(
    config: &Config,
    model: Option<String>,
    url: Option<String>,
) -> anyhow::Result<OllamaClient> {
    let url = url.unwrap_or_else(|| config.ollama_url.clone());
    let model = model.unwrap_or_else(|| config.embed_model.clone());
    Ok(OllamaClient::new(&url, model)?)
}

fn store_path(explicit: Option<PathBuf>, config: &Config) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(|| config.resolved_store_path())
        .context("no store path given and no app data directory")
}

fn open_store(explicit: Option<PathBuf>, config: &Config) -> anyhow::Result<VectorStore> {
    let path = store_path(explicit, config)?;
    Ok(VectorStore::open(&path)?)
}

fn parse_vector(raw: &str) -> anyhow::Result<Vec<f32>> {
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid vector component {s:?}"))
        })
        .collect()
}

fn toml_string(config: &Config) -> anyhow::Result<String> {
    let dir = app_data_dir().map(|d| d.display().to_string()).unwrap_or_default();
    Ok(format!("# data dir: {dir}\n{}", toml::to_string_pretty(config)?))
}

fn print_hits(hits: &[QueryHit]) {
    for h in hits {
        println!(
            "[{:>2}] score={:.4} row={} document_id={} title={}",
            h.rank, h.score, h.row, h.document_id, h.document_title
        );
        let snip = h.text.replace('\n', " ");
        let snip = match snip.char_indices().nth(180) {
            Some((cut, _)) => format!("{}…", &snip[..cut]),
            None => snip,
        };
        println!("      {snip}");
    }
}
