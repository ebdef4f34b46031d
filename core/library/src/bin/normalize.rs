/// Normalize Binary - Rewrites every category document as an id-keyed map
///
/// Usage:
///   cargo run --bin normalize-library [--knowledge-dir <path>] [--dry-run]
///
/// Legacy list and envelope documents are read, records without an id are
/// dropped or keyed, and every category is written back in the current shape.

use anyhow::{Context, Result};
use clap::Parser;
use heritage_library_store::{LibraryConfig, LibraryStore};
use std::path::PathBuf;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "normalize-library")]
#[command(about = "Rewrite category documents of the resource library as id-keyed maps")]
struct Args {
    /// Directory holding `<category>/data.json` (defaults to KNOWLEDGE_DIR or <RESOURCES_DIR>/knowledge)
    #[arg(long, short)]
    knowledge_dir: Option<PathBuf>,

    /// Report what would be written without touching any file
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Heritage Resource Library - Normalize Tool v0.1.0");

    let args = Args::parse();

    let knowledge_dir = match args.knowledge_dir {
        Some(dir) => dir,
        None => LibraryConfig::from_env()?.knowledge_dir,
    };
    info!("Knowledge directory: {}", knowledge_dir.display());

    let mut store = LibraryStore::load(&knowledge_dir)
        .with_context(|| format!("loading {}", knowledge_dir.display()))?;

    for (category, collection) in store.categories() {
        if collection.is_empty() {
            warn!("  {}: empty", category);
        } else {
            info!("  {}: {} resources", category, collection.len());
        }
    }

    if args.dry_run {
        info!(
            "Dry run: {} resources in {} categories would be rewritten",
            store.total_resources(),
            store.category_names().len()
        );
        return Ok(());
    }

    store.persist().context("writing category documents")?;

    info!("=================================");
    info!("Normalization Complete!");
    info!("=================================");
    info!("Categories rewritten: {}", store.category_names().len());
    info!("Resources kept:       {}", store.total_resources());

    Ok(())
}
