//! ragstream Ingestion
//!
//! One-shot corpus import into the pgvector passage table:
//! 1. Loads `{title, content}` records from a JSON file or directory
//! 2. Cleans, orders and de-duplicates them
//! 3. Embeds them in batches as retrieval passages
//! 4. Inserts anything not already stored
//!
//! Usage: `ingest [PATH]` (defaults to `ingestion.source_path`)

mod errors;
mod processor;

use processor::IngestionProcessor;
use ragstream_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    telemetry, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability);
    info!("Starting ragstream ingestion v{}", VERSION);

    let source = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.ingestion.source_path));

    let pool = DbPool::new(&config.database).await?;
    let store = Arc::new(Repository::new(pool));

    let embedder = create_embedder(&config.embedding)?;
    info!(
        model = embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder ready"
    );

    let processor = IngestionProcessor::new(store, embedder, config.ingestion.batch_size);
    let report = processor.process_path(&source).await?;

    info!(
        source = %source.display(),
        records = report.records,
        inserted = report.inserted,
        skipped = report.skipped,
        stored = report.stored,
        "Import finished"
    );
    Ok(())
}
