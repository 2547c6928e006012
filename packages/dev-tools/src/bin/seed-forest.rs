//! Forest Seeding Binary
//!
//! Loads a category tree into the configured database with interval
//! maintenance switched off, then rebuilds and verifies it. Useful for
//! filling a development database and for timing deferred maintenance
//! against a real file.
//!
//! # Usage
//!
//! ```bash
//! # Seed the default database (~/.nodeforest/database/forest.db)
//! cargo run --bin seed-forest
//!
//! # Fresh database with 50 top-level categories
//! NODEFOREST_CLEAR_DB=1 CATEGORY_COUNT=50 cargo run --bin seed-forest
//! ```
//!
//! # Environment Variables
//!
//! - `CATEGORY_COUNT`: Categories directly below the root (default: 5)
//! - `SUBCATEGORY_COUNT`: Children of each category (default: 3)
//! - `NODEFOREST_*`: Store configuration, see `ForestConfig::with_overrides`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::sync::Arc;
use std::time::Instant;

use nodeforest_core::db::NodeStore;
use nodeforest_core::{ForestConfig, MaintenanceContext, TreeMutator};

fn count_from_env(key: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ForestConfig::from_env()?;
    let categories = count_from_env("CATEGORY_COUNT", 5)?;
    let subcategories = count_from_env("SUBCATEGORY_COUNT", 3)?;

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Table: {}", config.table_name);
    tracing::info!(
        "Seeding {} categories x {} subcategories",
        categories,
        subcategories
    );

    let store = Arc::new(config.open_store().await?);
    let mutator = TreeMutator::new(store.clone(), config.tree_id_allocator());
    let deferred = MaintenanceContext::disabled();

    let started = Instant::now();
    let mut payload = 0i64;
    let root = mutator.insert_root(deferred, payload, None).await?;
    for _ in 0..categories {
        payload += 1;
        let category = mutator.insert_child(deferred, payload, root).await?;
        for _ in 0..subcategories {
            payload += 1;
            mutator.insert_child(deferred, payload, category).await?;
        }
    }
    let loaded = started.elapsed();

    let tree_id = store
        .get(root)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Seeded root {} disappeared", root))?
        .tree_id;

    let report = mutator.rebuild(tree_id).await?;
    mutator.verify(tree_id).await?;

    tracing::info!(
        "Loaded {} nodes into tree {} in {:?}, rebuilt in {:?} (max right {})",
        report.node_count,
        report.tree_id,
        loaded,
        started.elapsed() - loaded,
        report.max_right
    );

    Ok(())
}
