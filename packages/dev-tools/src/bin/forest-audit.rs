//! Forest Audit Binary
//!
//! Validates one forest in a libsql database file and, when asked, rebuilds
//! its positional fields from the parent pointers.
//!
//! # Usage
//!
//! ```bash
//! # Report violations in the organizations forest
//! FOREST_DB_PATH=./data/app.db FOREST_TABLE=organizations cargo run --bin forest-audit
//!
//! # Repair it
//! FOREST_REBUILD=1 FOREST_DB_PATH=./data/app.db FOREST_TABLE=organizations \
//!     cargo run --bin forest-audit
//! ```
//!
//! # Environment Variables
//!
//! - `FOREST_DB_PATH`: Database file (default: `./hierarchy.db`)
//! - `FOREST_TABLE`: Forest to audit (required)
//! - `FOREST_REBUILD`: Rebuild when violations are found (`1`/`true`)
//! - `HIERARCHY_*`: Engine tunables, see `TreeConfig::from_env`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug")
//!
//! Violations are printed to stdout as JSON lines. The process fails while
//! violations remain. Ctrl-C cancels a running scan without writing anything.

use std::env;
use std::path::PathBuf;

use hierarchy_core::{CancelSignal, Forest, TreeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path: PathBuf = env::var("FOREST_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./hierarchy.db"));
    let table = env::var("FOREST_TABLE")
        .map_err(|_| anyhow::anyhow!("FOREST_TABLE must name the forest to audit"))?;
    let rebuild = env::var("FOREST_REBUILD")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    tracing::info!("Database: {}", db_path.display());
    tracing::info!("Forest: {}", table);

    let config = TreeConfig::from_env();
    let forest = Forest::open_file(db_path, &table, config).await?;

    let (trigger, signal) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });

    let violations = forest.auditor().validate(Some(&signal)).await?;
    for violation in &violations {
        println!("{}", serde_json::to_string(violation)?);
    }

    if violations.is_empty() {
        tracing::info!("Forest '{}' is sound", table);
        return Ok(());
    }

    if !rebuild {
        anyhow::bail!(
            "forest '{}' has {} violation(s); set FOREST_REBUILD=1 to repair",
            table,
            violations.len()
        );
    }

    let count = forest.auditor().rebuild(Some(&signal)).await?;
    forest.auditor().check(Some(&signal)).await?;
    tracing::info!("Rebuilt forest '{}' ({} nodes)", table, count);
    Ok(())
}
