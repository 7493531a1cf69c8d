//! `ddbmetrics summary`

use anyhow::{Context, Result};
use ddbmetrics::output::{format_optional_time, print_table};
use ddbmetrics::AppConfig;
use ddbmetrics_store::SqliteMetricStore;

pub fn run(json: bool, config: &AppConfig) -> Result<()> {
    let path = &config.metrics_db_path;
    if !path.exists() {
        println!("No metric store at {}", path.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let summary = runtime.block_on(async {
        let store = SqliteMetricStore::open(path)
            .await
            .with_context(|| format!("Failed to open metric store {}", path.display()))?;
        store.summary().await.context("Failed to summarize metrics")
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "{} points across {} resources",
        summary.total_points, summary.total_resources
    );
    let rows = summary
        .by_kind
        .into_iter()
        .map(|k| {
            vec![
                k.resource_kind,
                k.resources.to_string(),
                k.points.to_string(),
                format_optional_time(k.earliest),
                format_optional_time(k.latest),
            ]
        })
        .collect();
    print_table(&["KIND", "RESOURCES", "POINTS", "EARLIEST", "LATEST"], rows);
    Ok(())
}
