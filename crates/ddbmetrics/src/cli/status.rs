//! `ddbmetrics status <id>`

use anyhow::{bail, Result};
use ddbmetrics::output::{format_optional_time, format_percentage, format_time, print_fields};
use ddbmetrics::AppConfig;
use ddbmetrics_collector::CollectionStatus;

use super::open_checkpoints;

pub fn run(id: &str, json: bool, config: &AppConfig) -> Result<()> {
    let store = open_checkpoints(config)?;
    let Some(state) = store.load(id)? else {
        bail!("No readable checkpoint for operation '{}'", id);
    };
    let status = CollectionStatus::from(&state);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let mut fields = vec![
        ("Operation", status.operation_id.clone()),
        ("Status", status.status.to_string()),
        ("Progress", format_percentage(status.completion_percentage)),
        (
            "Resources",
            format!(
                "{} done of {} ({} failed)",
                status.completed_operations, status.total_operations, status.failed_collections
            ),
        ),
        ("Started", format_time(status.start_time)),
        ("Last checkpoint", format_time(status.last_checkpoint_time)),
        ("ETA", format_optional_time(status.estimated_completion)),
    ];
    if let Some(message) = &status.error_message {
        fields.push(("Message", message.clone()));
    }
    print_fields(&fields);
    Ok(())
}
