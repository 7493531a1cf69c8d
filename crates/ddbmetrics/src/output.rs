//! Output formatting for CLI commands.

use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use ddbmetrics_checkpoint::OperationStatus;

/// Human-readable byte count: `500 B`, `1.5 KB`, `2.0 MB`.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_optional_time(time: Option<DateTime<Utc>>) -> String {
    time.map(format_time).unwrap_or_else(|| "-".to_string())
}

pub fn format_percentage(value: f64) -> String {
    format!("{:.1}%", value)
}

pub fn status_color(status: OperationStatus) -> Color {
    match status {
        OperationStatus::Running => Color::Blue,
        OperationStatus::Paused => Color::Yellow,
        OperationStatus::Completed => Color::Green,
        OperationStatus::Failed => Color::Red,
    }
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    println!("{}", build_table(headers, rows));
}

/// Like [`print_table`], coloring the cell at `status_column` by status.
pub fn print_status_table(
    headers: &[&str],
    rows: Vec<(OperationStatus, Vec<String>)>,
    status_column: usize,
) {
    let mut table = new_table(headers);
    for (status, row) in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let cell = Cell::new(text);
                if i == status_column {
                    cell.fg(status_color(status))
                } else {
                    cell
                }
            })
            .collect();
        table.add_row(cells);
    }
    println!("{}", table);
}

pub fn build_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = new_table(headers);
    for row in rows {
        table.add_row(row);
    }
    table
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Key/value listing for single-record views.
pub fn print_fields(fields: &[(&str, String)]) {
    let width = fields.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in fields {
        println!("{:<width$}  {}", key, value, width = width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_time() {
        let t = Utc.with_ymd_and_hms(2024, 1, 3, 4, 5, 6).unwrap();
        assert_eq!(format_time(t), "2024-01-03 04:05:06 UTC");
        assert_eq!(format_optional_time(None), "-");
    }

    #[test]
    fn test_build_table_contains_rows() {
        let rendered = build_table(&["ID", "STATUS"], vec![vec!["op1".into(), "RUNNING".into()]])
            .to_string();
        assert!(rendered.contains("op1"));
        assert!(rendered.contains("STATUS"));
    }
}
