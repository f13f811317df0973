// render: Listing output for the operator shell.
//
// Deliberately minimal: an aligned plain-text table or raw JSON, enough to
// inspect the registry without pulling in a presentation framework.

use clap::ValueEnum;
use dr_protocol::ControllerRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Render controller records in the requested format.
pub fn render_controllers(records: &[ControllerRecord], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(records),
        OutputFormat::Json => {
            serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_owned())
        }
    }
}

const HEADERS: [&str; 5] = ["Uid", "Name", "Created", "Modified", "Client ID"];

fn row(record: &ControllerRecord) -> [String; 5] {
    [
        record.controller_uid.clone(),
        record.name.clone(),
        record.created.clone().unwrap_or_default(),
        record.modified.clone().unwrap_or_default(),
        record.client_id.clone(),
    ]
}

fn render_table(records: &[ControllerRecord]) -> String {
    let rows: Vec<[String; 5]> = records.iter().map(row).collect();

    let mut widths: [usize; 5] = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[&str]| {
        let line = cells
            .iter()
            .zip(widths.iter().copied())
            .map(|(cell, width)| format!("{cell:width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_row(&HEADERS);
    let separators: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&separators.iter().map(String::as_str).collect::<Vec<_>>());
    for row in &rows {
        push_row(&row.iter().map(String::as_str).collect::<Vec<_>>());
    }
    out
}
