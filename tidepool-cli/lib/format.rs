//! Plain-text rendering of sandboxes for the terminal.

use chrono::{DateTime, Utc};
use tidepool_core::models::SandboxInfo;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The number of id characters shown in tables.
const SHORT_ID_LEN: usize = 12;

/// The separator between table columns.
const COLUMN_GAP: &str = "  ";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Renders a single sandbox as aligned `key: value` lines.
pub fn show_sandbox(info: &SandboxInfo) -> String {
    let mut rows = vec![
        vec!["Name:".to_string(), info.name.clone()],
        vec!["ID:".to_string(), info.id.clone()],
        vec!["Port:".to_string(), info.port.to_string()],
    ];

    if let Some(hostname) = &info.hostname {
        rows.push(vec!["Hostname:".to_string(), hostname.clone()]);
    }

    rows.push(vec!["Deadline:".to_string(), format_deadline(&info.deadline)]);
    render(&rows)
}

/// Renders sandboxes as a table with a header row.
///
/// The hostname column only appears when at least one sandbox has a hostname.
pub fn list_sandboxes(infos: &[SandboxInfo]) -> String {
    let with_hostname = infos.iter().any(|info| info.hostname.is_some());

    let mut header = vec!["NAME", "ID", "PORT"];
    if with_hostname {
        header.push("HOSTNAME");
    }
    header.push("DEADLINE");

    let mut rows = vec![header.into_iter().map(String::from).collect::<Vec<_>>()];
    for info in infos {
        let mut row = vec![
            info.name.clone(),
            short_id(&info.id).to_string(),
            info.port.to_string(),
        ];
        if with_hostname {
            row.push(info.hostname.clone().unwrap_or_default());
        }
        row.push(format_deadline(&info.deadline));
        rows.push(row);
    }

    render(&rows)
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(end, _)| &id[..end])
}

fn format_deadline(deadline: &DateTime<Utc>) -> String {
    deadline.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Left-aligns every column to its widest cell. The last column is not padded.
fn render(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|column| {
            rows.iter()
                .filter_map(|row| row.get(column))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    for row in rows {
        let mut line = String::new();
        for (column, cell) in row.iter().enumerate() {
            if column > 0 {
                line.push_str(COLUMN_GAP);
            }
            line.push_str(cell);
            if column + 1 < row.len() {
                let padding = widths[column] - cell.chars().count();
                line.extend(std::iter::repeat(' ').take(padding));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
