//! The outcome of a single executed statement, plus its tabular text
//! rendering for REPL/CLI display.

use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum ResultSet {
    CreateTable,
    DropTable,
    Insert { count: usize },
    Update { count: usize },
    Delete { count: usize },
    Scan { cols: Vec<String>, rows: Vec<Vec<Value>> },
    Explain { text: String },
    ShowTable { text: String },
    ShowDatabase { text: String },
    Begin { version: u64 },
    Commit { version: u64 },
    Rollback { version: u64 },
    Error { msg: String },
}

impl std::fmt::Display for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultSet::CreateTable => write!(f, "CREATE TABLE"),
            ResultSet::DropTable => write!(f, "DROP TABLE"),
            ResultSet::Insert { count } => write!(f, "INSERT {}", count),
            ResultSet::Update { count } => write!(f, "UPDATE {}", count),
            ResultSet::Delete { count } => write!(f, "DELETE {}", count),
            ResultSet::Scan { cols, rows } => write!(f, "{}", render_table(cols, rows)),
            ResultSet::Explain { text } => write!(f, "{}", text),
            ResultSet::ShowTable { text } => write!(f, "{}", text),
            ResultSet::ShowDatabase { text } => write!(f, "{}", text),
            ResultSet::Begin { version } => write!(f, "BEGIN {}", version),
            ResultSet::Commit { version } => write!(f, "COMMIT {}", version),
            ResultSet::Rollback { version } => write!(f, "ROLLBACK {}", version),
            ResultSet::Error { msg } => write!(f, "ERROR: {}", msg),
        }
    }
}

/// Per-column max width over header + cells; header joined by `" |"`, a
/// `-`-rule separator joined by `"+"`, one left-aligned row per tuple, then
/// a `(N rows)` footer.
fn render_table(cols: &[String], rows: &[Vec<Value>]) -> String {
    let cells: Vec<Vec<String>> =
        rows.iter().map(|row| row.iter().map(|v| v.to_display_string()).collect()).collect();

    let mut widths: Vec<usize> = cols.iter().map(|c| c.len()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let pad = |text: &str, width: usize| format!("{:<width$}", text, width = width);

    let header = cols
        .iter()
        .enumerate()
        .map(|(i, c)| pad(c, widths[i]))
        .collect::<Vec<_>>()
        .join(" |");
    let separator = widths.iter().map(|w| "-".repeat(w + 1)).collect::<Vec<_>>().join("+");

    let mut out = String::new();
    out.push_str(&header);
    out.push('\n');
    out.push_str(&separator);
    for row in &cells {
        out.push('\n');
        let line =
            row.iter().enumerate().map(|(i, c)| pad(c, widths[i])).collect::<Vec<_>>().join(" |");
        out.push_str(&line);
    }
    out.push('\n');
    out.push_str(&format!("({} rows)", rows.len()));
    out
}
