//! Human-readable rendering for MCP tool outputs.
//!
//! Tools return structured JSON by default. When a caller asks for `table`
//! or `markdown`, each output builds one or more [`TextTable`]s and the
//! rendered text is attached in a `formatted` field.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

/// Output format requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
}

/// Rows of text cells under fixed headers.
#[derive(Debug, Clone)]
pub struct TextTable {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new(headers: &[&'static str]) -> Self {
        Self {
            headers: headers.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing cells render empty; extra cells are dropped.
    pub fn push(&mut self, mut cells: Vec<String>) {
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_ascii(&self) -> String {
        if self.rows.is_empty() {
            return "Empty set\n".to_string();
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.width()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }

        let separator: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+\n";

        let mut output = String::new();
        output.push_str(&separator);
        let header: String = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("| {} ", pad(h, *w)))
            .collect::<String>()
            + "|\n";
        output.push_str(&header);
        output.push_str(&separator);

        for row in &self.rows {
            let line: String = row
                .iter()
                .zip(&widths)
                .map(|(cell, w)| format!("| {} ", pad(cell, *w)))
                .collect::<String>()
                + "|\n";
            output.push_str(&line);
        }
        output.push_str(&separator);

        let noun = if self.rows.len() == 1 { "row" } else { "rows" };
        output.push_str(&format!("{} {} in set\n", self.rows.len(), noun));
        output
    }

    pub fn to_markdown(&self) -> String {
        if self.rows.is_empty() {
            return "*Empty set*\n".to_string();
        }

        let mut output = String::new();
        let header: String = self
            .headers
            .iter()
            .map(|h| format!("| {h} "))
            .collect::<String>()
            + "|\n";
        output.push_str(&header);
        output.push_str(&(self.headers.iter().map(|_| "|---").collect::<String>() + "|\n"));

        for row in &self.rows {
            let line: String = row
                .iter()
                .map(|cell| format!("| {} ", escape_markdown(cell)))
                .collect::<String>()
                + "|\n";
            output.push_str(&line);
        }
        output
    }
}

/// Render titled sections in the requested format; `None` for JSON.
pub fn render(format: OutputFormat, title: &str, sections: &[(&str, &TextTable)]) -> Option<String> {
    match format {
        OutputFormat::Json => None,
        OutputFormat::Table => {
            let mut output = format!("{title}\n\n");
            for (heading, table) in sections {
                output.push_str(&format!("{heading}\n"));
                output.push_str(&table.to_ascii());
                output.push('\n');
            }
            Some(output.trim_end().to_string())
        }
        OutputFormat::Markdown => {
            let mut output = format!("# {title}\n\n");
            for (heading, table) in sections {
                output.push_str(&format!("## {heading}\n\n"));
                output.push_str(&table.to_markdown());
                output.push('\n');
            }
            Some(output.trim_end().to_string())
        }
    }
}

/// Cell text for an optional value.
pub fn cell(value: Option<impl ToString>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn yes_no(flag: bool) -> String {
    if flag { "YES" } else { "NO" }.to_string()
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TextTable {
        let mut table = TextTable::new(&["name", "type"]);
        table.push(vec!["id".into(), "int".into()]);
        table.push(vec!["名前".into()]);
        table
    }

    #[test]
    fn test_ascii_pads_by_display_width() {
        let text = sample().to_ascii();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+------+------+");
        assert_eq!(lines[1], "| name | type |");
        assert_eq!(lines[4], "| 名前 |      |");
        assert!(text.ends_with("2 rows in set\n"));
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let mut table = TextTable::new(&["default"]);
        table.push(vec!["a|b".into()]);
        let text = table.to_markdown();
        assert!(text.contains("| a\\|b |"));
        assert!(text.starts_with("| default |\n|---|\n"));
    }

    #[test]
    fn test_render_json_is_none() {
        let table = sample();
        assert!(render(OutputFormat::Json, "t", &[("cols", &table)]).is_none());
        let md = render(OutputFormat::Markdown, "Orders", &[("Columns", &table)]).unwrap();
        assert!(md.starts_with("# Orders\n\n## Columns\n\n| name | type |"));
    }

    #[test]
    fn test_empty_table() {
        let table = TextTable::new(&["a"]);
        assert!(table.is_empty());
        assert_eq!(table.to_ascii(), "Empty set\n");
        assert_eq!(table.to_markdown(), "*Empty set*\n");
    }

    #[test]
    fn test_format_deserializes_lowercase() {
        let f: OutputFormat = serde_json::from_str("\"markdown\"").unwrap();
        assert_eq!(f, OutputFormat::Markdown);
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }
}
