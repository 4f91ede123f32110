//! Minimal comma-separated table used by the csv and analysis tools.
//!
//! Price files produced by the market tools are plain comma-separated
//! numbers with a single header row and no quoting.

use std::path::Path;

use obscurex_core::{ToolError, ToolResult};

#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
        let headers = split(lines.next()?);
        let rows = lines.map(split).collect();
        Some(Self { headers, rows })
    }

    /// Read a table; a missing file or one without a header is an error.
    pub async fn read(path: &Path) -> ToolResult<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::execution(format!(
                    "File not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&contents)
            .ok_or_else(|| ToolError::execution(format!("File is empty: {}", path.display())))
    }

    pub async fn write(&self, path: &Path) -> ToolResult<()> {
        tokio::fs::write(path, self.render()).await?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = self.headers.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Parse a column as numbers, skipping cells that are not numeric.
    pub fn numeric_column(&self, name: &str) -> ToolResult<Vec<f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| ToolError::execution(format!("Column '{name}' not found")))?;
        Ok(self
            .rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .collect())
    }

    pub fn push_column(&mut self, name: &str, values: impl IntoIterator<Item = String>) {
        self.headers.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    pub fn remove_column(&mut self, index: usize) {
        self.headers.remove(index);
        for row in &mut self.rows {
            if row.len() > index {
                row.remove(index);
            }
        }
    }
}

fn split(line: &str) -> Vec<String> {
    line.trim().split(',').map(|c| c.trim().to_string()).collect()
}
