//! JSON-lines file source: one row per line

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contracts::{checkpoint_value, ContractError, RowSource};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::debug;

/// Reads rows from a JSON-lines file until EOF
pub struct JsonLinesSource {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    resume: Option<(String, String)>,
}

impl JsonLinesSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await?;
        Ok(Self {
            path,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            resume: None,
        })
    }

    /// Skip rows whose `key` is not greater than `position`
    ///
    /// Values that both parse as numbers compare numerically, others as text.
    pub fn resume_after(mut self, key: impl Into<String>, position: impl Into<String>) -> Self {
        self.resume = Some((key.into(), position.into()));
        self
    }

    fn already_seen(&self, row: &Value) -> bool {
        let Some((key, position)) = &self.resume else {
            return false;
        };
        let Some(value) = row.get(key) else {
            return false;
        };
        compare_positions(&checkpoint_value(value), position) != Ordering::Greater
    }
}

fn compare_positions(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[async_trait]
impl RowSource for JsonLinesSource {
    async fn emit(&mut self) -> Result<Option<Value>, ContractError> {
        while let Some(line) = self.lines.next_line().await? {
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let row: Value = serde_json::from_str(&line).map_err(|e| {
                ContractError::Other(format!("{}:{}: {e}", self.path.display(), self.line_no))
            })?;
            if self.already_seen(&row) {
                debug!(line = self.line_no, "Skipping row at or before checkpoint");
                continue;
            }
            return Ok(Some(row));
        }
        Ok(None)
    }
}
