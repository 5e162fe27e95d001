//! FileSink - appends every framed line to a file

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use contracts::{ContractError, DataSink};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Sink that appends lines to a file and acknowledges with the line count
pub struct FileSink {
    name: String,
    path: PathBuf,
    file: File,
    lines_written: u64,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn open(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        Ok(Self {
            name: name.into(),
            path,
            file,
            lines_written: 0,
        })
    }

    /// Create from params map (for factory); requires `path`
    pub async fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let path = params.get("path").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing 'path' param")
        })?;
        Self::open(name, path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

#[async_trait]
impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_write", skip(self, lines), fields(sink = %self.name))]
    async fn write(&mut self, lines: &[String]) -> Result<String, ContractError> {
        for line in lines {
            self.file
                .write_all(line.as_bytes())
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        self.lines_written += lines.len() as u64;
        Ok(lines.len().to_string())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.file
            .flush()
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.file
            .sync_all()
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, lines = self.lines_written, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/dump.jsonl");
        let mut sink = FileSink::open("dump", &path).await.unwrap();

        let ack = sink
            .write(&["{\"a\":1}\n".to_string(), "{\"b\":2}\n".to_string()])
            .await
            .unwrap();
        assert_eq!(ack, "2");
        sink.write(&["{\"c\":3}\n".to_string()]).await.unwrap();
        sink.flush().await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"b\":2}\n{\"c\":3}\n");
        assert_eq!(sink.lines_written(), 3);
    }

    #[tokio::test]
    async fn test_file_sink_requires_path_param() {
        let err = FileSink::from_params("dump", &HashMap::new()).await.err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }
}
