//! LogSink - logs every received line via tracing

use async_trait::async_trait;
use contracts::{ContractError, DataSink};
use tracing::{info, instrument};

/// Sink that logs the framed lines it receives
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_write", skip(self, lines), fields(sink = %self.name))]
    async fn write(&mut self, lines: &[String]) -> Result<String, ContractError> {
        for line in lines {
            info!(sink = %self.name, line = %line.trim_end(), "Line received");
        }
        Ok(String::new())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let ack = sink.write(&["{\"type\":\"STATE\",\"value\":1}\n".to_string()]).await;
        assert_eq!(ack.unwrap(), "");
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
