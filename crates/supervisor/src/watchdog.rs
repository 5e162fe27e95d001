//! Stderr watchdog
//!
//! Reads a process's stderr until EOF, logging each line at debug level.
//! Once stderr closes, the collected text is scanned for crash signatures and,
//! on a match, the process is marked [`ProcessState::Crashed`] and a
//! [`CrashEvent`] is sent to the owner.

use contracts::ContractError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::{ProcessState, StateCell};

/// Lines kept in a crash excerpt
const EXCERPT_LINES: usize = 20;

/// Recognised crash markers in stderr text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashSignature {
    /// An interpreter traceback header
    Traceback,
    /// A chained exception report
    ChainedException,
}

impl CrashSignature {
    /// Classify stderr text
    pub fn classify(text: &str) -> Option<Self> {
        if text.contains("Traceback ") {
            return Some(Self::Traceback);
        }
        if text
            .to_lowercase()
            .contains("during handling of the above exception")
        {
            return Some(Self::ChainedException);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Traceback => "traceback",
            Self::ChainedException => "chained_exception",
        }
    }
}

impl std::fmt::Display for CrashSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A crash detected by a watchdog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashEvent {
    pub process: String,
    pub signature: CrashSignature,
    pub stderr: String,
}

impl CrashEvent {
    /// Tail of the captured stderr
    pub fn excerpt(&self) -> String {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines.len().saturating_sub(EXCERPT_LINES);
        lines[start..].join("\n")
    }

    pub fn into_error(self) -> ContractError {
        ContractError::SinkCrash {
            excerpt: self.excerpt(),
            process: self.process,
            signature: self.signature.to_string(),
        }
    }
}

/// Watch `reader` until EOF
///
/// Returns the signature found, if any. Read errors end the watch early and
/// classify whatever was collected up to that point.
pub async fn watch_stderr<R>(
    reader: R,
    process: String,
    state: StateCell,
    crashes: mpsc::UnboundedSender<CrashEvent>,
) -> Option<CrashSignature>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut collected = String::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                debug!(process = %process, line = %text.trim_end(), "stderr");
                collected.push_str(&text);
            }
            Err(e) => {
                warn!(process = %process, error = %e, "stderr read failed");
                break;
            }
        }
    }

    let signature = CrashSignature::classify(&collected)?;
    state.advance(ProcessState::Crashed);
    warn!(process = %process, signature = %signature, "Crash signature on stderr");

    let event = CrashEvent {
        process,
        signature,
        stderr: collected,
    };
    if crashes.send(event).is_err() {
        debug!("crash receiver dropped");
    }
    Some(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_classify() {
        assert_eq!(
            CrashSignature::classify("Traceback (most recent call last):\n  File \"x\""),
            Some(CrashSignature::Traceback)
        );
        assert_eq!(
            CrashSignature::classify("During handling of the above exception, another"),
            Some(CrashSignature::ChainedException)
        );
        assert_eq!(CrashSignature::classify("warning: slow disk\n"), None);
        assert_eq!(CrashSignature::classify("Traceback"), None);
    }

    #[test]
    fn test_excerpt_keeps_tail() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let event = CrashEvent {
            process: "p".into(),
            signature: CrashSignature::Traceback,
            stderr,
        };
        let excerpt = event.excerpt();
        assert!(excerpt.starts_with("line 10"));
        assert!(excerpt.ends_with("line 29"));
    }

    #[tokio::test]
    async fn test_watch_reports_crash() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = StateCell::new();
        state.advance(ProcessState::Ready);

        let task = tokio::spawn(watch_stderr(reader, "sink".into(), state.clone(), tx));
        writer
            .write_all(b"Traceback (most recent call last):\nValueError: boom\n")
            .await
            .unwrap();
        drop(writer);

        assert_eq!(task.await.unwrap(), Some(CrashSignature::Traceback));
        assert_eq!(state.get(), ProcessState::Crashed);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.process, "sink");
        assert!(event.stderr.contains("ValueError: boom"));
    }

    #[tokio::test]
    async fn test_watch_ignores_plain_stderr() {
        let (mut writer, reader) = tokio::io::duplex(256);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = StateCell::new();

        let task = tokio::spawn(watch_stderr(reader, "sink".into(), state.clone(), tx));
        writer.write_all(b"INFO starting\n").await.unwrap();
        drop(writer);

        assert_eq!(task.await.unwrap(), None);
        assert_eq!(state.get(), ProcessState::Spawned);
        assert!(rx.recv().await.is_none());
    }
}
