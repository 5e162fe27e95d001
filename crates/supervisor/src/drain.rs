//! Bounded, non-blocking reads of process output

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::timeout;

/// Outcome of one drain attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drained {
    /// A complete line, without its terminator
    Line(String),
    /// Nothing complete arrived in time
    Empty,
    /// The stream reached EOF
    Closed,
}

/// Read at most one line from `reader`, waiting no longer than `wait`
///
/// Bytes of an incomplete line stay in `pending` and are completed by a later
/// call, so a timeout never loses output.
pub async fn drain_line<R>(
    reader: &mut R,
    pending: &mut Vec<u8>,
    wait: Duration,
) -> std::io::Result<Drained>
where
    R: AsyncBufRead + Unpin,
{
    match timeout(wait, reader.read_until(b'\n', pending)).await {
        Err(_) => Ok(Drained::Empty),
        Ok(Ok(0)) if pending.is_empty() => Ok(Drained::Closed),
        Ok(Ok(_)) => Ok(Drained::Line(take_line(pending))),
        Ok(Err(e)) => Err(e),
    }
}

/// Read one full line, waiting as long as it takes
pub async fn read_line<R>(reader: &mut R, pending: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match reader.read_until(b'\n', pending).await? {
        0 if pending.is_empty() => Ok(None),
        _ => Ok(Some(take_line(pending))),
    }
}

fn take_line(pending: &mut Vec<u8>) -> String {
    let bytes = std::mem::take(pending);
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
