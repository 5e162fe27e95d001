//! Running producer: an external process or an in-process tap

use std::collections::HashMap;

use contracts::ContractError;
use framing::Frame;
use supervisor::{CrashEvent, SupervisedProcess};
use tap::{Producer, Tap};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DispatcherError;
use crate::transform::{Retyper, Transform, Transformed};

pub(crate) enum Upstream {
    Process(SupervisedProcess),
    Tap(Tap),
}

impl Upstream {
    pub(crate) fn start(
        producer: Producer,
        crashes: mpsc::UnboundedSender<CrashEvent>,
    ) -> Result<Self, DispatcherError> {
        Ok(match producer {
            Producer::Command(command) => Self::Process(SupervisedProcess::spawn(&command, crashes)?),
            Producer::Source(tap) => Self::Tap(tap),
        })
    }

    /// Next unit of frames, `None` at end of stream
    ///
    /// Units from a transformed external producer may be empty.
    pub(crate) async fn next_unit(
        &mut self,
        transform: Option<&Transform>,
        retyper: &mut Retyper,
    ) -> Result<Option<Vec<Frame>>, DispatcherError> {
        match self {
            Self::Tap(tap) => {
                let Some(record) = tap.next_record().await? else {
                    return Ok(None);
                };
                let Transformed { record, overrides } = match transform {
                    Some(transform) => transform(record)?,
                    None => Transformed {
                        record,
                        overrides: HashMap::new(),
                    },
                };
                Ok(Some(tap.frame(record, overrides)?))
            }
            Self::Process(process) => loop {
                let Some(line) = process.read_line().await? else {
                    return Ok(None);
                };
                if line.trim().is_empty() {
                    continue;
                }
                let frame = Frame::decode(&line)?;
                let frames = match transform {
                    Some(transform) => retyper.apply(frame, transform)?,
                    None => vec![frame],
                };
                return Ok(Some(frames));
            },
        }
    }

    /// Acknowledge the last unit as delivered everywhere
    pub(crate) async fn commit(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Tap(tap) => tap.commit().await,
            Self::Process(_) => Ok(()),
        }
    }

    pub(crate) async fn close(self) {
        if let Self::Process(process) = self {
            let name = process.name().to_string();
            match process.close().await {
                Ok(status) => debug!(producer = %name, ?status, "Producer exited"),
                Err(e) => warn!(producer = %name, error = %e, "Producer close failed"),
            }
        }
    }
}
