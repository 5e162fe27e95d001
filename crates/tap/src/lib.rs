//! # Tap
//!
//! Producer side of a pipeline.
//!
//! - [`Producer`]: an external command emitting framed lines, or an in-process [`Tap`]
//! - [`Tap`]: validates rows from a [`contracts::RowSource`] and frames them
//! - Sources: [`JsonLinesSource`], [`PagedSource`] over a [`PageFetcher`]
//! - Checkpoints: [`MemoryCheckpoint`], [`FileCheckpoint`]

pub mod checkpoint;
mod jsonl;
pub mod paged;
pub mod retry;
mod tap;

pub use checkpoint::{FileCheckpoint, MemoryCheckpoint};
pub use jsonl::JsonLinesSource;
pub use paged::{PageFetcher, PagedSource};
pub use retry::RetryPolicy;
pub use tap::Tap;

/// Where rows come from
#[derive(Debug)]
pub enum Producer {
    /// External program writing framed protocol lines to stdout
    Command(String),
    /// In-process source
    Source(Tap),
}

impl Producer {
    /// Identifying name, before normalization
    pub fn name(&self) -> &str {
        match self {
            Self::Command(command) => command,
            Self::Source(tap) => tap.name(),
        }
    }
}

impl From<Tap> for Producer {
    fn from(tap: Tap) -> Self {
        Self::Source(tap)
    }
}
