//! In-process producer
//!
//! Wraps a [`RowSource`], validates each row, folds it into the stream's
//! schema and frames it. Also owns the producer-side checkpoint when the
//! source does not persist its own position.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{
    checkpoint_value, CheckpointMode, CheckpointStore, ContractError, FieldType, KeyProperties,
    Record, RowSource,
};
use framing::{Frame, Framer, SchemaTracker};
use observability::normalize;
use serde_json::Value;
use tracing::{debug, error};

/// Validating, schema-tracking wrapper around a [`RowSource`]
pub struct Tap {
    name: String,
    stream: String,
    key: KeyProperties,
    key_fields: Vec<String>,
    source: Box<dyn RowSource>,
    tracker: SchemaTracker,
    overrides: HashMap<String, FieldType>,
    framer: Framer,
    checkpoint: Option<(Arc<dyn CheckpointStore>, CheckpointMode)>,
    pending: Option<String>,
}

impl std::fmt::Debug for Tap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tap")
            .field("name", &self.name)
            .field("stream", &self.stream)
            .field("key", &self.key_fields)
            .finish_non_exhaustive()
    }
}

impl Tap {
    /// Tap named `name` requiring `key` on every row
    ///
    /// The stream name is the normalized `name`.
    ///
    /// # Errors
    /// `InvalidKeyProperties` when `key` is empty.
    pub fn new(
        name: impl Into<String>,
        key: impl Into<KeyProperties>,
        source: Box<dyn RowSource>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let key = key.into();
        let key_fields = key.fields()?;
        Ok(Self {
            stream: normalize(&name),
            name,
            key,
            key_fields,
            source,
            tracker: SchemaTracker::new(None),
            overrides: HashMap::new(),
            framer: Framer::default(),
            checkpoint: None,
            pending: None,
        })
    }

    /// Use `schema` verbatim; disables inference
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.tracker = SchemaTracker::new(Some(schema));
        self
    }

    pub fn with_framer(mut self, framer: Framer) -> Self {
        self.framer = framer;
        self
    }

    /// Persist the primary key of retrieved rows to `store`
    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>, mode: CheckpointMode) -> Self {
        self.checkpoint = Some((store, mode));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn key(&self) -> &KeyProperties {
        &self.key
    }

    /// Schema the next frame would carry
    pub fn schema(&self) -> Value {
        self.tracker.current(&self.overrides)
    }

    /// Next validated row, `None` at end of stream
    ///
    /// # Errors
    /// `InvalidRow` for non-object rows, `MissingKey` when a key field is absent.
    pub async fn next_record(&mut self) -> Result<Option<Record>, ContractError> {
        let Some(row) = self.source.emit().await? else {
            debug!(stream = %self.stream, "Source exhausted");
            return Ok(None);
        };

        let record = match row {
            Value::Object(record) => record,
            other => {
                error!(stream = %self.stream, row = %other, "Row is not an object");
                return Err(ContractError::invalid_row(&self.stream, &other));
            }
        };
        if let Some(missing) = self.key_fields.iter().find(|f| !record.contains_key(*f)) {
            error!(stream = %self.stream, key = %missing, "Row misses key field");
            return Err(ContractError::missing_key(&self.stream, missing));
        }

        self.track_position(&record).await?;
        Ok(Some(record))
    }

    /// Fold `record` into the schema and frame it
    ///
    /// `overrides` replace inferred field types from now on; fields the
    /// schema does not contain are ignored.
    pub fn frame(
        &mut self,
        record: Record,
        overrides: HashMap<String, FieldType>,
    ) -> Result<Vec<Frame>, ContractError> {
        self.overrides.extend(overrides);
        self.tracker.observe(&record);
        let schema = self.tracker.current(&self.overrides);
        self.framer.frame(&self.stream, record, schema, &self.key)
    }

    /// Next row, framed; `None` at end of stream
    pub async fn next_unit(&mut self) -> Result<Option<Vec<Frame>>, ContractError> {
        match self.next_record().await? {
            Some(record) => self.frame(record, HashMap::new()).map(Some),
            None => Ok(None),
        }
    }

    /// Persist the position held back under [`CheckpointMode::AfterDelivery`]
    pub async fn commit(&mut self) -> Result<(), ContractError> {
        let (Some((store, _)), Some(position)) = (&self.checkpoint, self.pending.take()) else {
            return Ok(());
        };
        store.push(&position).await
    }

    async fn track_position(&mut self, record: &Record) -> Result<(), ContractError> {
        let Some((store, mode)) = &self.checkpoint else {
            return Ok(());
        };
        let Some(position) = self.key.primary().and_then(|k| record.get(k)).map(checkpoint_value)
        else {
            return Ok(());
        };
        match mode {
            CheckpointMode::OnRetrieve => store.push(&position).await,
            CheckpointMode::AfterDelivery => {
                self.pending = Some(position);
                Ok(())
            }
        }
    }
}
