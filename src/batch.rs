//! Size-bounded batching of matched records in front of a [`RecordSink`]

use crate::error::StoreError;
use crate::record::LogRecord;
use crate::store::RecordSink;
use std::sync::Arc;

/// Buffers records and writes them to the sink in batches
///
/// Owned by exactly one monitor. A batch is handed to the sink once it
/// reaches `batch_size`; the buffer is always empty afterwards, even when the
/// write fails (failed batches are dropped, not retried).
pub struct BatchAccumulator {
    sink: Arc<dyn RecordSink>,
    batch_size: usize,
    batch: Vec<LogRecord>,
}

impl BatchAccumulator {
    pub fn new(sink: Arc<dyn RecordSink>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            batch: Vec::with_capacity(batch_size),
        }
    }

    /// Append a record, flushing synchronously when the batch is full.
    ///
    /// Returns the number of records written (zero when nothing was flushed).
    pub async fn add(&mut self, record: LogRecord) -> Result<usize, StoreError> {
        self.batch.push(record);

        if self.batch.len() >= self.batch_size {
            return self.flush().await;
        }
        Ok(0)
    }

    /// Flush whatever is buffered at end of stream
    ///
    /// With nothing buffered no sink write happens.
    pub async fn flush_remainder(&mut self) -> Result<usize, StoreError> {
        self.flush().await
    }

    /// Flush a partial batch on a timer tick
    pub async fn flush_pending(&mut self) -> Result<usize, StoreError> {
        self.flush().await
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn flush(&mut self) -> Result<usize, StoreError> {
        if self.batch.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let count = batch.len();
        let start = std::time::Instant::now();

        self.sink.insert_batch(&batch).await?;

        tracing::debug!(
            count = count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Flushed record batch"
        );
        Ok(count)
    }
}
