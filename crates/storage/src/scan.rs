//! Lazy, snapshot-pinned scans over time-keyed collections.

use std::{collections::VecDeque, ops::Bound};

use sensordb_types::TimeRange;
use snafu::ResultExt;

use crate::{
    error::{Result, StorageSnafu},
    keys::encode_timestamp,
    tables::ReadCollection,
};

/// Decodes one `(key, value)` entry of `collection`.
pub(crate) type Decoder<T> = fn(collection: &str, key: &str, value: &[u8]) -> Result<T>;

/// Ascending iterator over the entries of a time-keyed collection that fall
/// into a half-open [`TimeRange`].
///
/// The scan holds one read snapshot for its whole lifetime: writes committed
/// after it was created are never observed, including after [`rewind`].
/// Entries are fetched from the snapshot in batches of the configured
/// `scan_batch_size`, so an abandoned scan never reads the full range.
///
/// [`rewind`]: TimeScan::rewind
pub struct TimeScan<T> {
    collection: String,
    table: Option<ReadCollection>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<usize>,
    batch_size: usize,
    decode: Decoder<T>,
    buffer: VecDeque<T>,
    cursor: Option<String>,
    yielded: usize,
    exhausted: bool,
}

impl<T> TimeScan<T> {
    /// Creates a scan; `table` is `None` for collections that do not exist.
    pub(crate) fn new(
        collection: String,
        table: Option<ReadCollection>,
        range: &TimeRange,
        limit: Option<usize>,
        batch_size: usize,
        decode: Decoder<T>,
    ) -> Result<Self> {
        let since = range.since.map(encode_timestamp).transpose()?;
        let until = range.until.map(encode_timestamp).transpose()?;
        let mut scan = Self {
            collection,
            table,
            since,
            until,
            limit,
            batch_size: batch_size.max(1),
            decode,
            buffer: VecDeque::new(),
            cursor: None,
            yielded: 0,
            exhausted: false,
        };
        scan.rewind();
        Ok(scan)
    }

    /// Name of the scanned collection.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Restarts the scan from the beginning of its range on the same snapshot.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.cursor = None;
        self.yielded = 0;
        let empty_range = matches!((&self.since, &self.until), (Some(s), Some(u)) if s >= u);
        self.exhausted = self.table.is_none() || empty_range || self.limit == Some(0);
    }

    fn remaining(&self) -> usize {
        self.limit.map_or(usize::MAX, |limit| limit.saturating_sub(self.yielded))
    }

    fn refill(&mut self) -> Result<()> {
        let Some(table) = &self.table else {
            self.exhausted = true;
            return Ok(());
        };
        let wanted = self.batch_size.min(self.remaining().saturating_sub(self.buffer.len()));
        if wanted == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let lower = match (&self.cursor, &self.since) {
            (Some(cursor), _) => Bound::Excluded(cursor.as_str()),
            (None, Some(since)) => Bound::Included(since.as_str()),
            (None, None) => Bound::Unbounded,
        };
        let upper = match &self.until {
            Some(until) => Bound::Excluded(until.as_str()),
            None => Bound::Unbounded,
        };

        let mut batch = Vec::with_capacity(wanted);
        let mut last_key = None;
        for result in table.range::<&str>((lower, upper)).context(StorageSnafu)? {
            let (key, value) = result.context(StorageSnafu)?;
            batch.push((self.decode)(&self.collection, key.value(), value.value())?);
            last_key = Some(key.value().to_string());
            if batch.len() == wanted {
                break;
            }
        }

        if batch.len() < wanted {
            self.exhausted = true;
        }
        if let Some(key) = last_key {
            self.cursor = Some(key);
        }
        self.buffer.extend(batch);
        Ok(())
    }
}

impl<T> Iterator for TimeScan<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining() == 0 {
            return None;
        }
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(e));
            }
        }
        let item = self.buffer.pop_front()?;
        self.yielded += 1;
        Some(Ok(item))
    }
}

impl<T> std::fmt::Debug for TimeScan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeScan")
            .field("collection", &self.collection)
            .field("since", &self.since)
            .field("until", &self.until)
            .field("limit", &self.limit)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}
