//! Record types flowing through the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A message pulled from one partition of the source log.
///
/// Owned by the partition reader until it is handed to the validator,
/// then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Source partition
    pub partition: i32,
    /// Position within the partition
    pub offset: i64,
    /// Undecoded message value
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(partition: i32, offset: i64, payload: Vec<u8>) -> Self {
        Self {
            partition,
            offset,
            payload,
        }
    }
}

/// A validated air-quality reading.
///
/// The primary key is `(city, timestamp)`. Pollutant columns are stored as
/// 32-bit floats to match the `FLOAT` columns of the reading table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReading {
    pub city: String,
    pub aqi: f32,
    pub pm25: f32,
    pub pm10: f32,
    pub o3: f32,
    pub no2: f32,
    pub so2: f32,
    /// Opaque to the pipeline; only meaningful as a key component.
    pub timestamp: String,
}

impl ParsedReading {
    /// Primary key of the stored row.
    pub fn key(&self) -> (&str, &str) {
        (&self.city, &self.timestamp)
    }
}

/// Readings handed to the sink in one call, plus the offsets they cover.
///
/// `covered_offsets` maps each partition to the highest offset whose
/// message has been accounted for by this batch, either as a reading or as
/// a rejected record. It may cover offsets even when `readings` is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub readings: Vec<ParsedReading>,
    pub covered_offsets: BTreeMap<i32, i64>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for a message at `offset` without adding a reading.
    pub fn cover(&mut self, partition: i32, offset: i64) {
        let entry = self.covered_offsets.entry(partition).or_insert(offset);
        if offset > *entry {
            *entry = offset;
        }
    }

    /// Add a reading that came from `partition` at `offset`.
    pub fn push(&mut self, partition: i32, offset: i64, reading: ParsedReading) {
        self.readings.push(reading);
        self.cover(partition, offset);
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Highest offset covered for `partition`, if any.
    pub fn covered_offset(&self, partition: i32) -> Option<i64> {
        self.covered_offsets.get(&partition).copied()
    }
}
