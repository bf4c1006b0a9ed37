//! Sort keys for coordinate merging.
//!
//! [`CoordinateKey`] orders records by reference ID then 0-based start, with unplaced records
//! (`reference_id == -1`) after every placed one. It deliberately has no tie-breaker: a stable
//! sort over it keeps records with equal coordinates in arrival order.
//!
//! [`MergeKey`] adds provenance (input index, run index, record index within the run) so the
//! k-way merge is stable across inputs as well.

use std::cmp::Ordering;

use crate::record::Record;

/// Reference ID and start position; unplaced records sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordinateKey {
    /// Reference ID, or `u32::MAX` for unplaced records.
    pub tid: u32,
    /// 0-based alignment start.
    pub pos: i32,
}

impl CoordinateKey {
    #[must_use]
    pub fn new(reference_id: i32, alignment_start: i32) -> Self {
        let tid = u32::try_from(reference_id).unwrap_or(u32::MAX);
        Self { tid, pos: alignment_start }
    }

    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self::new(record.reference_id(), record.alignment_start())
    }

    /// Whether the record has no reference.
    #[must_use]
    pub fn is_unplaced(&self) -> bool {
        self.tid == u32::MAX
    }
}

impl Ord for CoordinateKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tid.cmp(&other.tid).then_with(|| self.pos.cmp(&other.pos))
    }
}

impl PartialOrd for CoordinateKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Coordinate plus provenance; unique for every record in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergeKey {
    pub coordinate: CoordinateKey,
    pub input: usize,
    pub run: usize,
    pub record: u64,
}

impl MergeKey {
    #[must_use]
    pub fn new(coordinate: CoordinateKey, input: usize, run: usize, record: u64) -> Self {
        Self { coordinate, input, run, record }
    }
}
