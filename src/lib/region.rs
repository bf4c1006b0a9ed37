//! Genomic region strings and the index capability used to seek to them.
//!
//! Regions are written `name`, `name:start`, or `name:start-end` with 1-based inclusive
//! coordinates (thousands separators are accepted). Internally they resolve to a reference ID
//! and a 0-based half-open interval.

use std::fmt;
use std::str::FromStr;

use noodles::bam::bai;
use noodles::core::Position;
use noodles::core::region::Interval;
use noodles::csi::BinningIndex;

use crate::errors::{BamError, Result};
use crate::header::Header;

/// A parsed, unresolved region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    name: String,
    start: Option<u32>,
    end: Option<u32>,
}

impl Region {
    /// Reference name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based inclusive start, if given.
    #[must_use]
    pub fn start(&self) -> Option<u32> {
        self.start
    }

    /// 1-based inclusive end, if given.
    #[must_use]
    pub fn end(&self) -> Option<u32> {
        self.end
    }

    /// Parse `text` against `header` and resolve it.
    ///
    /// A string that names a reference exactly covers the whole reference, even when it
    /// contains a colon (`HLA-A*01:01`). Anything else is parsed as `name[:start[-end]]`.
    pub fn resolve_str(text: &str, header: &Header) -> Result<ResolvedRegion> {
        if header.reference_id(text).is_some() {
            let whole = Self { name: text.to_string(), start: None, end: None };
            return whole.resolve(header);
        }
        text.parse::<Self>()?.resolve(header)
    }

    /// Resolve the reference name against `header`.
    pub fn resolve(&self, header: &Header) -> Result<ResolvedRegion> {
        let reference_id = header
            .reference_id(&self.name)
            .ok_or_else(|| BamError::index(format!("unknown reference '{}' in region", self.name)))?;
        let length = header.references()[reference_id as usize].length();
        let start = self.start.map_or(0, |s| s - 1);
        let end = self.end.unwrap_or(length).max(start);
        Ok(ResolvedRegion { reference_id: reference_id as usize, start, end })
    }
}

impl FromStr for Region {
    type Err = BamError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |why: &str| BamError::format(format!("malformed region '{s}': {why}"));

        let (name, range) = match s.rsplit_once(':') {
            Some((name, range)) => (name, Some(range)),
            None => (s, None),
        };
        if name.is_empty() {
            return Err(malformed("missing reference name"));
        }

        let parse_coord = |text: &str| -> Result<u32> {
            let digits: String = text.chars().filter(|&c| c != ',').collect();
            match digits.parse::<u32>() {
                Ok(0) => Err(malformed("coordinates are 1-based")),
                Ok(n) => Ok(n),
                Err(_) => Err(malformed("expected a positive integer coordinate")),
            }
        };

        let (start, end) = match range {
            None => (None, None),
            Some("") => return Err(malformed("empty range")),
            Some(range) => match range.split_once('-') {
                None => (Some(parse_coord(range)?), None),
                Some((start, "")) => (Some(parse_coord(start)?), None),
                Some((start, end)) => {
                    let (start, end) = (parse_coord(start)?, parse_coord(end)?);
                    if end < start {
                        return Err(malformed("end precedes start"));
                    }
                    (Some(start), Some(end))
                }
            },
        };

        Ok(Self { name: name.to_string(), start, end })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        match (self.start, self.end) {
            (Some(start), Some(end)) => write!(f, ":{start}-{end}"),
            (Some(start), None) => write!(f, ":{start}"),
            _ => Ok(()),
        }
    }
}

/// A region bound to a reference ID, as a 0-based half-open interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRegion {
    pub reference_id: usize,
    pub start: u32,
    pub end: u32,
}

impl ResolvedRegion {
    /// Whether a record on `reference_id` covering `[start, end)` overlaps this region.
    #[must_use]
    pub fn overlaps(&self, reference_id: i32, start: i32, end: i32) -> bool {
        reference_id >= 0
            && reference_id as usize == self.reference_id
            && i64::from(start) < i64::from(self.end)
            && i64::from(end) > i64::from(self.start)
    }
}

/// A range of logical stream offsets (`start` inclusive, `end` exclusive).
///
/// For BGZF sources these are virtual positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OffsetSpan {
    pub start: u64,
    pub end: u64,
}

impl OffsetSpan {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

/// Sort spans and merge the ones that overlap or touch.
#[must_use]
pub fn merge_spans(mut spans: Vec<OffsetSpan>) -> Vec<OffsetSpan> {
    spans.sort_unstable();
    let mut merged: Vec<OffsetSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Maps a reference interval to the stream offsets that may hold overlapping records.
pub trait RegionIndex {
    /// Offsets for records overlapping `[start, end)` (0-based) on `reference_id`.
    fn query(&self, reference_id: usize, start: u32, end: u32) -> Result<Vec<OffsetSpan>>;
}

impl<F> RegionIndex for F
where
    F: Fn(usize, u32, u32) -> Result<Vec<OffsetSpan>>,
{
    fn query(&self, reference_id: usize, start: u32, end: u32) -> Result<Vec<OffsetSpan>> {
        self(reference_id, start, end)
    }
}

impl RegionIndex for bai::Index {
    fn query(&self, reference_id: usize, start: u32, end: u32) -> Result<Vec<OffsetSpan>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let position = |n: u32| {
            Position::try_from(n as usize)
                .map_err(|e| BamError::index(format!("invalid region coordinate {n}: {e}")))
        };
        let interval = Interval::from(position(start + 1)?..=position(end)?);
        let chunks = BinningIndex::query(self, reference_id, interval)
            .map_err(|e| BamError::index(format!("index query for reference {reference_id} failed: {e}")))?;
        Ok(chunks
            .into_iter()
            .map(|chunk| OffsetSpan::new(u64::from(chunk.start()), u64::from(chunk.end())))
            .collect())
    }
}
