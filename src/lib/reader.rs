//! Chunked streaming reader.
//!
//! A [`ChunkedReader`] parses the header when it is created and then hands out records in
//! batches of at most `chunk_size`. The reader moves from open to exhausted when the stream
//! ends, or to closed when [`ChunkedReader::close`] is called or a read fails; either way the
//! underlying source is dropped right away.
//!
//! # Example
//!
//! ```no_run
//! use lazybam::reader::{ChunkedReader, ReaderOptions};
//!
//! let mut reader = ChunkedReader::from_path("input.bam", ReaderOptions::default())?;
//! for batch in &mut reader {
//!     for record in batch? {
//!         println!("{}", record.name());
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use log::debug;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::bgzf::VirtualPosition;

use crate::errors::{BamError, Result};
use crate::header::Header;
use crate::record::{read_record, Record};
use crate::region::{merge_spans, OffsetSpan, Region, RegionIndex, ResolvedRegion};

/// Default number of records per batch.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A decompressed BAM byte stream, optionally able to report and seek logical offsets.
///
/// Offsets are whatever the source's index speaks: BGZF virtual positions for compressed files,
/// plain byte offsets for in-memory streams.
pub trait BamSource: Read {
    /// Logical offset of the next byte, if the source tracks one.
    fn tell(&mut self) -> Option<u64> {
        None
    }

    /// Move to a logical offset previously reported by `tell` or an index.
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let _ = offset;
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support seeking"))
    }
}

impl<T: AsRef<[u8]>> BamSource for io::Cursor<T> {
    fn tell(&mut self) -> Option<u64> {
        Some(self.position())
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.set_position(offset);
        Ok(())
    }
}

impl<R: Read + Seek> BamSource for bgzf::Reader<R> {
    fn tell(&mut self) -> Option<u64> {
        Some(u64::from(self.virtual_position()))
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(VirtualPosition::from(offset)).map(|_| ())
    }
}

impl BamSource for &[u8] {}

/// Reader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Maximum records per batch. Must be positive.
    pub chunk_size: usize,
    /// Region to restrict reading to; requires an index.
    pub region: Option<String>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, region: None }
    }
}

impl ReaderOptions {
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

enum State<S> {
    Open(S),
    Exhausted,
    Closed,
}

/// Pending index spans for a region query.
struct RegionCursor {
    region: ResolvedRegion,
    spans: VecDeque<OffsetSpan>,
    current: Option<OffsetSpan>,
}

/// Reads records from a BAM stream in fixed-size batches.
pub struct ChunkedReader<S> {
    header: Arc<Header>,
    chunk_size: usize,
    state: State<S>,
    region: Option<RegionCursor>,
    buf: Vec<u8>,
    records_read: u64,
}

impl<S: BamSource> ChunkedReader<S> {
    /// Parse the header from `source` and open the reader.
    ///
    /// `options.region` is rejected here since resolving it needs an index; use
    /// [`ChunkedReader::with_region`] or [`ChunkedReader::from_indexed_path`].
    pub fn new(mut source: S, options: ReaderOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(BamError::validation("chunk_size must be greater than 0"));
        }
        if let Some(region) = &options.region {
            return Err(BamError::validation(format!(
                "region '{region}' requires an index; use with_region or from_indexed_path"
            )));
        }
        let header = Header::read_from(&mut source)?;
        debug!(
            "Opened BAM stream: {} references, chunk size {}",
            header.references().len(),
            options.chunk_size
        );
        Ok(Self {
            header: Arc::new(header),
            chunk_size: options.chunk_size,
            state: State::Open(source),
            region: None,
            buf: Vec::new(),
            records_read: 0,
        })
    }

    /// Restrict reading to `region`, using `index` to find the stream offsets to visit.
    ///
    /// Malformed region strings are format errors; unknown reference names are index errors.
    pub fn with_region(mut self, region: &str, index: &dyn RegionIndex) -> Result<Self> {
        let resolved = Region::resolve_str(region, &self.header)?;
        let source = match &mut self.state {
            State::Open(source) => source,
            _ => return Err(BamError::validation("reader is no longer open")),
        };
        if source.tell().is_none() {
            return Err(BamError::validation("region queries need a seekable source"));
        }
        let spans = merge_spans(index.query(resolved.reference_id, resolved.start, resolved.end)?);
        debug!("Region {region}: {} offset spans", spans.len());
        self.region =
            Some(RegionCursor { region: resolved, spans: spans.into(), current: None });
        Ok(self)
    }

    /// The parsed header, shared with anything derived from this reader.
    #[must_use]
    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Records returned so far.
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Up to `chunk_size` records; an empty batch means the stream is exhausted.
    pub fn next_chunk(&mut self) -> Result<Vec<Record>> {
        let mut chunk = Vec::with_capacity(self.chunk_size);
        while chunk.len() < self.chunk_size {
            match self.next_record()? {
                Some(record) => chunk.push(record),
                None => break,
            }
        }
        Ok(chunk)
    }

    /// The next record, or `None` once exhausted or closed.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        match self.advance() {
            Ok(Some(record)) => {
                self.records_read += 1;
                Ok(Some(record))
            }
            Ok(None) => {
                if let State::Open(_) = self.state {
                    debug!("BAM stream exhausted after {} records", self.records_read);
                    self.state = State::Exhausted;
                }
                Ok(None)
            }
            Err(e) => {
                self.state = State::Closed;
                Err(e)
            }
        }
    }

    /// Release the source. Calling this again has no effect.
    pub fn close(&mut self) {
        if let State::Open(_) = self.state {
            debug!("Closing BAM reader after {} records", self.records_read);
        }
        self.state = State::Closed;
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        let State::Open(source) = &mut self.state else {
            return Ok(None);
        };

        let Some(cursor) = &mut self.region else {
            return read_record(source, &mut self.buf);
        };

        loop {
            let span = match cursor.current {
                Some(span) => span,
                None => match cursor.spans.pop_front() {
                    Some(span) => {
                        source.seek_to(span.start)?;
                        cursor.current = Some(span);
                        span
                    }
                    None => return Ok(None),
                },
            };

            if source.tell().is_none_or(|pos| pos >= span.end) {
                cursor.current = None;
                continue;
            }

            let Some(record) = read_record(source, &mut self.buf)? else {
                cursor.current = None;
                cursor.spans.clear();
                return Ok(None);
            };

            let end = record.alignment_end().unwrap_or(record.alignment_start());
            let region = cursor.region;
            if region.overlaps(record.reference_id(), record.alignment_start(), end) {
                return Ok(Some(record));
            }
            // coordinate-sorted input: nothing later in this span can overlap
            let past_region = record.reference_id() as usize > region.reference_id
                || record.reference_id() < 0
                || (record.reference_id() as usize == region.reference_id
                    && i64::from(record.alignment_start()) >= i64::from(region.end));
            if past_region {
                cursor.current = None;
            }
        }
    }
}

impl ChunkedReader<bgzf::Reader<File>> {
    /// Open a BGZF-compressed BAM file.
    pub fn from_path<P: AsRef<Path>>(path: P, options: ReaderOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open input BAM: {}", path.display()))?;
        Self::new(bgzf::Reader::new(file), options)
            .with_context(|| format!("Failed to read header from: {}", path.display()))
    }

    /// Open a BGZF-compressed BAM file with its `<path>.bai` index, applying `options.region`
    /// if one is set.
    pub fn from_indexed_path<P: AsRef<Path>>(
        path: P,
        options: ReaderOptions,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let index_path = index_path_for(path);
        let index = bai::fs::read(&index_path)
            .with_context(|| format!("Failed to read index: {}", index_path.display()))?;

        let region = options.region.clone();
        let reader = Self::from_path(path, ReaderOptions { region: None, ..options })?;
        match region {
            Some(region) => reader
                .with_region(&region, &index)
                .with_context(|| format!("Failed to query region {region} in: {}", path.display())),
            None => Ok(reader),
        }
    }
}

impl<S: BamSource> Iterator for ChunkedReader<S> {
    type Item = Result<Vec<Record>>;

    /// Yields only non-empty batches; the first error ends iteration.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(chunk) if chunk.is_empty() => None,
            Ok(chunk) => Some(Ok(chunk)),
            Err(e) => Some(Err(e)),
        }
    }
}

/// `<path>.bai`
#[must_use]
pub fn index_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bai");
    PathBuf::from(name)
}
