//! Merge chunk files into one BAM, optionally coordinate-sorting and indexing the result.
//!
//! Sorting is a classic external merge sort:
//!
//! 1. **Run generation**: every input is read into a buffer until the memory limit is reached;
//!    the buffer is stably sorted and spilled to a temporary BAM. An input's `SO` tag is not
//!    trusted, since chunks are commonly written under their source file's sorted header.
//! 2. **Merge**: a min-heap holding one record per run produces the output in global order.
//!
//! Ties on coordinate are broken by input index, run index, and position within the run, so
//! records at the same position come out in the order they were supplied.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use log::{debug, info};
use noodles::bgzf;
use rayon::prelude::*;
use tempfile::TempDir;

use super::keys::{CoordinateKey, MergeKey};
use crate::errors::BamError;
use crate::header::{Header, SortOrder};
use crate::logging::log_merge_summary;
use crate::progress::ProgressTracker;
use crate::reader::{ChunkedReader, ReaderOptions};
use crate::record::Record;
use crate::record::codec::estimate_record_size;
use crate::writer::{ChunkWriter, WriterOptions, write_chunk};

/// Default memory limit for run generation (512 MiB).
pub const DEFAULT_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

type FileReader = ChunkedReader<bgzf::Reader<File>>;

/// Merges BAM chunk files that share a reference dictionary.
#[derive(Debug, Clone)]
pub struct ChunkMerger {
    header: Header,
    sort: bool,
    /// `None` follows `sort`.
    write_index: Option<bool>,
    memory_limit: usize,
    temp_dir: Option<PathBuf>,
    threads: usize,
    program: Option<Vec<(String, String)>>,
}

impl ChunkMerger {
    /// A merger producing output with `header`. Every input must carry the same references.
    #[must_use]
    pub fn new(header: Header) -> Self {
        Self {
            header,
            sort: false,
            write_index: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            temp_dir: None,
            threads: 1,
            program: None,
        }
    }

    /// Coordinate-sort the output. Off by default, which concatenates inputs in order.
    #[must_use]
    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Write `<output>.bai`. Defaults to whatever [`ChunkMerger::sort`] is set to.
    #[must_use]
    pub fn write_index(mut self, enabled: bool) -> Self {
        self.write_index = Some(enabled);
        self
    }

    /// Approximate bytes of records held in memory per run.
    #[must_use]
    pub fn memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Directory for spilled runs. Defaults to the system temp dir.
    #[must_use]
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    /// Threads used to sort each run. Zero is treated as one.
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Add an `@PG` line with these fields to the output header. `ID` is required.
    #[must_use]
    pub fn program<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.program = Some(fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    fn indexing(&self) -> bool {
        self.write_index.unwrap_or(self.sort)
    }

    /// Merge `inputs` into `output`.
    ///
    /// All input headers are checked before anything is written; a reference dictionary that
    /// differs from the target header is a [`BamError::Format`] and leaves no output behind.
    pub fn merge<P: AsRef<Path>>(&self, inputs: &[P], output: &Path) -> Result<MergeStats> {
        let start = Instant::now();
        info!(
            "Merging {} inputs into {} (sort: {}, index: {})",
            inputs.len(),
            output.display(),
            self.sort,
            self.indexing()
        );

        let readers = self.open_inputs(inputs)?;
        let header = self.output_header()?;
        let options = WriterOptions::default().write_index(self.indexing());
        let mut writer = ChunkWriter::create(output, &header, options)?;
        let progress = ProgressTracker::new("Merged records").with_interval(1_000_000);

        let runs = if self.sort {
            let temp_dir = self.create_temp_dir()?;
            let runs = self.generate_runs(readers, &temp_dir)?;
            info!("Phase 2: Merging {} runs...", runs.len());
            let count = runs.len();
            merge_runs(runs, &mut writer, &progress)?;
            count
        } else {
            let count = readers.len();
            for input in readers {
                copy_input(input, &mut writer, &progress)?;
            }
            count
        };

        progress.log_final();
        let summary = writer.finish()?;
        let stats = MergeStats {
            inputs: inputs.len(),
            runs,
            records: summary.records,
            index_path: summary.index_path,
        };
        log_merge_summary(&stats, start.elapsed());
        Ok(stats)
    }

    fn open_inputs<P: AsRef<Path>>(&self, inputs: &[P]) -> Result<Vec<Input>> {
        let mut opened = Vec::with_capacity(inputs.len());
        for (index, path) in inputs.iter().enumerate() {
            let path = path.as_ref().to_path_buf();
            let reader = ChunkedReader::from_path(&path, ReaderOptions::default())?;
            if !reader.header().is_compatible_with(&self.header) {
                return Err(BamError::format(format!(
                    "incompatible header in {}: reference dictionary differs from the merge header",
                    path.display()
                ))
                .into());
            }
            debug!("Input {index}: {}", path.display());
            opened.push(Input { index, path, reader });
        }
        Ok(opened)
    }

    fn output_header(&self) -> Result<Header> {
        let mut header = self.header.clone();
        if let Some(fields) = &self.program {
            let fields: Vec<(&str, &str)> =
                fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            header = header.add_program(&fields).context("Failed to add @PG line")?;
        }
        if self.sort {
            header = header.with_sort_order(SortOrder::Coordinate)?;
        }
        Ok(header)
    }

    fn create_temp_dir(&self) -> Result<TempDir> {
        match &self.temp_dir {
            Some(base) => {
                std::fs::create_dir_all(base).with_context(|| {
                    format!("Failed to create temp directory: {}", base.display())
                })?;
                TempDir::new_in(base).context("Failed to create temp directory")
            }
            None => TempDir::new().context("Failed to create temp directory"),
        }
    }

    fn generate_runs(&self, inputs: Vec<Input>, temp_dir: &TempDir) -> Result<Vec<Run>> {
        info!("Phase 1: Generating sorted runs...");
        let pool = if self.threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.threads)
                    .build()
                    .context("Failed to build sort thread pool")?,
            )
        } else {
            None
        };

        let mut runs = Vec::new();
        for input in inputs {
            let Input { index, path, mut reader } = input;
            let mut buffer = Vec::new();
            let mut used = 0usize;
            let mut run_index = 0;
            loop {
                let record = reader
                    .next_record()
                    .with_context(|| format!("Failed to read record from: {}", path.display()))?;
                if let Some(record) = &record {
                    used += estimate_record_size(record);
                }
                let done = record.is_none();
                buffer.extend(record);

                if !buffer.is_empty() && (done || used >= self.memory_limit) {
                    sort_buffer(&mut buffer, pool.as_ref());
                    let run_path = temp_dir.path().join(format!("run_{index}_{run_index}.bam"));
                    write_chunk(&run_path, &self.header, &buffer, WriterOptions::default())?;
                    buffer.clear();
                    let run_reader = ChunkedReader::from_path(&run_path, ReaderOptions::default())?;
                    runs.push(Run::new(run_reader, run_path, index, run_index));
                    run_index += 1;
                    used = 0;
                }
                if done {
                    break;
                }
            }
            debug!("Input {index}: {run_index} runs from {} records", reader.records_read());
        }
        Ok(runs)
    }
}

/// Counts from a finished merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Input files merged.
    pub inputs: usize,
    /// Sorted runs merged, or inputs concatenated when not sorting.
    pub runs: usize,
    /// Records written.
    pub records: u64,
    /// The `.bai` written next to the output, if any.
    pub index_path: Option<PathBuf>,
}

struct Input {
    index: usize,
    path: PathBuf,
    reader: FileReader,
}

/// A coordinate-sorted stream of records.
struct Run {
    reader: FileReader,
    path: PathBuf,
    input: usize,
    run: usize,
    next_record: u64,
}

impl Run {
    fn new(reader: FileReader, path: PathBuf, input: usize, run: usize) -> Self {
        Self { reader, path, input, run, next_record: 0 }
    }

    fn next_entry(&mut self, slot: usize) -> Result<Option<HeapEntry>> {
        let Some(record) = self
            .reader
            .next_record()
            .with_context(|| format!("Failed to read record from: {}", self.path.display()))?
        else {
            return Ok(None);
        };

        let coordinate = CoordinateKey::from_record(&record);
        let key = MergeKey::new(coordinate, self.input, self.run, self.next_record);
        self.next_record += 1;
        Ok(Some(HeapEntry { key, record, slot }))
    }
}

/// Entry in the merge heap.
struct HeapEntry {
    key: MergeKey,
    record: Record,
    slot: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

fn sort_buffer(buffer: &mut [Record], pool: Option<&rayon::ThreadPool>) {
    match pool {
        Some(pool) => pool.install(|| buffer.par_sort_by_key(CoordinateKey::from_record)),
        None => buffer.sort_by_key(CoordinateKey::from_record),
    }
}

/// K-way merge holding at most one record per run.
fn merge_runs(mut runs: Vec<Run>, writer: &mut ChunkWriter, progress: &ProgressTracker) -> Result<()> {
    let mut heap = BinaryHeap::with_capacity(runs.len());
    for (slot, run) in runs.iter_mut().enumerate() {
        if let Some(entry) = run.next_entry(slot)? {
            heap.push(Reverse(entry));
        }
    }

    while let Some(Reverse(entry)) = heap.pop() {
        writer
            .write_record(&entry.record)
            .with_context(|| format!("Failed to write record to: {}", writer.path().display()))?;
        progress.log_if_needed(1);
        if let Some(next) = runs[entry.slot].next_entry(entry.slot)? {
            heap.push(Reverse(next));
        }
    }
    Ok(())
}

fn copy_input(mut input: Input, writer: &mut ChunkWriter, progress: &ProgressTracker) -> Result<()> {
    while let Some(record) = input
        .reader
        .next_record()
        .with_context(|| format!("Failed to read record from: {}", input.path.display()))?
    {
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write record to: {}", writer.path().display()))?;
        progress.log_if_needed(1);
    }
    Ok(())
}

/// Merge `inputs` into `output` under the header serialized in `header_bytes`.
///
/// `header_bytes` is the binary BAM header as produced by [`Header::to_bytes`]. When `sort` is
/// set the output is coordinate-sorted and indexed.
pub fn merge_chunks<P: AsRef<Path>>(
    header_bytes: &[u8],
    inputs: &[P],
    output: &Path,
    sort: bool,
) -> Result<MergeStats> {
    let header = Header::parse(header_bytes).context("Failed to parse merge header")?;
    ChunkMerger::new(header).sort(sort).merge(inputs, output)
}
