//! BGZF chunk writer.
//!
//! Output is written to a temporary file next to the destination and renamed into place by
//! [`ChunkWriter::finish`], so a reader never observes a partial chunk. Dropping an unfinished
//! writer removes the temporary file.
//!
//! With [`WriterOptions::write_index`], the BGZF virtual position before and after every record
//! is fed to a binning indexer and a `<path>.bai` is written alongside the BAM. Indexed output
//! must be coordinate-sorted.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::core::Position;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use noodles::csi::binning_index::index::reference_sequence::index::LinearIndex;
use noodles::csi::binning_index::Indexer;
use tempfile::NamedTempFile;

use crate::errors::{BamError, Result};
use crate::header::Header;
use crate::reader::index_path_for;
use crate::record::{encode_record, Record};
use crate::record_buf::RecordBuf;

/// Writer configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterOptions {
    /// Build a BAI index while writing. Records must arrive in coordinate order.
    pub write_index: bool,
}

impl WriterOptions {
    #[must_use]
    pub fn write_index(mut self, enabled: bool) -> Self {
        self.write_index = enabled;
        self
    }
}

/// What a finished writer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSummary {
    pub path: PathBuf,
    pub index_path: Option<PathBuf>,
    pub records: u64,
}

/// Writes one BAM file: header, records in call order, then the BGZF EOF marker.
pub struct ChunkWriter {
    path: PathBuf,
    header: Header,
    inner: bgzf::Writer<NamedTempFile>,
    indexer: Option<Indexer<LinearIndex>>,
    last_position: Option<(u32, i32)>,
    buf: Vec<u8>,
    records: u64,
}

impl ChunkWriter {
    /// Start writing to a temporary file in the directory of `path`.
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: &Header,
        options: WriterOptions,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = output_dir(&path);
        let file = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in: {}", dir.display()))?;

        let mut inner = bgzf::Writer::new(file);
        inner
            .write_all(&header.to_bytes())
            .with_context(|| format!("Failed to write header for: {}", path.display()))?;
        debug!("Writing BAM {} (index: {})", path.display(), options.write_index);

        Ok(Self {
            path,
            header: header.clone(),
            inner,
            indexer: options.write_index.then(Indexer::default),
            last_position: None,
            buf: Vec::new(),
            records: 0,
        })
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written so far.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Encode and append a record. A record that fails validation leaves the output untouched.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        self.buf.clear();
        encode_record(&mut self.buf, &self.header, record)?;

        if self.indexer.is_some() {
            // unplaced records sort last
            let position = (record.reference_id() as u32, record.alignment_start());
            if self.last_position.is_some_and(|last| position < last) {
                return Err(BamError::validation(format!(
                    "cannot index record '{}': records must be coordinate-sorted",
                    record.name()
                )));
            }
            self.last_position = Some(position);
        }

        let start = self.inner.virtual_position();
        self.inner.write_all(&self.buf)?;
        let end = self.inner.virtual_position();

        if let Some(indexer) = &mut self.indexer {
            indexer
                .add_record(alignment_context(record), Chunk::new(start, end))
                .map_err(|e| {
                    BamError::validation(format!("cannot index record '{}': {e}", record.name()))
                })?;
        }
        self.records += 1;
        Ok(())
    }

    /// Validate, convert, and append a record buffer.
    pub fn write_record_buf(&mut self, buf: &RecordBuf) -> Result<()> {
        self.write_record(&buf.to_record()?)
    }

    /// Write the EOF marker and move the file (and index) into place.
    ///
    /// The index is fully written to a temporary file before the BAM is moved into place. If
    /// the index cannot be moved after the BAM, the BAM is removed again, so a requested index
    /// never goes missing next to its output.
    pub fn finish(self) -> anyhow::Result<ChunkSummary> {
        let Self { path, header, inner, indexer, records, .. } = self;

        let file = inner
            .finish()
            .with_context(|| format!("Failed to finish BGZF stream for: {}", path.display()))?;

        let index = match indexer {
            Some(indexer) => {
                let index = indexer.build(header.references().len());
                let index_path = index_path_for(&path);
                let index_file = write_bai_temp(&index_path, &index)?;
                Some((index_path, index_file))
            }
            None => None,
        };

        file.persist(&path)
            .with_context(|| format!("Failed to move output into place: {}", path.display()))?;

        let index_path = match index {
            Some((index_path, index_file)) => {
                if let Err(e) = index_file.persist(&index_path) {
                    let _ = std::fs::remove_file(&path);
                    return Err(anyhow::Error::new(e).context(format!(
                        "Failed to move index into place: {}",
                        index_path.display()
                    )));
                }
                Some(index_path)
            }
            None => None,
        };

        debug!("Wrote {records} records to {}", path.display());
        Ok(ChunkSummary { path, index_path, records })
    }
}

/// The indexer's view of a record: `(reference, start, end, is_mapped)`, 1-based inclusive.
///
/// Unplaced records are binned separately and carry no context.
fn alignment_context(record: &Record) -> Option<(usize, Position, Position, bool)> {
    let reference_id = usize::try_from(record.reference_id()).ok()?;
    let end = record.alignment_end()?;
    let start = Position::try_from(record.alignment_start() as usize + 1).ok()?;
    let end = Position::try_from(end as usize).ok()?;
    Some((reference_id, start, end, !record.is_unmapped()))
}

/// Write `index` to a temporary file next to `path`, ready to be persisted there.
fn write_bai_temp(path: &Path, index: &bai::Index) -> anyhow::Result<NamedTempFile> {
    let dir = output_dir(path);
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in: {}", dir.display()))?;
    bai::io::Writer::new(&mut file)
        .write_index(index)
        .with_context(|| format!("Failed to write index to: {}", path.display()))?;
    Ok(file)
}

fn output_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Write `records` to a new BAM at `path`.
///
/// The first invalid record aborts the write with a validation error, and nothing is left at
/// `path`.
pub fn write_chunk<P: AsRef<Path>>(
    path: P,
    header: &Header,
    records: &[Record],
    options: WriterOptions,
) -> anyhow::Result<ChunkSummary> {
    let path = path.as_ref();
    let mut writer = ChunkWriter::create(path, header, options)?;
    for (i, record) in records.iter().enumerate() {
        writer
            .write_record(record)
            .with_context(|| format!("Failed to write record {i} to: {}", path.display()))?;
    }
    writer.finish()
}

/// The uncompressed BAM stream (header then records) for `records`.
pub fn encode_chunk(header: &Header, records: &[Record]) -> Result<Vec<u8>> {
    let mut out = header.to_bytes();
    for record in records {
        encode_record(&mut out, header, record)?;
    }
    Ok(out)
}
