#![deny(unsafe_code)]
// Clippy lint configuration for CI
// - cast_*: BAM fields are fixed-width integers converted between signed and unsigned forms
// - missing_*_doc: Documentation improvements tracked separately
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value,
    clippy::items_after_statements,
    clippy::match_same_arms,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

//! # lazybam - chunked BAM record engine
//!
//! Read BAM files in fixed-size batches of decoded records, build and modify records, write
//! them back out as BGZF chunk files, and merge chunk files into a single coordinate-sorted,
//! indexed BAM.
//!
//! ## Overview
//!
//! ### Data model
//!
//! - **[`header`]** - the BAM header: SAM text plus the binary reference dictionary
//! - **[`record`]** - decoded alignment records and the binary record codec
//! - **[`record_buf`]** - a mutable, validated record builder and field overrides
//!
//! ### I/O
//!
//! - **[`reader`]** - batched record reading, with optional indexed region queries
//! - **[`region`]** - region strings and the index capability behind them
//! - **[`writer`]** - atomic BGZF chunk writing with optional BAI generation
//! - **[`sort`]** - merge, coordinate sort, and index chunk files
//!
//! ### Utilities
//!
//! - **[`errors`]** - the typed error shared by every module
//! - **[`progress`]** - periodic progress logging
//! - **[`logging`]** - formatting helpers for log output
//!
//! ## Quick Start
//!
//! ```no_run
//! use lazybam::header::{Header, Reference};
//! use lazybam::reader::{ChunkedReader, ReaderOptions};
//! use lazybam::record_buf::RecordBuf;
//! use lazybam::sort::ChunkMerger;
//! use lazybam::writer::{WriterOptions, write_chunk};
//!
//! # fn main() -> anyhow::Result<()> {
//! let header = Header::builder().reference(Reference::new("chr1", 248_956_422)).build()?;
//!
//! let mut buf = RecordBuf::new();
//! buf.set_name("read1")
//!     .set_reference_id(0)
//!     .set_alignment_start(999)
//!     .set_cigar([(0, 4)])
//!     .set_sequence("ACGT")
//!     .set_quality([30u8, 30, 30, 30]);
//! write_chunk("chunk_0.bam", &header, &[buf.to_record()?], WriterOptions::default())?;
//!
//! ChunkMerger::new(header).sort(true).merge(&["chunk_0.bam"], "sorted.bam".as_ref())?;
//!
//! for chunk in ChunkedReader::from_path("sorted.bam", ReaderOptions::default())? {
//!     for record in chunk? {
//!         println!("{} {}", record.name(), record.alignment_start());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod header;
pub mod logging;
pub mod progress;
pub mod reader;
pub mod record;
pub mod record_buf;
pub mod region;
pub mod sort;
pub mod writer;

pub use errors::{BamError, Result};
pub use header::Header;
pub use reader::{ChunkedReader, ReaderOptions};
pub use record::Record;
pub use record_buf::{RecordBuf, RecordOverride};
pub use sort::{ChunkMerger, MergeStats, merge_chunks};
pub use writer::{ChunkWriter, WriterOptions, write_chunk};
