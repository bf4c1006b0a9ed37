//! Builders for test headers, records, and chunk files.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use lazybam::header::{Header, Reference, SortOrder};
use lazybam::reader::{ChunkedReader, ReaderOptions};
use lazybam::record::{Record, flags};
use lazybam::record_buf::RecordBuf;
use lazybam::writer::{WriterOptions, write_chunk};

/// Two 10 kb references, `chr1` and `chr2`.
pub fn test_header() -> Header {
    Header::builder()
        .reference(Reference::new("chr1", 10_000))
        .reference(Reference::new("chr2", 10_000))
        .build()
        .expect("valid test header")
}

/// [`test_header`] declaring `SO:coordinate`.
pub fn sorted_header() -> Header {
    test_header().with_sort_order(SortOrder::Coordinate).expect("valid sort order")
}

/// A 10M mapped read at a 0-based position.
pub fn mapped_record(name: &str, reference_id: i32, start: i32) -> Record {
    let mut buf = RecordBuf::new();
    buf.set_name(name)
        .set_reference_id(reference_id)
        .set_alignment_start(start)
        .set_mapping_quality(60)
        .set_cigar([(0, 10)])
        .set_sequence("ACGTACGTAC")
        .set_quality([30u8; 10])
        .push_tag("RG", "A");
    buf.to_record().expect("valid mapped record")
}

/// An unplaced, unmapped read.
pub fn unmapped_record(name: &str) -> Record {
    let mut buf = RecordBuf::new();
    buf.set_name(name).set_flags(flags::UNMAPPED).set_sequence("NNNN").set_quality([2u8; 4]);
    buf.to_record().expect("valid unmapped record")
}

/// `count` mapped reads named `r0000`, `r0001`, ... spread over both references.
pub fn numbered_records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| mapped_record(&format!("r{i:04}"), (i % 2) as i32, ((i * 37) % 9_000) as i32))
        .collect()
}

/// Write `records` to `dir/name` with no index.
pub fn write_test_bam(dir: &Path, name: &str, header: &Header, records: &[Record]) -> PathBuf {
    let path = dir.join(name);
    write_chunk(&path, header, records, WriterOptions::default()).expect("write test BAM");
    path
}

/// Every record in the BAM at `path`, with its header.
pub fn read_bam(path: &Path) -> (Header, Vec<Record>) {
    let mut reader =
        ChunkedReader::from_path(path, ReaderOptions::default()).expect("open test BAM");
    let header = reader.header().as_ref().clone();
    let mut records = Vec::new();
    for chunk in reader.by_ref() {
        records.extend(chunk.expect("read chunk"));
    }
    (header, records)
}

/// Record names in order.
pub fn names(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.name().to_string()).collect()
}
