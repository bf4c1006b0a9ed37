//! Malformed inputs and rejected writes.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use lazybam::BamError;
use lazybam::header::{Header, Reference};
use lazybam::reader::{ChunkedReader, ReaderOptions};
use lazybam::sort::ChunkMerger;
use lazybam::writer::{WriterOptions, encode_chunk, write_chunk};
use noodles::bgzf;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::*;

/// BGZF-compress `bytes` into a complete, well-formed BGZF file.
fn write_bgzf(path: &Path, bytes: &[u8]) {
    let mut writer = bgzf::Writer::new(File::create(path).unwrap());
    writer.write_all(bytes).unwrap();
    writer.finish().unwrap();
}

enum Cut {
    LastByte,
    InsideBody,
    InsidePrefix,
}

#[rstest]
#[case::last_byte(Cut::LastByte)]
#[case::inside_record_body(Cut::InsideBody)]
#[case::inside_length_prefix(Cut::InsidePrefix)]
fn test_truncated_record_is_format_error(#[case] cut: Cut) {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let records = numbered_records(3);
    let mut bytes = encode_chunk(&header, &records).unwrap();
    let last_len = encode_chunk(&header, &records[2..]).unwrap().len() - header.to_bytes().len();
    let keep = match cut {
        Cut::LastByte => bytes.len() - 1,
        Cut::InsideBody => bytes.len() - 5,
        Cut::InsidePrefix => bytes.len() - last_len + 2,
    };
    bytes.truncate(keep);
    let path = dir.path().join("truncated.bam");
    write_bgzf(&path, &bytes);

    let mut reader =
        ChunkedReader::from_path(&path, ReaderOptions::default().with_chunk_size(2)).unwrap();
    assert_eq!(reader.next_chunk().unwrap().len(), 2);
    let err = reader.next_chunk().unwrap_err();
    assert!(err.is_format(), "{err}");
    assert!(reader.is_closed());
}

#[test]
fn test_truncated_header_is_format_error() {
    let dir = TempDir::new().unwrap();
    let bytes = test_header().to_bytes();
    let path = dir.path().join("short_header.bam");
    write_bgzf(&path, &bytes[..bytes.len() - 3]);

    let err = ChunkedReader::from_path(&path, ReaderOptions::default()).err().unwrap();
    assert_format_error(&err);
}

#[rstest]
#[case::empty(b"")]
#[case::bad_magic(b"BAM\x02\x00\x00\x00\x00\x00\x00\x00\x00")]
#[case::sam_text(b"@HD\tVN:1.6\n")]
fn test_not_a_bam_is_format_error(#[case] bytes: &[u8]) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bogus.bam");
    write_bgzf(&path, bytes);

    let err = ChunkedReader::from_path(&path, ReaderOptions::default()).err().unwrap();
    assert_format_error(&err);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = ChunkedReader::from_path(dir.path().join("absent.bam"), ReaderOptions::default())
        .err()
        .unwrap();
    assert!(err.downcast_ref::<std::io::Error>().is_some(), "{err:#}");
}

#[test]
fn test_zero_chunk_size_is_rejected() {
    let bytes = encode_chunk(&test_header(), &[]).unwrap();
    let err = ChunkedReader::new(&bytes[..], ReaderOptions::default().with_chunk_size(0))
        .err()
        .unwrap();
    assert!(err.is_validation());
}

#[test]
fn test_invalid_record_write_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let one_reference = Header::builder().reference(Reference::new("chr1", 10_000)).build().unwrap();
    // reference 1 does not exist in a single-reference header
    let records = [mapped_record("ok", 0, 1), mapped_record("chr2_read", 1, 5)];

    let path = dir.path().join("out.bam");
    let err =
        write_chunk(&path, &one_reference, &records, WriterOptions::default()).unwrap_err();
    assert!(err.downcast_ref::<BamError>().is_some_and(BamError::is_validation), "{err:#}");
    assert!(!path.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_incompatible_chunk_headers_abort_before_output() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let renamed = Header::builder()
        .reference(Reference::new("chr1", 10_000))
        .reference(Reference::new("chrX", 10_000))
        .build()
        .unwrap();
    let a = write_test_bam(dir.path(), "a.bam", &header, &numbered_records(5));
    let b = write_test_bam(dir.path(), "b.bam", &renamed, &[mapped_record("x", 1, 0)]);

    let output = dir.path().join("merged.bam");
    let err = ChunkMerger::new(header).sort(true).merge(&[&a, &b], &output).unwrap_err();
    assert_format_error(&err);
    assert!(!output.exists());
    assert!(!dir.path().join("merged.bam.bai").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn test_truncated_merge_input_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let good = write_test_bam(dir.path(), "good.bam", &header, &numbered_records(5));
    let mut bytes = encode_chunk(&header, &numbered_records(5)).unwrap();
    bytes.truncate(bytes.len() - 7);
    let bad = dir.path().join("bad.bam");
    write_bgzf(&bad, &bytes);

    let output = dir.path().join("merged.bam");
    let err = ChunkMerger::new(header).sort(true).merge(&[&good, &bad], &output).unwrap_err();
    assert_format_error(&err);
    assert!(!output.exists());
}
