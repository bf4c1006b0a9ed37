//! Region queries against indexed output.

use lazybam::BamError;
use lazybam::header::{Header, Reference};
use lazybam::reader::{ChunkedReader, ReaderOptions};
use lazybam::region::OffsetSpan;
use lazybam::sort::ChunkMerger;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::*;

/// Sorted, indexed BAM with reads every 100 bp on both references.
fn indexed_bam(dir: &TempDir) -> std::path::PathBuf {
    let header = test_header();
    let mut records = Vec::new();
    for rid in 0..2 {
        for i in 0..50 {
            records.push(mapped_record(&format!("ref{rid}_{i:02}"), rid, i * 100));
        }
    }
    records.push(unmapped_record("unmapped"));
    records.reverse();
    let chunk = write_test_bam(dir.path(), "chunk.bam", &header, &records);

    let output = dir.path().join("indexed.bam");
    let stats = ChunkMerger::new(header).sort(true).merge(&[&chunk], &output).unwrap();
    assert!(stats.index_path.is_some());
    output
}

#[rstest]
// 1-based inclusive 1001-1500 covers 0-based [1000, 1500); 10 bp reads at 900 end at 910
#[case::middle("chr1:1001-1500", &["ref0_10", "ref0_11", "ref0_12", "ref0_13", "ref0_14"])]
#[case::overlap_read_end("chr2:910-1000", &["ref1_09"])]
#[case::open_end("chr2:4701", &["ref1_47", "ref1_48", "ref1_49"])]
#[case::past_reads("chr1:5001-6000", &[])]
fn test_region_returns_overlapping_records(#[case] region: &str, #[case] expected: &[&str]) {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    let options = ReaderOptions::default().with_chunk_size(2).with_region(region);
    let reader = ChunkedReader::from_indexed_path(&path, options).unwrap();
    let records: Vec<_> = reader.flat_map(Result::unwrap).collect();
    assert_eq!(names(&records), expected);
}

#[test]
fn test_whole_reference_region() {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    let options = ReaderOptions::default().with_region("chr1");
    let records: Vec<_> = ChunkedReader::from_indexed_path(&path, options)
        .unwrap()
        .flat_map(Result::unwrap)
        .collect();
    assert_eq!(records.len(), 50);
    assert!(records.iter().all(|r| r.reference_id() == 0));
    assert_coordinate_sorted(&records);
}

#[test]
fn test_unknown_reference_is_index_error() {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    let options = ReaderOptions::default().with_region("chrZ:1-100");
    let err = ChunkedReader::from_indexed_path(&path, options).err().unwrap();
    assert!(err.downcast_ref::<BamError>().is_some_and(BamError::is_index), "{err:#}");
}

#[test]
fn test_malformed_region_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    let options = ReaderOptions::default().with_region("chr1:500-100");
    let err = ChunkedReader::from_indexed_path(&path, options).err().unwrap();
    assert_format_error(&err);
}

#[test]
fn test_region_without_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    let options = ReaderOptions::default().with_region("chr1");
    let err = ChunkedReader::from_path(&path, options).err().unwrap();
    assert!(err.downcast_ref::<BamError>().is_some_and(BamError::is_validation), "{err:#}");
}

#[test]
fn test_custom_index_capability() {
    let dir = TempDir::new().unwrap();
    let path = indexed_bam(&dir);

    // an index that knows nothing returns no spans
    let empty = |_: usize, _: u32, _: u32| -> lazybam::Result<Vec<OffsetSpan>> { Ok(Vec::new()) };
    let reader = ChunkedReader::from_path(&path, ReaderOptions::default())
        .unwrap()
        .with_region("chr1:1-10000", &empty)
        .unwrap();
    assert_eq!(reader.flat_map(Result::unwrap).count(), 0);
}

#[test]
fn test_reference_name_containing_colon() {
    let dir = TempDir::new().unwrap();
    let header = Header::builder()
        .reference(Reference::new("chr1", 10_000))
        .reference(Reference::new("HLA-A*01:01", 3_000))
        .build()
        .unwrap();
    let records = [
        mapped_record("hla_far", 1, 2_000),
        mapped_record("chr1_read", 0, 10),
        mapped_record("hla_near", 1, 5),
    ];
    let chunk = write_test_bam(dir.path(), "chunk.bam", &header, &records);
    let output = dir.path().join("hla.bam");
    ChunkMerger::new(header).sort(true).merge(&[&chunk], &output).unwrap();

    let read = |region: &str| -> Vec<String> {
        let options = ReaderOptions::default().with_region(region);
        let records: Vec<_> = ChunkedReader::from_indexed_path(&output, options)
            .unwrap()
            .flat_map(Result::unwrap)
            .collect();
        names(&records)
    };
    assert_eq!(read("HLA-A*01:01"), vec!["hla_near", "hla_far"]);
    assert_eq!(read("HLA-A*01:01:1-100"), vec!["hla_near"]);
}
