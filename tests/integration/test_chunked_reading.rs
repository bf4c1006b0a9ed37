//! Batched reading of chunk files.

use lazybam::reader::{ChunkedReader, ReaderOptions};
use lazybam::writer::encode_chunk;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::*;

#[rstest]
#[case::even(100, 10)]
#[case::remainder(101, 10)]
#[case::one_batch(7, 1_000)]
#[case::single_record_batches(5, 1)]
#[case::empty(0, 3)]
fn test_batch_count_is_ceiling_of_records_over_chunk_size(
    #[case] records: usize,
    #[case] chunk_size: usize,
) {
    let dir = TempDir::new().unwrap();
    let input = numbered_records(records);
    let path = write_test_bam(dir.path(), "in.bam", &test_header(), &input);

    let reader =
        ChunkedReader::from_path(&path, ReaderOptions::default().with_chunk_size(chunk_size))
            .unwrap();
    let batches: Vec<_> = reader.map(Result::unwrap).collect();

    assert_eq!(batches.len(), records.div_ceil(chunk_size));
    assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= chunk_size));
    let read: Vec<_> = batches.into_iter().flatten().collect();
    assert_eq!(read, input);
}

#[test]
fn test_exhausted_reader_keeps_returning_empty_batches() {
    let dir = TempDir::new().unwrap();
    let path = write_test_bam(dir.path(), "in.bam", &test_header(), &numbered_records(3));

    let mut reader = ChunkedReader::from_path(&path, ReaderOptions::default()).unwrap();
    assert_eq!(reader.next_chunk().unwrap().len(), 3);
    assert!(reader.next_chunk().unwrap().is_empty());
    assert!(reader.is_exhausted());
    assert!(reader.next_chunk().unwrap().is_empty());
    assert_eq!(reader.records_read(), 3);
}

#[test]
fn test_closed_reader_yields_nothing() {
    let dir = TempDir::new().unwrap();
    let path = write_test_bam(dir.path(), "in.bam", &test_header(), &numbered_records(10));

    let mut reader =
        ChunkedReader::from_path(&path, ReaderOptions::default().with_chunk_size(4)).unwrap();
    assert_eq!(reader.next_chunk().unwrap().len(), 4);
    reader.close();
    reader.close();
    assert!(reader.is_closed());
    assert!(reader.next_chunk().unwrap().is_empty());
}

#[test]
fn test_in_memory_stream_matches_file() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let records = numbered_records(25);
    let path = write_test_bam(dir.path(), "in.bam", &header, &records);

    let bytes = encode_chunk(&header, &records).unwrap();
    let from_memory: Vec<_> = ChunkedReader::new(&bytes[..], ReaderOptions::default())
        .unwrap()
        .flat_map(Result::unwrap)
        .collect();
    let (file_header, from_file) = read_bam(&path);

    assert_eq!(file_header, header);
    assert_eq!(from_memory, from_file);
}

#[test]
fn test_records_survive_override_and_rewrite() {
    use lazybam::record::{Tag, Value};
    use lazybam::record_buf::RecordOverride;

    let dir = TempDir::new().unwrap();
    let header = test_header();
    let path = write_test_bam(dir.path(), "in.bam", &header, &numbered_records(4));
    let (_, records) = read_bam(&path);

    let mut ov = RecordOverride::new().with_tag("XS", 7);
    ov.mapping_quality = Some(10);
    let modified: Vec<_> = records.iter().map(|r| r.apply_override(&ov).unwrap()).collect();
    let out = write_test_bam(dir.path(), "out.bam", &header, &modified);

    let (_, reread) = read_bam(&out);
    assert_eq!(reread, modified);
    assert!(reread.iter().all(|r| r.mapping_quality() == 10));
    let xs = Tag::try_from("XS").unwrap();
    assert!(reread.iter().all(|r| r.data().get(xs).and_then(Value::as_int) == Some(7)));
    assert_eq!(names(&reread), names(&records));
}
