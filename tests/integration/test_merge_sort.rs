//! Merging chunk files, with and without coordinate sorting.

use lazybam::header::SortOrder;
use lazybam::reader::{ChunkedReader, ReaderOptions};
use lazybam::record::Record;
use lazybam::sort::{ChunkMerger, merge_chunks};
use noodles::bam::bai;
use noodles::csi::BinningIndex;
use proptest::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::*;

#[test]
fn test_three_record_sort_with_index() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let chunk = write_test_bam(
        dir.path(),
        "chunk.bam",
        &header,
        &[mapped_record("a", 0, 500), mapped_record("b", 0, 100), mapped_record("c", 1, 50)],
    );

    let output = dir.path().join("merged.bam");
    let stats = merge_chunks(&header.to_bytes(), &[&chunk], &output, true).unwrap();

    let (out_header, records) = read_bam(&output);
    let coords: Vec<_> = records.iter().map(|r| (r.reference_id(), r.alignment_start())).collect();
    assert_eq!(coords, vec![(0, 100), (0, 500), (1, 50)]);
    assert_eq!(out_header.sort_order(), Some(SortOrder::Coordinate));

    let index_path = dir.path().join("merged.bam.bai");
    assert_eq!(stats.index_path.as_deref(), Some(index_path.as_path()));
    let index = bai::fs::read(&index_path).unwrap();
    assert_eq!(index.reference_sequences().len(), 2);
}

#[test]
fn test_equal_coordinates_keep_supply_order() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let first = write_test_bam(
        dir.path(),
        "0.bam",
        &header,
        &[mapped_record("x1", 0, 10), mapped_record("x2", 0, 10), mapped_record("x3", 0, 5)],
    );
    let second = write_test_bam(
        dir.path(),
        "1.bam",
        &header,
        &[mapped_record("y1", 0, 10), mapped_record("y2", 0, 5)],
    );

    let output = dir.path().join("merged.bam");
    ChunkMerger::new(header).sort(true).merge(&[&first, &second], &output).unwrap();

    let (_, records) = read_bam(&output);
    assert_eq!(names(&records), vec!["x3", "y2", "x1", "x2", "y1"]);
}

#[rstest]
#[case::all_in_memory(usize::MAX)]
#[case::many_small_runs(2_000)]
fn test_sorts_many_records(#[case] memory_limit: usize) {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let records = numbered_records(500);
    let (front, back) = records.split_at(200);
    let a = write_test_bam(dir.path(), "a.bam", &header, front);
    let b = write_test_bam(dir.path(), "b.bam", &header, back);

    let output = dir.path().join("merged.bam");
    let stats = ChunkMerger::new(header)
        .sort(true)
        .memory_limit(memory_limit)
        .threads(2)
        .merge(&[&a, &b], &output)
        .unwrap();
    assert_eq!(stats.records, 500);
    assert_eq!(stats.inputs, 2);
    if memory_limit == usize::MAX {
        assert_eq!(stats.runs, 2);
    } else {
        assert!(stats.runs > 2);
    }

    let (_, merged) = read_bam(&output);
    assert_coordinate_sorted(&merged);
    let mut expected = names(&records);
    let mut actual = names(&merged);
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected);
}

#[test]
fn test_unmapped_records_sort_last() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let chunk = write_test_bam(
        dir.path(),
        "chunk.bam",
        &header,
        &[unmapped_record("u1"), mapped_record("m2", 1, 0), unmapped_record("u2"), mapped_record("m1", 0, 9_000)],
    );

    let output = dir.path().join("merged.bam");
    let stats = ChunkMerger::new(header).sort(true).merge(&[&chunk], &output).unwrap();

    let (_, records) = read_bam(&output);
    assert_eq!(names(&records), vec!["m1", "m2", "u1", "u2"]);
    let index = bai::fs::read(stats.index_path.unwrap()).unwrap();
    assert_eq!(index.unplaced_unmapped_record_count(), Some(2));
}

#[test]
fn test_concatenate_without_sort() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let a = write_test_bam(dir.path(), "a.bam", &header, &[mapped_record("a", 1, 100)]);
    let b = write_test_bam(dir.path(), "b.bam", &header, &[mapped_record("b", 0, 1)]);

    let output = dir.path().join("merged.bam");
    let stats = merge_chunks(&header.to_bytes(), &[&a, &b], &output, false).unwrap();

    assert_eq!(stats.index_path, None);
    assert!(!dir.path().join("merged.bam.bai").exists());
    let (out_header, records) = read_bam(&output);
    assert_eq!(names(&records), vec!["a", "b"]);
    assert_eq!(out_header, header);
}

#[test]
fn test_inputs_declaring_coordinate_order_are_still_sorted() {
    // chunks carry their source file's sorted header while holding records in any order
    let dir = TempDir::new().unwrap();
    let header = sorted_header();
    let a = write_test_bam(
        dir.path(),
        "a.bam",
        &header,
        &[mapped_record("a1", 0, 500), mapped_record("a2", 0, 100), mapped_record("a3", 1, 50)],
    );
    let b = write_test_bam(
        dir.path(),
        "b.bam",
        &header,
        &[mapped_record("b1", 1, 0), mapped_record("b2", 0, 200)],
    );
    let temp = dir.path().join("spill");

    let output = dir.path().join("merged.bam");
    let stats = ChunkMerger::new(test_header())
        .sort(true)
        .temp_dir(&temp)
        .merge(&[&a, &b], &output)
        .unwrap();

    assert_eq!(stats.runs, 2);
    assert_eq!(stats.index_path, Some(dir.path().join("merged.bam.bai")));
    let (out_header, records) = read_bam(&output);
    assert_eq!(out_header.sort_order(), Some(SortOrder::Coordinate));
    assert_eq!(names(&records), vec!["a2", "b2", "a1", "b1", "a3"]);
    assert_coordinate_sorted(&records);
    // spill directory is cleaned up
    assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
}

#[test]
fn test_sorted_output_is_batched_like_any_chunk() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let chunk = write_test_bam(dir.path(), "chunk.bam", &header, &numbered_records(45));

    let output = dir.path().join("merged.bam");
    ChunkMerger::new(header).sort(true).merge(&[&chunk], &output).unwrap();

    let reader =
        ChunkedReader::from_path(&output, ReaderOptions::default().with_chunk_size(10)).unwrap();
    let sizes: Vec<usize> = reader.map(|chunk| chunk.unwrap().len()).collect();
    assert_eq!(sizes, vec![10, 10, 10, 10, 5]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Merged output is a stable sort of the concatenated inputs.
    #[test]
    fn prop_merge_is_stable_sort(
        chunks in prop::collection::vec(
            prop::collection::vec((-1i32..2, 0i32..50), 0..20),
            1..4,
        ),
    ) {
        let dir = TempDir::new().unwrap();
        let header = test_header();

        let mut paths = Vec::new();
        let mut expected: Vec<(u32, i32, String)> = Vec::new();
        for (i, coords) in chunks.iter().enumerate() {
            let records: Vec<Record> = coords
                .iter()
                .enumerate()
                .map(|(j, &(rid, pos))| {
                    let name = format!("c{i}_{j}");
                    if rid < 0 { unmapped_record(&name) } else { mapped_record(&name, rid, pos) }
                })
                .collect();
            for r in &records {
                let tid = u32::try_from(r.reference_id()).unwrap_or(u32::MAX);
                expected.push((tid, r.alignment_start(), r.name().to_string()));
            }
            paths.push(write_test_bam(dir.path(), &format!("{i}.bam"), &header, &records));
        }
        expected.sort_by_key(|(tid, pos, _)| (*tid, *pos));

        let output = dir.path().join("merged.bam");
        let stats = ChunkMerger::new(header).sort(true).memory_limit(1_500).merge(&paths, &output).unwrap();
        prop_assert_eq!(stats.records as usize, expected.len());

        let (_, merged) = read_bam(&output);
        let expected_names: Vec<String> = expected.into_iter().map(|(_, _, n)| n).collect();
        prop_assert_eq!(names(&merged), expected_names);
    }
}
