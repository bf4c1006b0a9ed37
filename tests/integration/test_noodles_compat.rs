//! Interoperability with noodles, an independent BAM implementation.

use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::Path;

use bstr::{BString, ByteSlice};
use lazybam::header::Header;
use lazybam::record::codec::read_record_body;
use lazybam::record::{Tag, cigar::to_cigar_string, decode_record, encode_record, flags};
use lazybam::sort::ChunkMerger;
use noodles::bam;
use noodles::bgzf;
use noodles::core::Position;
use noodles::sam;
use noodles::sam::alignment::RecordBuf as NoodlesRecord;
use noodles::sam::alignment::io::Write as _;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::record::cigar::op::{Kind, Op};
use noodles::sam::alignment::record::data::field::Tag as NoodlesTag;
use noodles::sam::alignment::record_buf::data::field::Value as NoodlesValue;
use noodles::sam::alignment::record_buf::data::field::value::Array as NoodlesArray;
use noodles::sam::alignment::record_buf::{Cigar, Data, QualityScores, Sequence};
use noodles::sam::header::record::value::{Map, map::ReferenceSequence};
use tempfile::TempDir;

use crate::helpers::*;

fn read_with_noodles(path: &Path) -> (sam::Header, Vec<NoodlesRecord>) {
    let mut reader = bam::io::reader::Builder.build_from_path(path).unwrap();
    let header = reader.read_header().unwrap();
    let records = reader
        .records()
        .map(|result| NoodlesRecord::try_from_alignment_record(&header, &result.unwrap()).unwrap())
        .collect();
    (header, records)
}

#[test]
fn test_noodles_reads_sorted_output() {
    let dir = TempDir::new().unwrap();
    let header = test_header();
    let chunk = write_test_bam(
        dir.path(),
        "chunk.bam",
        &header,
        &[mapped_record("b", 1, 20), unmapped_record("u"), mapped_record("a", 0, 99)],
    );
    let output = dir.path().join("sorted.bam");
    ChunkMerger::new(header).sort(true).merge(&[&chunk], &output).unwrap();

    let (noodles_header, records) = read_with_noodles(&output);
    let names: Vec<_> =
        noodles_header.reference_sequences().keys().map(|k| k.to_str_lossy().into_owned()).collect();
    assert_eq!(names, vec!["chr1", "chr2"]);

    let a = &records[0];
    assert_eq!(a.name().map(|n| n.to_vec()), Some(b"a".to_vec()));
    assert_eq!(a.reference_sequence_id(), Some(0));
    assert_eq!(a.alignment_start(), Position::new(100));
    assert_eq!(a.mapping_quality().map(u8::from), Some(60));
    assert_eq!(a.sequence().as_ref(), b"ACGTACGTAC");
    assert_eq!(a.quality_scores().as_ref(), &[30u8; 10]);
    assert_eq!(
        a.data().get(&NoodlesTag::READ_GROUP),
        Some(&NoodlesValue::String("A".into()))
    );

    assert_eq!(records[1].reference_sequence_id(), Some(1));
    assert!(records[2].flags().is_unmapped());
    assert_eq!(records[2].reference_sequence_id(), None);
}

#[test]
fn test_reads_noodles_written_bam() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noodles.bam");

    let header = sam::Header::builder()
        .add_reference_sequence(
            "chr1",
            Map::<ReferenceSequence>::new(NonZeroUsize::new(10_000).unwrap()),
        )
        .build();
    let record = NoodlesRecord::builder()
        .set_name(BString::from("from_noodles"))
        .set_flags(Flags::REVERSE_COMPLEMENTED)
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::try_from(51).unwrap())
        .set_cigar(Cigar::from(vec![Op::new(Kind::SoftClip, 2), Op::new(Kind::Match, 4)]))
        .set_sequence(Sequence::from(b"TTACGT".to_vec()))
        .set_quality_scores(QualityScores::from(vec![10, 20, 30, 40, 30, 20]))
        .set_data(Data::from_iter([(NoodlesTag::ALIGNMENT_HIT_COUNT, NoodlesValue::from(3u8))]))
        .build();
    let mut writer = bam::io::Writer::new(File::create(&path).unwrap());
    writer.write_header(&header).unwrap();
    writer.write_alignment_record(&header, &record).unwrap();
    writer.try_finish().unwrap();
    drop(writer);

    let (ours_header, records) = read_bam(&path);
    assert_eq!(ours_header.references().len(), 1);
    assert_eq!(ours_header.references()[0].name(), "chr1");

    let record = &records[0];
    assert_eq!(record.name(), "from_noodles".as_bytes().as_bstr());
    assert_eq!(record.flags() & flags::REVERSE, flags::REVERSE);
    assert_eq!(record.alignment_start(), 50);
    assert_eq!(to_cigar_string(record.cigar()), "2S4M");
    assert_eq!(record.sequence(), b"TTACGT");
    assert_eq!(record.quality(), Some(&[10u8, 20, 30, 40, 30, 20][..]));
    assert_eq!(record.alignment_end(), Some(54));
    assert_eq!(record.data().get(Tag::try_from("NH").unwrap()).and_then(|v| v.as_int()), Some(3));
    assert_eq!(record.bin(), record.compute_bin());
}

#[test]
fn test_noodles_written_records_re_encode_bit_exact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noodles.bam");

    let header = sam::Header::builder()
        .add_reference_sequence(
            "chr1",
            Map::<ReferenceSequence>::new(NonZeroUsize::new(10_000).unwrap()),
        )
        .build();
    let mapped = NoodlesRecord::builder()
        .set_name(BString::from("mapped"))
        .set_flags(Flags::SEGMENTED | Flags::FIRST_SEGMENT)
        .set_reference_sequence_id(0)
        .set_alignment_start(Position::try_from(1_000).unwrap())
        .set_mapping_quality(sam::alignment::record::MappingQuality::new(42).unwrap())
        .set_cigar(Cigar::from(vec![
            Op::new(Kind::Match, 3),
            Op::new(Kind::Deletion, 2),
            Op::new(Kind::Match, 2),
        ]))
        .set_sequence(Sequence::from(b"ACNTG".to_vec()))
        .set_quality_scores(QualityScores::from(vec![2, 40, 0, 93, 17]))
        .set_mate_reference_sequence_id(0)
        .set_mate_alignment_start(Position::try_from(1_200).unwrap())
        .set_template_length(207)
        .set_data(Data::from_iter([
            (NoodlesTag::READ_GROUP, NoodlesValue::String("rg1".into())),
            (NoodlesTag::from([b'X', b'F']), NoodlesValue::Float(0.25)),
            (NoodlesTag::from([b'X', b'B']), NoodlesValue::Array(NoodlesArray::Int16(vec![-3, 0, 7]))),
        ]))
        .build();
    let unmapped = NoodlesRecord::builder()
        .set_name(BString::from("unmapped"))
        .set_flags(Flags::UNMAPPED)
        .set_sequence(Sequence::from(b"GATTACA".to_vec()))
        .build();

    let mut writer = bam::io::Writer::new(File::create(&path).unwrap());
    writer.write_header(&header).unwrap();
    writer.write_alignment_record(&header, &mapped).unwrap();
    writer.write_alignment_record(&header, &unmapped).unwrap();
    writer.try_finish().unwrap();
    drop(writer);

    let mut src = bgzf::Reader::new(File::open(&path).unwrap());
    let ours_header = Header::read_from(&mut src).unwrap();
    let mut body = Vec::new();
    let mut count = 0;
    while read_record_body(&mut src, &mut body).unwrap() {
        let record = decode_record(&body).unwrap();
        let mut encoded = Vec::new();
        encode_record(&mut encoded, &ours_header, &record).unwrap();
        assert_eq!(&encoded[..4], &(body.len() as u32).to_le_bytes());
        assert_eq!(&encoded[4..], &body[..], "record '{}' differs", record.name());
        count += 1;
    }
    assert_eq!(count, 2);
    let mut rest = Vec::new();
    src.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}
