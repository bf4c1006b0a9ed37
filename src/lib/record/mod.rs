//! Decoded alignment records and their binary codec.
//!
//! A [`Record`] owns every field of one alignment in decoded form. Records come from
//! [`decode_record`] (reading) or from [`RecordBuf::to_record`](crate::record_buf::RecordBuf::to_record)
//! (construction); either way they are plain values and can be cloned and sent across threads.

pub mod cigar;
pub mod codec;
pub mod data;
pub mod sequence;

use bstr::{BStr, BString, ByteSlice};

pub use cigar::{CigarOp, Kind};
pub use codec::{decode_record, encode_record, read_record, reg2bin};
pub use data::{Array, Data, Tag, Value};

/// SAM flag bits.
pub mod flags {
    /// Read is paired in sequencing.
    pub const PAIRED: u16 = 0x1;
    /// Each segment properly aligned.
    pub const PROPER_PAIR: u16 = 0x2;
    /// Read is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Mate is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Read is reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Mate is reverse complemented.
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in template (R1).
    pub const FIRST_SEGMENT: u16 = 0x40;
    /// Last segment in template (R2).
    pub const LAST_SEGMENT: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls.
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate.
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// A decoded alignment record.
///
/// Positions are 0-based as stored on the wire; `-1` marks an unplaced record or mate.
/// The `bin` read from disk is kept so that re-encoding is bit-exact.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub(crate) name: BString,
    pub(crate) flags: u16,
    pub(crate) reference_id: i32,
    pub(crate) alignment_start: i32,
    pub(crate) mapping_quality: u8,
    pub(crate) bin: u16,
    pub(crate) cigar: Vec<CigarOp>,
    pub(crate) sequence: Vec<u8>,
    pub(crate) quality: Option<Vec<u8>>,
    pub(crate) mate_reference_id: i32,
    pub(crate) mate_alignment_start: i32,
    pub(crate) template_length: i32,
    pub(crate) data: Data,
}

impl Record {
    /// Read name, without the NUL terminator.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    /// SAM flag bits; see [`flags`] for the named constants.
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Reference sequence ID, `-1` if unplaced.
    #[must_use]
    pub fn reference_id(&self) -> i32 {
        self.reference_id
    }

    /// 0-based leftmost position, `-1` if unplaced.
    #[must_use]
    pub fn alignment_start(&self) -> i32 {
        self.alignment_start
    }

    /// Mapping quality; 255 means unavailable.
    #[must_use]
    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    /// BAI bin stored in the record.
    #[must_use]
    pub fn bin(&self) -> u16 {
        self.bin
    }

    /// CIGAR operations, empty for `*`.
    #[must_use]
    pub fn cigar(&self) -> &[CigarOp] {
        &self.cigar
    }

    /// Bases as ASCII.
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Phred scores (no +33 offset), or `None` when absent.
    #[must_use]
    pub fn quality(&self) -> Option<&[u8]> {
        self.quality.as_deref()
    }

    /// Reference sequence ID of the mate, `-1` if unplaced.
    #[must_use]
    pub fn mate_reference_id(&self) -> i32 {
        self.mate_reference_id
    }

    /// 0-based leftmost position of the mate, `-1` if unplaced.
    #[must_use]
    pub fn mate_alignment_start(&self) -> i32 {
        self.mate_alignment_start
    }

    /// Observed template length (`TLEN`); negative for the rightmost segment.
    #[must_use]
    pub fn template_length(&self) -> i32 {
        self.template_length
    }

    /// Auxiliary tags in the order they were stored.
    #[must_use]
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Whether the unmapped flag is set.
    #[must_use]
    pub fn is_unmapped(&self) -> bool {
        self.flags & flags::UNMAPPED != 0
    }

    /// Reference bases covered by the CIGAR.
    #[must_use]
    pub fn reference_length(&self) -> u64 {
        cigar::reference_length(&self.cigar)
    }

    /// 0-based exclusive end of the alignment on the reference.
    ///
    /// Records without reference-consuming operations (including placed unmapped reads) cover
    /// one base. The end saturates at `i32::MAX`. `None` for unplaced records.
    #[must_use]
    pub fn alignment_end(&self) -> Option<i32> {
        if self.alignment_start < 0 {
            return None;
        }
        let len = if self.is_unmapped() { 0 } else { self.reference_length() };
        let len = i32::try_from(len.max(1)).unwrap_or(i32::MAX);
        Some(self.alignment_start.saturating_add(len))
    }

    /// Bin computed from the current position and CIGAR.
    #[must_use]
    pub fn compute_bin(&self) -> u16 {
        match self.alignment_end() {
            Some(end) => reg2bin(self.alignment_start, end),
            None => reg2bin(-1, 0),
        }
    }
}
