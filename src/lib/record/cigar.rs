//! CIGAR operations and their packed 32-bit wire form.
//!
//! Each operation is stored as a little-endian `u32`: the run length in the high 28 bits and
//! the operation code in the low 4 bits. [`KINDS`] is the one table mapping codes to kinds;
//! both encoding and decoding go through it.

use std::fmt;

use crate::errors::{BamError, Result};

/// Largest run length that fits in the 28 length bits of a packed operation.
pub const MAX_OP_LEN: u32 = (1 << 28) - 1;

/// CIGAR operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Alignment match (`M`), may be a sequence match or mismatch.
    Match,
    /// Insertion to the reference (`I`).
    Insertion,
    /// Deletion from the reference (`D`).
    Deletion,
    /// Skipped region from the reference (`N`).
    Skip,
    /// Soft clip (`S`): clipped bases are present in the sequence.
    SoftClip,
    /// Hard clip (`H`): clipped bases are absent from the sequence.
    HardClip,
    /// Silent deletion from padded reference (`P`).
    Pad,
    /// Sequence match (`=`).
    SequenceMatch,
    /// Sequence mismatch (`X`).
    SequenceMismatch,
}

/// Operation kinds indexed by their BAM op code.
pub const KINDS: [Kind; 9] = [
    Kind::Match,
    Kind::Insertion,
    Kind::Deletion,
    Kind::Skip,
    Kind::SoftClip,
    Kind::HardClip,
    Kind::Pad,
    Kind::SequenceMatch,
    Kind::SequenceMismatch,
];

const SYMBOLS: &[u8; 9] = b"MIDNSHP=X";

impl Kind {
    /// Look up a kind by its BAM op code (0-8).
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        KINDS.get(code as usize).copied()
    }

    /// The BAM op code for this kind.
    #[must_use]
    pub fn code(self) -> u32 {
        // KINDS is exhaustive, so the position always exists
        KINDS.iter().position(|&k| k == self).unwrap_or_default() as u32
    }

    /// The SAM text symbol (`M`, `I`, `D`, ...).
    #[must_use]
    pub fn symbol(self) -> char {
        char::from(SYMBOLS[self.code() as usize])
    }

    /// Whether the operation advances along the reference.
    #[must_use]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Deletion | Self::Skip | Self::SequenceMatch | Self::SequenceMismatch
        )
    }

    /// Whether the operation consumes bases of the read sequence.
    #[must_use]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Self::Match
                | Self::Insertion
                | Self::SoftClip
                | Self::SequenceMatch
                | Self::SequenceMismatch
        )
    }
}

/// A single CIGAR operation: a kind and its run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CigarOp {
    kind: Kind,
    len: u32,
}

impl CigarOp {
    /// Create a new operation.
    #[must_use]
    pub fn new(kind: Kind, len: u32) -> Self {
        Self { kind, len }
    }

    /// The operation kind.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The run length.
    #[must_use]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether the run length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Unpack an operation from its wire word.
    pub fn from_packed(word: u32) -> Result<Self> {
        let code = word & 0xF;
        let kind = Kind::from_code(code)
            .ok_or_else(|| BamError::format(format!("invalid CIGAR op code {code}")))?;
        Ok(Self { kind, len: word >> 4 })
    }

    /// Pack the operation into its wire word.
    pub fn to_packed(&self) -> Result<u32> {
        if self.len > MAX_OP_LEN {
            return Err(BamError::validation(format!(
                "CIGAR op length {} exceeds maximum {MAX_OP_LEN}",
                self.len
            )));
        }
        Ok((self.len << 4) | self.kind.code())
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.symbol())
    }
}

/// Number of reference bases spanned by the operations (M/D/N/=/X).
#[must_use]
///
/// Summed as `u64`: up to 65535 ops of 2^28 - 1 bases each do not fit in 32 bits.
pub fn reference_length(ops: &[CigarOp]) -> u64 {
    ops.iter().filter(|op| op.kind.consumes_reference()).map(|op| u64::from(op.len)).sum()
}

/// Number of read bases consumed by the operations (M/I/S/=/X).
#[must_use]
pub fn read_length(ops: &[CigarOp]) -> u64 {
    ops.iter().filter(|op| op.kind.consumes_read()).map(|op| u64::from(op.len)).sum()
}

/// Render operations as a SAM CIGAR string (`*` when empty).
#[must_use]
pub fn to_cigar_string(ops: &[CigarOp]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    ops.iter().map(ToString::to_string).collect()
}
