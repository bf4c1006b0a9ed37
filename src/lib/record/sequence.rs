//! 4-bit packed sequence encoding.
//!
//! BAM packs two bases per byte, the first base in the high nibble. The 16 codes map to
//! `=ACMGRSVTWYHKDBN`; an odd-length sequence leaves the low nibble of the last byte zero.

/// 4-bit code -> ASCII base.
pub const BASE_DECODE: [u8; 16] = *b"=ACMGRSVTWYHKDBN";

/// Marker for bytes outside the IUPAC alphabet in [`SEQ_CODES`].
const INVALID: u8 = 0xFF;

/// ASCII base -> 4-bit code, `INVALID` for anything outside the alphabet.
const SEQ_CODES: [u8; 256] = build_seq_codes();

const fn build_seq_codes() -> [u8; 256] {
    let mut codes = [INVALID; 256];
    let mut i = 0;
    while i < BASE_DECODE.len() {
        let base = BASE_DECODE[i];
        codes[base as usize] = i as u8;
        codes[base.to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    codes
}

/// Number of bytes needed to pack `len` bases.
#[inline]
#[must_use]
pub fn packed_len(len: usize) -> usize {
    len.div_ceil(2)
}

/// Position of the first byte that is not an IUPAC nucleotide symbol, if any.
#[must_use]
pub fn find_invalid_base(bases: &[u8]) -> Option<usize> {
    bases.iter().position(|&b| SEQ_CODES[b as usize] == INVALID)
}

/// Pack ASCII bases into 4-bit form, appending to `dst`.
///
/// Callers validate with [`find_invalid_base`] first; any byte outside the alphabet is
/// written as `N`.
pub fn pack_sequence_into(dst: &mut Vec<u8>, bases: &[u8]) {
    dst.reserve(packed_len(bases.len()));
    let code = |b: u8| match SEQ_CODES[b as usize] {
        INVALID => 0x0F,
        c => c,
    };
    let mut pairs = bases.chunks_exact(2);
    for pair in &mut pairs {
        dst.push((code(pair[0]) << 4) | code(pair[1]));
    }
    if let [last] = pairs.remainder() {
        dst.push(code(*last) << 4);
    }
}

/// Unpack `len` bases from 4-bit packed bytes.
#[must_use]
pub fn unpack_sequence(packed: &[u8], len: usize) -> Vec<u8> {
    let mut bases = Vec::with_capacity(len);
    for &byte in packed {
        bases.push(BASE_DECODE[(byte >> 4) as usize]);
        bases.push(BASE_DECODE[(byte & 0x0F) as usize]);
    }
    bases.truncate(len);
    bases
}
