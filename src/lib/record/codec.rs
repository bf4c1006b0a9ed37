//! Binary record layout: decoding and encoding of a single alignment record.
//!
//! ```text
//! block_size       u32   (bytes that follow)
//! refID            i32
//! pos              i32   (0-based, -1 if unplaced)
//! l_read_name      u8    (including NUL)
//! mapq             u8
//! bin              u16
//! n_cigar_op       u16
//! flag             u16
//! l_seq            u32
//! next_refID       i32
//! next_pos         i32
//! tlen             i32
//! read_name        [u8; l_read_name]
//! cigar            [u32; n_cigar_op]
//! seq              [u8; (l_seq + 1) / 2]
//! qual             [u8; l_seq]   (all 0xFF if absent)
//! aux              remaining bytes
//! ```

use std::io::{self, Read};

use bstr::{BString, ByteSlice};

use super::cigar::{self, CigarOp};
use super::data::{self, Data, Value};
use super::sequence;
use super::Record;
use crate::errors::{truncated, BamError, Result};
use crate::header::Header;

/// Size of the fixed-length portion of a record body.
pub const FIXED_FIELDS_LEN: usize = 32;

/// Longest read name, excluding the NUL terminator.
pub const MAX_NAME_LEN: usize = 254;

/// Most CIGAR operations a record can carry in its fixed header.
pub const MAX_CIGAR_OPS: usize = u16::MAX as usize;

/// Quality byte marking an absent quality string.
pub const MISSING_QUALITY: u8 = 0xFF;

/// Bounds-checked little-endian reader over a record body.
#[derive(Debug)]
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(BamError::format(format!(
                "truncated {what}: need {n} bytes, {} remain",
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &str) -> Result<u16> {
        self.array(what).map(u16::from_le_bytes)
    }

    pub(crate) fn i16(&mut self, what: &str) -> Result<i16> {
        self.array(what).map(i16::from_le_bytes)
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    pub(crate) fn i32(&mut self, what: &str) -> Result<i32> {
        self.array(what).map(i32::from_le_bytes)
    }

    /// Bytes up to the next NUL; the NUL is consumed but not returned.
    pub(crate) fn nul_terminated(&mut self, what: &str) -> Result<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let end = rest
            .find_byte(0)
            .ok_or_else(|| BamError::format(format!("truncated {what}: missing NUL terminator")))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }
}

/// Compute the BAI bin for a 0-based half-open interval (SAMv1 §5.3).
///
/// `reg2bin(-1, 0)` yields 4680, the bin for unplaced records.
#[must_use]
pub fn reg2bin(start: i32, end: i32) -> u16 {
    let end = end - 1;
    let bin = if start >> 14 == end >> 14 {
        ((1 << 15) - 1) / 7 + (start >> 14)
    } else if start >> 17 == end >> 17 {
        ((1 << 12) - 1) / 7 + (start >> 17)
    } else if start >> 20 == end >> 20 {
        ((1 << 9) - 1) / 7 + (start >> 20)
    } else if start >> 23 == end >> 23 {
        ((1 << 6) - 1) / 7 + (start >> 23)
    } else if start >> 26 == end >> 26 {
        ((1 << 3) - 1) / 7 + (start >> 26)
    } else {
        0
    };
    bin as u16
}

/// Read one length-prefixed record body into `buf`.
///
/// Returns `false` on a clean end of stream at a record boundary. A partial length prefix or a
/// short body is a format error.
pub fn read_record_body<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool> {
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(truncated("record length prefix")(e)),
        }
    }
    match filled {
        0 => return Ok(false),
        4 => {}
        n => return Err(BamError::format(format!("truncated record length prefix ({n} of 4 bytes)"))),
    }

    let block_size = u32::from_le_bytes(prefix) as usize;
    if block_size < FIXED_FIELDS_LEN {
        return Err(BamError::format(format!(
            "record block size {block_size} is smaller than the {FIXED_FIELDS_LEN}-byte fixed header"
        )));
    }
    buf.resize(block_size, 0);
    reader.read_exact(buf).map_err(truncated("record body"))?;
    Ok(true)
}

/// Read and decode the next record, or `None` at a clean end of stream.
pub fn read_record<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> Result<Option<Record>> {
    if read_record_body(reader, buf)? { decode_record(buf).map(Some) } else { Ok(None) }
}

/// Decode a record body (everything after the `block_size` prefix).
pub fn decode_record(body: &[u8]) -> Result<Record> {
    let mut src = Cursor::new(body);

    let reference_id = src.i32("reference ID")?;
    let alignment_start = src.i32("position")?;
    let l_read_name = src.u8("read name length")? as usize;
    let mapping_quality = src.u8("mapping quality")?;
    let bin = src.u16("bin")?;
    let n_cigar_op = src.u16("CIGAR op count")? as usize;
    let flags = src.u16("flags")?;
    let l_seq = src.u32("sequence length")? as usize;
    let mate_reference_id = src.i32("mate reference ID")?;
    let mate_alignment_start = src.i32("mate position")?;
    let template_length = src.i32("template length")?;

    let name = match src.take(l_read_name, "read name")? {
        [name @ .., 0] => BString::from(name),
        _ => return Err(BamError::format("read name is not NUL-terminated")),
    };

    let cigar = src
        .take(n_cigar_op * 4, "CIGAR")?
        .chunks_exact(4)
        .map(|w| CigarOp::from_packed(u32::from_le_bytes([w[0], w[1], w[2], w[3]])))
        .collect::<Result<Vec<_>>>()?;

    let packed = src.take(sequence::packed_len(l_seq), "sequence")?;
    let seq = sequence::unpack_sequence(packed, l_seq);

    let qual = src.take(l_seq, "quality")?;
    let quality =
        if qual.iter().all(|&q| q == MISSING_QUALITY) { None } else { Some(qual.to_vec()) };

    let data = data::decode_data(&mut src)?;

    Ok(Record {
        name,
        flags,
        reference_id,
        alignment_start,
        mapping_quality,
        bin,
        cigar,
        sequence: seq,
        quality,
        mate_reference_id,
        mate_alignment_start,
        template_length,
        data,
    })
}

/// Check the record invariants that do not depend on a header.
pub(crate) fn validate(record: &Record) -> Result<()> {
    let name = record.name();
    if name.is_empty() {
        return Err(BamError::validation("read name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(BamError::validation(format!(
            "read name length {} exceeds maximum {MAX_NAME_LEN}",
            name.len()
        )));
    }
    if name.contains(&0) {
        return Err(BamError::validation(format!("read name '{name}' contains a NUL byte")));
    }

    if record.cigar.len() > MAX_CIGAR_OPS {
        return Err(BamError::validation(format!(
            "record '{name}' has {} CIGAR ops, maximum is {MAX_CIGAR_OPS}",
            record.cigar.len()
        )));
    }
    if let Some(op) = record.cigar.iter().find(|op| op.len() > cigar::MAX_OP_LEN) {
        return Err(BamError::validation(format!(
            "record '{name}' CIGAR op {op} exceeds maximum length {}",
            cigar::MAX_OP_LEN
        )));
    }

    if i32::try_from(record.sequence.len()).is_err() {
        return Err(BamError::validation(format!("record '{name}' sequence is too long")));
    }
    if let Some(i) = sequence::find_invalid_base(&record.sequence) {
        return Err(BamError::validation(format!(
            "record '{name}' has invalid base '{}' at offset {i}",
            record.sequence[i].escape_ascii()
        )));
    }
    if let Some(quality) = &record.quality {
        if quality.len() != record.sequence.len() {
            return Err(BamError::validation(format!(
                "record '{name}' quality length {} does not match sequence length {}",
                quality.len(),
                record.sequence.len()
            )));
        }
    }

    for (tag, value) in record.data.iter() {
        if let Value::Array(array) = value {
            if u32::try_from(array.len()).is_err() {
                return Err(BamError::validation(format!(
                    "record '{name}' tag {tag} array has {} elements",
                    array.len()
                )));
            }
        }
    }
    Ok(())
}

fn check_reference_id(header: &Header, id: i32, what: &str, name: &[u8]) -> Result<()> {
    let n_ref = header.references().len();
    if id == -1 || usize::try_from(id).is_ok_and(|i| i < n_ref) {
        Ok(())
    } else {
        Err(BamError::validation(format!(
            "record '{}' {what} {id} is out of range for a header with {n_ref} references",
            name.as_bstr()
        )))
    }
}

/// Encode `record` with its `block_size` prefix, appending to `dst`.
///
/// On error `dst` is left as it was.
pub fn encode_record(dst: &mut Vec<u8>, header: &Header, record: &Record) -> Result<()> {
    validate(record)?;
    check_reference_id(header, record.reference_id, "reference ID", &record.name)?;
    check_reference_id(header, record.mate_reference_id, "mate reference ID", &record.name)?;

    let start = dst.len();
    let result = encode_body(dst, record);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

fn encode_body(dst: &mut Vec<u8>, record: &Record) -> Result<()> {
    let start = dst.len();
    dst.extend_from_slice(&[0u8; 4]);

    dst.extend_from_slice(&record.reference_id.to_le_bytes());
    dst.extend_from_slice(&record.alignment_start.to_le_bytes());
    dst.push((record.name.len() + 1) as u8);
    dst.push(record.mapping_quality);
    dst.extend_from_slice(&record.bin.to_le_bytes());
    dst.extend_from_slice(&(record.cigar.len() as u16).to_le_bytes());
    dst.extend_from_slice(&record.flags.to_le_bytes());
    dst.extend_from_slice(&(record.sequence.len() as u32).to_le_bytes());
    dst.extend_from_slice(&record.mate_reference_id.to_le_bytes());
    dst.extend_from_slice(&record.mate_alignment_start.to_le_bytes());
    dst.extend_from_slice(&record.template_length.to_le_bytes());

    dst.extend_from_slice(&record.name);
    dst.push(0);

    for op in &record.cigar {
        dst.extend_from_slice(&op.to_packed()?.to_le_bytes());
    }

    sequence::pack_sequence_into(dst, &record.sequence);
    match &record.quality {
        Some(quality) => dst.extend_from_slice(quality),
        None => dst.resize(dst.len() + record.sequence.len(), MISSING_QUALITY),
    }

    data::encode_data(dst, &record.data)?;

    let block_size = u32::try_from(dst.len() - start - 4)
        .map_err(|_| BamError::validation(format!("record '{}' is too large", record.name)))?;
    dst[start..start + 4].copy_from_slice(&block_size.to_le_bytes());
    Ok(())
}

/// Estimated in-memory footprint of a decoded record, for run sizing.
#[must_use]
pub fn estimate_record_size(record: &Record) -> usize {
    let data: usize = record
        .data
        .iter()
        .map(|(_, value)| match value {
            Value::String(s) | Value::Hex(s) => s.len() + 32,
            Value::Array(a) => a.len() * 4 + 32,
            _ => 16,
        })
        .sum();
    std::mem::size_of::<Record>()
        + record.name.len()
        + record.cigar.len() * std::mem::size_of::<CigarOp>()
        + record.sequence.len() * 2
        + data
}
