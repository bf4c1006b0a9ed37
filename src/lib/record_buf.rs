//! Mutable record construction.
//!
//! [`RecordBuf`] accepts user-level values (names as text, bases as a string, qualities as
//! integers, CIGAR as `(op_code, len)` pairs, tags as `(name, Value)` pairs) and defers every
//! check to [`RecordBuf::to_record`]. Setters never fail.
//!
//! [`RecordOverride`] is a partial record: applying it to a buffer or record replaces only the
//! fields it carries.

use bstr::BString;

use crate::errors::{BamError, Result};
use crate::record::codec::{self, MAX_NAME_LEN};
use crate::record::{cigar, CigarOp, Data, Kind, Record, Tag, Value};

/// Highest quality score that can be stored; 255 marks absent quality on the wire.
pub const MAX_QUALITY: u32 = 254;

/// A record under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBuf {
    name: BString,
    flags: u16,
    reference_id: i32,
    alignment_start: i32,
    mapping_quality: u8,
    cigar: Vec<(u32, u32)>,
    sequence: Vec<u8>,
    quality: Option<Vec<u32>>,
    mate_reference_id: i32,
    mate_alignment_start: i32,
    template_length: i32,
    tags: Vec<(String, Value)>,
}

impl Default for RecordBuf {
    /// An unplaced record with no name, bases, or tags, and unavailable mapping quality.
    fn default() -> Self {
        Self {
            name: BString::default(),
            flags: 0,
            reference_id: -1,
            alignment_start: -1,
            mapping_quality: 255,
            cigar: Vec::new(),
            sequence: Vec::new(),
            quality: None,
            mate_reference_id: -1,
            mate_alignment_start: -1,
            template_length: 0,
            tags: Vec::new(),
        }
    }
}

impl RecordBuf {
    /// An empty, unplaced record buffer. Equivalent to [`RecordBuf::default`].
    ///
    /// # Examples
    ///
    /// ```
    /// use lazybam::record_buf::RecordBuf;
    ///
    /// let mut buf = RecordBuf::new();
    /// buf.set_name("read1").set_sequence("acgt").set_quality([30u8, 30, 31, 32]);
    /// let record = buf.to_record().unwrap();
    /// assert_eq!(record.sequence(), b"ACGT");
    /// assert_eq!(record.reference_id(), -1);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read name.
    ///
    /// # Arguments
    ///
    /// * `name` - Name bytes without a NUL terminator; must be 1-254 bytes when converted
    pub fn set_name(&mut self, name: impl AsRef<[u8]>) -> &mut Self {
        self.name = BString::from(name.as_ref());
        self
    }

    /// Set the SAM flag bits (see [`crate::record::flags`]).
    pub fn set_flags(&mut self, flags: u16) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Reference ID, `-1` for unplaced. Checked against the header when encoded.
    pub fn set_reference_id(&mut self, reference_id: i32) -> &mut Self {
        self.reference_id = reference_id;
        self
    }

    /// 0-based position, `-1` for unplaced.
    pub fn set_alignment_start(&mut self, alignment_start: i32) -> &mut Self {
        self.alignment_start = alignment_start;
        self
    }

    /// Mapping quality; 255 marks it unavailable.
    pub fn set_mapping_quality(&mut self, mapping_quality: u8) -> &mut Self {
        self.mapping_quality = mapping_quality;
        self
    }

    /// CIGAR as `(op_code, len)` pairs, op codes 0-8 in `MIDNSHP=X` order.
    pub fn set_cigar<I>(&mut self, ops: I) -> &mut Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        self.cigar = ops.into_iter().collect();
        self
    }

    /// CIGAR from already-typed operations, e.g. those of another [`Record`].
    pub fn set_cigar_ops(&mut self, ops: &[CigarOp]) -> &mut Self {
        self.cigar = ops.iter().map(|op| (op.kind().code(), op.len())).collect();
        self
    }

    /// Bases as ASCII text.
    ///
    /// # Arguments
    ///
    /// * `bases` - Letters from `=ACMGRSVTWYHKDBN`, either case; stored upper-cased
    pub fn set_sequence(&mut self, bases: impl AsRef<[u8]>) -> &mut Self {
        self.sequence = bases.as_ref().to_vec();
        self
    }

    /// Phred scores without the +33 offset.
    ///
    /// # Arguments
    ///
    /// * `scores` - One score per base, each at most [`MAX_QUALITY`]; an empty list on an
    ///   empty sequence means absent quality
    pub fn set_quality<I, T>(&mut self, scores: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<u32>,
    {
        self.quality = Some(scores.into_iter().map(Into::into).collect());
        self
    }

    /// Mark quality as absent (`*`).
    pub fn clear_quality(&mut self) -> &mut Self {
        self.quality = None;
        self
    }

    /// Mate reference ID, `-1` for unplaced. Checked against the header when encoded.
    pub fn set_mate_reference_id(&mut self, mate_reference_id: i32) -> &mut Self {
        self.mate_reference_id = mate_reference_id;
        self
    }

    /// Mate's 0-based position, `-1` for unplaced.
    pub fn set_mate_alignment_start(&mut self, mate_alignment_start: i32) -> &mut Self {
        self.mate_alignment_start = mate_alignment_start;
        self
    }

    /// Observed template length (`TLEN`).
    pub fn set_template_length(&mut self, template_length: i32) -> &mut Self {
        self.template_length = template_length;
        self
    }

    /// Replace all tags.
    pub fn set_tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|(name, value)| (name.into(), value)).collect();
        self
    }

    /// Append a tag, keeping existing tags of the same name.
    pub fn push_tag(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.tags.push((name.into(), value.into()));
        self
    }

    /// Set a tag: replace its first occurrence and drop later ones, or append it.
    pub fn insert_tag(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.tags.iter().position(|(n, _)| *n == name) {
            Some(i) => {
                self.tags[i].1 = value;
                let mut index = 0usize;
                self.tags.retain(|(n, _)| {
                    let keep = index <= i || *n != name;
                    index += 1;
                    keep
                });
            }
            None => self.tags.push((name, value)),
        }
        self
    }

    /// Read name as set, not yet validated.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Flag bits as set.
    #[must_use]
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Reference ID, `-1` when unplaced.
    #[must_use]
    pub fn reference_id(&self) -> i32 {
        self.reference_id
    }

    /// 0-based start, `-1` when unplaced.
    #[must_use]
    pub fn alignment_start(&self) -> i32 {
        self.alignment_start
    }

    #[must_use]
    pub fn mapping_quality(&self) -> u8 {
        self.mapping_quality
    }

    /// CIGAR as `(op_code, len)` pairs.
    #[must_use]
    pub fn cigar(&self) -> &[(u32, u32)] {
        &self.cigar
    }

    /// Bases as set, before upper-casing.
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Quality scores, `None` when cleared or never set.
    #[must_use]
    pub fn quality(&self) -> Option<&[u32]> {
        self.quality.as_deref()
    }

    /// Mate reference ID.
    #[must_use]
    pub fn mate_reference_id(&self) -> i32 {
        self.mate_reference_id
    }

    /// Mate's 0-based start.
    #[must_use]
    pub fn mate_alignment_start(&self) -> i32 {
        self.mate_alignment_start
    }

    #[must_use]
    pub fn template_length(&self) -> i32 {
        self.template_length
    }

    /// Tags in insertion order, duplicates included.
    #[must_use]
    pub fn tags(&self) -> &[(String, Value)] {
        &self.tags
    }

    /// First value of tag `name`.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&Value> {
        self.tags.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Validate and convert into a [`Record`], computing its bin.
    ///
    /// Reference IDs are checked later, when the record is encoded against a header.
    pub fn to_record(&self) -> Result<Record> {
        let display_name = String::from_utf8_lossy(&self.name);
        if self.name.is_empty() {
            return Err(BamError::validation("read name must not be empty"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(BamError::validation(format!(
                "read name '{display_name}' is {} bytes, maximum is {MAX_NAME_LEN}",
                self.name.len()
            )));
        }

        let cigar = convert_cigar(&self.cigar, &display_name)?;
        let quality = match &self.quality {
            Some(scores) => convert_quality(scores, &self.sequence, &display_name)?,
            None => None,
        };
        let data = self
            .tags
            .iter()
            .map(|(name, value)| Ok((convert_tag(name, &display_name)?, value.clone())))
            .collect::<Result<Data>>()?;

        let mut record = Record {
            name: self.name.clone(),
            flags: self.flags,
            reference_id: self.reference_id,
            alignment_start: self.alignment_start,
            mapping_quality: self.mapping_quality,
            bin: 0,
            cigar,
            sequence: self.sequence.to_ascii_uppercase(),
            quality,
            mate_reference_id: self.mate_reference_id,
            mate_alignment_start: self.mate_alignment_start,
            template_length: self.template_length,
            data,
        };
        codec::validate(&record)?;
        record.bin = record.compute_bin();
        Ok(record)
    }

    /// A copy with every field carried by `ov` replaced.
    #[must_use]
    pub fn apply_override(&self, ov: &RecordOverride) -> Self {
        let mut buf = self.clone();
        if let Some(name) = &ov.name {
            buf.name = name.clone();
        }
        if let Some(flags) = ov.flags {
            buf.flags = flags;
        }
        if let Some(reference_id) = ov.reference_id {
            buf.reference_id = reference_id;
        }
        if let Some(alignment_start) = ov.alignment_start {
            buf.alignment_start = alignment_start;
        }
        if let Some(mapping_quality) = ov.mapping_quality {
            buf.mapping_quality = mapping_quality;
        }
        if let Some(cigar) = &ov.cigar {
            buf.cigar = cigar.clone();
        }
        if let Some(sequence) = &ov.sequence {
            buf.sequence = sequence.clone();
        }
        if let Some(quality) = &ov.quality {
            buf.quality = Some(quality.clone());
        }
        if let Some(mate_reference_id) = ov.mate_reference_id {
            buf.mate_reference_id = mate_reference_id;
        }
        if let Some(mate_alignment_start) = ov.mate_alignment_start {
            buf.mate_alignment_start = mate_alignment_start;
        }
        if let Some(template_length) = ov.template_length {
            buf.template_length = template_length;
        }
        for (name, value) in &ov.tags {
            buf.insert_tag(name.clone(), value.clone());
        }
        buf
    }
}

/// Validate `(op_code, len)` pairs into CIGAR operations.
fn convert_cigar(ops: &[(u32, u32)], display_name: &str) -> Result<Vec<CigarOp>> {
    ops.iter()
        .map(|&(code, len)| {
            let kind = Kind::from_code(code).ok_or_else(|| {
                BamError::validation(format!(
                    "record '{display_name}' has unknown CIGAR op code {code}"
                ))
            })?;
            if len > cigar::MAX_OP_LEN {
                return Err(BamError::validation(format!(
                    "record '{display_name}' CIGAR op length {len} exceeds maximum {}",
                    cigar::MAX_OP_LEN
                )));
            }
            Ok(CigarOp::new(kind, len))
        })
        .collect()
}

/// Scores as stored bytes. Empty scores on an empty sequence mean absent quality.
fn convert_quality(scores: &[u32], sequence: &[u8], display_name: &str) -> Result<Option<Vec<u8>>> {
    if scores.is_empty() && sequence.is_empty() {
        return Ok(None);
    }
    if let Some(q) = scores.iter().find(|&&q| q > MAX_QUALITY) {
        return Err(BamError::validation(format!(
            "record '{display_name}' quality score {q} exceeds maximum {MAX_QUALITY}"
        )));
    }
    Ok(Some(scores.iter().map(|&q| q as u8).collect()))
}

fn convert_tag(name: &str, display_name: &str) -> Result<Tag> {
    Tag::try_from(name).map_err(|_| {
        BamError::validation(format!(
            "record '{display_name}' tag name '{name}' must be two alphanumeric characters"
        ))
    })
}

impl TryFrom<&RecordBuf> for Record {
    type Error = BamError;

    fn try_from(buf: &RecordBuf) -> Result<Self> {
        buf.to_record()
    }
}

impl Record {
    /// Copy into a mutable [`RecordBuf`].
    #[must_use]
    pub fn to_buf(&self) -> RecordBuf {
        RecordBuf {
            name: self.name.clone(),
            flags: self.flags,
            reference_id: self.reference_id,
            alignment_start: self.alignment_start,
            mapping_quality: self.mapping_quality,
            cigar: self.cigar.iter().map(|op| (op.kind().code(), op.len())).collect(),
            sequence: self.sequence.clone(),
            quality: self.quality.as_ref().map(|q| q.iter().map(|&s| u32::from(s)).collect()),
            mate_reference_id: self.mate_reference_id,
            mate_alignment_start: self.mate_alignment_start,
            template_length: self.template_length,
            tags: self.data.iter().map(|(tag, value)| (tag.to_string(), value.clone())).collect(),
        }
    }

    /// A new record with the fields carried by `ov` replaced.
    ///
    /// Only the replaced fields are converted; everything else, including quality bytes that a
    /// [`RecordBuf`] would refuse, is kept as decoded. The stored bin is kept unless the
    /// override moves the alignment (reference, position, CIGAR, or the unmapped flag).
    ///
    /// # Errors
    ///
    /// Returns [`BamError::Validation`] if a replaced field is invalid or the result breaks a
    /// record invariant, such as a sequence and quality of different lengths.
    pub fn apply_override(&self, ov: &RecordOverride) -> Result<Record> {
        let mut record = self.clone();
        let was_unmapped = record.is_unmapped();

        if let Some(name) = &ov.name {
            record.name = name.clone();
        }
        let display_name = String::from_utf8_lossy(&record.name).into_owned();
        if let Some(flags) = ov.flags {
            record.flags = flags;
        }
        if let Some(reference_id) = ov.reference_id {
            record.reference_id = reference_id;
        }
        if let Some(alignment_start) = ov.alignment_start {
            record.alignment_start = alignment_start;
        }
        if let Some(mapping_quality) = ov.mapping_quality {
            record.mapping_quality = mapping_quality;
        }
        if let Some(cigar) = &ov.cigar {
            record.cigar = convert_cigar(cigar, &display_name)?;
        }
        if let Some(sequence) = &ov.sequence {
            record.sequence = sequence.to_ascii_uppercase();
        }
        if let Some(quality) = &ov.quality {
            record.quality = convert_quality(quality, &record.sequence, &display_name)?;
        }
        if let Some(mate_reference_id) = ov.mate_reference_id {
            record.mate_reference_id = mate_reference_id;
        }
        if let Some(mate_alignment_start) = ov.mate_alignment_start {
            record.mate_alignment_start = mate_alignment_start;
        }
        if let Some(template_length) = ov.template_length {
            record.template_length = template_length;
        }
        for (name, value) in &ov.tags {
            record.data.insert(convert_tag(name, &display_name)?, value.clone());
        }
        codec::validate(&record)?;

        let moved = ov.reference_id.is_some()
            || ov.alignment_start.is_some()
            || ov.cigar.is_some()
            || record.is_unmapped() != was_unmapped;
        if moved {
            record.bin = record.compute_bin();
        }
        Ok(record)
    }
}

/// A partial record. `None` fields are left untouched; `tags` are set one by one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOverride {
    /// Replacement read name.
    pub name: Option<BString>,
    /// Replacement flag bits. Toggling `UNMAPPED` recomputes the bin.
    pub flags: Option<u16>,
    pub reference_id: Option<i32>,
    /// 0-based.
    pub alignment_start: Option<i32>,
    pub mapping_quality: Option<u8>,
    /// `(op_code, len)` pairs, as in [`RecordBuf::set_cigar`].
    pub cigar: Option<Vec<(u32, u32)>>,
    /// ASCII bases. Replacing the sequence without `quality` keeps the old scores, so the
    /// lengths must still agree.
    pub sequence: Option<Vec<u8>>,
    /// Phred scores, one per base of the resulting sequence.
    pub quality: Option<Vec<u32>>,
    pub mate_reference_id: Option<i32>,
    pub mate_alignment_start: Option<i32>,
    pub template_length: Option<i32>,
    /// Tags to set in order; an existing tag keeps its position, a new one is appended.
    pub tags: Vec<(String, Value)>,
}

impl RecordOverride {
    /// An override that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag to set.
    #[must_use]
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.push((name.into(), value.into()));
        self
    }
}
