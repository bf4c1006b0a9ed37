//! BAM header model.
//!
//! The binary header is the `BAM\1` magic, the SAM header text, and the reference dictionary:
//!
//! ```text
//! magic    [u8; 4]  "BAM\1"
//! l_text   i32
//! text     [u8; l_text]      (may carry NUL padding)
//! n_ref    i32
//! n_ref x {
//!   l_name i32               (including NUL)
//!   name   [u8; l_name]
//!   l_ref  i32
//! }
//! ```
//!
//! A parsed [`Header`] keeps the text verbatim, so an unmodified header serializes back to the
//! exact bytes it was read from. The text is also parsed into a [`noodles::sam::Header`], which
//! answers every query about `@HD`, `@PG`, and `@CO` records. Operations that change the header
//! (`add_program`, `change_sort_order`) edit the noodles model and render the text from it; they
//! return a new value, and reference IDs are never renumbered.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::num::NonZeroUsize;
use std::str::FromStr;

use bstr::{BString, ByteSlice};
use noodles::sam;
use noodles::sam::header::record::value::Map;
use noodles::sam::header::record::value::map::header::Version;
use noodles::sam::header::record::value::map::header::tag::SORT_ORDER;
use noodles::sam::header::record::value::map::program::tag::PREVIOUS_PROGRAM_ID;
use noodles::sam::header::record::value::map::{self, Program, ReferenceSequence};

use crate::errors::{truncated, BamError, Result};

/// BAM magic bytes.
pub const MAGIC: &[u8; 4] = b"BAM\x01";

/// `VN` written when an `@HD` line has to be created.
fn default_version() -> Version {
    Version::new(1, 6)
}

/// An entry of the reference dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    name: String,
    length: u32,
}

impl Reference {
    #[must_use]
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self { name: name.into(), length }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.length
    }
}

/// The `@HD SO` sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Unknown,
    Unsorted,
    QueryName,
    Coordinate,
}

impl SortOrder {
    /// The header field value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unsorted => "unsorted",
            Self::QueryName => "queryname",
            Self::Coordinate => "coordinate",
        }
    }
}

impl FromStr for SortOrder {
    type Err = BamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "unsorted" => Ok(Self::Unsorted),
            "queryname" => Ok(Self::QueryName),
            "coordinate" => Ok(Self::Coordinate),
            other => Err(BamError::validation(format!(
                "invalid sort order '{other}', expected one of: unknown, unsorted, queryname, coordinate"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header record viewed as its type and `TAG:value` fields.
///
/// `@CO` lines have no fields; their text is available through [`Header::comments`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    /// Record type without the leading `@` (`HD`, `SQ`, `RG`, `PG`, `CO`).
    pub kind: String,
    /// Fields in SAM order, identifying field first.
    pub fields: Vec<(String, String)>,
}

impl HeaderLine {
    fn new(kind: &str, fields: Vec<(String, String)>) -> Self {
        Self { kind: kind.to_string(), fields }
    }

    /// First value of field `tag`.
    #[must_use]
    pub fn field(&self, tag: &str) -> Option<&str> {
        self.fields.iter().find(|(t, _)| t == tag).map(|(_, v)| v.as_str())
    }
}

/// A BAM header: SAM text plus the binary reference dictionary.
#[derive(Debug, Clone, Default)]
pub struct Header {
    text: BString,
    references: Vec<Reference>,
    sam: sam::Header,
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.references == other.references
    }
}

impl Eq for Header {}

impl Header {
    /// Create a header from SAM text and a reference dictionary.
    ///
    /// # Errors
    ///
    /// Returns [`BamError::Format`] if the text is not a valid SAM header.
    pub fn new(text: impl Into<BString>, references: Vec<Reference>) -> Result<Self> {
        let text = text.into();
        let sam = parse_text(&text)?;
        Ok(Self { text, references, sam })
    }

    /// Start building a header from scratch.
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Parse a complete binary header. Trailing bytes are a format error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut src = bytes;
        let header = Self::read_from(&mut src)?;
        if !src.is_empty() {
            return Err(BamError::format(format!("{} unexpected bytes after header", src.len())));
        }
        Ok(header)
    }

    /// Read a binary header from the start of a decompressed BAM stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(truncated("header magic"))?;
        if &magic != MAGIC {
            return Err(BamError::format(format!(
                "invalid magic '{}', expected 'BAM\\1'",
                magic.escape_ascii()
            )));
        }

        let l_text = read_len(reader, "header text length")?;
        let text = read_bytes(reader, l_text, "header text")?;

        let n_ref = read_len(reader, "reference count")?;
        let mut references = Vec::with_capacity(n_ref.min(1 << 16));
        for i in 0..n_ref {
            let l_name = read_len(reader, "reference name length")?;
            let raw = read_bytes(reader, l_name, "reference name")?;
            let name = match raw.as_slice() {
                [name @ .., 0] => String::from_utf8(name.to_vec()).map_err(|_| {
                    BamError::format(format!("reference {i} name is not valid UTF-8"))
                })?,
                _ => {
                    return Err(BamError::format(format!(
                        "reference {i} name is not NUL-terminated"
                    )));
                }
            };
            let length = read_len(reader, "reference length")? as u32;
            references.push(Reference { name, length });
        }

        Self::new(text, references)
    }

    /// Serialize to the binary header layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let names: usize = self.references.iter().map(|r| r.name.len() + 9).sum();
        let mut out = Vec::with_capacity(12 + self.text.len() + names);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.text.len() as i32).to_le_bytes());
        out.extend_from_slice(&self.text);
        out.extend_from_slice(&(self.references.len() as i32).to_le_bytes());
        for reference in &self.references {
            out.extend_from_slice(&((reference.name.len() + 1) as i32).to_le_bytes());
            out.extend_from_slice(reference.name.as_bytes());
            out.push(0);
            out.extend_from_slice(&(reference.length as i32).to_le_bytes());
        }
        out
    }

    /// The raw header text, including any NUL padding.
    #[must_use]
    pub fn text(&self) -> &[u8] {
        &self.text
    }

    /// The header text parsed as a SAM header.
    #[must_use]
    pub fn sam_header(&self) -> &sam::Header {
        &self.sam
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Name of reference `rid`.
    pub fn ref_name(&self, rid: i32) -> Result<&str> {
        usize::try_from(rid)
            .ok()
            .and_then(|i| self.references.get(i))
            .map(Reference::name)
            .ok_or_else(|| {
                BamError::index(format!(
                    "reference ID {rid} is out of range for a header with {} references",
                    self.references.len()
                ))
            })
    }

    /// ID of the reference called `name`.
    #[must_use]
    pub fn reference_id(&self, name: &str) -> Option<i32> {
        self.references.iter().position(|r| r.name == name).map(|i| i as i32)
    }

    /// Header records grouped by type: `@HD`, `@SQ`, `@RG`, `@PG`, then `@CO`.
    #[must_use]
    pub fn lines(&self) -> Vec<HeaderLine> {
        let mut lines = Vec::new();
        if let Some(hd) = self.sam.header() {
            let mut fields = vec![("VN".to_string(), hd.version().to_string())];
            fields.extend(other_fields(hd.other_fields()));
            lines.push(HeaderLine::new("HD", fields));
        }
        for (name, sq) in self.sam.reference_sequences() {
            let mut fields = vec![
                ("SN".to_string(), name.to_string()),
                ("LN".to_string(), sq.length().to_string()),
            ];
            fields.extend(other_fields(sq.other_fields()));
            lines.push(HeaderLine::new("SQ", fields));
        }
        for (id, rg) in self.sam.read_groups() {
            let mut fields = vec![("ID".to_string(), id.to_string())];
            fields.extend(other_fields(rg.other_fields()));
            lines.push(HeaderLine::new("RG", fields));
        }
        lines.extend(self.programs());
        lines.extend(self.sam.comments().iter().map(|_| HeaderLine::new("CO", Vec::new())));
        lines
    }

    /// `@PG` lines in header order.
    #[must_use]
    pub fn programs(&self) -> Vec<HeaderLine> {
        self.sam
            .programs()
            .as_ref()
            .iter()
            .map(|(id, pg)| {
                let mut fields = vec![("ID".to_string(), id.to_string())];
                fields.extend(other_fields(pg.other_fields()));
                HeaderLine::new("PG", fields)
            })
            .collect()
    }

    /// Text of each `@CO` line.
    #[must_use]
    pub fn comments(&self) -> Vec<String> {
        self.sam.comments().iter().map(ToString::to_string).collect()
    }

    /// Sort order declared by `@HD SO`, if present and recognized.
    #[must_use]
    pub fn sort_order(&self) -> Option<SortOrder> {
        let hd = self.sam.header()?;
        let so = hd.other_fields().get(&SORT_ORDER)?;
        so.to_str().ok()?.parse().ok()
    }

    /// Whether both headers describe the same reference dictionary.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.references == other.references
    }

    /// ID of the last program in the `@PG` chain: the one no other program names as `PP`.
    #[must_use]
    pub fn last_program_id(&self) -> Option<String> {
        let programs = self.sam.programs();
        let programs = programs.as_ref();
        let referenced: HashSet<&[u8]> = programs
            .values()
            .filter_map(|pg| pg.other_fields().get(&PREVIOUS_PROGRAM_ID))
            .map(|pp| pp.as_slice())
            .collect();
        programs
            .keys()
            .rfind(|id| !referenced.contains(id.as_slice()))
            .or_else(|| programs.keys().last())
            .map(ToString::to_string)
    }

    /// `base` if no program uses it, otherwise the first free `base.1`, `base.2`, ...
    #[must_use]
    pub fn unique_program_id(&self, base: &str) -> String {
        let programs = self.sam.programs();
        let programs = programs.as_ref();
        if !programs.contains_key(base.as_bytes()) {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{base}.{i}"))
            .find(|candidate| !programs.contains_key(candidate.as_bytes()))
            .unwrap_or_else(|| base.to_string())
    }

    /// Append an `@PG` line.
    ///
    /// # Arguments
    ///
    /// * `fields` - `(tag, value)` pairs; `ID` is required and must be unused
    ///
    /// When `PP` is not given, the program is chained to the current last program.
    pub fn add_program(&self, fields: &[(&str, &str)]) -> Result<Self> {
        for (tag, value) in fields {
            check_field(tag, value)?;
        }
        let id = fields
            .iter()
            .find(|(tag, _)| *tag == "ID")
            .map(|(_, value)| *value)
            .ok_or_else(|| BamError::validation("@PG line requires an ID field"))?;
        if id.is_empty() {
            return Err(BamError::validation("@PG ID must not be empty"));
        }
        if self.sam.programs().as_ref().contains_key(id.as_bytes()) {
            return Err(BamError::validation(format!("@PG ID '{id}' is already in use")));
        }

        let mut builder = Map::<Program>::builder();
        for (tag, value) in fields.iter().filter(|(tag, _)| *tag != "ID") {
            let key: [u8; 2] = tag
                .as_bytes()
                .try_into()
                .map_err(|_| BamError::validation(format!("invalid header field tag '{tag}'")))?;
            let key = map::tag::Other::try_from(key)
                .map_err(|_| BamError::validation(format!("invalid header field tag '{tag}'")))?;
            builder = builder.insert(key, *value);
        }
        if !fields.iter().any(|(tag, _)| *tag == "PP") {
            if let Some(previous) = self.last_program_id() {
                builder = builder.insert(PREVIOUS_PROGRAM_ID, previous);
            }
        }
        let program = builder
            .build()
            .map_err(|e| BamError::validation(format!("invalid @PG line '{id}': {e}")))?;

        let mut sam = self.sam.clone();
        sam.programs_mut()
            .add(BString::from(id), program)
            .map_err(|e| BamError::validation(format!("cannot add @PG line '{id}': {e}")))?;
        Self::from_sam(sam, self.references.clone())
    }

    /// Set `@HD SO` from its textual value.
    pub fn change_sort_order(&self, value: &str) -> Result<Self> {
        self.with_sort_order(value.parse()?)
    }

    /// Set `@HD SO`, creating an `@HD` line (`VN:1.6`) if the header has none.
    pub fn with_sort_order(&self, order: SortOrder) -> Result<Self> {
        let mut hd =
            self.sam.header().cloned().unwrap_or_else(|| Map::<map::Header>::new(default_version()));
        hd.other_fields_mut().insert(SORT_ORDER, BString::from(order.as_str()));

        let mut builder = sam::Header::builder().set_header(hd);
        for (name, reference) in self.sam.reference_sequences() {
            builder = builder.add_reference_sequence(name.clone(), reference.clone());
        }
        for (id, rg) in self.sam.read_groups() {
            builder = builder.add_read_group(id.clone(), rg.clone());
        }
        for (id, pg) in self.sam.programs().as_ref() {
            builder = builder.add_program(id.clone(), pg.clone());
        }
        for comment in self.sam.comments() {
            builder = builder.add_comment(comment.clone());
        }
        Self::from_sam(builder.build(), self.references.clone())
    }

    /// Render `sam` as the header text.
    fn from_sam(sam: sam::Header, references: Vec<Reference>) -> Result<Self> {
        let mut writer = sam::io::Writer::new(Vec::new());
        writer
            .write_header(&sam)
            .map_err(|e| BamError::validation(format!("cannot write header text: {e}")))?;
        Ok(Self { text: BString::from(writer.into_inner()), references, sam })
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = BamError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::parse(bytes)
    }
}

/// Parse header text, ignoring trailing NUL padding.
fn parse_text(text: &[u8]) -> Result<sam::Header> {
    let text = text
        .trim_end_with(|c| c == '\0')
        .to_str()
        .map_err(|e| BamError::format(format!("header text is not valid UTF-8: {e}")))?;
    text.parse::<sam::Header>()
        .map_err(|e| BamError::format(format!("malformed header text: {e}")))
}

/// A map's non-identifying fields as `(tag, value)` strings.
fn other_fields<'a, K>(
    fields: impl IntoIterator<Item = (&'a K, &'a BString)>,
) -> impl Iterator<Item = (String, String)>
where
    K: Borrow<[u8; 2]> + 'a,
{
    fields.into_iter().map(|(tag, value)| {
        let tag = <K as Borrow<[u8; 2]>>::borrow(tag);
        (String::from_utf8_lossy(tag).into_owned(), value.to_string())
    })
}

fn check_field(tag: &str, value: &str) -> Result<()> {
    let valid_tag = matches!(tag.as_bytes(), [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphanumeric());
    if !valid_tag {
        return Err(BamError::validation(format!("invalid header field tag '{tag}'")));
    }
    if value.contains(['\t', '\n', '\r']) {
        return Err(BamError::validation(format!(
            "header field {tag} value contains a tab or newline"
        )));
    }
    Ok(())
}

fn read_len<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(truncated(what))?;
    let n = i32::from_le_bytes(buf);
    usize::try_from(n).map_err(|_| BamError::format(format!("negative {what}: {n}")))
}

fn read_bytes<R: Read>(reader: &mut R, len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len as u64).read_to_end(&mut buf).map_err(truncated(what))?;
    if buf.len() < len {
        return Err(BamError::format(format!("truncated {what}: expected {len} bytes, got {}", buf.len())));
    }
    Ok(buf)
}

/// Builds a [`Header`] from scratch.
#[derive(Debug, Default)]
pub struct Builder {
    sort_order: Option<SortOrder>,
    references: Vec<Reference>,
    comments: Vec<String>,
}

impl Builder {
    /// Declare `@HD SO`.
    #[must_use]
    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = Some(order);
        self
    }

    /// Add a reference; it also gets an `@SQ` line.
    #[must_use]
    pub fn reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Add a `@CO` line.
    #[must_use]
    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comments.push(text.into());
        self
    }

    /// Build the header, rendering its text through noodles.
    ///
    /// # Errors
    ///
    /// Returns [`BamError::Validation`] for a zero-length reference or a comment that spans
    /// lines.
    pub fn build(self) -> Result<Header> {
        let mut hd = Map::<map::Header>::new(default_version());
        if let Some(order) = self.sort_order {
            hd.other_fields_mut().insert(SORT_ORDER, BString::from(order.as_str()));
        }

        let mut builder = sam::Header::builder().set_header(hd);
        for reference in &self.references {
            let length = NonZeroUsize::new(reference.length as usize).ok_or_else(|| {
                BamError::validation(format!("reference '{}' has zero length", reference.name))
            })?;
            builder = builder
                .add_reference_sequence(reference.name.as_str(), Map::<ReferenceSequence>::new(length));
        }
        for comment in self.comments {
            if comment.contains(['\n', '\r']) {
                return Err(BamError::validation("@CO text must be a single line"));
            }
            builder = builder.add_comment(comment);
        }
        Header::from_sam(builder.build(), self.references)
    }
}
