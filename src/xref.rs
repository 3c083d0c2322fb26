//! Cross-reference tables and streams.
//!
//! Parses classic `xref` tables and binary cross-reference streams from an
//! in-memory buffer, following `Prev` links back through incremental
//! updates. Entries in later sections win over earlier ones. A `Prev` chain
//! that revisits an offset is reported as [`Error::InvalidXref`] so that the
//! caller can fall back to reconstruction.
//!
//! The encoding half ([`encode_xref_stream`]) packs entries for the writer.

use crate::decoders::decode_stream_dict;
use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, skip_ws, token, Token};
use crate::object::{Dict, Object};
use crate::parser::{parse_indirect_object, parse_object_at};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::collections::{BTreeMap, HashSet};

/// How far back from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 2048;

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Object stored directly at a byte offset
    Uncompressed,
    /// Object packed inside an object stream
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed), container object number (compressed) or
    /// next free object (free)
    pub offset: u64,
    /// Generation (uncompressed, free) or index inside the container (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Object stored at a byte offset.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Object at `index` inside object stream `container`.
    pub fn compressed(container: u64, index: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: container,
            generation: index,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether this entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Cross-reference table that maps object numbers to their locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    /// Trailer dictionary (for xref streams, the stream dictionary)
    trailer: Option<Dict>,
}

impl CrossRefTable {
    /// Create a new empty cross-reference table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// Get the trailer dictionary if present.
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Add or replace an entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Entries ordered by object number.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> + '_ {
        self.entries.iter().map(|(n, e)| (*n, e))
    }

    /// Merge an older section into this one. Existing entries win, and the
    /// trailer is only taken if this table has none.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_xref_offset(buffer: &[u8]) -> Result<usize> {
    const KEYWORD: &[u8] = b"startxref";
    let window_start = buffer.len().saturating_sub(STARTXREF_WINDOW);
    let tail = &buffer[window_start..];

    let pos = tail
        .windows(KEYWORD.len())
        .rposition(|w| w == KEYWORD)
        .ok_or_else(|| Error::InvalidXref("startxref not found".to_string()))?;

    match token(&tail[pos + KEYWORD.len()..]) {
        Ok((_, Token::Integer(offset))) if offset >= 0 => Ok(offset as usize),
        _ => Err(Error::InvalidXref("startxref is not followed by an offset".to_string())),
    }
}

/// Parse the cross-reference section at `offset` and every section it
/// links to through `Prev` (and `XRefStm` in hybrid files).
pub fn parse_xref_chain(buffer: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut merged = CrossRefTable::new();
    let mut next = Some(offset);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            return Err(Error::InvalidXref(format!("Prev chain loops back to offset {}", offset)));
        }
        if offset >= buffer.len() {
            return Err(Error::InvalidXref(format!(
                "section offset {} is past end of file ({} bytes)",
                offset,
                buffer.len()
            )));
        }

        let mut section = parse_xref_section(buffer, offset)?;
        let trailer = section.trailer().cloned().unwrap_or_default();

        if let Some(stm_offset) = trailer.get("XRefStm").and_then(Object::as_integer) {
            let stm_offset = stm_offset as usize;
            if visited.insert(stm_offset) {
                match parse_xref_stream(buffer, stm_offset) {
                    Ok(hybrid) => {
                        // Hybrid files: the stream fills gaps the table leaves free
                        for (number, entry) in hybrid.iter() {
                            if section.get(number).map_or(true, |e| !e.in_use()) {
                                section.add_entry(number, *entry);
                            }
                        }
                    },
                    Err(e) => log::warn!("Ignoring unreadable XRefStm at {}: {}", stm_offset, e),
                }
            }
        }

        log::debug!("Read xref section at {} with {} entries", offset, section.len());
        merged.merge_from(section);

        next = trailer
            .get("Prev")
            .and_then(Object::as_integer)
            .and_then(|p| usize::try_from(p).ok());
    }

    Ok(merged)
}

/// Parse one section, detecting table vs stream.
fn parse_xref_section(buffer: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (rest, _) = skip_ws(&buffer[offset..])
        .map_err(|_| Error::InvalidXref(format!("unreadable section at {}", offset)))?;

    if rest.starts_with(b"xref") {
        parse_traditional_xref(buffer, offset)
    } else if rest.first().is_some_and(u8::is_ascii_digit) {
        parse_xref_stream(buffer, offset)
    } else {
        Err(Error::InvalidXref(format!("no xref keyword or stream at offset {}", offset)))
    }
}

/// Parse a classic table:
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000017 00000 n
/// 0000000081 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
pub fn parse_traditional_xref(buffer: &[u8], offset: usize) -> Result<CrossRefTable> {
    let invalid = |what: &str, at: &[u8]| {
        Error::InvalidXref(format!("{} at offset {}", what, buffer.len() - at.len()))
    };

    let (mut input, _) = skip_ws(&buffer[offset..]).map_err(|_| invalid("unreadable table", &buffer[offset..]))?;
    input = input
        .strip_prefix(b"xref")
        .ok_or_else(|| invalid("missing xref keyword", input))?;

    let mut table = CrossRefTable::new();

    loop {
        let (rest, _) = skip_ws(input).map_err(|_| invalid("unreadable table", input))?;
        input = rest;

        if input.starts_with(b"trailer") {
            let dict_at = buffer.len() - input.len() + b"trailer".len();
            let (trailer, _) = parse_object_at(buffer, dict_at)?;
            match trailer {
                Object::Dictionary(d) => table.set_trailer(d),
                _ => return Err(invalid("trailer is not a dictionary", input)),
            }
            return Ok(table);
        }

        let (rest, start) = match token(input) {
            Ok((rest, Token::Integer(n))) if n >= 0 => (rest, n as u64),
            _ => return Err(invalid("expected subsection start or trailer", input)),
        };
        let (rest, count) = match token(rest) {
            Ok((rest, Token::Integer(n))) if n >= 0 => (rest, n as u64),
            _ => return Err(invalid("expected subsection count", rest)),
        };
        // Each entry takes at least 18 bytes
        if count as usize > rest.len() / 18 + 1 {
            return Err(invalid("subsection count exceeds available data", rest));
        }
        input = rest;

        for i in 0..count {
            let (rest, entry_offset) = match token(input) {
                Ok((rest, Token::Integer(n))) if n >= 0 => (rest, n as u64),
                _ => return Err(invalid("malformed entry offset", input)),
            };
            let (rest, generation) = match token(rest) {
                Ok((rest, Token::Integer(n))) if (0..=65535).contains(&n) => (rest, n as u16),
                _ => return Err(invalid("malformed entry generation", rest)),
            };
            let (rest, _) = skip_ws(rest).map_err(|_| invalid("malformed entry", rest))?;
            let kind = rest.first().copied();
            if rest.get(1).is_some_and(|c| !is_whitespace(*c)) {
                return Err(invalid("malformed entry flag", rest));
            }

            let number = u32::try_from(start + i).map_err(|_| invalid("object number overflow", rest))?;
            match kind {
                Some(b'n') => table.add_entry(number, XRefEntry::uncompressed(entry_offset, generation)),
                Some(b'f') => table.add_entry(number, XRefEntry::free(entry_offset, generation)),
                _ => return Err(invalid("entry flag must be n or f", rest)),
            }
            input = &rest[1..];
        }
    }
}

/// Parse a binary cross-reference stream object at `offset`.
pub fn parse_xref_stream(buffer: &[u8], offset: usize) -> Result<CrossRefTable> {
    let parsed = parse_indirect_object(buffer, offset, false)?;
    let (dict, data) = match &parsed.object {
        Object::Stream { dict, data } => (dict, data),
        other => {
            return Err(Error::InvalidXref(format!(
                "object at {} is a {}, not an xref stream",
                offset,
                other.kind()
            )))
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "XRef" {
            return Err(Error::InvalidXref(format!("expected /Type /XRef, got /{}", type_name)));
        }
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| {
            w.iter()
                .filter_map(Object::as_integer)
                .filter_map(|n| usize::try_from(n).ok())
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|w| *w > 8) {
        return Err(Error::InvalidXref(format!("invalid /W {:?}", widths)));
    }

    let size = dict
        .get("Size")
        .and_then(Object::as_integer)
        .filter(|s| *s >= 0)
        .ok_or_else(|| Error::InvalidXref("xref stream has no /Size".to_string()))? as u64;

    let ranges: Vec<(u64, u64)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks(2)
            .filter_map(|pair| match pair {
                [start, count] => Some((start.as_integer()? as u64, count.as_integer()? as u64)),
                _ => None,
            })
            .collect(),
        None => vec![(0, size)],
    };

    let decoded = decode_stream_dict(dict, data)?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidXref("xref stream entry width is zero".to_string()));
    }
    let mut rows = decoded.chunks_exact(entry_size);

    let mut table = CrossRefTable::new();
    for (start, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("Xref stream at {} is truncated", offset);
                table.set_trailer(dict.clone());
                return Ok(table);
            };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            let entry_type = if widths[0] == 0 { 1 } else { read_field(f1) };
            let field2 = read_field(f2);
            let field3 = read_field(f3);

            let number = u32::try_from(start + i)
                .map_err(|_| Error::InvalidXref(format!("object number {} out of range", start + i)))?;
            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3 as u16),
                1 => XRefEntry::uncompressed(field2, field3 as u16),
                2 => XRefEntry::compressed(field2, field3 as u16),
                // Unknown types are treated as null references
                _ => continue,
            };
            table.add_entry(number, entry);
        }
    }

    table.set_trailer(dict.clone());
    Ok(table)
}

fn read_field(bytes: &[u8]) -> u64 {
    if bytes.is_empty() {
        0
    } else {
        BigEndian::read_uint(bytes, bytes.len())
    }
}

/// Bytes needed to hold `value` big-endian, at least one.
pub fn byte_width(value: u64) -> usize {
    (((64 - value.leading_zeros()) as usize + 7) / 8).max(1)
}

/// Encoded body of a cross-reference stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedXrefStream {
    /// Packed rows
    pub data: Vec<u8>,
    /// `/W` field widths
    pub widths: [usize; 3],
    /// `/Index` (start, count) runs
    pub index: Vec<(u32, u32)>,
}

/// Pack entries (sorted by object number) into xref stream rows.
///
/// Field widths are the smallest that hold the largest value in each column.
pub fn encode_xref_stream(entries: &[(u32, XRefEntry)]) -> Result<EncodedXrefStream> {
    let fields: Vec<(u64, u64, u64)> = entries
        .iter()
        .map(|(_, e)| {
            let kind = match e.entry_type {
                XRefEntryType::Free => 0,
                XRefEntryType::Uncompressed => 1,
                XRefEntryType::Compressed => 2,
            };
            (kind, e.offset, e.generation as u64)
        })
        .collect();

    let widths = [
        1,
        byte_width(fields.iter().map(|f| f.1).max().unwrap_or(0)),
        byte_width(fields.iter().map(|f| f.2).max().unwrap_or(0)),
    ];

    let mut data = Vec::with_capacity(entries.len() * widths.iter().sum::<usize>());
    for (kind, f2, f3) in &fields {
        data.write_uint::<BigEndian>(*kind, widths[0])?;
        data.write_uint::<BigEndian>(*f2, widths[1])?;
        data.write_uint::<BigEndian>(*f3, widths[2])?;
    }

    let mut index: Vec<(u32, u32)> = Vec::new();
    for (number, _) in entries {
        match index.last_mut() {
            Some((start, count)) if *start + *count == *number => *count += 1,
            _ => index.push((*number, 1)),
        }
    }

    Ok(EncodedXrefStream { data, widths, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::flate_encode;
    use crate::object::ObjectRef;

    #[test]
    fn test_find_xref_offset() {
        let buf = b"%PDF-1.4\n...\nstartxref\n1234\n%%EOF\n";
        assert_eq!(find_xref_offset(buf).unwrap(), 1234);
    }

    #[test]
    fn test_find_xref_offset_cr_only() {
        assert_eq!(find_xref_offset(b"junk\rstartxref\r77\r%%EOF").unwrap(), 77);
    }

    #[test]
    fn test_find_xref_offset_uses_last() {
        let buf = b"startxref\n10\n%%EOF\nstartxref\n20\n%%EOF";
        assert_eq!(find_xref_offset(buf).unwrap(), 20);
    }

    #[test]
    fn test_find_xref_offset_missing() {
        assert!(matches!(find_xref_offset(b"%PDF-1.4\n%%EOF"), Err(Error::InvalidXref(_))));
    }

    #[test]
    fn test_parse_traditional_table() {
        let buf = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \n\
                    trailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF";
        let table = parse_xref_chain(buf, 0).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0).unwrap().entry_type, XRefEntryType::Free);
        assert_eq!(table.get(1), Some(&XRefEntry::uncompressed(17, 0)));
        assert_eq!(table.get(2), Some(&XRefEntry::uncompressed(81, 0)));
        assert_eq!(
            table.trailer().unwrap().get("Root"),
            Some(&Object::Reference(ObjectRef::new(1, 0)))
        );
    }

    #[test]
    fn test_parse_multiple_subsections_and_crlf() {
        let buf = b"xref\r\n0 1\r\n0000000000 65535 f\r\n4 2\r\n0000000100 00000 n\r\n0000000200 00001 n\r\ntrailer<</Size 6>>";
        let table = parse_traditional_xref(buf, 0).unwrap();
        assert_eq!(table.get(4), Some(&XRefEntry::uncompressed(100, 0)));
        assert_eq!(table.get(5), Some(&XRefEntry::uncompressed(200, 1)));
        assert!(table.get(1).is_none());
    }

    #[test]
    fn test_invalid_flag() {
        let buf = b"xref\n0 1\n0000000000 65535 x \ntrailer\n<<>>";
        assert!(parse_traditional_xref(buf, 0).is_err());
    }

    #[test]
    fn test_excessive_count() {
        let buf = b"xref\n0 999999\n0000000000 65535 f \ntrailer\n<<>>";
        assert!(parse_traditional_xref(buf, 0).is_err());
    }

    #[test]
    fn test_prev_chain_newer_entries_win() {
        // Older section at 0, newer at `newer` pointing back with Prev 0
        let older = b"xref\n0 2\n0000000000 65535 f \n0000000010 00000 n \ntrailer\n<< /Size 2 >>\n";
        let mut buf = older.to_vec();
        let newer = buf.len();
        buf.extend_from_slice(
            b"xref\n1 1\n0000000099 00000 n \ntrailer\n<< /Size 2 /Prev 0 /Root 1 0 R >>\n",
        );
        let table = parse_xref_chain(&buf, newer).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::uncompressed(99, 0)));
        assert!(table.get(0).is_some());
        assert!(table.trailer().unwrap().contains_key("Root"));
    }

    #[test]
    fn test_prev_cycle_is_detected() {
        let buf = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        match parse_xref_chain(buf, 0) {
            Err(Error::InvalidXref(msg)) => assert!(msg.contains("loops")),
            other => panic!("expected InvalidXref, got {:?}", other),
        }
    }

    #[test]
    fn test_offset_past_end() {
        assert!(parse_xref_chain(b"xref", 50).is_err());
    }

    #[test]
    fn test_encode_then_parse_xref_stream() {
        let entries = vec![
            (0, XRefEntry::free(0, 65535)),
            (1, XRefEntry::uncompressed(15, 0)),
            (2, XRefEntry::compressed(3, 0)),
            (3, XRefEntry::uncompressed(70000, 0)),
            (7, XRefEntry::compressed(3, 1)),
        ];
        let encoded = encode_xref_stream(&entries).unwrap();
        assert_eq!(encoded.widths, [1, 3, 2]);
        assert_eq!(encoded.index, vec![(0, 4), (7, 1)]);

        let compressed = flate_encode(&encoded.data).unwrap();
        let mut buf = format!(
            "9 0 obj\n<< /Type /XRef /Size 8 /W [1 3 2] /Index [0 4 7 1] /Filter /FlateDecode /Length {} >>\nstream\n",
            compressed.len()
        )
        .into_bytes();
        buf.extend_from_slice(&compressed);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        let table = parse_xref_chain(&buf, 0).unwrap();
        for (number, entry) in &entries {
            assert_eq!(table.get(*number), Some(entry));
        }
    }

    #[test]
    fn test_byte_width() {
        assert_eq!(byte_width(0), 1);
        assert_eq!(byte_width(255), 1);
        assert_eq!(byte_width(256), 2);
        assert_eq!(byte_width(70000), 3);
    }
}
