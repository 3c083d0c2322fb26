//! Populate a [`Context`] from raw PDF bytes.
//!
//! The fast path trusts the file's own cross-reference data: `startxref`,
//! the `Prev` chain and any object streams it points into. When that data is
//! not self-consistent (missing `startxref`, a `Prev` cycle, offsets that do
//! not land on the object they claim) the whole table is rebuilt by
//! [`xref_reconstruction`](crate::xref_reconstruction) instead.
//!
//! Object streams and cross-reference streams are consumed while loading
//! and never end up in the context; the writer regenerates them.
//!
//! ```
//! use pdf_graph::document_parser::parse_document;
//! use pdf_graph::parser_config::ParseOptions;
//!
//! let pdf = b"%PDF-1.4\n1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n\
//!             2 0 obj << /Type /Pages /Kids [] /Count 0 >> endobj\n";
//! // No xref at all: loaded through recovery
//! let parsed = parse_document(pdf, ParseOptions::default()).unwrap();
//! assert!(parsed.recovered);
//! assert_eq!(parsed.context.object_count(), 2);
//! ```

use crate::context::{Context, TrailerInfo};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_header, parse_indirect_header, parse_indirect_object, parse_indirect_object_with};
use crate::parser_config::ParseOptions;
use crate::xref::{find_xref_offset, parse_xref_chain, CrossRefTable, XRefEntryType};
use crate::xref_reconstruction::{reconstruct, strict_error};
use std::collections::{BTreeMap, HashMap};

/// A malformed object that was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Byte offset of the object (or its container)
    pub offset: usize,
    /// What went wrong
    pub message: String,
}

/// Result of [`parse_document`].
#[derive(Debug)]
pub struct ParsedDocument {
    /// The populated object table
    pub context: Context,
    /// Objects skipped in lenient mode
    pub diagnostics: Vec<Diagnostic>,
    /// Whether the recovery path produced the table
    pub recovered: bool,
}

/// Outcome of the fast path.
enum FastPath {
    Loaded(BTreeMap<ObjectRef, Object>, Dict),
    /// The table cannot be trusted; rebuild it by scanning
    Unusable(Error),
}

/// Parse `buffer` into a context.
///
/// Fails only when there is no header, when strict mode meets a malformed
/// object, or when no objects can be found at all.
pub fn parse_document(buffer: &[u8], options: ParseOptions) -> Result<ParsedDocument> {
    let (version, header_offset) = parse_header(buffer)?;
    log::debug!("PDF version {} (header at {})", version, header_offset);

    let mut diagnostics = Vec::new();
    let (objects, trailer, recovered) = match load_from_xref(buffer, &options, &mut diagnostics)? {
        FastPath::Loaded(objects, trailer) => (objects, trailer, false),
        FastPath::Unusable(reason) => {
            log::warn!("Cross-reference data unusable ({}), reconstructing", reason);
            diagnostics.clear();
            let rebuilt = reconstruct(buffer, &options, &mut diagnostics)?;
            (rebuilt.objects, rebuilt.trailer, true)
        },
    };

    let mut context = Context::new();
    context.version = version;
    for (reference, object) in objects {
        context.assign(reference, object);
    }
    context.trailer_info = trailer_info(&trailer);

    log::info!(
        "Loaded {} objects ({} diagnostics{})",
        context.object_count(),
        diagnostics.len(),
        if recovered { ", recovered" } else { "" }
    );

    Ok(ParsedDocument {
        context,
        diagnostics,
        recovered,
    })
}

fn trailer_info(trailer: &Dict) -> TrailerInfo {
    TrailerInfo {
        root: trailer.get("Root").and_then(Object::as_reference),
        info: trailer.get("Info").and_then(Object::as_reference),
        encrypt: trailer.get("Encrypt").filter(|e| !e.is_null()).cloned(),
        id: trailer.get("ID").cloned(),
    }
}

/// Objects that only carry file structure.
fn is_structural(object: &Object) -> bool {
    object.has_type("ObjStm") || object.has_type("XRef")
}

fn load_from_xref(buffer: &[u8], options: &ParseOptions, diagnostics: &mut Vec<Diagnostic>) -> Result<FastPath> {
    let table = match find_xref_offset(buffer).and_then(|offset| parse_xref_chain(buffer, offset)) {
        Ok(table) => table,
        Err(e) => return Ok(FastPath::Unusable(e)),
    };

    let trailer = match table.trailer() {
        Some(t) if t.get("Root").and_then(Object::as_reference).is_some() => t.clone(),
        _ => return Ok(FastPath::Unusable(Error::InvalidXref("trailer has no Root".to_string()))),
    };

    let mut objects = BTreeMap::new();
    if let Err(e) = load_uncompressed(buffer, &table, options, diagnostics, &mut objects)? {
        return Ok(FastPath::Unusable(e));
    }
    if let Err(e) = load_compressed(&table, options, diagnostics, &mut objects)? {
        return Ok(FastPath::Unusable(e));
    }

    objects.retain(|_, object| !is_structural(object));
    Ok(FastPath::Loaded(objects, trailer))
}

/// Record a malformed object, or fail in strict mode.
fn skip_malformed(
    options: &ParseOptions,
    diagnostics: &mut Vec<Diagnostic>,
    offset: usize,
    message: String,
    err: Error,
) -> Result<()> {
    if options.strict {
        return Err(err);
    }
    log::warn!("Skipping malformed object at {}: {}", offset, message);
    diagnostics.push(Diagnostic { offset, message });
    if options.should_continue(diagnostics.len()) {
        Ok(())
    } else {
        Err(err)
    }
}

/// The outer result is fatal; the inner error means the table is unusable.
fn load_uncompressed(
    buffer: &[u8],
    table: &CrossRefTable,
    options: &ParseOptions,
    diagnostics: &mut Vec<Diagnostic>,
    objects: &mut BTreeMap<ObjectRef, Object>,
) -> Result<std::result::Result<(), Error>> {
    for (number, entry) in table.iter() {
        if entry.entry_type != XRefEntryType::Uncompressed {
            continue;
        }
        let offset = entry.offset as usize;
        let expected = ObjectRef::new(number, entry.generation);

        match parse_indirect_header(buffer, offset) {
            Ok((found, _)) if found == expected => {},
            Ok((found, _)) => {
                return Ok(Err(Error::InvalidXref(format!(
                    "offset {} holds {} instead of {}",
                    offset, found, expected
                ))))
            },
            Err(e) => return Ok(Err(e)),
        }

        match parse_indirect_object_with(buffer, offset, options.strict, &|r| length_from_table(buffer, table, r)) {
            Ok(parsed) => {
                objects.insert(expected, parsed.object);
            },
            Err(e) => {
                let message = format!("object {}: {}", expected, e);
                skip_malformed(options, diagnostics, offset, message, strict_error(buffer, offset, e))?;
                objects.insert(expected, Object::Null);
            },
        }
    }
    Ok(Ok(()))
}

/// Resolve an indirect stream `Length` by parsing its target in place.
fn length_from_table(buffer: &[u8], table: &CrossRefTable, reference: ObjectRef) -> Option<i64> {
    let entry = table.get(reference.id)?;
    if entry.entry_type != XRefEntryType::Uncompressed || entry.generation != reference.gen {
        return None;
    }
    let parsed = parse_indirect_object(buffer, entry.offset as usize, false).ok()?;
    if parsed.reference != reference {
        return None;
    }
    parsed.object.as_integer()
}

fn load_compressed(
    table: &CrossRefTable,
    options: &ParseOptions,
    diagnostics: &mut Vec<Diagnostic>,
    objects: &mut BTreeMap<ObjectRef, Object>,
) -> Result<std::result::Result<(), Error>> {
    let mut unpacked: HashMap<u32, Vec<(u32, Result<Object>)>> = HashMap::new();

    for (number, entry) in table.iter() {
        if entry.entry_type != XRefEntryType::Compressed {
            continue;
        }
        let Ok(container) = u32::try_from(entry.offset) else {
            return Ok(Err(Error::InvalidXref(format!(
                "object {} points at container {}",
                number, entry.offset
            ))));
        };

        if !unpacked.contains_key(&container) {
            let Some(stream) = objects.get(&ObjectRef::new(container, 0)) else {
                return Ok(Err(Error::InvalidXref(format!(
                    "object {} lives in missing object stream {}",
                    number, container
                ))));
            };
            let offset = table.get(container).map_or(0, |e| e.offset as usize);
            let entries = match parse_object_stream(stream) {
                Ok(entries) => entries,
                Err(e) => {
                    let message = format!("object stream {}: {}", container, e);
                    skip_malformed(options, diagnostics, offset, message, e)?;
                    Vec::new()
                },
            };
            log::debug!("Unpacked object stream {} ({} objects)", container, entries.len());
            unpacked.insert(container, entries);
        }

        let Some(entries) = unpacked.get_mut(&container) else { continue };
        let index = entry.generation as usize;
        // The index normally matches; fall back to searching by number
        let position = match entries.get(index) {
            Some((n, _)) if *n == number => Some(index),
            _ => entries.iter().position(|(n, _)| *n == number),
        };

        let reference = ObjectRef::new(number, 0);
        match position.map(|i| std::mem::replace(&mut entries[i].1, Ok(Object::Null))) {
            Some(Ok(object)) => {
                objects.insert(reference, object);
            },
            Some(Err(e)) => {
                let message = format!("object {} in object stream {}: {}", reference, container, e);
                skip_malformed(options, diagnostics, 0, message, e)?;
                objects.insert(reference, Object::Null);
            },
            None => log::warn!("Object {} not found in object stream {}", reference, container),
        }
    }
    Ok(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a classic file with a correct xref table.
    fn classic(bodies: &[&str], trailer: &str) -> Vec<u8> {
        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in bodies.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
        for off in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
        }
        out.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref).as_bytes());
        out
    }

    #[test]
    fn test_fast_path() {
        let pdf = classic(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "<< /Size 3 /Root 1 0 R /ID [<01> <02>] >>",
        );
        let parsed = parse_document(&pdf, ParseOptions::default()).unwrap();
        assert!(!parsed.recovered);
        assert_eq!(parsed.context.object_count(), 2);
        assert_eq!(parsed.context.trailer_info.root, Some(ObjectRef::new(1, 0)));
        assert!(parsed.context.trailer_info.id.is_some());
        assert_eq!(parsed.context.version, "1.4");
    }

    #[test]
    fn test_bad_offset_triggers_recovery() {
        let mut pdf = classic(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "<< /Size 3 /Root 1 0 R >>",
        );
        // Shift every offset by inserting a comment after the header
        pdf.splice(9..9, b"%junk\n".iter().copied());
        let parsed = parse_document(&pdf, ParseOptions::default()).unwrap();
        assert!(parsed.recovered);
        assert_eq!(parsed.context.object_count(), 2);
        assert_eq!(parsed.context.trailer_info.root, Some(ObjectRef::new(1, 0)));
    }

    #[test]
    fn test_malformed_body_lenient_and_strict() {
        let pdf = classic(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>", "<< /A ) >>"],
            "<< /Size 4 /Root 1 0 R >>",
        );
        let parsed = parse_document(&pdf, ParseOptions::lenient()).unwrap();
        assert!(!parsed.recovered);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.context.get(ObjectRef::new(3, 0)), Some(&Object::Null));

        let err = parse_document(&pdf, ParseOptions::strict()).unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_indirect_stream_length() {
        let pdf = classic(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Length 4 0 R >>\nstream\nBT (endstream) Tj ET\nendstream",
                "20",
            ],
            "<< /Size 5 /Root 1 0 R >>",
        );
        let parsed = parse_document(&pdf, ParseOptions::strict()).unwrap();
        assert!(!parsed.recovered);
        assert!(parsed.diagnostics.is_empty());
        let stream = parsed.context.get(ObjectRef::new(3, 0)).unwrap();
        assert_eq!(&stream.encoded_stream_data().unwrap()[..], b"BT (endstream) Tj ET");
    }

    #[test]
    fn test_missing_header() {
        let err = parse_document(b"1 0 obj null endobj", ParseOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingHeader { .. }));
    }

    #[test]
    fn test_encrypt_is_recorded() {
        let pdf = classic(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>", "<< /Filter /Standard >>"],
            "<< /Size 4 /Root 1 0 R /Encrypt 3 0 R >>",
        );
        let parsed = parse_document(&pdf, ParseOptions::default()).unwrap();
        assert_eq!(
            parsed.context.trailer_info.encrypt,
            Some(Object::Reference(ObjectRef::new(3, 0)))
        );
    }
}
