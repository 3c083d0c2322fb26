//! Object table reconstruction for damaged PDFs.
//!
//! When the cross-reference data is missing or inconsistent, the buffer is
//! scanned for `N G obj` headers and every object found is parsed directly.
//! Later definitions of the same object replace earlier ones, the way an
//! incremental update would. Object streams met along the way are unpacked;
//! their contents never override a direct definition.
//!
//! The scan runs in batches of [`ParseOptions::scan_budget`] headers. After
//! each batch the scan stops early if a catalog is known and every reference
//! reachable from it already resolves. A budget of `usize::MAX` reads the
//! whole buffer in one batch.

use crate::document_parser::Diagnostic;
use crate::error::{Error, Position, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{parse_indirect_object_with, parse_object_at};
use crate::parser_config::ParseOptions;
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::{BTreeMap, HashSet};

lazy_static! {
    /// `N G obj` object headers
    static ref RE_OBJ_HEADER: Option<Regex> = Regex::new(r"(?-u:\b)(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj(?-u:\b)").ok();

    /// `trailer <<`
    static ref RE_TRAILER: Option<Regex> = Regex::new(r"trailer[ \t\r\n\f\x00]*<<").ok();
}

/// Objects recovered by scanning.
#[derive(Debug, Default)]
pub struct Reconstruction {
    /// Every object found, direct definitions first
    pub objects: BTreeMap<ObjectRef, Object>,
    /// Trailer found in the file, or synthesized around a catalog
    pub trailer: Dict,
    /// Whether the whole buffer was scanned
    pub complete_scan: bool,
}

/// Rebuild the object table by scanning `buffer`.
///
/// Malformed objects are recorded in `diagnostics` and stored as `null`
/// unless `options.strict` is set, in which case the first one is fatal.
pub fn reconstruct(
    buffer: &[u8],
    options: &ParseOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Reconstruction> {
    let header_re = RE_OBJ_HEADER
        .as_ref()
        .ok_or_else(|| Error::InvalidXref("object header pattern failed to compile".to_string()))?;

    log::info!("Reconstructing object table by scanning {} bytes", buffer.len());

    let budget = options.scan_budget.max(1);
    let mut direct: BTreeMap<ObjectRef, Object> = BTreeMap::new();
    let mut compressed: BTreeMap<ObjectRef, Object> = BTreeMap::new();
    let mut xref_dicts: Vec<Dict> = Vec::new();
    let mut skip_until = 0;
    let mut in_batch = 0;
    let mut complete_scan = true;

    for caps in header_re.captures_iter(buffer) {
        let Some(whole) = caps.get(0) else { continue };
        let start = whole.start();
        if start < skip_until {
            // Header text inside an object already read, e.g. stream data
            continue;
        }

        // Only lengths defined earlier in the file can be resolved here
        let length_of = |r: ObjectRef| direct.get(&r).and_then(Object::as_integer);
        match parse_indirect_object_with(buffer, start, options.strict, &length_of) {
            Ok(parsed) => {
                skip_until = parsed.end;
                let type_name = parsed
                    .object
                    .as_dict()
                    .and_then(|d| d.get("Type"))
                    .and_then(Object::as_name)
                    .map(str::to_owned);
                match type_name.as_deref() {
                    Some("ObjStm") => unpack_into(&parsed.object, &mut compressed, start, options, diagnostics)?,
                    Some("XRef") => {
                        if let Some(d) = parsed.object.as_dict() {
                            xref_dicts.push(d.clone());
                        }
                    },
                    _ => {
                        direct.insert(parsed.reference, parsed.object);
                    },
                }
            },
            Err(e) => {
                let reference = header_ref(&caps);
                if options.strict {
                    return Err(strict_error(buffer, start, e));
                }
                diagnostics.push(Diagnostic {
                    offset: start,
                    message: format!("object {}: {}", reference.map_or("?".to_string(), |r| r.to_string()), e),
                });
                if !options.should_continue(diagnostics.len()) {
                    return Err(e);
                }
                if let Some(reference) = reference {
                    direct.entry(reference).or_insert(Object::Null);
                }
                skip_until = whole.end();
            },
        }

        in_batch += 1;
        if in_batch >= budget {
            in_batch = 0;
            if compressed.is_empty() && graph_is_complete(&direct) {
                log::info!("Stopping scan at offset {}: catalog and its references resolved", start);
                complete_scan = false;
                break;
            }
        }
    }

    if direct.is_empty() && compressed.is_empty() {
        return Err(Error::Parsing {
            pos: Position::at(buffer, buffer.len()),
            details: "no objects found while reconstructing".to_string(),
        });
    }

    let direct_ids: HashSet<u32> = direct.keys().map(|r| r.id).collect();
    let mut objects = direct;
    for (reference, object) in compressed {
        if !direct_ids.contains(&reference.id) {
            objects.insert(reference, object);
        }
    }

    let trailer = find_trailer(buffer, &xref_dicts, &objects);
    log::info!(
        "Reconstructed {} objects (root {:?}, full scan: {})",
        objects.len(),
        trailer.get("Root"),
        complete_scan
    );

    Ok(Reconstruction {
        objects,
        trailer,
        complete_scan,
    })
}

fn header_ref(caps: &regex::bytes::Captures<'_>) -> Option<ObjectRef> {
    let number = |i| {
        caps.get(i)
            .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
            .and_then(|s| s.parse::<u64>().ok())
    };
    let id = u32::try_from(number(1)?).ok()?;
    let gen = u16::try_from(number(2)?).ok()?;
    Some(ObjectRef::new(id, gen))
}

/// Strict mode keeps positioned parse errors and wraps anything else.
pub(crate) fn strict_error(buffer: &[u8], offset: usize, err: Error) -> Error {
    if err.is_parse_error() {
        err
    } else {
        log::debug!("Invalid object at {}: {}", offset, err);
        Error::InvalidObjectParsing {
            pos: Position::at(buffer, offset),
        }
    }
}

fn unpack_into(
    container: &Object,
    into: &mut BTreeMap<ObjectRef, Object>,
    offset: usize,
    options: &ParseOptions,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    let entries = match parse_object_stream(container) {
        Ok(entries) => entries,
        Err(e) if !options.strict => {
            diagnostics.push(Diagnostic {
                offset,
                message: format!("unreadable object stream: {}", e),
            });
            return Ok(());
        },
        Err(e) => return Err(e),
    };

    for (number, parsed) in entries {
        match parsed {
            Ok(object) => {
                into.insert(ObjectRef::new(number, 0), object);
            },
            Err(e) if !options.strict => diagnostics.push(Diagnostic {
                offset,
                message: format!("object {} in object stream: {}", number, e),
            }),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// The last catalog defined in `objects`.
fn find_catalog(objects: &BTreeMap<ObjectRef, Object>) -> Option<ObjectRef> {
    objects
        .iter()
        .filter(|(_, o)| o.has_type("Catalog"))
        .map(|(r, _)| *r)
        .last()
}

/// Whether a catalog exists and everything it reaches resolves.
fn graph_is_complete(objects: &BTreeMap<ObjectRef, Object>) -> bool {
    let Some(root) = find_catalog(objects) else {
        return false;
    };

    let mut seen = HashSet::new();
    let mut pending = vec![root];
    while let Some(reference) = pending.pop() {
        if !seen.insert(reference) {
            continue;
        }
        let Some(object) = objects.get(&reference) else {
            return false;
        };
        collect_refs(object, &mut pending);
    }
    true
}

fn collect_refs(object: &Object, out: &mut Vec<ObjectRef>) {
    match object {
        Object::Reference(r) => out.push(*r),
        Object::Array(items) => items.iter().for_each(|i| collect_refs(i, out)),
        Object::Dictionary(dict) | Object::Stream { dict, .. } | Object::ContentStream { dict, .. } => {
            dict.values().for_each(|v| collect_refs(v, out))
        },
        _ => {},
    }
}

/// Prefer the last `trailer` dictionary, then the last xref stream
/// dictionary. A Root that does not resolve to a catalog is replaced by the
/// last catalog found.
fn find_trailer(buffer: &[u8], xref_dicts: &[Dict], objects: &BTreeMap<ObjectRef, Object>) -> Dict {
    let from_keyword = RE_TRAILER.as_ref().and_then(|re| {
        re.find_iter(buffer).filter_map(|m| {
            let dict_start = m.end() - 2;
            match parse_object_at(buffer, dict_start) {
                Ok((Object::Dictionary(d), _)) => Some(d),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Unreadable trailer at {}: {}", m.start(), e);
                    None
                },
            }
        })
        .last()
    });

    let mut trailer = from_keyword
        .or_else(|| xref_dicts.last().cloned())
        .unwrap_or_default();

    let root_ok = trailer
        .get("Root")
        .and_then(Object::as_reference)
        .and_then(|r| objects.get(&r))
        .is_some_and(|o| o.as_dict().is_some());

    if !root_ok {
        match find_catalog(objects) {
            Some(catalog) => {
                log::warn!("Trailer has no usable Root, using catalog {}", catalog);
                trailer.insert("Root".to_string(), Object::Reference(catalog));
            },
            None => log::warn!("No catalog found while reconstructing"),
        }
    }

    trailer
}
