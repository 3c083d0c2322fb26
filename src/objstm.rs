//! Object streams (`/Type /ObjStm`).
//!
//! An object stream packs many small objects into one compressed container:
//!
//! ```text
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 15 12 28          % (object number, offset from First) pairs
//! << /Type /Page ... >>     % object 10
//! [ 1 2 3 ]                 % object 11
//! ...
//! endstream
//! ```
//!
//! Unpacking is used by the parser for compressed xref entries; packing is
//! used by the writer in object-stream mode.

use crate::decoders::flate_encode;
use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object, ObjectKind, ObjectRef};
use crate::parser::{error_at, parse_object};
use crate::writer::ObjectSerializer;
use bytes::Bytes;

/// Upper bound on `/N`, far beyond anything a real producer writes.
const MAX_OBJECTS_PER_STREAM: i64 = 1_000_000;

/// Unpack an object stream.
///
/// Returns one entry per header pair, in header order, so that the index of
/// an entry matches the index recorded in compressed xref entries. Entries
/// whose body fails to parse carry the error instead of aborting the rest.
pub fn parse_object_stream(stream_obj: &Object) -> Result<Vec<(u32, Result<Object>)>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::UnexpectedObjectKind {
                expected: ObjectKind::Stream,
                found: other.kind(),
            })
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(Object::as_name) {
        if type_name != "ObjStm" {
            return Err(Error::Decode(format!("expected /Type /ObjStm, got /Type /{}", type_name)));
        }
    }

    let n = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| (0..=MAX_OBJECTS_PER_STREAM).contains(n))
        .ok_or_else(|| Error::Decode("object stream has no valid /N".to_string()))? as usize;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .and_then(|f| usize::try_from(f).ok())
        .ok_or_else(|| Error::Decode("object stream has no valid /First".to_string()))?;

    let decoded = stream_obj.decode_stream_data()?;
    if decoded.len() < first {
        return Err(Error::Decode(format!(
            "object stream data too short: {} bytes, /First is {}",
            decoded.len(),
            first
        )));
    }

    let pairs = parse_object_number_pairs(&decoded[..first], n)?;
    let body = &decoded[first..];

    let entries = pairs
        .into_iter()
        .map(|(number, offset)| {
            let parsed = match body.get(offset..) {
                Some(data) => parse_object(data).map(|(_, obj)| obj).map_err(|e| error_at(body, e)),
                None => Err(Error::Decode(format!(
                    "object {} offset {} is beyond stream data length {}",
                    number,
                    offset,
                    body.len()
                ))),
            };
            (number, parsed)
        })
        .collect();

    Ok(entries)
}

/// Read `count` (object number, offset) pairs.
fn parse_object_number_pairs(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count.min(4096));
    let mut input = data;

    for i in 0..count {
        let (rest, number) = match token(input) {
            Ok((rest, Token::Integer(n))) if n >= 0 => (rest, n),
            _ => {
                return Err(Error::Decode(format!(
                    "object stream header ends after {} of {} pairs",
                    i, count
                )))
            },
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(o))) if o >= 0 => (rest, o),
            _ => {
                return Err(Error::Decode(format!(
                    "object stream header has no offset for object {}",
                    number
                )))
            },
        };
        let number = u32::try_from(number)
            .map_err(|_| Error::Decode(format!("object number {} out of range", number)))?;
        pairs.push((number, offset as usize));
        input = rest;
    }

    Ok(pairs)
}

/// Pack objects into a Flate-compressed object stream.
///
/// Streams cannot live inside object streams; callers must filter them out.
pub fn pack_object_stream(objects: &[(ObjectRef, &Object)], serializer: &ObjectSerializer) -> Result<Object> {
    let mut header = Vec::new();
    let mut body = Vec::new();

    for (i, (reference, object)) in objects.iter().enumerate() {
        if i > 0 {
            header.push(b' ');
        }
        header.extend_from_slice(format!("{} {}", reference.id, body.len()).as_bytes());
        serializer.write_object(&mut body, object);
        body.push(b'\n');
    }
    header.push(b'\n');

    let first = header.len();
    header.extend_from_slice(&body);
    let compressed = flate_encode(&header)?;

    let mut dict = Dict::new();
    dict.insert("Type".to_string(), Object::name("ObjStm"));
    dict.insert("N".to_string(), Object::from(objects.len()));
    dict.insert("First".to_string(), Object::from(first));
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    dict.insert("Length".to_string(), Object::from(compressed.len()));

    Ok(Object::Stream {
        dict,
        data: Bytes::from(compressed),
    })
}
