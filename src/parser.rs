//! PDF object parser.
//!
//! Combines lexer tokens into complete objects: arrays, dictionaries,
//! streams, indirect references and `N G obj ... endobj` definitions.
//!
//! # Architecture
//!
//! The direct-object grammar is recursive descent over nom `IResult`s.
//! Entry points that work on a whole file buffer ([`parse_indirect_object`],
//! [`parse_object_at`], [`parse_header`]) convert nom failures into
//! [`Error`] values carrying a [`Position`] relative to that buffer.

use crate::error::{Error, Position, Result};
use crate::lexer::{skip_ws, token, Token};
use crate::object::{Dict, Object, ObjectRef, PdfString};
use bytes::Bytes;
use nom::error::ErrorKind;
use nom::IResult;

/// Deepest array/dictionary nesting accepted before giving up.
pub const MAX_NESTING_DEPTH: u32 = 256;

/// How far into the buffer the `%PDF-` header may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Decode escape sequences in a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd` (one to three digits,
/// overflow wraps to a byte) and line continuations (`\` followed by CR,
/// LF or CRLF). Unknown escapes drop the backslash.
///
/// ```
/// # use pdf_graph::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"Section \\247 1"), b"Section \xa7 1");
/// assert_eq!(decode_literal_string_escapes(b"a\\\nb"), b"ab");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let c = raw[i];
        if c != b'\\' || i + 1 >= raw.len() {
            out.push(c);
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'(' | b')' | b'\\' => out.push(next),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = (next - b'0') as u32;
                let mut taken = 1;
                while taken < 3 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = value * 8 + (d - b'0') as u32;
                            i += 1;
                            taken += 1;
                        },
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            },
            other => out.push(other),
        }
    }

    out
}

/// Decode a hex string body to bytes.
///
/// Whitespace is ignored and an odd trailing digit is padded with `0`.
///
/// ```
/// use pdf_graph::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"4 8 6").unwrap(), b"H`");
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !crate::lexer::is_whitespace(*c))
        .collect();
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair)
                .map_err(|_| Error::Decode("hex string is not ASCII".to_string()))?;
            u8::from_str_radix(text, 16)
                .map_err(|_| Error::Decode(format!("invalid hex digits: {:?}", text)))
        })
        .collect()
}

/// Parse one direct object (including a stream, if a dictionary is followed
/// by the `stream` keyword).
///
/// ```
/// use pdf_graph::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Page /Kids [ 1 0 R ] >>").unwrap();
/// assert!(obj.has_type("Page"));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_nested(input, 0)
}

fn parse_nested(input: &[u8], depth: u32) -> IResult<&[u8], Object> {
    if depth > MAX_NESTING_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::TooLarge)));
    }

    let (input, _) = skip_ws(input)?;
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::Name(name) => Ok((rest, Object::Name(name))),

        Token::Integer(id) => {
            // `N G R` is a reference; anything else leaves a plain integer
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(id), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Integer(id)))
        },

        Token::LiteralString(raw) => Ok((
            rest,
            Object::String(PdfString::literal(decode_literal_string_escapes(raw))),
        )),

        Token::HexString(raw) => match decode_hex(raw) {
            Ok(bytes) => Ok((rest, Object::String(PdfString::hex(bytes)))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::HexDigit))),
        },

        Token::ArrayStart => parse_array(rest, depth + 1),

        Token::DictStart => {
            let (after_dict, dict) = parse_dictionary(rest, depth + 1)?;
            match token(after_dict) {
                Ok((stream_body, Token::StreamStart)) => {
                    let (after_stream, data) = parse_stream_data(stream_body, direct_length(&dict))?;
                    Ok((after_stream, Object::Stream { dict, data: Bytes::copy_from_slice(data) }))
                },
                _ => Ok((after_dict, Object::Dictionary(dict))),
            }
        },

        _ => Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag))),
    }
}

/// A `Length` given as a direct non-negative integer.
fn direct_length(dict: &Dict) -> Option<usize> {
    dict.get("Length")
        .and_then(Object::as_integer)
        .and_then(|l| usize::try_from(l).ok())
}

/// Read stream bytes after the `stream` keyword.
///
/// A known `length` is trusted when `endstream` follows it. Otherwise
/// (missing, unresolved or wrong `Length`) the body extends to the next
/// `endstream` marker, minus one end-of-line.
fn parse_stream_data(input: &[u8], length: Option<usize>) -> IResult<&[u8], &[u8]> {
    let body = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") {
        &input[1..]
    } else if input.starts_with(b"\r") {
        log::warn!("Stream keyword followed by a bare CR");
        &input[1..]
    } else {
        log::warn!("No end-of-line after stream keyword");
        input
    };

    if let Some(length) = length {
        if length <= body.len() {
            let (_, tail) = body.split_at(length);
            if let Ok((after, Token::StreamEnd)) = token(tail) {
                return Ok((after, &body[..length]));
            }
            log::warn!("Stream Length {} does not end at endstream, scanning instead", length);
        } else {
            log::warn!("Stream Length {} runs past the end of input, scanning instead", length);
        }
    }

    match find_endstream(body) {
        Some(end) => {
            let mut data = &body[..end];
            if data.ends_with(b"\r\n") {
                data = &data[..data.len() - 2];
            } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
                data = &data[..data.len() - 1];
            }
            let after = &body[end + b"endstream".len()..];
            Ok((after, data))
        },
        None => Err(nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Eof))),
    }
}

/// Offset of the first `endstream` marker.
pub fn find_endstream(input: &[u8]) -> Option<usize> {
    const MARKER: &[u8] = b"endstream";
    input.windows(MARKER.len()).position(|w| w == MARKER)
}

fn parse_array(input: &[u8], depth: u32) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = skip_ws(remaining)?;
        if rest.is_empty() {
            // Truncated input: keep what was read
            return Ok((rest, Object::Array(items)));
        }
        if let Ok((after, Token::ArrayEnd)) = token(rest) {
            return Ok((after, Object::Array(items)));
        }
        let (after, item) = parse_nested(rest, depth)?;
        items.push(item);
        remaining = after;
    }
}

fn parse_dictionary(input: &[u8], depth: u32) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let (rest, _) = skip_ws(remaining)?;
        if rest.is_empty() {
            return Ok((rest, dict));
        }
        match token(rest) {
            Ok((after, Token::DictEnd)) => return Ok((after, dict)),
            Ok((after_key, Token::Name(key))) => {
                let (after_value, value) = parse_nested(after_key, depth)?;
                dict.insert(key, value);
                remaining = after_value;
            },
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(rest, ErrorKind::Tag)));
            },
        }
    }
}

/// Convert a nom failure on a suffix of `buffer` to a positioned [`Error`].
pub fn error_at(buffer: &[u8], err: nom::Err<nom::error::Error<&[u8]>>) -> Error {
    let (rest, kind) = match err {
        nom::Err::Incomplete(_) => (&buffer[buffer.len()..], ErrorKind::Eof),
        nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, e.code),
    };
    let pos = Position::at(buffer, buffer.len().saturating_sub(rest.len()));

    match kind {
        ErrorKind::TooLarge => Error::RecursionLimitExceeded(MAX_NESTING_DEPTH),
        ErrorKind::Eof if !rest.is_empty() => Error::StreamParsing { pos },
        _ => match rest.first() {
            Some(b'(') => Error::UnbalancedParenthesis { pos },
            Some(&byte) => Error::ObjectParsing { pos, byte },
            None => Error::Parsing {
                pos,
                details: "unexpected end of input".to_string(),
            },
        },
    }
}

/// Parse a direct object starting at `offset` in `buffer`.
///
/// Returns the object and the offset just past it.
pub fn parse_object_at(buffer: &[u8], offset: usize) -> Result<(Object, usize)> {
    let input = buffer.get(offset..).ok_or_else(|| Error::Parsing {
        pos: Position::at(buffer, offset),
        details: "offset past end of input".to_string(),
    })?;
    let (rest, obj) = parse_object(input).map_err(|e| error_at(buffer, e))?;
    Ok((obj, buffer.len() - rest.len()))
}

/// Parse an object body, resolving a stream's indirect `Length`.
///
/// Streams only occur at the top level of an indirect object, so nested
/// values go through [`parse_object`].
fn parse_body<'a>(input: &'a [u8], length_of: &dyn Fn(ObjectRef) -> Option<i64>) -> IResult<&'a [u8], Object> {
    let (start, _) = skip_ws(input)?;
    let Ok((rest, Token::DictStart)) = token(start) else {
        return parse_object(input);
    };

    let (after_dict, dict) = parse_dictionary(rest, 1)?;
    let Ok((stream_body, Token::StreamStart)) = token(after_dict) else {
        return Ok((after_dict, Object::Dictionary(dict)));
    };

    let length = match dict.get("Length") {
        Some(Object::Reference(r)) => {
            let resolved = length_of(*r).and_then(|l| usize::try_from(l).ok());
            if resolved.is_none() {
                log::debug!("Stream Length {} is not resolvable yet, scanning for endstream", r);
            }
            resolved
        },
        _ => direct_length(&dict),
    };
    let (after_stream, data) = parse_stream_data(stream_body, length)?;
    Ok((
        after_stream,
        Object::Stream {
            dict,
            data: Bytes::copy_from_slice(data),
        },
    ))
}

/// A parsed `N G obj ... endobj` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    /// Object number and generation from the header
    pub reference: ObjectRef,
    /// The object body
    pub object: Object,
    /// Offset just past `endobj` (or past the body if `endobj` was missing)
    pub end: usize,
}

/// Parse the `N G obj` prefix at `offset`.
///
/// Returns the reference and the offset of the object body.
pub fn parse_indirect_header(buffer: &[u8], offset: usize) -> Result<(ObjectRef, usize)> {
    let input = buffer.get(offset..).unwrap_or(&[]);
    let (input, _) = skip_ws(input).map_err(|e| error_at(buffer, e))?;
    let start = buffer.len() - input.len();
    let invalid = || Error::InvalidObjectParsing {
        pos: Position::at(buffer, start),
    };

    let (rest, id) = match token(input) {
        Ok((rest, Token::Integer(id))) => (rest, id),
        _ => return Err(invalid()),
    };
    let (rest, gen) = match token(rest) {
        Ok((rest, Token::Integer(gen))) => (rest, gen),
        _ => return Err(invalid()),
    };
    let rest = match token(rest) {
        Ok((rest, Token::ObjStart)) => rest,
        _ => {
            return Err(Error::MissingKeyword {
                pos: Position::at(buffer, buffer.len() - rest.len()),
                keyword: "obj".to_string(),
            })
        },
    };

    let id = u32::try_from(id).map_err(|_| invalid())?;
    let gen = u16::try_from(gen).map_err(|_| invalid())?;
    Ok((ObjectRef::new(id, gen), buffer.len() - rest.len()))
}

/// Parse an indirect object definition at `offset`.
///
/// A missing `endobj` is tolerated with a warning unless `strict` is set.
/// An indirect stream `Length` is not resolved; see
/// [`parse_indirect_object_with`].
pub fn parse_indirect_object(buffer: &[u8], offset: usize, strict: bool) -> Result<IndirectObject> {
    parse_indirect_object_with(buffer, offset, strict, &|_| None)
}

/// Like [`parse_indirect_object`], resolving an indirect stream `Length`
/// through `length_of`.
///
/// When `length_of` has no answer the stream runs to the next `endstream`.
pub fn parse_indirect_object_with(
    buffer: &[u8],
    offset: usize,
    strict: bool,
    length_of: &dyn Fn(ObjectRef) -> Option<i64>,
) -> Result<IndirectObject> {
    let (reference, body) = parse_indirect_header(buffer, offset)?;
    let input = &buffer[body..];
    let (rest, object) = parse_body(input, length_of).map_err(|e| error_at(buffer, e))?;
    let after_body = buffer.len() - rest.len();

    match token(&buffer[after_body..]) {
        Ok((rest, Token::ObjEnd)) => Ok(IndirectObject {
            reference,
            object,
            end: buffer.len() - rest.len(),
        }),
        _ if strict => Err(Error::MissingKeyword {
            pos: Position::at(buffer, after_body),
            keyword: "endobj".to_string(),
        }),
        _ => {
            log::warn!("Object {} is missing endobj", reference);
            Ok(IndirectObject {
                reference,
                object,
                end: after_body,
            })
        },
    }
}

/// Locate the `%PDF-M.m` header.
///
/// Returns the version string and the offset of the `%`. Junk before the
/// header is allowed within the first 1024 bytes.
pub fn parse_header(buffer: &[u8]) -> Result<(String, usize)> {
    const MARKER: &[u8] = b"%PDF-";
    let window = &buffer[..buffer.len().min(HEADER_SEARCH_WINDOW)];

    let start = window
        .windows(MARKER.len())
        .position(|w| w == MARKER)
        .ok_or_else(|| Error::MissingHeader {
            pos: Position::at(buffer, window.len()),
        })?;

    let version: String = buffer[start + MARKER.len()..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == b'.')
        .map(|&c| c as char)
        .collect();

    if version.is_empty() {
        return Err(Error::MissingHeader {
            pos: Position::at(buffer, start),
        });
    }
    Ok((version, start))
}
