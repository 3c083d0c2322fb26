//! Content stream operations.
//!
//! A content stream is a flat sequence of operators, each preceded by its
//! operands. Streams held as [`Object::ContentStream`] keep this decoded form
//! so callers can edit them, and are encoded again at write time.
//!
//! Inline images (`BI ... ID <bytes> EI`) are kept as a single `BI`
//! operation whose operands are the key/value pairs and whose raw sample
//! bytes live in [`Operation::inline_data`].

use crate::error::{Error, Position, Result};
use crate::lexer::{is_delimiter, is_whitespace, skip_ws};
use crate::object::Object;
use crate::parser::{error_at, parse_object};
use crate::writer::ObjectSerializer;
use bytes::Bytes;
use nom::bytes::complete::take_while1;
use nom::IResult;

/// One operator with its operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// Operator keyword, e.g. `cm`, `Tj`, `T*`
    pub operator: String,
    /// Operands in stream order
    pub operands: Vec<Object>,
    /// Raw sample bytes of an inline image
    pub inline_data: Option<Bytes>,
}

impl Operation {
    /// Create an operation.
    pub fn new(operator: &str, operands: Vec<Object>) -> Self {
        Self {
            operator: operator.to_string(),
            operands,
            inline_data: None,
        }
    }
}

/// Parse decoded content stream bytes into operations.
///
/// ```
/// use pdf_graph::content::parse_operations;
///
/// let ops = parse_operations(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET").unwrap();
/// assert_eq!(ops.len(), 5);
/// assert_eq!(ops[1].operator, "Tf");
/// ```
///
/// # Errors
///
/// Fails with a positioned parse error when an operand is malformed or when
/// operands are left over at the end without an operator.
pub fn parse_operations(data: &[u8]) -> Result<Vec<Operation>> {
    let mut ops = Vec::new();
    let mut operands = Vec::new();
    let mut input = data;

    loop {
        let (rest, _) = skip_ws(input).map_err(|e| error_at(data, e))?;
        input = rest;
        let Some(&first) = input.first() else {
            break;
        };

        if is_operator_start(first) {
            let (rest, name) = parse_operator_name(input).map_err(|e| error_at(data, e))?;
            match name {
                "true" => operands.push(Object::Boolean(true)),
                "false" => operands.push(Object::Boolean(false)),
                "null" => operands.push(Object::Null),
                "BI" => {
                    let (after, op) = parse_inline_image(rest).map_err(|e| error_at(data, e))?;
                    ops.push(op);
                    input = after;
                    continue;
                },
                _ => ops.push(Operation::new(name, std::mem::take(&mut operands))),
            }
            input = rest;
            continue;
        }

        let (rest, obj) = parse_object(input).map_err(|e| error_at(data, e))?;
        operands.push(obj);
        input = rest;
    }

    if !operands.is_empty() {
        return Err(Error::Parsing {
            pos: Position::at(data, data.len()),
            details: format!("{} operand(s) without an operator", operands.len()),
        });
    }
    Ok(ops)
}

/// Encode operations as content stream text, one operation per line.
pub fn encode_operations(ops: &[Operation]) -> Vec<u8> {
    let serializer = ObjectSerializer::compact();
    let mut out = Vec::new();

    for op in ops {
        if op.operator == "BI" {
            out.extend_from_slice(b"BI");
            for operand in &op.operands {
                out.push(b' ');
                serializer.write_object(&mut out, operand);
            }
            out.extend_from_slice(b" ID ");
            if let Some(data) = &op.inline_data {
                out.extend_from_slice(data);
            }
            out.extend_from_slice(b"\nEI\n");
            continue;
        }

        for operand in &op.operands {
            serializer.write_object(&mut out, operand);
            out.push(b' ');
        }
        out.extend_from_slice(op.operator.as_bytes());
        out.push(b'\n');
    }

    out
}

fn is_operator_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'\'' || byte == b'"' || byte == b'*'
}

fn parse_operator_name(input: &[u8]) -> IResult<&[u8], &str> {
    let (rest, name) =
        take_while1(|c: u8| c.is_ascii_alphanumeric() || c == b'\'' || c == b'"' || c == b'*')(input)?;
    let name = std::str::from_utf8(name)
        .map_err(|_| nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Char)))?;
    Ok((rest, name))
}

/// `BI <key value>* ID <data> EI`
///
/// Exactly one whitespace byte separates `ID` from the data. The data ends
/// at the first `EI` that is preceded by whitespace and followed by
/// whitespace, a delimiter or the end of the stream.
fn parse_inline_image(input: &[u8]) -> IResult<&[u8], Operation> {
    let mut operands = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = skip_ws(remaining)?;
        remaining = rest;
        if remaining.starts_with(b"ID")
            && remaining.get(2).map_or(true, |&c| is_whitespace(c))
        {
            remaining = &remaining[2..];
            break;
        }
        if remaining.is_empty() {
            return Err(nom::Err::Failure(nom::error::Error::new(
                remaining,
                nom::error::ErrorKind::Eof,
            )));
        }
        let (rest, obj) = parse_object(remaining)?;
        operands.push(obj);
        remaining = rest;
    }

    let data = match remaining.first() {
        Some(&c) if is_whitespace(c) => &remaining[1..],
        _ => remaining,
    };

    let mut i = 0;
    while i + 2 <= data.len() {
        let preceded = i > 0 && is_whitespace(data[i - 1]);
        let followed = data.get(i + 2).map_or(true, |&c| is_whitespace(c) || is_delimiter(c));
        if preceded && followed && &data[i..i + 2] == b"EI" {
            let op = Operation {
                operator: "BI".to_string(),
                operands,
                inline_data: Some(Bytes::copy_from_slice(&data[..i - 1])),
            };
            return Ok((&data[i + 2..], op));
        }
        i += 1;
    }

    Err(nom::Err::Failure(nom::error::Error::new(
        remaining,
        nom::error::ErrorKind::Eof,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PdfString;

    #[test]
    fn test_parse_simple_text() {
        let ops = parse_operations(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET").unwrap();
        let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(names, vec!["BT", "Tf", "Td", "Tj", "ET"]);
        assert_eq!(ops[1].operands, vec![Object::name("F1"), Object::Integer(12)]);
        assert_eq!(ops[3].operands, vec![Object::String(PdfString::literal(b"Hello".to_vec()))]);
    }

    #[test]
    fn test_parse_star_and_quote_operators() {
        let ops = parse_operations(b"T* (a) ' 1 2 (b) \"").unwrap();
        let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(names, vec!["T*", "'", "\""]);
        assert_eq!(ops[2].operands.len(), 3);
    }

    #[test]
    fn test_boolean_operands_are_not_operators() {
        let ops = parse_operations(b"/OC /MC0 true null BDC").unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operands[2], Object::Boolean(true));
        assert_eq!(ops[0].operands[3], Object::Null);
    }

    #[test]
    fn test_parse_array_operand() {
        let ops = parse_operations(b"[(A) -120 (B)] TJ").unwrap();
        assert_eq!(ops[0].operator, "TJ");
        assert_eq!(ops[0].operands[0].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_trailing_operands_fail() {
        assert!(matches!(parse_operations(b"q 1 2"), Err(Error::Parsing { .. })));
    }

    #[test]
    fn test_empty_stream() {
        assert!(parse_operations(b"").unwrap().is_empty());
        assert!(parse_operations(b"  \n % just a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_inline_image() {
        let stream = b"q BI /W 2 /H 1 /BPC 8 /CS /G ID \x00EI\xff\nEI Q";
        let ops = parse_operations(stream).unwrap();
        let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(names, vec!["q", "BI", "Q"]);
        assert_eq!(ops[1].operands.len(), 8);
        assert_eq!(ops[1].inline_data.as_deref(), Some(&b"\x00EI\xff"[..]));
    }

    #[test]
    fn test_encode_then_parse_inline_image() {
        let ops = parse_operations(b"BI /W 1 /H 1 ID \x7fEI").unwrap();
        let encoded = encode_operations(&ops);
        assert_eq!(encoded, b"BI /W 1 /H 1 ID \x7f\nEI\n");
        assert_eq!(parse_operations(&encoded).unwrap(), ops);
    }

    #[test]
    fn test_encode_operations() {
        let ops = vec![
            Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 72.5.into(), 0.into()]),
            Operation::new("Do", vec![Object::name("X1")]),
        ];
        assert_eq!(encode_operations(&ops), b"1 0 0 1 72.5 0 cm\n/X1 Do\n");
    }
}
