//! PDF object serialization.
//!
//! Serializes objects to their byte representation. Output is canonical:
//! integers and reals use the shortest text that reads back to the same
//! value, dictionaries keep insertion order and strings keep the lexical
//! form they were created with.

use crate::content::encode_operations;
use crate::decoders::flate_encode;
use crate::object::{Dict, Object, ObjectRef, PdfString, StringForm};

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
    /// Flate-compress content streams on output
    compress_content: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self {
            compact: true,
            compress_content: false,
        }
    }

    /// Compress content streams with FlateDecode when writing them.
    pub fn with_content_compression(mut self, compress: bool) -> Self {
        self.compress_content = compress;
        self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj);
        buf
    }

    /// Serialize an object to a string (for debugging).
    pub fn serialize_to_string(&self, obj: &Object) -> String {
        String::from_utf8_lossy(&self.serialize(obj)).to_string()
    }

    /// Append an indirect object definition to `out`.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn write_indirect(&self, out: &mut Vec<u8>, reference: ObjectRef, obj: &Object) {
        out.extend_from_slice(format!("{} {} obj\n", reference.id, reference.gen).as_bytes());
        self.write_object(out, obj);
        out.extend_from_slice(b"\nendobj\n");
    }

    /// Serialize an indirect object definition.
    pub fn serialize_indirect(&self, reference: ObjectRef, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_indirect(&mut buf, reference, obj);
        buf
    }

    /// Append an object to `out`.
    pub fn write_object(&self, out: &mut Vec<u8>, obj: &Object) {
        match obj {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => write_real(out, *r),
            Object::String(s) => write_string(out, s),
            Object::Name(n) => write_name(out, n),
            Object::Array(arr) => self.write_array(out, arr),
            Object::Dictionary(dict) => self.write_dictionary(out, dict),
            Object::Stream { dict, data } => self.write_stream(out, dict, data),
            Object::ContentStream { dict, operations } => {
                let encoded = encode_operations(operations);
                if self.compress_content && !dict.contains_key("Filter") {
                    match flate_encode(&encoded) {
                        Ok(compressed) => {
                            let mut dict = dict.clone();
                            dict.insert("Filter".to_string(), Object::name("FlateDecode"));
                            self.write_stream(out, &dict, &compressed);
                            return;
                        },
                        Err(e) => log::warn!("Content stream compression failed, writing plain: {}", e),
                    }
                }
                self.write_stream(out, dict, &encoded)
            },
            Object::Reference(r) => {
                out.extend_from_slice(format!("{} {} R", r.id, r.gen).as_bytes())
            },
        }
    }

    fn write_array(&self, out: &mut Vec<u8>, arr: &[Object]) {
        out.push(b'[');
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                out.push(b' ');
            }
            self.write_object(out, obj);
        }
        out.push(b']');
    }

    fn write_dictionary(&self, out: &mut Vec<u8>, dict: &Dict) {
        out.extend_from_slice(b"<<");
        for (key, value) in dict {
            if self.compact {
                out.push(b' ');
            } else {
                out.extend_from_slice(b"\n  ");
            }
            write_name(out, key);
            out.push(b' ');
            self.write_object(out, value);
        }
        if self.compact {
            if !dict.is_empty() {
                out.push(b' ');
            }
        } else if !dict.is_empty() {
            out.push(b'\n');
        }
        out.extend_from_slice(b">>");
    }

    /// Streams always carry their true byte length.
    fn write_stream(&self, out: &mut Vec<u8>, dict: &Dict, data: &[u8]) {
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(out, &dict);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(data);
        out.extend_from_slice(b"\nendstream");
    }
}

/// Format a number as the shortest text that parses back to `value`.
///
/// Integral values print without a decimal point and non-finite values
/// print as `0`. Exponent notation is never produced.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return (value as i64).to_string();
    }
    format!("{}", value)
}

fn write_real(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(format_number(value).as_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &PdfString) {
    match s.form() {
        StringForm::Hex => {
            out.push(b'<');
            for byte in s.as_bytes() {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        },
        StringForm::Literal => {
            out.push(b'(');
            for &byte in s.as_bytes() {
                match byte {
                    b'(' => out.extend_from_slice(b"\\("),
                    b')' => out.extend_from_slice(b"\\)"),
                    b'\\' => out.extend_from_slice(b"\\\\"),
                    b'\n' => out.extend_from_slice(b"\\n"),
                    b'\r' => out.extend_from_slice(b"\\r"),
                    b'\t' => out.extend_from_slice(b"\\t"),
                    0x20..=0x7E => out.push(byte),
                    _ => out.extend_from_slice(format!("\\{:03o}", byte).as_bytes()),
                }
            }
            out.push(b')');
        },
    }
}

/// Names start with `/`; anything outside the regular printable range is
/// written as `#XX`.
fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for byte in name.bytes() {
        match byte {
            b'!'..=b'~'
                if !matches!(
                    byte,
                    b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                ) =>
            {
                out.push(byte)
            },
            _ => out.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
        }
    }
}
