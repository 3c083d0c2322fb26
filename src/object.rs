//! PDF object types.
//!
//! Objects form a tagged union. Indirect structure is expressed only through
//! [`ObjectRef`], a plain `(id, gen)` pair that is resolved against a
//! [`Context`](crate::context::Context); an `Object` never owns another
//! indirect object.

use crate::content::{encode_operations, Operation};
use crate::error::{Error, Result};
use bytes::Bytes;
use indexmap::IndexMap;
use std::fmt;

/// Dictionary storage. Insertion order is preserved for serialization.
pub type Dict = IndexMap<String, Object>;

/// PDF object representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String, literal or hex form
    String(PdfString),
    /// Name (without the leading slash)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary
    Dictionary(Dict),
    /// Raw stream: dictionary plus encoded bytes as found on disk
    Stream {
        /// Stream dictionary
        dict: Dict,
        /// Encoded stream data
        data: Bytes,
    },
    /// Content stream held as decoded drawing operations
    ContentStream {
        /// Stream dictionary
        dict: Dict,
        /// Operations, encoded at write time
        operations: Vec<Operation>,
    },
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
    /// Generation number
    pub gen: u16,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.id, self.gen)
    }
}

/// Object kinds, used for typed lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean,
    /// Integer or real
    Number,
    /// Literal or hex string
    String,
    /// Name
    Name,
    /// Array
    Array,
    /// Dictionary
    Dictionary,
    /// Raw or content stream
    Stream,
    /// Indirect reference
    Ref,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Null => "Null",
            ObjectKind::Boolean => "Boolean",
            ObjectKind::Number => "Number",
            ObjectKind::String => "String",
            ObjectKind::Name => "Name",
            ObjectKind::Array => "Array",
            ObjectKind::Dictionary => "Dictionary",
            ObjectKind::Stream => "Stream",
            ObjectKind::Ref => "Ref",
        };
        f.write_str(name)
    }
}

/// Lexical form a string was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringForm {
    /// `(...)` with backslash escapes
    Literal,
    /// `<...>` hex digits
    Hex,
}

/// A PDF string.
///
/// Two strings are equal when their decoded bytes match, whatever form they
/// were written in.
#[derive(Debug, Clone)]
pub struct PdfString {
    bytes: Vec<u8>,
    form: StringForm,
}

impl PdfString {
    /// A string serialized in literal form.
    pub fn literal(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            form: StringForm::Literal,
        }
    }

    /// A string serialized in hex form.
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            form: StringForm::Hex,
        }
    }

    /// Decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lexical form.
    pub fn form(&self) -> StringForm {
        self.form
    }

    /// Decode as text: UTF-16BE when the BOM is present, otherwise each
    /// byte maps to one character.
    pub fn to_text(&self) -> String {
        if self.bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = self.bytes[2..]
                .chunks(2)
                .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.bytes.iter().map(|&b| b as char).collect()
        }
    }

    /// Encode text, choosing UTF-16BE hex form when it is not plain ASCII.
    pub fn from_text(text: &str) -> Self {
        if text.chars().all(|c| (c as u32) < 0x80) {
            Self::literal(text.as_bytes())
        } else {
            let mut bytes = vec![0xFE, 0xFF];
            for unit in text.encode_utf16() {
                bytes.extend_from_slice(&unit.to_be_bytes());
            }
            Self::hex(bytes)
        }
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl Object {
    /// Build a number, preferring the integer form for integral values.
    pub fn number(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 9.0e15 {
            Object::Integer(value as i64)
        } else {
            Object::Real(value)
        }
    }

    /// Build a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Build a literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Object::String(PdfString::literal(bytes))
    }

    /// Kind of this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Null => ObjectKind::Null,
            Object::Boolean(_) => ObjectKind::Boolean,
            Object::Integer(_) | Object::Real(_) => ObjectKind::Number,
            Object::String(_) => ObjectKind::String,
            Object::Name(_) => ObjectKind::Name,
            Object::Array(_) => ObjectKind::Array,
            Object::Dictionary(_) => ObjectKind::Dictionary,
            Object::Stream { .. } | Object::ContentStream { .. } => ObjectKind::Stream,
            Object::Reference(_) => ObjectKind::Ref,
        }
    }

    /// Check the kind, failing with [`Error::UnexpectedObjectKind`].
    pub fn expect_kind(&self, expected: ObjectKind) -> Result<&Self> {
        if self.kind() == expected {
            Ok(self)
        } else {
            Err(Error::UnexpectedObjectKind {
                expected,
                found: self.kind(),
            })
        }
    }

    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to a number of either representation.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary. Works for dictionaries and both stream forms.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } | Object::ContentStream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Mutable dictionary access, same rules as [`Object::as_dict`].
    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream { dict, .. } | Object::ContentStream { dict, .. } => Some(dict),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to cast to string.
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check if object is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Whether this is a stream in either form.
    pub fn is_stream(&self) -> bool {
        self.kind() == ObjectKind::Stream
    }

    /// Check the dictionary's `/Type` entry.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.as_dict()
            .and_then(|d| d.get("Type"))
            .and_then(Object::as_name)
            == Some(type_name)
    }

    /// Bytes that go between `stream` and `endstream` when written.
    pub fn encoded_stream_data(&self) -> Result<Bytes> {
        match self {
            Object::Stream { data, .. } => Ok(data.clone()),
            Object::ContentStream { operations, .. } => Ok(Bytes::from(encode_operations(operations))),
            _ => Err(Error::UnexpectedObjectKind {
                expected: ObjectKind::Stream,
                found: self.kind(),
            }),
        }
    }

    /// Decode stream data using the filters named in the stream dictionary.
    ///
    /// Content streams are already decoded and simply re-encoded as text.
    pub fn decode_stream_data(&self) -> Result<Vec<u8>> {
        match self {
            Object::Stream { dict, data } => crate::decoders::decode_stream_dict(dict, data),
            Object::ContentStream { operations, .. } => Ok(encode_operations(operations)),
            _ => Err(Error::UnexpectedObjectKind {
                expected: ObjectKind::Stream,
                found: self.kind(),
            }),
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::number(value)
    }
}

impl From<ObjectRef> for Object {
    fn from(value: ObjectRef) -> Self {
        Object::Reference(value)
    }
}

impl From<PdfString> for Object {
    fn from(value: PdfString) -> Self {
        Object::String(value)
    }
}

impl From<Dict> for Object {
    fn from(value: Dict) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_integer() {
        let obj = Object::Integer(42);
        assert_eq!(obj.as_integer(), Some(42));
        assert_eq!(obj.as_number(), Some(42.0));
        assert_eq!(obj.kind(), ObjectKind::Number);
        assert!(!obj.is_null());
    }

    #[test]
    fn test_object_number_prefers_integer() {
        assert_eq!(Object::number(3.0), Object::Integer(3));
        assert_eq!(Object::number(-0.5), Object::Real(-0.5));
    }

    #[test]
    fn test_string_forms_compare_by_bytes() {
        let lit = Object::String(PdfString::literal(b"abc".to_vec()));
        let hex = Object::String(PdfString::hex(b"abc".to_vec()));
        assert_eq!(lit, hex);
        assert_eq!(lit.as_string().map(|s| s.form()), Some(StringForm::Literal));
    }

    #[test]
    fn test_string_text_roundtrip() {
        let ascii = PdfString::from_text("Hello");
        assert_eq!(ascii.form(), StringForm::Literal);
        assert_eq!(ascii.to_text(), "Hello");

        let unicode = PdfString::from_text("Grüße ✓");
        assert_eq!(unicode.form(), StringForm::Hex);
        assert!(unicode.as_bytes().starts_with(&[0xFE, 0xFF]));
        assert_eq!(unicode.to_text(), "Grüße ✓");
    }

    #[test]
    fn test_dictionary_preserves_insertion_order() {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Page"));
        dict.insert("Parent".to_string(), Object::Reference(ObjectRef::new(2, 0)));
        dict.insert("MediaBox".to_string(), Object::Array(vec![]));
        let keys: Vec<&str> = dict.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Type", "Parent", "MediaBox"]);
    }

    #[test]
    fn test_object_stream_dict_access() {
        let mut dict = Dict::new();
        dict.insert("Length".to_string(), Object::Integer(100));
        let obj = Object::Stream {
            dict,
            data: Bytes::from_static(b"stream data"),
        };
        let d = obj.as_dict().unwrap();
        assert_eq!(d.get("Length").unwrap().as_integer(), Some(100));
        assert!(obj.is_stream());
    }

    #[test]
    fn test_has_type() {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Catalog"));
        let obj = Object::Dictionary(dict);
        assert!(obj.has_type("Catalog"));
        assert!(!obj.has_type("Pages"));
        assert!(!Object::Null.has_type("Catalog"));
    }

    #[test]
    fn test_expect_kind() {
        let obj = Object::Array(vec![]);
        assert!(obj.expect_kind(ObjectKind::Array).is_ok());
        match obj.expect_kind(ObjectKind::Dictionary) {
            Err(Error::UnexpectedObjectKind { expected, found }) => {
                assert_eq!(expected, ObjectKind::Dictionary);
                assert_eq!(found, ObjectKind::Array);
            },
            other => panic!("Expected UnexpectedObjectKind, got {:?}", other),
        }
    }

    #[test]
    fn test_content_stream_encodes_operations() {
        let obj = Object::ContentStream {
            dict: Dict::new(),
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 0.into()]),
                Operation::new("Q", vec![]),
            ],
        };
        assert_eq!(obj.decode_stream_data().unwrap(), b"q\n1 0 0 1 0 0 cm\nQ\n");
        assert_eq!(obj.kind(), ObjectKind::Stream);
    }

    #[test]
    fn test_decode_stream_not_a_stream() {
        match Object::Integer(42).decode_stream_data() {
            Err(Error::UnexpectedObjectKind { expected, found }) => {
                assert_eq!(expected, ObjectKind::Stream);
                assert_eq!(found, ObjectKind::Number);
            },
            other => panic!("Expected UnexpectedObjectKind, got {:?}", other),
        }
    }

    #[test]
    fn test_object_ref_ordering_and_display() {
        let a = ObjectRef::new(1, 0);
        let b = ObjectRef::new(2, 0);
        assert!(a < b);
        assert_eq!(format!("{}", b), "2 0 R");
    }
}
