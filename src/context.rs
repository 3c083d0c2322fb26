//! The object store.
//!
//! A [`Context`] owns every indirect object of one document. Objects refer
//! to each other only through [`ObjectRef`] values that are looked up here,
//! so shared and cyclic structures (page ↔ parent) need no ownership tricks.
//!
//! A context is single-writer: it has no internal locking and mutation
//! requires `&mut self`.

use crate::content::Operation;
use crate::decoders::flate_encode;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectKind, ObjectRef, PdfString};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Context`].
///
/// Used to detect handles that belong to another document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Top-level pointers written to the trailer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailerInfo {
    /// Document catalog
    pub root: Option<ObjectRef>,
    /// Document information dictionary
    pub info: Option<ObjectRef>,
    /// Encryption dictionary, direct or indirect
    pub encrypt: Option<Object>,
    /// File identifier array
    pub id: Option<Object>,
}

/// Owner of all indirect objects in a document.
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    objects: BTreeMap<ObjectRef, Object>,
    largest_object_number: u32,
    /// Trailer pointers
    pub trailer_info: TrailerInfo,
    /// Header version, e.g. `1.7`
    pub version: String,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            id: ContextId::next(),
            objects: BTreeMap::new(),
            largest_object_number: 0,
            trailer_info: TrailerInfo::default(),
            version: "1.7".to_string(),
        }
    }

    /// This context's identity.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Highest object number allocated or stored so far.
    pub fn largest_object_number(&self) -> u32 {
        self.largest_object_number
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Store `object` under a freshly allocated ref.
    pub fn register(&mut self, object: Object) -> ObjectRef {
        let reference = self.next_ref();
        self.objects.insert(reference, object);
        reference
    }

    /// Store `object` at `reference`, replacing any previous value.
    pub fn assign(&mut self, reference: ObjectRef, object: Object) {
        self.largest_object_number = self.largest_object_number.max(reference.id);
        self.objects.insert(reference, object);
    }

    /// Reserve the next object number without storing anything.
    pub fn next_ref(&mut self) -> ObjectRef {
        self.largest_object_number += 1;
        ObjectRef::new(self.largest_object_number, 0)
    }

    /// Remove an object, returning it.
    pub fn delete(&mut self, reference: ObjectRef) -> Option<Object> {
        self.objects.remove(&reference)
    }

    /// Whether `reference` resolves.
    pub fn contains(&self, reference: ObjectRef) -> bool {
        self.objects.contains_key(&reference)
    }

    /// Direct table access.
    pub fn get(&self, reference: ObjectRef) -> Option<&Object> {
        self.objects.get(&reference)
    }

    /// Mutable table access.
    pub fn get_mut(&mut self, reference: ObjectRef) -> Option<&mut Object> {
        self.objects.get_mut(&reference)
    }

    /// All stored objects, ordered by object number then generation.
    pub fn enumerate_indirect_objects(&self) -> impl Iterator<Item = (ObjectRef, &Object)> + '_ {
        self.objects.iter().map(|(r, o)| (*r, o))
    }

    /// Resolve a value: refs go through the table, direct values come back
    /// unchanged. An unresolved ref yields `None`.
    pub fn lookup<'a>(&'a self, value: &'a Object) -> Option<&'a Object> {
        match value {
            Object::Reference(r) => self.objects.get(r),
            other => Some(other),
        }
    }

    /// Resolve a value and check its kind. An unresolved ref counts as `Null`.
    pub fn lookup_kind<'a>(&'a self, value: &'a Object, expected: ObjectKind) -> Result<&'a Object> {
        match self.lookup(value) {
            Some(obj) => obj.expect_kind(expected),
            None => Err(Error::UnexpectedObjectKind {
                expected,
                found: ObjectKind::Null,
            }),
        }
    }

    /// Resolve to a dictionary (plain or stream dictionary).
    pub fn lookup_dict<'a>(&'a self, value: &'a Object) -> Result<&'a Dict> {
        let resolved = self.lookup(value).unwrap_or(&Object::Null);
        resolved.as_dict().ok_or(Error::UnexpectedObjectKind {
            expected: ObjectKind::Dictionary,
            found: resolved.kind(),
        })
    }

    /// Resolve to an array.
    pub fn lookup_array<'a>(&'a self, value: &'a Object) -> Result<&'a Vec<Object>> {
        let resolved = self.lookup(value).unwrap_or(&Object::Null);
        resolved.as_array().ok_or(Error::UnexpectedObjectKind {
            expected: ObjectKind::Array,
            found: resolved.kind(),
        })
    }

    /// Resolve to a number.
    pub fn lookup_number(&self, value: &Object) -> Result<f64> {
        let resolved = self.lookup(value).unwrap_or(&Object::Null);
        resolved.as_number().ok_or(Error::UnexpectedObjectKind {
            expected: ObjectKind::Number,
            found: resolved.kind(),
        })
    }

    /// Dictionary stored at `reference`.
    pub fn dict(&self, reference: ObjectRef) -> Result<&Dict> {
        let obj = self.objects.get(&reference).unwrap_or(&Object::Null);
        obj.as_dict().ok_or(Error::UnexpectedObjectKind {
            expected: ObjectKind::Dictionary,
            found: obj.kind(),
        })
    }

    /// Mutable dictionary stored at `reference`.
    pub fn dict_mut(&mut self, reference: ObjectRef) -> Result<&mut Dict> {
        match self.objects.get_mut(&reference) {
            Some(obj) => {
                let found = obj.kind();
                obj.as_dict_mut().ok_or(Error::UnexpectedObjectKind {
                    expected: ObjectKind::Dictionary,
                    found,
                })
            },
            None => Err(Error::UnexpectedObjectKind {
                expected: ObjectKind::Dictionary,
                found: ObjectKind::Null,
            }),
        }
    }

    /// Build an object from a literal.
    ///
    /// Strings starting with `/` become names, other strings become literal
    /// strings. Dictionary keys lose a leading `/` if they have one.
    ///
    /// ```
    /// use pdf_graph::context::{Context, Literal};
    /// use pdf_graph::object::Object;
    ///
    /// let ctx = Context::new();
    /// let page = ctx.obj(Literal::dict([
    ///     ("Type", "/Page".into()),
    ///     ("MediaBox", Literal::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
    /// ]));
    /// assert!(page.has_type("Page"));
    /// assert_eq!(ctx.obj("hello".into()), Object::string("hello"));
    /// ```
    pub fn obj(&self, literal: Literal) -> Object {
        match literal {
            Literal::Null => Object::Null,
            Literal::Bool(b) => Object::Boolean(b),
            Literal::Number(n) => Object::number(n),
            Literal::Text(s) => match s.strip_prefix('/') {
                Some(name) => Object::Name(name.to_string()),
                None => Object::String(PdfString::literal(s.into_bytes())),
            },
            Literal::Array(items) => Object::Array(items.into_iter().map(|i| self.obj(i)).collect()),
            Literal::Dict(entries) => Object::Dictionary(
                entries
                    .into_iter()
                    .map(|(k, v)| {
                        let key = k.strip_prefix('/').map(str::to_string).unwrap_or(k);
                        (key, self.obj(v))
                    })
                    .collect(),
            ),
            Literal::Object(o) => o,
        }
    }

    /// Build an object from a literal and register it, returning its ref.
    ///
    /// Shorthand for `ctx.register(ctx.obj(literal))`.
    pub fn obj_ref(&mut self, literal: Literal) -> ObjectRef {
        let object = self.obj(literal);
        self.register(object)
    }

    /// Build a raw stream. `Length` is set from `data`.
    pub fn stream(&self, data: impl Into<Bytes>, dict: Literal) -> Object {
        let data = data.into();
        let mut dict = match self.obj(dict) {
            Object::Dictionary(d) => d,
            _ => Dict::new(),
        };
        dict.insert("Length".to_string(), Object::Integer(data.len() as i64));
        Object::Stream { dict, data }
    }

    /// Build a Flate-compressed stream. `Filter` and `Length` are set.
    pub fn flate_stream(&self, data: &[u8], dict: Literal) -> Result<Object> {
        let compressed = flate_encode(data)?;
        let mut stream = self.stream(compressed, dict);
        if let Some(d) = stream.as_dict_mut() {
            d.insert("Filter".to_string(), Object::name("FlateDecode"));
        }
        Ok(stream)
    }

    /// Build a content stream from operations.
    pub fn content_stream(&self, operations: Vec<Operation>, dict: Literal) -> Object {
        let dict = match self.obj(dict) {
            Object::Dictionary(d) => d,
            _ => Dict::new(),
        };
        Object::ContentStream { dict, operations }
    }
}

/// Nested literal accepted by [`Context::obj`].
#[derive(Debug, Clone)]
pub enum Literal {
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// `/Name` or plain text
    Text(String),
    /// Array
    Array(Vec<Literal>),
    /// Dictionary entries in order
    Dict(Vec<(String, Literal)>),
    /// Already-built object, used as is
    Object(Object),
}

impl Literal {
    /// Dictionary literal from key/value pairs.
    pub fn dict<K: Into<String>, I: IntoIterator<Item = (K, Literal)>>(entries: I) -> Self {
        Literal::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Empty dictionary literal.
    pub fn empty() -> Self {
        Literal::Dict(Vec::new())
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Number(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Number(value as f64)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Object(Object::Integer(value))
    }
}

impl From<ObjectRef> for Literal {
    fn from(value: ObjectRef) -> Self {
        Literal::Object(Object::Reference(value))
    }
}

impl From<Object> for Literal {
    fn from(value: Object) -> Self {
        Literal::Object(value)
    }
}

impl From<Vec<Literal>> for Literal {
    fn from(value: Vec<Literal>) -> Self {
        Literal::Array(value)
    }
}
