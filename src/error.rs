//! Error types for the object graph engine.
//!
//! Parse errors carry a [`Position`] so diagnostics can point at the exact
//! line, column and byte offset of the failure. Everything else is a
//! lookup, document-state or codec error surfaced directly to the caller.

use crate::object::{ObjectKind, ObjectRef};
use std::fmt;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A location inside a parsed byte buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
    /// 0-based byte offset
    pub offset: usize,
}

impl Position {
    /// Compute the position of `offset` within `buffer`.
    ///
    /// CR, LF and CRLF all count as a single line break. Offsets past the end
    /// of the buffer are clamped.
    pub fn at(buffer: &[u8], offset: usize) -> Self {
        let end = offset.min(buffer.len());
        let mut line = 1;
        let mut line_start = 0;
        let mut i = 0;
        while i < end {
            match buffer[i] {
                b'\r' => {
                    if i + 1 < end && buffer[i + 1] == b'\n' {
                        i += 1;
                    }
                    line += 1;
                    line_start = i + 1;
                },
                b'\n' => {
                    line += 1;
                    line_start = i + 1;
                },
                _ => {},
            }
            i += 1;
        }
        Self {
            line,
            column: end - line_start + 1,
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line:{} col:{} offset={}", self.line, self.column, self.offset)
    }
}

/// Errors that can occur while building, parsing or writing documents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A numeric token could not be converted to a number
    #[error("Failed to parse number ({pos}): \"{value}\"")]
    NumberParsing {
        /// Where the token starts
        pos: Position,
        /// The raw token text
        value: String,
    },

    /// Generic structural parse failure
    #[error("Failed to parse PDF document ({pos}): {details}")]
    Parsing {
        /// Where parsing failed
        pos: Position,
        /// Human readable detail
        details: String,
    },

    /// A specific byte was required but another was found
    #[error("Expected next byte to be {expected} but it was actually {actual} ({pos})")]
    NextByteAssertion {
        /// Where the byte was read
        pos: Position,
        /// Expected byte value
        expected: u8,
        /// Byte actually found
        actual: u8,
    },

    /// No object grammar rule matched the byte at this position
    #[error("Failed to parse PDF object starting with byte {byte:#04x} ({pos})")]
    ObjectParsing {
        /// Where the object starts
        pos: Position,
        /// First byte of the offending token
        byte: u8,
    },

    /// An indirect object definition was malformed
    #[error("Failed to parse invalid PDF object ({pos})")]
    InvalidObjectParsing {
        /// Where the definition starts
        pos: Position,
    },

    /// A stream body could not be delimited
    #[error("Failed to parse PDF stream ({pos})")]
    StreamParsing {
        /// Where the stream keyword was found
        pos: Position,
    },

    /// A literal string never closed its parentheses
    #[error("Failed to parse PDF literal string due to unbalanced parenthesis ({pos})")]
    UnbalancedParenthesis {
        /// Where the string starts
        pos: Position,
    },

    /// The parser could not make progress
    #[error("Parser stalled ({pos})")]
    StalledParser {
        /// Where the parser stopped advancing
        pos: Position,
    },

    /// No `%PDF-` header near the start of the buffer
    #[error("No PDF header found ({pos})")]
    MissingHeader {
        /// Where the search stopped
        pos: Position,
    },

    /// A required keyword was absent
    #[error("Did not find expected keyword '{keyword}' ({pos})")]
    MissingKeyword {
        /// Where the keyword was expected
        pos: Position,
        /// The keyword text
        keyword: String,
    },

    /// Cross-reference data is unusable
    #[error("Invalid cross-reference section: {0}")]
    InvalidXref(String),

    /// A resolved object had the wrong kind
    #[error("Expected instance of {expected}, but got instance of {found}")]
    UnexpectedObjectKind {
        /// Kind the caller asked for
        expected: ObjectKind,
        /// Kind actually stored
        found: ObjectKind,
    },

    /// Root does not resolve to a catalog dictionary
    #[error("Missing catalog (ref={})", .0.as_ref().map(|r| r.to_string()).unwrap_or_else(|| "none".to_string()))]
    MissingCatalog(Option<ObjectRef>),

    /// The document is encrypted and the caller did not opt in
    #[error("Input document to `PdfDocument::load` is encrypted. Use `ParseOptions::with_ignore_encryption(true)` to load it anyway")]
    EncryptedDocument,

    /// A page handle belongs to a different context
    #[error("Cannot insert a page belonging to another document; copy it first with `copy_pages`")]
    ForeignPage,

    /// Index outside of the permitted range
    #[error("Index {index} out of range [{min}, {max}]")]
    IndexOutOfRange {
        /// The offending index
        index: usize,
        /// Smallest permitted value
        min: usize,
        /// Largest permitted value
        max: usize,
    },

    /// Attempted to remove a page from a document with no pages
    #[error("Cannot remove a page from a document that has no pages")]
    RemovePageFromEmptyDocument,

    /// The page tree shape contradicts its Count entries
    #[error("Page tree is corrupt: unable to {operation} at index {index}")]
    CorruptPageTree {
        /// Target index of the operation
        index: usize,
        /// Operation name
        operation: &'static str,
    },

    /// A page being embedded has no Contents entry
    #[error("Missing page.Contents on {0}")]
    MissingPageContents(ObjectRef),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),
}

impl Error {
    /// Whether this error came from the byte-level parser.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Error::NumberParsing { .. }
                | Error::Parsing { .. }
                | Error::NextByteAssertion { .. }
                | Error::ObjectParsing { .. }
                | Error::InvalidObjectParsing { .. }
                | Error::StreamParsing { .. }
                | Error::UnbalancedParenthesis { .. }
                | Error::StalledParser { .. }
                | Error::MissingHeader { .. }
                | Error::MissingKeyword { .. }
        )
    }

    /// Position of a parse error, if this is one.
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::NumberParsing { pos, .. }
            | Error::Parsing { pos, .. }
            | Error::NextByteAssertion { pos, .. }
            | Error::ObjectParsing { pos, .. }
            | Error::InvalidObjectParsing { pos }
            | Error::StreamParsing { pos }
            | Error::UnbalancedParenthesis { pos }
            | Error::StalledParser { pos }
            | Error::MissingHeader { pos }
            | Error::MissingKeyword { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}
