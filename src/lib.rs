#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![cfg_attr(test, allow(dead_code))]

//! # pdf_graph
//!
//! An indirect-object graph engine for PDF: build, load, mutate and write
//! documents at the object level.
//!
//! ## Core Features
//!
//! - **Object model**: typed values, raw and content streams, indirect refs
//! - **Context**: one arena per document owning every indirect object
//! - **Parser**: cross-reference fast path with a regex recovery scan for
//!   damaged files, lenient or strict
//! - **Writer**: classic xref tables or object streams plus an xref stream,
//!   in resumable steps
//! - **Page tree**: insert/remove with `Count` upkeep, inherited attributes
//! - **Copier**: move object subgraphs between documents, shared objects
//!   copied once
//! - **Embedder**: turn a page into a Form XObject
//!
//! ## Architecture
//!
//! ```text
//! bytes ─► document_parser ─► Context ─► writer ─► bytes
//!            │  xref / objstm      ▲
//!            └─ xref_reconstruction│
//!                         page_tree, copier, embedder
//!                                  ▲
//!                             PdfDocument
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use pdf_graph::{LoadOptions, PdfDocument, SaveOptions};
//!
//! # fn main() -> pdf_graph::Result<()> {
//! let mut source = PdfDocument::create();
//! source.add_page([200.0, 200.0])?;
//! source.add_page([300.0, 300.0])?;
//! let bytes = source.save(SaveOptions::classic())?;
//!
//! let mut loaded = PdfDocument::load(&bytes, LoadOptions::default())?;
//! let mut merged = PdfDocument::create();
//! for page in merged.copy_pages(&mut loaded, &[1, 0])? {
//!     merged.add_page_handle(page)?;
//! }
//! assert_eq!(merged.page_count()?, 2);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Object model
pub mod content;
pub mod context;
pub mod object;

// Parsing
pub mod document_parser;
pub mod lexer;
pub mod objstm;
pub mod parser;
/// Parser configuration options
pub mod parser_config;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Writing
pub mod writer;

// Graph operations
pub mod copier;
pub mod embedder;
pub mod page_tree;

// High-level API
pub mod document;

// Re-exports
pub use context::{Context, ContextId, Literal, TrailerInfo};
pub use document::{EmbeddedPage, LoadOptions, PageHandle, PdfDocument, SaveOptions};
pub use document_parser::{parse_document, Diagnostic, ParsedDocument};
pub use error::{Error, Result};
pub use object::{Dict, Object, ObjectKind, ObjectRef, PdfString};
pub use parser_config::{ParseOptions, ParseSpeed};
pub use writer::{PdfWriter, Progress, WriterConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
