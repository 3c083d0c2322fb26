//! PDF writing.
//!
//! ## Architecture
//!
//! ```text
//! Context
//!     ↓
//! [PdfWriter] / [SerializeTask] (body, object streams, xref, trailer)
//!     ↓
//! [ObjectSerializer] (object text)
//!     ↓
//! PDF bytes
//! ```
//!
//! ```
//! use pdf_graph::context::Context;
//! use pdf_graph::object::Object;
//! use pdf_graph::writer::{PdfWriter, WriterConfig};
//!
//! let mut ctx = Context::new();
//! ctx.register(Object::from(42));
//! let bytes = PdfWriter::with_config(WriterConfig::classic()).write(&ctx).unwrap();
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::{format_number, ObjectSerializer};
pub use pdf_writer::{PdfWriter, Progress, SerializeTask, WriterConfig};
