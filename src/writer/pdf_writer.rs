//! PDF document writer.
//!
//! Serializes every indirect object of a [`Context`] and appends the
//! cross-reference data and trailer. Two encodings are supported:
//!
//! - classic: `N G obj ... endobj` bodies, a plaintext `xref` table and a
//!   `trailer` dictionary
//! - object streams: streams stay direct, every other object is packed into
//!   Flate-compressed `/ObjStm` containers and a binary `/XRef` stream
//!   replaces the table
//!
//! Serialization is a resumable [`SerializeTask`]. Each call to
//! [`SerializeTask::step`] handles at most `objects_per_tick` objects so a
//! host can interleave other work between steps.

use super::object_serializer::ObjectSerializer;
use crate::context::Context;
use crate::decoders::flate_encode;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use crate::objstm::pack_object_stream;
use crate::xref::{encode_xref_stream, XRefEntry};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;

/// Configuration for PDF generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Header version override; the context's own version when `None`
    pub version: Option<String>,
    /// Pack objects into object streams and write an xref stream
    pub use_object_streams: bool,
    /// Objects handled per [`SerializeTask::step`]
    pub objects_per_tick: usize,
    /// Objects packed into each object stream
    pub objects_per_container: usize,
    /// Whether to Flate-compress content streams
    pub compress: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            version: None,
            use_object_streams: true,
            objects_per_tick: 50,
            objects_per_container: 50,
            compress: false,
        }
    }
}

impl WriterConfig {
    /// Classic xref table output.
    pub fn classic() -> Self {
        Self {
            use_object_streams: false,
            ..Self::default()
        }
    }

    /// Object stream output.
    pub fn object_streams() -> Self {
        Self::default()
    }

    /// Set the header version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the number of objects per step. Zero is treated as one.
    pub fn with_objects_per_tick(mut self, count: usize) -> Self {
        self.objects_per_tick = count.max(1);
        self
    }

    /// Set the number of objects per object stream.
    pub fn with_objects_per_container(mut self, count: usize) -> Self {
        self.objects_per_container = count.clamp(1, u16::MAX as usize);
        self
    }

    /// Enable or disable content stream compression.
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }
}

/// Result of one [`SerializeTask::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More objects remain
    Pending,
    /// Every object has been written; the finished file
    Done(Vec<u8>),
}

/// Writes a [`Context`] to bytes.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    config: WriterConfig,
}

impl PdfWriter {
    /// Create a writer with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with custom configuration.
    pub fn with_config(config: WriterConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Start a resumable serialization of `context`.
    pub fn task<'a>(&self, context: &'a Context) -> SerializeTask<'a> {
        SerializeTask::new(context, self.config.clone())
    }

    /// Serialize `context`, running every step back to back.
    pub fn write(&self, context: &Context) -> Result<Vec<u8>> {
        let mut task = self.task(context);
        loop {
            if let Progress::Done(bytes) = task.step()? {
                log::debug!(
                    "Wrote {} objects in {} steps ({} bytes)",
                    task.objects_visited(),
                    task.steps(),
                    bytes.len()
                );
                return Ok(bytes);
            }
        }
    }

    /// Serialize `context` to a file.
    pub fn save(&self, context: &Context, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.write(context)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// In-progress serialization of one context.
///
/// The context is only borrowed; it is never modified.
#[derive(Debug)]
pub struct SerializeTask<'a> {
    context: &'a Context,
    config: WriterConfig,
    serializer: ObjectSerializer,
    /// Objects in output order
    queue: Vec<(ObjectRef, &'a Object)>,
    cursor: usize,
    /// Objects waiting for the current object stream to fill
    pending: Vec<(ObjectRef, &'a Object)>,
    next_number: u32,
    out: Vec<u8>,
    entries: BTreeMap<u32, XRefEntry>,
    visited: usize,
    steps: usize,
    started: bool,
    finished: bool,
}

impl<'a> SerializeTask<'a> {
    fn new(context: &'a Context, config: WriterConfig) -> Self {
        let mut direct = Vec::new();
        let mut packable = Vec::new();
        for (reference, object) in context.enumerate_indirect_objects() {
            if reference.id == 0 {
                log::warn!("Skipping object 0, which is reserved for the free list head");
                continue;
            }
            if config.use_object_streams && can_pack(reference, object) {
                packable.push((reference, object));
            } else {
                direct.push((reference, object));
            }
        }
        direct.extend(packable);

        Self {
            context,
            serializer: ObjectSerializer::compact().with_content_compression(config.compress),
            queue: direct,
            cursor: 0,
            pending: Vec::new(),
            next_number: context.largest_object_number() + 1,
            out: Vec::new(),
            entries: BTreeMap::new(),
            visited: 0,
            steps: 0,
            started: false,
            finished: false,
            config,
        }
    }

    /// Objects visited so far.
    pub fn objects_visited(&self) -> usize {
        self.visited
    }

    /// Steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Whether the final buffer has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Write up to `objects_per_tick` more objects.
    ///
    /// The last step also writes the cross-reference data and returns the
    /// whole file. Stepping a finished task returns an empty buffer.
    pub fn step(&mut self) -> Result<Progress> {
        if self.finished {
            return Ok(Progress::Done(Vec::new()));
        }
        if !self.started {
            self.write_header()?;
            self.started = true;
        }

        let end = (self.cursor + self.config.objects_per_tick.max(1)).min(self.queue.len());
        while self.cursor < end {
            let (reference, object) = self.queue[self.cursor];
            self.cursor += 1;
            self.visited += 1;

            if self.config.use_object_streams && can_pack(reference, object) {
                self.pending.push((reference, object));
                if self.pending.len() >= self.config.objects_per_container.clamp(1, u16::MAX as usize) {
                    self.flush_container()?;
                }
            } else {
                self.write_direct(reference, object);
            }
        }
        self.steps += 1;

        if self.cursor < self.queue.len() {
            log::trace!("Step {}: {}/{} objects written", self.steps, self.cursor, self.queue.len());
            return Ok(Progress::Pending);
        }

        self.flush_container()?;
        if self.config.use_object_streams {
            self.write_xref_stream()?;
        } else {
            self.write_xref_table()?;
        }
        self.finished = true;
        Ok(Progress::Done(std::mem::take(&mut self.out)))
    }

    fn write_header(&mut self) -> Result<()> {
        let version = self.config.version.as_deref().unwrap_or(&self.context.version);
        writeln!(self.out, "%PDF-{}", version)?;
        // Binary marker
        self.out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Ok(())
    }

    fn write_direct(&mut self, reference: ObjectRef, object: &Object) {
        self.entries
            .insert(reference.id, XRefEntry::uncompressed(self.out.len() as u64, reference.gen));
        self.serializer.write_indirect(&mut self.out, reference, object);
    }

    fn allocate(&mut self) -> ObjectRef {
        let reference = ObjectRef::new(self.next_number, 0);
        self.next_number += 1;
        reference
    }

    fn flush_container(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let container = self.allocate();
        let stream = pack_object_stream(&self.pending, &self.serializer)?;
        for (index, (reference, _)) in self.pending.iter().enumerate() {
            self.entries
                .insert(reference.id, XRefEntry::compressed(container.id as u64, index as u16));
        }
        log::trace!("Packed {} objects into object stream {}", self.pending.len(), container);
        self.pending.clear();
        self.write_direct(container, &stream);
        Ok(())
    }

    /// Trailer entries shared by both encodings.
    fn trailer_entries(&self, dict: &mut Dict) {
        let info = &self.context.trailer_info;
        if let Some(root) = info.root {
            dict.insert("Root".to_string(), Object::Reference(root));
        }
        if let Some(encrypt) = &info.encrypt {
            dict.insert("Encrypt".to_string(), encrypt.clone());
        }
        if let Some(info_ref) = info.info {
            dict.insert("Info".to_string(), Object::Reference(info_ref));
        }
        if let Some(id) = &info.id {
            dict.insert("ID".to_string(), id.clone());
        }
    }

    fn write_xref_table(&mut self) -> Result<()> {
        let size = self.entries.keys().next_back().map_or(1, |last| last + 1);
        let xref_offset = self.out.len();

        writeln!(self.out, "xref")?;
        writeln!(self.out, "0 {}", size)?;
        for number in 0..size {
            match self.entries.get(&number) {
                Some(entry) => writeln!(self.out, "{:010} {:05} n ", entry.offset, entry.generation)?,
                None => writeln!(self.out, "0000000000 65535 f ")?,
            }
        }

        let mut trailer = Dict::new();
        trailer.insert("Size".to_string(), Object::from(size as i64));
        self.trailer_entries(&mut trailer);

        writeln!(self.out, "trailer")?;
        self.serializer.write_object(&mut self.out, &Object::Dictionary(trailer));
        write!(self.out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
        Ok(())
    }

    fn write_xref_stream(&mut self) -> Result<()> {
        let xref_ref = self.allocate();
        let xref_offset = self.out.len();
        self.entries
            .insert(xref_ref.id, XRefEntry::uncompressed(xref_offset as u64, 0));

        let mut rows = vec![(0, XRefEntry::free(0, u16::MAX))];
        rows.extend(self.entries.iter().map(|(number, entry)| (*number, *entry)));
        let encoded = encode_xref_stream(&rows)?;
        let data = flate_encode(&encoded.data)?;

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XRef"));
        dict.insert("Size".to_string(), Object::from(xref_ref.id as i64 + 1));
        dict.insert(
            "W".to_string(),
            Object::Array(encoded.widths.iter().map(|w| Object::from(*w)).collect()),
        );
        dict.insert(
            "Index".to_string(),
            Object::Array(
                encoded
                    .index
                    .iter()
                    .flat_map(|(start, count)| [Object::from(*start as i64), Object::from(*count as i64)])
                    .collect(),
            ),
        );
        dict.insert("Filter".to_string(), Object::name("FlateDecode"));
        self.trailer_entries(&mut dict);

        let stream = Object::Stream {
            dict,
            data: Bytes::from(data),
        };
        self.serializer.write_indirect(&mut self.out, xref_ref, &stream);
        write!(self.out, "startxref\n{}\n%%EOF\n", xref_offset)?;
        Ok(())
    }
}

/// Streams and objects with a non-zero generation stay direct.
fn can_pack(reference: ObjectRef, object: &Object) -> bool {
    reference.gen == 0 && !object.is_stream()
}
