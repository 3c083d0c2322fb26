//! High-level document API.
//!
//! [`PdfDocument`] owns one [`Context`] plus the catalog and page-tree refs
//! it needs for page bookkeeping. Everything else (parsing, writing, copying,
//! embedding) is delegated to the graph-level modules.
//!
//! # Example
//!
//! ```
//! use pdf_graph::document::{LoadOptions, PdfDocument, SaveOptions};
//!
//! let mut doc = PdfDocument::create();
//! doc.set_title("Hello");
//! doc.add_page([300.0, 400.0])?;
//!
//! let bytes = doc.save(SaveOptions::default())?;
//! let reloaded = PdfDocument::load(&bytes, LoadOptions::default())?;
//! assert_eq!(reloaded.page_count()?, 1);
//! assert_eq!(reloaded.title().as_deref(), Some("Hello"));
//! # Ok::<(), pdf_graph::error::Error>(())
//! ```

use crate::context::{Context, ContextId};
use crate::copier::ObjectCopier;
use crate::document_parser::{parse_document, Diagnostic};
use crate::embedder::{BoundingBox, PageEmbedder, TransformationMatrix};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef, PdfString};
use crate::page_tree::{inherited_attribute, media_box, PageTree};
use crate::parser_config::ParseOptions;
use crate::writer::{PdfWriter, WriterConfig};
use chrono::{DateTime, Utc};
use std::path::Path;

/// A4 portrait in points.
pub const A4: [f64; 2] = [595.28, 841.89];

/// US Letter portrait in points.
pub const LETTER: [f64; 2] = [612.0, 792.0];

/// Default `Producer` and `Creator`.
const PRODUCER: &str = concat!("pdf_graph ", env!("CARGO_PKG_VERSION"));

/// Options for [`PdfDocument::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Parser behavior
    pub parse: ParseOptions,
    /// Refresh `Producer` and `ModDate` after loading
    pub update_metadata: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            update_metadata: true,
        }
    }
}

/// Options for [`PdfDocument::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Object streams and an xref stream instead of a classic table
    pub use_object_streams: bool,
    /// Add an A4 page when the document has none
    pub add_default_page: bool,
    /// Objects written per writer step
    pub objects_per_tick: usize,
    /// Flate-compress content streams
    pub compress_streams: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            use_object_streams: true,
            add_default_page: true,
            objects_per_tick: 50,
            compress_streams: false,
        }
    }
}

impl SaveOptions {
    /// Classic xref table output.
    pub fn classic() -> Self {
        Self {
            use_object_streams: false,
            ..Self::default()
        }
    }

    fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            use_object_streams: self.use_object_streams,
            compress: self.compress_streams,
            ..WriterConfig::default()
        }
        .with_objects_per_tick(self.objects_per_tick)
    }
}

/// A page of a specific document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageHandle {
    /// Context the page lives in
    pub context: ContextId,
    /// The page's leaf node
    pub page_ref: ObjectRef,
}

/// A page embedded as a Form XObject.
///
/// The form stream is written on the next [`PdfDocument::flush`] or
/// [`PdfDocument::save`]; the ref is valid immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddedPage {
    form_ref: ObjectRef,
    width: f64,
    height: f64,
}

impl EmbeddedPage {
    /// Ref of the form XObject.
    pub fn form_ref(&self) -> ObjectRef {
        self.form_ref
    }

    /// Width of the bounding box.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Height of the bounding box.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Width and height multiplied by `factor`.
    pub fn scale(&self, factor: f64) -> (f64, f64) {
        (self.width * factor, self.height * factor)
    }
}

#[derive(Debug)]
struct PendingEmbed {
    page: EmbeddedPage,
    embedder: PageEmbedder,
    done: bool,
}

/// A PDF document held in memory.
#[derive(Debug)]
pub struct PdfDocument {
    context: Context,
    catalog: ObjectRef,
    page_tree: PageTree,
    embedded_pages: Vec<PendingEmbed>,
    diagnostics: Vec<Diagnostic>,
}

impl PdfDocument {
    /// Create an empty document.
    pub fn create() -> Self {
        let mut context = Context::new();
        let page_tree = PageTree::create(&mut context);

        let mut catalog = Dict::new();
        catalog.insert("Type".to_string(), Object::name("Catalog"));
        catalog.insert("Pages".to_string(), Object::Reference(page_tree.root()));
        let catalog = context.register(Object::Dictionary(catalog));
        context.trailer_info.root = Some(catalog);

        let mut doc = Self {
            context,
            catalog,
            page_tree,
            embedded_pages: Vec::new(),
            diagnostics: Vec::new(),
        };
        doc.update_info_dict();
        doc
    }

    /// Parse a document from bytes.
    ///
    /// # Errors
    ///
    /// Parse failures, [`Error::EncryptedDocument`] unless
    /// `ignore_encryption` is set, and [`Error::MissingCatalog`] when the
    /// trailer's `Root` is not a catalog with `Pages`.
    pub fn load(bytes: &[u8], options: LoadOptions) -> Result<Self> {
        let parsed = parse_document(bytes, options.parse)?;
        let context = parsed.context;

        let encrypted = context
            .trailer_info
            .encrypt
            .as_ref()
            .and_then(|e| context.lookup(e))
            .is_some_and(|e| !e.is_null());
        if encrypted && !options.parse.ignore_encryption {
            return Err(Error::EncryptedDocument);
        }

        let root = context.trailer_info.root;
        let pages = root
            .and_then(|r| context.get(r))
            .and_then(Object::as_dict)
            .and_then(|catalog| catalog.get("Pages"))
            .and_then(Object::as_reference)
            .ok_or(Error::MissingCatalog(root))?;
        let catalog = root.ok_or(Error::MissingCatalog(root))?;

        let mut doc = Self {
            context,
            catalog,
            page_tree: PageTree::new(pages),
            embedded_pages: Vec::new(),
            diagnostics: parsed.diagnostics,
        };
        if options.update_metadata {
            doc.update_info_dict();
        }
        Ok(doc)
    }

    /// Read and parse a file.
    pub fn open(path: impl AsRef<Path>, options: LoadOptions) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::load(&bytes, options)
    }

    /// The object store.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the object store.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The document catalog.
    pub fn catalog_ref(&self) -> ObjectRef {
        self.catalog
    }

    /// The page tree.
    pub fn page_tree(&self) -> PageTree {
        self.page_tree
    }

    /// Malformed objects skipped while loading.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Header version.
    pub fn version(&self) -> &str {
        &self.context.version
    }

    // ---- Metadata ----

    /// Set `Producer` and `ModDate`, and `Creator`/`CreationDate` if missing.
    pub fn update_info_dict(&mut self) {
        let now = Utc::now();
        let info = self.info_dict_ref();
        let has = |ctx: &Context, key: &str| ctx.dict(info).is_ok_and(|d| d.contains_key(key));
        let has_creator = has(&self.context, "Creator");
        let has_creation_date = has(&self.context, "CreationDate");

        self.set_producer(PRODUCER);
        self.set_modification_date(now);
        if !has_creator {
            self.set_creator(PRODUCER);
        }
        if !has_creation_date {
            self.set_creation_date(now);
        }
    }

    /// The Info dictionary, registering an empty one when there is none.
    pub fn info_dict_ref(&mut self) -> ObjectRef {
        if let Some(info) = self.context.trailer_info.info {
            if self.context.dict(info).is_ok() {
                return info;
            }
        }
        let info = self.context.register(Object::Dictionary(Dict::new()));
        self.context.trailer_info.info = Some(info);
        info
    }

    fn set_info(&mut self, key: &str, value: Object) {
        let info = self.info_dict_ref();
        if let Ok(dict) = self.context.dict_mut(info) {
            dict.insert(key.to_string(), value);
        }
    }

    fn info_text(&self, key: &str) -> Option<String> {
        let info = self.context.trailer_info.info?;
        let value = self.context.dict(info).ok()?.get(key)?;
        self.context.lookup(value)?.as_string().map(PdfString::to_text)
    }

    /// Set the document title.
    pub fn set_title(&mut self, title: &str) {
        self.set_info("Title", Object::String(PdfString::from_text(title)));
    }

    /// Document title.
    pub fn title(&self) -> Option<String> {
        self.info_text("Title")
    }

    /// Set the document author.
    pub fn set_author(&mut self, author: &str) {
        self.set_info("Author", Object::String(PdfString::from_text(author)));
    }

    /// Document author.
    pub fn author(&self) -> Option<String> {
        self.info_text("Author")
    }

    /// Set the document subject.
    pub fn set_subject(&mut self, subject: &str) {
        self.set_info("Subject", Object::String(PdfString::from_text(subject)));
    }

    /// Set the keywords, stored space-separated.
    pub fn set_keywords(&mut self, keywords: &[&str]) {
        self.set_info("Keywords", Object::String(PdfString::from_text(&keywords.join(" "))));
    }

    /// Set the creating application.
    pub fn set_creator(&mut self, creator: &str) {
        self.set_info("Creator", Object::String(PdfString::from_text(creator)));
    }

    /// Set the producing application.
    pub fn set_producer(&mut self, producer: &str) {
        self.set_info("Producer", Object::String(PdfString::from_text(producer)));
    }

    /// Set the creation date.
    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.set_info("CreationDate", Object::String(PdfString::literal(format_date(date))));
    }

    /// Set the modification date.
    pub fn set_modification_date(&mut self, date: DateTime<Utc>) {
        self.set_info("ModDate", Object::String(PdfString::literal(format_date(date))));
    }

    /// Set the catalog's natural language, e.g. `en-us`.
    pub fn set_language(&mut self, language: &str) -> Result<()> {
        self.context
            .dict_mut(self.catalog)?
            .insert("Lang".to_string(), Object::String(PdfString::from_text(language)));
        Ok(())
    }

    // ---- Pages ----

    /// Number of pages.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.page_tree.leaves(&self.context)?.len())
    }

    /// Pages in document order.
    pub fn pages(&self) -> Result<Vec<PageHandle>> {
        let context = self.context.id();
        Ok(self
            .page_tree
            .leaves(&self.context)?
            .into_iter()
            .map(|page_ref| PageHandle { context, page_ref })
            .collect())
    }

    /// The page at `index`.
    pub fn page(&self, index: usize) -> Result<PageHandle> {
        let pages = self.pages()?;
        let max = pages.len().saturating_sub(1);
        pages
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange { index, min: 0, max })
    }

    /// Append a blank page of `size` (width, height).
    pub fn add_page(&mut self, size: [f64; 2]) -> Result<PageHandle> {
        let page = self.create_page(size);
        let index = self.page_count()?;
        self.insert_page(index, Some(page))
    }

    /// Insert `page` so that it becomes the page at `index`; `None` inserts a
    /// blank A4 page.
    ///
    /// # Errors
    ///
    /// [`Error::IndexOutOfRange`] outside `[0, page_count]` and
    /// [`Error::ForeignPage`] for a page of another document.
    pub fn insert_page(&mut self, index: usize, page: Option<PageHandle>) -> Result<PageHandle> {
        let count = self.page_count()?;
        if index > count {
            return Err(Error::IndexOutOfRange {
                index,
                min: 0,
                max: count,
            });
        }
        let page = match page {
            Some(page) => {
                self.check_owned(page)?;
                page
            },
            None => self.create_page(A4),
        };

        let parent = self
            .page_tree
            .insert_leaf_node(&mut self.context, page.page_ref, index)?
            .unwrap_or(self.page_tree.root());
        self.context
            .dict_mut(page.page_ref)?
            .insert("Parent".to_string(), Object::Reference(parent));
        log::debug!("Inserted page {} at index {}", page.page_ref, index);
        Ok(page)
    }

    /// Remove the page at `index`. The page object stays in the context.
    pub fn remove_page(&mut self, index: usize) -> Result<()> {
        let count = self.page_count()?;
        if count == 0 {
            return Err(Error::RemovePageFromEmptyDocument);
        }
        if index >= count {
            return Err(Error::IndexOutOfRange {
                index,
                min: 0,
                max: count - 1,
            });
        }
        let removed = self.page_tree.remove_leaf_node(&mut self.context, index)?;
        log::debug!("Removed page {} from index {}", removed, index);
        Ok(())
    }

    /// Copy pages of `src` into this document.
    ///
    /// The copies are registered but not inserted; pass them to
    /// [`insert_page`](Self::insert_page) or [`add_page_handle`](Self::add_page_handle).
    /// Objects shared between the copied pages are copied once. Pending
    /// embeds of `src` are flushed first.
    pub fn copy_pages(&mut self, src: &mut PdfDocument, indices: &[usize]) -> Result<Vec<PageHandle>> {
        src.flush()?;
        let src_pages = src.page_tree.leaves(&src.context)?;
        let max = src_pages.len().saturating_sub(1);
        let context = self.context.id();

        let mut copier = ObjectCopier::new(&src.context, &mut self.context);
        let mut copied = Vec::with_capacity(indices.len());
        for &index in indices {
            let page = *src_pages
                .get(index)
                .ok_or(Error::IndexOutOfRange { index, min: 0, max })?;
            copied.push(PageHandle {
                context,
                page_ref: copier.copy_page(page)?,
            });
        }
        log::debug!("Copied {} pages ({} objects)", copied.len(), copier.copied_count());
        Ok(copied)
    }

    /// Append an existing page of this document.
    pub fn add_page_handle(&mut self, page: PageHandle) -> Result<PageHandle> {
        let index = self.page_count()?;
        self.insert_page(index, Some(page))
    }

    fn create_page(&mut self, [width, height]: [f64; 2]) -> PageHandle {
        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("Page"));
        dict.insert("Parent".to_string(), Object::Reference(self.page_tree.root()));
        dict.insert("Resources".to_string(), Object::Dictionary(Dict::new()));
        dict.insert("MediaBox".to_string(), rect(0.0, 0.0, width, height));
        PageHandle {
            context: self.context.id(),
            page_ref: self.context.register(Object::Dictionary(dict)),
        }
    }

    fn check_owned(&self, page: PageHandle) -> Result<()> {
        if page.context == self.context.id() {
            Ok(())
        } else {
            Err(Error::ForeignPage)
        }
    }

    /// Width and height of the page's (possibly inherited) `MediaBox`.
    pub fn page_size(&self, page: PageHandle) -> Result<(f64, f64)> {
        self.check_owned(page)?;
        let [x1, y1, x2, y2] = media_box(&self.context, page.page_ref)?;
        Ok((x2 - x1, y2 - y1))
    }

    /// Replace the page's `MediaBox` with `[0 0 width height]`.
    pub fn set_page_size(&mut self, page: PageHandle, width: f64, height: f64) -> Result<()> {
        self.check_owned(page)?;
        self.context
            .dict_mut(page.page_ref)?
            .insert("MediaBox".to_string(), rect(0.0, 0.0, width, height));
        Ok(())
    }

    /// The page's (possibly inherited) `Rotate`, 0 when absent.
    pub fn page_rotation(&self, page: PageHandle) -> Result<i64> {
        self.check_owned(page)?;
        Ok(inherited_attribute(&self.context, page.page_ref, "Rotate")
            .and_then(|value| self.context.lookup(&value).and_then(Object::as_number))
            .map_or(0, |degrees| degrees as i64))
    }

    // ---- Embedding ----

    /// Embed page `index` of `src` as a form XObject.
    ///
    /// The page and its resources are copied now; the form is written on the
    /// next [`flush`](Self::flush).
    pub fn embed_page(
        &mut self,
        src: &PdfDocument,
        index: usize,
        bounding_box: Option<BoundingBox>,
        matrix: Option<TransformationMatrix>,
    ) -> Result<EmbeddedPage> {
        let page = src.page(index)?;
        let embedder = PageEmbedder::from_page(&src.context, &mut self.context, page.page_ref, bounding_box, matrix)?;
        Ok(self.queue_embed(embedder))
    }

    /// Embed one of this document's own pages as a form XObject.
    pub fn embed_own_page(
        &mut self,
        index: usize,
        bounding_box: Option<BoundingBox>,
        matrix: Option<TransformationMatrix>,
    ) -> Result<EmbeddedPage> {
        let page = self.page(index)?;
        let embedder = PageEmbedder::from_local_page(&self.context, page.page_ref, bounding_box, matrix)?;
        Ok(self.queue_embed(embedder))
    }

    fn queue_embed(&mut self, embedder: PageEmbedder) -> EmbeddedPage {
        let page = EmbeddedPage {
            form_ref: self.context.next_ref(),
            width: embedder.width(),
            height: embedder.height(),
        };
        self.embedded_pages.push(PendingEmbed {
            page,
            embedder,
            done: false,
        });
        page
    }

    /// A page embedded earlier, by form ref.
    pub fn embedded_page(&self, form_ref: ObjectRef) -> Option<EmbeddedPage> {
        self.embedded_pages
            .iter()
            .find(|pending| pending.page.form_ref == form_ref)
            .map(|pending| pending.page)
    }

    /// Write every queued embedded page into the context. Each page is
    /// written once no matter how often this is called.
    pub fn flush(&mut self) -> Result<()> {
        for pending in self.embedded_pages.iter_mut().filter(|p| !p.done) {
            pending
                .embedder
                .embed_into(&mut self.context, Some(pending.page.form_ref))?;
            pending.done = true;
        }
        Ok(())
    }

    // ---- Saving ----

    /// Serialize the document.
    pub fn save(&mut self, options: SaveOptions) -> Result<Vec<u8>> {
        if options.add_default_page && self.page_count()? == 0 {
            self.add_page(A4)?;
        }
        self.flush()?;
        PdfWriter::with_config(options.writer_config()).write(&self.context)
    }

    /// Serialize the document to a file.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>, options: SaveOptions) -> Result<()> {
        let bytes = self.save(options)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for PdfDocument {
    fn default() -> Self {
        Self::create()
    }
}

fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Object {
    Object::Array(vec![
        Object::number(x1),
        Object::number(y1),
        Object::number(x2),
        Object::number(y2),
    ])
}

/// `D:YYYYMMDDHHmmSSZ`
fn format_date(date: DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_create_has_catalog_and_info() {
        let doc = PdfDocument::create();
        let ctx = doc.context();
        assert_eq!(ctx.trailer_info.root, Some(doc.catalog_ref()));
        assert!(ctx.get(doc.catalog_ref()).unwrap().has_type("Catalog"));
        // Page tree registered before the catalog
        assert!(doc.page_tree().root() < doc.catalog_ref());

        let info = ctx.dict(ctx.trailer_info.info.unwrap()).unwrap();
        for key in ["Producer", "Creator", "CreationDate", "ModDate"] {
            assert!(info.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_update_info_keeps_creator() {
        let mut doc = PdfDocument::create();
        doc.set_creator("someone else");
        doc.update_info_dict();
        let info = doc.context().dict(doc.context().trailer_info.info.unwrap()).unwrap();
        assert_eq!(info["Creator"], Object::String(PdfString::literal("someone else")));
    }

    #[test]
    fn test_format_date() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_date(date), "D:20240309070501Z");
    }

    #[test]
    fn test_insert_and_remove_pages() {
        let mut doc = PdfDocument::create();
        let a = doc.add_page(A4).unwrap();
        let b = doc.add_page(LETTER).unwrap();
        let c = doc.insert_page(1, None).unwrap();
        assert_eq!(doc.pages().unwrap(), vec![a, c, b]);
        assert_eq!(doc.page_size(b).unwrap(), (612.0, 792.0));

        doc.remove_page(0).unwrap();
        assert_eq!(doc.pages().unwrap(), vec![c, b]);
        assert!(matches!(
            doc.remove_page(2),
            Err(Error::IndexOutOfRange { index: 2, min: 0, max: 1 })
        ));
        assert!(matches!(
            doc.insert_page(5, None),
            Err(Error::IndexOutOfRange { index: 5, min: 0, max: 2 })
        ));
    }

    #[test]
    fn test_remove_from_empty_document() {
        let mut doc = PdfDocument::create();
        assert!(matches!(doc.remove_page(0), Err(Error::RemovePageFromEmptyDocument)));
    }

    #[test]
    fn test_foreign_page_rejected() {
        let mut a = PdfDocument::create();
        let mut b = PdfDocument::create();
        let page = b.add_page(A4).unwrap();
        assert!(matches!(a.insert_page(0, Some(page)), Err(Error::ForeignPage)));
    }

    #[test]
    fn test_page_rotation_defaults_to_zero() {
        let mut doc = PdfDocument::create();
        let page = doc.add_page(A4).unwrap();
        assert_eq!(doc.page_rotation(page).unwrap(), 0);
        let root = doc.page_tree().root();
        doc.context_mut()
            .dict_mut(root)
            .unwrap()
            .insert("Rotate".to_string(), Object::Integer(90));
        assert_eq!(doc.page_rotation(page).unwrap(), 90);
    }

    #[test]
    fn test_flush_embeds_once() {
        let mut doc = PdfDocument::create();
        let page = doc.add_page([100.0, 50.0]).unwrap();
        let contents = doc.context_mut().register(Object::Stream {
            dict: Dict::new(),
            data: bytes::Bytes::from_static(b"0 0 m"),
        });
        doc.context_mut()
            .dict_mut(page.page_ref)
            .unwrap()
            .insert("Contents".to_string(), Object::Reference(contents));

        let embedded = doc.embed_own_page(0, None, None).unwrap();
        assert_eq!((embedded.width(), embedded.height()), (100.0, 50.0));
        assert!(doc.context().get(embedded.form_ref()).is_none());

        doc.flush().unwrap();
        let count = doc.context().object_count();
        doc.flush().unwrap();
        assert_eq!(doc.context().object_count(), count);
        assert!(doc.context().get(embedded.form_ref()).unwrap().is_stream());
        assert_eq!(doc.embedded_page(embedded.form_ref()), Some(embedded));
    }
}
