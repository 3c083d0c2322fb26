//! Embed a page as a Form XObject.
//!
//! The page's content streams are decoded and joined into a single form
//! stream carrying the page's resources, an explicit bounding box and a
//! transformation matrix:
//!
//! ```text
//! << /Type /XObject /Subtype /Form /FormType 1
//!    /BBox [left bottom right top] /Matrix [a b c d e f]
//!    /Resources << ... >> >>
//! ```

use crate::context::Context;
use crate::copier::{standalone_page, ObjectCopier};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectKind, ObjectRef};
use crate::page_tree::media_box;
use bytes::Bytes;

/// `[a b c d e f]` affine transform.
pub type TransformationMatrix = [f64; 6];

/// The transform that leaves coordinates unchanged.
pub const IDENTITY_MATRIX: TransformationMatrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Region of the page that is kept, in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Left edge
    pub left: f64,
    /// Bottom edge
    pub bottom: f64,
    /// Right edge
    pub right: f64,
    /// Top edge
    pub top: f64,
}

impl BoundingBox {
    /// Box from edge coordinates.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    /// Box from the origin to `width` × `height`.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
}

/// A page prepared for embedding into a destination context.
///
/// The page dictionary held here already lives in the destination: any
/// references it contains point at destination objects.
#[derive(Debug, Clone)]
pub struct PageEmbedder {
    source: ObjectRef,
    page: Dict,
    bounding_box: BoundingBox,
    matrix: TransformationMatrix,
}

impl PageEmbedder {
    /// Prepare `page` from `src` for embedding into `dest`.
    ///
    /// The page and everything it references is copied into `dest` now; the
    /// form itself is built by [`embed_into`](Self::embed_into). Without a
    /// bounding box the full media box size is used, and without a matrix the
    /// identity.
    pub fn from_page(
        src: &Context,
        dest: &mut Context,
        page: ObjectRef,
        bounding_box: Option<BoundingBox>,
        matrix: Option<TransformationMatrix>,
    ) -> Result<Self> {
        let bounding_box = match bounding_box {
            Some(bbox) => bbox,
            None => full_page_box(src, page)?,
        };
        let copied = ObjectCopier::new(src, dest).copy_page_node(page)?;
        Ok(Self {
            source: page,
            page: copied,
            bounding_box,
            matrix: matrix.unwrap_or(IDENTITY_MATRIX),
        })
    }

    /// Prepare a page that already lives in the destination context.
    pub fn from_local_page(
        ctx: &Context,
        page: ObjectRef,
        bounding_box: Option<BoundingBox>,
        matrix: Option<TransformationMatrix>,
    ) -> Result<Self> {
        let bounding_box = match bounding_box {
            Some(bbox) => bbox,
            None => full_page_box(ctx, page)?,
        };
        Ok(Self {
            source: page,
            page: standalone_page(ctx, page)?,
            bounding_box,
            matrix: matrix.unwrap_or(IDENTITY_MATRIX),
        })
    }

    /// Bounding box of the form.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Transformation matrix of the form.
    pub fn matrix(&self) -> TransformationMatrix {
        self.matrix
    }

    /// `right - left` of the bounding box.
    pub fn width(&self) -> f64 {
        self.bounding_box.right - self.bounding_box.left
    }

    /// `top - bottom` of the bounding box.
    pub fn height(&self) -> f64 {
        self.bounding_box.top - self.bounding_box.bottom
    }

    /// Build the form stream and store it in `ctx`.
    ///
    /// The form is assigned to `reference` when one was reserved earlier,
    /// otherwise it is registered under a new number.
    pub fn embed_into(&self, ctx: &mut Context, reference: Option<ObjectRef>) -> Result<ObjectRef> {
        let contents = self
            .page
            .get("Contents")
            .ok_or(Error::MissingPageContents(self.source))?;
        let data = decode_contents(ctx, contents)?;

        let BoundingBox {
            left,
            bottom,
            right,
            top,
        } = self.bounding_box;

        let mut dict = Dict::new();
        dict.insert("Type".to_string(), Object::name("XObject"));
        dict.insert("Subtype".to_string(), Object::name("Form"));
        dict.insert("FormType".to_string(), Object::Integer(1));
        dict.insert(
            "BBox".to_string(),
            Object::Array([left, bottom, right, top].into_iter().map(Object::number).collect()),
        );
        dict.insert(
            "Matrix".to_string(),
            Object::Array(self.matrix.iter().copied().map(Object::number).collect()),
        );
        if let Some(resources) = self.page.get("Resources") {
            dict.insert("Resources".to_string(), resources.clone());
        }
        dict.insert("Length".to_string(), Object::from(data.len()));

        let form = Object::Stream {
            dict,
            data: Bytes::from(data),
        };
        log::debug!("Embedding page {} as a {}x{} form", self.source, self.width(), self.height());

        Ok(match reference {
            Some(reference) => {
                ctx.assign(reference, form);
                reference
            },
            None => ctx.register(form),
        })
    }
}

fn full_page_box(ctx: &Context, page: ObjectRef) -> Result<BoundingBox> {
    let [x1, y1, x2, y2] = media_box(ctx, page)?;
    Ok(BoundingBox::from_size(x2 - x1, y2 - y1))
}

/// Decode every stream named by `Contents` and join them, ending with CRLF.
fn decode_contents(ctx: &Context, contents: &Object) -> Result<Vec<u8>> {
    let streams: Vec<&Object> = match ctx.lookup(contents) {
        Some(Object::Array(items)) => items.iter().map(|item| ctx.lookup(item).unwrap_or(&Object::Null)).collect(),
        Some(stream) => vec![stream],
        None => vec![&Object::Null],
    };

    let mut joined = Vec::new();
    for stream in streams {
        if !stream.is_stream() {
            return Err(Error::UnexpectedObjectKind {
                expected: ObjectKind::Stream,
                found: stream.kind(),
            });
        }
        joined.extend_from_slice(&stream.decode_stream_data()?);
    }
    joined.extend_from_slice(b"\r\n");
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Operation;
    use crate::context::Literal;

    fn page_with_contents(ctx: &mut Context, contents: Object) -> ObjectRef {
        let page = ctx.obj(Literal::dict([
            ("Type", Literal::from("/Page")),
            (
                "MediaBox",
                Literal::Array(vec![0.into(), 0.into(), 200.into(), 100.into()]),
            ),
            ("Contents", Literal::Object(contents)),
        ]));
        ctx.register(page)
    }

    #[test]
    fn test_embed_joins_decoded_streams() {
        let mut src = Context::new();
        let raw = src.flate_stream(b"0 0 m", Literal::empty()).unwrap();
        let raw = src.register(raw);
        let content = src.content_stream(vec![Operation::new("S", vec![])], Literal::empty());
        let content = src.register(content);
        let page = page_with_contents(
            &mut src,
            Object::Array(vec![Object::Reference(raw), Object::Reference(content)]),
        );

        let mut dest = Context::new();
        let embedder = PageEmbedder::from_page(&src, &mut dest, page, None, None).unwrap();
        assert_eq!(embedder.width(), 200.0);
        assert_eq!(embedder.height(), 100.0);

        let form_ref = embedder.embed_into(&mut dest, None).unwrap();
        let form = dest.get(form_ref).unwrap();
        assert!(form.has_type("XObject"));
        let data = form.decode_stream_data().unwrap();
        assert!(data.starts_with(b"0 0 m"));
        assert!(data.ends_with(b"S\n\r\n"));

        let dict = form.as_dict().unwrap();
        assert_eq!(dict["Subtype"], Object::name("Form"));
        assert_eq!(dict["Matrix"].as_array().map(Vec::len), Some(6));
        assert_eq!(dict["BBox"].as_array().unwrap()[2], Object::Integer(200));
    }

    #[test]
    fn test_embed_into_reserved_ref() {
        let mut ctx = Context::new();
        let stream = ctx.stream(&b"q Q"[..], Literal::empty());
        let stream = ctx.register(stream);
        let page = page_with_contents(&mut ctx, Object::Reference(stream));

        let embedder = PageEmbedder::from_local_page(
            &ctx,
            page,
            Some(BoundingBox::new(10.0, 10.0, 60.0, 30.0)),
            Some([2.0, 0.0, 0.0, 2.0, 0.0, 0.0]),
        )
        .unwrap();
        assert_eq!(embedder.width(), 50.0);
        assert_eq!(embedder.height(), 20.0);

        let reserved = ctx.next_ref();
        assert_eq!(embedder.embed_into(&mut ctx, Some(reserved)).unwrap(), reserved);
        assert_eq!(ctx.get(reserved).unwrap().decode_stream_data().unwrap(), b"q Q\r\n");
    }

    #[test]
    fn test_missing_contents() {
        let mut ctx = Context::new();
        let page = ctx.obj(Literal::dict([
            ("Type", Literal::from("/Page")),
            ("MediaBox", Literal::Array(vec![0.into(), 0.into(), 10.into(), 10.into()])),
        ]));
        let page = ctx.register(page);

        let embedder = PageEmbedder::from_local_page(&ctx, page, None, None).unwrap();
        let err = embedder.embed_into(&mut ctx, None).unwrap_err();
        assert!(matches!(err, Error::MissingPageContents(r) if r == page));
    }
}
