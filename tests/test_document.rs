//! Integration tests for the document API: load/save, metadata, page
//! operations and page embedding.

use pdf_graph::document::{LoadOptions, PdfDocument, SaveOptions, A4, LETTER};
use pdf_graph::embedder::BoundingBox;
use pdf_graph::error::Error;
use pdf_graph::object::{Dict, Object};
use pdf_graph::parser_config::ParseOptions;
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a classic file from object bodies numbered from 1.
fn classic_file(bodies: &[&str], trailer: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.6\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(format!("trailer\n{}\nstartxref\n{}\n%%EOF\n", trailer, xref).as_bytes());
    out
}

/// A one-page document with a content stream.
fn doc_with_drawing() -> PdfDocument {
    let mut doc = PdfDocument::create();
    let page = doc.add_page([400.0, 300.0]).unwrap();
    let ctx = doc.context_mut();
    let contents = ctx.stream(&b"0 0 m 400 300 l S"[..], pdf_graph::Literal::empty());
    let contents = ctx.register(contents);
    ctx.dict_mut(page.page_ref)
        .unwrap()
        .insert("Contents".to_string(), Object::Reference(contents));
    doc
}

mod load_tests {
    use super::*;

    #[test]
    fn test_encrypted_document_rejected() {
        init_logging();
        let pdf = classic_file(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Filter /Standard /V 2 >>",
            ],
            "<< /Size 4 /Root 1 0 R /Encrypt 3 0 R >>",
        );

        let err = PdfDocument::load(&pdf, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::EncryptedDocument));

        let options = LoadOptions {
            parse: ParseOptions::default().with_ignore_encryption(true),
            update_metadata: false,
        };
        let doc = PdfDocument::load(&pdf, options).unwrap();
        assert_eq!(doc.page_count().unwrap(), 0);
        assert_eq!(doc.version(), "1.6");
    }

    #[test]
    fn test_dangling_encrypt_ref_is_not_encryption() {
        let pdf = classic_file(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "<< /Size 3 /Root 1 0 R /Encrypt 9 0 R >>",
        );
        assert!(PdfDocument::load(&pdf, LoadOptions::default()).is_ok());
    }

    #[test]
    fn test_missing_catalog() {
        let pdf = classic_file(&["<< /Type /Catalog >>"], "<< /Size 2 /Root 1 0 R >>");
        let err = PdfDocument::load(&pdf, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingCatalog(Some(r)) if r.id == 1));
    }

    #[test]
    fn test_load_without_metadata_update() {
        let pdf = classic_file(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "<< /Size 3 /Root 1 0 R >>",
        );
        let options = LoadOptions {
            update_metadata: false,
            ..LoadOptions::default()
        };
        let doc = PdfDocument::load(&pdf, options).unwrap();
        assert!(doc.context().trailer_info.info.is_none());

        let doc = PdfDocument::load(&pdf, LoadOptions::default()).unwrap();
        assert!(doc.context().trailer_info.info.is_some());
    }

    #[test]
    fn test_malformed_object_reports_diagnostic() {
        let pdf = classic_file(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Broken ) >>",
            ],
            "<< /Size 4 /Root 1 0 R >>",
        );

        let doc = PdfDocument::load(&pdf, LoadOptions::default()).unwrap();
        assert_eq!(doc.diagnostics().len(), 1);
        assert_eq!(doc.page_count().unwrap(), 0);

        let strict = LoadOptions {
            parse: ParseOptions::strict(),
            ..LoadOptions::default()
        };
        assert!(PdfDocument::load(&pdf, strict).is_err());
    }
}

mod save_tests {
    use super::*;

    #[test]
    fn test_save_and_open_file() {
        init_logging();
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.pdf");

        let mut doc = PdfDocument::create();
        doc.set_title("Quarterly report");
        doc.set_author("Zoë");
        doc.set_subject("Numbers");
        doc.set_keywords(&["alpha", "beta"]);
        doc.set_language("en-us").unwrap();
        doc.add_page(LETTER).unwrap();
        doc.save_to_file(&path, SaveOptions::default()).unwrap();

        let reopened = PdfDocument::open(&path, LoadOptions::default()).unwrap();
        assert_eq!(reopened.title().as_deref(), Some("Quarterly report"));
        assert_eq!(reopened.author().as_deref(), Some("Zoë"));
        assert_eq!(reopened.page_count().unwrap(), 1);

        let catalog = reopened.context().dict(reopened.catalog_ref()).unwrap();
        assert_eq!(catalog["Lang"], Object::string("en-us"));
    }

    #[test]
    fn test_default_page_added_on_save() {
        let mut doc = PdfDocument::create();
        let bytes = doc.save(SaveOptions::classic()).unwrap();
        assert_eq!(doc.page_count().unwrap(), 1);

        let reloaded = PdfDocument::load(&bytes, LoadOptions::default()).unwrap();
        let page = reloaded.page(0).unwrap();
        assert_eq!(reloaded.page_size(page).unwrap(), (A4[0], A4[1]));
    }

    #[test]
    fn test_no_default_page() {
        let mut doc = PdfDocument::create();
        let options = SaveOptions {
            add_default_page: false,
            ..SaveOptions::default()
        };
        let bytes = doc.save(options).unwrap();
        let reloaded = PdfDocument::load(&bytes, LoadOptions::default()).unwrap();
        assert_eq!(reloaded.page_count().unwrap(), 0);
    }

    #[test]
    fn test_compressed_content_streams_reload() {
        let mut doc = PdfDocument::create();
        let page = doc.add_page(A4).unwrap();
        let ctx = doc.context_mut();
        let content = ctx.content_stream(
            vec![pdf_graph::content::Operation::new("re", vec![0.into(), 0.into(), 10.into(), 10.into()])],
            pdf_graph::Literal::empty(),
        );
        let content = ctx.register(content);
        ctx.dict_mut(page.page_ref)
            .unwrap()
            .insert("Contents".to_string(), Object::Reference(content));

        let options = SaveOptions {
            compress_streams: true,
            ..SaveOptions::default()
        };
        let bytes = doc.save(options).unwrap();
        let reloaded = PdfDocument::load(&bytes, LoadOptions::default()).unwrap();
        let stream = reloaded.context().get(content).unwrap();
        assert_eq!(stream.decode_stream_data().unwrap(), b"0 0 10 10 re\n");
    }
}

mod page_tests {
    use super::*;

    #[test]
    fn test_page_operations_round_trip() {
        let mut doc = PdfDocument::create();
        for width in [100.0, 200.0, 300.0] {
            doc.add_page([width, 100.0]).unwrap();
        }
        doc.insert_page(0, None).unwrap();
        doc.remove_page(2).unwrap();

        let bytes = doc.save(SaveOptions::default()).unwrap();
        let reloaded = PdfDocument::load(&bytes, LoadOptions::default()).unwrap();
        let widths: Vec<f64> = reloaded
            .pages()
            .unwrap()
            .into_iter()
            .map(|page| reloaded.page_size(page).unwrap().0)
            .collect();
        assert_eq!(widths, vec![A4[0], 100.0, 300.0]);
    }

    #[test]
    fn test_set_page_size_and_rotation() {
        let mut doc = PdfDocument::create();
        let page = doc.add_page(A4).unwrap();
        doc.set_page_size(page, 50.0, 60.0).unwrap();
        assert_eq!(doc.page_size(page).unwrap(), (50.0, 60.0));

        doc.context_mut()
            .dict_mut(page.page_ref)
            .unwrap()
            .insert("Rotate".to_string(), Object::Integer(180));
        assert_eq!(doc.page_rotation(page).unwrap(), 180);
    }

    #[test]
    fn test_foreign_page_helpers_rejected() {
        let mut a = PdfDocument::create();
        let b_page = PdfDocument::create().add_page(A4).unwrap();
        assert!(matches!(a.page_size(b_page), Err(Error::ForeignPage)));
        assert!(matches!(a.set_page_size(b_page, 1.0, 1.0), Err(Error::ForeignPage)));
    }
}

mod embed_tests {
    use super::*;

    #[test]
    fn test_embed_page_from_other_document() {
        init_logging();
        let src = doc_with_drawing();
        let mut dest = PdfDocument::create();

        let embedded = dest
            .embed_page(&src, 0, Some(BoundingBox::new(50.0, 50.0, 150.0, 100.0)), None)
            .unwrap();
        assert_eq!((embedded.width(), embedded.height()), (100.0, 50.0));
        assert_eq!(embedded.scale(0.5), (50.0, 25.0));

        let bytes = dest.save(SaveOptions::default()).unwrap();
        let reloaded = PdfDocument::load(&bytes, LoadOptions::default()).unwrap();
        let form = reloaded.context().get(embedded.form_ref()).unwrap();
        let dict: &Dict = form.as_dict().unwrap();
        assert_eq!(dict["Subtype"], Object::name("Form"));
        assert_eq!(
            dict["BBox"],
            Object::Array(vec![50.into(), 50.into(), 150.into(), 100.into()])
        );
        assert_eq!(dict["Matrix"].as_array().unwrap()[0], Object::Integer(1));
        assert_eq!(form.decode_stream_data().unwrap(), b"0 0 m 400 300 l S\r\n");
    }

    #[test]
    fn test_embed_page_without_contents_fails_on_flush() {
        let mut doc = PdfDocument::create();
        doc.add_page(A4).unwrap();
        doc.embed_own_page(0, None, None).unwrap();
        assert!(matches!(doc.flush(), Err(Error::MissingPageContents(_))));
    }

    #[test]
    fn test_embed_page_index_out_of_range() {
        let src = doc_with_drawing();
        let mut dest = PdfDocument::create();
        assert!(matches!(
            dest.embed_page(&src, 3, None, None),
            Err(Error::IndexOutOfRange { index: 3, .. })
        ));
    }
}
