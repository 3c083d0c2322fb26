//! Round-trip tests: write a context in both encodings, parse it back and
//! compare the object tables.

use pdf_graph::context::{Context, Literal};
use pdf_graph::document_parser::parse_document;
use pdf_graph::object::{Object, PdfString};
use pdf_graph::parser_config::ParseOptions;
use pdf_graph::writer::{PdfWriter, WriterConfig};

/// A small but varied document built through the public API.
fn sample_context() -> Context {
    let mut ctx = Context::new();
    let pages = ctx.next_ref();

    let font = ctx.obj(Literal::dict([
        ("Type", "/Font".into()),
        ("Subtype", "/Type1".into()),
        ("BaseFont", "/Helvetica".into()),
    ]));
    let font = ctx.register(font);

    let contents = ctx.stream(&b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET"[..], Literal::empty());
    let contents = ctx.register(contents);

    let page = ctx.obj(Literal::dict([
        ("Type", "/Page".into()),
        ("Parent", pages.into()),
        ("MediaBox", Literal::Array(vec![0.into(), 0.into(), 612.into(), 792.into()])),
        ("Contents", contents.into()),
        ("Resources", Literal::dict([("Font", Literal::dict([("F1", font.into())]))])),
    ]));
    let page = ctx.register(page);

    let tree = ctx.obj(Literal::dict([
        ("Type", "/Pages".into()),
        ("Kids", Literal::Array(vec![page.into()])),
        ("Count", 1.into()),
    ]));
    ctx.assign(pages, tree);

    let catalog = ctx.obj(Literal::dict([("Type", "/Catalog".into()), ("Pages", pages.into())]));
    let catalog = ctx.register(catalog);

    let info = ctx.obj(Literal::dict([
        ("Title", "Round (trip) \\ test".into()),
        ("Scale", 0.25.into()),
        ("Offset", Literal::Object(Object::Integer(-7))),
        ("Flags", Literal::Array(vec![true.into(), false.into(), Literal::Null])),
        ("Raw", Literal::Object(Object::String(PdfString::hex(vec![0xDE, 0xAD, 0x00, 0xFF])))),
    ]));
    let info = ctx.register(info);

    ctx.trailer_info.root = Some(catalog);
    ctx.trailer_info.info = Some(info);
    ctx.trailer_info.id = Some(Object::Array(vec![
        Object::String(PdfString::hex(vec![1, 2, 3, 4])),
        Object::String(PdfString::hex(vec![5, 6, 7, 8])),
    ]));
    ctx
}

fn assert_same_tables(original: &Context, parsed: &Context) {
    assert_eq!(parsed.object_count(), original.object_count());
    for (reference, object) in original.enumerate_indirect_objects() {
        assert_eq!(parsed.get(reference), Some(object), "object {} differs", reference);
    }
    assert_eq!(parsed.trailer_info, original.trailer_info);
}

#[test]
fn test_classic_round_trip() {
    let ctx = sample_context();
    let bytes = PdfWriter::with_config(WriterConfig::classic()).write(&ctx).unwrap();

    let parsed = parse_document(&bytes, ParseOptions::strict()).unwrap();
    assert!(!parsed.recovered);
    assert!(parsed.diagnostics.is_empty());
    assert_eq!(parsed.context.version, "1.7");
    assert_same_tables(&ctx, &parsed.context);
}

#[test]
fn test_object_stream_round_trip() {
    let ctx = sample_context();
    let bytes = PdfWriter::with_config(WriterConfig::object_streams()).write(&ctx).unwrap();

    let parsed = parse_document(&bytes, ParseOptions::strict()).unwrap();
    assert!(!parsed.recovered);
    // Containers and the xref stream are file structure, not document objects
    assert_same_tables(&ctx, &parsed.context);
}

#[test]
fn test_round_trip_is_stable() {
    let ctx = sample_context();
    let writer = PdfWriter::with_config(WriterConfig::classic());
    let first = writer.write(&ctx).unwrap();
    let reparsed = parse_document(&first, ParseOptions::default()).unwrap().context;
    let second = writer.write(&reparsed).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_version_override() {
    let ctx = sample_context();
    let bytes = PdfWriter::with_config(WriterConfig::classic().with_version("1.4"))
        .write(&ctx)
        .unwrap();
    assert!(bytes.starts_with(b"%PDF-1.4\n"));
    assert_eq!(parse_document(&bytes, ParseOptions::default()).unwrap().context.version, "1.4");
}

#[test]
fn test_incremental_update_newer_definition_wins() {
    let ctx = sample_context();
    let mut bytes = PdfWriter::with_config(WriterConfig::classic()).write(&ctx).unwrap();
    let base_xref = pdf_graph::xref::find_xref_offset(&bytes).unwrap();
    let info = ctx.trailer_info.info.unwrap();
    let root = ctx.trailer_info.root.unwrap();

    let object_offset = bytes.len();
    bytes.extend_from_slice(format!("{} 0 obj\n<< /Title (Updated) >>\nendobj\n", info.id).as_bytes());
    let xref_offset = bytes.len();
    bytes.extend_from_slice(
        format!(
            "xref\n{} 1\n{:010} 00000 n \ntrailer\n<< /Size {} /Root {} 0 R /Info {} 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            info.id,
            object_offset,
            ctx.largest_object_number() + 1,
            root.id,
            info.id,
            base_xref,
            xref_offset
        )
        .as_bytes(),
    );

    let parsed = parse_document(&bytes, ParseOptions::strict()).unwrap();
    assert!(!parsed.recovered);
    let updated = parsed.context.dict(info).unwrap();
    assert_eq!(updated["Title"], Object::string("Updated"));
    assert!(!updated.contains_key("Scale"));
    assert_eq!(parsed.context.object_count(), ctx.object_count());
}
