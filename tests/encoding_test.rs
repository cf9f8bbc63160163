//! Integration tests for encoding fidelity across import and export

mod common;

use arbor::core::encoding::{encode_document, Charset, EncodingSource};
use arbor::core::export::ExportJob;
use common::Fixture;

const DOC: &str = "<items><item><id>1</id><name>Café</name></item></items>";

#[tokio::test]
async fn test_utf16_bom_is_reused_on_export() {
    let fx = Fixture::build(None, |c| c.encoding.default_charset = "UTF-8".to_string());
    let xml = format!("<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n{DOC}");
    let input = fx.write("items.xml", encode_document(&xml, Charset::Utf16Le, true).unwrap());

    let summary = fx.import(&input).await;
    assert!(summary.is_successful(), "{:?}", summary.failure);
    let record = summary.encoding.clone().unwrap();
    assert_eq!(record.charset, Charset::Utf16Le);
    assert!(record.has_bom);

    let exported = fx.export(ExportJob::new("item")).await;
    assert!(exported.is_successful(), "{:?}", exported.failure);
    let (record, source) = exported.encoding.clone().unwrap();
    assert_eq!(source, EncodingSource::Stored);
    assert_eq!(record.charset, Charset::Utf16Le);

    let bytes = std::fs::read(exported.output_path.unwrap()).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
    let root = common::parse(&bytes);
    let name = root.children_named("item").next().unwrap().child("name").unwrap();
    assert_eq!(name.text_or_empty(), "Café");
}

#[tokio::test]
async fn test_utf8_without_bom_is_reused_on_export() {
    let fx = Fixture::new();
    let xml = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{DOC}");
    let input = fx.write("items.xml", xml.as_bytes());

    let summary = fx.import(&input).await;
    assert!(summary.is_successful(), "{:?}", summary.failure);
    assert_eq!(summary.encoding.as_ref().map(|r| r.charset), Some(Charset::Utf8));

    let exported = fx.export(ExportJob::new("item")).await;
    let bytes = std::fs::read(exported.output_path.unwrap()).unwrap();
    assert!(bytes.starts_with(b"<?xml"));
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("encoding=\"UTF-8\""));
    assert!(text.contains("Café"));
}

#[tokio::test]
async fn test_legacy_charset_round_trip() {
    let fx = Fixture::new();
    let mut bytes = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?>\n<items><item><id>1</id><name>Caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"</name></item></items>");
    let input = fx.write("items.xml", &bytes);

    let summary = fx.import(&input).await;
    assert!(summary.is_successful(), "{:?}", summary.failure);
    assert_eq!(fx.store.rows("item")[0].value("name"), Some("Café"));

    let exported = fx.export(ExportJob::new("item")).await;
    let written = std::fs::read(exported.output_path.unwrap()).unwrap();
    assert!(written.windows(4).any(|w| w == b"Caf\xE9"));
}

#[tokio::test]
async fn test_default_encoding_without_history() {
    let fx = Fixture::new();
    let exported = fx.export(ExportJob::new("item")).await;
    assert!(exported.is_successful(), "{:?}", exported.failure);

    let (record, source) = exported.encoding.clone().unwrap();
    assert_eq!(source, EncodingSource::Default);
    assert_eq!(record.charset, Charset::Utf16Le);
    assert!(record.has_bom);
}
