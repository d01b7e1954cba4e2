//! Built-in extraction strategies
//!
//! Every strategy is total: malformed input is logged and turned into the
//! strategy's neutral value (or a raw archive entry), never an error.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use tracing::warn;
use zip::ZipArchive;

use super::xml::XmlElement;
use super::{decode_text, ArchiveEntry, ExtractStrategy, Payload};

/// Body decoded as text without further interpretation
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStrategy;

impl ExtractStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    fn neutral(&self) -> Payload {
        Payload::Text(String::new())
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        Payload::Text(decode_text(body, charset))
    }
}

/// JSON document; invalid JSON yields an empty object
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStrategy;

impl ExtractStrategy for JsonStrategy {
    fn name(&self) -> &'static str {
        "json"
    }

    fn neutral(&self) -> Payload {
        Payload::Json(Value::Object(Map::new()))
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        let text = decode_text(body, charset);
        match serde_json::from_str(&text) {
            Ok(value) => Payload::Json(value),
            Err(e) => {
                warn!("Response contains invalid JSON: {}", e);
                self.neutral()
            }
        }
    }
}

/// XML element tree; invalid XML yields no payload
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlStrategy;

impl ExtractStrategy for XmlStrategy {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn neutral(&self) -> Payload {
        Payload::None
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        match parse_xml(body, charset) {
            Ok(element) => Payload::Xml(element),
            Err(e) => {
                warn!("Response contains invalid XML: {}", e);
                self.neutral()
            }
        }
    }
}

/// Archive of JSON documents, one payload per entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipJsonStrategy;

impl ExtractStrategy for ZipJsonStrategy {
    fn name(&self) -> &'static str {
        "zip-json"
    }

    fn neutral(&self) -> Payload {
        Payload::Archive(BTreeMap::new())
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        extract_archive(body, |name, bytes| {
            let parsed = match charset {
                Some(_) => serde_json::from_str(&decode_text(&bytes, charset)),
                None => serde_json::from_slice(&bytes),
            };
            match parsed {
                Ok(value) => ArchiveEntry::Json(value),
                Err(e) => {
                    warn!("Archive entry {} contains invalid JSON: {}", name, e);
                    ArchiveEntry::Raw(bytes)
                }
            }
        })
    }
}

/// Archive of XML documents, one element tree per entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipXmlStrategy;

impl ExtractStrategy for ZipXmlStrategy {
    fn name(&self) -> &'static str {
        "zip-xml"
    }

    fn neutral(&self) -> Payload {
        Payload::Archive(BTreeMap::new())
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        extract_archive(body, |name, bytes| match parse_xml(&bytes, charset) {
            Ok(element) => ArchiveEntry::Xml(element),
            Err(e) => {
                warn!("Archive entry {} contains invalid XML: {}", name, e);
                ArchiveEntry::Raw(bytes)
            }
        })
    }
}

/// Archive with arbitrary content: text when a charset is known, bytes otherwise
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipStrategy;

impl ExtractStrategy for ZipStrategy {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn neutral(&self) -> Payload {
        Payload::Archive(BTreeMap::new())
    }

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload {
        extract_archive(body, |_, bytes| match charset {
            Some(_) => ArchiveEntry::Text(decode_text(&bytes, charset)),
            None => ArchiveEntry::Raw(bytes),
        })
    }
}

fn parse_xml(body: &[u8], charset: Option<&str>) -> Result<XmlElement, super::xml::XmlParseError> {
    match charset {
        Some(_) => XmlElement::parse(decode_text(body, charset).as_bytes()),
        None => XmlElement::parse(body),
    }
}

/// Decode every file of an archive; an unreadable archive yields an empty map
fn extract_archive<F>(body: &[u8], mut decode: F) -> Payload
where
    F: FnMut(&str, Vec<u8>) -> ArchiveEntry,
{
    let mut entries = BTreeMap::new();

    let mut archive = match ZipArchive::new(Cursor::new(body)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("Received a malformed zip archive: {}", e);
            return Payload::Archive(entries);
        }
    };

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping unreadable archive entry #{}: {}", index, e);
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut bytes = Vec::with_capacity(preallocation(file.size()));
        if let Err(e) = file.read_to_end(&mut bytes) {
            warn!("Skipping archive entry {}: {}", name, e);
            continue;
        }

        let entry = decode(&name, bytes);
        entries.insert(name, entry);
    }

    Payload::Archive(entries)
}

/// Upper bound on the buffer reserved up front for one archive entry
const MAX_ENTRY_PREALLOCATION: usize = 1024 * 1024;

/// The declared size comes from the archive header and is not trusted
fn preallocation(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(MAX_ENTRY_PREALLOCATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_json_valid() {
        let payload = JsonStrategy.extract(br#"{"a":1}"#, None);
        assert_eq!(payload, Payload::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_json_invalid_yields_empty_object() {
        let payload = JsonStrategy.extract(b"{\"a\":", None);
        assert_eq!(payload, Payload::Json(serde_json::json!({})));
    }

    #[test]
    fn test_json_with_legacy_charset() {
        // "Привет" in windows-1251
        let body = [b'"', 0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2, b'"'];
        let payload = JsonStrategy.extract(&body, Some("windows-1251"));
        assert_eq!(payload, Payload::Json(Value::String("Привет".into())));
    }

    #[test]
    fn test_xml_invalid_yields_none() {
        assert_eq!(XmlStrategy.extract(b"<a>", None), Payload::None);
    }

    #[test]
    fn test_zip_json_keeps_invalid_entry_raw() {
        let body = archive(&[("good.json", br#"{"id":7}"#), ("bad.json", b"{oops")]);

        let entries = match ZipJsonStrategy.extract(&body, None) {
            Payload::Archive(entries) => entries,
            other => panic!("expected archive, got {:?}", other),
        };

        assert_eq!(entries.len(), 2);
        assert_eq!(entries["good.json"], ArchiveEntry::Json(serde_json::json!({"id": 7})));
        assert_eq!(entries["bad.json"], ArchiveEntry::Raw(b"{oops".to_vec()));
    }

    #[test]
    fn test_zip_xml_entries() {
        let body = archive(&[("a.xml", b"<ok/>"), ("b.xml", b"<broken>")]);

        let entries = match ZipXmlStrategy.extract(&body, None) {
            Payload::Archive(entries) => entries,
            other => panic!("expected archive, got {:?}", other),
        };

        assert!(matches!(&entries["a.xml"], ArchiveEntry::Xml(e) if e.name == "ok"));
        assert_eq!(entries["b.xml"], ArchiveEntry::Raw(b"<broken>".to_vec()));
    }

    #[test]
    fn test_zip_passthrough() {
        let body = archive(&[("note.txt", b"hello")]);

        assert_eq!(
            ZipStrategy.extract(&body, Some("utf-8")),
            Payload::Archive(BTreeMap::from([(
                "note.txt".to_string(),
                ArchiveEntry::Text("hello".into())
            )]))
        );
        assert_eq!(
            ZipStrategy.extract(&body, None),
            Payload::Archive(BTreeMap::from([(
                "note.txt".to_string(),
                ArchiveEntry::Raw(b"hello".to_vec())
            )]))
        );
    }

    #[test]
    fn test_declared_entry_size_is_capped() {
        assert_eq!(preallocation(0), 0);
        assert_eq!(preallocation(512), 512);
        assert_eq!(preallocation(u64::from(u32::MAX)), MAX_ENTRY_PREALLOCATION);
        assert_eq!(preallocation(u64::MAX), MAX_ENTRY_PREALLOCATION);
    }

    #[test]
    fn test_bad_archive_yields_empty_map() {
        assert_eq!(
            ZipJsonStrategy.extract(b"PK not really", None),
            Payload::Archive(BTreeMap::new())
        );
    }
}
