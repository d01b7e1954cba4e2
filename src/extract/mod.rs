/*!
 * Response extraction pipeline
 *
 * Turns a raw transport response into a structured [`Payload`]. The strategy is
 * picked from the normalized MIME type of the response unless the caller
 * supplies one. HTTP 204 always yields the strategy's neutral value, and decode
 * failures are logged and neutralized instead of surfacing as errors.
 */

pub mod strategies;
pub mod xml;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use encoding_rs::Encoding;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

pub use strategies::{JsonStrategy, TextStrategy, XmlStrategy, ZipJsonStrategy, ZipStrategy, ZipXmlStrategy};
pub use xml::{XmlElement, XmlParseError};

pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_APPLICATION_XML: &str = "application/xml";
pub const MIME_TEXT_XML: &str = "text/xml";
pub const MIME_APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const MIME_APPLICATION_ZIP: &str = "application/zip";
pub const MIME_TEXT_HTML: &str = "text/html";
pub const MIME_TEXT_PLAIN: &str = "text/plain";

const STATUS_NO_CONTENT: u16 = 204;

/// Transport response before decoding
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Raw `Content-Type` header value
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Decoded response
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No value (XML neutral)
    None,
    Text(String),
    Json(Value),
    Xml(XmlElement),
    /// Archive entries keyed by file name
    Archive(BTreeMap<String, ArchiveEntry>),
}

/// One decoded archive file
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveEntry {
    Json(Value),
    Xml(XmlElement),
    Text(String),
    /// Entry that could not be decoded, kept as-is
    Raw(Vec<u8>),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlElement> {
        match self {
            Payload::Xml(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_archive(&self) -> Option<&BTreeMap<String, ArchiveEntry>> {
        match self {
            Payload::Archive(entries) => Some(entries),
            _ => None,
        }
    }

    /// JSON rendering for printing; raw bytes become base64 strings
    pub fn to_json(&self) -> Value {
        match self {
            Payload::None => Value::Null,
            Payload::Text(text) => Value::String(text.clone()),
            Payload::Json(value) => value.clone(),
            Payload::Xml(element) => xml_to_json(element),
            Payload::Archive(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(name, entry)| (name.clone(), entry.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl ArchiveEntry {
    pub fn to_json(&self) -> Value {
        match self {
            ArchiveEntry::Json(value) => value.clone(),
            ArchiveEntry::Xml(element) => xml_to_json(element),
            ArchiveEntry::Text(text) => Value::String(text.clone()),
            ArchiveEntry::Raw(bytes) => Value::String(STANDARD.encode(bytes)),
        }
    }
}

fn xml_to_json(element: &XmlElement) -> Value {
    serde_json::to_value(element).unwrap_or(Value::Null)
}

/// Decoder turning a response body into a payload
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value returned for empty (204) responses
    fn neutral(&self) -> Payload;

    fn extract(&self, body: &[u8], charset: Option<&str>) -> Payload;
}

/// Parsed `Content-Type` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// `type/subtype`, lowercased, without parameters
    pub essence: String,
    pub charset: Option<String>,
}

impl ContentType {
    /// Parse a header value; a missing or unparsable header means octet-stream
    pub fn parse(header: Option<&str>) -> Self {
        let Some(raw) = header else {
            return Self::octet_stream();
        };

        match raw.parse::<mime::Mime>() {
            Ok(parsed) => Self {
                essence: parsed.essence_str().to_ascii_lowercase(),
                charset: parsed
                    .get_param(mime::CHARSET)
                    .map(|c| c.as_str().to_string()),
            },
            Err(e) => {
                warn!("Unparsable Content-Type '{}': {}", raw, e);
                Self::octet_stream()
            }
        }
    }

    fn octet_stream() -> Self {
        Self {
            essence: MIME_APPLICATION_OCTET_STREAM.to_string(),
            charset: None,
        }
    }
}

/// Decode bytes with a named charset; unknown or absent charsets decode as lossy UTF-8
pub fn decode_text(body: &[u8], charset: Option<&str>) -> String {
    let encoding = charset.and_then(|label| {
        let found = Encoding::for_label(label.trim().as_bytes());
        if found.is_none() {
            warn!("Unknown charset '{}', decoding as UTF-8", label);
        }
        found
    });

    match encoding {
        Some(encoding) => {
            let (text, _, had_errors) = encoding.decode(body);
            if had_errors {
                warn!("Body is not valid {}, replaced malformed sequences", encoding.name());
            }
            text.into_owned()
        }
        None => String::from_utf8_lossy(body).into_owned(),
    }
}

/// MIME-keyed strategy dispatch with a pass-through fallback
#[derive(Clone)]
pub struct ExtractionPipeline {
    strategies: HashMap<String, Arc<dyn ExtractStrategy>>,
    fallback: Arc<dyn ExtractStrategy>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        let mut pipeline = Self::empty(Arc::new(TextStrategy));
        pipeline.register(MIME_APPLICATION_JSON, Arc::new(JsonStrategy));
        pipeline.register(MIME_APPLICATION_XML, Arc::new(XmlStrategy));
        pipeline.register(MIME_TEXT_XML, Arc::new(XmlStrategy));
        pipeline.register(MIME_APPLICATION_OCTET_STREAM, Arc::new(TextStrategy));
        pipeline.register(MIME_APPLICATION_ZIP, Arc::new(ZipJsonStrategy));
        pipeline.register(MIME_TEXT_HTML, Arc::new(TextStrategy));
        pipeline.register(MIME_TEXT_PLAIN, Arc::new(TextStrategy));
        pipeline
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut mimes: Vec<_> = self
            .strategies
            .iter()
            .map(|(mime, s)| format!("{} => {}", mime, s.name()))
            .collect();
        mimes.sort();
        f.debug_struct("ExtractionPipeline")
            .field("strategies", &mimes)
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl ExtractionPipeline {
    /// Pipeline with no MIME mappings
    pub fn empty(fallback: Arc<dyn ExtractStrategy>) -> Self {
        Self {
            strategies: HashMap::new(),
            fallback,
        }
    }

    /// Map a MIME type (parameters ignored) to a strategy
    pub fn register(&mut self, mime: &str, strategy: Arc<dyn ExtractStrategy>) {
        self.strategies
            .insert(ContentType::parse(Some(mime)).essence, strategy);
    }

    pub fn strategy_for(&self, essence: &str) -> &dyn ExtractStrategy {
        self.strategies
            .get(essence)
            .map(|s| s.as_ref())
            .unwrap_or_else(|| self.fallback.as_ref())
    }

    /// Decode a response
    ///
    /// `custom` bypasses MIME selection. `decode` overrides the charset
    /// announced by the response.
    pub fn extract(
        &self,
        response: &RawResponse,
        custom: Option<&dyn ExtractStrategy>,
        decode: Option<&str>,
    ) -> Payload {
        let content_type = ContentType::parse(response.content_type.as_deref());
        let strategy = custom.unwrap_or_else(|| self.strategy_for(&content_type.essence));

        if response.status == STATUS_NO_CONTENT {
            debug!("No content, returning neutral {} value", strategy.name());
            return strategy.neutral();
        }

        let charset = decode.or(content_type.charset.as_deref());
        debug!(
            "Extracting {} bytes of {} with {} strategy",
            response.body.len(),
            content_type.essence,
            strategy.name()
        );
        strategy.extract(&response.body, charset)
    }
}
