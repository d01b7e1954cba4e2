//! Size-capped payload rendering for logs
//!
//! Payloads up to the threshold are logged verbatim. Larger ones are gzipped and
//! base64-encoded; if that is still too long a short notice is logged instead.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::borrow::Cow;
use std::io::Write;

/// Default threshold for logged payloads, in bytes
pub const DEFAULT_MAX_LOG_LENGTH: usize = 5000;

/// Prefix marking a compressed payload in the log stream
pub const GZIP_PREFIX: &str = "gzip+base64:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redactor {
    max_length: usize,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LENGTH)
    }
}

impl Redactor {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Render a payload for logging
    pub fn redact<'a>(&self, payload: &'a str) -> Cow<'a, str> {
        if payload.len() <= self.max_length {
            return Cow::Borrowed(payload);
        }

        match gzip_base64(payload.as_bytes()) {
            Some(packed) if packed.len() + GZIP_PREFIX.len() <= self.max_length => {
                Cow::Owned(format!("{}{}", GZIP_PREFIX, packed))
            }
            _ => Cow::Owned(self.notice(payload.len())),
        }
    }

    /// Render any `Debug` value (e.g. a protobuf message)
    pub fn redact_debug<T: std::fmt::Debug + ?Sized>(&self, value: &T) -> String {
        let rendered = format!("{:?}", value);
        self.redact(&rendered).into_owned()
    }

    fn notice(&self, length: usize) -> String {
        format!(
            "<{} bytes, too long for logging; raise max_log_length (current {})>",
            length, self.max_length
        )
    }
}

fn gzip_base64(data: &[u8]) -> Option<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).ok()?;
    let compressed = encoder.finish().ok()?;
    Some(STANDARD.encode(compressed))
}
