//! Persisted encoding metadata and document encoding

use super::charset::{ByteOrder, Charset};
use super::detect::Detection;
use crate::domain::errors::ArborError;
use crate::domain::ids::TableName;
use crate::domain::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encoding observed for a (table, variant) pair
///
/// Written after a successful import, read back by the next export so the
/// regenerated document uses the bytes the consumer already accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingRecord {
    pub table: TableName,
    pub variant: String,
    pub charset: Charset,
    pub byte_order: ByteOrder,
    pub has_bom: bool,
    pub confidence: u8,
    pub updated_at: DateTime<Utc>,
}

impl EncodingRecord {
    /// Record for an explicit charset choice
    pub fn new(
        table: TableName,
        variant: impl Into<String>,
        charset: Charset,
        has_bom: bool,
    ) -> Self {
        Self {
            table,
            variant: variant.into(),
            charset,
            byte_order: charset.byte_order(),
            has_bom,
            confidence: 100,
            updated_at: Utc::now(),
        }
    }

    /// Record built from a detection
    pub fn from_detection(
        table: TableName,
        variant: impl Into<String>,
        detection: &Detection,
    ) -> Self {
        Self {
            confidence: detection.confidence,
            ..Self::new(table, variant, detection.charset, detection.has_bom)
        }
    }

    /// Encodes a serialized document: BOM (if recorded) followed by content
    ///
    /// The document's declaration should already carry
    /// [`Charset::declared_name`].
    ///
    /// # Errors
    ///
    /// Returns a serialization error when the charset can't encode at all.
    pub fn encode_document(&self, xml: &str) -> Result<Vec<u8>> {
        encode_document(xml, self.charset, self.has_bom)
    }
}

/// Encodes text into bytes of the given charset, optionally BOM-prefixed
pub fn encode_document(xml: &str, charset: Charset, with_bom: bool) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(xml.len() * if charset.is_utf16() { 2 } else { 1 } + 3);
    if with_bom {
        bytes.extend_from_slice(charset.bom());
    }

    match charset {
        Charset::Utf8 => bytes.extend_from_slice(xml.as_bytes()),
        Charset::Utf16Le => bytes.extend(xml.encode_utf16().flat_map(u16::to_le_bytes)),
        Charset::Utf16Be => bytes.extend(xml.encode_utf16().flat_map(u16::to_be_bytes)),
        Charset::Legacy(encoding) => {
            let (encoded, used, had_unmappable) = encoding.encode(xml);
            if used != encoding {
                return Err(ArborError::Serialization(format!(
                    "{} cannot be used as an output encoding",
                    encoding.name()
                )));
            }
            if had_unmappable {
                // encoding_rs writes numeric character references, which stay valid XML
                tracing::warn!(
                    charset = encoding.name(),
                    "Characters outside the charset were written as character references"
                );
            }
            bytes.extend_from_slice(&encoded);
        }
    }
    Ok(bytes)
}
