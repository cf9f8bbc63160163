//! Supported document charsets

use encoding_rs::Encoding;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Byte order of a multi-byte charset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Little endian
    Le,
    /// Big endian
    Be,
    /// Single-byte or UTF-8 content
    None,
}

impl ByteOrder {
    /// Lowercase name as stored in metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::Le => "le",
            ByteOrder::Be => "be",
            ByteOrder::None => "none",
        }
    }
}

/// A document charset
///
/// UTF-16 is handled natively because `encoding_rs` only decodes it; every
/// other non-UTF-8 charset goes through `encoding_rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Utf8,
    Utf16Le,
    Utf16Be,
    Legacy(&'static Encoding),
}

impl Charset {
    /// Resolves a charset label (`UTF-16`, `utf-16be`, `windows-1252`, `latin1`, ...)
    ///
    /// A bare `UTF-16` resolves to little endian.
    ///
    /// ```
    /// use arbor::core::encoding::Charset;
    ///
    /// assert_eq!(Charset::from_label("UTF-16"), Some(Charset::Utf16Le));
    /// assert_eq!(Charset::from_label("utf-16be"), Some(Charset::Utf16Be));
    /// assert_eq!(Charset::from_label("latin1").unwrap().name(), "windows-1252");
    /// assert!(Charset::from_label("klingon").is_none());
    /// ```
    pub fn from_label(label: &str) -> Option<Self> {
        let encoding = Encoding::for_label(label.trim().as_bytes())?;
        if encoding == encoding_rs::UTF_8 {
            Some(Charset::Utf8)
        } else if encoding == encoding_rs::UTF_16LE {
            Some(Charset::Utf16Le)
        } else if encoding == encoding_rs::UTF_16BE {
            Some(Charset::Utf16Be)
        } else if encoding == encoding_rs::REPLACEMENT {
            None
        } else {
            Some(Charset::Legacy(encoding))
        }
    }

    /// Exact name including byte order
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Legacy(encoding) => encoding.name(),
        }
    }

    /// Token written into the XML declaration
    ///
    /// Both UTF-16 byte orders declare plain `UTF-16`; the consuming runtime
    /// takes the byte order from the BOM.
    pub fn declared_name(&self) -> &'static str {
        match self {
            Charset::Utf16Le | Charset::Utf16Be => "UTF-16",
            other => other.name(),
        }
    }

    /// Byte order of the charset
    pub fn byte_order(&self) -> ByteOrder {
        match self {
            Charset::Utf16Le => ByteOrder::Le,
            Charset::Utf16Be => ByteOrder::Be,
            _ => ByteOrder::None,
        }
    }

    /// Byte order mark for the charset (empty for legacy charsets)
    pub fn bom(&self) -> &'static [u8] {
        match self {
            Charset::Utf8 => &[0xEF, 0xBB, 0xBF],
            Charset::Utf16Le => &[0xFF, 0xFE],
            Charset::Utf16Be => &[0xFE, 0xFF],
            Charset::Legacy(_) => &[],
        }
    }

    /// Whether the charset uses two-byte code units
    pub fn is_utf16(&self) -> bool {
        matches!(self, Charset::Utf16Le | Charset::Utf16Be)
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Charset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Charset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Charset::from_label(&label)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown charset '{label}'")))
    }
}
