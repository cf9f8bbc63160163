//! Charset detection and decoding of raw document bytes
//!
//! Detection is layered: the prolog's `encoding="..."` declaration wins, then
//! a byte order mark, then a statistical guess over a sample of the bytes.

use super::charset::Charset;
use crate::domain::errors::ParseError;
use regex::Regex;
use std::sync::OnceLock;

/// Bytes inspected by the statistical fallback
const SAMPLE_LEN: usize = 4096;

/// Bytes decoded while looking for the XML declaration
const PROLOG_LEN: usize = 512;

/// Which layer produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// `encoding="..."` in the XML declaration
    Declaration,
    /// Byte order mark
    ByteOrderMark,
    /// Zero-byte distribution / UTF-8 validity
    Statistical,
    /// No bytes to inspect
    Default,
}

/// Outcome of [`detect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Charset the bytes are in
    pub charset: Charset,

    /// Whether the bytes start with the charset's BOM
    pub has_bom: bool,

    /// Confidence percentage (0-100)
    pub confidence: u8,

    /// Layer that decided
    pub method: DetectionMethod,
}

fn declaration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#).ok()
        })
        .as_ref()
}

fn sniff_bom(bytes: &[u8]) -> Option<Charset> {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        Some(Charset::Utf8)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        Some(Charset::Utf16Le)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        Some(Charset::Utf16Be)
    } else {
        None
    }
}

/// UTF-16 orientation guessed from where the zero bytes fall
///
/// Returns the charset and the share of code units whose high byte is zero.
fn sniff_utf16(sample: &[u8]) -> Option<(Charset, f64)> {
    let units = sample.len() / 2;
    if units == 0 {
        return None;
    }
    let (mut zero_even, mut zero_odd) = (0usize, 0usize);
    for pair in sample.chunks_exact(2) {
        if pair[0] == 0 {
            zero_even += 1;
        }
        if pair[1] == 0 {
            zero_odd += 1;
        }
    }
    let even = zero_even as f64 / units as f64;
    let odd = zero_odd as f64 / units as f64;
    if odd > 0.3 && even < 0.05 {
        Some((Charset::Utf16Le, odd))
    } else if even > 0.3 && odd < 0.05 {
        Some((Charset::Utf16Be, even))
    } else {
        None
    }
}

/// Decodes the start of the document well enough to read its declaration
fn read_prolog(bytes: &[u8], reading: Charset) -> Option<String> {
    let body = strip_bom(bytes, reading);
    let mut end = body.len().min(PROLOG_LEN);
    if reading.is_utf16() {
        end -= end % 2;
    }
    let head = &body[..end];
    let text = match reading {
        Charset::Utf16Le | Charset::Utf16Be => {
            let units: Vec<u16> = head
                .chunks_exact(2)
                .map(|p| match reading {
                    Charset::Utf16Be => u16::from_be_bytes([p[0], p[1]]),
                    _ => u16::from_le_bytes([p[0], p[1]]),
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
        // Declarations are ASCII in every ASCII-compatible charset
        _ => String::from_utf8_lossy(head).into_owned(),
    };
    declaration_pattern()?
        .captures(text.trim_start_matches('\u{feff}'))
        .map(|caps| caps[1].to_string())
}

/// Detects the charset of raw document bytes
///
/// # Examples
///
/// ```
/// use arbor::core::encoding::{detect, Charset, DetectionMethod};
///
/// let utf16: Vec<u8> = [0xFF, 0xFE]
///     .into_iter()
///     .chain("<a/>".encode_utf16().flat_map(|u| u.to_le_bytes()))
///     .collect();
/// let detection = detect(&utf16);
/// assert_eq!(detection.charset, Charset::Utf16Le);
/// assert!(detection.has_bom);
/// assert_eq!(detection.method, DetectionMethod::ByteOrderMark);
/// ```
pub fn detect(bytes: &[u8]) -> Detection {
    if bytes.is_empty() {
        return Detection {
            charset: Charset::Utf8,
            has_bom: false,
            confidence: 0,
            method: DetectionMethod::Default,
        };
    }

    let sample = &bytes[..bytes.len().min(SAMPLE_LEN)];
    let bom = sniff_bom(bytes);
    let utf16 = sniff_utf16(sample);

    // The declaration can only be read once the code unit width is known
    let reading = bom
        .or(utf16.map(|(charset, _)| charset))
        .unwrap_or(Charset::Utf8);

    if let Some(declared) = read_prolog(bytes, reading).and_then(|l| Charset::from_label(&l)) {
        let charset = match (declared.is_utf16(), reading.is_utf16()) {
            // Byte order comes from the bytes, not from the generic label
            (true, true) => reading,
            (true, false) => declared,
            // A single-byte declaration inside UTF-16 content is stale
            (false, true) => {
                return Detection {
                    charset: reading,
                    has_bom: bom.is_some(),
                    confidence: 90,
                    method: if bom.is_some() {
                        DetectionMethod::ByteOrderMark
                    } else {
                        DetectionMethod::Statistical
                    },
                };
            }
            (false, false) => declared,
        };
        let has_bom = bom == Some(charset);
        return Detection {
            charset,
            has_bom,
            confidence: if has_bom || bom.is_none() { 100 } else { 85 },
            method: DetectionMethod::Declaration,
        };
    }

    if let Some(charset) = bom {
        return Detection {
            charset,
            has_bom: true,
            confidence: 100,
            method: DetectionMethod::ByteOrderMark,
        };
    }

    if let Some((charset, ratio)) = utf16 {
        return Detection {
            charset,
            has_bom: false,
            confidence: (50.0 + ratio * 49.0).round().min(99.0) as u8,
            method: DetectionMethod::Statistical,
        };
    }

    let (charset, confidence) = match std::str::from_utf8(sample) {
        Ok(text) if text.is_ascii() => (Charset::Utf8, 75),
        Ok(_) => (Charset::Utf8, 90),
        // A multi-byte sequence cut by the sample boundary is still valid UTF-8
        Err(e) if e.error_len().is_none() => (Charset::Utf8, 85),
        Err(_) => (Charset::Legacy(encoding_rs::WINDOWS_1252), 50),
    };
    Detection {
        charset,
        has_bom: false,
        confidence,
        method: DetectionMethod::Statistical,
    }
}

fn strip_bom(bytes: &[u8], charset: Charset) -> &[u8] {
    bytes.strip_prefix(charset.bom()).unwrap_or(bytes)
}

/// Decodes document bytes with a detected charset
///
/// Strips the BOM and anything before the first `<` that is whitespace or a
/// stray U+FEFF, which legacy tools sometimes leave in the prolog.
///
/// # Errors
///
/// Returns [`ParseError::Encoding`] if the bytes are not valid in the charset.
pub fn decode(bytes: &[u8], detection: &Detection) -> Result<String, ParseError> {
    let body = if detection.charset.bom().is_empty() {
        bytes
    } else {
        strip_bom(bytes, detection.charset)
    };

    let text = match detection.charset {
        Charset::Utf8 => String::from_utf8(body.to_vec())
            .map_err(|e| ParseError::Encoding(format!("invalid UTF-8: {e}")))?,
        Charset::Utf16Le | Charset::Utf16Be => {
            if body.len() % 2 != 0 {
                return Err(ParseError::Encoding(
                    "UTF-16 content has an odd number of bytes".to_string(),
                ));
            }
            let big_endian = detection.charset == Charset::Utf16Be;
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|p| {
                    if big_endian {
                        u16::from_be_bytes([p[0], p[1]])
                    } else {
                        u16::from_le_bytes([p[0], p[1]])
                    }
                })
                .collect();
            String::from_utf16(&units).map_err(|e| {
                ParseError::Encoding(format!("invalid {}: {e}", detection.charset))
            })?
        }
        Charset::Legacy(encoding) => encoding
            .decode_without_bom_handling_and_without_replacement(body)
            .ok_or_else(|| {
                ParseError::Encoding(format!("bytes are not valid {}", encoding.name()))
            })?
            .into_owned(),
    };

    Ok(text
        .trim_start_matches(|c: char| c == '\u{feff}' || c.is_whitespace())
        .to_string())
}
