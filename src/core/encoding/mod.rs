//! Encoding fidelity
//!
//! Imported documents are sniffed (declaration, BOM, then byte statistics),
//! decoded, and the winning encoding is recorded per (table, variant). The
//! next export of the same table is written back in that encoding so the
//! consuming runtime sees the bytes it accepted before.
//!
//! ```
//! use arbor::core::encoding::{decode, detect, encode_document, Charset};
//!
//! let xml = "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n<items/>";
//! let bytes = encode_document(xml, Charset::Utf16Le, true).unwrap();
//! assert_eq!(&bytes[..2], &[0xFF, 0xFE]);
//!
//! let detection = detect(&bytes);
//! assert_eq!(detection.charset, Charset::Utf16Le);
//! assert_eq!(decode(&bytes, &detection).unwrap(), xml);
//! ```

pub mod charset;
pub mod detect;
pub mod record;
pub mod registry;

pub use charset::{ByteOrder, Charset};
pub use detect::{decode, detect, Detection, DetectionMethod};
pub use record::{encode_document, EncodingRecord};
pub use registry::{EncodingRegistry, EncodingSource, ResolvedEncoding};
