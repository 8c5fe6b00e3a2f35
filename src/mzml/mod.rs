//! Streaming mzML parsing.
//!
//! A pull-based quick-xml parser that walks the spectrum list in native
//! file order and yields one [`RawSpectrum`] per `<spectrum>` element.
//! Only the header fields and binary arrays the QC passes consume are
//! decoded; everything else in the file is skipped over.

mod binary;
mod spectrum;
mod streamer;

pub use binary::{decode_binary, encode_binary_f64, BinaryDecodeError, BinaryEncoding, Compression};
pub use spectrum::{PrecursorInfo, RawSpectrum};
pub use streamer::{MzmlError, MzmlStreamer};
