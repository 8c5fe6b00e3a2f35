//! Binary data array decoding.
//!
//! mzML stores m/z and intensity arrays as Base64 text, optionally
//! zlib-compressed, holding little-endian 32- or 64-bit floats.

use std::io::Read;

use base64::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

/// Numerical precision of an encoded array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryEncoding {
    /// 32-bit float (MS:1000521)
    Float32,
    /// 64-bit float (MS:1000523)
    #[default]
    Float64,
}

/// Compression applied before Base64 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Raw binary (MS:1000576)
    #[default]
    None,
    /// zlib (MS:1000574)
    Zlib,
}

/// Errors from the decode pipeline.
#[derive(Debug, thiserror::Error)]
pub enum BinaryDecodeError {
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decompression error: {0}")]
    Decompression(#[from] std::io::Error),

    #[error("Binary payload of {actual} bytes is not a whole number of {width}-byte values")]
    RaggedPayload { actual: usize, width: usize },
}

/// Decode one `<binary>` payload into f64 values.
pub fn decode_binary(
    base64_data: &str,
    encoding: BinaryEncoding,
    compression: Compression,
) -> Result<Vec<f64>, BinaryDecodeError> {
    let trimmed = base64_data.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let decoded = BASE64_STANDARD.decode(trimmed)?;
    let bytes = match compression {
        Compression::None => decoded,
        Compression::Zlib => {
            let mut inflater = ZlibDecoder::new(&decoded[..]);
            let mut out = Vec::new();
            inflater.read_to_end(&mut out)?;
            out
        }
    };

    let width = match encoding {
        BinaryEncoding::Float32 => 4,
        BinaryEncoding::Float64 => 8,
    };
    if bytes.len() % width != 0 {
        return Err(BinaryDecodeError::RaggedPayload {
            actual: bytes.len(),
            width,
        });
    }

    let count = bytes.len() / width;
    let mut values = Vec::with_capacity(count);
    let mut cursor = std::io::Cursor::new(bytes);
    match encoding {
        BinaryEncoding::Float32 => {
            for _ in 0..count {
                values.push(cursor.read_f32::<LittleEndian>()? as f64);
            }
        }
        BinaryEncoding::Float64 => {
            for _ in 0..count {
                values.push(cursor.read_f64::<LittleEndian>()?);
            }
        }
    }

    Ok(values)
}

/// Encode f64 values as an uncompressed little-endian Base64 payload.
///
/// Used by the chromatogram emitter; decoding is the hot path, so the
/// encoder stays deliberately simple.
pub fn encode_binary_f64(values: &[f64]) -> String {
    let mut bytes = Vec::with_capacity(values.len() * 8);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_float64() {
        let mut bytes = Vec::new();
        for v in [100.0f64, 200.0, 300.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let encoded = BASE64_STANDARD.encode(&bytes);
        let values = decode_binary(&encoded, BinaryEncoding::Float64, Compression::None).unwrap();
        assert_eq!(values, vec![100.0, 200.0, 300.5]);
    }

    #[test]
    fn test_decode_float32() {
        let mut bytes = Vec::new();
        for v in [1.5f32, 2.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let encoded = BASE64_STANDARD.encode(&bytes);
        let values = decode_binary(&encoded, BinaryEncoding::Float32, Compression::None).unwrap();
        assert_eq!(values, vec![1.5, 2.25]);
    }

    #[test]
    fn test_decode_zlib() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression as Level;
        use std::io::Write;

        let mut bytes = Vec::new();
        for v in [400.0f64, 500.0, 600.0, 700.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let mut deflater = ZlibEncoder::new(Vec::new(), Level::default());
        deflater.write_all(&bytes).unwrap();
        let compressed = deflater.finish().unwrap();
        let encoded = BASE64_STANDARD.encode(&compressed);

        let values = decode_binary(&encoded, BinaryEncoding::Float64, Compression::Zlib).unwrap();
        assert_eq!(values, vec![400.0, 500.0, 600.0, 700.0]);
    }

    #[test]
    fn test_decode_empty() {
        let values = decode_binary("  ", BinaryEncoding::Float64, Compression::None).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_ragged_payload() {
        let encoded = BASE64_STANDARD.encode([0u8; 10]);
        let err = decode_binary(&encoded, BinaryEncoding::Float64, Compression::None);
        assert!(matches!(err, Err(BinaryDecodeError::RaggedPayload { .. })));
    }

    #[test]
    fn test_encode_roundtrip() {
        let values = [10.0, 20.5, 31.25];
        let encoded = encode_binary_f64(&values);
        let decoded = decode_binary(&encoded, BinaryEncoding::Float64, Compression::None).unwrap();
        assert_eq!(decoded, values);
    }
}
