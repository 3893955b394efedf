//! Outbound gram compression.
//!
//! When a connection has compression enabled, every compiled gram is wrapped
//! in a self-delimiting envelope before it is queued:
//!
//! ```text
//! [flag(1): 0 = stored, 1 = compressed] [body length(4, BE)] [body]
//! ```
//!
//! Envelopes survive coalescing because each one carries its own length, and
//! the flag lets small or incompressible grams travel uncompressed.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Lz4,
    Zstd,
}

/// Maximum output size for decompression
const MAX_DECOMPRESSION_SIZE: usize = 16 * 1024 * 1024;

/// Minimum entropy threshold for compression (0.0-8.0 bits per byte)
/// Data below this threshold is unlikely to compress well
const MIN_ENTROPY_THRESHOLD: f64 = 4.0;

/// Envelope header: flag byte plus u32 body length
pub const ENVELOPE_HEADER_LEN: usize = 5;

const FLAG_STORED: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;

/// Calculate Shannon entropy of data (bits per byte)
/// Returns a value between 0.0 (all identical) and 8.0 (perfectly random)
fn calculate_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &freq {
        if count > 0 {
            let p = count as f64 / len;
            entropy -= p * p.log2();
        }
    }

    entropy
}

/// Adaptive compression decision based on size and entropy
fn should_compress_adaptive(data: &[u8], threshold_bytes: usize) -> bool {
    if data.len() < threshold_bytes {
        return false;
    }

    if data.len() < 1024 {
        return true;
    }

    // sample the head only
    let sample_size = data.len().min(512);
    let entropy = calculate_entropy(&data[..sample_size]);

    entropy < MIN_ENTROPY_THRESHOLD
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: &CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, 1)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses data that was compressed with the specified algorithm
///
/// Enforces a maximum output size to protect the receiving side from
/// decompression bombs.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if decompression fails or the
/// output would exceed the limit
pub fn decompress(data: &[u8], kind: &CompressionKind) -> Result<Vec<u8>> {
    match *kind {
        CompressionKind::Lz4 => {
            if data.len() < 4 {
                return Err(ProtocolError::DecompressionFailure);
            }

            // lz4_flex prepends the uncompressed size as u32 little-endian
            let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed_size > MAX_DECOMPRESSION_SIZE {
                return Err(ProtocolError::DecompressionFailure);
            }

            lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)
        }
        CompressionKind::Zstd => {
            use std::io::Read;

            let mut out = Vec::new();
            let mut reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;

            let mut buffer = [0u8; 8192];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        out.extend_from_slice(&buffer[..n]);
                        if out.len() > MAX_DECOMPRESSION_SIZE {
                            return Err(ProtocolError::DecompressionFailure);
                        }
                    }
                    Err(_) => return Err(ProtocolError::DecompressionFailure),
                }
            }
            Ok(out)
        }
    }
}

/// Adaptive compression using entropy analysis to avoid compressing high-entropy data
///
/// Returns the output bytes and a flag indicating whether compression was applied.
pub fn maybe_compress_adaptive(
    data: &[u8],
    kind: &CompressionKind,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    if should_compress_adaptive(data, threshold_bytes) {
        let compressed = compress(data, kind)?;

        // only worth it if it actually got smaller
        if compressed.len() < data.len() {
            Ok((compressed, true))
        } else {
            Ok((data.to_vec(), false))
        }
    } else {
        Ok((data.to_vec(), false))
    }
}

/// Wrap one gram in a compression envelope.
///
/// Returns the envelope and whether the body is compressed.
pub fn encode_envelope(
    gram: &[u8],
    kind: &CompressionKind,
    threshold_bytes: usize,
) -> Result<(Vec<u8>, bool)> {
    let (body, compressed) = maybe_compress_adaptive(gram, kind, threshold_bytes)?;
    let body_len = u32::try_from(body.len()).map_err(|_| ProtocolError::CompressionFailure)?;

    let mut envelope = Vec::with_capacity(ENVELOPE_HEADER_LEN + body.len());
    envelope.push(if compressed { FLAG_COMPRESSED } else { FLAG_STORED });
    envelope.extend_from_slice(&body_len.to_be_bytes());
    envelope.extend_from_slice(&body);
    Ok((envelope, compressed))
}

/// Unwrap every complete envelope at the front of `stream`.
///
/// Returns the decoded grams and how many bytes of `stream` they occupied; a
/// trailing partial envelope is left for the caller to retry with more bytes.
pub fn decode_envelopes(stream: &[u8], kind: &CompressionKind) -> Result<(Vec<Vec<u8>>, usize)> {
    let mut grams = Vec::new();
    let mut offset = 0;

    while stream.len() - offset >= ENVELOPE_HEADER_LEN {
        let header = &stream[offset..offset + ENVELOPE_HEADER_LEN];
        let body_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let start = offset + ENVELOPE_HEADER_LEN;
        let Some(body) = stream.get(start..start + body_len) else {
            break;
        };

        let gram = match header[0] {
            FLAG_STORED => body.to_vec(),
            FLAG_COMPRESSED => decompress(body, kind)?,
            _ => return Err(ProtocolError::DecompressionFailure),
        };
        grams.push(gram);
        offset = start + body_len;
    }

    Ok((grams, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_lz4_compression_roundtrip() {
        let original = b"Hello, World! This is a test of LZ4 compression.";
        let compressed = compress(original, &CompressionKind::Lz4).unwrap();
        let decompressed = decompress(&compressed, &CompressionKind::Lz4).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_zstd_compression_roundtrip() {
        let original = b"Hello, World! This is a test of Zstd compression.";
        let compressed = compress(original, &CompressionKind::Zstd).unwrap();
        let decompressed = decompress(&compressed, &CompressionKind::Zstd).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn test_lz4_size_limit_enforcement() {
        let claimed_size = (MAX_DECOMPRESSION_SIZE + 1) as u32;
        let mut malicious = claimed_size.to_le_bytes().to_vec();
        malicious.extend_from_slice(&[0u8; 16]);

        let result = decompress(&malicious, &CompressionKind::Lz4);
        assert!(result.is_err());
    }

    #[test]
    fn test_lz4_short_input_rejection() {
        let result = decompress(&[0x2b, 0x60], &CompressionKind::Lz4);
        assert!(result.is_err());
    }

    #[test]
    fn test_entropy_calculation() {
        let zeros = vec![0u8; 100];
        assert!(calculate_entropy(&zeros) < 0.1);

        let random: Vec<u8> = (0..=255).cycle().take(1000).collect();
        assert!(calculate_entropy(&random) > 7.0);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_adaptive_compression_high_entropy() {
        let data: Vec<u8> = (0..=255).cycle().take(2048).collect();
        let (out, compressed) = maybe_compress_adaptive(&data, &CompressionKind::Lz4, 512).unwrap();
        assert!(!compressed);
        assert_eq!(out, data);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_envelopes_survive_concatenation() {
        let small = b"tiny gram".to_vec();
        let large = vec![7u8; 4096];

        let (first, first_compressed) = encode_envelope(&small, &CompressionKind::Lz4, 512).unwrap();
        let (second, second_compressed) =
            encode_envelope(&large, &CompressionKind::Lz4, 512).unwrap();
        assert!(!first_compressed);
        assert!(second_compressed);
        assert!(second.len() < large.len());

        let mut stream = first.clone();
        stream.extend_from_slice(&second);
        stream.extend_from_slice(&second[..3]);

        let (grams, consumed) = decode_envelopes(&stream, &CompressionKind::Lz4).unwrap();
        assert_eq!(grams, vec![small, large]);
        assert_eq!(consumed, first.len() + second.len());
    }

    #[test]
    fn test_unknown_envelope_flag_is_rejected() {
        let stream = [9u8, 0, 0, 0, 1, 0xAA];
        assert!(decode_envelopes(&stream, &CompressionKind::Zstd).is_err());
    }
}
