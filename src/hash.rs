//! Request body digests.
//!
//! S3 requires `X-Amz-Content-Sha256` on every SigV4 request, including
//! bodyless ones, so the digest of a zero-length body is computed rather
//! than omitted.  Uploads additionally carry `Content-Md5`.

use std::io::Read;

use base64::Engine;
use md5::Md5;
use sha2::{Digest, Sha256};

/// SHA-256 of the empty string.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Read buffer size used while hashing.
const CHUNK_SIZE: usize = 64 * 1024;

/// Digests and length of a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHash {
    /// Raw MD5 digest.
    pub md5: [u8; 16],
    /// Raw SHA-256 digest.
    pub sha256: [u8; 32],
    /// Number of bytes consumed from the reader.
    pub size: u64,
}

impl ContentHash {
    /// Hex-encoded SHA-256, the value of `X-Amz-Content-Sha256`.
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }

    /// Base64-encoded MD5, the value of `Content-Md5`.
    pub fn md5_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.md5)
    }

    /// Hex-encoded MD5, which is what S3 returns as a single-part ETag.
    pub fn md5_hex(&self) -> String {
        hex::encode(self.md5)
    }
}

/// Stream `reader` to the end, computing both digests in one pass.
///
/// Only I/O errors from the reader can fail this; an empty reader yields
/// the digests of the empty string.
pub fn compute_hash<R: Read>(mut reader: R) -> std::io::Result<ContentHash> {
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut size: u64 = 0;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        md5.update(&buf[..n]);
        sha256.update(&buf[..n]);
        size += n as u64;
    }

    Ok(ContentHash {
        md5: md5.finalize().into(),
        sha256: sha256.finalize().into(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "boom"))
        }
    }

    #[test]
    fn test_empty_body_digest() {
        let hash = compute_hash(std::io::empty()).unwrap();
        assert_eq!(hash.size, 0);
        assert_eq!(hash.sha256_hex(), EMPTY_SHA256);
        assert_eq!(hash.md5_hex(), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hash.md5_base64(), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_known_body_digest() {
        let hash = compute_hash(&b"hello world"[..]).unwrap();
        assert_eq!(hash.size, 11);
        assert_eq!(
            hash.sha256_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(hash.md5_hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_body_larger_than_chunk() {
        let body = vec![7u8; CHUNK_SIZE * 2 + 13];
        let hash = compute_hash(body.as_slice()).unwrap();
        assert_eq!(hash.size, body.len() as u64);
        assert_eq!(hash.sha256, <[u8; 32]>::from(Sha256::digest(&body)));
    }

    #[test]
    fn test_reader_error_propagates() {
        let err = compute_hash(FailingReader).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
