//! Digest-on-the-wire stream wrapper
//!
//! [`HashStream`] tees every chunk through one or more digest functions as
//! it is consumed, exposing the final lowercase hex digests once the
//! underlying stream is exhausted. Transfers use it to verify content
//! without a second pass over the bytes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::errors::{GatewayError, GatewayResult};
use crate::streams::{BoxStream, ByteStream};

/// Digest algorithms the gateway computes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Md5,
}

impl HashAlgorithm {
    /// Lowercase wire name used as the key in content-hash maps.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// One-shot digest of an in-memory buffer, as lowercase hex.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "md5" => Ok(HashAlgorithm::Md5),
            other => Err(GatewayError::InvalidArgument(format!(
                "unknown hash algorithm: {other}"
            ))),
        }
    }
}

enum Hasher {
    Sha256(Sha256),
    Md5(Md5),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Md5(h) => hex::encode(h.finalize()),
        }
    }
}

/// Wraps a stream and digests its bytes as they pass through.
///
/// Digests become available only after the stream reports EOF; reading a
/// stream partway yields no digests.
pub struct HashStream {
    inner: BoxStream,
    hashers: Vec<(HashAlgorithm, Hasher)>,
    digests: Option<BTreeMap<String, String>>,
    bytes_read: u64,
}

impl HashStream {
    pub fn new(inner: BoxStream, algorithms: &[HashAlgorithm]) -> Self {
        let hashers = algorithms
            .iter()
            .map(|&a| (a, Hasher::new(a)))
            .collect();
        Self { inner, hashers, digests: None, bytes_read: 0 }
    }

    /// Final digests keyed by algorithm name; `None` until EOF.
    pub fn digests(&self) -> Option<&BTreeMap<String, String>> {
        self.digests.as_ref()
    }

    /// Total bytes pulled through the wrapper so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

#[async_trait]
impl ByteStream for HashStream {
    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        match self.inner.next_chunk().await? {
            Some(chunk) => {
                self.bytes_read += chunk.len() as u64;
                for (_, hasher) in &mut self.hashers {
                    hasher.update(&chunk);
                }
                Ok(Some(chunk))
            }
            None => {
                if self.digests.is_none() {
                    let digests = std::mem::take(&mut self.hashers)
                        .into_iter()
                        .map(|(a, h)| (a.name().to_string(), h.finalize_hex()))
                        .collect();
                    self.digests = Some(digests);
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::{collect, MemoryStream};

    const HELLO_SHA256: &str =
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[tokio::test]
    async fn test_digests_match_known_vectors() {
        let inner = Box::new(MemoryStream::new(&b"hello"[..]));
        let mut stream = HashStream::new(inner, &[HashAlgorithm::Sha256, HashAlgorithm::Md5]);
        assert!(stream.digests().is_none());

        let bytes = collect(&mut stream).await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(stream.bytes_read(), 5);

        let digests = stream.digests().unwrap();
        assert_eq!(digests["sha256"], HELLO_SHA256);
        assert_eq!(digests["md5"], HELLO_MD5);
    }

    #[tokio::test]
    async fn test_digest_identical_across_chunkings() {
        let data = vec![42u8; 200_000];
        let whole = HashAlgorithm::Sha256.digest(&data);

        let inner = Box::new(MemoryStream::new(data));
        let mut stream = HashStream::new(inner, &[HashAlgorithm::Sha256]);
        collect(&mut stream).await.unwrap();
        assert_eq!(stream.digests().unwrap()["sha256"], whole);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert!("crc64".parse::<HashAlgorithm>().is_err());
    }
}
