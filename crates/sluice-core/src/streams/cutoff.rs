//! Byte-limited stream wrapper

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{GatewayError, GatewayResult};
use crate::streams::{BoxStream, ByteStream};

/// Limits consumption to exactly `limit` bytes.
///
/// A chunk straddling the limit is truncated and anything past the limit
/// is discarded. If the upstream ends before `limit` bytes arrived, the
/// wrapper fails with [`GatewayError::UploadIncomplete`].
pub struct CutoffStream {
    inner: BoxStream,
    limit: u64,
    remaining: u64,
}

impl CutoffStream {
    pub fn new(inner: BoxStream, limit: u64) -> Self {
        Self { inner, limit, remaining: limit }
    }
}

#[async_trait]
impl ByteStream for CutoffStream {
    fn size(&self) -> Option<u64> {
        Some(self.limit)
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.inner.next_chunk().await? {
            Some(chunk) => {
                let take = (self.remaining).min(chunk.len() as u64) as usize;
                self.remaining -= take as u64;
                Ok(Some(chunk.slice(..take)))
            }
            None => Err(GatewayError::UploadIncomplete {
                expected: self.limit,
                received: self.limit - self.remaining,
            }),
        }
    }
}
