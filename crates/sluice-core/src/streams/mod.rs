//! Stream primitives
//!
//! All byte movement in the gateway goes through [`ByteStream`]: a
//! pull-based, single-pass async source of chunks with a declared (possibly
//! unknown) size. The pipeline reads only as fast as the destination
//! accepts; nothing here buffers a whole file. The one sanctioned spill to
//! disk is [`file::FileStream::spill`], for destinations that demand a
//! known length from a size-unknown source.

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{GatewayError, GatewayResult};

pub mod cutoff;
pub mod file;
pub mod hash;
pub mod zip;

pub use cutoff::CutoffStream;
pub use file::FileStream;
pub use hash::{HashAlgorithm, HashStream};
pub use zip::{ZipEntry, ZipEntrySource, ZipStream};

/// Chunk size used by the bundled stream implementations.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A pull-based asynchronous byte source.
///
/// Streams are single-pass unless the concrete type documents otherwise.
/// `next_chunk` returns `Ok(None)` exactly once, at end of stream.
#[async_trait]
pub trait ByteStream: Send {
    /// Declared length in bytes, or `None` when unknown.
    fn size(&self) -> Option<u64>;

    /// Pulls the next chunk, suspending on I/O. `None` signals EOF.
    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>>;
}

/// Owned, type-erased stream handle passed across the provider boundary.
pub type BoxStream = Box<dyn ByteStream>;

/// An in-memory stream with a known size.
///
/// Backs small payloads and tests; chunks out at [`CHUNK_SIZE`].
pub struct MemoryStream {
    data: Bytes,
    pos: usize,
}

impl MemoryStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into(), pos: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }
}

#[async_trait]
impl ByteStream for MemoryStream {
    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + CHUNK_SIZE).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }
}

/// Adapts an HTTP body (any fallible chunk stream) to [`ByteStream`].
///
/// Backend adapters wrap their client's response stream in this, with the
/// Content-Length as the declared size when the backend reports one.
pub struct BodyStream {
    inner: futures_util::stream::BoxStream<'static, GatewayResult<Bytes>>,
    size: Option<u64>,
}

impl BodyStream {
    pub fn new(
        inner: impl futures_util::Stream<Item = GatewayResult<Bytes>> + Send + 'static,
        size: Option<u64>,
    ) -> Self {
        Self { inner: Box::pin(inner), size }
    }
}

#[async_trait]
impl ByteStream for BodyStream {
    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        use futures_util::StreamExt;
        self.inner.next().await.transpose()
    }
}

/// Drains a stream into memory.
///
/// For bounded payloads only (request bodies the adapter must buffer,
/// tests). Transfer paths never call this.
pub async fn collect(stream: &mut dyn ByteStream) -> GatewayResult<Vec<u8>> {
    let mut out = Vec::with_capacity(stream.size().unwrap_or(0) as usize);
    while let Some(chunk) = stream.next_chunk().await? {
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Checks a consumed byte count against the stream's declared size.
///
/// Fails with [`GatewayError::UploadIncomplete`] on disagreement.
pub fn verify_declared_size(declared: Option<u64>, received: u64) -> GatewayResult<()> {
    match declared {
        Some(expected) if expected != received => {
            Err(GatewayError::UploadIncomplete { expected, received })
        }
        _ => Ok(()),
    }
}
