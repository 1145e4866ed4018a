//! On-disk stream source
//!
//! Adapts a file (or a spilled temporary file) to [`ByteStream`]. Unlike
//! the other stream types this one is restartable: [`FileStream::restart`]
//! seeks back to the configured start offset.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tempfile::NamedTempFile;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::errors::{GatewayError, GatewayResult};
use crate::streams::{BoxStream, ByteStream, CHUNK_SIZE};

/// Streams a byte range of an on-disk file.
pub struct FileStream {
    file: File,
    start: u64,
    length: u64,
    remaining: u64,
    // Keeps a spilled temporary alive (and deleted on drop).
    _temp: Option<NamedTempFile>,
}

impl FileStream {
    /// Opens a whole file for streaming.
    pub async fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        Ok(Self { file, start: 0, length, remaining: length, _temp: None })
    }

    /// Opens a byte range `[start, end]` (inclusive end, `None` = to EOF).
    ///
    /// Fails with [`GatewayError::InvalidArgument`] when the range falls
    /// outside the file.
    pub async fn open_range(
        path: impl AsRef<Path>,
        start: u64,
        end: Option<u64>,
    ) -> GatewayResult<Self> {
        let mut file = File::open(path).await?;
        let file_len = file.metadata().await?.len();
        if start >= file_len && file_len > 0 {
            return Err(GatewayError::InvalidArgument(format!(
                "range start {start} past end of {file_len}-byte file"
            )));
        }
        let end = end.map(|e| e.min(file_len.saturating_sub(1)));
        let length = match end {
            Some(e) if e < start => {
                return Err(GatewayError::InvalidArgument(
                    "range end precedes range start".to_string(),
                ))
            }
            Some(e) => e - start + 1,
            None => file_len - start,
        };
        file.seek(SeekFrom::Start(start)).await?;
        Ok(Self { file, start, length, remaining: length, _temp: None })
    }

    /// Buffers a size-unknown stream into a temporary file.
    ///
    /// This is the explicit opt-in for destinations that demand a known
    /// length; the temporary is removed when the returned stream drops.
    pub async fn spill(mut source: BoxStream) -> GatewayResult<Self> {
        let temp = NamedTempFile::new()?;
        let mut writer = File::create(temp.path()).await?;
        while let Some(chunk) = source.next_chunk().await? {
            writer.write_all(&chunk).await?;
        }
        writer.flush().await?;

        let mut stream = Self::open(temp.path()).await?;
        stream._temp = Some(temp);
        Ok(stream)
    }

    /// Seeks back to the start offset so the stream can be replayed.
    pub async fn restart(&mut self) -> GatewayResult<()> {
        self.file.seek(SeekFrom::Start(self.start)).await?;
        self.remaining = self.length;
        Ok(())
    }
}

#[async_trait]
impl ByteStream for FileStream {
    fn size(&self) -> Option<u64> {
        Some(self.length)
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = CHUNK_SIZE.min(self.remaining as usize);
        let mut buf = BytesMut::zeroed(want);
        let read = self.file.read(&mut buf).await?;
        if read == 0 {
            // File shrank underneath us.
            return Err(GatewayError::UploadIncomplete {
                expected: self.length,
                received: self.length - self.remaining,
            });
        }
        buf.truncate(read);
        self.remaining -= read as u64;
        Ok(Some(buf.freeze()))
    }
}
