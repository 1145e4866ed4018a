//! Single-pass ZIP archive stream
//!
//! Produces a ZIP archive as a non-seekable, size-unknown [`ByteStream`].
//! Entries are stored uncompressed with streaming data descriptors (general
//! purpose bit 3), so nothing needs to be known about an entry before its
//! bytes have passed through. Entry names are posix-relative paths; the
//! caller supplies them in the order they should appear.
//!
//! Per-entry sizes are limited to 4 GiB (no ZIP64 records).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::errors::{GatewayError, GatewayResult};
use crate::streams::{BoxStream, ByteStream};

const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;

// Bit 3: sizes follow in a data descriptor. Bit 11: UTF-8 names.
const FLAGS: u16 = (1 << 3) | (1 << 11);
const VERSION_NEEDED: u16 = 20;
// Upper byte 3 = unix.
const VERSION_MADE_BY: u16 = (3 << 8) | 20;

/// One archive member: its posix-relative path and its content stream.
pub struct ZipEntry {
    pub path: String,
    pub modified: Option<DateTime<Utc>>,
    pub stream: BoxStream,
}

/// Lazily supplies archive members so the archive never holds more than
/// one backend stream open at a time.
#[async_trait]
pub trait ZipEntrySource: Send {
    async fn next_entry(&mut self) -> GatewayResult<Option<ZipEntry>>;
}

/// A fixed, pre-opened list of entries.
pub struct VecEntrySource {
    entries: std::collections::VecDeque<ZipEntry>,
}

impl VecEntrySource {
    pub fn new(entries: Vec<ZipEntry>) -> Self {
        Self { entries: entries.into() }
    }
}

#[async_trait]
impl ZipEntrySource for VecEntrySource {
    async fn next_entry(&mut self) -> GatewayResult<Option<ZipEntry>> {
        Ok(self.entries.pop_front())
    }
}

enum State {
    NextEntry,
    Streaming {
        stream: BoxStream,
        crc: crc32fast::Hasher,
        count: u64,
        name: Vec<u8>,
        dos_time: u16,
        dos_date: u16,
        header_offset: u64,
    },
    Finished,
}

/// The archive writer itself.
///
/// Single pass: local header, entry bytes and data descriptor are emitted
/// per member, then the central directory closes the archive.
pub struct ZipStream {
    source: Box<dyn ZipEntrySource>,
    state: State,
    offset: u64,
    central: Vec<u8>,
    entry_count: u16,
}

impl std::fmt::Debug for ZipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStream").finish_non_exhaustive()
    }
}

impl ZipStream {
    pub fn new(source: Box<dyn ZipEntrySource>) -> Self {
        Self {
            source,
            state: State::NextEntry,
            offset: 0,
            central: Vec::new(),
            entry_count: 0,
        }
    }

    fn emit(&mut self, bytes: Vec<u8>) -> Bytes {
        self.offset += bytes.len() as u64;
        Bytes::from(bytes)
    }
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// MS-DOS date/time encoding; timestamps before 1980 clamp to the epoch.
fn dos_datetime(modified: Option<DateTime<Utc>>) -> (u16, u16) {
    let Some(ts) = modified.filter(|ts| ts.year() >= 1980) else {
        return (0, (1 << 5) | 1);
    };
    let date = (((ts.year() - 1980) as u16) << 9)
        | ((ts.month() as u16) << 5)
        | ts.day() as u16;
    let time = ((ts.hour() as u16) << 11)
        | ((ts.minute() as u16) << 5)
        | (ts.second() as u16 / 2);
    (time, date)
}

fn local_header(name: &[u8], dos_time: u16, dos_date: u16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(30 + name.len());
    push_u32(&mut buf, LOCAL_HEADER_SIG);
    push_u16(&mut buf, VERSION_NEEDED);
    push_u16(&mut buf, FLAGS);
    push_u16(&mut buf, 0); // stored
    push_u16(&mut buf, dos_time);
    push_u16(&mut buf, dos_date);
    push_u32(&mut buf, 0); // crc, in the descriptor
    push_u32(&mut buf, 0); // compressed size, in the descriptor
    push_u32(&mut buf, 0); // uncompressed size, in the descriptor
    push_u16(&mut buf, name.len() as u16);
    push_u16(&mut buf, 0); // extra length
    buf.extend_from_slice(name);
    buf
}

fn data_descriptor(crc: u32, size: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    push_u32(&mut buf, DATA_DESCRIPTOR_SIG);
    push_u32(&mut buf, crc);
    push_u32(&mut buf, size); // compressed == uncompressed for stored
    push_u32(&mut buf, size);
    buf
}

fn central_record(
    name: &[u8],
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    size: u32,
    header_offset: u32,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(46 + name.len());
    push_u32(&mut buf, CENTRAL_HEADER_SIG);
    push_u16(&mut buf, VERSION_MADE_BY);
    push_u16(&mut buf, VERSION_NEEDED);
    push_u16(&mut buf, FLAGS);
    push_u16(&mut buf, 0); // stored
    push_u16(&mut buf, dos_time);
    push_u16(&mut buf, dos_date);
    push_u32(&mut buf, crc);
    push_u32(&mut buf, size);
    push_u32(&mut buf, size);
    push_u16(&mut buf, name.len() as u16);
    push_u16(&mut buf, 0); // extra length
    push_u16(&mut buf, 0); // comment length
    push_u16(&mut buf, 0); // disk number
    push_u16(&mut buf, 0); // internal attributes
    push_u32(&mut buf, 0o100644 << 16); // external attributes: -rw-r--r--
    push_u32(&mut buf, header_offset);
    buf.extend_from_slice(name);
    buf
}

fn end_of_central(entry_count: u16, central_size: u32, central_offset: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(22);
    push_u32(&mut buf, END_OF_CENTRAL_SIG);
    push_u16(&mut buf, 0); // disk number
    push_u16(&mut buf, 0); // central directory disk
    push_u16(&mut buf, entry_count);
    push_u16(&mut buf, entry_count);
    push_u32(&mut buf, central_size);
    push_u32(&mut buf, central_offset);
    push_u16(&mut buf, 0); // comment length
    buf
}

#[async_trait]
impl ByteStream for ZipStream {
    fn size(&self) -> Option<u64> {
        None
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        loop {
            match &mut self.state {
                State::NextEntry => match self.source.next_entry().await? {
                    Some(entry) => {
                        let name = entry.path.into_bytes();
                        let (dos_time, dos_date) = dos_datetime(entry.modified);
                        let header = local_header(&name, dos_time, dos_date);
                        let header_offset = self.offset;
                        self.state = State::Streaming {
                            stream: entry.stream,
                            crc: crc32fast::Hasher::new(),
                            count: 0,
                            name,
                            dos_time,
                            dos_date,
                            header_offset,
                        };
                        return Ok(Some(self.emit(header)));
                    }
                    None => {
                        let central_offset = self.offset;
                        let mut tail = std::mem::take(&mut self.central);
                        let central_size = tail.len() as u32;
                        tail.extend_from_slice(&end_of_central(
                            self.entry_count,
                            central_size,
                            central_offset as u32,
                        ));
                        self.state = State::Finished;
                        return Ok(Some(self.emit(tail)));
                    }
                },
                State::Streaming {
                    stream,
                    crc,
                    count,
                    name,
                    dos_time,
                    dos_date,
                    header_offset,
                } => match stream.next_chunk().await? {
                    Some(chunk) if chunk.is_empty() => continue,
                    Some(chunk) => {
                        crc.update(&chunk);
                        *count += chunk.len() as u64;
                        if *count > u32::MAX as u64 {
                            return Err(GatewayError::PayloadTooLarge(
                                "zip entries are limited to 4 GiB".to_string(),
                            ));
                        }
                        self.offset += chunk.len() as u64;
                        return Ok(Some(chunk));
                    }
                    None => {
                        let crc_value = std::mem::take(crc).finalize();
                        let size = *count as u32;
                        let descriptor = data_descriptor(crc_value, size);
                        let record = central_record(
                            name,
                            *dos_time,
                            *dos_date,
                            crc_value,
                            size,
                            *header_offset as u32,
                        );
                        self.central.extend_from_slice(&record);
                        self.entry_count += 1;
                        self.state = State::NextEntry;
                        return Ok(Some(self.emit(descriptor)));
                    }
                },
                State::Finished => return Ok(None),
            }
        }
    }
}
