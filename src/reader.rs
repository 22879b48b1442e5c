//! File and buffer reader with sequential and random event access.
//!
//! Opening scans the file header, extracts the dictionary and first event
//! from the embedded user-header record when present, then walks every
//! record header to build a [`FileEventIndex`]. Events are then served
//! sequentially ([`next_event`](Reader::next_event)) or by number
//! ([`event`](Reader::event)), loading at most one record at a time.
//!
//! Version 1-4 files (8-word block headers, no file header) are detected
//! and read through the same interface; writing them is not supported.
//!
//! A truncated or corrupt tail does not poison the whole file: the scan
//! keeps every record up to the damage, and the final error surfaces once
//! the good events are exhausted.

use std::fs::File;
use std::io::{Read as IoRead, Seek, SeekFrom};
use std::path::Path;

use log::{debug, warn};

use crate::buffer::{ByteBuffer, Endian};
use crate::compact::CompactEvent;
use crate::constants::*;
use crate::index::FileEventIndex;
use crate::record::RecordInput;
use crate::record_header::{FileHeader, RecordHeader};
use crate::structure::{EvioTree, NodeId};
use crate::EvioError;

/// Where the bytes come from.
enum Source {
    File(File, u64),
    Buffer(ByteBuffer),
}

impl Source {
    fn len(&self) -> u64 {
        match self {
            Source::File(_, len) => *len,
            Source::Buffer(buf) => buf.capacity() as u64,
        }
    }

    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, EvioError> {
        match self {
            Source::File(file, _) => {
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| EvioError::Io(format!("cannot seek to {}: {}", offset, e)))?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf)
                    .map_err(|e| EvioError::Io(format!("cannot read {} bytes: {}", len, e)))?;
                Ok(buf)
            }
            Source::Buffer(buf) => buf.vec_at(offset as usize, len),
        }
    }
}

/// Byte position and event count of one scanned record (or v4 block).
#[derive(Debug, Clone, Copy)]
struct RecordPos {
    offset: u64,
    length: usize,
    event_count: u32,
}

/// One record held in memory.
enum LoadedRecord {
    V6(RecordInput),
    V4 {
        data: ByteBuffer,
        /// Event offsets within `data`, plus the end sentinel.
        offsets: Vec<usize>,
    },
}

impl LoadedRecord {
    fn event(&self, i: usize) -> Result<ByteBuffer, EvioError> {
        match self {
            LoadedRecord::V6(rec) => rec.event(i),
            LoadedRecord::V4 { data, offsets } => {
                if i + 1 >= offsets.len() {
                    return Err(EvioError::InvalidLength(format!(
                        "event {} of {}",
                        i,
                        offsets.len().saturating_sub(1)
                    )));
                }
                let mut view = data.duplicate();
                view.set_limit(offsets[i + 1])?;
                view.set_position(offsets[i])?;
                Ok(view.slice())
            }
        }
    }
}

/// Reader over an evio file or buffer.
///
/// Not safe for concurrent calls; open one reader per thread instead. The
/// file is only ever read.
pub struct Reader {
    source: Source,
    order: Endian,
    version: u32,
    file_header: Option<FileHeader>,
    dictionary_xml: Option<String>,
    first_event: Option<Vec<u8>>,
    records: Vec<RecordPos>,
    index: FileEventIndex,
    current: Option<(usize, LoadedRecord)>,
    /// Sequential cursor: next event number to serve.
    next_number: u32,
    /// Damage found while scanning, surfaced after the good events.
    tail_error: Option<String>,
    closed: bool,
}

impl Reader {
    /// Open a file, detect its version and byte order, and index its
    /// records.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Reader, EvioError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| EvioError::Io(format!("cannot open {}: {}", path.display(), e)))?;
        let len = file
            .metadata()
            .map_err(|e| EvioError::Io(format!("cannot stat {}: {}", path.display(), e)))?
            .len();
        Self::from_source(Source::File(file, len))
    }

    /// Read from an in-memory buffer holding either a whole file (with file
    /// header) or a bare sequence of records.
    pub fn from_buffer(buf: ByteBuffer) -> Result<Reader, EvioError> {
        Self::from_source(Source::Buffer(buf))
    }

    fn from_source(mut source: Source) -> Result<Reader, EvioError> {
        if source.len() < HEADER_SIZE_BYTES as u64 {
            return Err(EvioError::Truncated(format!(
                "{} bytes is too small for any evio data",
                source.len()
            )));
        }

        let head = source.read_at(0, HEADER_SIZE_BYTES)?;
        let mut probe = ByteBuffer::wrap(head);

        // v6 file header?
        match FileHeader::decode(&mut probe, 0) {
            Ok(header) => {
                let order = probe.order();
                let mut reader = Reader {
                    source,
                    order,
                    version: header.version,
                    file_header: Some(header),
                    dictionary_xml: None,
                    first_event: None,
                    records: Vec::new(),
                    index: FileEventIndex::new(),
                    current: None,
                    next_number: 0,
                    tail_error: None,
                    closed: false,
                };
                reader.read_user_header()?;
                let first = reader
                    .file_header
                    .as_ref()
                    .map(|h| h.first_record_offset() as u64)
                    .unwrap_or(0);
                reader.scan_v6(first);
                return Ok(reader);
            }
            Err(EvioError::BadMagic(_)) => {}
            Err(e) => return Err(e),
        }

        // v6 bare record stream?
        let head = source.read_at(0, HEADER_SIZE_BYTES)?;
        let mut probe = ByteBuffer::wrap(head);
        if let Ok(header) = RecordHeader::decode(&mut probe, 0) {
            if header.version == 6 {
                let mut reader = Reader {
                    source,
                    order: probe.order(),
                    version: header.version,
                    file_header: None,
                    dictionary_xml: None,
                    first_event: None,
                    records: Vec::new(),
                    index: FileEventIndex::new(),
                    current: None,
                    next_number: 0,
                    tail_error: None,
                    closed: false,
                };
                reader.scan_v6(0);
                return Ok(reader);
            }
        }

        // v1-v4 block stream?
        let head = source.read_at(0, V4_BLOCK_HEADER_WORDS * 4)?;
        let mut probe = ByteBuffer::wrap(head);
        RecordHeader::detect_order(&mut probe, 0)?;
        let version = probe.get_u32_at(V4_VERSION_OFFSET)? & VERSION_MASK;
        if !(MIN_READ_VERSION..=4).contains(&version) {
            return Err(EvioError::UnsupportedVersion(version));
        }
        let mut reader = Reader {
            source,
            order: probe.order(),
            version,
            file_header: None,
            dictionary_xml: None,
            first_event: None,
            records: Vec::new(),
            index: FileEventIndex::new(),
            current: None,
            next_number: 0,
            tail_error: None,
            closed: false,
        };
        reader.scan_v4();
        Ok(reader)
    }

    /// Pull the dictionary and first event out of the user-header record.
    fn read_user_header(&mut self) -> Result<(), EvioError> {
        let header = match &self.file_header {
            Some(h) if h.user_header_length > 0 => h.clone(),
            _ => return Ok(()),
        };
        let user = self.source.read_at(
            header.header_words as u64 * 4 + header.index_length as u64,
            header.user_header_length as usize,
        )?;
        if !header.has_dictionary && !header.has_first_event {
            return Ok(());
        }
        let mut buf = ByteBuffer::wrap(user).with_order(self.order);
        let rec = match RecordInput::read(&mut buf, 0) {
            Ok(rec) => rec,
            Err(e) => {
                warn!("user header flagged but not a record: {}", e);
                return Ok(());
            }
        };
        let mut next = 0usize;
        if rec.header().has_dictionary && rec.event_count() > next {
            let bytes = rec.event_bytes(next)?;
            self.dictionary_xml = Some(String::from_utf8_lossy(&bytes).into_owned());
            next += 1;
        }
        if rec.header().has_first_event && rec.event_count() > next {
            self.first_event = Some(rec.event_bytes(next)?);
        }
        Ok(())
    }

    /// Walk record headers from `offset`, indexing until the trailer, the
    /// end of the source, or damage.
    fn scan_v6(&mut self, mut offset: u64) {
        let len = self.source.len();
        while offset + HEADER_SIZE_BYTES as u64 <= len {
            let head = match self.source.read_at(offset, HEADER_SIZE_BYTES) {
                Ok(h) => h,
                Err(e) => {
                    self.tail_error = Some(e.to_string());
                    return;
                }
            };
            let mut buf = ByteBuffer::wrap(head).with_order(self.order);
            let header = match RecordHeader::decode(&mut buf, 0) {
                Ok(h) => h,
                Err(e) => {
                    self.tail_error = Some(e.to_string());
                    return;
                }
            };
            if header.is_last || header.header_kind.is_trailer() {
                debug!("trailer at {}", offset);
                return;
            }
            let length = header.total_bytes();
            if offset + length as u64 > len {
                self.tail_error = Some(format!(
                    "record of {} bytes at {} runs past end of data",
                    length, offset
                ));
                return;
            }
            self.records.push(RecordPos {
                offset,
                length,
                event_count: header.event_count,
            });
            self.index.add_event_count(header.event_count);
            offset += length as u64;
        }
    }

    /// Walk v1-v4 block headers from the start of the source.
    fn scan_v4(&mut self) {
        let len = self.source.len();
        let mut offset = 0u64;
        while offset + (V4_BLOCK_HEADER_WORDS * 4) as u64 <= len {
            let head = match self.source.read_at(offset, V4_BLOCK_HEADER_WORDS * 4) {
                Ok(h) => h,
                Err(e) => {
                    self.tail_error = Some(e.to_string());
                    return;
                }
            };
            let buf = ByteBuffer::wrap(head).with_order(self.order);
            let ok = (|| -> Result<(u32, u32, u32), EvioError> {
                let magic = buf.get_u32_at(V4_MAGIC_OFFSET)?;
                if magic != HEADER_MAGIC {
                    return Err(EvioError::BadMagic(magic));
                }
                let words = buf.get_u32_at(V4_BLOCK_LENGTH_OFFSET)?;
                let count = buf.get_u32_at(V4_EVENT_COUNT_OFFSET)?;
                let flags = buf.get_u32_at(V4_VERSION_OFFSET)?;
                Ok((words, count, flags))
            })();
            let (words, count, flags) = match ok {
                Ok(v) => v,
                Err(e) => {
                    self.tail_error = Some(e.to_string());
                    return;
                }
            };
            let length = words as usize * 4;
            if words < V4_BLOCK_HEADER_WORDS as u32 || offset + length as u64 > len {
                self.tail_error = Some(format!(
                    "block of {} words at {} runs past end of data",
                    words, offset
                ));
                return;
            }
            if count > 0 {
                self.records.push(RecordPos {
                    offset,
                    length,
                    event_count: count,
                });
                self.index.add_event_count(count);
            }
            offset += length as u64;
            if flags & V4_LAST_BLOCK_BIT != 0 {
                return;
            }
        }
    }

    fn check_open(&self) -> Result<(), EvioError> {
        if self.closed {
            return Err(EvioError::Closed("reader"));
        }
        Ok(())
    }

    // ── Metadata ────────────────────────────────────────────────────

    pub fn event_count(&self) -> Result<u32, EvioError> {
        self.check_open()?;
        Ok(self.index.max_events())
    }

    pub fn record_count(&self) -> Result<usize, EvioError> {
        self.check_open()?;
        Ok(self.records.len())
    }

    pub fn byte_order(&self) -> Result<Endian, EvioError> {
        self.check_open()?;
        Ok(self.order)
    }

    pub fn version(&self) -> Result<u32, EvioError> {
        self.check_open()?;
        Ok(self.version)
    }

    pub fn file_header(&self) -> Option<&FileHeader> {
        self.file_header.as_ref()
    }

    pub fn has_dictionary(&self) -> Result<bool, EvioError> {
        self.check_open()?;
        Ok(self.dictionary_xml.is_some())
    }

    pub fn dictionary_xml(&self) -> Result<Option<&str>, EvioError> {
        self.check_open()?;
        Ok(self.dictionary_xml.as_deref())
    }

    pub fn first_event(&self) -> Result<Option<&[u8]>, EvioError> {
        self.check_open()?;
        Ok(self.first_event.as_deref())
    }

    // ── Event access ────────────────────────────────────────────────

    /// Load the record holding the current index position, if it is not
    /// already in memory.
    fn load_current_record(&mut self) -> Result<(), EvioError> {
        let number = self.index.record_number() as usize;
        if matches!(&self.current, Some((n, _)) if *n == number) {
            return Ok(());
        }
        let pos = self.records[number];
        let bytes = self.source.read_at(pos.offset, pos.length)?;
        let mut buf = ByteBuffer::wrap(bytes).with_order(self.order);

        let loaded = if self.version >= 5 {
            LoadedRecord::V6(RecordInput::read(&mut buf, 0)?)
        } else {
            // v4 block: events follow the header; walk bank lengths
            let head = ByteBuffer::wrap(self.source.read_at(pos.offset, 12)?)
                .with_order(self.order);
            let header_words = head.get_u32_at(V4_HEADER_LENGTH_OFFSET)? as usize;
            let mut offsets = vec![header_words * 4];
            let mut at = header_words * 4;
            for _ in 0..pos.event_count {
                let words = buf.get_u32_at(at)? as usize;
                let bytes = (words + 1) * 4;
                if words == 0 || at + bytes > pos.length {
                    return Err(EvioError::InvalidLength(format!(
                        "event of {} bytes at {} overruns block of {}",
                        bytes, at, pos.length
                    )));
                }
                at += bytes;
                offsets.push(at);
            }
            LoadedRecord::V4 {
                data: buf,
                offsets,
            }
        };
        self.current = Some((number, loaded));
        Ok(())
    }

    /// Random access: a zero-copy view of event `number` (0-based).
    pub fn event(&mut self, number: u32) -> Result<ByteBuffer, EvioError> {
        self.check_open()?;
        if number >= self.index.max_events() {
            return Err(EvioError::InvalidLength(format!(
                "event {} of {}",
                number,
                self.index.max_events()
            )));
        }
        self.index.set_event(number);
        self.load_current_record()?;
        let slot = self.index.record_event_number() as usize;
        match &self.current {
            Some((_, rec)) => rec.event(slot),
            None => Err(EvioError::Io("no record loaded".into())),
        }
    }

    /// Sequential access: the next event, or `None` when exhausted. A file
    /// with a damaged tail yields its good events first, then the error.
    pub fn next_event(&mut self) -> Result<Option<ByteBuffer>, EvioError> {
        self.check_open()?;
        if self.next_number >= self.index.max_events() {
            if let Some(err) = &self.tail_error {
                return Err(EvioError::Truncated(err.clone()));
            }
            return Ok(None);
        }
        let number = self.next_number;
        self.next_number += 1;
        Ok(Some(self.event(number)?))
    }

    /// Restart sequential access from event 0.
    pub fn rewind(&mut self) -> Result<(), EvioError> {
        self.check_open()?;
        self.next_number = 0;
        self.index.reset();
        Ok(())
    }

    /// Random access, parsed into a tree. Returns the tree and its root.
    pub fn event_tree(&mut self, number: u32) -> Result<(EvioTree, NodeId), EvioError> {
        let mut view = self.event(number)?;
        let mut tree = EvioTree::new();
        let root = tree.parse_event(&mut view)?;
        Ok((tree, root))
    }

    /// Sequential access, parsed into a tree.
    pub fn next_event_tree(&mut self) -> Result<Option<(EvioTree, NodeId)>, EvioError> {
        match self.next_event()? {
            Some(mut view) => {
                let mut tree = EvioTree::new();
                let root = tree.parse_event(&mut view)?;
                Ok(Some((tree, root)))
            }
            None => Ok(None),
        }
    }

    /// Random access as a compact node over the loaded record's data.
    pub fn compact_event(&mut self, number: u32) -> Result<CompactEvent, EvioError> {
        self.check_open()?;
        if number >= self.index.max_events() {
            return Err(EvioError::InvalidLength(format!(
                "event {} of {}",
                number,
                self.index.max_events()
            )));
        }
        self.index.set_event(number);
        self.load_current_record()?;
        let slot = self.index.record_event_number() as usize;
        let record_offset = self.records[self.index.record_number() as usize].offset as usize;
        match &self.current {
            Some((_, LoadedRecord::V6(rec))) => CompactEvent::extract_event(
                rec.data_buffer(),
                record_offset,
                rec.event_offset(slot)?,
                slot,
            ),
            Some((_, LoadedRecord::V4 { data, offsets })) => {
                CompactEvent::extract_event(data, record_offset, offsets[slot], slot)
            }
            None => Err(EvioError::Io("no record loaded".into())),
        }
    }

    /// Close the reader; every later call fails with `Closed`.
    pub fn close(&mut self) {
        self.closed = true;
        self.current = None;
    }
}
