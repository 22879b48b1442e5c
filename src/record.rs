//! Record building and reading.
//!
//! A record frames a group of events: a 14-word header, an index array of
//! event byte lengths, an optional user header, then the concatenated event
//! bytes, with everything after the header optionally compressed as one
//! region. [`RecordOutput`] accumulates events and packs the frame;
//! [`RecordInput`] decodes one, decompressing to a scratch buffer when
//! needed, and serves zero-copy event views.
//!
//! Externally produced records may omit the index array; event boundaries
//! are then recovered by walking each bank's length word.

use crate::buffer::{ByteBuffer, Endian};
use crate::compression::CompressionType;
use crate::constants::*;
use crate::record_header::{HeaderKind, RecordHeader};
use crate::util;
use crate::EvioError;

/// Default cap on events per record.
pub const DEFAULT_MAX_EVENT_COUNT: usize = 1_000_000;
/// Default cap on uncompressed event bytes per record (8 MB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 8 * 1024 * 1024;

/// Accumulates events and builds one framed, optionally compressed record.
#[derive(Debug)]
pub struct RecordOutput {
    order: Endian,
    compression: CompressionType,
    max_event_count: usize,
    max_buffer_size: usize,
    events: Vec<u8>,
    index: Vec<u32>,
    user_header: Vec<u8>,
    record_number: u32,
    has_dictionary: bool,
    has_first_event: bool,
    is_last: bool,
}

impl RecordOutput {
    pub fn new(order: Endian, compression: CompressionType) -> Self {
        Self::with_limits(
            order,
            compression,
            DEFAULT_MAX_EVENT_COUNT,
            DEFAULT_MAX_BUFFER_SIZE,
        )
    }

    pub fn with_limits(
        order: Endian,
        compression: CompressionType,
        max_event_count: usize,
        max_buffer_size: usize,
    ) -> Self {
        RecordOutput {
            order,
            compression,
            max_event_count: max_event_count.max(1),
            max_buffer_size: max_buffer_size.max(1),
            events: Vec::new(),
            index: Vec::new(),
            user_header: Vec::new(),
            record_number: 1,
            has_dictionary: false,
            has_first_event: false,
            is_last: false,
        }
    }

    pub fn set_record_number(&mut self, number: u32) {
        self.record_number = number;
    }

    pub fn record_number(&self) -> u32 {
        self.record_number
    }

    /// Bytes placed between the index array and the event data.
    pub fn set_user_header(&mut self, bytes: &[u8]) {
        self.user_header = bytes.to_vec();
    }

    pub fn set_has_dictionary(&mut self, yes: bool) {
        self.has_dictionary = yes;
    }

    pub fn set_has_first_event(&mut self, yes: bool) {
        self.has_first_event = yes;
    }

    pub fn set_last(&mut self, yes: bool) {
        self.is_last = yes;
    }

    pub fn event_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Uncompressed size of the event bytes added so far.
    pub fn event_bytes(&self) -> usize {
        self.events.len()
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    /// Append one serialized event (already in this record's byte order).
    ///
    /// Returns `false` without appending when the record is non-empty and
    /// adding would exceed the event-count or byte-size cap; the caller then
    /// builds this record and retries on a fresh one. A single event larger
    /// than the cap is accepted into an empty record.
    pub fn add_event(&mut self, event: &[u8]) -> bool {
        if !self.index.is_empty()
            && (self.index.len() + 1 > self.max_event_count
                || self.events.len() + event.len() > self.max_buffer_size)
        {
            return false;
        }
        self.index.push(event.len() as u32);
        self.events.extend_from_slice(event);
        true
    }

    /// Forget all accumulated events (the caps and flags stay).
    pub fn reset(&mut self) {
        self.events.clear();
        self.index.clear();
        self.user_header.clear();
        self.has_dictionary = false;
        self.has_first_event = false;
        self.is_last = false;
    }

    /// Pack the record frame, compressing the region after the header when
    /// a compression type is set. Returns the record bytes and the header
    /// describing them.
    pub fn build(&self) -> Result<(Vec<u8>, RecordHeader), EvioError> {
        let index_len = self.index.len() * 4;
        let user_len = self.user_header.len();
        let user_padded = util::padded_length(user_len);
        let data_len = index_len + user_padded + self.events.len();

        let mut header = RecordHeader::new(HeaderKind::EvioRecord);
        header.record_number = self.record_number;
        header.event_count = self.index.len() as u32;
        header.index_length = index_len as u32;
        header.user_header_length = user_len as u32;
        header.user_header_padding = (user_padded - user_len) as u32;
        header.uncompressed_length = data_len as u32;
        header.compression = self.compression;
        header.has_dictionary = self.has_dictionary;
        header.has_first_event = self.has_first_event;
        header.is_last = self.is_last;

        // pack the uncompressed data region
        let mut data = ByteBuffer::new(data_len).with_order(self.order);
        for &len in &self.index {
            data.put_u32(len)?;
        }
        data.put_bytes(&self.user_header)?;
        data.set_position(index_len + user_padded)?;
        data.put_bytes(&self.events)?;
        let data = data.vec_at(0, data_len)?;

        let (body, body_padded) = if self.compression.is_compressed() {
            let packed = self.compression.compress(&data)?;
            let padded = util::padded_length(packed.len());
            header.compressed_words = (padded / 4) as u32;
            header.compressed_padding = (padded - packed.len()) as u32;
            header.length_words = HEADER_SIZE_WORDS + header.compressed_words;
            (packed, padded)
        } else {
            header.compressed_words = 0;
            header.length_words = HEADER_SIZE_WORDS + (data_len / 4) as u32;
            let padded = data.len();
            (data, padded)
        };

        let total = HEADER_SIZE_BYTES + body_padded;
        let mut out = ByteBuffer::new(total).with_order(self.order);
        header.encode(&mut out, 0)?;
        out.put_bytes_at(HEADER_SIZE_BYTES, &body)?;
        Ok((out.vec_at(0, total)?, header))
    }
}

/// One decoded record serving zero-copy event views.
#[derive(Debug)]
pub struct RecordInput {
    header: RecordHeader,
    /// Uncompressed data region: index, padded user header, events.
    data: ByteBuffer,
    /// Byte offset of each event within `data`, plus the end sentinel.
    event_offsets: Vec<usize>,
    user_header: Vec<u8>,
}

impl RecordInput {
    /// Decode the record at `offset`. The buffer's byte order is corrected
    /// from the magic word as a side effect.
    pub fn read(buf: &mut ByteBuffer, offset: usize) -> Result<Self, EvioError> {
        let header = RecordHeader::decode(buf, offset)?;
        let body_at = offset + header.header_words as usize * 4;

        let data = if header.compression.is_compressed() {
            let packed = buf.vec_at(body_at, header.compressed_bytes())?;
            let scratch = header
                .compression
                .decompress(&packed, header.uncompressed_length as usize)?;
            if scratch.len() < header.uncompressed_length as usize {
                return Err(EvioError::Truncated(format!(
                    "decompressed {} bytes, header claims {}",
                    scratch.len(),
                    header.uncompressed_length
                )));
            }
            ByteBuffer::wrap(scratch).with_order(buf.order())
        } else {
            let len = if header.uncompressed_length > 0 {
                header.uncompressed_length as usize
            } else {
                (header.length_words - header.header_words) as usize * 4
            };
            if body_at + len > buf.capacity() {
                return Err(EvioError::Truncated(format!(
                    "record data of {} bytes at {} exceeds buffer of {}",
                    len,
                    body_at,
                    buf.capacity()
                )));
            }
            let mut view = buf.duplicate();
            view.set_limit(body_at + len)?;
            view.set_position(body_at)?;
            view.slice()
        };

        let index_len = header.index_length as usize;
        let user_len = header.user_header_length as usize;
        let user_padded = util::padded_length(user_len);
        let events_at = index_len + user_padded;

        let mut user_header = vec![0u8; user_len];
        if user_len > 0 {
            data.get_bytes_at(index_len, &mut user_header)?;
        }

        let mut event_offsets = Vec::with_capacity(header.event_count as usize + 1);
        event_offsets.push(events_at);
        if index_len > 0 {
            let mut at = events_at;
            for i in 0..header.event_count as usize {
                let len = data.get_u32_at(i * 4)? as usize;
                at += len;
                event_offsets.push(at);
            }
        } else {
            // no index: recover boundaries from each bank's length word
            let end = data.capacity();
            let mut at = events_at;
            while at + 4 <= end {
                let words = data.get_u32_at(at)? as usize;
                let len = (words + 1) * 4;
                if words == 0 || at + len > end {
                    return Err(EvioError::InvalidLength(format!(
                        "event of {} bytes at {} overruns record data of {}",
                        len, at, end
                    )));
                }
                at += len;
                event_offsets.push(at);
            }
        }

        let end = *event_offsets.last().unwrap_or(&events_at);
        if end > data.capacity() {
            return Err(EvioError::InvalidLength(format!(
                "event index ends at {} but record data holds {}",
                end,
                data.capacity()
            )));
        }

        Ok(RecordInput {
            header,
            data,
            event_offsets,
            user_header,
        })
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn event_count(&self) -> usize {
        self.event_offsets.len() - 1
    }

    pub fn user_header(&self) -> &[u8] {
        &self.user_header
    }

    /// Zero-copy view of the i-th event's bytes.
    pub fn event(&self, i: usize) -> Result<ByteBuffer, EvioError> {
        if i + 1 >= self.event_offsets.len() {
            return Err(EvioError::InvalidLength(format!(
                "event {} of {}",
                i,
                self.event_count()
            )));
        }
        let mut view = self.data.duplicate();
        view.set_limit(self.event_offsets[i + 1])?;
        view.set_position(self.event_offsets[i])?;
        Ok(view.slice())
    }

    /// Copy of the i-th event's bytes.
    pub fn event_bytes(&self, i: usize) -> Result<Vec<u8>, EvioError> {
        Ok(self.event(i)?.to_vec())
    }

    /// The uncompressed data region (index, padded user header, events).
    pub fn data_buffer(&self) -> &ByteBuffer {
        &self.data
    }

    /// Byte offset of the i-th event within the data region.
    pub fn event_offset(&self, i: usize) -> Result<usize, EvioError> {
        if i + 1 >= self.event_offsets.len() {
            return Err(EvioError::InvalidLength(format!(
                "event {} of {}",
                i,
                self.event_count()
            )));
        }
        Ok(self.event_offsets[i])
    }

    /// Length in bytes of the i-th event.
    pub fn event_len(&self, i: usize) -> Result<usize, EvioError> {
        if i + 1 >= self.event_offsets.len() {
            return Err(EvioError::InvalidLength(format!(
                "event {} of {}",
                i,
                self.event_count()
            )));
        }
        Ok(self.event_offsets[i + 1] - self.event_offsets[i])
    }
}
