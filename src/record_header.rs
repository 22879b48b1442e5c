//! Record and file header codecs.
//!
//! Both headers are 14 32-bit words sharing a skeletal layout; word 7 is the
//! magic word `0xc0da0100` used to detect byte order. Decoding first probes
//! the magic in both orientations, fixes the buffer's order, then reads the
//! remaining fields. The header-length field is authoritative: a header may
//! legally be longer than 14 words, and readers skip the extra words. The
//! write path always emits exactly 14.
//!
//! The trailer is an ordinary record header with the last-record flag set,
//! no events, and optionally an index of all record lengths.

use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::compression::CompressionType;
use crate::constants::*;
use crate::util;
use crate::EvioError;

/// Header type nibble stored in bits 28-31 of the bit-info word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderKind {
    EvioRecord,
    EvioFile,
    EvioTrailer,
    HipoRecord,
    HipoFile,
    HipoTrailer,
}

impl HeaderKind {
    pub fn nibble(&self) -> u32 {
        match self {
            HeaderKind::EvioRecord => 0,
            HeaderKind::EvioFile => 1,
            HeaderKind::EvioTrailer => 3,
            HeaderKind::HipoRecord => 4,
            HeaderKind::HipoFile => 5,
            HeaderKind::HipoTrailer => 7,
        }
    }

    pub fn from_nibble(nibble: u32) -> HeaderKind {
        match nibble & 0xf {
            1 => HeaderKind::EvioFile,
            3 => HeaderKind::EvioTrailer,
            4 => HeaderKind::HipoRecord,
            5 => HeaderKind::HipoFile,
            7 => HeaderKind::HipoTrailer,
            _ => HeaderKind::EvioRecord,
        }
    }

    pub fn is_trailer(&self) -> bool {
        matches!(self, HeaderKind::EvioTrailer | HeaderKind::HipoTrailer)
    }
}

/// Parsed 14-word record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    /// Total record length in words, compressed portion included.
    pub length_words: u32,
    /// Sequence number, starting at 1.
    pub record_number: u32,
    /// Header length in words; 14 when written, >= 14 when read.
    pub header_words: u32,
    pub event_count: u32,
    /// Index array length in bytes (4 per event, or 0 when absent).
    pub index_length: u32,
    pub version: u32,
    pub header_kind: HeaderKind,
    pub has_dictionary: bool,
    pub is_last: bool,
    pub has_first_event: bool,
    /// Bytes padding the user header to a word boundary (0-3).
    pub user_header_padding: u32,
    /// Bytes padding the compressed data to a word boundary (0-3), stored in
    /// bits 24-25 of the bit-info word so readers can recover the exact
    /// compressed length from the word-granular count.
    pub compressed_padding: u32,
    /// User header length in bytes, unpadded.
    pub user_header_length: u32,
    /// Length in bytes of the data region (index + padded user header +
    /// event bytes) before compression.
    pub uncompressed_length: u32,
    pub compression: CompressionType,
    /// Compressed data region length in words; 0 when uncompressed.
    pub compressed_words: u32,
    pub user_register1: u64,
    pub user_register2: u64,
}

impl Default for RecordHeader {
    fn default() -> Self {
        RecordHeader::new(HeaderKind::EvioRecord)
    }
}

impl RecordHeader {
    pub fn new(kind: HeaderKind) -> Self {
        RecordHeader {
            length_words: HEADER_SIZE_WORDS,
            record_number: 1,
            header_words: HEADER_SIZE_WORDS,
            event_count: 0,
            index_length: 0,
            version: EVIO_VERSION,
            header_kind: kind,
            has_dictionary: false,
            is_last: false,
            has_first_event: false,
            user_header_padding: 0,
            compressed_padding: 0,
            user_header_length: 0,
            uncompressed_length: 0,
            compression: CompressionType::None,
            compressed_words: 0,
            user_register1: 0,
            user_register2: 0,
        }
    }

    /// A trailer header: last-record flag set, no events, optionally an
    /// index of `record_count` record lengths.
    pub fn trailer(record_number: u32, index_length_bytes: u32) -> Self {
        let mut h = RecordHeader::new(HeaderKind::EvioTrailer);
        h.record_number = record_number;
        h.is_last = true;
        h.index_length = index_length_bytes;
        h.uncompressed_length = index_length_bytes;
        h.length_words = HEADER_SIZE_WORDS + index_length_bytes / 4;
        h
    }

    /// Compose the bit-info/version word (word 5).
    pub fn bit_info_word(&self) -> u32 {
        let mut word = self.version & VERSION_MASK;
        if self.has_dictionary {
            word |= DICTIONARY_BIT;
        }
        if self.is_last {
            word |= LAST_RECORD_BIT;
        }
        if self.has_first_event {
            word |= FIRST_EVENT_BIT;
        }
        word |= (self.user_header_padding & 0x3) << USER_PADDING_SHIFT;
        word |= (self.compressed_padding & 0x3) << COMPRESSED_PADDING_SHIFT;
        word |= self.header_kind.nibble() << HEADER_TYPE_SHIFT;
        word
    }

    fn apply_bit_info(&mut self, word: u32) {
        self.version = word & VERSION_MASK;
        self.has_dictionary = word & DICTIONARY_BIT != 0;
        self.is_last = word & LAST_RECORD_BIT != 0;
        self.has_first_event = word & FIRST_EVENT_BIT != 0;
        self.user_header_padding = (word >> USER_PADDING_SHIFT) & 0x3;
        self.compressed_padding = (word >> COMPRESSED_PADDING_SHIFT) & 0x3;
        self.header_kind = HeaderKind::from_nibble(word >> HEADER_TYPE_SHIFT);
    }

    /// Exact compressed data length in bytes (word count minus pad).
    pub fn compressed_bytes(&self) -> usize {
        self.compressed_words as usize * 4 - self.compressed_padding as usize
    }

    /// Compose the compression word (word 9).
    pub fn compression_word(&self) -> u32 {
        (self.compression.id() << COMPRESSION_TYPE_SHIFT)
            | (self.compressed_words & COMPRESSED_LENGTH_MASK)
    }

    /// Byte offset from the header start to the first event.
    pub fn data_offset(&self) -> usize {
        self.header_words as usize * 4
            + self.index_length as usize
            + util::padded_length(self.user_header_length as usize)
    }

    /// Total record size in bytes.
    pub fn total_bytes(&self) -> usize {
        self.length_words as usize * 4
    }

    /// Probe the magic word at `at + 28`, fixing the buffer's byte order to
    /// match the stored orientation. Fails with `BadMagic` if the word
    /// matches neither.
    pub fn detect_order(buf: &mut ByteBuffer, at: usize) -> Result<(), EvioError> {
        let magic = buf.get_u32_at(at + MAGIC_OFFSET)?;
        if magic == HEADER_MAGIC {
            return Ok(());
        }
        if magic == HEADER_MAGIC_SWAPPED {
            let order = buf.order().swapped();
            buf.set_order(order);
            return Ok(());
        }
        Err(EvioError::BadMagic(magic))
    }

    /// Decode a record header at byte offset `at`, setting the buffer's
    /// byte order from the magic word first.
    pub fn decode(buf: &mut ByteBuffer, at: usize) -> Result<Self, EvioError> {
        Self::detect_order(buf, at)?;

        let mut h = RecordHeader::new(HeaderKind::EvioRecord);
        h.length_words = buf.get_u32_at(at + RECORD_LENGTH_OFFSET)?;
        h.record_number = buf.get_u32_at(at + RECORD_NUMBER_OFFSET)?;
        h.header_words = buf.get_u32_at(at + HEADER_LENGTH_OFFSET)?;
        h.event_count = buf.get_u32_at(at + EVENT_COUNT_OFFSET)?;
        h.index_length = buf.get_u32_at(at + INDEX_ARRAY_OFFSET)?;
        h.apply_bit_info(buf.get_u32_at(at + BIT_INFO_OFFSET)?);
        h.user_header_length = buf.get_u32_at(at + USER_LENGTH_OFFSET)?;
        h.uncompressed_length = buf.get_u32_at(at + UNCOMPRESSED_LENGTH_OFFSET)?;
        let comp = buf.get_u32_at(at + COMPRESSION_WORD_OFFSET)?;
        h.compression = CompressionType::from_id(comp >> COMPRESSION_TYPE_SHIFT)?;
        h.compressed_words = comp & COMPRESSED_LENGTH_MASK;
        h.user_register1 = buf.get_u64_at(at + REGISTER1_OFFSET)?;
        h.user_register2 = buf.get_u64_at(at + REGISTER2_OFFSET)?;

        if h.version < MIN_READ_VERSION || h.version > MAX_READ_VERSION {
            return Err(EvioError::UnsupportedVersion(h.version));
        }
        if h.header_words < HEADER_SIZE_WORDS {
            return Err(EvioError::InvalidLength(format!(
                "record header of {} words, need at least {}",
                h.header_words, HEADER_SIZE_WORDS
            )));
        }
        if h.length_words < h.header_words {
            return Err(EvioError::InvalidLength(format!(
                "record of {} words shorter than its header ({})",
                h.length_words, h.header_words
            )));
        }
        Ok(h)
    }

    /// Encode this header at byte offset `at` in the buffer's byte order.
    /// Always emits the standard 14 words.
    pub fn encode(&self, buf: &mut ByteBuffer, at: usize) -> Result<(), EvioError> {
        buf.put_u32_at(at + RECORD_LENGTH_OFFSET, self.length_words)?;
        buf.put_u32_at(at + RECORD_NUMBER_OFFSET, self.record_number)?;
        buf.put_u32_at(at + HEADER_LENGTH_OFFSET, HEADER_SIZE_WORDS)?;
        buf.put_u32_at(at + EVENT_COUNT_OFFSET, self.event_count)?;
        buf.put_u32_at(at + INDEX_ARRAY_OFFSET, self.index_length)?;
        buf.put_u32_at(at + BIT_INFO_OFFSET, self.bit_info_word())?;
        buf.put_u32_at(at + USER_LENGTH_OFFSET, self.user_header_length)?;
        buf.put_u32_at(at + MAGIC_OFFSET, HEADER_MAGIC)?;
        buf.put_u32_at(at + UNCOMPRESSED_LENGTH_OFFSET, self.uncompressed_length)?;
        buf.put_u32_at(at + COMPRESSION_WORD_OFFSET, self.compression_word())?;
        buf.put_u64_at(at + REGISTER1_OFFSET, self.user_register1)?;
        buf.put_u64_at(at + REGISTER2_OFFSET, self.user_register2)?;
        Ok(())
    }
}

/// Parsed 14-word file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeader {
    /// "EVIO" or "HIPO" file id word.
    pub file_id: u32,
    /// Split number, starting at 1.
    pub file_number: u32,
    pub header_words: u32,
    /// Number of records in the file (trailer excluded).
    pub record_count: u32,
    /// File-level index array length in bytes.
    pub index_length: u32,
    pub version: u32,
    pub header_kind: HeaderKind,
    pub has_dictionary: bool,
    pub has_first_event: bool,
    pub user_header_padding: u32,
    pub user_header_length: u32,
    pub user_register: u64,
    /// Byte position of the trailer record; 0 when unknown.
    pub trailer_position: u64,
    pub user_int1: u32,
    pub user_int2: u32,
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader::new(true)
    }
}

impl FileHeader {
    /// New header with the EVIO or HIPO file id.
    pub fn new(evio: bool) -> Self {
        FileHeader {
            file_id: if evio {
                EVIO_FILE_UNIQUE_WORD
            } else {
                HIPO_FILE_UNIQUE_WORD
            },
            file_number: 1,
            header_words: HEADER_SIZE_WORDS,
            record_count: 0,
            index_length: 0,
            version: EVIO_VERSION,
            header_kind: if evio {
                HeaderKind::EvioFile
            } else {
                HeaderKind::HipoFile
            },
            has_dictionary: false,
            has_first_event: false,
            user_header_padding: 0,
            user_header_length: 0,
            user_register: 0,
            trailer_position: 0,
            user_int1: 0,
            user_int2: 0,
        }
    }

    /// Compose the bit-info/version word (word 5).
    pub fn bit_info_word(&self) -> u32 {
        let mut word = self.version & VERSION_MASK;
        if self.has_dictionary {
            word |= DICTIONARY_BIT;
        }
        if self.has_first_event {
            word |= FIRST_EVENT_BIT;
        }
        word |= (self.user_header_padding & 0x3) << USER_PADDING_SHIFT;
        word |= self.header_kind.nibble() << HEADER_TYPE_SHIFT;
        word
    }

    fn apply_bit_info(&mut self, word: u32) {
        self.version = word & VERSION_MASK;
        self.has_dictionary = word & DICTIONARY_BIT != 0;
        self.has_first_event = word & FIRST_EVENT_BIT != 0;
        self.user_header_padding = (word >> USER_PADDING_SHIFT) & 0x3;
        self.header_kind = HeaderKind::from_nibble(word >> HEADER_TYPE_SHIFT);
    }

    /// Byte offset from the file start to the first record.
    pub fn first_record_offset(&self) -> usize {
        self.header_words as usize * 4
            + self.index_length as usize
            + util::padded_length(self.user_header_length as usize)
    }

    /// Decode a file header at byte offset `at`, setting the buffer's byte
    /// order from the magic word first.
    pub fn decode(buf: &mut ByteBuffer, at: usize) -> Result<Self, EvioError> {
        RecordHeader::detect_order(buf, at)?;

        let file_id = buf.get_u32_at(at + FILE_ID_OFFSET)?;
        if file_id != EVIO_FILE_UNIQUE_WORD && file_id != HIPO_FILE_UNIQUE_WORD {
            return Err(EvioError::BadMagic(file_id));
        }

        let mut h = FileHeader::new(file_id == EVIO_FILE_UNIQUE_WORD);
        h.file_id = file_id;
        h.file_number = buf.get_u32_at(at + FILE_NUMBER_OFFSET)?;
        h.header_words = buf.get_u32_at(at + HEADER_LENGTH_OFFSET)?;
        h.record_count = buf.get_u32_at(at + EVENT_COUNT_OFFSET)?;
        h.index_length = buf.get_u32_at(at + INDEX_ARRAY_OFFSET)?;
        h.apply_bit_info(buf.get_u32_at(at + BIT_INFO_OFFSET)?);
        h.user_header_length = buf.get_u32_at(at + USER_LENGTH_OFFSET)?;
        h.user_register = buf.get_u64_at(at + FILE_REGISTER_OFFSET)?;
        h.trailer_position = buf.get_u64_at(at + TRAILER_POSITION_OFFSET)?;
        h.user_int1 = buf.get_u32_at(at + FILE_INT1_OFFSET)?;
        h.user_int2 = buf.get_u32_at(at + FILE_INT2_OFFSET)?;

        if h.version < MIN_READ_VERSION || h.version > MAX_READ_VERSION {
            return Err(EvioError::UnsupportedVersion(h.version));
        }
        if h.header_words < HEADER_SIZE_WORDS {
            return Err(EvioError::InvalidLength(format!(
                "file header of {} words, need at least {}",
                h.header_words, HEADER_SIZE_WORDS
            )));
        }
        Ok(h)
    }

    /// Encode this header at byte offset `at` in the buffer's byte order.
    /// Always emits the standard 14 words.
    pub fn encode(&self, buf: &mut ByteBuffer, at: usize) -> Result<(), EvioError> {
        buf.put_u32_at(at + FILE_ID_OFFSET, self.file_id)?;
        buf.put_u32_at(at + FILE_NUMBER_OFFSET, self.file_number)?;
        buf.put_u32_at(at + HEADER_LENGTH_OFFSET, HEADER_SIZE_WORDS)?;
        buf.put_u32_at(at + EVENT_COUNT_OFFSET, self.record_count)?;
        buf.put_u32_at(at + INDEX_ARRAY_OFFSET, self.index_length)?;
        buf.put_u32_at(at + BIT_INFO_OFFSET, self.bit_info_word())?;
        buf.put_u32_at(at + USER_LENGTH_OFFSET, self.user_header_length)?;
        buf.put_u32_at(at + MAGIC_OFFSET, HEADER_MAGIC)?;
        buf.put_u64_at(at + FILE_REGISTER_OFFSET, self.user_register)?;
        buf.put_u64_at(at + TRAILER_POSITION_OFFSET, self.trailer_position)?;
        buf.put_u32_at(at + FILE_INT1_OFFSET, self.user_int1)?;
        buf.put_u32_at(at + FILE_INT2_OFFSET, self.user_int2)?;
        Ok(())
    }
}
