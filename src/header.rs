//! Bank, segment, and tagsegment header codecs.
//!
//! The three structure kinds share one parsed representation,
//! [`StructureHeader`], with bit-exact per-kind encode/decode:
//!
//! - **Bank**: two words. Word 0 is the total length in words excluding the
//!   length word itself; word 1 packs `tag(16) | pad(2) | type(6) | num(8)`.
//! - **Segment**: one word packing `tag(8) | pad(2) | type(6) | length(16)`.
//! - **Tagsegment**: one word packing `tag(12) | type(4) | length(16)`.
//!
//! Length fields always exclude the word they live in, so `length + 1` is the
//! total structure size in words for every kind.

use serde::Serialize;

use crate::buffer::ByteBuffer;
use crate::data_types::DataType;
use crate::EvioError;

/// The three container framings of the evio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StructureKind {
    Bank,
    Segment,
    TagSegment,
}

impl StructureKind {
    /// Header size in words.
    pub fn header_words(&self) -> u32 {
        match self {
            StructureKind::Bank => 2,
            StructureKind::Segment | StructureKind::TagSegment => 1,
        }
    }

    /// The container data type a parent holding this kind of child carries.
    pub fn container_type(&self) -> DataType {
        match self {
            StructureKind::Bank => DataType::Bank,
            StructureKind::Segment => DataType::Segment,
            StructureKind::TagSegment => DataType::TagSegment,
        }
    }

    /// The kind of child structure a container data type frames, if any.
    pub fn from_container_type(data_type: DataType) -> Option<StructureKind> {
        if data_type.is_bank() {
            Some(StructureKind::Bank)
        } else if data_type.is_segment() {
            Some(StructureKind::Segment)
        } else if data_type.is_tag_segment() {
            Some(StructureKind::TagSegment)
        } else {
            None
        }
    }
}

/// Parsed header of a bank, segment, or tagsegment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StructureHeader {
    pub kind: StructureKind,
    /// 16-bit for banks, 8-bit for segments, 12-bit for tagsegments.
    pub tag: u16,
    /// Banks only; 0 elsewhere.
    pub num: u8,
    /// Trailing invalid bytes in the last data word (0-3). Tagsegments have
    /// no pad field and always report 0.
    pub pad: u8,
    pub data_type: DataType,
    /// On-disk length in words, excluding the word the length lives in.
    pub length: u32,
}

impl StructureHeader {
    /// Header for a bank.
    pub fn bank(tag: u16, data_type: DataType, num: u8) -> Self {
        StructureHeader {
            kind: StructureKind::Bank,
            tag,
            num,
            pad: 0,
            data_type,
            // an empty bank still carries its second header word
            length: 1,
        }
    }

    /// Header for a segment.
    pub fn segment(tag: u8, data_type: DataType) -> Self {
        StructureHeader {
            kind: StructureKind::Segment,
            tag: tag as u16,
            num: 0,
            pad: 0,
            data_type,
            length: 0,
        }
    }

    /// Header for a tagsegment.
    pub fn tag_segment(tag: u16, data_type: DataType) -> Self {
        StructureHeader {
            kind: StructureKind::TagSegment,
            tag,
            num: 0,
            pad: 0,
            data_type,
            length: 0,
        }
    }

    /// Total structure size in words, header included.
    pub fn total_words(&self) -> u32 {
        self.length + 1
    }

    /// Payload size in words.
    pub fn data_words(&self) -> u32 {
        self.total_words() - self.kind.header_words()
    }

    /// Payload size in valid bytes (pad removed).
    pub fn data_bytes(&self) -> usize {
        (self.data_words() as usize) * 4 - self.pad as usize
    }

    /// Set `length` from a payload size in words.
    pub fn set_data_words(&mut self, data_words: u32) {
        self.length = data_words + self.kind.header_words() - 1;
    }

    /// Decode a header of the given kind at byte offset `at`, using the
    /// buffer's current byte order.
    pub fn decode(buf: &ByteBuffer, at: usize, kind: StructureKind) -> Result<Self, EvioError> {
        match kind {
            StructureKind::Bank => {
                let length = buf.get_u32_at(at)?;
                if length == 0 {
                    return Err(EvioError::InvalidLength(
                        "bank length word must include the second header word".into(),
                    ));
                }
                let word = buf.get_u32_at(at + 4)?;
                Ok(StructureHeader {
                    kind,
                    tag: (word >> 16) as u16,
                    pad: ((word >> 14) & 0x3) as u8,
                    data_type: DataType::from_code((word >> 8) & 0x3f),
                    num: (word & 0xff) as u8,
                    length,
                })
            }
            StructureKind::Segment => {
                let word = buf.get_u32_at(at)?;
                Ok(StructureHeader {
                    kind,
                    tag: (word >> 24) as u16,
                    pad: ((word >> 22) & 0x3) as u8,
                    data_type: DataType::from_code((word >> 16) & 0x3f),
                    num: 0,
                    length: word & 0xffff,
                })
            }
            StructureKind::TagSegment => {
                let word = buf.get_u32_at(at)?;
                Ok(StructureHeader {
                    kind,
                    tag: (word >> 20) as u16,
                    pad: 0,
                    data_type: DataType::from_code((word >> 16) & 0xf),
                    num: 0,
                    length: word & 0xffff,
                })
            }
        }
    }

    /// Encode this header at byte offset `at`, using the buffer's current
    /// byte order. Alternate container type spellings are written in their
    /// primary form.
    pub fn encode(&self, buf: &mut ByteBuffer, at: usize) -> Result<(), EvioError> {
        match self.kind {
            StructureKind::Bank => {
                buf.put_u32_at(at, self.length)?;
                let word = (self.tag as u32) << 16
                    | (self.pad as u32 & 0x3) << 14
                    | (self.data_type.code() & 0x3f) << 8
                    | self.num as u32;
                buf.put_u32_at(at + 4, word)?;
            }
            StructureKind::Segment => {
                if self.tag > 0xff {
                    return Err(EvioError::InvalidStructure(format!(
                        "segment tag {} exceeds 8 bits",
                        self.tag
                    )));
                }
                if self.length > 0xffff {
                    return Err(EvioError::InvalidLength(format!(
                        "segment length {} exceeds 16 bits",
                        self.length
                    )));
                }
                let word = (self.tag as u32) << 24
                    | (self.pad as u32 & 0x3) << 22
                    | (self.data_type.code() & 0x3f) << 16
                    | self.length;
                buf.put_u32_at(at, word)?;
            }
            StructureKind::TagSegment => {
                if self.tag > 0xfff {
                    return Err(EvioError::InvalidStructure(format!(
                        "tagsegment tag {} exceeds 12 bits",
                        self.tag
                    )));
                }
                if self.length > 0xffff {
                    return Err(EvioError::InvalidLength(format!(
                        "tagsegment length {} exceeds 16 bits",
                        self.length
                    )));
                }
                if self.data_type.code() > 0xf {
                    return Err(EvioError::InvalidType(self.data_type.code()));
                }
                let word =
                    (self.tag as u32) << 20 | (self.data_type.code() & 0xf) << 16 | self.length;
                buf.put_u32_at(at, word)?;
            }
        }
        Ok(())
    }
}
