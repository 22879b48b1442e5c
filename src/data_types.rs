//! EVIO data type definitions.
//!
//! Maps the 6-bit type field of bank/segment headers (4-bit for tagsegments)
//! to a [`DataType`] enum. Container types come in two on-disk spellings
//! (`0xe`/`0x10` for banks, `0xd`/`0x20` for segments); both are accepted on
//! read, and serialization always emits the primary codes `0xe`, `0xd`, `0xc`.

use serde::Serialize;
use std::fmt;

/// All EVIO data type codes.
///
/// Values 0x0-0xf fit the 4-bit tagsegment type field; 0x10 and 0x20 are the
/// alternate container spellings only representable in 6-bit type fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    /// Uninterpreted 32-bit words (0x0). Swapped as u32, surfaced as raw bytes.
    Unknown32,
    /// Unsigned 32-bit integers (0x1)
    Uint32,
    /// IEEE-754 single precision floats (0x2)
    Float32,
    /// Packed NUL-terminated string array (0x3)
    CharStar8,
    /// Signed 16-bit integers (0x4)
    Short16,
    /// Unsigned 16-bit integers (0x5)
    Ushort16,
    /// Signed 8-bit integers (0x6)
    Char8,
    /// Unsigned 8-bit integers (0x7)
    Uchar8,
    /// IEEE-754 double precision floats (0x8)
    Double64,
    /// Signed 64-bit integers (0x9)
    Long64,
    /// Unsigned 64-bit integers (0xa)
    Ulong64,
    /// Signed 32-bit integers (0xb)
    Int32,
    /// Container of tagsegments (0xc)
    TagSegment,
    /// Container of segments (0xd)
    Segment,
    /// Container of banks (0xe)
    Bank,
    /// Composite format-string-driven payload (0xf)
    Composite,
    /// Alternate spelling of bank container (0x10)
    AlsoBank,
    /// Alternate spelling of segment container (0x20)
    AlsoSegment,
}

impl DataType {
    /// Parse a data type from the 6-bit header field.
    ///
    /// Unrecognized values map to `Unknown32`, which is how externally
    /// produced data with private type codes is tolerated.
    ///
    /// # Examples
    ///
    /// ```
    /// use evio::data_types::DataType;
    ///
    /// assert_eq!(DataType::from_code(0x2), DataType::Float32);
    /// assert_eq!(DataType::from_code(0xe), DataType::Bank);
    /// // alternate container spelling
    /// assert_eq!(DataType::from_code(0x10), DataType::AlsoBank);
    /// // private type codes fall back to Unknown32
    /// assert_eq!(DataType::from_code(0x1f), DataType::Unknown32);
    /// ```
    pub fn from_code(value: u32) -> Self {
        match value {
            0x0 => DataType::Unknown32,
            0x1 => DataType::Uint32,
            0x2 => DataType::Float32,
            0x3 => DataType::CharStar8,
            0x4 => DataType::Short16,
            0x5 => DataType::Ushort16,
            0x6 => DataType::Char8,
            0x7 => DataType::Uchar8,
            0x8 => DataType::Double64,
            0x9 => DataType::Long64,
            0xa => DataType::Ulong64,
            0xb => DataType::Int32,
            0xc => DataType::TagSegment,
            0xd => DataType::Segment,
            0xe => DataType::Bank,
            0xf => DataType::Composite,
            0x10 => DataType::AlsoBank,
            0x20 => DataType::AlsoSegment,
            _ => DataType::Unknown32,
        }
    }

    /// The code written to disk. Alternate container spellings are
    /// normalized to the primary codes.
    pub fn code(&self) -> u32 {
        match self {
            DataType::Unknown32 => 0x0,
            DataType::Uint32 => 0x1,
            DataType::Float32 => 0x2,
            DataType::CharStar8 => 0x3,
            DataType::Short16 => 0x4,
            DataType::Ushort16 => 0x5,
            DataType::Char8 => 0x6,
            DataType::Uchar8 => 0x7,
            DataType::Double64 => 0x8,
            DataType::Long64 => 0x9,
            DataType::Ulong64 => 0xa,
            DataType::Int32 => 0xb,
            DataType::TagSegment => 0xc,
            DataType::Segment | DataType::AlsoSegment => 0xd,
            DataType::Bank | DataType::AlsoBank => 0xe,
            DataType::Composite => 0xf,
        }
    }

    /// True for bank containers, either spelling.
    pub fn is_bank(&self) -> bool {
        matches!(self, DataType::Bank | DataType::AlsoBank)
    }

    /// True for segment containers, either spelling.
    pub fn is_segment(&self) -> bool {
        matches!(self, DataType::Segment | DataType::AlsoSegment)
    }

    /// True for tagsegment containers.
    pub fn is_tag_segment(&self) -> bool {
        matches!(self, DataType::TagSegment)
    }

    /// True if this type holds child structures rather than leaf data.
    pub fn is_container(&self) -> bool {
        self.is_bank() || self.is_segment() || self.is_tag_segment()
    }

    /// Element width in bytes for primitive leaf types.
    ///
    /// Containers, strings, and composite report 0; `Unknown32` reports 4
    /// since its payload is swapped as 32-bit words.
    pub fn element_bytes(&self) -> usize {
        match self {
            DataType::Unknown32 | DataType::Uint32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::Double64 | DataType::Long64 | DataType::Ulong64 => 8,
            DataType::Short16 | DataType::Ushort16 => 2,
            DataType::Char8 | DataType::Uchar8 => 1,
            _ => 0,
        }
    }

    /// True for types whose payload length is byte- or short-granular and
    /// therefore may need pad bytes in the last word.
    pub fn needs_padding(&self) -> bool {
        matches!(self.element_bytes(), 1 | 2)
    }

    /// Lowercase evio name for this type, e.g. `"charstar8"`.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Unknown32 => "unknown32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::CharStar8 => "charstar8",
            DataType::Short16 => "short16",
            DataType::Ushort16 => "ushort16",
            DataType::Char8 => "char8",
            DataType::Uchar8 => "uchar8",
            DataType::Double64 => "double64",
            DataType::Long64 => "long64",
            DataType::Ulong64 => "ulong64",
            DataType::Int32 => "int32",
            DataType::TagSegment => "tagsegment",
            DataType::Segment => "segment",
            DataType::Bank => "bank",
            DataType::Composite => "composite",
            DataType::AlsoBank => "alsobank",
            DataType::AlsoSegment => "alsosegment",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
