//! EVIO on-disk layout constants.
//!
//! Word offsets and bit masks for the v6 record and file headers, the
//! v1-v4 block header read-compatibility path, and the structure headers.
//! Offsets are in bytes unless the name says otherwise.

// ── Record / file header geometry ───────────────────────────────────

/// Standard header length in 32-bit words (record and file headers).
pub const HEADER_SIZE_WORDS: u32 = 14;
/// Standard header length in bytes.
pub const HEADER_SIZE_BYTES: usize = 56;

/// Magic word at word 7 of every record and file header.
pub const HEADER_MAGIC: u32 = 0xc0da_0100;
/// `HEADER_MAGIC` as seen through swapped byte order.
pub const HEADER_MAGIC_SWAPPED: u32 = 0x0001_dac0;

/// File id word for EVIO files ("EVIO" in ASCII).
pub const EVIO_FILE_UNIQUE_WORD: u32 = 0x4556_494f;
/// File id word for HIPO files ("HIPO" in ASCII).
pub const HIPO_FILE_UNIQUE_WORD: u32 = 0x4849_504f;

// ── Record header byte offsets ──────────────────────────────────────

/// Total record length in words. Word 0.
pub const RECORD_LENGTH_OFFSET: usize = 0;
/// Record sequence number, starting at 1. Word 1.
pub const RECORD_NUMBER_OFFSET: usize = 4;
/// Header length in words (14, or more for non-standard headers). Word 2.
pub const HEADER_LENGTH_OFFSET: usize = 8;
/// Number of events (record) or index entries (file). Word 3.
pub const EVENT_COUNT_OFFSET: usize = 12;
/// Length of the index array in bytes. Word 4.
pub const INDEX_ARRAY_OFFSET: usize = 16;
/// Bit-info flags and format version. Word 5.
pub const BIT_INFO_OFFSET: usize = 20;
/// User header length in bytes (unpadded). Word 6.
pub const USER_LENGTH_OFFSET: usize = 24;
/// Magic word. Word 7.
pub const MAGIC_OFFSET: usize = 28;
/// Uncompressed data length in bytes. Word 8.
pub const UNCOMPRESSED_LENGTH_OFFSET: usize = 32;
/// Compression type (bits 28-31) and compressed length in words (bits 0-27). Word 9.
pub const COMPRESSION_WORD_OFFSET: usize = 36;
/// First 64-bit user register. Words 10-11.
pub const REGISTER1_OFFSET: usize = 40;
/// Second 64-bit user register. Words 12-13.
pub const REGISTER2_OFFSET: usize = 48;

// ── File header byte offsets (where they differ from a record) ──────

/// File id word ("EVIO" or "HIPO"). Word 0.
pub const FILE_ID_OFFSET: usize = 0;
/// File (split) number, starting at 1. Word 1.
pub const FILE_NUMBER_OFFSET: usize = 4;
/// 64-bit file user register. Words 8-9.
pub const FILE_REGISTER_OFFSET: usize = 32;
/// Trailer byte position within the file. Words 10-11.
pub const TRAILER_POSITION_OFFSET: usize = 40;
/// First user integer. Word 12.
pub const FILE_INT1_OFFSET: usize = 48;
/// Second user integer. Word 13.
pub const FILE_INT2_OFFSET: usize = 52;

// ── Bit-info word layout (word 5) ───────────────────────────────────

/// Low 8 bits hold the evio format version.
pub const VERSION_MASK: u32 = 0xff;
/// Set when the record (or file user header) carries a dictionary.
pub const DICTIONARY_BIT: u32 = 0x100;
/// Set on the last record (the trailer) in a file or buffer.
pub const LAST_RECORD_BIT: u32 = 0x200;
/// Set when the record (or file user header) carries a first event.
pub const FIRST_EVENT_BIT: u32 = 0x400;
/// User header padding occupies bits 20-21.
pub const USER_PADDING_SHIFT: u32 = 20;
/// Compressed data padding occupies bits 24-25.
pub const COMPRESSED_PADDING_SHIFT: u32 = 24;
/// Header type nibble occupies bits 28-31.
pub const HEADER_TYPE_SHIFT: u32 = 28;

// ── Compression word layout (word 9) ────────────────────────────────

/// Compressed data length in words, bits 0-27.
pub const COMPRESSED_LENGTH_MASK: u32 = 0x0fff_ffff;
/// Compression type, bits 28-31.
pub const COMPRESSION_TYPE_SHIFT: u32 = 28;

// ── Versions ────────────────────────────────────────────────────────

/// The version this library writes.
pub const EVIO_VERSION: u32 = 6;
/// Oldest version readable (v1-v4 use the 8-word block header).
pub const MIN_READ_VERSION: u32 = 1;
/// Newest version readable.
pub const MAX_READ_VERSION: u32 = 6;

// ── v1-v4 block header (read compatibility) ─────────────────────────

/// Length of a v1-v4 block header in words.
pub const V4_BLOCK_HEADER_WORDS: usize = 8;
/// Block length in words. Word 0.
pub const V4_BLOCK_LENGTH_OFFSET: usize = 0;
/// Block number. Word 1.
pub const V4_BLOCK_NUMBER_OFFSET: usize = 4;
/// Header length in words (8). Word 2.
pub const V4_HEADER_LENGTH_OFFSET: usize = 8;
/// Event count. Word 3.
pub const V4_EVENT_COUNT_OFFSET: usize = 12;
/// Version and flags. Word 5.
pub const V4_VERSION_OFFSET: usize = 20;
/// Magic word. Word 7.
pub const V4_MAGIC_OFFSET: usize = 28;
/// Last-block bit within the v4 version word.
pub const V4_LAST_BLOCK_BIT: u32 = 0x200;

// ── Composite format limits ─────────────────────────────────────────

/// Maximum nesting depth of `(...)` groups in a composite format string.
pub const COMPOSITE_MAX_GROUP_DEPTH: usize = 10;
/// Maximum hardcoded repeat count representable in an opcode (6 bits).
pub const COMPOSITE_MAX_REPEAT: u32 = 63;
/// Maximum byte count for an in-format string group (`Ma`).
pub const COMPOSITE_MAX_STRING_BYTES: u32 = 15;

// ── Structure headers ───────────────────────────────────────────────

/// Bank header length in words.
pub const BANK_HEADER_WORDS: u32 = 2;
/// Segment / tagsegment header length in words.
pub const SEGMENT_HEADER_WORDS: u32 = 1;

/// Byte used to pad packed string arrays.
pub const STRING_PAD_CHAR: u8 = 4;
