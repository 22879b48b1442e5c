//! EVIO v6 event format toolkit.
//!
//! The `evio-utils` crate (library name `evio`) provides Rust types and
//! functions for reading, writing, and manipulating EVIO v6 data — the
//! record-oriented, self-describing binary format used by nuclear and
//! particle physics DAQ systems.
//!
//! # Library API
//!
//! Add `evio` as a dependency to use the library directly:
//!
//! ```toml
//! [dependencies]
//! evio = { package = "evio-utils", version = "0.6" }
//! ```
//!
//! ## Quick example
//!
//! ```no_run
//! use evio::reader::Reader;
//!
//! // Open an EVIO v6 file (byte order is auto-detected from the magic word)
//! let mut reader = Reader::open("run42.evio").unwrap();
//! println!("events: {}", reader.event_count().unwrap());
//!
//! // Sequential access
//! while let Some(event) = reader.next_event().unwrap() {
//!     println!("event of {} bytes", event.remaining());
//! }
//! ```
//!
//! ## Key entry points
//!
//! | Type / Function | Purpose |
//! |-----------------|---------|
//! | [`Reader`](reader::Reader) | Open files/buffers, iterate records, random event access |
//! | [`Writer`](writer::Writer) | Multithreaded record writer with compression and file splitting |
//! | [`EvioTree`](structure::EvioTree) | In-memory bank/segment/tagsegment tree with typed payloads |
//! | [`EvioNode`](compact::EvioNode) | Zero-copy descriptor into a backing buffer |
//! | [`CompositeData`](composite::CompositeData) | Format-string-driven mixed-type payloads |
//! | [`RecordOutput`](record::RecordOutput) | Pack events into a framed, compressed record |
//! | [`EvioDictionary`](dictionary::EvioDictionary) | Name to tag/num lookups |
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`buffer`] | Positioned, limited, byte-order-aware byte window |
//! | [`header`] | Bank/segment/tagsegment header codecs |
//! | [`record_header`] | Record and file header codecs, trailer construction |
//! | [`structure`] | Hierarchical event tree model |
//! | [`swap`] | Endian conversion of raw structures and records |
//! | [`composite`] | Composite data: format compiler, codec, swapper |
//! | [`compact`] | Pointer-free node view with in-place structural edits |
//! | [`record`] | Record building, decompression, and event indexing |
//! | [`supply`] | Ring of in-flight record slots for the writer pipeline |
//! | [`writer`] | Producer / compressor / writer threads, splitting, trailer |
//! | [`reader`] | File and buffer ingestion, sequential and random access |
//! | [`index`] | Global event number to record/offset mapping |
//! | [`dictionary`] | Tag/num/tag-range name lookups |
//! | [`xml`] | XML dump of event trees |
//! | [`constants`] | On-disk layout constants |

pub mod buffer;
pub mod compact;
pub mod composite;
pub mod compression;
pub mod constants;
pub mod data_types;
pub mod dictionary;
pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod record_header;
pub mod structure;
pub mod supply;
pub mod swap;
pub mod util;
pub mod writer;
pub mod xml;

use thiserror::Error;

/// Errors returned by `evio` operations.
#[derive(Error, Debug)]
pub enum EvioError {
    /// Header magic word matches neither byte orientation.
    #[error("bad magic word 0x{0:08x}")]
    BadMagic(u32),

    /// Version field outside the supported range (read: 1-6, write: 6).
    #[error("unsupported evio version {0}")]
    UnsupportedVersion(u32),

    /// Buffer or file ends mid-structure.
    #[error("truncated data: {0}")]
    Truncated(String),

    /// A length field implies bytes beyond the containing structure.
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Data type code not recognized in context.
    #[error("invalid data type 0x{0:x}")]
    InvalidType(u32),

    /// Tree invariant violated (e.g. child added to a non-container).
    #[error("invalid structure: {0}")]
    InvalidStructure(String),

    /// Composite format string failed to parse.
    #[error("invalid composite format: {0}")]
    InvalidFormat(String),

    /// Composite item sequence does not match the compiled format.
    #[error("invalid composite data: {0}")]
    InvalidData(String),

    /// Compressor or decompressor reported failure.
    #[error("compression error: {0}")]
    CompressionError(String),

    /// An I/O error occurred (file open, read, seek, or write failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// Operation on an already-closed reader or writer.
    #[error("{0} is closed")]
    Closed(&'static str),
}
