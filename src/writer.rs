//! Multithreaded event writer.
//!
//! The producer (caller thread) fills record slots from the
//! [`RecordSupply`](crate::supply::RecordSupply) ring; N compressor threads
//! pack and compress published slots; a single writer thread appends the
//! results to the output file in publication order, maintains the running
//! record-length index, splits files at the configured size, and finishes
//! each file with a trailer before back-patching its header.
//!
//! Closing publishes the partial record, pushes one shutdown sentinel per
//! compressor lane, and joins the workers (compressors, then writer), so
//! every event added before `close()` reaches disk before it returns.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::buffer::{ByteBuffer, Endian};
use crate::compression::CompressionType;
use crate::constants::HEADER_SIZE_BYTES;
use crate::record::{RecordOutput, DEFAULT_MAX_BUFFER_SIZE, DEFAULT_MAX_EVENT_COUNT};
use crate::record_header::{FileHeader, RecordHeader};
use crate::structure::{EvioTree, NodeId};
use crate::supply::{RecordRingItem, RecordSupply, WriterSide};
use crate::util;
use crate::EvioError;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Target max bytes per file; 0 disables splitting.
    pub split_bytes: u64,
    /// Hard cap on events per record.
    pub max_record_events: usize,
    /// Hard cap on uncompressed bytes per record.
    pub max_record_bytes: usize,
    pub compression: CompressionType,
    /// Number of parallel compressor workers.
    pub compression_threads: usize,
    /// In-flight record slots; raised to at least `compression_threads` and
    /// rounded up to a power of two.
    pub ring_size: usize,
    /// Byte order of the output bytes.
    pub byte_order: Endian,
    /// XML dictionary placed in the file-level user header.
    pub dictionary_xml: Option<String>,
    /// First event placed in the file-level user header and repeated on
    /// every split. Must be serialized in `byte_order`.
    pub first_event: Option<Vec<u8>>,
    /// Write an index of record lengths into the trailer.
    pub add_trailer_index: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            split_bytes: 0,
            max_record_events: DEFAULT_MAX_EVENT_COUNT,
            max_record_bytes: DEFAULT_MAX_BUFFER_SIZE,
            compression: CompressionType::Lz4,
            compression_threads: 1,
            ring_size: 16,
            byte_order: Endian::Little,
            dictionary_xml: None,
            first_event: None,
            add_trailer_index: true,
        }
    }
}

/// Totals reported by [`Writer::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterStats {
    /// Bytes written across all splits, headers and trailers included.
    pub bytes_written: u64,
    /// Records written (trailers excluded).
    pub records_written: u32,
    pub events_written: u64,
    /// Every file produced, in order.
    pub files: Vec<PathBuf>,
}

/// One output file mid-write.
struct FileSink {
    file: File,
    path: PathBuf,
    header: FileHeader,
    bytes_written: u64,
    record_lengths: Vec<u32>,
    record_count: u32,
}

/// Multithreaded evio v6 file writer.
pub struct Writer {
    supply: Arc<RecordSupply>,
    current: Option<RecordRingItem>,
    compressors: Vec<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<Result<WriterStats, EvioError>>>,
    order: Endian,
    events_added: u64,
    closed: bool,
}

impl Writer {
    /// Create the output file, write its header (with the dictionary /
    /// first-event record as user header, when configured), and start the
    /// compressor and writer threads.
    pub fn open<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Writer, EvioError> {
        let base = path.as_ref().to_path_buf();
        let order = options.byte_order;

        let user_header = build_dictionary_record(
            order,
            options.dictionary_xml.as_deref(),
            options.first_event.as_deref(),
        )?;

        let supply = RecordSupply::new(
            options.ring_size,
            options.compression_threads,
            order,
            options.compression,
            options.max_record_events,
            options.max_record_bytes,
        );

        // open the first split on the caller thread so creation errors
        // surface immediately
        let sink = open_sink(&base, 1, order, user_header.as_deref())?;

        let compressors = (0..supply.compressor_count())
            .map(|id| {
                let side = supply.compressor_side(id);
                std::thread::Builder::new()
                    .name(format!("evio-compressor-{}", id))
                    .spawn(move || side.run())
                    .map_err(|e| EvioError::Io(format!("cannot spawn compressor: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let side = supply.writer_side();
        let worker = WriterWorker {
            side,
            base: base.clone(),
            order,
            split_bytes: options.split_bytes,
            add_trailer_index: options.add_trailer_index,
            user_header,
            sentinel_count: supply.compressor_count(),
        };
        let writer_thread = std::thread::Builder::new()
            .name("evio-writer".into())
            .spawn(move || worker.run(sink))
            .map_err(|e| EvioError::Io(format!("cannot spawn writer: {}", e)))?;

        let current = Some(supply.get());
        Ok(Writer {
            supply,
            current,
            compressors,
            writer_thread: Some(writer_thread),
            order,
            events_added: 0,
            closed: false,
        })
    }

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn events_added(&self) -> u64 {
        self.events_added
    }

    /// Append one serialized event (a top-level bank in the writer's byte
    /// order). Blocks when every record slot is in flight.
    pub fn add_event_bytes(&mut self, event: &[u8]) -> Result<(), EvioError> {
        if self.closed {
            return Err(EvioError::Closed("writer"));
        }
        let mut item = match self.current.take() {
            Some(item) => item,
            None => self.supply.get(),
        };
        if !item.record.add_event(event) {
            self.supply.publish(item);
            item = self.supply.get();
            // a fresh record always accepts one event
            item.record.add_event(event);
        }
        self.current = Some(item);
        self.events_added += 1;
        Ok(())
    }

    /// Serialize the subtree at `root` in the writer's byte order and
    /// append it.
    pub fn add_event(&mut self, tree: &mut EvioTree, root: NodeId) -> Result<(), EvioError> {
        let bytes = tree.to_bytes(root, self.order)?;
        self.add_event_bytes(&bytes)
    }

    /// Publish the partial record and ask the writer thread to flush the
    /// file once it lands.
    pub fn flush(&mut self) -> Result<(), EvioError> {
        if self.closed {
            return Err(EvioError::Closed("writer"));
        }
        if let Some(mut item) = self.current.take() {
            item.force_to_disk = true;
            self.supply.publish(item);
        }
        Ok(())
    }

    /// Publish whatever is pending, shut the pipeline down, and wait for
    /// every published event to reach disk.
    pub fn close(&mut self) -> Result<WriterStats, EvioError> {
        if self.closed {
            return Err(EvioError::Closed("writer"));
        }
        self.closed = true;

        if let Some(item) = self.current.take() {
            self.supply.publish(item);
        }
        // one sentinel per compressor lane; consecutive sequences cover
        // every lane exactly once
        for _ in 0..self.supply.compressor_count() {
            let mut sentinel = self.supply.get();
            sentinel.last_item = true;
            self.supply.publish(sentinel);
        }

        for handle in self.compressors.drain(..) {
            handle
                .join()
                .map_err(|_| EvioError::Io("compressor thread panicked".into()))?;
        }
        let stats = match self.writer_thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| EvioError::Io("writer thread panicked".into()))??,
            None => return Err(EvioError::Closed("writer")),
        };
        debug!(
            "writer closed: {} records, {} bytes, {} file(s)",
            stats.records_written,
            stats.bytes_written,
            stats.files.len()
        );
        Ok(stats)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!("writer close on drop failed: {}", e);
            }
        }
    }
}

/// Serialize the dictionary and/or first event into the uncompressed record
/// placed in the file header's user-header area.
fn build_dictionary_record(
    order: Endian,
    dictionary_xml: Option<&str>,
    first_event: Option<&[u8]>,
) -> Result<Option<Vec<u8>>, EvioError> {
    if dictionary_xml.is_none() && first_event.is_none() {
        return Ok(None);
    }
    let mut rec = RecordOutput::new(order, CompressionType::None);
    rec.set_has_dictionary(dictionary_xml.is_some());
    rec.set_has_first_event(first_event.is_some());
    if let Some(xml) = dictionary_xml {
        rec.add_event(xml.as_bytes());
    }
    if let Some(event) = first_event {
        rec.add_event(event);
    }
    let (bytes, _) = rec.build()?;
    Ok(Some(bytes))
}

/// File name for split `number`: the base path for the first file,
/// `<base>.<number>` afterwards.
fn split_path(base: &Path, number: u32) -> PathBuf {
    if number <= 1 {
        base.to_path_buf()
    } else {
        let mut name = base.as_os_str().to_os_string();
        name.push(format!(".{}", number));
        PathBuf::from(name)
    }
}

fn open_sink(
    base: &Path,
    number: u32,
    order: Endian,
    user_header: Option<&[u8]>,
) -> Result<FileSink, EvioError> {
    let path = split_path(base, number);
    let mut file = File::create(&path)
        .map_err(|e| EvioError::Io(format!("cannot create {}: {}", path.display(), e)))?;

    let user_len = user_header.map_or(0, |u| u.len());
    let user_padded = util::padded_length(user_len);

    let mut header = FileHeader::new(true);
    header.file_number = number;
    header.user_header_length = user_len as u32;
    header.user_header_padding = (user_padded - user_len) as u32;
    if let Some(user) = user_header {
        // mirror the embedded record's flags in the file header
        let mut probe = ByteBuffer::from_slice(user).with_order(order);
        if let Ok(rh) = RecordHeader::decode(&mut probe, 0) {
            header.has_dictionary = rh.has_dictionary;
            header.has_first_event = rh.has_first_event;
        }
    }

    let mut buf = ByteBuffer::new(HEADER_SIZE_BYTES + user_padded).with_order(order);
    header.encode(&mut buf, 0)?;
    if let Some(user) = user_header {
        buf.put_bytes_at(HEADER_SIZE_BYTES, user)?;
    }
    let bytes = buf.vec_at(0, HEADER_SIZE_BYTES + user_padded)?;
    file.write_all(&bytes)
        .map_err(|e| EvioError::Io(format!("cannot write file header: {}", e)))?;

    Ok(FileSink {
        file,
        path,
        header,
        bytes_written: bytes.len() as u64,
        record_lengths: Vec::new(),
        record_count: 0,
    })
}

struct WriterWorker {
    side: WriterSide,
    base: PathBuf,
    order: Endian,
    split_bytes: u64,
    add_trailer_index: bool,
    user_header: Option<Vec<u8>>,
    sentinel_count: usize,
}

impl WriterWorker {
    fn run(mut self, first_sink: FileSink) -> Result<WriterStats, EvioError> {
        let mut sink = Some(first_sink);
        let mut stats = WriterStats {
            bytes_written: 0,
            records_written: 0,
            events_written: 0,
            files: vec![],
        };
        let mut split_number = 1u32;
        let mut sentinels_seen = 0usize;
        let mut failure: Option<EvioError> = None;

        while let Some(item) = self.side.next() {
            let last = item.last_item;
            let force = item.force_to_disk;

            if last {
                sentinels_seen += 1;
            } else if failure.is_none() {
                if let Some(e) = &item.error {
                    failure = Some(EvioError::CompressionError(e.clone()));
                } else if let Some((bytes, header)) = &item.built {
                    let result = self.write_record(
                        &mut sink,
                        &mut split_number,
                        &mut stats,
                        bytes,
                        header,
                        force,
                    );
                    if let Err(e) = result {
                        failure = Some(e);
                    }
                }
            }

            self.side.release(item);
            if sentinels_seen == self.sentinel_count {
                break;
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(sink) = sink.take() {
            let written = self.finalize(sink, &mut stats)?;
            stats.bytes_written += written;
        }
        Ok(stats)
    }

    fn write_record(
        &mut self,
        sink: &mut Option<FileSink>,
        split_number: &mut u32,
        stats: &mut WriterStats,
        bytes: &[u8],
        header: &RecordHeader,
        force: bool,
    ) -> Result<(), EvioError> {
        // roll to the next split before a record that would overflow
        let needs_split = self.split_bytes > 0
            && sink.as_ref().map_or(false, |s| {
                s.record_count > 0
                    && s.bytes_written + bytes.len() as u64 > self.split_bytes
            });
        if needs_split {
            let finished = sink.take().ok_or_else(|| {
                EvioError::Io("writer lost its output file".into())
            })?;
            let written = self.finalize(finished, stats)?;
            stats.bytes_written += written;
            *split_number += 1;
            debug!("splitting to file {}", split_number);
            *sink = Some(open_sink(
                &self.base,
                *split_number,
                self.order,
                self.user_header.as_deref(),
            )?);
        }

        let sink = sink
            .as_mut()
            .ok_or_else(|| EvioError::Io("writer lost its output file".into()))?;
        sink.file
            .write_all(bytes)
            .map_err(|e| EvioError::Io(format!("cannot write record: {}", e)))?;
        sink.bytes_written += bytes.len() as u64;
        sink.record_lengths.push(bytes.len() as u32);
        sink.record_count += 1;
        stats.records_written += 1;
        stats.events_written += header.event_count as u64;
        if force {
            sink.file
                .flush()
                .map_err(|e| EvioError::Io(format!("cannot flush: {}", e)))?;
        }
        Ok(())
    }

    /// Write the trailer, back-patch the file header, and flush.
    /// Returns the bytes this file contributed (header, user header,
    /// records, trailer).
    fn finalize(&self, mut sink: FileSink, stats: &mut WriterStats) -> Result<u64, EvioError> {
        let trailer_pos = sink.bytes_written;
        let index_len = if self.add_trailer_index {
            sink.record_lengths.len() * 4
        } else {
            0
        };
        let trailer = RecordHeader::trailer(sink.record_count + 1, index_len as u32);

        let total = HEADER_SIZE_BYTES + index_len;
        let mut buf = ByteBuffer::new(total).with_order(self.order);
        trailer.encode(&mut buf, 0)?;
        if self.add_trailer_index {
            for (i, len) in sink.record_lengths.iter().enumerate() {
                buf.put_u32_at(HEADER_SIZE_BYTES + i * 4, *len)?;
            }
        }
        let bytes = buf.vec_at(0, total)?;
        sink.file
            .write_all(&bytes)
            .map_err(|e| EvioError::Io(format!("cannot write trailer: {}", e)))?;
        sink.bytes_written += bytes.len() as u64;

        // back-patch record count and trailer position into the file header
        sink.header.record_count = sink.record_count;
        sink.header.trailer_position = trailer_pos;
        let mut patched = ByteBuffer::new(HEADER_SIZE_BYTES).with_order(self.order);
        sink.header.encode(&mut patched, 0)?;
        sink.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| EvioError::Io(format!("cannot seek to file header: {}", e)))?;
        sink.file
            .write_all(&patched.vec_at(0, HEADER_SIZE_BYTES)?)
            .map_err(|e| EvioError::Io(format!("cannot patch file header: {}", e)))?;
        sink.file
            .flush()
            .map_err(|e| EvioError::Io(format!("cannot flush {}: {}", sink.path.display(), e)))?;

        stats.files.push(sink.path.clone());
        Ok(sink.bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::DataType;
    use tempfile::tempdir;

    fn event_bytes(tag: u16, values: &[u32], order: Endian) -> Vec<u8> {
        let mut tree = EvioTree::new();
        let bank = tree.add_bank(tag, DataType::Uint32, 0);
        tree.set_u32_data(bank, values).unwrap();
        tree.to_bytes(bank, order).unwrap()
    }

    #[test]
    fn test_open_write_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                ..WriterOptions::default()
            },
        )
        .unwrap();

        for i in 0..10u32 {
            writer
                .add_event_bytes(&event_bytes(1, &[i], writer.order()))
                .unwrap();
        }
        let stats = writer.close().unwrap();
        assert_eq!(stats.events_written, 10);
        assert_eq!(stats.records_written, 1);
        assert_eq!(stats.files, vec![path.clone()]);
        assert!(path.metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_close_twice_fails() {
        let dir = tempdir().unwrap();
        let mut writer =
            Writer::open(dir.path().join("x.evio"), WriterOptions::default()).unwrap();
        writer.close().unwrap();
        assert!(matches!(writer.close(), Err(EvioError::Closed(_))));
        assert!(matches!(
            writer.add_event_bytes(&[0; 12]),
            Err(EvioError::Closed(_))
        ));
    }

    #[test]
    fn test_record_rollover_on_event_cap() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("caps.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                max_record_events: 3,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        for i in 0..10u32 {
            writer
                .add_event_bytes(&event_bytes(1, &[i], writer.order()))
                .unwrap();
        }
        let stats = writer.close().unwrap();
        assert_eq!(stats.events_written, 10);
        // 3 + 3 + 3 + 1
        assert_eq!(stats.records_written, 4);
    }

    #[test]
    fn test_split_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("split.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                max_record_events: 2,
                // small enough that each 2-event record forces a roll
                split_bytes: 200,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        for i in 0..8u32 {
            writer
                .add_event_bytes(&event_bytes(1, &[i; 4], writer.order()))
                .unwrap();
        }
        let stats = writer.close().unwrap();
        assert!(stats.files.len() > 1, "expected splits, got {:?}", stats.files);
        for file in &stats.files {
            assert!(file.exists());
        }
        assert_eq!(stats.files[0], path);
        assert_eq!(
            stats.files[1],
            PathBuf::from(format!("{}.2", path.display()))
        );
    }

    #[test]
    fn test_compressed_pipeline_with_threads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lz4.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::Lz4,
                compression_threads: 4,
                max_record_events: 16,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        for i in 0..200u32 {
            writer
                .add_event_bytes(&event_bytes((i % 5) as u16, &[i, i + 1], writer.order()))
                .unwrap();
        }
        let stats = writer.close().unwrap();
        assert_eq!(stats.events_written, 200);
        assert!(stats.records_written >= 13);
    }

    #[test]
    fn test_file_header_backpatched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("patch.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                max_record_events: 2,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        for i in 0..5u32 {
            writer
                .add_event_bytes(&event_bytes(1, &[i], writer.order()))
                .unwrap();
        }
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut buf = ByteBuffer::wrap(bytes);
        let header = FileHeader::decode(&mut buf, 0).unwrap();
        assert_eq!(header.record_count, 3);
        assert!(header.trailer_position > 0);

        // the trailer really is at the recorded position
        let trailer =
            RecordHeader::decode(&mut buf, header.trailer_position as usize).unwrap();
        assert!(trailer.is_last);
        assert_eq!(trailer.event_count, 0);
        // index of 3 record lengths
        assert_eq!(trailer.index_length, 12);
    }

    #[test]
    fn test_dictionary_record_in_user_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dict.evio");
        let first = event_bytes(9, &[42], Endian::Little);
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                dictionary_xml: Some("<dict><bank name=\"hits\" tag=\"1\"/></dict>".into()),
                first_event: Some(first.clone()),
                ..WriterOptions::default()
            },
        )
        .unwrap();
        writer
            .add_event_bytes(&event_bytes(1, &[1], writer.order()))
            .unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let mut buf = ByteBuffer::wrap(bytes);
        let header = FileHeader::decode(&mut buf, 0).unwrap();
        assert!(header.has_dictionary);
        assert!(header.has_first_event);
        assert!(header.user_header_length > 0);

        // the user header is itself a record holding both entries
        let user = buf
            .vec_at(HEADER_SIZE_BYTES, header.user_header_length as usize)
            .unwrap();
        let mut user_buf = ByteBuffer::wrap(user);
        let rec = crate::record::RecordInput::read(&mut user_buf, 0).unwrap();
        assert!(rec.header().has_dictionary);
        assert!(rec.header().has_first_event);
        assert_eq!(rec.event_count(), 2);
        assert_eq!(
            rec.event_bytes(0).unwrap(),
            b"<dict><bank name=\"hits\" tag=\"1\"/></dict>"
        );
        assert_eq!(rec.event_bytes(1).unwrap(), first);
    }

    #[test]
    fn test_flush_mid_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flush.evio");
        let mut writer = Writer::open(
            &path,
            WriterOptions {
                compression: CompressionType::None,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        writer
            .add_event_bytes(&event_bytes(1, &[1], writer.order()))
            .unwrap();
        writer.flush().unwrap();
        writer
            .add_event_bytes(&event_bytes(2, &[2], writer.order()))
            .unwrap();
        let stats = writer.close().unwrap();
        assert_eq!(stats.events_written, 2);
        assert_eq!(stats.records_written, 2);
    }
}
