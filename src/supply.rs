//! Ring of in-flight record slots for the writer pipeline.
//!
//! A fixed set of [`RecordRingItem`] slots circulates through three stages:
//! the producer fills a slot with events, the compressor whose id equals
//! `seq % N` packs and compresses it, and the single writer claims results
//! strictly in sequence order before returning the slot to the free pool.
//! Backpressure is the free pool itself: with every slot in flight the
//! producer blocks until the writer releases one.
//!
//! Stages hand slots over bounded channels; a slot is owned exclusively by
//! whichever stage currently holds it. The producer marks the final slot
//! with `last_item`, which flows through a compressor to the writer and
//! shuts the pipeline down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::debug;

use crate::buffer::Endian;
use crate::compression::CompressionType;
use crate::record::RecordOutput;
use crate::record_header::RecordHeader;

/// One slot moving through the ring.
#[derive(Debug)]
pub struct RecordRingItem {
    /// Sequence assigned when the producer claimed the slot; record numbers
    /// are `seq + 1`.
    pub seq: u64,
    pub record: RecordOutput,
    /// Packed record bytes, filled by the compressor stage.
    pub built: Option<(Vec<u8>, RecordHeader)>,
    /// Compression failure carried to the writer, which aborts.
    pub error: Option<String>,
    /// Marks the shutdown sentinel.
    pub last_item: bool,
    /// Ask the writer to flush the file after this record.
    pub force_to_disk: bool,
}

/// Compressor-side channel ends for one worker.
pub struct CompressorSide {
    pub id: usize,
    input: Receiver<RecordRingItem>,
    output: Sender<RecordRingItem>,
}

impl CompressorSide {
    /// Run the compression loop until the channel closes or a `last_item`
    /// flows through. Building the record is the compression work; results
    /// (or failures) are forwarded to the writer.
    pub fn run(self) {
        while let Ok(mut item) = self.input.recv() {
            let last = item.last_item;
            // an empty slot carries only its flags (flush or shutdown)
            if !last && !item.record.is_empty() {
                match item.record.build() {
                    Ok(built) => item.built = Some(built),
                    Err(e) => item.error = Some(e.to_string()),
                }
            }
            if self.output.send(item).is_err() {
                break;
            }
            if last {
                debug!("compressor {} saw the last item, exiting", self.id);
                break;
            }
        }
    }
}

/// Writer-side end: claims slots strictly in sequence order.
pub struct WriterSide {
    input: Receiver<RecordRingItem>,
    free: Sender<RecordRingItem>,
    /// Results arriving ahead of their turn, keyed by sequence.
    pending: std::collections::BTreeMap<u64, RecordRingItem>,
    next_seq: u64,
}

impl WriterSide {
    /// Block until the next-in-order slot arrives. Returns `None` when the
    /// pipeline has shut down.
    pub fn next(&mut self) -> Option<RecordRingItem> {
        loop {
            if let Some(item) = self.pending.remove(&self.next_seq) {
                self.next_seq += 1;
                return Some(item);
            }
            match self.input.recv() {
                Ok(item) => {
                    if item.seq == self.next_seq {
                        self.next_seq += 1;
                        return Some(item);
                    }
                    self.pending.insert(item.seq, item);
                }
                Err(_) => return None,
            }
        }
    }

    /// Return a slot to the free pool for the producer to reuse.
    pub fn release(&mut self, mut item: RecordRingItem) {
        item.record.reset();
        item.built = None;
        item.error = None;
        item.last_item = false;
        item.force_to_disk = false;
        // the producer may already be gone during shutdown
        let _ = self.free.send(item);
    }
}

/// The slot pool and its channel topology.
pub struct RecordSupply {
    ring_size: usize,
    compressor_count: usize,
    free: Receiver<RecordRingItem>,
    to_compressors: Vec<Sender<RecordRingItem>>,
    seq: AtomicU64,
    // kept so take_compressor / take_writer can hand out clones
    compressor_inputs: Vec<Receiver<RecordRingItem>>,
    writer_input: Receiver<RecordRingItem>,
    writer_output: Sender<RecordRingItem>,
    free_sender: Sender<RecordRingItem>,
}

impl RecordSupply {
    /// Build a supply of `ring_size` slots (rounded up to a power of two, at
    /// least `compressor_count`) feeding `compressor_count` workers.
    pub fn new(
        ring_size: usize,
        compressor_count: usize,
        order: Endian,
        compression: CompressionType,
        max_event_count: usize,
        max_buffer_size: usize,
    ) -> Arc<Self> {
        let compressor_count = compressor_count.max(1);
        let ring_size = ring_size
            .max(compressor_count)
            .max(2)
            .next_power_of_two();

        let (free_tx, free_rx) = bounded(ring_size);
        let mut to_compressors = Vec::with_capacity(compressor_count);
        let mut compressor_inputs = Vec::with_capacity(compressor_count);
        for _ in 0..compressor_count {
            let (tx, rx) = bounded(ring_size);
            to_compressors.push(tx);
            compressor_inputs.push(rx);
        }
        let (writer_tx, writer_rx) = bounded(ring_size);

        for _ in 0..ring_size {
            let item = RecordRingItem {
                seq: 0,
                record: RecordOutput::with_limits(
                    order,
                    compression,
                    max_event_count,
                    max_buffer_size,
                ),
                built: None,
                error: None,
                last_item: false,
                force_to_disk: false,
            };
            free_tx
                .send(item)
                .expect("fresh ring channel cannot be full");
        }

        Arc::new(RecordSupply {
            ring_size,
            compressor_count,
            free: free_rx,
            to_compressors,
            seq: AtomicU64::new(0),
            compressor_inputs,
            writer_input: writer_rx,
            writer_output: writer_tx,
            free_sender: free_tx,
        })
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    pub fn compressor_count(&self) -> usize {
        self.compressor_count
    }

    /// Producer: claim a free slot, stamping it with the next sequence.
    /// Blocks while every slot is in flight.
    pub fn get(&self) -> RecordRingItem {
        let mut item = self
            .free
            .recv()
            .expect("free channel lives as long as the supply");
        item.seq = self.seq.fetch_add(1, Ordering::SeqCst);
        item.record.set_record_number(item.seq as u32 + 1);
        item
    }

    /// Producer: hand a filled slot to its compressor (`seq % N`).
    pub fn publish(&self, item: RecordRingItem) {
        let lane = (item.seq % self.compressor_count as u64) as usize;
        // a closed lane means the pipeline is shutting down; drop the slot
        let _ = self.to_compressors[lane].send(item);
    }

    /// Channel ends for compressor `id`.
    pub fn compressor_side(&self, id: usize) -> CompressorSide {
        CompressorSide {
            id,
            input: self.compressor_inputs[id].clone(),
            output: self.writer_output.clone(),
        }
    }

    /// Channel ends for the single writer worker.
    pub fn writer_side(&self) -> WriterSide {
        WriterSide {
            input: self.writer_input.clone(),
            free: self.free_sender.clone(),
            pending: std::collections::BTreeMap::new(),
            next_seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn supply(compressors: usize) -> Arc<RecordSupply> {
        RecordSupply::new(
            4,
            compressors,
            Endian::Little,
            CompressionType::None,
            100,
            1 << 20,
        )
    }

    fn tiny_event() -> Vec<u8> {
        use crate::data_types::DataType;
        use crate::structure::EvioTree;
        let mut tree = EvioTree::new();
        let bank = tree.add_bank(1, DataType::Uint32, 0);
        tree.set_u32_data(bank, &[7]).unwrap();
        tree.to_bytes(bank, Endian::Little).unwrap()
    }

    #[test]
    fn test_ring_size_rounds_to_power_of_two() {
        let s = RecordSupply::new(
            3,
            2,
            Endian::Big,
            CompressionType::None,
            10,
            1024,
        );
        assert_eq!(s.ring_size(), 4);

        let s = RecordSupply::new(
            1,
            5,
            Endian::Big,
            CompressionType::None,
            10,
            1024,
        );
        assert!(s.ring_size() >= 5);
        assert_eq!(s.ring_size() & (s.ring_size() - 1), 0);
    }

    #[test]
    fn test_sequences_are_monotonic() {
        let s = supply(1);
        let a = s.get();
        let b = s.get();
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert_eq!(a.record.record_number(), 1);
        assert_eq!(b.record.record_number(), 2);
        // return them so the drop order doesn't matter
        s.publish(a);
        s.publish(b);
    }

    #[test]
    fn test_single_stage_flow() {
        let s = supply(1);
        let mut item = s.get();
        assert!(item.record.add_event(&tiny_event()));
        s.publish(item);

        let side = s.compressor_side(0);
        let mut got = side.input.recv().unwrap();
        let built = got.record.build().unwrap();
        got.built = Some(built);
        side.output.send(got).unwrap();

        let mut writer = s.writer_side();
        let item = writer.next().unwrap();
        assert_eq!(item.seq, 0);
        assert!(item.built.is_some());
        writer.release(item);

        // the released slot is reusable
        let again = s.get();
        assert_eq!(again.seq, 1);
        assert!(again.record.is_empty());
    }

    #[test]
    fn test_writer_reorders_out_of_order_results() {
        let s = supply(2);
        let mut writer = s.writer_side();

        // fill and publish four slots; lane 0 gets seqs 0 and 2,
        // lane 1 gets seqs 1 and 3
        let workers: Vec<_> = (0..2)
            .map(|id| {
                let side = s.compressor_side(id);
                thread::spawn(move || {
                    // stagger the lanes so results arrive out of order
                    if side.id == 0 {
                        thread::sleep(Duration::from_millis(50));
                    }
                    while let Ok(mut item) = side.input.recv() {
                        let last = item.last_item;
                        if !last {
                            item.built = Some(item.record.build().unwrap());
                        }
                        side.output.send(item).unwrap();
                        if last {
                            break;
                        }
                    }
                })
            })
            .collect();

        for _ in 0..4 {
            let mut item = s.get();
            assert!(item.record.add_event(&tiny_event()));
            s.publish(item);
        }
        let mut sentinel = s.get();
        sentinel.last_item = true;
        s.publish(sentinel);

        let mut seqs = Vec::new();
        while let Some(item) = writer.next() {
            let last = item.last_item;
            seqs.push(item.seq);
            writer.release(item);
            if last {
                break;
            }
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

        for w in workers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_producer_blocks_until_release() {
        let s = supply(1);
        // drain the whole ring
        let items: Vec<_> = (0..s.ring_size()).map(|_| s.get()).collect();

        let s2 = Arc::clone(&s);
        let producer = thread::spawn(move || {
            // blocks until a slot is freed below
            let item = s2.get();
            item.seq
        });

        thread::sleep(Duration::from_millis(50));
        // route one slot through a compressor to the writer, then release
        let side = s.compressor_side(0);
        let mut writer = s.writer_side();
        for item in items {
            s.publish(item);
        }
        for _ in 0..s.ring_size() {
            let got = side.input.recv().unwrap();
            side.output.send(got).unwrap();
            let item = writer.next().unwrap();
            writer.release(item);
        }

        let seq = producer.join().unwrap();
        assert_eq!(seq, s.ring_size() as u64);
    }
}
