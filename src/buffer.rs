//! Positioned, limited, byte-order-aware byte window.
//!
//! [`ByteBuffer`] is the working surface for every codec in this crate: a
//! view over shared backing storage with an independent position, limit, and
//! byte order. Views created by [`slice`](ByteBuffer::slice) and
//! [`duplicate`](ByteBuffer::duplicate) share the same bytes, so a write
//! through one view is visible through all others; only
//! [`copy`](ByteBuffer::copy) detaches the storage. An outstanding view keeps
//! the underlying bytes alive.
//!
//! Absolute accessors (`*_at`) address the view from its own origin and check
//! against the view capacity; relative accessors advance `position` and check
//! against `limit`.

use std::ops::Range;
use std::sync::{Arc, RwLock};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::EvioError;

/// Byte order of multi-byte values in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// The byte order of the host.
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// The opposite byte order.
    pub fn swapped(&self) -> Endian {
        match self {
            Endian::Big => Endian::Little,
            Endian::Little => Endian::Big,
        }
    }

    pub fn is_big(&self) -> bool {
        matches!(self, Endian::Big)
    }

    pub fn is_little(&self) -> bool {
        matches!(self, Endian::Little)
    }
}

/// A byte window with position, limit, and byte order.
#[derive(Debug)]
pub struct ByteBuffer {
    store: Arc<RwLock<Vec<u8>>>,
    /// Start of this view within the backing store.
    offset: usize,
    /// View length in bytes.
    capacity: usize,
    position: usize,
    limit: usize,
    order: Endian,
}

macro_rules! buffer_accessors {
    ($get:ident, $get_at:ident, $put:ident, $put_at:ident, $ty:ty, $size:expr, $read:ident, $write:ident) => {
        /// Absolute read at `at` bytes from the view origin.
        pub fn $get_at(&self, at: usize) -> Result<$ty, EvioError> {
            let range = self.abs_range(at, $size)?;
            let store = self.read_store();
            let s = &store[range];
            Ok(match self.order {
                Endian::Big => BigEndian::$read(s),
                Endian::Little => LittleEndian::$read(s),
            })
        }

        /// Relative read at the current position, which then advances.
        pub fn $get(&mut self) -> Result<$ty, EvioError> {
            self.check_remaining($size)?;
            let v = self.$get_at(self.position)?;
            self.position += $size;
            Ok(v)
        }

        /// Absolute write at `at` bytes from the view origin.
        pub fn $put_at(&mut self, at: usize, value: $ty) -> Result<(), EvioError> {
            let range = self.abs_range(at, $size)?;
            let mut store = self.write_store();
            let s = &mut store[range];
            match self.order {
                Endian::Big => BigEndian::$write(s, value),
                Endian::Little => LittleEndian::$write(s, value),
            }
            Ok(())
        }

        /// Relative write at the current position, which then advances.
        pub fn $put(&mut self, value: $ty) -> Result<(), EvioError> {
            self.check_remaining($size)?;
            self.$put_at(self.position, value)?;
            self.position += $size;
            Ok(())
        }
    };
}

impl ByteBuffer {
    /// Allocate a zero-filled buffer of `capacity` bytes.
    ///
    /// Position is 0, limit equals capacity, order is big-endian (the evio
    /// default).
    pub fn new(capacity: usize) -> Self {
        ByteBuffer {
            store: Arc::new(RwLock::new(vec![0u8; capacity])),
            offset: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: Endian::Big,
        }
    }

    /// Wrap an existing byte vector without copying.
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let capacity = bytes.len();
        ByteBuffer {
            store: Arc::new(RwLock::new(bytes)),
            offset: 0,
            capacity,
            position: 0,
            limit: capacity,
            order: Endian::Big,
        }
    }

    /// Copy a slice into a fresh buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::wrap(bytes.to_vec())
    }

    fn read_store(&self) -> std::sync::RwLockReadGuard<'_, Vec<u8>> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_store(&self) -> std::sync::RwLockWriteGuard<'_, Vec<u8>> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    fn abs_range(&self, at: usize, size: usize) -> Result<Range<usize>, EvioError> {
        let end = at
            .checked_add(size)
            .ok_or_else(|| EvioError::Truncated("buffer offset overflow".into()))?;
        if end > self.capacity {
            return Err(EvioError::Truncated(format!(
                "access of {} bytes at {} exceeds capacity {}",
                size, at, self.capacity
            )));
        }
        Ok(self.offset + at..self.offset + end)
    }

    fn check_remaining(&self, size: usize) -> Result<(), EvioError> {
        if self.position + size > self.limit {
            return Err(EvioError::Truncated(format!(
                "{} bytes needed at position {} with limit {}",
                size, self.position, self.limit
            )));
        }
        Ok(())
    }

    // ── View state ──────────────────────────────────────────────────

    pub fn order(&self) -> Endian {
        self.order
    }

    pub fn set_order(&mut self, order: Endian) {
        self.order = order;
    }

    /// Builder-style order setter for freshly constructed buffers.
    pub fn with_order(mut self, order: Endian) -> Self {
        self.order = order;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), EvioError> {
        if position > self.limit {
            return Err(EvioError::InvalidLength(format!(
                "position {} beyond limit {}",
                position, self.limit
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) -> Result<(), EvioError> {
        if limit > self.capacity {
            return Err(EvioError::InvalidLength(format!(
                "limit {} beyond capacity {}",
                limit, self.capacity
            )));
        }
        self.limit = limit;
        if self.position > limit {
            self.position = limit;
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.position)
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Limit moves to the current position, position rewinds to 0.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Position rewinds to 0, limit restores to capacity.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity;
    }

    /// Position rewinds to 0; limit unchanged.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// Move unread bytes `[position..limit)` to the start of the view,
    /// leaving position at the copied length and limit at capacity.
    pub fn compact(&mut self) {
        let len = self.remaining();
        {
            let mut store = self.write_store();
            store.copy_within(
                self.offset + self.position..self.offset + self.limit,
                self.offset,
            );
        }
        self.position = len;
        self.limit = self.capacity;
    }

    // ── Views ───────────────────────────────────────────────────────

    /// A view of the unread region sharing this buffer's bytes.
    ///
    /// The slice's origin is this buffer's current position; its position is
    /// 0 and its capacity and limit equal `remaining()`. Writes through
    /// either view are visible through the other.
    pub fn slice(&self) -> ByteBuffer {
        ByteBuffer {
            store: Arc::clone(&self.store),
            offset: self.offset + self.position,
            capacity: self.remaining(),
            position: 0,
            limit: self.remaining(),
            order: self.order,
        }
    }

    /// A view sharing bytes, origin, position, and limit with this buffer.
    pub fn duplicate(&self) -> ByteBuffer {
        ByteBuffer {
            store: Arc::clone(&self.store),
            offset: self.offset,
            capacity: self.capacity,
            position: self.position,
            limit: self.limit,
            order: self.order,
        }
    }

    /// Deep copy of the whole view with detached storage.
    pub fn copy(&self) -> ByteBuffer {
        let store = self.read_store();
        let bytes = store[self.offset..self.offset + self.capacity].to_vec();
        drop(store);
        ByteBuffer {
            store: Arc::new(RwLock::new(bytes)),
            offset: 0,
            capacity: self.capacity,
            position: self.position,
            limit: self.limit,
            order: self.order,
        }
    }

    /// Grow the view (and the backing store if needed) to `new_capacity`
    /// bytes, zero-filling the extension. Limit is raised to the new
    /// capacity; position is unchanged.
    pub fn expand(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity {
            return;
        }
        {
            let mut store = self.write_store();
            let needed = self.offset + new_capacity;
            if store.len() < needed {
                store.resize(needed, 0);
            }
        }
        self.capacity = new_capacity;
        self.limit = new_capacity;
    }

    // ── Typed accessors ─────────────────────────────────────────────

    /// Absolute single-byte read.
    pub fn get_u8_at(&self, at: usize) -> Result<u8, EvioError> {
        let range = self.abs_range(at, 1)?;
        Ok(self.read_store()[range.start])
    }

    /// Relative single-byte read.
    pub fn get_u8(&mut self) -> Result<u8, EvioError> {
        self.check_remaining(1)?;
        let v = self.get_u8_at(self.position)?;
        self.position += 1;
        Ok(v)
    }

    /// Absolute single-byte write.
    pub fn put_u8_at(&mut self, at: usize, value: u8) -> Result<(), EvioError> {
        let range = self.abs_range(at, 1)?;
        self.write_store()[range.start] = value;
        Ok(())
    }

    /// Relative single-byte write.
    pub fn put_u8(&mut self, value: u8) -> Result<(), EvioError> {
        self.check_remaining(1)?;
        self.put_u8_at(self.position, value)?;
        self.position += 1;
        Ok(())
    }

    pub fn get_i8_at(&self, at: usize) -> Result<i8, EvioError> {
        Ok(self.get_u8_at(at)? as i8)
    }

    pub fn get_i8(&mut self) -> Result<i8, EvioError> {
        Ok(self.get_u8()? as i8)
    }

    pub fn put_i8_at(&mut self, at: usize, value: i8) -> Result<(), EvioError> {
        self.put_u8_at(at, value as u8)
    }

    pub fn put_i8(&mut self, value: i8) -> Result<(), EvioError> {
        self.put_u8(value as u8)
    }

    buffer_accessors!(get_u16, get_u16_at, put_u16, put_u16_at, u16, 2, read_u16, write_u16);
    buffer_accessors!(get_i16, get_i16_at, put_i16, put_i16_at, i16, 2, read_i16, write_i16);
    buffer_accessors!(get_u32, get_u32_at, put_u32, put_u32_at, u32, 4, read_u32, write_u32);
    buffer_accessors!(get_i32, get_i32_at, put_i32, put_i32_at, i32, 4, read_i32, write_i32);
    buffer_accessors!(get_u64, get_u64_at, put_u64, put_u64_at, u64, 8, read_u64, write_u64);
    buffer_accessors!(get_i64, get_i64_at, put_i64, put_i64_at, i64, 8, read_i64, write_i64);
    buffer_accessors!(get_f32, get_f32_at, put_f32, put_f32_at, f32, 4, read_f32, write_f32);
    buffer_accessors!(get_f64, get_f64_at, put_f64, put_f64_at, f64, 8, read_f64, write_f64);

    // ── Bulk accessors ──────────────────────────────────────────────

    /// Absolute bulk read into `dst`.
    pub fn get_bytes_at(&self, at: usize, dst: &mut [u8]) -> Result<(), EvioError> {
        let range = self.abs_range(at, dst.len())?;
        dst.copy_from_slice(&self.read_store()[range]);
        Ok(())
    }

    /// Relative bulk read; position advances by `dst.len()`.
    pub fn get_bytes(&mut self, dst: &mut [u8]) -> Result<(), EvioError> {
        self.check_remaining(dst.len())?;
        self.get_bytes_at(self.position, dst)?;
        self.position += dst.len();
        Ok(())
    }

    /// Absolute bulk write from `src`.
    pub fn put_bytes_at(&mut self, at: usize, src: &[u8]) -> Result<(), EvioError> {
        let range = self.abs_range(at, src.len())?;
        self.write_store()[range].copy_from_slice(src);
        Ok(())
    }

    /// Relative bulk write; position advances by `src.len()`.
    pub fn put_bytes(&mut self, src: &[u8]) -> Result<(), EvioError> {
        self.check_remaining(src.len())?;
        self.put_bytes_at(self.position, src)?;
        self.position += src.len();
        Ok(())
    }

    /// Copy of the unread region `[position..limit)`.
    pub fn to_vec(&self) -> Vec<u8> {
        let store = self.read_store();
        store[self.offset + self.position..self.offset + self.limit].to_vec()
    }

    /// Copy of `len` bytes at absolute offset `at`.
    pub fn vec_at(&self, at: usize, len: usize) -> Result<Vec<u8>, EvioError> {
        let range = self.abs_range(at, len)?;
        Ok(self.read_store()[range].to_vec())
    }

    /// Run `f` over the whole view as a plain slice.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let store = self.read_store();
        f(&store[self.offset..self.offset + self.capacity])
    }

    /// Run `f` over the whole view as a mutable slice.
    ///
    /// Takes `&self`: the backing store is behind a lock, and edits must be
    /// visible through sibling views.
    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut store = self.write_store();
        let offset = self.offset;
        let capacity = self.capacity;
        f(&mut store[offset..offset + capacity])
    }

    /// True when two buffers share the same backing store.
    pub fn shares_storage(&self, other: &ByteBuffer) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let buf = ByteBuffer::new(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 16);
        assert_eq!(buf.remaining(), 16);
        assert_eq!(buf.order(), Endian::Big);
    }

    #[test]
    fn test_relative_accessors_advance_position() {
        let mut buf = ByteBuffer::new(12);
        buf.put_u32(0xdeadbeef).unwrap();
        buf.put_u16(0x1234).unwrap();
        buf.put_u8(0x56).unwrap();
        assert_eq!(buf.position(), 7);

        buf.rewind();
        assert_eq!(buf.get_u32().unwrap(), 0xdeadbeef);
        assert_eq!(buf.get_u16().unwrap(), 0x1234);
        assert_eq!(buf.get_u8().unwrap(), 0x56);
    }

    #[test]
    fn test_order_changes_byte_layout() {
        let mut buf = ByteBuffer::new(4);
        buf.put_u32_at(0, 0x01020304).unwrap();
        let mut raw = [0u8; 4];
        buf.get_bytes_at(0, &mut raw).unwrap();
        assert_eq!(raw, [1, 2, 3, 4]);

        buf.set_order(Endian::Little);
        assert_eq!(buf.get_u32_at(0).unwrap(), 0x04030201);
    }

    #[test]
    fn test_float_accessors() {
        let mut buf = ByteBuffer::new(12);
        buf.put_f32_at(0, 2.008).unwrap();
        buf.put_f64_at(4, -1.5e-100).unwrap();
        assert_eq!(buf.get_f32_at(0).unwrap(), 2.008);
        assert_eq!(buf.get_f64_at(4).unwrap(), -1.5e-100);
    }

    #[test]
    fn test_reads_past_limit_fail() {
        let mut buf = ByteBuffer::new(4);
        buf.set_limit(2).unwrap();
        assert!(buf.get_u32().is_err());
        assert!(buf.get_u16().is_ok());
    }

    #[test]
    fn test_absolute_reads_check_capacity() {
        let buf = ByteBuffer::new(4);
        assert!(buf.get_u32_at(0).is_ok());
        assert!(buf.get_u32_at(1).is_err());
        assert!(buf.get_u8_at(4).is_err());
    }

    #[test]
    fn test_flip_clear_rewind() {
        let mut buf = ByteBuffer::new(8);
        buf.put_u32(7).unwrap();
        buf.flip();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 4);
        assert_eq!(buf.get_u32().unwrap(), 7);

        buf.clear();
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.limit(), 8);
    }

    #[test]
    fn test_compact_moves_unread_bytes() {
        let mut buf = ByteBuffer::wrap(vec![1, 2, 3, 4, 5, 6, 7, 8]);
        buf.set_position(6).unwrap();
        buf.compact();
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.limit(), 8);
        assert_eq!(buf.get_u8_at(0).unwrap(), 7);
        assert_eq!(buf.get_u8_at(1).unwrap(), 8);
    }

    #[test]
    fn test_slice_shares_bytes_with_parent() {
        let mut parent = ByteBuffer::new(8);
        parent.set_position(4).unwrap();
        let mut child = parent.slice();
        assert_eq!(child.capacity(), 4);
        assert!(child.shares_storage(&parent));

        child.put_u32_at(0, 0xcafef00d).unwrap();
        assert_eq!(parent.get_u32_at(4).unwrap(), 0xcafef00d);

        parent.put_u8_at(7, 0x11).unwrap();
        assert_eq!(child.get_u32_at(0).unwrap(), 0xcafef011);
    }

    #[test]
    fn test_duplicate_has_independent_position() {
        let mut buf = ByteBuffer::new(8);
        buf.put_u32(1).unwrap();
        let mut dup = buf.duplicate();
        assert_eq!(dup.position(), 4);
        dup.rewind();
        assert_eq!(dup.get_u32().unwrap(), 1);
        // original position untouched by the duplicate's reads
        assert_eq!(buf.position(), 4);
    }

    #[test]
    fn test_copy_detaches_storage() {
        let mut buf = ByteBuffer::new(4);
        buf.put_u32_at(0, 42).unwrap();
        let copy = buf.copy();
        assert!(!copy.shares_storage(&buf));

        buf.put_u32_at(0, 99).unwrap();
        assert_eq!(copy.get_u32_at(0).unwrap(), 42);
    }

    #[test]
    fn test_wrap_does_not_copy_semantics() {
        let buf = ByteBuffer::wrap(vec![0, 0, 0, 9]);
        assert_eq!(buf.get_u32_at(0).unwrap(), 9);
    }

    #[test]
    fn test_expand_grows_and_preserves() {
        let mut buf = ByteBuffer::new(4);
        buf.put_u32_at(0, 0xaabbccdd).unwrap();
        buf.expand(12);
        assert_eq!(buf.capacity(), 12);
        assert_eq!(buf.limit(), 12);
        assert_eq!(buf.get_u32_at(0).unwrap(), 0xaabbccdd);
        assert_eq!(buf.get_u32_at(8).unwrap(), 0);
    }

    #[test]
    fn test_set_limit_clamps_position() {
        let mut buf = ByteBuffer::new(8);
        buf.set_position(6).unwrap();
        buf.set_limit(4).unwrap();
        assert_eq!(buf.position(), 4);
        assert!(buf.set_limit(9).is_err());
    }

    #[test]
    fn test_bulk_roundtrip() {
        let mut buf = ByteBuffer::new(6);
        buf.put_bytes(&[1, 2, 3, 4, 5, 6]).unwrap();
        buf.flip();
        let mut dst = [0u8; 6];
        buf.get_bytes(&mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 5, 6]);
        assert_eq!(buf.to_vec(), Vec::<u8>::new());
    }
}
