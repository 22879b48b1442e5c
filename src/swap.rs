//! Endian conversion of raw evio structures.
//!
//! The engine reads each header in the source byte order, byte-reverses the
//! header words, and dispatches on the payload type: primitive leaves are
//! swapped element by element, containers are recursed into, 8-bit and
//! string data is carried across untouched, and composite payloads are
//! delegated to the composite interpreter.
//!
//! Both in-place and out-of-place conversion use the same path: in-place
//! passes a duplicate view of the source storage as the destination. Every
//! byte region is read before it is rewritten, so aliasing is safe.

use crate::buffer::ByteBuffer;
use crate::composite;
use crate::data_types::DataType;
use crate::header::{StructureHeader, StructureKind};
use crate::EvioError;

/// Swap one structure in place. `buf`'s order must be the source order;
/// it is left unchanged (views decide how to read the result). Returns the
/// structure's total size in bytes.
pub fn swap_structure(
    buf: &ByteBuffer,
    at: usize,
    kind: StructureKind,
) -> Result<usize, EvioError> {
    let mut dst = buf.duplicate();
    swap_structure_into(buf, at, &mut dst, at, kind)
}

/// Swap a top-level event (a bank) in place.
pub fn swap_event(buf: &ByteBuffer, at: usize) -> Result<usize, EvioError> {
    swap_structure(buf, at, StructureKind::Bank)
}

/// Swap one structure from `src` at `at` into `dst` at `dst_at`.
///
/// `src` keeps the source byte order; the bytes written to `dst` are in the
/// opposite order. Returns the structure's total size in bytes.
pub fn swap_structure_into(
    src: &ByteBuffer,
    at: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
    kind: StructureKind,
) -> Result<usize, EvioError> {
    let header = StructureHeader::decode(src, at, kind)?;
    let header_bytes = header.kind.header_words() as usize * 4;
    let total_bytes = header.total_words() as usize * 4;
    if at + total_bytes > src.capacity() {
        return Err(EvioError::InvalidLength(format!(
            "structure of {} bytes at {} exceeds buffer of {}",
            total_bytes,
            at,
            src.capacity()
        )));
    }

    reverse_words(src, at, header_bytes, dst, dst_at)?;
    swap_payload(
        src,
        at + header_bytes,
        dst,
        dst_at + header_bytes,
        header.data_words() as usize * 4,
        header.data_type,
        header.pad as usize,
    )?;
    Ok(total_bytes)
}

/// Swap a whole uncompressed record: header, index array, user header
/// (copied, not swapped), and the event region. Returns the record's total
/// size in bytes.
///
/// Compressed records cannot be structurally swapped; decompress first.
pub fn swap_record(
    src: &mut ByteBuffer,
    at: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<usize, EvioError> {
    let header = crate::record_header::RecordHeader::decode(src, at)?;
    if header.compression.is_compressed() {
        return Err(EvioError::InvalidData(
            "cannot swap a compressed record".into(),
        ));
    }
    let header_bytes = header.header_words as usize * 4;
    reverse_words(src, at, header_bytes, dst, dst_at)?;

    let index_at = at + header_bytes;
    let index_len = header.index_length as usize;
    reverse_words(src, index_at, index_len, dst, dst_at + header_bytes)?;

    let user_at = index_at + index_len;
    let user_padded =
        crate::util::padded_length(header.user_header_length as usize);
    if user_padded > 0 {
        let user = src.vec_at(user_at, user_padded)?;
        dst.put_bytes_at(dst_at + header_bytes + index_len, &user)?;
    }

    let data_at = user_at + user_padded;
    let data_bytes = header.total_bytes() - header_bytes - index_len - user_padded;
    swap_record_data(
        src,
        data_at,
        data_bytes,
        dst,
        dst_at + header_bytes + index_len + user_padded,
    )?;
    Ok(header.total_bytes())
}

/// Swap a record's event region: a sequence of top-level banks filling
/// `data_bytes` bytes.
pub fn swap_record_data(
    src: &ByteBuffer,
    at: usize,
    data_bytes: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<(), EvioError> {
    let mut offset = 0usize;
    while offset < data_bytes {
        let used = swap_structure_into(
            src,
            at + offset,
            dst,
            dst_at + offset,
            StructureKind::Bank,
        )?;
        offset += used;
        if used == 0 {
            return Err(EvioError::InvalidLength("zero-length event".into()));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn swap_payload(
    src: &ByteBuffer,
    at: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
    data_bytes: usize,
    data_type: DataType,
    pad: usize,
) -> Result<(), EvioError> {
    if let Some(child_kind) = StructureKind::from_container_type(data_type) {
        let mut offset = 0usize;
        while offset < data_bytes {
            let used = swap_structure_into(src, at + offset, dst, dst_at + offset, child_kind)?;
            offset += used;
        }
        return Ok(());
    }

    match data_type {
        DataType::Char8 | DataType::Uchar8 | DataType::CharStar8 => {
            // 8-bit data crosses endianness unchanged
            let bytes = src.vec_at(at, data_bytes)?;
            dst.put_bytes_at(dst_at, &bytes)?;
        }
        DataType::Short16 | DataType::Ushort16 => {
            // pad bytes are carried, not swapped
            let valid = data_bytes - pad;
            reverse_groups(src, at, valid, 2, dst, dst_at)?;
            if pad > 0 {
                let tail = src.vec_at(at + valid, pad)?;
                dst.put_bytes_at(dst_at + valid, &tail)?;
            }
        }
        DataType::Double64 | DataType::Long64 | DataType::Ulong64 => {
            reverse_groups(src, at, data_bytes, 8, dst, dst_at)?;
        }
        DataType::Composite => {
            composite::swap_composite(src, at, data_bytes, dst, dst_at)?;
        }
        // 32-bit types, unknown32, and private codes swap as words
        _ => {
            reverse_words(src, at, data_bytes, dst, dst_at)?;
        }
    }
    Ok(())
}

fn reverse_words(
    src: &ByteBuffer,
    at: usize,
    len: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<(), EvioError> {
    reverse_groups(src, at, len, 4, dst, dst_at)
}

fn reverse_groups(
    src: &ByteBuffer,
    at: usize,
    len: usize,
    width: usize,
    dst: &mut ByteBuffer,
    dst_at: usize,
) -> Result<(), EvioError> {
    let mut bytes = src.vec_at(at, len)?;
    for chunk in bytes.chunks_exact_mut(width) {
        chunk.reverse();
    }
    dst.put_bytes_at(dst_at, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Endian;
    use crate::structure::{EvioTree, Payload};

    fn mixed_event(tree: &mut EvioTree) -> crate::structure::NodeId {
        let root = tree.add_bank(1, DataType::Bank, 1);
        let ints = tree.add_bank(2, DataType::Uint32, 0);
        tree.set_u32_data(ints, &[0x01020304, 0xa0b0c0d0]).unwrap();
        let shorts = tree.add_bank(3, DataType::Short16, 0);
        tree.set_i16_data(shorts, &[0x0102, -0x0304, 0x0506]).unwrap();
        let doubles = tree.add_bank(4, DataType::Double64, 0);
        tree.set_f64_data(doubles, &[-2.75e100, 3.5]).unwrap();
        let text = tree.add_bank(5, DataType::CharStar8, 0);
        tree.set_string_data(text, &["swap".to_string()]).unwrap();
        for id in [ints, shorts, doubles, text] {
            tree.add_child(root, id).unwrap();
        }
        root
    }

    #[test]
    fn test_swap_converts_to_other_order() {
        let mut tree = EvioTree::new();
        let root = mixed_event(&mut tree);
        let big = tree.to_bytes(root, Endian::Big).unwrap();
        let little = tree.to_bytes(root, Endian::Little).unwrap();

        let buf = ByteBuffer::wrap(big.clone());
        swap_event(&buf, 0).unwrap();
        assert_eq!(buf.vec_at(0, big.len()).unwrap(), little);
    }

    #[test]
    fn test_double_swap_is_identity() {
        let mut tree = EvioTree::new();
        let root = mixed_event(&mut tree);
        let big = tree.to_bytes(root, Endian::Big).unwrap();

        let buf = ByteBuffer::wrap(big.clone());
        swap_event(&buf, 0).unwrap();
        let mut view = buf.duplicate();
        view.set_order(Endian::Little);
        swap_event(&view, 0).unwrap();
        assert_eq!(buf.vec_at(0, big.len()).unwrap(), big);
    }

    #[test]
    fn test_swapped_bytes_parse_identically() {
        let mut tree = EvioTree::new();
        let root = mixed_event(&mut tree);
        let big = tree.to_bytes(root, Endian::Big).unwrap();

        let buf = ByteBuffer::wrap(big);
        swap_event(&buf, 0).unwrap();

        let mut le = buf.duplicate();
        le.set_order(Endian::Little);
        le.rewind();
        let mut parsed = EvioTree::new();
        let proot = parsed.parse_event(&mut le).unwrap();
        assert!(tree.subtree_eq(root, &parsed, proot));
    }

    #[test]
    fn test_out_of_place_leaves_source_untouched() {
        let mut tree = EvioTree::new();
        let root = mixed_event(&mut tree);
        let big = tree.to_bytes(root, Endian::Big).unwrap();
        let little = tree.to_bytes(root, Endian::Little).unwrap();

        let src = ByteBuffer::wrap(big.clone());
        let mut dst = ByteBuffer::new(big.len());
        swap_structure_into(&src, 0, &mut dst, 0, StructureKind::Bank).unwrap();

        assert_eq!(src.vec_at(0, big.len()).unwrap(), big);
        assert_eq!(dst.vec_at(0, big.len()).unwrap(), little);
    }

    #[test]
    fn test_swap_record_data_multiple_events() {
        let mut tree = EvioTree::new();
        let a = tree.add_bank(1, DataType::Uint32, 0);
        tree.set_u32_data(a, &[0x11223344]).unwrap();
        let b = tree.add_bank(2, DataType::Uint32, 0);
        tree.set_u32_data(b, &[0x55667788]).unwrap();

        let mut bytes = tree.to_bytes(a, Endian::Big).unwrap();
        bytes.extend(tree.to_bytes(b, Endian::Big).unwrap());
        let expected: Vec<u8> = {
            let mut v = tree.to_bytes(a, Endian::Little).unwrap();
            v.extend(tree.to_bytes(b, Endian::Little).unwrap());
            v
        };

        let len = bytes.len();
        let src = ByteBuffer::wrap(bytes);
        let mut dst = src.duplicate();
        swap_record_data(&src, 0, len, &mut dst, 0).unwrap();
        assert_eq!(src.vec_at(0, len).unwrap(), expected);
    }

    #[test]
    fn test_segment_and_tagsegment_swap() {
        let mut tree = EvioTree::new();
        let root = tree.add_bank(9, DataType::Segment, 0);
        let seg = tree.add_segment(8, DataType::TagSegment);
        let ts = tree.add_tag_segment(7, DataType::Ushort16);
        tree.set_u16_data(ts, &[0xaabb, 0xccdd]).unwrap();
        tree.add_child(root, seg).unwrap();
        tree.add_child(seg, ts).unwrap();

        let big = tree.to_bytes(root, Endian::Big).unwrap();
        let little = tree.to_bytes(root, Endian::Little).unwrap();
        let buf = ByteBuffer::wrap(big.clone());
        swap_event(&buf, 0).unwrap();
        assert_eq!(buf.vec_at(0, big.len()).unwrap(), little);
    }

    #[test]
    fn test_swap_composite_payload_via_engine() {
        use crate::composite::{CompositeData, CompositeItem};
        let cd = CompositeData::build(
            "N(I,S,S)",
            1,
            2,
            3,
            vec![
                CompositeItem::N(1),
                CompositeItem::Int32(0x01020304),
                CompositeItem::Short16(0x1122),
                CompositeItem::Short16(0x3344),
            ],
        )
        .unwrap();

        let mut tree = EvioTree::new();
        let bank = tree.add_bank(1, DataType::Composite, 0);
        tree.set_composite_data(bank, vec![cd]).unwrap();

        let big = tree.to_bytes(bank, Endian::Big).unwrap();
        let little = tree.to_bytes(bank, Endian::Little).unwrap();
        let buf = ByteBuffer::wrap(big.clone());
        swap_event(&buf, 0).unwrap();
        assert_eq!(buf.vec_at(0, big.len()).unwrap(), little);
    }

    #[test]
    fn test_pad_bytes_not_swapped() {
        let mut tree = EvioTree::new();
        let bank = tree.add_bank(1, DataType::Short16, 0);
        tree.set_i16_data(bank, &[0x0102]).unwrap();
        let big = tree.to_bytes(bank, Endian::Big).unwrap();
        // header (8) + one short + two zero pad bytes
        assert_eq!(big.len(), 12);

        let buf = ByteBuffer::wrap(big);
        swap_event(&buf, 0).unwrap();
        // the short is reversed, pad bytes stay where they were
        assert_eq!(buf.get_u8_at(8).unwrap(), 0x02);
        assert_eq!(buf.get_u8_at(9).unwrap(), 0x01);
        assert_eq!(buf.get_u8_at(10).unwrap(), 0);
        assert_eq!(buf.get_u8_at(11).unwrap(), 0);

        match tree.node(bank).payload() {
            Payload::Short16(v) => assert_eq!(v, &[0x0102]),
            other => panic!("wrong payload {:?}", other),
        }
    }
}
