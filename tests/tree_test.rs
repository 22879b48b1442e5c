//! Tree model properties: P1 (structural round-trip), P3 (length
//! consistency), and P4 (pad correctness) over a payload zoo.

use evio::buffer::{ByteBuffer, Endian};
use evio::data_types::DataType;
use evio::structure::{EvioTree, NodeId, Payload};

/// A tree touching every leaf payload type plus all three container kinds.
fn payload_zoo(tree: &mut EvioTree) -> NodeId {
    let root = tree.add_bank(1, DataType::Bank, 1);

    let u32s = tree.add_bank(2, DataType::Uint32, 0);
    tree.set_u32_data(u32s, &[0, u32::MAX, 0x12345678]).unwrap();
    let i32s = tree.add_bank(3, DataType::Int32, 0);
    tree.set_i32_data(i32s, &[i32::MIN, -1, i32::MAX]).unwrap();
    let f32s = tree.add_bank(4, DataType::Float32, 0);
    tree.set_f32_data(f32s, &[0.0, -1.5, 3.25e10]).unwrap();
    let f64s = tree.add_bank(5, DataType::Double64, 0);
    tree.set_f64_data(f64s, &[-2.25e-300, 7.0]).unwrap();
    let i16s = tree.add_bank(6, DataType::Short16, 0);
    tree.set_i16_data(i16s, &[-5, 6, 7]).unwrap();
    let u16s = tree.add_bank(7, DataType::Ushort16, 0);
    tree.set_u16_data(u16s, &[0xffff]).unwrap();
    let i8s = tree.add_bank(8, DataType::Char8, 0);
    tree.set_i8_data(i8s, &[-128, 0, 127]).unwrap();
    let u8s = tree.add_bank(9, DataType::Uchar8, 0);
    tree.set_u8_data(u8s, &[1, 2, 3, 4, 5, 6]).unwrap();
    let i64s = tree.add_bank(10, DataType::Long64, 0);
    tree.set_i64_data(i64s, &[i64::MIN, i64::MAX]).unwrap();
    let u64s = tree.add_bank(11, DataType::Ulong64, 0);
    tree.set_u64_data(u64s, &[u64::MAX]).unwrap();
    let text = tree.add_bank(12, DataType::CharStar8, 0);
    tree.set_string_data(
        text,
        &["one".to_string(), "two".to_string(), String::new()],
    )
    .unwrap();

    for id in [u32s, i32s, f32s, f64s, i16s, u16s, i8s, u8s, i64s, u64s, text] {
        tree.add_child(root, id).unwrap();
    }

    // a branch of segments under the bank, tagsegments under that
    let segs = tree.add_bank(13, DataType::Segment, 0);
    let seg = tree.add_segment(14, DataType::TagSegment);
    let ts = tree.add_tag_segment(15, DataType::Short16);
    tree.set_i16_data(ts, &[9, -9]).unwrap();
    tree.add_child(root, segs).unwrap();
    tree.add_child(segs, seg).unwrap();
    tree.add_child(seg, ts).unwrap();

    root
}

#[test]
fn test_p1_roundtrip_both_orders() {
    for order in [Endian::Big, Endian::Little] {
        let mut tree = EvioTree::new();
        let root = payload_zoo(&mut tree);
        let bytes = tree.to_bytes(root, order).unwrap();

        let mut parsed = EvioTree::new();
        let proot = parsed
            .parse_event(&mut ByteBuffer::wrap(bytes.clone()).with_order(order))
            .unwrap();
        assert!(tree.subtree_eq(root, &parsed, proot));

        // writing the parse result reproduces the bytes exactly
        let again = parsed.to_bytes(proot, order).unwrap();
        assert_eq!(again, bytes);
    }
}

#[test]
fn test_p3_length_consistency_everywhere() {
    let mut tree = EvioTree::new();
    let root = payload_zoo(&mut tree);
    tree.refresh_lengths(root);

    for id in tree.preorder(root) {
        let node = tree.node(id);
        let header_words = node.header.kind.header_words();
        if node.is_container() {
            let child_total: u32 = node
                .children()
                .iter()
                .map(|&c| tree.total_words(c))
                .sum();
            assert_eq!(
                node.header.length + 1,
                header_words + child_total,
                "container tag {} violates length consistency",
                node.header.tag
            );
        } else {
            let data_words = evio::util::words(node.payload().byte_len()) as u32;
            assert_eq!(node.header.length + 1, header_words + data_words);
        }
    }
}

#[test]
fn test_p4_pad_correctness() {
    let mut tree = EvioTree::new();
    let root = payload_zoo(&mut tree);

    for id in tree.preorder(root) {
        let node = tree.node(id);
        let pad = node.header.pad as usize;
        assert!(pad < 4, "pad {} out of range", pad);
        if node.header.data_type.needs_padding() {
            let data_bytes = node.payload().byte_len();
            assert_eq!(
                (data_bytes + pad) % 4,
                0,
                "tag {} pad {} does not complete a word",
                node.header.tag,
                pad
            );
        } else if !node.is_container() {
            assert_eq!(pad, 0);
        }
    }
}

#[test]
fn test_segment_only_event_roundtrip() {
    let mut tree = EvioTree::new();
    let root = tree.add_bank(1, DataType::Segment, 9);
    for tag in 0..4u8 {
        let seg = tree.add_segment(tag, DataType::Uchar8);
        tree.set_u8_data(seg, &vec![tag; tag as usize + 1]).unwrap();
        tree.add_child(root, seg).unwrap();
    }

    let bytes = tree.to_bytes(root, Endian::Little).unwrap();
    let mut parsed = EvioTree::new();
    let proot = parsed
        .parse_event(&mut ByteBuffer::wrap(bytes).with_order(Endian::Little))
        .unwrap();
    assert!(tree.subtree_eq(root, &parsed, proot));

    for (i, &child) in parsed.node(proot).children().iter().enumerate() {
        match parsed.node(child).payload() {
            Payload::Uchar8(v) => assert_eq!(v.len(), i + 1),
            other => panic!("wrong payload {:?}", other),
        }
    }
}

#[test]
fn test_deep_nesting_roundtrip() {
    let mut tree = EvioTree::new();
    let root = tree.add_bank(0, DataType::Bank, 0);
    let mut parent = root;
    for depth in 1..=12u16 {
        let next_type = if depth == 12 {
            DataType::Uint32
        } else {
            DataType::Bank
        };
        let child = tree.add_bank(depth, next_type, 0);
        tree.add_child(parent, child).unwrap();
        parent = child;
    }
    tree.set_u32_data(parent, &[0xdeadbeef]).unwrap();

    let bytes = tree.to_bytes(root, Endian::Big).unwrap();
    let mut parsed = EvioTree::new();
    let proot = parsed.parse_event(&mut ByteBuffer::wrap(bytes)).unwrap();
    assert!(tree.subtree_eq(root, &parsed, proot));

    // the chain is still 13 nodes deep
    assert_eq!(parsed.preorder(proot).len(), 13);
}

#[test]
fn test_empty_containers_roundtrip() {
    let mut tree = EvioTree::new();
    let root = tree.add_bank(1, DataType::Bank, 0);
    let empty = tree.add_bank(2, DataType::Bank, 0);
    tree.add_child(root, empty).unwrap();

    let bytes = tree.to_bytes(root, Endian::Big).unwrap();
    // root: 2 words + child: 2 words
    assert_eq!(bytes.len(), 16);

    let mut parsed = EvioTree::new();
    let proot = parsed.parse_event(&mut ByteBuffer::wrap(bytes)).unwrap();
    assert_eq!(parsed.node(proot).children().len(), 1);
    let child = parsed.node(proot).children()[0];
    assert!(parsed.node(child).children().is_empty());
}
