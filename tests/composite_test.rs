//! Composite data scenarios: the S3 swap case, round-trips over varied
//! formats, and format compilation failures.

use evio::buffer::{ByteBuffer, Endian};
use evio::composite::{compile_format, swap_composite, CompositeData, CompositeItem};
use evio::data_types::DataType;
use evio::structure::{EvioTree, Payload};

/// The S3 item sequence: N=2 groups of (I, D, F, 2S, 8a) with a negative
/// double, a negative float, two shorts, and an 8-byte string group.
fn s3_items() -> Vec<CompositeItem> {
    let mut items = vec![CompositeItem::N(2)];
    for round in 0..2i32 {
        items.push(CompositeItem::Int32(0x1111 * (round + 1)));
        items.push(CompositeItem::Double64(-3.14159e-100));
        items.push(CompositeItem::Float32(-3.14159e-24));
        items.push(CompositeItem::Short16(-17));
        items.push(CompositeItem::Short16(1717));
        items.push(CompositeItem::Str(vec!["abc".to_string()]));
    }
    items
}

#[test]
fn test_s3_double_swap_restores_bytes() {
    let cd = CompositeData::build("N(I,D,F,2S,8a)", 5, 6, 1, s3_items()).unwrap();
    let original = cd.to_bytes(Endian::Big).unwrap();
    let len = original.len();

    let src = ByteBuffer::wrap(original.clone());
    let mut dst = src.duplicate();
    swap_composite(&src, 0, len, &mut dst, 0).unwrap();
    let once = src.vec_at(0, len).unwrap();
    assert_ne!(once, original);

    let src = ByteBuffer::wrap(once).with_order(Endian::Little);
    let mut dst = src.duplicate();
    swap_composite(&src, 0, len, &mut dst, 0).unwrap();
    assert_eq!(src.vec_at(0, len).unwrap(), original);
}

#[test]
fn test_s3_swapped_bytes_decode_in_other_order() {
    let cd = CompositeData::build("N(I,D,F,2S,8a)", 5, 6, 1, s3_items()).unwrap();
    let big = cd.to_bytes(Endian::Big).unwrap();
    let little = cd.to_bytes(Endian::Little).unwrap();

    let src = ByteBuffer::wrap(big.clone());
    let mut dst = ByteBuffer::new(big.len());
    swap_composite(&src, 0, big.len(), &mut dst, 0).unwrap();
    assert_eq!(dst.vec_at(0, big.len()).unwrap(), little);
}

#[test]
fn test_p7_roundtrip_matrix() {
    // P7: decode(encode(format, items)) == items across format shapes
    let cases: Vec<(&str, Vec<CompositeItem>)> = vec![
        ("I", vec![CompositeItem::Int32(-5)]),
        (
            "2(D)",
            vec![
                CompositeItem::Double64(1.5),
                CompositeItem::Double64(-2.5),
            ],
        ),
        (
            "N(c)",
            vec![
                CompositeItem::N(3),
                CompositeItem::Uchar8(1),
                CompositeItem::Uchar8(2),
                CompositeItem::Uchar8(3),
            ],
        ),
        (
            "n(S,s)",
            vec![
                CompositeItem::NShort(2),
                CompositeItem::Short16(-1),
                CompositeItem::Ushort16(1),
                CompositeItem::Short16(-2),
                CompositeItem::Ushort16(2),
            ],
        ),
        (
            "m(L,l)",
            vec![
                CompositeItem::NByte(1),
                CompositeItem::Long64(i64::MIN),
                CompositeItem::Ulong64(u64::MAX),
            ],
        ),
        (
            "2(N(i))",
            vec![
                CompositeItem::N(1),
                CompositeItem::Uint32(7),
                CompositeItem::N(2),
                CompositeItem::Uint32(8),
                CompositeItem::Uint32(9),
            ],
        ),
        (
            "I,A,4a",
            vec![
                CompositeItem::Int32(1),
                CompositeItem::Hollerit(0x41424344),
                CompositeItem::Str(vec![]),
            ],
        ),
        (
            "C,c,S",
            vec![
                CompositeItem::Char8(-8),
                CompositeItem::Uchar8(8),
                CompositeItem::Short16(88),
            ],
        ),
    ];

    for (format, items) in cases {
        let cd = CompositeData::build(format, 1, 2, 3, items.clone())
            .unwrap_or_else(|e| panic!("build failed for \"{}\": {}", format, e));
        assert_eq!(cd.items(), &items[..], "items differ for \"{}\"", format);

        for order in [Endian::Big, Endian::Little] {
            let bytes = cd.to_bytes(order).unwrap();
            let (back, used) = CompositeData::parse(&bytes, 0, order).unwrap();
            assert_eq!(used, bytes.len(), "size differs for \"{}\"", format);
            assert_eq!(back.items(), &items[..], "roundtrip differs for \"{}\"", format);
        }
    }
}

#[test]
fn test_double_swap_identity_for_format_zoo() {
    let cases: Vec<(&str, Vec<CompositeItem>)> = vec![
        (
            "N(I,D)",
            vec![
                CompositeItem::N(2),
                CompositeItem::Int32(1),
                CompositeItem::Double64(-1.0),
                CompositeItem::Int32(2),
                CompositeItem::Double64(2.0),
            ],
        ),
        (
            "m(n(S))",
            vec![
                CompositeItem::NByte(1),
                CompositeItem::NShort(3),
                CompositeItem::Short16(5),
                CompositeItem::Short16(6),
                CompositeItem::Short16(7),
            ],
        ),
        (
            "8a,F",
            vec![
                CompositeItem::Str(vec!["hey".to_string()]),
                CompositeItem::Float32(9.75),
            ],
        ),
    ];

    for (format, items) in cases {
        let cd = CompositeData::build(format, 9, 8, 7, items).unwrap();
        let original = cd.to_bytes(Endian::Big).unwrap();
        let len = original.len();

        let src = ByteBuffer::wrap(original.clone());
        let mut dst = src.duplicate();
        swap_composite(&src, 0, len, &mut dst, 0).unwrap();
        let src = ByteBuffer::wrap(src.vec_at(0, len).unwrap()).with_order(Endian::Little);
        let mut dst = src.duplicate();
        swap_composite(&src, 0, len, &mut dst, 0).unwrap();
        assert_eq!(
            src.vec_at(0, len).unwrap(),
            original,
            "double swap differs for \"{}\"",
            format
        );
    }
}

#[test]
fn test_composite_payload_in_tree_roundtrip() {
    let cd = CompositeData::build(
        "N(I,F)",
        1,
        2,
        3,
        vec![
            CompositeItem::N(2),
            CompositeItem::Int32(10),
            CompositeItem::Float32(1.5),
            CompositeItem::Int32(20),
            CompositeItem::Float32(2.5),
        ],
    )
    .unwrap();

    let mut tree = EvioTree::new();
    let root = tree.add_bank(6, DataType::Bank, 0);
    let leaf = tree.add_bank(7, DataType::Composite, 3);
    tree.set_composite_data(leaf, vec![cd.clone()]).unwrap();
    tree.add_child(root, leaf).unwrap();

    for order in [Endian::Big, Endian::Little] {
        let bytes = tree.to_bytes(root, order).unwrap();
        let mut buf = ByteBuffer::wrap(bytes).with_order(order);
        let mut parsed = EvioTree::new();
        let proot = parsed.parse_event(&mut buf).unwrap();
        let pleaf = parsed.node(proot).children()[0];
        match parsed.node(pleaf).payload() {
            Payload::Composite(v) => {
                assert_eq!(v.len(), 1);
                assert_eq!(v[0], cd);
            }
            other => panic!("wrong payload {:?}", other),
        }
    }
}

#[test]
fn test_format_error_catalog() {
    for bad in ["2(I", "I)", ")", "(", "64I", "99D", "2x", "16a", "N(", ",I,"] {
        assert!(
            compile_format(bad).is_err(),
            "\"{}\" should not compile",
            bad
        );
    }
}

#[test]
fn test_format_accepts_reference_strings() {
    // formats seen in production data
    for good in [
        "N(I,D,F,2S,8a)",
        "2i,N(I)",
        "I,i,S,s,C,c,F,D,L,l,A",
        "3(N(m(c)))",
        "12a",
    ] {
        assert!(compile_format(good).is_ok(), "\"{}\" should compile", good);
    }
}

#[test]
fn test_item_type_mismatch_rejected() {
    let items = vec![CompositeItem::Float32(1.0), CompositeItem::Int32(2)];
    assert!(CompositeData::build("I,F", 1, 2, 3, items).is_err());

    // count claims more data than supplied
    let items = vec![
        CompositeItem::N(3),
        CompositeItem::Int32(1),
        CompositeItem::Int32(2),
    ];
    assert!(CompositeData::build("N(I)", 1, 2, 3, items).is_err());
}
