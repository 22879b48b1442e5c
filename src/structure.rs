//! Hierarchical event model: banks, segments, and tagsegments.
//!
//! An [`EvioTree`] is an arena of structures. Each node carries a
//! [`StructureHeader`], a typed payload for leaves, and an ordered child list
//! for containers. Parent links are arena indices, never owners, so the tree
//! is a strict arborescence. Length fields are refreshed from the bottom up
//! whenever the tree is serialized (or explicitly via
//! [`refresh_lengths`](EvioTree::refresh_lengths)), so intermediate edits
//! never have to keep them consistent.
//!
//! Serialization writes a node's header and payload recursively in the target
//! buffer's byte order; parsing is the exact inverse and decodes leaf
//! payloads into typed vectors.

use crate::buffer::{ByteBuffer, Endian};
use crate::composite::CompositeData;
use crate::data_types::DataType;
use crate::header::{StructureHeader, StructureKind};
use crate::util;
use crate::EvioError;

/// Index of a node within its [`EvioTree`] arena.
pub type NodeId = usize;

/// Typed payload of a leaf structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Containers and freshly constructed leaves.
    None,
    /// Uninterpreted bytes (`unknown32` and private type codes).
    Raw(Vec<u8>),
    Uint32(Vec<u32>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Double64(Vec<f64>),
    Short16(Vec<i16>),
    Ushort16(Vec<u16>),
    Char8(Vec<i8>),
    Uchar8(Vec<u8>),
    Long64(Vec<i64>),
    Ulong64(Vec<u64>),
    Strings(Vec<String>),
    Composite(Vec<CompositeData>),
}

impl Payload {
    /// Unpadded payload size in bytes.
    ///
    /// String and composite payloads are word-aligned by construction and
    /// report their packed size.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::None => 0,
            Payload::Raw(v) => v.len(),
            Payload::Uint32(v) => v.len() * 4,
            Payload::Int32(v) => v.len() * 4,
            Payload::Float32(v) => v.len() * 4,
            Payload::Double64(v) => v.len() * 8,
            Payload::Short16(v) => v.len() * 2,
            Payload::Ushort16(v) => v.len() * 2,
            Payload::Char8(v) => v.len(),
            Payload::Uchar8(v) => v.len(),
            Payload::Long64(v) => v.len() * 8,
            Payload::Ulong64(v) => v.len() * 8,
            Payload::Strings(v) => util::pack_strings(v).len(),
            Payload::Composite(v) => v.iter().map(|c| c.packed_bytes()).sum(),
        }
    }
}

/// One structure in the tree.
#[derive(Debug, Clone)]
pub struct Structure {
    pub header: StructureHeader,
    payload: Payload,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Structure {
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_container(&self) -> bool {
        self.header.data_type.is_container()
    }
}

/// Callbacks invoked while parsing an event.
pub trait ParseListener {
    fn start_event(&mut self) {}
    fn got_structure(&mut self, _tree: &EvioTree, _node: NodeId) {}
    fn end_event(&mut self) {}
}

/// Arena of structures forming one or more trees.
#[derive(Debug, Default, Clone)]
pub struct EvioTree {
    nodes: Vec<Structure>,
}

impl EvioTree {
    pub fn new() -> Self {
        EvioTree { nodes: Vec::new() }
    }

    fn push(&mut self, header: StructureHeader) -> NodeId {
        self.nodes.push(Structure {
            header,
            payload: Payload::None,
            children: Vec::new(),
            parent: None,
        });
        self.nodes.len() - 1
    }

    /// New detached bank.
    pub fn add_bank(&mut self, tag: u16, data_type: DataType, num: u8) -> NodeId {
        self.push(StructureHeader::bank(tag, data_type, num))
    }

    /// New detached segment.
    pub fn add_segment(&mut self, tag: u8, data_type: DataType) -> NodeId {
        self.push(StructureHeader::segment(tag, data_type))
    }

    /// New detached tagsegment.
    pub fn add_tag_segment(&mut self, tag: u16, data_type: DataType) -> NodeId {
        self.push(StructureHeader::tag_segment(tag, data_type))
    }

    pub fn node(&self, id: NodeId) -> &Structure {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach `child` as the last child of `parent`.
    ///
    /// The parent must be a container whose data type frames the child's
    /// kind; the child is detached from any prior parent first. Attaching a
    /// node to its own descendant fails.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), EvioError> {
        let parent_type = self.nodes[parent].header.data_type;
        let expected = StructureKind::from_container_type(parent_type).ok_or_else(|| {
            EvioError::InvalidStructure(format!(
                "cannot add children to a {} structure",
                parent_type
            ))
        })?;
        if self.nodes[child].header.kind != expected {
            return Err(EvioError::InvalidStructure(format!(
                "container of {} cannot hold a {:?}",
                parent_type, self.nodes[child].header.kind
            )));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(EvioError::InvalidStructure(
                "attaching a node to its own descendant".into(),
            ));
        }
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Remove `child` from its parent's child list, if any.
    pub fn detach(&mut self, child: NodeId) {
        if let Some(p) = self.nodes[child].parent.take() {
            self.nodes[p].children.retain(|&c| c != child);
        }
    }

    fn is_ancestor(&self, candidate: NodeId, node: NodeId) -> bool {
        let mut cur = self.nodes[node].parent;
        while let Some(p) = cur {
            if p == candidate {
                return true;
            }
            cur = self.nodes[p].parent;
        }
        false
    }

    // ── Payload setters ─────────────────────────────────────────────

    fn set_payload(
        &mut self,
        id: NodeId,
        data_type: DataType,
        payload: Payload,
    ) -> Result<(), EvioError> {
        if self.nodes[id].header.data_type.is_container() {
            return Err(EvioError::InvalidStructure(
                "cannot set leaf data on a container".into(),
            ));
        }
        let pad = util::padding(payload.byte_len()) as u8;
        let node = &mut self.nodes[id];
        node.header.data_type = data_type;
        node.header.pad = pad;
        node.payload = payload;
        Ok(())
    }

    pub fn set_u32_data(&mut self, id: NodeId, data: &[u32]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Uint32, Payload::Uint32(data.to_vec()))
    }

    pub fn set_i32_data(&mut self, id: NodeId, data: &[i32]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Int32, Payload::Int32(data.to_vec()))
    }

    pub fn set_f32_data(&mut self, id: NodeId, data: &[f32]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Float32, Payload::Float32(data.to_vec()))
    }

    pub fn set_f64_data(&mut self, id: NodeId, data: &[f64]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Double64, Payload::Double64(data.to_vec()))
    }

    pub fn set_i16_data(&mut self, id: NodeId, data: &[i16]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Short16, Payload::Short16(data.to_vec()))
    }

    pub fn set_u16_data(&mut self, id: NodeId, data: &[u16]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Ushort16, Payload::Ushort16(data.to_vec()))
    }

    pub fn set_i8_data(&mut self, id: NodeId, data: &[i8]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Char8, Payload::Char8(data.to_vec()))
    }

    pub fn set_u8_data(&mut self, id: NodeId, data: &[u8]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Uchar8, Payload::Uchar8(data.to_vec()))
    }

    pub fn set_i64_data(&mut self, id: NodeId, data: &[i64]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Long64, Payload::Long64(data.to_vec()))
    }

    pub fn set_u64_data(&mut self, id: NodeId, data: &[u64]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Ulong64, Payload::Ulong64(data.to_vec()))
    }

    pub fn set_string_data(&mut self, id: NodeId, data: &[String]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::CharStar8, Payload::Strings(data.to_vec()))
    }

    pub fn set_raw_data(&mut self, id: NodeId, data: &[u8]) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Unknown32, Payload::Raw(data.to_vec()))
    }

    pub fn set_composite_data(
        &mut self,
        id: NodeId,
        data: Vec<CompositeData>,
    ) -> Result<(), EvioError> {
        self.set_payload(id, DataType::Composite, Payload::Composite(data))
    }

    // ── Typed payload accessors ─────────────────────────────────────

    pub fn u32_data(&self, id: NodeId) -> Option<&[u32]> {
        match self.nodes[id].payload {
            Payload::Uint32(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn i32_data(&self, id: NodeId) -> Option<&[i32]> {
        match self.nodes[id].payload {
            Payload::Int32(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn f32_data(&self, id: NodeId) -> Option<&[f32]> {
        match self.nodes[id].payload {
            Payload::Float32(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn f64_data(&self, id: NodeId) -> Option<&[f64]> {
        match self.nodes[id].payload {
            Payload::Double64(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn i16_data(&self, id: NodeId) -> Option<&[i16]> {
        match self.nodes[id].payload {
            Payload::Short16(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn u16_data(&self, id: NodeId) -> Option<&[u16]> {
        match self.nodes[id].payload {
            Payload::Ushort16(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn i8_data(&self, id: NodeId) -> Option<&[i8]> {
        match self.nodes[id].payload {
            Payload::Char8(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn u8_data(&self, id: NodeId) -> Option<&[u8]> {
        match self.nodes[id].payload {
            Payload::Uchar8(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn i64_data(&self, id: NodeId) -> Option<&[i64]> {
        match self.nodes[id].payload {
            Payload::Long64(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn u64_data(&self, id: NodeId) -> Option<&[u64]> {
        match self.nodes[id].payload {
            Payload::Ulong64(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn string_data(&self, id: NodeId) -> Option<&[String]> {
        match self.nodes[id].payload {
            Payload::Strings(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn composite_data(&self, id: NodeId) -> Option<&[CompositeData]> {
        match self.nodes[id].payload {
            Payload::Composite(ref v) => Some(v),
            _ => None,
        }
    }

    pub fn raw_data(&self, id: NodeId) -> Option<&[u8]> {
        match self.nodes[id].payload {
            Payload::Raw(ref v) => Some(v),
            _ => None,
        }
    }

    // ── Lengths ─────────────────────────────────────────────────────

    /// Total size of the subtree at `id` in words, header included.
    pub fn total_words(&self, id: NodeId) -> u32 {
        let node = &self.nodes[id];
        let data_words = if node.is_container() {
            node.children.iter().map(|&c| self.total_words(c)).sum()
        } else {
            util::words(node.payload.byte_len()) as u32
        };
        node.header.kind.header_words() + data_words
    }

    /// Recompute the stored length fields for the subtree at `root`.
    pub fn refresh_lengths(&mut self, root: NodeId) {
        let total = self.total_words(root);
        self.nodes[root].header.length = total - 1;
        let children: Vec<NodeId> = self.nodes[root].children.clone();
        for child in children {
            self.refresh_lengths(child);
        }
    }

    // ── Serialization ───────────────────────────────────────────────

    /// Serialize the subtree at `root` into `buf` at its current position,
    /// refreshing all lengths first. Returns the number of bytes written.
    pub fn write(&mut self, root: NodeId, buf: &mut ByteBuffer) -> Result<usize, EvioError> {
        self.refresh_lengths(root);
        let start = buf.position();
        self.write_node(root, buf)?;
        Ok(buf.position() - start)
    }

    /// Serialize the subtree at `root` to a new vector in `order`.
    pub fn to_bytes(&mut self, root: NodeId, order: Endian) -> Result<Vec<u8>, EvioError> {
        self.refresh_lengths(root);
        let total = self.total_words(root) as usize * 4;
        let mut buf = ByteBuffer::new(total).with_order(order);
        self.write_node(root, &mut buf)?;
        Ok(buf.vec_at(0, total)?)
    }

    fn write_node(&self, id: NodeId, buf: &mut ByteBuffer) -> Result<(), EvioError> {
        let at = buf.position();
        let node = &self.nodes[id];
        node.header.encode(buf, at)?;
        buf.set_position(at + node.header.kind.header_words() as usize * 4)?;

        if node.is_container() {
            for &child in &node.children {
                self.write_node(child, buf)?;
            }
            return Ok(());
        }

        match &node.payload {
            Payload::None => {}
            Payload::Raw(v) => buf.put_bytes(v)?,
            Payload::Uint32(v) => {
                for &x in v {
                    buf.put_u32(x)?;
                }
            }
            Payload::Int32(v) => {
                for &x in v {
                    buf.put_i32(x)?;
                }
            }
            Payload::Float32(v) => {
                for &x in v {
                    buf.put_f32(x)?;
                }
            }
            Payload::Double64(v) => {
                for &x in v {
                    buf.put_f64(x)?;
                }
            }
            Payload::Short16(v) => {
                for &x in v {
                    buf.put_i16(x)?;
                }
            }
            Payload::Ushort16(v) => {
                for &x in v {
                    buf.put_u16(x)?;
                }
            }
            Payload::Char8(v) => {
                for &x in v {
                    buf.put_i8(x)?;
                }
            }
            Payload::Uchar8(v) => buf.put_bytes(v)?,
            Payload::Long64(v) => {
                for &x in v {
                    buf.put_i64(x)?;
                }
            }
            Payload::Ulong64(v) => {
                for &x in v {
                    buf.put_u64(x)?;
                }
            }
            Payload::Strings(v) => buf.put_bytes(&util::pack_strings(v))?,
            Payload::Composite(v) => {
                for cd in v {
                    buf.put_bytes(&cd.to_bytes(buf.order())?)?;
                }
            }
        }

        // zero the pad bytes so output is deterministic
        for _ in 0..node.header.pad {
            buf.put_u8(0)?;
        }
        Ok(())
    }

    // ── Parsing ─────────────────────────────────────────────────────

    /// Parse a top-level event (a bank) from `buf` at its current position.
    /// The position advances past the event. Returns the root node id.
    pub fn parse_event(&mut self, buf: &mut ByteBuffer) -> Result<NodeId, EvioError> {
        self.parse_event_with_listener(buf, &mut NoopListener)
    }

    /// Parse a top-level event, reporting each parsed structure to
    /// `listener` in depth-first preorder.
    pub fn parse_event_with_listener<L: ParseListener>(
        &mut self,
        buf: &mut ByteBuffer,
        listener: &mut L,
    ) -> Result<NodeId, EvioError> {
        listener.start_event();
        let at = buf.position();
        let root = self.parse_structure(buf, at, StructureKind::Bank, listener)?;
        buf.set_position(at + self.nodes[root].header.total_words() as usize * 4)?;
        listener.end_event();
        Ok(root)
    }

    fn parse_structure<L: ParseListener>(
        &mut self,
        buf: &ByteBuffer,
        at: usize,
        kind: StructureKind,
        listener: &mut L,
    ) -> Result<NodeId, EvioError> {
        let header = StructureHeader::decode(buf, at, kind)?;
        let total_bytes = header.total_words() as usize * 4;
        if at + total_bytes > buf.capacity() {
            return Err(EvioError::InvalidLength(format!(
                "structure of {} bytes at {} exceeds buffer of {}",
                total_bytes,
                at,
                buf.capacity()
            )));
        }

        let id = self.push(header);
        let data_at = at + header.kind.header_words() as usize * 4;
        let data_bytes = header.data_words() as usize * 4;

        if let Some(child_kind) = StructureKind::from_container_type(header.data_type) {
            let mut offset = data_at;
            let end = data_at + data_bytes;
            while offset < end {
                let child = self.parse_structure(buf, offset, child_kind, listener)?;
                let child_bytes = self.nodes[child].header.total_words() as usize * 4;
                if offset + child_bytes > end {
                    return Err(EvioError::InvalidLength(format!(
                        "child of {} bytes at {} overruns container ending at {}",
                        child_bytes, offset, end
                    )));
                }
                self.nodes[child].parent = Some(id);
                self.nodes[id].children.push(child);
                offset += child_bytes;
            }
        } else {
            self.nodes[id].payload = Self::parse_payload(buf, data_at, data_bytes, &header)?;
        }

        listener.got_structure(self, id);
        Ok(id)
    }

    fn parse_payload(
        buf: &ByteBuffer,
        at: usize,
        data_bytes: usize,
        header: &StructureHeader,
    ) -> Result<Payload, EvioError> {
        let valid = data_bytes - header.pad as usize;
        let payload = match header.data_type {
            DataType::Uint32 => {
                let mut v = Vec::with_capacity(valid / 4);
                for i in (0..valid).step_by(4) {
                    v.push(buf.get_u32_at(at + i)?);
                }
                Payload::Uint32(v)
            }
            DataType::Int32 => {
                let mut v = Vec::with_capacity(valid / 4);
                for i in (0..valid).step_by(4) {
                    v.push(buf.get_i32_at(at + i)?);
                }
                Payload::Int32(v)
            }
            DataType::Float32 => {
                let mut v = Vec::with_capacity(valid / 4);
                for i in (0..valid).step_by(4) {
                    v.push(buf.get_f32_at(at + i)?);
                }
                Payload::Float32(v)
            }
            DataType::Double64 => {
                let mut v = Vec::with_capacity(valid / 8);
                for i in (0..valid).step_by(8) {
                    v.push(buf.get_f64_at(at + i)?);
                }
                Payload::Double64(v)
            }
            DataType::Short16 => {
                let mut v = Vec::with_capacity(valid / 2);
                for i in (0..valid).step_by(2) {
                    v.push(buf.get_i16_at(at + i)?);
                }
                Payload::Short16(v)
            }
            DataType::Ushort16 => {
                let mut v = Vec::with_capacity(valid / 2);
                for i in (0..valid).step_by(2) {
                    v.push(buf.get_u16_at(at + i)?);
                }
                Payload::Ushort16(v)
            }
            DataType::Char8 => {
                let mut v = Vec::with_capacity(valid);
                for i in 0..valid {
                    v.push(buf.get_i8_at(at + i)?);
                }
                Payload::Char8(v)
            }
            DataType::Uchar8 => Payload::Uchar8(buf.vec_at(at, valid)?),
            DataType::Long64 => {
                let mut v = Vec::with_capacity(valid / 8);
                for i in (0..valid).step_by(8) {
                    v.push(buf.get_i64_at(at + i)?);
                }
                Payload::Long64(v)
            }
            DataType::Ulong64 => {
                let mut v = Vec::with_capacity(valid / 8);
                for i in (0..valid).step_by(8) {
                    v.push(buf.get_u64_at(at + i)?);
                }
                Payload::Ulong64(v)
            }
            DataType::CharStar8 => {
                Payload::Strings(util::unpack_strings(&buf.vec_at(at, data_bytes)?)?)
            }
            DataType::Composite => {
                Payload::Composite(CompositeData::parse_all(&buf.vec_at(at, data_bytes)?, buf.order())?)
            }
            _ => Payload::Raw(buf.vec_at(at, data_bytes)?),
        };
        Ok(payload)
    }

    // ── Traversal ───────────────────────────────────────────────────

    /// Depth-first preorder node ids of the subtree at `root`.
    pub fn preorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            for &child in self.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Depth-first postorder node ids of the subtree at `root`.
    pub fn postorder(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.postorder_into(root, &mut out);
        out
    }

    fn postorder_into(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[id].children {
            self.postorder_into(child, out);
        }
        out.push(id);
    }

    /// All nodes of the subtree at `root` matching `predicate`, in preorder.
    pub fn get_matching_structures<F>(&self, root: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Structure) -> bool,
    {
        self.preorder(root)
            .into_iter()
            .filter(|&id| predicate(&self.nodes[id]))
            .collect()
    }

    /// Structural equality of two subtrees: same headers (lengths aside),
    /// payloads, and child order.
    pub fn subtree_eq(&self, a: NodeId, other: &EvioTree, b: NodeId) -> bool {
        let na = &self.nodes[a];
        let nb = &other.nodes[b];
        if na.header.kind != nb.header.kind
            || na.header.tag != nb.header.tag
            || na.header.num != nb.header.num
            || na.header.pad != nb.header.pad
            || na.header.data_type.code() != nb.header.data_type.code()
            || na.payload != nb.payload
            || na.children.len() != nb.children.len()
        {
            return false;
        }
        na.children
            .iter()
            .zip(nb.children.iter())
            .all(|(&ca, &cb)| self.subtree_eq(ca, other, cb))
    }
}

struct NoopListener;

impl ParseListener for NoopListener {}
